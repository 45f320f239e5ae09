use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Errors ---

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OrderError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Confirmed,
    Preparing,
    Ready,
    Delivering,
    #[serde(alias = "delivered")]
    Completed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, OrderError> {
        match s {
            "new" => Ok(OrderStatus::New),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "delivering" => Ok(OrderStatus::Delivering),
            "completed" | "delivered" => Ok(OrderStatus::Completed),
            "rejected" => Ok(OrderStatus::Rejected),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            New => matches!(next, Confirmed | Rejected | Cancelled),
            Confirmed => matches!(next, Preparing | Cancelled),
            Preparing => matches!(next, Ready | Delivering | Cancelled),
            Ready | Delivering => matches!(next, Completed | Cancelled),
            Completed | Rejected | Cancelled => false,
        }
    }

    pub fn transition_to(&self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrderError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

// --- Payment method ---

/// How an order was paid. New orders pick one of these at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
}

const CASH_SYNONYMS: &[&str] = &["cash", "contant", "contanten"];
const CARD_SYNONYMS: &[&str] = &["pin", "kaart", "card", "pinbetaling", "debit", "creditcard"];

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Online => "online",
        }
    }

    /// Legacy fallback: orders written before the closed enumeration carry
    /// free text. Case-insensitive synonym match, anything unrecognized is
    /// treated as an online payment.
    pub fn categorize(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if CASH_SYNONYMS.contains(&normalized.as_str()) {
            PaymentMethod::Cash
        } else if CARD_SYNONYMS.contains(&normalized.as_str()) {
            PaymentMethod::Card
        } else {
            PaymentMethod::Online
        }
    }
}

// --- Order ---

/// Largest amount a `NUMERIC(12, 2)` column holds.
pub const MAX_ORDER_TOTAL: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2); // 9_999_999_999.99

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tenant_slug: String,
    pub total: Decimal,
    /// Stored as text; legacy rows may hold anything. See [`PaymentMethod::categorize`].
    pub payment_method: String,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Checkout: validate the lines and compute the total server side.
    pub fn place(
        tenant_slug: &str,
        items: Vec<OrderLine>,
        payment_method: PaymentMethod,
        customer_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::InvalidInput(
                "An order needs at least one line".into(),
            ));
        }
        let mut total = Decimal::ZERO;
        for line in &items {
            if line.name.trim().is_empty() {
                return Err(OrderError::InvalidInput("Line name cannot be empty".into()));
            }
            if line.quantity == 0 {
                return Err(OrderError::InvalidInput(format!(
                    "Quantity of {} must be positive",
                    line.name
                )));
            }
            if line.unit_price.is_sign_negative() {
                return Err(OrderError::InvalidInput(format!(
                    "Price of {} cannot be negative",
                    line.name
                )));
            }
            total = line
                .unit_price
                .checked_mul(Decimal::from(line.quantity))
                .and_then(|amount| total.checked_add(amount))
                .ok_or_else(|| OrderError::InvalidInput("Order total is out of range".into()))?;
        }
        let total = total.round_dp(2);
        if total > MAX_ORDER_TOTAL {
            return Err(OrderError::InvalidInput(format!(
                "Order total {} exceeds {}",
                total, MAX_ORDER_TOTAL
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_slug: tenant_slug.to_string(),
            total,
            payment_method: payment_method.as_str().to_string(),
            status: OrderStatus::New,
            customer_name: customer_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            items,
            created_at: now,
        })
    }

    pub fn payment_category(&self) -> PaymentMethod {
        PaymentMethod::categorize(&self.payment_method)
    }
}
