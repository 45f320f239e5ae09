//! End-of-day financial summary of one tenant for one civil date.
//!
//! A report is compiled from the completed orders attributed to that day and a
//! snapshot of the tenant's settings. Later settings changes never touch an
//! existing report; only a re-run of the archiver for the same date does.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::order::{Order, PaymentMethod};
use super::tenant::{TenantError, TenantSettings, VatRate};

/// Bumped whenever the canonical hash input changes shape.
pub const HASH_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZReport {
    pub id: Uuid,
    pub tenant_slug: String,
    pub report_date: NaiveDate,
    pub order_count: i32,
    pub subtotal: Decimal,
    pub tax_low: Decimal,
    pub tax_mid: Decimal,
    pub tax_high: Decimal,
    pub total: Decimal,
    pub cash_total: Decimal,
    pub card_total: Decimal,
    pub online_total: Decimal,
    pub business_name: String,
    pub business_address: String,
    pub vat_number: Option<String>,
    pub order_ids: Vec<Uuid>,
    pub content_hash: String,
    pub generated_at: DateTime<Utc>,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentTotals {
    pub cash: Decimal,
    pub card: Decimal,
    pub online: Decimal,
}

impl PaymentTotals {
    pub fn add(&mut self, method: PaymentMethod, amount: Decimal) {
        match method {
            PaymentMethod::Cash => self.cash += amount,
            PaymentMethod::Card => self.card += amount,
            PaymentMethod::Online => self.online += amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxSplit {
    pub subtotal: Decimal,
    pub tax_low: Decimal,
    pub tax_mid: Decimal,
    pub tax_high: Decimal,
}

/// Split a VAT-inclusive total into net amount and the tax of its bracket.
pub fn split_tax(total: Decimal, rate: VatRate) -> TaxSplit {
    let divisor = Decimal::ONE + Decimal::from(rate.percentage()) / Decimal::ONE_HUNDRED;
    let subtotal =
        (total / divisor).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let tax = total - subtotal;
    let (tax_low, tax_mid, tax_high) = match rate {
        VatRate::Low => (tax, Decimal::ZERO, Decimal::ZERO),
        VatRate::Mid => (Decimal::ZERO, tax, Decimal::ZERO),
        VatRate::High => (Decimal::ZERO, Decimal::ZERO, tax),
    };
    TaxSplit {
        subtotal,
        tax_low,
        tax_mid,
        tax_high,
    }
}

#[derive(Serialize)]
struct CanonicalReport<'a> {
    schema_version: u32,
    tenant: &'a str,
    report_date: String,
    order_count: usize,
    total_cents: i64,
    order_ids: &'a [Uuid],
}

/// Hex SHA-256 over the canonical JSON form of the report identity.
/// `sorted_order_ids` must already be sorted.
pub fn content_hash(
    tenant_slug: &str,
    report_date: NaiveDate,
    total: Decimal,
    sorted_order_ids: &[Uuid],
) -> String {
    let total_cents = (total * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(i64::MAX);
    let canonical = CanonicalReport {
        schema_version: HASH_SCHEMA_VERSION,
        tenant: tenant_slug,
        report_date: report_date.format("%Y-%m-%d").to_string(),
        order_count: sorted_order_ids.len(),
        total_cents,
        order_ids: sorted_order_ids,
    };
    // Serializing a struct of strings and integers cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

impl ZReport {
    /// Aggregate one tenant's orders for `report_date`.
    ///
    /// Without a settings row the default bracket applies and the identity
    /// snapshot stays empty. A settings row whose VAT rate has no bracket is
    /// an error: the tax would otherwise have nowhere to go.
    pub fn compile(
        tenant_slug: &str,
        report_date: NaiveDate,
        orders: &[Order],
        settings: Option<&TenantSettings>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, TenantError> {
        let rate = match settings {
            Some(s) => s.vat_rate()?,
            None => VatRate::DEFAULT,
        };

        let mut total = Decimal::ZERO;
        let mut payments = PaymentTotals::default();
        for order in orders {
            total += order.total;
            payments.add(order.payment_category(), order.total);
        }

        let mut order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        order_ids.sort();
        order_ids.dedup();

        let tax = split_tax(total, rate);
        let content_hash = content_hash(tenant_slug, report_date, total, &order_ids);

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_slug: tenant_slug.to_string(),
            report_date,
            order_count: i32::try_from(order_ids.len()).unwrap_or(i32::MAX),
            subtotal: tax.subtotal,
            tax_low: tax.tax_low,
            tax_mid: tax.tax_mid,
            tax_high: tax.tax_high,
            total,
            cash_total: payments.cash,
            card_total: payments.card,
            online_total: payments.online,
            business_name: settings.map(|s| s.business_name.clone()).unwrap_or_default(),
            business_address: settings.map(|s| s.address.clone()).unwrap_or_default(),
            vat_number: settings.and_then(|s| s.vat_number.clone()),
            order_ids,
            content_hash,
            generated_at,
            is_archived: true,
        })
    }

    /// Keep the identity of a previously archived row.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}
