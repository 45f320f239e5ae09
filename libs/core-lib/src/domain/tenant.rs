use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_SLUG_LEN: usize = 63;

// --- Errors ---

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TenantError {
    #[error("Invalid tenant slug: {0:?}")]
    InvalidSlug(String),
    #[error("Unsupported VAT percentage: {0}")]
    UnsupportedVatRate(i32),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Whether `candidate` can be used as a tenant slug (and therefore as a DNS label).
pub fn is_valid_slug(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_SLUG_LEN
        && !candidate.starts_with('-')
        && !candidate.ends_with('-')
        && candidate
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

// --- Tenant ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Cancelled,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TenantStatus::Active),
            "suspended" => Some(TenantStatus::Suspended),
            "cancelled" => Some(TenantStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub slug: String,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Validate signup input and build an active tenant.
    pub fn new(slug: &str, name: &str, now: DateTime<Utc>) -> Result<Self, TenantError> {
        let slug = slug.trim();
        if !is_valid_slug(slug) {
            return Err(TenantError::InvalidSlug(slug.to_string()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(TenantError::InvalidInput(
                "Tenant name cannot be empty".into(),
            ));
        }
        Ok(Self {
            slug: slug.to_string(),
            name: name.to_string(),
            status: TenantStatus::Active,
            created_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

// --- VAT ---

/// The three Belgian VAT brackets a Z-report has a column for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatRate {
    Low,
    Mid,
    High,
}

impl VatRate {
    pub const DEFAULT: VatRate = VatRate::Low;

    pub fn percentage(&self) -> i32 {
        match self {
            VatRate::Low => 6,
            VatRate::Mid => 12,
            VatRate::High => 21,
        }
    }
}

impl TryFrom<i32> for VatRate {
    type Error = TenantError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(VatRate::Low),
            12 => Ok(VatRate::Mid),
            21 => Ok(VatRate::High),
            other => Err(TenantError::UnsupportedVatRate(other)),
        }
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage())
    }
}

// --- Settings ---

/// Business identity and VAT configuration of a tenant.
///
/// `vat_percentage` stays a plain integer because rows written before the
/// bracket check existed may hold any value; use [`TenantSettings::vat_rate`]
/// to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_slug: String,
    pub vat_percentage: i32,
    pub business_name: String,
    pub address: String,
    pub vat_number: Option<String>,
}

impl TenantSettings {
    /// Build settings for a save request, rejecting VAT rates without a bracket.
    pub fn validated(
        tenant_slug: &str,
        vat_percentage: i32,
        business_name: &str,
        address: &str,
        vat_number: Option<&str>,
    ) -> Result<Self, TenantError> {
        VatRate::try_from(vat_percentage)?;
        Ok(Self {
            tenant_slug: tenant_slug.to_string(),
            vat_percentage,
            business_name: business_name.trim().to_string(),
            address: address.trim().to_string(),
            vat_number: vat_number
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }

    pub fn vat_rate(&self) -> Result<VatRate, TenantError> {
        VatRate::try_from(self.vat_percentage)
    }
}
