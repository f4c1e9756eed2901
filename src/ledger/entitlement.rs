use thiserror::Error;

use crate::config;

/// Category stored on grants created at account signup.
pub const TRIAL_GRANT_CATEGORY: &str = "trial";

/// Purchasable tiers. A pure mapping with no I/O: tier labels arrive on
/// checkout requests and webhook metadata, and everything else about a
/// purchase (credit amount, grant category, recurrence) derives from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingTier {
    StarterPack,
    ProPack,
    ProMonthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pricing tier: {0}")]
pub struct UnknownTier(pub String);

impl PricingTier {
    /// Parse a wire label. Unknown labels are an error; callers must reject
    /// the request rather than guess an amount.
    pub fn parse(label: &str) -> Result<Self, UnknownTier> {
        match label {
            "starter_pack" => Ok(PricingTier::StarterPack),
            "pro_pack" => Ok(PricingTier::ProPack),
            "pro_monthly" => Ok(PricingTier::ProMonthly),
            other => Err(UnknownTier(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTier::StarterPack => "starter_pack",
            PricingTier::ProPack => "pro_pack",
            PricingTier::ProMonthly => "pro_monthly",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PricingTier::StarterPack => "Starter Pack",
            PricingTier::ProPack => "Pro Pack",
            PricingTier::ProMonthly => "Pro Monthly",
        }
    }

    /// Credits granted per purchase (per period for recurring tiers).
    pub fn credits(&self) -> i32 {
        match self {
            PricingTier::StarterPack => 30,
            PricingTier::ProPack => 75,
            PricingTier::ProMonthly => 15,
        }
    }

    pub fn grant_category(&self) -> &'static str {
        match self {
            PricingTier::StarterPack => "one_time_starter",
            PricingTier::ProPack => "one_time_pro",
            PricingTier::ProMonthly => "subscription_monthly",
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, PricingTier::ProMonthly)
    }

    /// Display price in cents. Informational only; the processor's webhook
    /// carries the authoritative charged amount.
    pub fn amount_cents(&self) -> i32 {
        match self {
            PricingTier::StarterPack => 499,
            PricingTier::ProPack => 999,
            PricingTier::ProMonthly => 399,
        }
    }

    /// Provider price reference for checkout-session creation.
    pub fn price_id(&self) -> String {
        match self {
            PricingTier::StarterPack => config::PRICE_ID_STARTER_PACK.clone(),
            PricingTier::ProPack => config::PRICE_ID_PRO_PACK.clone(),
            PricingTier::ProMonthly => config::PRICE_ID_PRO_MONTHLY.clone(),
        }
    }
}
