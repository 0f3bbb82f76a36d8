//! Plan tiers and subscription statuses.
//!
//! Tier and status are plain persisted fields on the account row; the tier
//! ordering matters because autonomous replies are gated on a minimum tier.

use serde::{Deserialize, Serialize};

/// Subscription plan tier for a tenant account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Growth,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Growth => "growth",
            PlanTier::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PlanTier::Free),
            "starter" => Some(PlanTier::Starter),
            "growth" => Some(PlanTier::Growth),
            "pro" => Some(PlanTier::Pro),
            _ => None,
        }
    }

    /// Autonomous channel replies require the growth tier or higher.
    /// Free and starter tenants are denied regardless of credit balance.
    pub fn autonomous_reply_enabled(&self) -> bool {
        matches!(self, PlanTier::Growth | PlanTier::Pro)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a tenant's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    PastDue,
    Canceled,
    Inactive,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::PastDue => "past_due",
            PlanStatus::Canceled => "canceled",
            PlanStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PlanStatus::Active),
            "past_due" => Some(PlanStatus::PastDue),
            "canceled" => Some(PlanStatus::Canceled),
            "inactive" => Some(PlanStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
