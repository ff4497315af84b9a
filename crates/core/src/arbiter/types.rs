use std::fmt;
use std::time::Duration;

use crate::models::{QualityTier, QualityTiers};

/// Configuration for the quality arbiter.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    pub tiers: QualityTiers,
    /// How long a secondary-tier release waits for a primary one.
    pub primary_quality_timeout: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            tiers: QualityTiers::any(),
            primary_quality_timeout: Duration::from_secs(3600),
        }
    }
}

/// Why an item was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Episode is unknown or not in state DESIRED.
    NotDesired,
    /// Quality label is in neither tier.
    UnrecognizedQuality,
    /// Another item for this episode was already accepted.
    AlreadyAccepted,
    /// Secondary quality seen before the primary window elapsed.
    AwaitingPrimaryWindow,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotDesired => "not_desired",
            RejectReason::UnrecognizedQuality => "unrecognized_quality",
            RejectReason::AlreadyAccepted => "already_accepted",
            RejectReason::AwaitingPrimaryWindow => "awaiting_primary_window",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`QualityArbiter::consider`](super::QualityArbiter::consider).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted(QualityTier),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    /// Label used for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted(tier) => tier.as_str(),
            Verdict::Rejected(reason) => reason.as_str(),
        }
    }
}
