//! Quality arbiter implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::metrics;
use crate::models::{Name, Quality, QualityTier};
use crate::store::{QualityStore, ShowStore, StoreError};

use super::types::{ArbiterConfig, RejectReason, Verdict};

/// Decides accept/reject for discovered releases.
///
/// The only write performed is the compare-and-set in
/// [`QualityStore::set_accepted`], so concurrent callers racing on the same
/// episode observe exactly one acceptance.
pub struct QualityArbiter {
    config: ArbiterConfig,
    shows: Arc<dyn ShowStore>,
    decisions: Arc<dyn QualityStore>,
}

impl QualityArbiter {
    pub fn new(
        config: ArbiterConfig,
        shows: Arc<dyn ShowStore>,
        decisions: Arc<dyn QualityStore>,
    ) -> Self {
        Self {
            config,
            shows,
            decisions,
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Considers a release of `quality` for `name`, observed at `now`.
    ///
    /// An acceptance is persisted before returning and is never rolled back.
    pub fn consider(
        &self,
        name: &Name,
        quality: &Quality,
        now: DateTime<Utc>,
    ) -> Result<Verdict, StoreError> {
        let verdict = self.decide(name, quality, now)?;

        metrics::QUALITY_VERDICTS
            .with_label_values(&[verdict.label()])
            .inc();

        match verdict {
            Verdict::Accepted(tier) => {
                info!(name = %name, quality = %quality, tier = %tier, "Accepted release");
            }
            Verdict::Rejected(reason) => {
                trace!(name = %name, quality = %quality, reason = %reason, "Rejected release");
            }
        }

        Ok(verdict)
    }

    fn decide(
        &self,
        name: &Name,
        quality: &Quality,
        now: DateTime<Utc>,
    ) -> Result<Verdict, StoreError> {
        match self.shows.get(name)? {
            Some(episode) if episode.is_desired() => {}
            _ => return Ok(Verdict::Rejected(RejectReason::NotDesired)),
        }

        let Some(tier) = self.config.tiers.classify(quality) else {
            return Ok(Verdict::Rejected(RejectReason::UnrecognizedQuality));
        };

        let decision = self.decisions.get_or_create(name, now)?;
        if decision.is_accepted() {
            return Ok(Verdict::Rejected(RejectReason::AlreadyAccepted));
        }

        if tier == QualityTier::Secondary {
            let waited = now.signed_duration_since(decision.first_seen_at);
            let window = chrono::Duration::from_std(self.config.primary_quality_timeout)
                .unwrap_or(chrono::Duration::MAX);
            if waited < window {
                debug!(
                    name = %name,
                    quality = %quality,
                    waited_secs = waited.num_seconds(),
                    "Secondary quality still inside primary window"
                );
                return Ok(Verdict::Rejected(RejectReason::AwaitingPrimaryWindow));
            }
        }

        if self.decisions.set_accepted(name, tier, now)? {
            Ok(Verdict::Accepted(tier))
        } else {
            Ok(Verdict::Rejected(RejectReason::AlreadyAccepted))
        }
    }
}
