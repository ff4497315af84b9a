use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Release quality label (resolution or encode tag), normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(String);

impl Quality {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configured quality bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Primary,
    Secondary,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Primary => "primary",
            QualityTier::Secondary => "secondary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(QualityTier::Primary),
            "secondary" => Some(QualityTier::Secondary),
            _ => None,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary and secondary quality sets.
///
/// Tiers are unordered within themselves. When both sets are empty every
/// label classifies as [`QualityTier::Primary`] (accept-any mode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityTiers {
    primary: BTreeSet<Quality>,
    secondary: BTreeSet<Quality>,
}

impl QualityTiers {
    pub fn new<P, S>(primary: P, secondary: S) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            primary: primary.into_iter().map(Quality::new).collect(),
            secondary: secondary.into_iter().map(Quality::new).collect(),
        }
    }

    /// Accept-any tiers.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_accept_any(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Returns `None` for labels outside both tiers.
    pub fn classify(&self, quality: &Quality) -> Option<QualityTier> {
        if self.is_accept_any() || self.primary.contains(quality) {
            Some(QualityTier::Primary)
        } else if self.secondary.contains(quality) {
            Some(QualityTier::Secondary)
        } else {
            None
        }
    }
}

/// Per-episode arbitration record held by the quality store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDecision {
    /// First time any recognized quality was seen for the episode.
    pub first_seen_at: DateTime<Utc>,
    /// Set exactly once; final for the current desire cycle.
    pub accepted_tier: Option<QualityTier>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl QualityDecision {
    pub fn new(first_seen_at: DateTime<Utc>) -> Self {
        Self {
            first_seen_at,
            accepted_tier: None,
            accepted_at: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_tier.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_is_normalized() {
        assert_eq!(Quality::new(" 1080P "), Quality::new("1080p"));
        assert_eq!(Quality::new("HDTV").as_str(), "hdtv");
    }

    #[test]
    fn test_classify() {
        let tiers = QualityTiers::new(["1080p"], ["720p"]);
        assert_eq!(tiers.classify(&Quality::new("1080p")), Some(QualityTier::Primary));
        assert_eq!(tiers.classify(&Quality::new("720P")), Some(QualityTier::Secondary));
        assert_eq!(tiers.classify(&Quality::new("480p")), None);
    }

    #[test]
    fn test_accept_any_mode() {
        let tiers = QualityTiers::any();
        assert!(tiers.is_accept_any());
        assert_eq!(tiers.classify(&Quality::new("sd")), Some(QualityTier::Primary));
    }

    #[test]
    fn test_decision_starts_unaccepted() {
        let decision = QualityDecision::new(Utc::now());
        assert!(!decision.is_accepted());
        assert!(decision.accepted_at.is_none());
    }
}
