//! Episode name parsing.
//!
//! Turns release titles and filenames such as `House.S03E01.720p.HDTV.x264.mkv`
//! into a [`Name`] and a [`Quality`]. Alternate show identifiers are mapped
//! onto canonical titles through an alias table.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashMap;

use crate::models::{Name, NameAndQuality, Quality};

/// `Title.S01E02`, `Title - s1e2`.
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[\s._\[(-]+s(\d{1,2})[\s._-]*e(\d{1,3})").expect("valid regex")
});

/// `Title.1x02`.
static CROSS_NOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[\s._\[(-]+(\d{1,2})x(\d{1,3})\b").expect("valid regex")
});

/// `Title.E02`, `Title - Episode 2`; no season subdivision.
static EPISODE_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[\s._\[(-]+(?:episode|ep|e)[\s._]*(\d{1,3})\b").expect("valid regex")
});

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{3,4}[pi])\b").expect("valid regex"));

/// Quality assigned when a title carries no resolution token.
pub const DEFAULT_QUALITY: &str = "sd";

/// Lowercases and strips everything but ASCII letters and digits.
pub fn normalize_title(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parses titles and filenames into episode identities.
#[derive(Debug, Clone, Default)]
pub struct EpisodeNameParser {
    aliases: HashMap<String, String>,
}

impl EpisodeNameParser {
    /// Both sides of each alias are normalized. Entries that normalize to an
    /// empty string are dropped.
    pub fn new<I, K, V>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(k, v)| (normalize_title(k.as_ref()), normalize_title(v.as_ref())))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
        }
    }

    /// Returns `None` when no season/episode marker can be found or the title
    /// part is empty.
    pub fn parse(&self, input: &str) -> Option<NameAndQuality> {
        let (raw_title, season, episode) = Self::split_marker(input)?;

        let title = normalize_title(raw_title);
        if title.is_empty() {
            return None;
        }
        let title = self.aliases.get(&title).cloned().unwrap_or(title);

        let quality = RESOLUTION
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| Quality::new(m.as_str()))
            .unwrap_or_else(|| Quality::new(DEFAULT_QUALITY));

        Some(NameAndQuality {
            name: Name::new(title, season, episode),
            quality,
        })
    }

    /// Convenience wrapper for paths: only the final component is parsed.
    pub fn parse_filename(&self, filename: &str) -> Option<NameAndQuality> {
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        self.parse(base)
    }

    fn split_marker(input: &str) -> Option<(&str, u32, u32)> {
        if let Some(caps) = SEASON_EPISODE
            .captures(input)
            .or_else(|| CROSS_NOTATION.captures(input))
        {
            let title = caps.get(1)?.as_str();
            let season = caps.get(2)?.as_str().parse().ok()?;
            let episode = caps.get(3)?.as_str().parse().ok()?;
            return Some((title, season, episode));
        }

        let caps = EPISODE_ONLY.captures(input)?;
        let title = caps.get(1)?.as_str();
        let episode = caps.get(2)?.as_str().parse().ok()?;
        Some((title, 0, episode))
    }
}
