//! Normalized show/episode identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::Quality;

/// Identity of a single broadcast episode.
///
/// Equality, hashing and ordering are defined by `(title, season, episode)`
/// in that order. `season == 0` means the show has no season subdivision and
/// `episode == 0` marks a special or unnumbered episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    /// Canonical, alias-resolved, lowercase title without punctuation.
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

impl Name {
    pub fn new(title: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            title: title.into(),
            season,
            episode,
        }
    }

    /// Whether the show is split into numbered seasons.
    pub fn has_season(&self) -> bool {
        self.season > 0
    }

    /// Free-text query used by on-demand search parsers.
    pub fn search_query(&self) -> String {
        if self.has_season() {
            format!("{} S{:02}E{:02}", self.title, self.season, self.episode)
        } else {
            format!("{} E{:02}", self.title, self.episode)
        }
    }

    /// Library-relative path for a file of this episode.
    ///
    /// Layout is `{title}/Season {NN}/{filename}`, without the season segment
    /// when `season == 0`.
    pub fn library_path(&self, filename: &str) -> PathBuf {
        let mut path = PathBuf::from(&self.title);
        if self.has_season() {
            path.push(format!("Season {:02}", self.season));
        }
        path.push(filename);
        path
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} S{:02}E{:02}", self.title, self.season, self.episode)
    }
}

/// Output of the episode name parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAndQuality {
    pub name: Name,
    pub quality: Quality,
}
