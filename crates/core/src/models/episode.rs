use serde::{Deserialize, Serialize};
use std::fmt;

use super::Name;

/// Acquisition state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Wanted but not yet present in the library.
    Desired,
    /// A file for this episode has landed in the library.
    Exists,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Desired => "desired",
            State::Exists => "exists",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "desired" => Some(State::Desired),
            "exists" => Some(State::Exists),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An episode record as held by the show store. Identity key is `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub name: Name,
    pub state: State,
}

impl Episode {
    pub fn new(name: Name, state: State) -> Self {
        Self { name, state }
    }

    pub fn desired(name: Name) -> Self {
        Self::new(name, State::Desired)
    }

    pub fn existing(name: Name) -> Self {
        Self::new(name, State::Exists)
    }

    /// Copy of this episode with a different state.
    pub fn with_state(&self, state: State) -> Self {
        Self {
            name: self.name.clone(),
            state,
        }
    }

    pub fn is_desired(&self) -> bool {
        self.state == State::Desired
    }
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.state)
    }
}
