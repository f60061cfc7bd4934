//! Like/dislike voting on posts and comments.
//!
//! Provides:
//! - [`Disposition`] and [`TargetKind`], the vocabulary shared with the stores
//! - [`Transition`], the pure decision table for a single toggle
//! - [`VoteToggleEngine`], which applies one transition per unit of work
//!
//! ## Invariants
//! - An actor holds at most one vote per target (Like and Dislike are
//!   mutually exclusive).
//! - A target's `likes`/`dislikes` counters always equal the number of
//!   Like/Dislike vote rows for that target.

pub mod engine;
pub mod transition;

pub use engine::VoteToggleEngine;
pub use transition::Transition;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Disposition ─────────────────────────────────────────────────

/// A vote an actor can hold on a target.
///
/// The third state, "no vote", is modelled as `Option::<Disposition>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Like,
    Dislike,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }

    /// Parse the stored representation. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Dislike),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown disposition '{s}' (expected like or dislike)"))
    }
}

// ── Target kind ─────────────────────────────────────────────────

/// The kinds of content that carry vote counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            _ => Err(format!("unknown target kind '{s}' (expected post or comment)")),
        }
    }
}

// ── Tally ───────────────────────────────────────────────────────

/// Denormalized counters carried by a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub likes: u64,
    pub dislikes: u64,
}

/// A target whose counters disagree with its vote rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub kind: TargetKind,
    pub id: i64,
    /// What the target row says.
    pub recorded: Tally,
    /// What the vote rows say.
    pub counted: Tally,
}
