//! Four-valued truth used by criteria and mosaic rules
//!
//! TRUE and FALSE behave classically. CANNOT_AUTOMATE is stuck: only a FALSE
//! operand (AND) or a TRUE operand (OR) gets past it. POSTPONE is data that has
//! not arrived yet: FALSE still wins an AND, CANNOT_AUTOMATE wins an AND (it can
//! never become true), and under OR it stays POSTPONE unless TRUE is present.
//!
//! Precedence, highest first:
//! - AND: FALSE > CANNOT_AUTOMATE > POSTPONE > TRUE
//! - OR:  TRUE > POSTPONE > CANNOT_AUTOMATE > FALSE

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::error::HabitatError;

/// Result of evaluating a criterion or mosaic rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriState {
    True,
    False,
    /// Needs manual review, no amount of extra data resolves it
    CannotAutomate,
    /// Depends on neighbour information that is not known yet
    Postpone,
}

impl TriState {
    /// Rank under AND (higher wins)
    fn and_rank(self) -> u8 {
        match self {
            TriState::False => 3,
            TriState::CannotAutomate => 2,
            TriState::Postpone => 1,
            TriState::True => 0,
        }
    }

    /// Rank under OR (higher wins)
    fn or_rank(self) -> u8 {
        match self {
            TriState::True => 3,
            TriState::Postpone => 2,
            TriState::CannotAutomate => 1,
            TriState::False => 0,
        }
    }

    /// Dutch label used in explanations
    pub fn as_label(&self) -> &'static str {
        match self {
            TriState::True => "WAAR",
            TriState::False => "ONWAAR",
            TriState::CannotAutomate => "NIET AUTOMATISEERBAAR",
            TriState::Postpone => "UITGESTELD",
        }
    }

    /// AND over an iterator, TRUE for an empty one
    pub fn all(values: impl IntoIterator<Item = TriState>) -> TriState {
        values.into_iter().fold(TriState::True, |acc, v| acc & v)
    }

    /// OR over an iterator, FALSE for an empty one
    pub fn any(values: impl IntoIterator<Item = TriState>) -> TriState {
        values.into_iter().fold(TriState::False, |acc, v| acc | v)
    }
}

impl BitAnd for TriState {
    type Output = TriState;

    fn bitand(self, rhs: TriState) -> TriState {
        if self.and_rank() >= rhs.and_rank() {
            self
        } else {
            rhs
        }
    }
}

impl BitOr for TriState {
    type Output = TriState;

    fn bitor(self, rhs: TriState) -> TriState {
        if self.or_rank() >= rhs.or_rank() {
            self
        } else {
            rhs
        }
    }
}

impl Not for TriState {
    type Output = TriState;

    fn not(self) -> TriState {
        match self {
            TriState::True => TriState::False,
            TriState::False => TriState::True,
            other => other,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }
}

/// Only the classical values convert; callers branch on the enum otherwise
impl TryFrom<TriState> for bool {
    type Error = HabitatError;

    fn try_from(value: TriState) -> Result<Self, Self::Error> {
        match value {
            TriState::True => Ok(true),
            TriState::False => Ok(false),
            other => Err(HabitatError::AmbiguousTruthValue(other)),
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
