//! Error types for the habitat decision engine
//!
//! Every fault is local and raised where the violation happens. Outcomes that need
//! manual review (CANNOT_AUTOMATE, POSTPONE) are values, not errors.

use thiserror::Error;

use crate::utils::tristate::TriState;
use crate::vegetation::CodeFamily;

/// Faults raised by the core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HabitatError {
    /// Text does not follow the grammar of the code family
    #[error("Invalid {family} vegetation code: '{code}'")]
    InvalidCodeFormat { family: CodeFamily, code: String },

    /// Row lacks a column a criterion needs (upstream join failed)
    #[error("Row has no attribute '{0}'")]
    MissingAttribute(String),

    /// Result requested before `check()` ran
    #[error("{0} has not been evaluated yet")]
    NotYetEvaluated(String),

    /// Tri-state value has no boolean counterpart
    #[error("Truth value {0} cannot be used as a boolean")]
    AmbiguousTruthValue(TriState),

    /// Contract violation (empty combinator, unfiltered table, ...)
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Result alias used throughout the core
pub type HabResult<T> = std::result::Result<T, HabitatError>;

impl HabitatError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        HabitatError::Invariant(msg.into())
    }
}
