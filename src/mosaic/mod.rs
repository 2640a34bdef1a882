//! Mosaic (surrounding-polygon) rules
//!
//! - `neighborhood`: buffered-boundary overlay and the resulting profile
//! - `rule`: the rule variants evaluated against that profile

pub mod neighborhood;
pub mod rule;

pub use neighborhood::{omringing_percentages, NeighborhoodProfile, NeighbourState, OmringingEntry};
pub use rule::{MosaicRule, MozaiekThresholds, NietGeimplementeerdeMozaiekregel, StandaardMozaiekregel};
