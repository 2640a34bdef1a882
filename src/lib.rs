//! Habitat Classifier Rust Implementation
//!
//! Turns surveyed vegetation polygons into habitat type assignments.
//!
//! - `vegetation/`: SBB and VvN codes, complex-parts
//! - `criteria/`: qualifying conditions over joined attributes
//! - `data`: definition table (Polars ingestion, lookup index)
//! - `matcher`: code → habitat proposals, memoised
//! - `resolver/`: proposals → one keuze per complex-part
//! - `mosaic/`: surround overlay and mosaic rules
//! - `cohesion/`: functional cohesion clusters and minimum area
//! - `classifier`: the coordinator running all of the above for a survey

pub mod classifier;
pub mod cohesion;
pub mod config;
pub mod criteria;
pub mod data;
pub mod error;
pub mod matcher;
pub mod mosaic;
pub mod resolver;
pub mod survey;
pub mod utils;
pub mod vegetation;

// Re-export commonly used types
pub use classifier::{ClassificationReport, HabitatAandeel, HabitatClassifier, PolygonResult};
pub use config::EngineConfig;
pub use criteria::{AttributeRow, AttributeValue, Criterion, OverrideCriterium};
pub use data::{DefinitionRow, DefinitionTable};
pub use error::{HabResult, HabitatError};
pub use matcher::HabitatMatcher;
pub use mosaic::{MosaicRule, StandaardMozaiekregel};
pub use resolver::{ChoiceResolver, HabitatKeuze, HabitatVoorstel, KeuzeStatus, Kwaliteit, H0000, HXXXX};
pub use survey::{PolygonId, SurveyPolygon};
pub use utils::TriState;
pub use vegetation::{CodeFamily, MatchLevel, VegCode, VegTypeInfo};
