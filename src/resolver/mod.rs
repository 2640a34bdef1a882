//! From proposals to one habitat choice per complex-part

pub mod choice;
pub mod types;

pub use choice::ChoiceResolver;
pub use types::{HabitatKeuze, HabitatVoorstel, HabtypeClass, KeuzeStatus, Kwaliteit, H0000, HXXXX};
