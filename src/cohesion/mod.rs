//! Functional cohesion and the minimum-area check built on it

pub mod area_threshold;
pub mod clusterer;

pub use area_threshold::{apply_minimum_area, MinimumAreaTable};
pub use clusterer::{functional_cohesion_clusters, ClusterInput, CohesionTier};
