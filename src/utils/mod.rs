//! Utility modules shared by the engine
//!
//! - Tri-state truth: four-valued logic for criteria and mosaic rules
//! - Union-find: disjoint sets behind cohesion clustering
//! - Geometry: boundary overlay and bounding-box index

pub mod geometry;
pub mod tristate;
pub mod union_find;

// Re-export commonly used types
pub use geometry::{boundary, boundary_length, expand_rect, length_within, SpatialIndex};
pub use tristate::TriState;
pub use union_find::{cluster_lists, UnionFind};
