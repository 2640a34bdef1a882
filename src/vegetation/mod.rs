//! Vegetation codes and surveyed complex-parts

pub mod code;
pub mod veg_type_info;

pub use code::{CodeFamily, Gemeenschap, MatchLevel, VegCode, VegCodeRepr};
pub use veg_type_info::{validate_parts, VegTypeInfo};
