//! One complex-part of a surveyed polygon

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{HabResult, HabitatError};
use crate::vegetation::code::VegCode;

/// Tolerance on the per-polygon percentage sum
const PERCENTAGE_EPSILON: f64 = 1e-6;

/// Percentage of the polygon plus at most one code per family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegTypeInfo {
    pub percentage: f64,
    pub sbb: Option<VegCode>,
    pub vvn: Option<VegCode>,
}

impl VegTypeInfo {
    pub fn new(percentage: f64, sbb: Option<VegCode>, vvn: Option<VegCode>) -> HabResult<Self> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(HabitatError::invariant(format!(
                "complex-part percentage {} outside 0..=100",
                percentage
            )));
        }
        Ok(Self { percentage, sbb, vvn })
    }

    /// Build from raw survey strings; empty or missing strings mean "no code"
    pub fn from_strings(percentage: f64, sbb: Option<&str>, vvn: Option<&str>) -> HabResult<Self> {
        let parse = |text: Option<&str>, f: fn(&str) -> HabResult<VegCode>| {
            text.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(f)
                .transpose()
        };
        Self::new(percentage, parse(sbb, VegCode::parse_sbb)?, parse(vvn, VegCode::parse_vvn)?)
    }

    /// Codes present on this part, SBB first
    pub fn codes(&self) -> SmallVec<[&VegCode; 2]> {
        self.sbb.iter().chain(self.vvn.iter()).collect()
    }

    pub fn has_codes(&self) -> bool {
        self.sbb.is_some() || self.vvn.is_some()
    }
}

/// Parts of one polygon must not exceed 100 % together
pub fn validate_parts(parts: &[VegTypeInfo]) -> HabResult<()> {
    let total: f64 = parts.iter().map(|p| p.percentage).sum();
    if total > 100.0 + PERCENTAGE_EPSILON {
        return Err(HabitatError::invariant(format!(
            "complex-part percentages sum to {:.2} (> 100)",
            total
        )));
    }
    Ok(())
}
