//! Engine configuration
//!
//! One value, built once and passed to the classifier. Every field has a default;
//! a JSON file only needs the fields it changes.

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cohesion::{CohesionTier, MinimumAreaTable};
use crate::error::{HabResult, HabitatError};
use crate::mosaic::MozaiekThresholds;
use crate::vegetation::{CodeFamily, VegCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Qualifying surround (%) for a standard mosaic rule to hold
    pub mozaiek_threshold: f64,
    /// Lower threshold for rules that also count edges
    pub mozaiek_als_rand_threshold: f64,
    /// Known surround (%) below which a failing rule becomes CANNOT_AUTOMATE
    pub mozaiek_minimum_bedekking: f64,
    /// Boundary buffer distance (map units)
    pub mozaiek_buffer: f64,
    /// Cap on mosaic fixed-point passes
    pub max_mozaiek_iteraties: usize,

    pub minimum_oppervlak_default: f64,
    pub minimum_oppervlak_exceptions: FxHashMap<String, f64>,

    /// Functional cohesion tiers, applied per habitat type
    pub functionele_samenhang: Vec<CohesionTier>,

    pub niet_geautomatiseerde_sbb: Vec<String>,
    pub niet_geautomatiseerde_vvn: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let exceptions = [
            ("H6110", 10.0),
            ("H7220", 100.0),
            ("H9110", 1000.0),
            ("H9120", 1000.0),
            ("H9130", 1000.0),
            ("H9160", 1000.0),
            ("H9190", 1000.0),
            ("H91D0", 1000.0),
            ("H91E0", 1000.0),
            ("H91F0", 1000.0),
        ];

        Self {
            mozaiek_threshold: 95.0,
            mozaiek_als_rand_threshold: 25.0,
            mozaiek_minimum_bedekking: 90.0,
            mozaiek_buffer: 0.1,
            max_mozaiek_iteraties: 50,
            minimum_oppervlak_default: 100.0,
            minimum_oppervlak_exceptions: exceptions
                .iter()
                .map(|(h, m)| (h.to_string(), *m))
                .collect(),
            functionele_samenhang: vec![
                CohesionTier::new(100.0, None, 10.01),
                CohesionTier::new(90.0, None, 5.01),
                CohesionTier::new(50.0, None, 0.01),
            ],
            niet_geautomatiseerde_sbb: Vec::new(),
            niet_geautomatiseerde_vvn: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config: {:?}", path))?;
        let config = Self::from_json_str(&contents)
            .with_context(|| format!("Invalid engine config: {:?}", path))?;
        tracing::info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse engine config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HabResult<()> {
        let non_negative = [
            ("mozaiek_threshold", self.mozaiek_threshold),
            ("mozaiek_als_rand_threshold", self.mozaiek_als_rand_threshold),
            ("mozaiek_minimum_bedekking", self.mozaiek_minimum_bedekking),
            ("mozaiek_buffer", self.mozaiek_buffer),
            ("minimum_oppervlak_default", self.minimum_oppervlak_default),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(HabitatError::invariant(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if let Some((habtype, value)) = self
            .minimum_oppervlak_exceptions
            .iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(HabitatError::invariant(format!(
                "minimum area of {} must be >= 0, got {}",
                habtype, value
            )));
        }
        if self.max_mozaiek_iteraties == 0 {
            return Err(HabitatError::invariant("max_mozaiek_iteraties must be at least 1"));
        }
        if self.functionele_samenhang.is_empty() {
            return Err(HabitatError::invariant("functionele_samenhang needs at least one tier"));
        }
        self.functionele_samenhang.iter().try_for_each(CohesionTier::validate)?;

        if self.mozaiek_buffer == 0.0 {
            tracing::warn!("mozaiek_buffer is 0: every polygon will count itself as 100% of its surround");
        }
        Ok(())
    }

    pub fn mozaiek_thresholds(&self) -> MozaiekThresholds {
        MozaiekThresholds {
            threshold: self.mozaiek_threshold,
            als_rand_threshold: self.mozaiek_als_rand_threshold,
            minimum_bedekking: self.mozaiek_minimum_bedekking,
        }
    }

    pub fn minimum_area_table(&self) -> MinimumAreaTable {
        MinimumAreaTable::new(
            self.minimum_oppervlak_default,
            self.minimum_oppervlak_exceptions.clone(),
        )
    }

    /// Parsed exclusion list; a malformed code is an error
    pub fn excluded_codes(&self) -> HabResult<FxHashSet<VegCode>> {
        let sbb = self
            .niet_geautomatiseerde_sbb
            .iter()
            .map(|c| VegCode::parse(CodeFamily::Sbb, c));
        let vvn = self
            .niet_geautomatiseerde_vvn
            .iter()
            .map(|c| VegCode::parse(CodeFamily::Vvn, c));
        sbb.chain(vvn).collect()
    }
}
