//! Mosaic rules ("mozaiekregels")
//!
//! A standard rule holds when enough of a polygon's surround carries a
//! qualifying habitat type. The qualifying table codes are determined once from
//! the definition table rows of that habitat type; per polygon only the
//! neighbourhood profile changes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::DefinitionRow;
use crate::error::{HabResult, HabitatError};
use crate::mosaic::neighborhood::{NeighborhoodProfile, OmringingEntry};
use crate::resolver::types::Kwaliteit;
use crate::utils::tristate::TriState;
use crate::vegetation::VegCode;

const SCORE_EPSILON: f64 = 1e-9;

/// Thresholds shared by every standard rule, taken from the engine config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MozaiekThresholds {
    /// Qualifying surround needed for TRUE
    pub threshold: f64,
    /// Lower threshold for rules that also count edges
    pub als_rand_threshold: f64,
    /// Known surround below this leaves room for CANNOT_AUTOMATE
    pub minimum_bedekking: f64,
}

impl Default for MozaiekThresholds {
    fn default() -> Self {
        Self {
            threshold: 95.0,
            als_rand_threshold: 25.0,
            minimum_bedekking: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandaardMozaiekregel {
    #[serde(default)]
    pub kwalificerend_habtype: Option<String>,
    /// Explicit codes, or the ones determined from the table for the habitat type
    #[serde(default)]
    pub kwalificerende_vegtypen: Option<Vec<VegCode>>,
    /// Also count table rows that have a mosaic rule themselves
    #[serde(default)]
    pub ook_mozaiekvegetaties: bool,
    #[serde(default)]
    pub alleen_goede_kwaliteit: bool,
    /// Also hold when the surround only forms an edge (lower threshold)
    #[serde(default)]
    pub ook_als_rand_langs: bool,
    #[serde(skip)]
    evaluation: Option<TriState>,
    #[serde(skip)]
    score: Option<f64>,
}

impl StandaardMozaiekregel {
    /// Rule qualifying on a habitat type; codes follow from the table
    pub fn for_habtype(
        habtype: &str,
        ook_mozaiekvegetaties: bool,
        alleen_goede_kwaliteit: bool,
        ook_als_rand_langs: bool,
    ) -> Self {
        Self {
            kwalificerend_habtype: Some(habtype.to_string()),
            kwalificerende_vegtypen: None,
            ook_mozaiekvegetaties,
            alleen_goede_kwaliteit,
            ook_als_rand_langs,
            evaluation: None,
            score: None,
        }
    }

    /// Rule qualifying on an explicit list of table codes
    pub fn for_vegtypen(vegtypen: Vec<VegCode>, ook_als_rand_langs: bool) -> Self {
        Self {
            kwalificerend_habtype: None,
            kwalificerende_vegtypen: Some(vegtypen),
            ook_mozaiekvegetaties: true,
            alleen_goede_kwaliteit: false,
            ook_als_rand_langs,
            evaluation: None,
            score: None,
        }
    }

    fn validate(&self) -> HabResult<()> {
        if self.kwalificerend_habtype.is_none() && self.kwalificerende_vegtypen.is_none() {
            return Err(HabitatError::invariant(
                "mozaiekregel needs a qualifying habitat type or qualifying vegetation types",
            ));
        }
        Ok(())
    }

    /// Fill the qualifying codes from `rows`, which must all be of the qualifying type
    ///
    /// No-op for rules with an explicit code list.
    pub fn determine_kwalificerende_vegtypen(&mut self, rows: &[&DefinitionRow]) -> HabResult<()> {
        let habtype = match &self.kwalificerend_habtype {
            Some(habtype) => habtype,
            None => return Ok(()),
        };

        if let Some(foreign) = rows.iter().find(|row| &row.habtype != habtype) {
            return Err(HabitatError::invariant(format!(
                "mozaiekregel for {} was given rows of {}; filter the table on {} first",
                habtype, foreign.habtype, habtype
            )));
        }

        let mut codes: Vec<VegCode> = Vec::new();
        for row in rows {
            let is_mozaiek_vegetatie = !matches!(row.mozaiek, MosaicRule::Geen);
            if is_mozaiek_vegetatie && !self.ook_mozaiekvegetaties {
                continue;
            }
            if self.alleen_goede_kwaliteit && row.kwaliteit != Kwaliteit::Goed {
                continue;
            }
            if !codes.contains(&row.code) {
                codes.push(row.code.clone());
            }
        }
        self.kwalificerende_vegtypen = Some(codes);
        Ok(())
    }

    fn qualifies(&self, entry: &OmringingEntry, codes: &[VegCode]) -> bool {
        if entry.is_sentinel() {
            return false;
        }
        if self.alleen_goede_kwaliteit && entry.kwaliteit != Kwaliteit::Goed {
            return false;
        }
        if let Some(habtype) = &self.kwalificerend_habtype {
            if &entry.habtype != habtype {
                return false;
            }
        }
        entry.vegcodes.iter().any(|code| codes.contains(code))
    }

    fn evaluate(&mut self, profile: &NeighborhoodProfile, thresholds: &MozaiekThresholds) -> HabResult<()> {
        self.validate()?;
        let codes = self.kwalificerende_vegtypen.as_deref().ok_or_else(|| {
            HabitatError::invariant(format!(
                "qualifying vegetation types of '{}' not determined",
                self
            ))
        })?;

        if profile.has_pending() {
            self.score = None;
            self.evaluation = Some(TriState::Postpone);
            return Ok(());
        }

        let score = profile.score_where(|entry| self.qualifies(entry, codes));
        let needed = if self.ook_als_rand_langs {
            thresholds.threshold.min(thresholds.als_rand_threshold)
        } else {
            thresholds.threshold
        };

        let verdict = if score + SCORE_EPSILON >= needed {
            TriState::True
        } else {
            // The unmapped remainder may still qualify when too little is known
            let unknown_rest = if profile.coverage() < thresholds.minimum_bedekking {
                100.0 - profile.coverage()
            } else {
                0.0
            };
            if score + unknown_rest + SCORE_EPSILON >= needed {
                TriState::CannotAutomate
            } else {
                TriState::False
            }
        };

        self.score = Some(score);
        self.evaluation = Some(verdict);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NietGeimplementeerdeMozaiekregel {
    #[serde(default)]
    pub beschrijving: String,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

impl NietGeimplementeerdeMozaiekregel {
    pub fn new(beschrijving: &str) -> Self {
        Self {
            beschrijving: beschrijving.to_string(),
            evaluation: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MosaicRule {
    /// No rule, always TRUE
    #[default]
    Geen,
    Standaard(StandaardMozaiekregel),
    NietGeimplementeerd(NietGeimplementeerdeMozaiekregel),
}

impl MosaicRule {
    pub fn validate(&self) -> HabResult<()> {
        match self {
            MosaicRule::Standaard(rule) => rule.validate(),
            _ => Ok(()),
        }
    }

    /// Only standard rules look at neighbours
    pub fn requires_neighbours(&self) -> bool {
        matches!(self, MosaicRule::Standaard(_))
    }

    /// Evaluate against one neighbourhood profile and cache the verdict
    pub fn check(&mut self, profile: &NeighborhoodProfile, thresholds: &MozaiekThresholds) -> HabResult<()> {
        match self {
            MosaicRule::Geen => Ok(()),
            MosaicRule::Standaard(rule) => rule.evaluate(profile, thresholds),
            MosaicRule::NietGeimplementeerd(rule) => {
                rule.evaluation = Some(TriState::CannotAutomate);
                Ok(())
            }
        }
    }

    pub fn evaluation(&self) -> HabResult<TriState> {
        let cached = match self {
            MosaicRule::Geen => return Ok(TriState::True),
            MosaicRule::Standaard(rule) => rule.evaluation,
            MosaicRule::NietGeimplementeerd(rule) => rule.evaluation,
        };
        cached.ok_or_else(|| HabitatError::NotYetEvaluated(format!("'{}'", self)))
    }

    pub fn reset(&mut self) {
        match self {
            MosaicRule::Geen => {}
            MosaicRule::Standaard(rule) => {
                rule.evaluation = None;
                rule.score = None;
            }
            MosaicRule::NietGeimplementeerd(rule) => rule.evaluation = None,
        }
    }

    /// Qualifying surround found by the last check
    pub fn score(&self) -> Option<f64> {
        match self {
            MosaicRule::Standaard(rule) => rule.score,
            _ => None,
        }
    }

    pub fn explain(&self) -> String {
        let label = self
            .evaluation()
            .map(|v| v.as_label())
            .unwrap_or("NIET GEËVALUEERD");
        match self.score() {
            Some(score) => format!("{} ({}, {:.1}% kwalificerend omringd)", self, label, score),
            None => format!("{} ({})", self, label),
        }
    }
}

impl fmt::Display for StandaardMozaiekregel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mozaiekregel: omringd door ")?;
        match (&self.kwalificerend_habtype, &self.kwalificerende_vegtypen) {
            (Some(habtype), _) => f.write_str(habtype)?,
            (None, Some(codes)) => {
                let names: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                write!(f, "vegetatietypen {}", names.join(", "))?;
            }
            (None, None) => f.write_str("?")?,
        }
        if self.alleen_goede_kwaliteit {
            f.write_str(", alleen goede kwaliteit")?;
        }
        if self.ook_mozaiekvegetaties {
            f.write_str(", ook mozaiekvegetaties")?;
        }
        if self.ook_als_rand_langs {
            f.write_str(", ook als rand")?;
        }
        Ok(())
    }
}

impl fmt::Display for MosaicRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MosaicRule::Geen => f.write_str("geen mozaiekregel"),
            MosaicRule::Standaard(rule) => write!(f, "{}", rule),
            MosaicRule::NietGeimplementeerd(rule) => {
                write!(f, "mozaiekregel niet geautomatiseerd: {}", rule.beschrijving)
            }
        }
    }
}
