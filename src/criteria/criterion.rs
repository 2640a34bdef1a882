//! Criterion trees ("mitsen")
//!
//! A closed set of variants evaluated by pattern matching. Leaves read one
//! attribute of the row and cache their verdict; combinators fold the cached
//! verdicts of their children with the tri-state algebra. Trees are cloned per
//! polygon, so a cached verdict always belongs to the row it was checked against.

use geo::{InteriorPoint, Intersects, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::criteria::attributes::{
    AttributeValue, CriterionRow, BODEM_ATTRIBUTE, FGR_ATTRIBUTE, LBK_ATTRIBUTE,
};
use crate::error::{HabResult, HabitatError};
use crate::utils::tristate::TriState;

/// Shown in explanations for a node that has not been checked
const NOT_EVALUATED_LABEL: &str = "NIET GEËVALUEERD";

// ============================================================================
// Leaves
// ============================================================================

/// Membership of the physical-geographic region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FgrCriterium {
    pub wanted_fgrtypen: Vec<String>,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

/// Membership of the soil unit; several units on one polygon is ambiguous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodemCriterium {
    pub wanted_bodemcodes: Vec<String>,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

/// Membership of the historic landscape type
///
/// Some LBK types can only rule a habitat out (`enkel_negatieven`) or only
/// confirm it (`enkel_positieven`); the verdict they cannot give becomes
/// CANNOT_AUTOMATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbkCriterium {
    pub wanted_lbktypen: Vec<String>,
    #[serde(default)]
    pub enkel_negatieven: bool,
    #[serde(default)]
    pub enkel_positieven: bool,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

/// A named criterion pinned by hand, optionally only inside a geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideCriterium {
    /// Display name of the criterion this replaces
    pub mitsnaam: String,
    pub truth_value: TriState,
    #[serde(skip)]
    pub override_geometry: Option<MultiPolygon<f64>>,
    #[serde(default)]
    pub truth_value_outside: Option<TriState>,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NietGeautomatiseerdCriterium {
    #[serde(default)]
    pub toelichting: String,
    #[serde(skip)]
    evaluation: Option<TriState>,
}

impl OverrideCriterium {
    /// Geometry and outside value come as a pair; POSTPONE is never a constant
    pub fn new(
        mitsnaam: impl Into<String>,
        truth_value: TriState,
        override_geometry: Option<MultiPolygon<f64>>,
        truth_value_outside: Option<TriState>,
    ) -> HabResult<Self> {
        let leaf = Self {
            mitsnaam: mitsnaam.into(),
            truth_value,
            override_geometry,
            truth_value_outside,
            evaluation: None,
        };
        leaf.validate()?;
        Ok(leaf)
    }

    fn validate(&self) -> HabResult<()> {
        if self.override_geometry.is_some() != self.truth_value_outside.is_some() {
            return Err(HabitatError::invariant(format!(
                "override of '{}' needs both an override geometry and a truth value outside it",
                self.mitsnaam
            )));
        }
        let postponed = self.truth_value == TriState::Postpone
            || self.truth_value_outside == Some(TriState::Postpone);
        if postponed {
            return Err(HabitatError::invariant(format!(
                "override of '{}' cannot be POSTPONE",
                self.mitsnaam
            )));
        }
        Ok(())
    }

    fn verdict(&self, row: &CriterionRow<'_>) -> HabResult<TriState> {
        let (geometry, outside) = match (&self.override_geometry, self.truth_value_outside) {
            (Some(geometry), Some(outside)) => (geometry, outside),
            _ => return Ok(self.truth_value),
        };

        // Any override part containing the polygon's interior point counts as inside
        let verdict = match row.geometry()?.interior_point() {
            Some(point) if geometry.0.iter().any(|part| part.intersects(&point)) => {
                self.truth_value
            }
            Some(_) => outside,
            None => TriState::CannotAutomate,
        };
        Ok(verdict)
    }
}

/// 0 values: FALSE, 1 value: membership, more: CANNOT_AUTOMATE, null: CANNOT_AUTOMATE
fn membership(value: &AttributeValue, wanted: &[String]) -> TriState {
    match value.as_codes() {
        None => TriState::CannotAutomate,
        Some(codes) => match codes.as_slice() {
            [] => TriState::False,
            [single] => wanted.iter().any(|w| w == single).into(),
            _ => TriState::CannotAutomate,
        },
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    /// No condition, always TRUE
    #[default]
    Geen,
    Fgr(FgrCriterium),
    Bodem(BodemCriterium),
    Lbk(LbkCriterium),
    En { sub_criteria: Vec<Criterion> },
    Of { sub_criteria: Vec<Criterion> },
    Niet { sub_criterium: Box<Criterion> },
    Override(OverrideCriterium),
    NietGeautomatiseerd(NietGeautomatiseerdCriterium),
}

impl Criterion {
    pub fn fgr(wanted: &[&str]) -> Self {
        Criterion::Fgr(FgrCriterium {
            wanted_fgrtypen: to_strings(wanted),
            evaluation: None,
        })
    }

    pub fn bodem(wanted: &[&str]) -> Self {
        Criterion::Bodem(BodemCriterium {
            wanted_bodemcodes: to_strings(wanted),
            evaluation: None,
        })
    }

    pub fn lbk(wanted: &[&str], enkel_negatieven: bool, enkel_positieven: bool) -> Self {
        Criterion::Lbk(LbkCriterium {
            wanted_lbktypen: to_strings(wanted),
            enkel_negatieven,
            enkel_positieven,
            evaluation: None,
        })
    }

    pub fn en(sub_criteria: Vec<Criterion>) -> HabResult<Self> {
        let node = Criterion::En { sub_criteria };
        node.validate()?;
        Ok(node)
    }

    pub fn of(sub_criteria: Vec<Criterion>) -> HabResult<Self> {
        let node = Criterion::Of { sub_criteria };
        node.validate()?;
        Ok(node)
    }

    pub fn niet(inner: Criterion) -> Self {
        Criterion::Niet {
            sub_criterium: Box::new(inner),
        }
    }

    pub fn niet_geautomatiseerd(toelichting: &str) -> Self {
        Criterion::NietGeautomatiseerd(NietGeautomatiseerdCriterium {
            toelichting: toelichting.to_string(),
            evaluation: None,
        })
    }

    /// Structural checks for trees that did not go through the constructors
    pub fn validate(&self) -> HabResult<()> {
        match self {
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => {
                if sub_criteria.is_empty() {
                    return Err(HabitatError::invariant(format!(
                        "logical node '{}' has no sub-criteria",
                        self.operator_name()
                    )));
                }
                sub_criteria.iter().try_for_each(Criterion::validate)
            }
            Criterion::Niet { sub_criterium } => sub_criterium.validate(),
            Criterion::Override(leaf) => leaf.validate(),
            _ => Ok(()),
        }
    }

    fn operator_name(&self) -> &'static str {
        match self {
            Criterion::En { .. } => "en",
            Criterion::Of { .. } => "of",
            _ => "",
        }
    }

    /// Evaluate against one row and cache the verdict on every node
    pub fn check(&mut self, row: &CriterionRow<'_>) -> HabResult<()> {
        match self {
            Criterion::Geen => {}
            Criterion::Fgr(leaf) => {
                leaf.evaluation = Some(membership(row.get(FGR_ATTRIBUTE)?, &leaf.wanted_fgrtypen));
            }
            Criterion::Bodem(leaf) => {
                leaf.evaluation = Some(membership(
                    row.get(BODEM_ATTRIBUTE)?,
                    &leaf.wanted_bodemcodes,
                ));
            }
            Criterion::Lbk(leaf) => {
                let verdict = match membership(row.get(LBK_ATTRIBUTE)?, &leaf.wanted_lbktypen) {
                    TriState::True if leaf.enkel_negatieven => TriState::CannotAutomate,
                    TriState::False if leaf.enkel_positieven => TriState::CannotAutomate,
                    other => other,
                };
                leaf.evaluation = Some(verdict);
            }
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => {
                if sub_criteria.is_empty() {
                    return Err(HabitatError::invariant("logical node has no sub-criteria"));
                }
                for sub in sub_criteria.iter_mut() {
                    sub.check(row)?;
                }
            }
            Criterion::Niet { sub_criterium } => sub_criterium.check(row)?,
            Criterion::Override(leaf) => {
                leaf.validate()?;
                leaf.evaluation = Some(leaf.verdict(row)?);
            }
            Criterion::NietGeautomatiseerd(leaf) => {
                leaf.evaluation = Some(TriState::CannotAutomate);
            }
        }
        Ok(())
    }

    /// Cached verdict; `NotYetEvaluated` when `check` has not run
    pub fn evaluation(&self) -> HabResult<TriState> {
        let cached = match self {
            Criterion::Geen => return Ok(TriState::True),
            Criterion::Fgr(leaf) => leaf.evaluation,
            Criterion::Bodem(leaf) => leaf.evaluation,
            Criterion::Lbk(leaf) => leaf.evaluation,
            Criterion::Override(leaf) => leaf.evaluation,
            Criterion::NietGeautomatiseerd(leaf) => leaf.evaluation,
            Criterion::En { sub_criteria } => {
                let values = sub_criteria
                    .iter()
                    .map(Criterion::evaluation)
                    .collect::<HabResult<Vec<_>>>()?;
                return Ok(TriState::all(values));
            }
            Criterion::Of { sub_criteria } => {
                let values = sub_criteria
                    .iter()
                    .map(Criterion::evaluation)
                    .collect::<HabResult<Vec<_>>>()?;
                return Ok(TriState::any(values));
            }
            Criterion::Niet { sub_criterium } => return Ok(!sub_criterium.evaluation()?),
        };
        cached.ok_or_else(|| HabitatError::NotYetEvaluated(format!("criterion '{}'", self)))
    }

    /// Forget every cached verdict
    pub fn reset(&mut self) {
        match self {
            Criterion::Geen => {}
            Criterion::Fgr(leaf) => leaf.evaluation = None,
            Criterion::Bodem(leaf) => leaf.evaluation = None,
            Criterion::Lbk(leaf) => leaf.evaluation = None,
            Criterion::Override(leaf) => leaf.evaluation = None,
            Criterion::NietGeautomatiseerd(leaf) => leaf.evaluation = None,
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => {
                sub_criteria.iter_mut().for_each(Criterion::reset);
            }
            Criterion::Niet { sub_criterium } => sub_criterium.reset(),
        }
    }

    /// Replace every node displayed as `replacement.mitsnaam`; returns the count
    pub fn apply_override(&mut self, replacement: &OverrideCriterium) -> usize {
        if !matches!(self, Criterion::Override(_)) && self.to_string() == replacement.mitsnaam {
            let mut leaf = replacement.clone();
            leaf.evaluation = None;
            *self = Criterion::Override(leaf);
            return 1;
        }
        match self {
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => sub_criteria
                .iter_mut()
                .map(|sub| sub.apply_override(replacement))
                .sum(),
            Criterion::Niet { sub_criterium } => sub_criterium.apply_override(replacement),
            _ => 0,
        }
    }

    /// Display name followed by the verdict of every evaluated node
    pub fn explain(&self) -> String {
        let label = self
            .evaluation()
            .map(|v| v.as_label())
            .unwrap_or(NOT_EVALUATED_LABEL);

        match self {
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => {
                let joiner = format!(" {} ", self.operator_name());
                let parts: Vec<String> = sub_criteria.iter().map(Criterion::explain).collect();
                format!("({}) ({})", parts.join(&joiner), label)
            }
            Criterion::Niet { sub_criterium } => {
                format!("niet [{}] ({})", sub_criterium.explain(), label)
            }
            _ => format!("{} ({})", self, label),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Geen => f.write_str("geen mits"),
            Criterion::Fgr(leaf) => write!(f, "mits in FGR {}", leaf.wanted_fgrtypen.join(" of ")),
            Criterion::Bodem(leaf) => {
                write!(f, "mits op bodem {}", leaf.wanted_bodemcodes.join(" of "))
            }
            Criterion::Lbk(leaf) => write!(f, "mits in LBK {}", leaf.wanted_lbktypen.join(" of ")),
            Criterion::En { sub_criteria } | Criterion::Of { sub_criteria } => {
                let joiner = format!(" {} ", self.operator_name());
                let parts: Vec<String> = sub_criteria.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(&joiner))
            }
            Criterion::Niet { sub_criterium } => write!(f, "niet {}", sub_criterium),
            Criterion::Override(leaf) => write!(f, "{} (handmatig)", leaf.mitsnaam),
            Criterion::NietGeautomatiseerd(leaf) if leaf.toelichting.is_empty() => {
                f.write_str("niet geautomatiseerd")
            }
            Criterion::NietGeautomatiseerd(leaf) => {
                write!(f, "niet geautomatiseerd: {}", leaf.toelichting)
            }
        }
    }
}
