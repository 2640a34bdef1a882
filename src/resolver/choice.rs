//! Reduce one complex-part's proposals to a single `HabitatKeuze`
//!
//! Proposals are grouped by match level, most specific first. A group decides
//! as soon as one of its proposals is not FALSE; an all-FALSE group hands over to
//! the next one.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::error::HabResult;
use crate::resolver::types::{HabitatKeuze, HabitatVoorstel, KeuzeStatus, H0000};
use crate::utils::tristate::TriState;
use crate::vegetation::{MatchLevel, VegCode};

/// Stateless apart from the configured exclusion list
#[derive(Debug, Clone, Default)]
pub struct ChoiceResolver {
    excluded: FxHashSet<VegCode>,
}

impl ChoiceResolver {
    pub fn new(excluded: FxHashSet<VegCode>) -> Self {
        Self { excluded }
    }

    pub fn is_excluded(&self, code: &VegCode) -> bool {
        self.excluded.contains(code)
    }

    /// Decide the keuze for one complex-part of `percentage` percent
    ///
    /// Criteria and mosaic rules of every matching proposal must have been checked.
    pub fn resolve(&self, voorstellen: Vec<HabitatVoorstel>, percentage: f64) -> HabResult<HabitatKeuze> {
        if voorstellen.is_empty() {
            let status = KeuzeStatus::GeenOpgegevenVegtypen;
            return HabitatKeuze::sentinel(status, percentage, voorstellen, status.toelichting());
        }

        if !voorstellen.iter().any(HabitatVoorstel::is_match) {
            let status = KeuzeStatus::VegtypenNietInDeftabel;
            let codes = surveyed_codes(&voorstellen);
            let toelichting = format!("{} ({})", status.toelichting(), codes);
            return HabitatKeuze::sentinel(status, percentage, voorstellen, toelichting);
        }

        let excluded: Vec<String> = voorstellen
            .iter()
            .filter_map(|v| v.onderbouwend_vegtype.as_ref())
            .filter(|code| self.is_excluded(code))
            .map(|code| code.to_string())
            .collect();
        if !excluded.is_empty() {
            let status = KeuzeStatus::NietGeautomatiseerdVegtype;
            let toelichting = format!("{} ({})", status.toelichting(), excluded.join(", "));
            return HabitatKeuze::sentinel(status, percentage, voorstellen, toelichting);
        }

        // Most specific level first
        let mut groups: BTreeMap<MatchLevel, SmallVec<[usize; 4]>> = BTreeMap::new();
        for (idx, voorstel) in voorstellen.iter().enumerate().filter(|(_, v)| v.is_match()) {
            groups.entry(voorstel.match_level).or_default().push(idx);
        }

        for members in groups.values().rev() {
            let mut waar: SmallVec<[usize; 4]> = SmallVec::new();
            let mut postponed = false;
            let mut manual = false;

            for &idx in members {
                match voorstellen[idx].combined_evaluation()? {
                    TriState::True => waar.push(idx),
                    TriState::Postpone => postponed = true,
                    TriState::CannotAutomate => manual = true,
                    TriState::False => {}
                }
            }

            let mut habtypen: Vec<&str> = waar.iter().map(|&i| voorstellen[i].habtype.as_str()).collect();
            habtypen.sort_unstable();
            habtypen.dedup();

            match habtypen.len() {
                0 => {}
                // A table row can explicitly map to "no habitat"
                1 if habtypen[0] == H0000 => {
                    let status = KeuzeStatus::VoldoetNietAanHabtypevoorwaarden;
                    let toelichting = explain(status, &voorstellen, &waar);
                    let supporting = take(voorstellen, &waar);
                    return HabitatKeuze::sentinel(status, percentage, supporting, toelichting);
                }
                1 => {
                    let habtype = habtypen[0].to_string();
                    let kwaliteit = waar
                        .iter()
                        .map(|&i| voorstellen[i].kwaliteit)
                        .fold(voorstellen[waar[0]].kwaliteit, |best, k| best.best(k));
                    let toelichting = explain(KeuzeStatus::HabitattypeToegekend, &voorstellen, &waar);
                    let supporting = take(voorstellen, &waar);
                    return HabitatKeuze::toegekend(habtype, kwaliteit, percentage, supporting, toelichting);
                }
                _ => {
                    let status = KeuzeStatus::VoldoetAanMeerdereHabtypen;
                    let toelichting = explain(status, &voorstellen, &waar);
                    let supporting = take(voorstellen, &waar);
                    return HabitatKeuze::sentinel(status, percentage, supporting, toelichting);
                }
            }

            let status = if postponed {
                KeuzeStatus::WachtenOpMozaiek
            } else if manual {
                KeuzeStatus::NietGeautomatiseerdCriterium
            } else {
                continue;
            };
            let toelichting = explain(status, &voorstellen, members);
            let supporting = take(voorstellen, members);
            return HabitatKeuze::sentinel(status, percentage, supporting, toelichting);
        }

        let status = KeuzeStatus::VoldoetNietAanHabtypevoorwaarden;
        let all: Vec<usize> = (0..voorstellen.len()).filter(|&i| voorstellen[i].is_match()).collect();
        let toelichting = explain(status, &voorstellen, &all);
        HabitatKeuze::sentinel(status, percentage, voorstellen, toelichting)
    }
}

fn surveyed_codes(voorstellen: &[HabitatVoorstel]) -> String {
    let codes: Vec<String> = voorstellen
        .iter()
        .filter_map(|v| v.onderbouwend_vegtype.as_ref())
        .map(|code| format!("{} {}", code.family(), code))
        .collect();
    codes.join(", ")
}

fn explain(status: KeuzeStatus, voorstellen: &[HabitatVoorstel], indices: &[usize]) -> String {
    let mut text = status.toelichting().to_string();
    for &idx in indices {
        text.push_str("\n  - ");
        text.push_str(&voorstellen[idx].explain());
    }
    text
}

/// Keep the proposals at `indices`, in their original order
fn take(voorstellen: Vec<HabitatVoorstel>, indices: &[usize]) -> Vec<HabitatVoorstel> {
    voorstellen
        .into_iter()
        .enumerate()
        .filter(|(i, _)| indices.contains(i))
        .map(|(_, v)| v)
        .collect()
}
