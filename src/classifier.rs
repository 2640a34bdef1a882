//! Habitat Classifier - main coordinator for one survey
//!
//! 1. Match every complex-part against the definition table and check the
//!    criteria (`classify_parallel` does this step with rayon; every polygon
//!    works on its own cloned proposals)
//! 2. Surround percentages for polygons that carry a standard mosaic rule
//! 3. Mosaic fixed point: resolve all parts with neighbours unknown, then
//!    revisit WACHTEN_OP_MOZAIEK parts against the neighbours' keuzes of the
//!    previous pass until nothing waits or nothing changes
//! 4. Functional cohesion and minimum area per habitat type

use geo::{BoundingRect, MultiPolygon};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::cohesion::apply_minimum_area;
use crate::config::EngineConfig;
use crate::data::DefinitionTable;
use crate::error::{HabResult, HabitatError};
use crate::matcher::HabitatMatcher;
use crate::mosaic::{omringing_percentages, MozaiekThresholds, NeighborhoodProfile, NeighbourState};
use crate::resolver::{ChoiceResolver, HabitatKeuze, HabitatVoorstel, Kwaliteit};
use crate::survey::{PolygonId, SurveyPolygon};
use crate::utils::geometry::{expand_rect, SpatialIndex};

// ============================================================================
// Output
// ============================================================================

/// Summed share of one habitat type and quality within a polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HabitatAandeel {
    pub habtype: String,
    pub kwaliteit: Kwaliteit,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolygonResult {
    pub id: PolygonId,
    /// One keuze per complex-part, in survey order
    pub keuzes: Vec<HabitatKeuze>,
    pub habitat_percentages: Vec<HabitatAandeel>,
}

impl PolygonResult {
    fn new(id: PolygonId, keuzes: Vec<HabitatKeuze>) -> Self {
        let mut habitat_percentages: Vec<HabitatAandeel> = Vec::new();
        for keuze in &keuzes {
            match habitat_percentages
                .iter_mut()
                .find(|a| a.habtype == keuze.habtype() && a.kwaliteit == keuze.kwaliteit())
            {
                Some(aandeel) => aandeel.percentage += keuze.percentage(),
                None => habitat_percentages.push(HabitatAandeel {
                    habtype: keuze.habtype().to_string(),
                    kwaliteit: keuze.kwaliteit(),
                    percentage: keuze.percentage(),
                }),
            }
        }
        Self {
            id,
            keuzes,
            habitat_percentages,
        }
    }

    /// Percentage of the polygon assigned to `habtype` (any quality)
    pub fn percentage_of(&self, habtype: &str) -> f64 {
        self.habitat_percentages
            .iter()
            .filter(|a| a.habtype == habtype)
            .map(|a| a.percentage)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    /// Same order as the input polygons
    pub results: Vec<PolygonResult>,
    /// Mosaic passes run
    pub passes: usize,
    /// False when parts were still waiting at the end
    pub converged: bool,
    /// Polygons with parts left at WACHTEN_OP_MOZAIEK
    pub unresolved: Vec<PolygonId>,
    /// Parts demoted by the minimum-area check
    pub demoted: usize,
}

impl ClassificationReport {
    pub fn result(&self, id: PolygonId) -> Option<&PolygonResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

// ============================================================================
// Internal state
// ============================================================================

/// A complex-part with criteria checked and neighbour-free rules evaluated
struct PreparedPart {
    percentage: f64,
    voorstellen: Vec<HabitatVoorstel>,
    needs_neighbours: bool,
}

/// Raw surround of one polygon: its own share of the band and each neighbour's
struct Surround {
    self_percentage: f64,
    neighbours: Vec<(usize, f64)>,
}

impl Surround {
    fn profile(&self, snapshot: &[Option<Vec<HabitatKeuze>>]) -> NeighborhoodProfile {
        let states: Vec<NeighbourState<'_>> = self
            .neighbours
            .iter()
            .map(|&(idx, omringing_percentage)| NeighbourState {
                omringing_percentage,
                keuzes: snapshot[idx].as_deref(),
            })
            .collect();
        NeighborhoodProfile::from_neighbours(self.self_percentage, &states)
    }
}

struct FixedPoint {
    keuzes: Vec<Vec<HabitatKeuze>>,
    passes: usize,
    converged: bool,
    pending: Vec<usize>,
}

// ============================================================================
// Classifier
// ============================================================================

pub struct HabitatClassifier {
    matcher: HabitatMatcher,
    resolver: ChoiceResolver,
    thresholds: MozaiekThresholds,
    config: EngineConfig,
}

impl HabitatClassifier {
    /// Validate the config and build matcher and resolver
    pub fn new(table: DefinitionTable, config: EngineConfig) -> HabResult<Self> {
        config.validate()?;
        let resolver = ChoiceResolver::new(config.excluded_codes()?);
        let thresholds = config.mozaiek_thresholds();
        tracing::info!(
            "Habitat classifier ready ({} table rows, mozaiek buffer {}, max {} passes)",
            table.len(),
            config.mozaiek_buffer,
            config.max_mozaiek_iteraties
        );
        Ok(Self {
            matcher: HabitatMatcher::new(table),
            resolver,
            thresholds,
            config,
        })
    }

    pub fn matcher(&self) -> &HabitatMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify a survey (sequential)
    pub fn classify(&self, polygons: &[SurveyPolygon]) -> HabResult<ClassificationReport> {
        self.run(polygons, false)
    }

    /// Classify a survey; matching, criteria and surround overlays run with rayon
    pub fn classify_parallel(&self, polygons: &[SurveyPolygon]) -> HabResult<ClassificationReport> {
        self.run(polygons, true)
    }

    fn run(&self, polygons: &[SurveyPolygon], parallel: bool) -> HabResult<ClassificationReport> {
        let mut seen: FxHashSet<PolygonId> = FxHashSet::default();
        if let Some(duplicate) = polygons.iter().find(|p| !seen.insert(p.id())) {
            return Err(HabitatError::invariant(format!(
                "polygon id {} occurs more than once",
                duplicate.id()
            )));
        }
        tracing::info!("Classifying {} polygons", polygons.len());

        let prepared = map_indices(polygons.len(), parallel, |idx| self.prepare_polygon(&polygons[idx]))?;

        let index = SpatialIndex::new(polygons.iter().enumerate().map(|(idx, p)| (idx, p.geometry())));
        let surroundings = map_indices(polygons.len(), parallel, |idx| {
            if prepared[idx].iter().any(|part| part.needs_neighbours) {
                self.surround(idx, polygons, &index).map(Some)
            } else {
                Ok(None)
            }
        })?;

        let FixedPoint {
            mut keuzes,
            passes,
            converged,
            pending,
        } = self.fixed_point(&prepared, &surroundings)?;

        let unresolved: Vec<PolygonId> = pending.iter().map(|&idx| polygons[idx].id()).collect();
        if !converged {
            tracing::warn!(
                "Mosaic rules did not converge after {} passes; waiting polygons: {:?}",
                passes,
                unresolved
            );
            let note = format!(
                "Mozaiekregel onbeslist na {} iteraties: omliggende vlakken hebben geen habitattype of wachten (indirect) op dit vlak.",
                passes
            );
            for &idx in &pending {
                keuzes[idx]
                    .iter_mut()
                    .filter(|k| k.is_waiting())
                    .for_each(|k| k.append_toelichting(&note));
            }
        }

        let demoted = apply_minimum_area(
            polygons,
            &mut keuzes,
            &self.config.functionele_samenhang,
            &self.config.minimum_area_table(),
        )?;

        let results = polygons
            .iter()
            .zip(keuzes)
            .map(|(polygon, keuzes)| PolygonResult::new(polygon.id(), keuzes))
            .collect();

        Ok(ClassificationReport {
            results,
            passes,
            converged,
            unresolved,
            demoted,
        })
    }

    /// Proposals per complex-part with criteria checked
    ///
    /// Rules that do not look at neighbours are evaluated here too.
    fn prepare_polygon(&self, polygon: &SurveyPolygon) -> HabResult<Vec<PreparedPart>> {
        if polygon.vegtypen().is_empty() {
            return Ok(vec![PreparedPart {
                percentage: 100.0,
                voorstellen: Vec::new(),
                needs_neighbours: false,
            }]);
        }

        let row = polygon.criterion_row();
        let no_neighbours = NeighborhoodProfile::empty();
        polygon
            .vegtypen()
            .iter()
            .map(|info| {
                let mut voorstellen = self.matcher.proposals_for_part(info);
                let mut needs_neighbours = false;
                for voorstel in voorstellen.iter_mut().filter(|v| v.is_match()) {
                    voorstel.mits.check(&row)?;
                    if voorstel.mozaiek.requires_neighbours() {
                        needs_neighbours = true;
                    } else {
                        voorstel.mozaiek.check(&no_neighbours, &self.thresholds)?;
                    }
                }
                Ok(PreparedPart {
                    percentage: info.percentage,
                    voorstellen,
                    needs_neighbours,
                })
            })
            .collect()
    }

    fn surround(&self, idx: usize, polygons: &[SurveyPolygon], index: &SpatialIndex<usize>) -> HabResult<Surround> {
        let target = polygons[idx].geometry();
        let buffer = self.config.mozaiek_buffer;
        let mut surround = Surround {
            self_percentage: 0.0,
            neighbours: Vec::new(),
        };
        let Some(rect) = target.bounding_rect() else {
            return Ok(surround);
        };

        let mut candidates: Vec<(usize, &MultiPolygon<f64>)> = index
            .candidates(&expand_rect(rect, buffer))
            .into_iter()
            .map(|j| (j, polygons[j].geometry()))
            .collect();
        candidates.sort_unstable_by_key(|(j, _)| *j);

        for (j, pct) in omringing_percentages(target, &candidates, buffer)? {
            if j == idx {
                surround.self_percentage = pct;
            } else {
                surround.neighbours.push((j, pct));
            }
        }
        Ok(surround)
    }

    /// Check the neighbour-dependent rules of one part against `profile`, then resolve
    fn resolve_part(&self, part: &PreparedPart, profile: Option<&NeighborhoodProfile>) -> HabResult<HabitatKeuze> {
        let mut voorstellen = part.voorstellen.clone();
        if part.needs_neighbours {
            let empty = NeighborhoodProfile::empty();
            let profile = profile.unwrap_or(&empty);
            for voorstel in voorstellen
                .iter_mut()
                .filter(|v| v.is_match() && v.mozaiek.requires_neighbours())
            {
                voorstel.mozaiek.check(profile, &self.thresholds)?;
            }
        }
        self.resolver.resolve(voorstellen, part.percentage)
    }

    /// Jacobi-style passes: every pass reads the keuzes of the previous one
    fn fixed_point(&self, prepared: &[Vec<PreparedPart>], surroundings: &[Option<Surround>]) -> HabResult<FixedPoint> {
        let n = prepared.len();
        let mut keuzes: Vec<Option<Vec<HabitatKeuze>>> = vec![None; n];
        let mut pending: Vec<usize> = (0..n).collect();
        let mut passes = 0;
        let mut converged = true;

        while !pending.is_empty() {
            if passes == self.config.max_mozaiek_iteraties {
                converged = false;
                break;
            }
            passes += 1;

            let mut updates: Vec<(usize, Vec<HabitatKeuze>)> = Vec::with_capacity(pending.len());
            for &idx in &pending {
                let profile = surroundings[idx].as_ref().map(|s| s.profile(&keuzes));
                let previous = keuzes[idx].as_deref();
                let parts = prepared[idx]
                    .iter()
                    .enumerate()
                    .map(|(i, part)| match previous.and_then(|prev| prev.get(i)) {
                        Some(done) if !done.is_waiting() => Ok(done.clone()),
                        _ => self.resolve_part(part, profile.as_ref()),
                    })
                    .collect::<HabResult<Vec<_>>>()?;
                updates.push((idx, parts));
            }

            let mut changed = false;
            for (idx, new) in updates {
                changed |= keuzes[idx].as_deref().map_or(true, |old| !same_outcome(old, &new));
                keuzes[idx] = Some(new);
            }

            pending = (0..n)
                .filter(|&idx| keuzes[idx].iter().flatten().any(HabitatKeuze::is_waiting))
                .collect();
            tracing::debug!("Mosaic pass {}: {} polygons waiting", passes, pending.len());

            if !changed && !pending.is_empty() {
                converged = false;
                break;
            }
        }

        Ok(FixedPoint {
            keuzes: keuzes.into_iter().map(Option::unwrap_or_default).collect(),
            passes,
            converged,
            pending,
        })
    }
}

fn same_outcome(old: &[HabitatKeuze], new: &[HabitatKeuze]) -> bool {
    old.len() == new.len()
        && old.iter().zip(new).all(|(a, b)| {
            a.status() == b.status() && a.habtype() == b.habtype() && a.kwaliteit() == b.kwaliteit()
        })
}

fn map_indices<T, F>(len: usize, parallel: bool, f: F) -> HabResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> HabResult<T> + Sync + Send,
{
    if parallel {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{AttributeRow, Criterion, FGR_ATTRIBUTE};
    use crate::data::DefinitionRow;
    use crate::mosaic::MosaicRule;
    use crate::resolver::{KeuzeStatus, H0000, HXXXX};
    use crate::vegetation::{CodeFamily, VegCode, VegTypeInfo};
    use geo::polygon;

    fn row(habtype: &str, code: &str, mits: Criterion) -> DefinitionRow {
        DefinitionRow {
            habtype: habtype.to_string(),
            kwaliteit: Kwaliteit::Goed,
            code: VegCode::parse(CodeFamily::Vvn, code).unwrap(),
            mits,
            mozaiek: MosaicRule::Geen,
            source_row: 0,
        }
    }

    fn square(id: u64, x0: f64, vvn: &str) -> SurveyPolygon {
        let shape = MultiPolygon::new(vec![polygon![
            (x: x0, y: 0.0), (x: x0 + 20.0, y: 0.0), (x: x0 + 20.0, y: 20.0), (x: x0, y: 20.0),
        ]]);
        let parts = vec![VegTypeInfo::from_strings(100.0, None, Some(vvn)).unwrap()];
        SurveyPolygon::new(id, shape, parts)
            .unwrap()
            .with_attributes(AttributeRow::new().with_text(FGR_ATTRIBUTE, "Duinen"))
    }

    fn classifier() -> HabitatClassifier {
        let table = DefinitionTable::new(vec![
            row("H2130", "14aa1", Criterion::fgr(&["Duinen"])),
            row("H4030", "20aa1", Criterion::fgr(&["Hogere zandgronden"])),
        ])
        .unwrap();
        HabitatClassifier::new(table, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_criteria_decide_assignment() {
        let report = classifier()
            .classify(&[square(1, 0.0, "14aa1"), square(2, 100.0, "20aa1")])
            .unwrap();
        assert!(report.converged);
        assert_eq!(report.passes, 1);
        assert_eq!(report.result(1).unwrap().keuzes[0].habtype(), "H2130");
        let rejected = &report.result(2).unwrap().keuzes[0];
        assert_eq!(rejected.status(), KeuzeStatus::VoldoetNietAanHabtypevoorwaarden);
        assert_eq!(rejected.habtype(), H0000);
    }

    #[test]
    fn test_empty_polygon_and_unknown_code() {
        let empty = SurveyPolygon::new(3, MultiPolygon::new(vec![]), Vec::new()).unwrap();
        let report = classifier().classify(&[empty, square(4, 0.0, "31")]).unwrap();

        let keuzes = &report.result(3).unwrap().keuzes;
        assert_eq!(keuzes.len(), 1);
        assert_eq!(keuzes[0].status(), KeuzeStatus::GeenOpgegevenVegtypen);
        assert_eq!(keuzes[0].percentage(), 100.0);

        let keuze = &report.result(4).unwrap().keuzes[0];
        assert_eq!(keuze.status(), KeuzeStatus::VegtypenNietInDeftabel);
    }

    #[test]
    fn test_habitat_percentages_summed() {
        let shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 20.0), (x: 0.0, y: 20.0),
        ]]);
        let parts = vec![
            VegTypeInfo::from_strings(60.0, None, Some("14aa1")).unwrap(),
            VegTypeInfo::from_strings(30.0, None, Some("14aa1")).unwrap(),
            VegTypeInfo::from_strings(10.0, None, Some("31")).unwrap(),
        ];
        let polygon = SurveyPolygon::new(5, shape, parts)
            .unwrap()
            .with_attributes(AttributeRow::new().with_text(FGR_ATTRIBUTE, "Duinen"));
        let report = classifier().classify(&[polygon]).unwrap();
        let result = report.result(5).unwrap();
        assert_eq!(result.habitat_percentages.len(), 2);
        assert_eq!(result.percentage_of("H2130"), 90.0);
        assert_eq!(result.percentage_of(H0000), 10.0);
        assert_eq!(result.percentage_of(HXXXX), 0.0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = classifier().classify(&[square(1, 0.0, "14aa1"), square(1, 100.0, "14aa1")]);
        assert!(matches!(result, Err(HabitatError::Invariant(_))));
    }

    #[test]
    fn test_missing_attribute_propagates() {
        let shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 20.0), (x: 0.0, y: 20.0),
        ]]);
        let parts = vec![VegTypeInfo::from_strings(100.0, None, Some("14aa1")).unwrap()];
        let polygon = SurveyPolygon::new(9, shape, parts).unwrap();
        let result = classifier().classify(&[polygon]);
        assert!(matches!(result, Err(HabitatError::MissingAttribute(_))));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let polygons: Vec<SurveyPolygon> = (0..20)
            .map(|i| square(i, i as f64 * 50.0, if i % 2 == 0 { "14aa1" } else { "20aa1" }))
            .collect();
        let c = classifier();
        let sequential = c.classify(&polygons).unwrap();
        let parallel = c.classify_parallel(&polygons).unwrap();
        for (a, b) in sequential.results.iter().zip(&parallel.results) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.habitat_percentages, b.habitat_percentages);
        }
    }
}
