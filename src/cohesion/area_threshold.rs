//! Minimum area per habitat type
//!
//! Assigned habitat types are clustered per type (functional cohesion). A
//! cluster counts `area × share / 100` of each member polygon; clusters below the
//! minimum of their habitat type lose the assignment.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::cohesion::clusterer::{functional_cohesion_clusters, ClusterInput, CohesionTier};
use crate::error::{HabResult, HabitatError};
use crate::resolver::types::HabitatKeuze;
use crate::survey::SurveyPolygon;

/// Tolerance on the area comparison, so a cluster at exactly the minimum stays
const AREA_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct MinimumAreaTable {
    default: f64,
    exceptions: FxHashMap<String, f64>,
}

impl MinimumAreaTable {
    pub fn new(default: f64, exceptions: FxHashMap<String, f64>) -> Self {
        Self { default, exceptions }
    }

    pub fn minimum_for(&self, habtype: &str) -> f64 {
        self.exceptions.get(habtype).copied().unwrap_or(self.default)
    }
}

/// Demote assigned keuzes whose cluster is too small; returns the number demoted
///
/// `keuzes[i]` holds the complex-part keuzes of `polygons[i]`.
pub fn apply_minimum_area(
    polygons: &[SurveyPolygon],
    keuzes: &mut [Vec<HabitatKeuze>],
    tiers: &[CohesionTier],
    minimum: &MinimumAreaTable,
) -> HabResult<usize> {
    if polygons.len() != keuzes.len() {
        return Err(HabitatError::invariant(format!(
            "{} polygons but {} keuze lists",
            polygons.len(),
            keuzes.len()
        )));
    }

    let habtypen: BTreeSet<String> = keuzes
        .iter()
        .flatten()
        .filter(|k| k.is_toegekend())
        .map(|k| k.habtype().to_string())
        .collect();

    let mut demoted = 0;
    for habtype in habtypen {
        // Share of each polygon carrying this habitat type
        let shares: Vec<f64> = keuzes
            .iter()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|k| k.is_toegekend() && k.habtype() == habtype)
                    .map(HabitatKeuze::percentage)
                    .sum()
            })
            .collect();

        let inputs: Vec<ClusterInput<'_, usize>> = polygons
            .iter()
            .zip(&shares)
            .enumerate()
            .filter(|(_, (_, share))| **share > 0.0)
            .map(|(idx, (polygon, share))| ClusterInput {
                key: idx,
                geometry: polygon.geometry(),
                percentage: *share,
            })
            .collect();

        let required = minimum.minimum_for(&habtype);
        for cluster in functional_cohesion_clusters(&inputs, tiers) {
            let area: f64 = cluster
                .iter()
                .map(|&idx| polygons[idx].area() * shares[idx] / 100.0)
                .sum();
            if area + AREA_EPSILON >= required {
                continue;
            }

            tracing::debug!(
                "{} cluster of {} polygons: {:.2} < {:.2}, demoting",
                habtype,
                cluster.len(),
                area,
                required
            );
            for &idx in &cluster {
                for keuze in keuzes[idx].iter_mut() {
                    if keuze.habtype() == habtype && keuze.demote_minimum_area(area, required) {
                        demoted += 1;
                    }
                }
            }
        }
    }

    Ok(demoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::types::{KeuzeStatus, Kwaliteit, H0000};
    use crate::vegetation::VegTypeInfo;
    use geo::{polygon, MultiPolygon};

    fn rect_polygon(id: u64, x0: f64, width: f64, height: f64) -> SurveyPolygon {
        let shape = MultiPolygon::new(vec![polygon![
            (x: x0, y: 0.0), (x: x0 + width, y: 0.0), (x: x0 + width, y: height), (x: x0, y: height),
        ]]);
        let parts = vec![VegTypeInfo::from_strings(100.0, Some("14a1"), None).unwrap()];
        SurveyPolygon::new(id, shape, parts).unwrap()
    }

    fn assigned(habtype: &str, percentage: f64) -> HabitatKeuze {
        HabitatKeuze::toegekend(habtype, Kwaliteit::Goed, percentage, Vec::new(), "").unwrap()
    }

    fn table() -> MinimumAreaTable {
        let mut exceptions = FxHashMap::default();
        exceptions.insert("H6110".to_string(), 10.0);
        MinimumAreaTable::new(100.0, exceptions)
    }

    fn tiers() -> Vec<CohesionTier> {
        vec![CohesionTier::new(100.0, None, 10.01), CohesionTier::new(50.0, None, 0.01)]
    }

    #[test]
    fn test_minimum_lookup() {
        assert_eq!(table().minimum_for("H6110"), 10.0);
        assert_eq!(table().minimum_for("H4030"), 100.0);
    }

    #[test]
    fn test_exact_minimum_is_kept() {
        let polygons = vec![rect_polygon(1, 0.0, 10.0, 10.0)];
        let mut keuzes = vec![vec![assigned("H4030", 100.0)]];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert_eq!(demoted, 0);
        assert!(keuzes[0][0].is_toegekend());
    }

    #[test]
    fn test_one_unit_below_is_demoted() {
        let polygons = vec![rect_polygon(1, 0.0, 9.9, 10.0)];
        let mut keuzes = vec![vec![assigned("H4030", 100.0)]];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert_eq!(demoted, 1);
        assert_eq!(keuzes[0][0].status(), KeuzeStatus::MinimumOppNietGehaald);
        assert_eq!(keuzes[0][0].habtype(), H0000);
    }

    #[test]
    fn test_share_counts_partially() {
        // 200 m2 at 50% is exactly 100
        let polygons = vec![rect_polygon(1, 0.0, 20.0, 10.0)];
        let mut keuzes = vec![vec![assigned("H4030", 50.0), assigned("H2130", 50.0)]];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert_eq!(demoted, 0);
    }

    #[test]
    fn test_growing_polygon_undemotes_parts_in_turn() {
        // Parts of 1/2 and 1/3: kept from 2x resp. 3x the minimum onwards
        let run = |width: f64| {
            let polygons = vec![rect_polygon(1, 0.0, width, 10.0)];
            let mut keuzes = vec![vec![assigned("H4030", 50.0), assigned("H2130", 100.0 / 3.0)]];
            apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
            (keuzes[0][0].is_toegekend(), keuzes[0][1].is_toegekend())
        };
        assert_eq!(run(15.0), (false, false));
        assert_eq!(run(20.0), (true, false));
        assert_eq!(run(30.0), (true, true));
    }

    #[test]
    fn test_cluster_lifts_small_polygons() {
        // Three 40 m2 polygons 5 apart: each alone too small, together 120
        let polygons = vec![
            rect_polygon(1, 0.0, 4.0, 10.0),
            rect_polygon(2, 9.0, 4.0, 10.0),
            rect_polygon(3, 18.0, 4.0, 10.0),
        ];
        let mut keuzes = vec![
            vec![assigned("H4030", 100.0)],
            vec![assigned("H4030", 100.0)],
            vec![assigned("H4030", 100.0)],
        ];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert_eq!(demoted, 0);

        // Only the 50% tier with its small buffer applies: no longer connected
        let mut keuzes = vec![
            vec![assigned("H4030", 60.0)],
            vec![assigned("H4030", 60.0)],
            vec![assigned("H4030", 60.0)],
        ];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert_eq!(demoted, 3);
    }

    #[test]
    fn test_other_habtypes_untouched() {
        let polygons = vec![rect_polygon(1, 0.0, 4.0, 4.0)];
        let mut keuzes = vec![vec![assigned("H6110", 50.0), assigned("H4030", 50.0)]];
        let demoted = apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        // H6110: 8 < 10; H4030: 8 < 100
        assert_eq!(demoted, 2);

        let polygons = vec![rect_polygon(1, 0.0, 5.0, 4.0)];
        let mut keuzes = vec![vec![assigned("H6110", 50.0), assigned("H4030", 50.0)]];
        apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).unwrap();
        assert!(keuzes[0][0].is_toegekend());
        assert!(!keuzes[0][1].is_toegekend());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let polygons = vec![rect_polygon(1, 0.0, 10.0, 10.0)];
        let mut keuzes: Vec<Vec<HabitatKeuze>> = Vec::new();
        assert!(apply_minimum_area(&polygons, &mut keuzes, &tiers(), &table()).is_err());
    }
}
