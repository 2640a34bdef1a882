//! Functional cohesion clustering
//!
//! Per tier: keep the polygons whose share of the habitat type lies in the tier's
//! range, buffer them by the tier distance and link every pair that then
//! intersects. The links of all tiers are merged into one partition; polygons
//! without any link stay singletons.

use geo::{BoundingRect, Buffer, Intersects, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::hash::Hash;

use crate::error::{HabResult, HabitatError};
use crate::utils::geometry::SpatialIndex;
use crate::utils::union_find::cluster_lists;

/// (minimum %, optional maximum %, buffer distance)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohesionTier {
    pub min_percentage: f64,
    #[serde(default)]
    pub max_percentage: Option<f64>,
    pub buffer_distance: f64,
}

impl CohesionTier {
    pub fn new(min_percentage: f64, max_percentage: Option<f64>, buffer_distance: f64) -> Self {
        Self {
            min_percentage,
            max_percentage,
            buffer_distance,
        }
    }

    pub fn validate(&self) -> HabResult<()> {
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(self.min_percentage) {
            return Err(HabitatError::invariant(format!(
                "cohesion tier minimum {} outside 0..=100",
                self.min_percentage
            )));
        }
        if let Some(max) = self.max_percentage {
            if !in_range(max) || max < self.min_percentage {
                return Err(HabitatError::invariant(format!(
                    "cohesion tier maximum {} not in {}..=100",
                    max, self.min_percentage
                )));
            }
        }
        if !self.buffer_distance.is_finite() || self.buffer_distance < 0.0 {
            return Err(HabitatError::invariant(format!(
                "cohesion tier buffer {} must be >= 0",
                self.buffer_distance
            )));
        }
        Ok(())
    }

    pub fn accepts(&self, percentage: f64) -> bool {
        percentage >= self.min_percentage && self.max_percentage.map_or(true, |max| percentage <= max)
    }
}

/// A polygon taking part in clustering for one habitat type
#[derive(Debug, Clone, Copy)]
pub struct ClusterInput<'a, K> {
    pub key: K,
    pub geometry: &'a MultiPolygon<f64>,
    /// Share (%) of the polygon that carries the habitat type
    pub percentage: f64,
}

/// Partition of all inputs into functionally cohesive clusters
pub fn functional_cohesion_clusters<K>(inputs: &[ClusterInput<'_, K>], tiers: &[CohesionTier]) -> Vec<Vec<K>>
where
    K: Copy + Eq + Hash,
{
    let mut groups: Vec<Vec<K>> = inputs.iter().map(|input| vec![input.key]).collect();

    for tier in tiers {
        let members: Vec<&ClusterInput<'_, K>> =
            inputs.iter().filter(|input| tier.accepts(input.percentage)).collect();

        let buffered: Vec<MultiPolygon<f64>> = members
            .iter()
            .map(|member| {
                if tier.buffer_distance > 0.0 {
                    member.geometry.buffer(tier.buffer_distance)
                } else {
                    member.geometry.clone()
                }
            })
            .collect();

        let index = SpatialIndex::new(buffered.iter().enumerate());
        let mut pairs: Vec<Vec<K>> = Vec::new();
        for (i, geometry) in buffered.iter().enumerate() {
            let Some(rect) = geometry.bounding_rect() else {
                continue;
            };
            for j in index.candidates(&rect) {
                if j > i && geometry.intersects(&buffered[j]) {
                    pairs.push(vec![members[i].key, members[j].key]);
                }
            }
        }

        tracing::debug!(
            "Cohesion tier (>= {}%, buffer {}): {} polygons, {} links",
            tier.min_percentage,
            tier.buffer_distance,
            members.len(),
            pairs.len()
        );
        groups.extend(pairs);
    }

    cluster_lists(&groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: 0.0), (x: x0 + 10.0, y: 0.0), (x: x0 + 10.0, y: 10.0), (x: x0, y: 10.0),
        ]])
    }

    fn sorted(mut clusters: Vec<Vec<u64>>) -> Vec<Vec<u64>> {
        clusters.iter_mut().for_each(|c| c.sort_unstable());
        clusters.sort();
        clusters
    }

    #[test]
    fn test_tier_accepts() {
        let tier = CohesionTier::new(50.0, Some(90.0), 1.0);
        assert!(tier.accepts(50.0));
        assert!(tier.accepts(90.0));
        assert!(!tier.accepts(95.0));
        assert!(CohesionTier::new(50.0, None, 1.0).accepts(100.0));
        assert!(CohesionTier::new(120.0, None, 1.0).validate().is_err());
        assert!(CohesionTier::new(10.0, None, -1.0).validate().is_err());
    }

    #[test]
    fn test_gap_bridged_only_by_large_enough_buffer() {
        // Gap of 4 between the squares: buffers of 2.01 each bridge it, 1.0 does not
        let shapes = [square(0.0), square(14.0), square(100.0)];
        let inputs: Vec<ClusterInput<'_, u64>> = shapes
            .iter()
            .enumerate()
            .map(|(i, g)| ClusterInput { key: i as u64, geometry: g, percentage: 100.0 })
            .collect();

        let near = sorted(functional_cohesion_clusters(&inputs, &[CohesionTier::new(100.0, None, 2.01)]));
        assert_eq!(near, vec![vec![0, 1], vec![2]]);

        let far = sorted(functional_cohesion_clusters(&inputs, &[CohesionTier::new(100.0, None, 1.0)]));
        assert_eq!(far, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_tiers_filter_by_percentage_and_merge() {
        let shapes = [square(0.0), square(14.0), square(28.0)];
        let pct = [100.0, 60.0, 60.0];
        let inputs: Vec<ClusterInput<'_, u64>> = shapes
            .iter()
            .zip(pct)
            .enumerate()
            .map(|(i, (g, p))| ClusterInput { key: i as u64, geometry: g, percentage: p })
            .collect();

        // Wide buffer only for the 100% polygon: it has no partner in that tier
        let tiers = [CohesionTier::new(100.0, None, 10.0), CohesionTier::new(50.0, None, 2.01)];
        let clusters = sorted(functional_cohesion_clusters(&inputs, &tiers));
        assert_eq!(clusters, vec![vec![0, 1, 2]]);

        let tiers = [CohesionTier::new(100.0, None, 10.0), CohesionTier::new(50.0, Some(80.0), 2.01)];
        let clusters = sorted(functional_cohesion_clusters(&inputs, &tiers));
        assert_eq!(clusters, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_touching_polygons_zero_buffer() {
        let shapes = [square(0.0), square(10.0)];
        let inputs: Vec<ClusterInput<'_, u64>> = shapes
            .iter()
            .enumerate()
            .map(|(i, g)| ClusterInput { key: i as u64, geometry: g, percentage: 100.0 })
            .collect();
        let clusters = sorted(functional_cohesion_clusters(&inputs, &[CohesionTier::new(50.0, None, 0.0)]));
        assert_eq!(clusters, vec![vec![0, 1]]);
    }
}
