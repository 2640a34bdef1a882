//! Surround percentages and the neighbourhood profile a mosaic rule reads
//!
//! `omringing_percentage`: share of a polygon's buffered boundary covered by a
//! candidate polygon. With a positive buffer this is an area overlay of the
//! boundary band; with buffer 0 the band degenerates to the boundary line and the
//! share is measured along its length.

use geo::{Area, BooleanOps, Buffer, MultiPolygon};
use smallvec::SmallVec;

use crate::error::{HabResult, HabitatError};
use crate::resolver::types::{HabitatKeuze, Kwaliteit, H0000, HXXXX};
use crate::utils::geometry::{boundary, boundary_length, length_within};
use crate::vegetation::VegCode;

/// Below this a percentage counts as zero
const PERCENTAGE_EPSILON: f64 = 1e-9;

/// Percentage of `target`'s buffered boundary covered by each candidate
///
/// Candidates may include `target` itself. Candidates that do not touch the band
/// are left out. A negative buffer is rejected. Buffer 0 is accepted, though
/// `target` then always covers its own boundary completely.
pub fn omringing_percentages<K: Clone>(
    target: &MultiPolygon<f64>,
    candidates: &[(K, &MultiPolygon<f64>)],
    buffer: f64,
) -> HabResult<Vec<(K, f64)>> {
    if !buffer.is_finite() || buffer < 0.0 {
        return Err(HabitatError::invariant(format!(
            "mozaiek buffer must be >= 0, got {}",
            buffer
        )));
    }

    let ring = boundary(target);
    let shares: Vec<(K, f64)> = if buffer == 0.0 {
        tracing::debug!("Mozaiek buffer is 0: a polygon always registers 100% surround by itself");
        let total = boundary_length(&ring);
        if total <= 0.0 {
            return Ok(Vec::new());
        }
        candidates
            .iter()
            .map(|(key, geometry)| (key.clone(), 100.0 * length_within(&ring, geometry) / total))
            .collect()
    } else {
        let band = ring.buffer(buffer);
        let band_area = band.unsigned_area();
        if band_area <= 0.0 {
            return Ok(Vec::new());
        }
        candidates
            .iter()
            .map(|(key, geometry)| {
                let overlap = band.intersection(*geometry).unsigned_area();
                (key.clone(), 100.0 * overlap / band_area)
            })
            .collect()
    };

    Ok(shares
        .into_iter()
        .filter(|(_, pct)| *pct > PERCENTAGE_EPSILON)
        .map(|(key, pct)| (key, pct.min(100.0)))
        .collect())
}

/// One complex-part of one neighbour, as seen from the polygon being evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct OmringingEntry {
    pub habtype: String,
    pub kwaliteit: Kwaliteit,
    /// Table codes that justified the neighbour's habitat type
    pub vegcodes: SmallVec<[VegCode; 2]>,
    pub complexdeel_percentage: f64,
    pub omringing_percentage: f64,
    /// Neighbour not resolved yet, or itself waiting on its mosaic rule
    pub wachtend: bool,
}

impl OmringingEntry {
    /// Waiting, or HXXXX for any other reason (manual review, ambiguity)
    pub fn is_pending(&self) -> bool {
        self.wachtend || self.habtype == HXXXX
    }

    /// H0000 or HXXXX: no habitat type a rule can qualify on
    pub fn is_sentinel(&self) -> bool {
        self.habtype == H0000 || self.habtype == HXXXX
    }

    /// `complexdeel% × omringing% / 100`
    pub fn share(&self) -> f64 {
        self.complexdeel_percentage * self.omringing_percentage / 100.0
    }
}

/// A neighbour and whatever is known about it
#[derive(Debug, Clone, Copy)]
pub struct NeighbourState<'a> {
    pub omringing_percentage: f64,
    /// `None` while the neighbour has not been resolved
    pub keuzes: Option<&'a [HabitatKeuze]>,
}

/// Habitat composition around one polygon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborhoodProfile {
    entries: Vec<OmringingEntry>,
    coverage: f64,
}

impl NeighborhoodProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from the neighbours' raw surround percentages
    ///
    /// `self_percentage` is the polygon's share of its own band. Neighbour shares
    /// are rescaled to the part of the band outside the polygon; at 100 (buffer 0)
    /// no rescaling applies.
    pub fn from_neighbours(self_percentage: f64, neighbours: &[NeighbourState<'_>]) -> Self {
        let outside = 100.0 - self_percentage;
        let factor = if outside <= PERCENTAGE_EPSILON || self_percentage <= PERCENTAGE_EPSILON {
            1.0
        } else {
            100.0 / outside
        };

        let mut entries = Vec::new();
        let mut coverage = 0.0;
        for neighbour in neighbours {
            let omringing = (neighbour.omringing_percentage * factor).min(100.0);
            coverage += omringing;

            match neighbour.keuzes {
                None => entries.push(OmringingEntry {
                    habtype: HXXXX.to_string(),
                    kwaliteit: Kwaliteit::Nvt,
                    vegcodes: SmallVec::new(),
                    complexdeel_percentage: 100.0,
                    omringing_percentage: omringing,
                    wachtend: true,
                }),
                Some(keuzes) => entries.extend(keuzes.iter().map(|keuze| OmringingEntry {
                    habtype: keuze.habtype().to_string(),
                    kwaliteit: keuze.kwaliteit(),
                    vegcodes: keuze.supporting_table_codes(),
                    complexdeel_percentage: keuze.percentage(),
                    omringing_percentage: omringing,
                    wachtend: keuze.is_waiting(),
                })),
            }
        }

        Self {
            entries,
            coverage: coverage.min(100.0),
        }
    }

    /// Assemble directly from entries and a known coverage
    pub fn from_entries(entries: Vec<OmringingEntry>, coverage: f64) -> Self {
        Self {
            entries,
            coverage: coverage.clamp(0.0, 100.0),
        }
    }

    pub fn entries(&self) -> &[OmringingEntry] {
        &self.entries
    }

    /// Percentage of the surround that belongs to a known neighbour
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Any neighbour part without a resolved habitat type
    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(OmringingEntry::is_pending)
    }

    /// Summed share of entries matching `predicate`
    pub fn score_where(&self, predicate: impl Fn(&OmringingEntry) -> bool) -> f64 {
        self.entries
            .iter()
            .filter(|e| predicate(e))
            .map(OmringingEntry::share)
            .sum()
    }

    /// "Surrounded by habitat X" score for one habitat type and quality
    pub fn score(&self, habtype: &str, kwaliteit: Kwaliteit) -> f64 {
        self.score_where(|e| e.habtype == habtype && e.kwaliteit == kwaliteit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::types::KeuzeStatus;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use geo::polygon;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1),
        ]])
    }

    fn as_map(shares: Vec<(&str, f64)>) -> rustc_hash::FxHashMap<String, f64> {
        shares.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_lone_polygon_surrounds_itself() {
        let shape = rect(0.0, 0.0, 4.0, 4.0);
        let shares = omringing_percentages(&shape, &[("self", &shape)], 0.0).unwrap();
        assert_eq!(shares.len(), 1);
        assert_relative_eq!(shares[0].1, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_asymmetric_neighbours_buffer_zero() {
        // 3x1 strips touching along a short side: 1 of 8 boundary units shared
        let a = rect(0.0, 0.0, 3.0, 1.0);
        let b = rect(3.0, 0.0, 6.0, 1.0);
        let shares = as_map(omringing_percentages(&a, &[("self", &a), ("other", &b)], 0.0).unwrap());
        assert_relative_eq!(shares["self"], 100.0, epsilon = 1e-9);
        assert_relative_eq!(shares["other"], 12.5, epsilon = 1e-9);
    }

    #[test]
    fn test_band_overlay_positive_buffer() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(10.0, 0.0, 20.0, 10.0);
        let far = rect(50.0, 50.0, 60.0, 60.0);
        let shares = as_map(
            omringing_percentages(&a, &[("self", &a), ("other", &b), ("far", &far)], 0.1).unwrap(),
        );
        assert!(!shares.contains_key("far"));
        assert!(shares["self"] > 45.0 && shares["self"] < 55.0);
        assert!(shares["other"] > 11.0 && shares["other"] < 14.0);

        // Rescaled to the outside half of the band: about a quarter
        let profile = NeighborhoodProfile::from_neighbours(
            shares["self"],
            &[NeighbourState { omringing_percentage: shares["other"], keuzes: None }],
        );
        assert_abs_diff_eq!(profile.entries()[0].omringing_percentage, 25.0, epsilon = 1.0);
    }

    #[test]
    fn test_negative_buffer_rejected() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        assert!(omringing_percentages(&a, &[("self", &a)], -1.0).is_err());
    }

    #[test]
    fn test_profile_scores() {
        let h2130 = HabitatKeuze::toegekend("H2130", Kwaliteit::Goed, 60.0, vec![], "").unwrap();
        let geen = HabitatKeuze::sentinel(KeuzeStatus::VoldoetNietAanHabtypevoorwaarden, 40.0, vec![], "").unwrap();
        let left = [h2130, geen];
        let manual = [HabitatKeuze::sentinel(KeuzeStatus::NietGeautomatiseerdCriterium, 100.0, vec![], "").unwrap()];

        let profile = NeighborhoodProfile::from_neighbours(
            100.0,
            &[
                NeighbourState { omringing_percentage: 50.0, keuzes: Some(&left[..]) },
                NeighbourState { omringing_percentage: 20.0, keuzes: Some(&manual[..]) },
            ],
        );
        assert_relative_eq!(profile.coverage(), 70.0);
        assert_relative_eq!(profile.score("H2130", Kwaliteit::Goed), 30.0);
        assert_relative_eq!(profile.score("H2130", Kwaliteit::Matig), 0.0);
        // The manual neighbour has no habitat type yet
        assert!(profile.has_pending());

        let settled = NeighborhoodProfile::from_neighbours(
            100.0,
            &[NeighbourState { omringing_percentage: 50.0, keuzes: Some(&left[..]) }],
        );
        assert!(!settled.has_pending());
        assert!(settled.entries()[1].is_sentinel());

        let pending = NeighborhoodProfile::from_neighbours(
            100.0,
            &[NeighbourState { omringing_percentage: 10.0, keuzes: None }],
        );
        assert!(pending.has_pending());
    }
}
