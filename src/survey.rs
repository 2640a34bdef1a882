//! Surveyed polygons as handed to the engine
//!
//! Reading survey files is done upstream; a polygon arrives with its geometry,
//! its complex-parts and the attribute columns joined from the reference layers.

use geo::{Area, MultiPolygon};

use crate::criteria::{AttributeRow, CriterionRow};
use crate::error::HabResult;
use crate::vegetation::{validate_parts, VegTypeInfo};

pub type PolygonId = u64;

#[derive(Debug, Clone)]
pub struct SurveyPolygon {
    id: PolygonId,
    geometry: MultiPolygon<f64>,
    vegtypen: Vec<VegTypeInfo>,
    attributes: AttributeRow,
}

impl SurveyPolygon {
    /// Complex-part percentages must not exceed 100 together
    pub fn new(id: PolygonId, geometry: MultiPolygon<f64>, vegtypen: Vec<VegTypeInfo>) -> HabResult<Self> {
        validate_parts(&vegtypen)?;
        Ok(Self {
            id,
            geometry,
            vegtypen,
            attributes: AttributeRow::new(),
        })
    }

    pub fn with_attributes(mut self, attributes: AttributeRow) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> PolygonId {
        self.id
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn vegtypen(&self) -> &[VegTypeInfo] {
        &self.vegtypen
    }

    pub fn attributes(&self) -> &AttributeRow {
        &self.attributes
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Attributes plus geometry, as criteria read them
    pub fn criterion_row(&self) -> CriterionRow<'_> {
        CriterionRow::new(&self.attributes, Some(&self.geometry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_polygon_basics() {
        let shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 5.0), (x: 0.0, y: 5.0),
        ]]);
        let parts = vec![VegTypeInfo::from_strings(100.0, Some("14a1"), None).unwrap()];
        let polygon = SurveyPolygon::new(7, shape, parts).unwrap();
        assert_eq!(polygon.id(), 7);
        assert_eq!(polygon.area(), 50.0);
        assert!(polygon.criterion_row().geometry().is_ok());
    }

    #[test]
    fn test_parts_over_100_rejected() {
        let parts = vec![
            VegTypeInfo::from_strings(60.0, Some("14a1"), None).unwrap(),
            VegTypeInfo::from_strings(60.0, Some("20a"), None).unwrap(),
        ];
        assert!(SurveyPolygon::new(1, MultiPolygon::new(vec![]), parts).is_err());
    }
}
