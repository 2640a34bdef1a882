//! Per-polygon attribute values read by criterion leaves
//!
//! Upstream spatial joins attach the FGR zone, soil units and LBK code to each
//! polygon. A column that is present but empty is `Null` (the join found nothing);
//! a column that is absent altogether is an upstream fault.

use geo::MultiPolygon;
use rustc_hash::FxHashMap;

use crate::error::{HabResult, HabitatError};

/// Column holding the physical-geographic region
pub const FGR_ATTRIBUTE: &str = "fgr";
/// Column holding the soil-map units
pub const BODEM_ATTRIBUTE: &str = "bodem";
/// Column holding the historic-landscape code
pub const LBK_ATTRIBUTE: &str = "lbk";

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Codes(Vec<String>),
}

impl AttributeValue {
    /// Values as a list; text counts as one value unless blank
    pub fn as_codes(&self) -> Option<Vec<&str>> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Text(t) if t.trim().is_empty() => Some(Vec::new()),
            AttributeValue::Text(t) => Some(vec![t.trim()]),
            AttributeValue::Codes(codes) => Some(codes.iter().map(|c| c.trim()).collect()),
        }
    }
}

/// Named attribute columns of one polygon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRow {
    values: FxHashMap<String, AttributeValue>,
}

impl AttributeRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.set(name, AttributeValue::Text(value.to_string()));
        self
    }

    pub fn with_codes(mut self, name: &str, values: &[&str]) -> Self {
        let codes = values.iter().map(|v| v.to_string()).collect();
        self.set(name, AttributeValue::Codes(codes));
        self
    }

    pub fn with_null(mut self, name: &str) -> Self {
        self.set(name, AttributeValue::Null);
        self
    }

    pub fn set(&mut self, name: &str, value: AttributeValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> HabResult<&AttributeValue> {
        self.values
            .get(name)
            .ok_or_else(|| HabitatError::MissingAttribute(name.to_string()))
    }

    /// View without a geometry (criteria that need one will fail)
    pub fn as_row(&self) -> CriterionRow<'_> {
        CriterionRow::new(self, None)
    }
}

/// What a criterion sees of one polygon: its attributes and, when known, its shape
#[derive(Debug, Clone, Copy)]
pub struct CriterionRow<'a> {
    attributes: &'a AttributeRow,
    geometry: Option<&'a MultiPolygon<f64>>,
}

impl<'a> CriterionRow<'a> {
    pub fn new(attributes: &'a AttributeRow, geometry: Option<&'a MultiPolygon<f64>>) -> Self {
        Self { attributes, geometry }
    }

    pub fn get(&self, name: &str) -> HabResult<&'a AttributeValue> {
        self.attributes.get(name)
    }

    pub fn geometry(&self) -> HabResult<&'a MultiPolygon<f64>> {
        self.geometry
            .ok_or_else(|| HabitatError::MissingAttribute("geometry".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_vs_null() {
        let row = AttributeRow::new().with_null(FGR_ATTRIBUTE);
        assert_eq!(row.get(FGR_ATTRIBUTE).unwrap(), &AttributeValue::Null);
        assert_eq!(
            row.get(LBK_ATTRIBUTE),
            Err(HabitatError::MissingAttribute("lbk".into()))
        );
        assert!(row.as_row().geometry().is_err());
    }

    #[test]
    fn test_as_codes() {
        assert_eq!(AttributeValue::Null.as_codes(), None);
        assert_eq!(AttributeValue::Text("  ".into()).as_codes(), Some(vec![]));
        assert_eq!(AttributeValue::Text(" Hn21 ".into()).as_codes(), Some(vec!["Hn21"]));
        assert_eq!(
            AttributeValue::Codes(vec!["Hn21".into(), "Zn23".into()]).as_codes(),
            Some(vec!["Hn21", "Zn23"])
        );
    }
}
