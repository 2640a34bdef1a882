//! Qualifying conditions ("mitsen") and the attributes they read

pub mod attributes;
pub mod criterion;

pub use attributes::{AttributeRow, AttributeValue, CriterionRow, BODEM_ATTRIBUTE, FGR_ATTRIBUTE, LBK_ATTRIBUTE};
pub use criterion::{
    BodemCriterium, Criterion, FgrCriterium, LbkCriterium, NietGeautomatiseerdCriterium,
    OverrideCriterium,
};
