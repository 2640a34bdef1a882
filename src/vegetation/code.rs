//! Hierarchical vegetation codes (SBB and VvN)
//!
//! Both families are a class number followed by optional, ever more specific
//! segments:
//! - VvN: klasse, orde, verbond, associatie, subassociatie (`42aa1e`)
//! - SBB: klasse, verbond, associatie, subassociatie (`25a3b`)
//!
//! A code can instead name a community that hangs directly under the class:
//! rompgemeenschap (`37rg2` / `16-b`) or derivaatgemeenschap (`42dg1` / `09/a`).
//!
//! Matching is prefix based: a table code matches a surveyed code when every
//! segment the table code fills agrees with the survey. The surveyed code may be
//! more specific, never less.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{HabResult, HabitatError};

static VVN_REGULAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<klasse>[1-9][0-9]?)(?:(?P<orde>[a-z])(?:(?P<verbond>[a-z])(?:(?P<associatie>[0-9])(?P<subassociatie>[a-z])?)?)?)?$",
    )
    .expect("valid VvN regex")
});

static VVN_COMMUNITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<klasse>[1-9][0-9]?)(?P<soort>rg|dg)(?P<nummer>[0-9]{1,2})$")
        .expect("valid VvN community regex")
});

static SBB_REGULAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<klasse>[0-9]{1,3})(?:(?P<verbond>[a-z])(?:(?P<associatie>[0-9])(?P<subassociatie>[a-z])?)?)?$",
    )
    .expect("valid SBB regex")
});

static SBB_COMMUNITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<klasse>[0-9]{1,3})(?P<soort>[-/])(?P<nummer>[a-z])$")
        .expect("valid SBB community regex")
});

/// The two coding families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeFamily {
    /// Staatsbosbeheer typology
    Sbb,
    /// Vegetatie van Nederland
    Vvn,
}

impl fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeFamily::Sbb => f.write_str("SBB"),
            CodeFamily::Vvn => f.write_str("VvN"),
        }
    }
}

/// Community attached directly to a class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gemeenschap {
    Romp(String),
    Derivaat(String),
}

/// How precisely a table code matched a surveyed code
///
/// Higher is more specific. The two families interleave so that a match at a
/// given depth ranks the same regardless of family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchLevel {
    NoMatch = 0,
    KlasseVvn = 1,
    KlasseSbb = 2,
    OrdeVvn = 3,
    VerbondVvn = 4,
    VerbondSbb = 5,
    AssociatieVvn = 6,
    AssociatieSbb = 7,
    SubassociatieVvn = 8,
    SubassociatieSbb = 9,
    GemeenschapVvn = 10,
    GemeenschapSbb = 11,
}

impl MatchLevel {
    pub fn is_match(&self) -> bool {
        *self != MatchLevel::NoMatch
    }

    fn klasse(family: CodeFamily) -> Self {
        match family {
            CodeFamily::Vvn => MatchLevel::KlasseVvn,
            CodeFamily::Sbb => MatchLevel::KlasseSbb,
        }
    }

    fn verbond(family: CodeFamily) -> Self {
        match family {
            CodeFamily::Vvn => MatchLevel::VerbondVvn,
            CodeFamily::Sbb => MatchLevel::VerbondSbb,
        }
    }

    fn associatie(family: CodeFamily) -> Self {
        match family {
            CodeFamily::Vvn => MatchLevel::AssociatieVvn,
            CodeFamily::Sbb => MatchLevel::AssociatieSbb,
        }
    }

    fn subassociatie(family: CodeFamily) -> Self {
        match family {
            CodeFamily::Vvn => MatchLevel::SubassociatieVvn,
            CodeFamily::Sbb => MatchLevel::SubassociatieSbb,
        }
    }

    fn gemeenschap(family: CodeFamily) -> Self {
        match family {
            CodeFamily::Vvn => MatchLevel::GemeenschapVvn,
            CodeFamily::Sbb => MatchLevel::GemeenschapSbb,
        }
    }
}

/// Specificity reported for community codes
pub const GEMEENSCHAP_SPECIFICITY: u8 = 10;

/// A parsed SBB or VvN code
///
/// Only constructed through parsing, so a community never coexists with
/// lower segments and `orde` is only ever set for VvN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "VegCodeRepr", into = "VegCodeRepr")]
pub struct VegCode {
    family: CodeFamily,
    klasse: u16,
    orde: Option<char>,
    verbond: Option<char>,
    associatie: Option<u8>,
    subassociatie: Option<char>,
    gemeenschap: Option<Gemeenschap>,
}

impl VegCode {
    /// Parse a code of the given family
    ///
    /// Input is trimmed and lowercased first. Fails with `InvalidCodeFormat`
    /// when the text does not follow the family grammar.
    pub fn parse(family: CodeFamily, text: &str) -> HabResult<Self> {
        let normalized = text.trim().to_lowercase();
        let invalid = || HabitatError::InvalidCodeFormat {
            family,
            code: text.to_string(),
        };

        let (community_re, regular_re) = match family {
            CodeFamily::Vvn => (&*VVN_COMMUNITY, &*VVN_REGULAR),
            CodeFamily::Sbb => (&*SBB_COMMUNITY, &*SBB_REGULAR),
        };

        // Community first: "37rg2" would otherwise read as orde r, verbond g
        if let Some(caps) = community_re.captures(&normalized) {
            let klasse = parse_klasse(&caps["klasse"]).ok_or_else(invalid)?;
            let nummer = caps["nummer"].to_string();
            let gemeenschap = match &caps["soort"] {
                "rg" | "-" => Gemeenschap::Romp(nummer),
                _ => Gemeenschap::Derivaat(nummer),
            };
            return Ok(Self {
                family,
                klasse,
                orde: None,
                verbond: None,
                associatie: None,
                subassociatie: None,
                gemeenschap: Some(gemeenschap),
            });
        }

        let caps = regular_re.captures(&normalized).ok_or_else(invalid)?;
        let klasse = parse_klasse(&caps["klasse"]).ok_or_else(invalid)?;
        let letter = |name: &str| caps.name(name).and_then(|m| m.as_str().chars().next());

        Ok(Self {
            family,
            klasse,
            orde: letter("orde"),
            verbond: letter("verbond"),
            associatie: caps
                .name("associatie")
                .and_then(|m| m.as_str().parse::<u8>().ok()),
            subassociatie: letter("subassociatie"),
            gemeenschap: None,
        })
    }

    pub fn parse_vvn(text: &str) -> HabResult<Self> {
        Self::parse(CodeFamily::Vvn, text)
    }

    pub fn parse_sbb(text: &str) -> HabResult<Self> {
        Self::parse(CodeFamily::Sbb, text)
    }

    pub fn family(&self) -> CodeFamily {
        self.family
    }

    pub fn klasse(&self) -> u16 {
        self.klasse
    }

    pub fn gemeenschap(&self) -> Option<&Gemeenschap> {
        self.gemeenschap.as_ref()
    }

    pub fn is_gemeenschap(&self) -> bool {
        self.gemeenschap.is_some()
    }

    /// Number of populated segments; communities rank above any regular code
    pub fn specificity(&self) -> u8 {
        if self.gemeenschap.is_some() {
            return GEMEENSCHAP_SPECIFICITY;
        }
        1 + self.orde.is_some() as u8
            + self.verbond.is_some() as u8
            + self.associatie.is_some() as u8
            + self.subassociatie.is_some() as u8
    }

    /// Most specific level at which `self` generalizes `candidate`
    ///
    /// `NoMatch` when families or classes differ, when a segment of `self`
    /// disagrees with (or is absent from) `candidate`, or when `self` is a
    /// community not equal to `candidate`.
    pub fn specificity_of_match(&self, candidate: &VegCode) -> MatchLevel {
        if self.family != candidate.family || self.klasse != candidate.klasse {
            return MatchLevel::NoMatch;
        }

        if self.gemeenschap.is_some() {
            return if self == candidate {
                MatchLevel::gemeenschap(self.family)
            } else {
                MatchLevel::NoMatch
            };
        }

        let mut level = MatchLevel::klasse(self.family);

        // Each step: stop when self ends, fail when candidate disagrees
        macro_rules! descend {
            ($field:ident, $next:expr) => {
                match (&self.$field, &candidate.$field) {
                    (None, _) => return level,
                    (Some(a), Some(b)) if a == b => level = $next,
                    _ => return MatchLevel::NoMatch,
                }
            };
        }

        if self.family == CodeFamily::Vvn {
            descend!(orde, MatchLevel::OrdeVvn);
        }
        descend!(verbond, MatchLevel::verbond(self.family));
        descend!(associatie, MatchLevel::associatie(self.family));
        descend!(subassociatie, MatchLevel::subassociatie(self.family));

        level
    }
}

fn parse_klasse(text: &str) -> Option<u16> {
    text.parse::<u16>().ok().filter(|k| *k > 0)
}

impl fmt::Display for VegCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            CodeFamily::Sbb => write!(f, "{:02}", self.klasse)?,
            CodeFamily::Vvn => write!(f, "{}", self.klasse)?,
        }

        if let Some(gemeenschap) = &self.gemeenschap {
            return match (self.family, gemeenschap) {
                (CodeFamily::Vvn, Gemeenschap::Romp(n)) => write!(f, "rg{}", n),
                (CodeFamily::Vvn, Gemeenschap::Derivaat(n)) => write!(f, "dg{}", n),
                (CodeFamily::Sbb, Gemeenschap::Romp(n)) => write!(f, "-{}", n),
                (CodeFamily::Sbb, Gemeenschap::Derivaat(n)) => write!(f, "/{}", n),
            };
        }

        if let Some(c) = self.orde {
            write!(f, "{}", c)?;
        }
        if let Some(c) = self.verbond {
            write!(f, "{}", c)?;
        }
        if let Some(n) = self.associatie {
            write!(f, "{}", n)?;
        }
        if let Some(c) = self.subassociatie {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Serialized form: `{ "family": "vvn", "code": "42aa1e" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VegCodeRepr {
    pub family: CodeFamily,
    pub code: String,
}

impl TryFrom<VegCodeRepr> for VegCode {
    type Error = HabitatError;

    fn try_from(repr: VegCodeRepr) -> Result<Self, Self::Error> {
        VegCode::parse(repr.family, &repr.code)
    }
}

impl From<VegCode> for VegCodeRepr {
    fn from(code: VegCode) -> Self {
        VegCodeRepr {
            family: code.family,
            code: code.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vvn(s: &str) -> VegCode {
        VegCode::parse_vvn(s).unwrap()
    }

    fn sbb(s: &str) -> VegCode {
        VegCode::parse_sbb(s).unwrap()
    }

    #[test]
    fn test_more_specific_self_does_not_match() {
        assert_eq!(vvn("42aa1e").specificity_of_match(&vvn("42aa")), MatchLevel::NoMatch);
    }

    #[test]
    fn test_prefix_match_levels() {
        assert_eq!(vvn("42aa").specificity_of_match(&vvn("42aa1e")), MatchLevel::VerbondVvn);
        assert_eq!(vvn("42").specificity_of_match(&vvn("42aa1e")), MatchLevel::KlasseVvn);
        assert_eq!(vvn("42a").specificity_of_match(&vvn("42aa1e")), MatchLevel::OrdeVvn);
        assert_eq!(vvn("42aa1").specificity_of_match(&vvn("42aa1e")), MatchLevel::AssociatieVvn);
        assert_eq!(vvn("42aa1e").specificity_of_match(&vvn("42aa1e")), MatchLevel::SubassociatieVvn);
        assert_eq!(sbb("25a3").specificity_of_match(&sbb("25a3")), MatchLevel::AssociatieSbb);
        assert_eq!(sbb("25a3b").specificity_of_match(&sbb("25a3b")), MatchLevel::SubassociatieSbb);
    }

    #[test]
    fn test_disagreeing_segment() {
        assert_eq!(vvn("42ab").specificity_of_match(&vvn("42aa1e")), MatchLevel::NoMatch);
        assert_eq!(vvn("41aa").specificity_of_match(&vvn("42aa1e")), MatchLevel::NoMatch);
        assert_eq!(sbb("25a").specificity_of_match(&vvn("25a")), MatchLevel::NoMatch);
    }

    #[test]
    fn test_communities() {
        let romp = vvn("37rg2");
        assert!(romp.is_gemeenschap());
        assert_eq!(romp.gemeenschap(), Some(&Gemeenschap::Romp("2".into())));
        assert_eq!(romp.specificity_of_match(&vvn("37rg2")), MatchLevel::GemeenschapVvn);
        assert_eq!(romp.specificity_of_match(&vvn("37rg3")), MatchLevel::NoMatch);
        assert_eq!(romp.specificity_of_match(&vvn("37aa")), MatchLevel::NoMatch);
        // A bare class still generalizes its communities
        assert_eq!(vvn("37").specificity_of_match(&romp), MatchLevel::KlasseVvn);
        assert_eq!(vvn("37a").specificity_of_match(&romp), MatchLevel::NoMatch);

        let derivaat = sbb("9/a");
        assert_eq!(derivaat.gemeenschap(), Some(&Gemeenschap::Derivaat("a".into())));
        assert_eq!(derivaat.to_string(), "09/a");
        assert_eq!(sbb("16-b").to_string(), "16-b");
        assert_eq!(derivaat.specificity(), GEMEENSCHAP_SPECIFICITY);
    }

    #[test]
    fn test_invalid_codes() {
        let err = VegCode::parse_vvn("some-random-str").unwrap_err();
        assert!(matches!(err, HabitatError::InvalidCodeFormat { family: CodeFamily::Vvn, .. }));
        assert!(VegCode::parse_vvn("").is_err());
        assert!(VegCode::parse_vvn("0aa").is_err());
        assert!(VegCode::parse_sbb("25aa").is_err());
        assert!(VegCode::parse_sbb("0").is_err());
    }

    #[test]
    fn test_normalization_and_display() {
        assert_eq!(vvn(" 42AA1E "), vvn("42aa1e"));
        assert_eq!(vvn("42aa1e").to_string(), "42aa1e");
        assert_eq!(sbb("8a"), sbb("08a"));
        assert_eq!(sbb("8a").to_string(), "08a");
        assert_eq!(vvn("42aa1e").specificity(), 5);
        assert_eq!(sbb("25a3").specificity(), 3);
    }

    #[test]
    fn test_match_level_ordering() {
        assert!(MatchLevel::SubassociatieVvn > MatchLevel::VerbondSbb);
        assert!(MatchLevel::GemeenschapVvn > MatchLevel::SubassociatieSbb);
        assert!(!MatchLevel::NoMatch.is_match());
    }

    #[test]
    fn test_serde_roundtrip_rejects_garbage() {
        let json = r#"{"family":"vvn","code":"42aa1e"}"#;
        let code: VegCode = serde_json::from_str(json).unwrap();
        assert_eq!(code, vvn("42aa1e"));
        assert!(serde_json::from_str::<VegCode>(r#"{"family":"sbb","code":"x"}"#).is_err());
    }
}
