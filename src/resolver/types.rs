//! Proposals, choices and their status codes

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::criteria::Criterion;
use crate::error::{HabResult, HabitatError};
use crate::mosaic::MosaicRule;
use crate::utils::tristate::TriState;
use crate::vegetation::{MatchLevel, VegCode};

/// No qualifying habitat
pub const H0000: &str = "H0000";
/// Undetermined: pending, manual review or ambiguous
pub const HXXXX: &str = "HXXXX";

/// Quality of a habitat occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kwaliteit {
    Goed,
    Matig,
    /// Not applicable (sentinel habitat ids)
    Nvt,
}

impl Kwaliteit {
    /// Accepts the table spellings (`Goed`, `G`, `Matig`, `M`, `Nvt`, `X`, empty)
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "goed" | "g" => Some(Kwaliteit::Goed),
            "matig" | "m" => Some(Kwaliteit::Matig),
            "nvt" | "x" | "" => Some(Kwaliteit::Nvt),
            _ => None,
        }
    }

    /// The better of two qualities
    pub fn best(self, other: Kwaliteit) -> Kwaliteit {
        self.min(other)
    }
}

impl fmt::Display for Kwaliteit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kwaliteit::Goed => f.write_str("Goed"),
            Kwaliteit::Matig => f.write_str("Matig"),
            Kwaliteit::Nvt => f.write_str("Nvt"),
        }
    }
}

/// Which kind of habitat id a status implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabtypeClass {
    Habitattype,
    GeenHabitat,
    Onbepaald,
}

impl HabtypeClass {
    /// Sentinel id; `None` for a real habitat type
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            HabtypeClass::Habitattype => None,
            HabtypeClass::GeenHabitat => Some(H0000),
            HabtypeClass::Onbepaald => Some(HXXXX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeuzeStatus {
    HabitattypeToegekend,
    VoldoetNietAanHabtypevoorwaarden,
    VoldoetAanMeerdereHabtypen,
    WachtenOpMozaiek,
    NietGeautomatiseerdCriterium,
    NietGeautomatiseerdVegtype,
    GeenOpgegevenVegtypen,
    VegtypenNietInDeftabel,
    MinimumOppNietGehaald,
}

impl KeuzeStatus {
    pub fn habtype_class(&self) -> HabtypeClass {
        match self {
            KeuzeStatus::HabitattypeToegekend => HabtypeClass::Habitattype,
            KeuzeStatus::VoldoetNietAanHabtypevoorwaarden
            | KeuzeStatus::GeenOpgegevenVegtypen
            | KeuzeStatus::VegtypenNietInDeftabel
            | KeuzeStatus::MinimumOppNietGehaald => HabtypeClass::GeenHabitat,
            KeuzeStatus::VoldoetAanMeerdereHabtypen
            | KeuzeStatus::WachtenOpMozaiek
            | KeuzeStatus::NietGeautomatiseerdCriterium
            | KeuzeStatus::NietGeautomatiseerdVegtype => HabtypeClass::Onbepaald,
        }
    }

    /// Standard explanation opening every keuze of this status
    pub fn toelichting(&self) -> &'static str {
        match self {
            KeuzeStatus::HabitattypeToegekend => "Habitattype toegekend.",
            KeuzeStatus::VoldoetNietAanHabtypevoorwaarden => {
                "Geen van de habitatvoorstellen voldoet aan de voorwaarden."
            }
            KeuzeStatus::VoldoetAanMeerdereHabtypen => {
                "Meerdere habitattypen voldoen aan de voorwaarden; handmatige keuze nodig."
            }
            KeuzeStatus::WachtenOpMozaiek => {
                "Wacht op de habitattypen van omliggende vlakken (mozaiekregel)."
            }
            KeuzeStatus::NietGeautomatiseerdCriterium => {
                "Een beperkende voorwaarde kan niet automatisch worden bepaald."
            }
            KeuzeStatus::NietGeautomatiseerdVegtype => {
                "Dit vegetatietype wordt niet automatisch omgezet."
            }
            KeuzeStatus::GeenOpgegevenVegtypen => "Er zijn geen vegetatietypen opgegeven.",
            KeuzeStatus::VegtypenNietInDeftabel => {
                "De opgegeven vegetatietypen komen niet voor in de definitietabel."
            }
            KeuzeStatus::MinimumOppNietGehaald => {
                "Het habitattype haalt het minimumoppervlak niet."
            }
        }
    }
}

/// One candidate (code → habitat type) with its gating conditions
///
/// Owned per polygon: `mits` and `mozaiek` carry the verdicts of that polygon only.
#[derive(Debug, Clone, Serialize)]
pub struct HabitatVoorstel {
    /// Code from the survey
    pub onderbouwend_vegtype: Option<VegCode>,
    /// Code of the table row that matched
    pub vegtype_in_dt: Option<VegCode>,
    pub habtype: String,
    pub kwaliteit: Kwaliteit,
    pub mits: Criterion,
    pub mozaiek: MosaicRule,
    pub match_level: MatchLevel,
    /// Percentage of the complex-part this proposal covers
    pub percentage: f64,
    /// Row in the definition table
    pub idx_in_dt: Option<usize>,
}

impl HabitatVoorstel {
    /// Placeholder for a surveyed code that matched no table row
    pub fn not_in_definition_table(code: VegCode, percentage: f64) -> Self {
        Self {
            onderbouwend_vegtype: Some(code),
            vegtype_in_dt: None,
            habtype: H0000.to_string(),
            kwaliteit: Kwaliteit::Nvt,
            mits: Criterion::Geen,
            mozaiek: MosaicRule::Geen,
            match_level: MatchLevel::NoMatch,
            percentage,
            idx_in_dt: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.vegtype_in_dt.is_some() && self.match_level.is_match()
    }

    /// Criterion AND mosaic rule; both must have been checked
    pub fn combined_evaluation(&self) -> HabResult<TriState> {
        Ok(self.mits.evaluation()? & self.mozaiek.evaluation()?)
    }

    pub fn explain(&self) -> String {
        let code = |c: &Option<VegCode>| c.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        format!(
            "{} (tabel: {}) => {} ({}): {}; {}",
            code(&self.onderbouwend_vegtype),
            code(&self.vegtype_in_dt),
            self.habtype,
            self.kwaliteit,
            self.mits.explain(),
            self.mozaiek.explain(),
        )
    }
}

/// The authoritative outcome for one complex-part
///
/// The habitat id always agrees with the status: a real habitat type only with
/// HABITATTYPE_TOEGEKEND, otherwise the status' sentinel with quality Nvt.
#[derive(Debug, Clone, Serialize)]
pub struct HabitatKeuze {
    status: KeuzeStatus,
    habtype: String,
    kwaliteit: Kwaliteit,
    percentage: f64,
    habitatvoorstellen: Vec<HabitatVoorstel>,
    toelichting: String,
}

impl HabitatKeuze {
    pub fn toegekend(
        habtype: impl Into<String>,
        kwaliteit: Kwaliteit,
        percentage: f64,
        habitatvoorstellen: Vec<HabitatVoorstel>,
        toelichting: impl Into<String>,
    ) -> HabResult<Self> {
        let habtype = habtype.into();
        if habtype == H0000 || habtype == HXXXX {
            return Err(HabitatError::invariant(format!(
                "HABITATTYPE_TOEGEKEND cannot carry sentinel {}",
                habtype
            )));
        }
        if kwaliteit == Kwaliteit::Nvt {
            return Err(HabitatError::invariant(format!(
                "habitat type {} assigned without a quality",
                habtype
            )));
        }
        Ok(Self {
            status: KeuzeStatus::HabitattypeToegekend,
            habtype,
            kwaliteit,
            percentage,
            habitatvoorstellen,
            toelichting: toelichting.into(),
        })
    }

    /// Keuze carrying the sentinel habitat id of `status`
    pub fn sentinel(
        status: KeuzeStatus,
        percentage: f64,
        habitatvoorstellen: Vec<HabitatVoorstel>,
        toelichting: impl Into<String>,
    ) -> HabResult<Self> {
        let habtype = status.habtype_class().sentinel().ok_or_else(|| {
            HabitatError::invariant(format!("{:?} needs a real habitat type", status))
        })?;
        Ok(Self {
            status,
            habtype: habtype.to_string(),
            kwaliteit: Kwaliteit::Nvt,
            percentage,
            habitatvoorstellen,
            toelichting: toelichting.into(),
        })
    }

    pub fn status(&self) -> KeuzeStatus {
        self.status
    }

    pub fn habtype(&self) -> &str {
        &self.habtype
    }

    pub fn kwaliteit(&self) -> Kwaliteit {
        self.kwaliteit
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    pub fn habitatvoorstellen(&self) -> &[HabitatVoorstel] {
        &self.habitatvoorstellen
    }

    pub fn toelichting(&self) -> &str {
        &self.toelichting
    }

    pub fn is_toegekend(&self) -> bool {
        self.status == KeuzeStatus::HabitattypeToegekend
    }

    pub fn is_waiting(&self) -> bool {
        self.status == KeuzeStatus::WachtenOpMozaiek
    }

    /// Table codes of the supporting proposals (what mosaic rules qualify on)
    pub fn supporting_table_codes(&self) -> SmallVec<[VegCode; 2]> {
        let mut codes: SmallVec<[VegCode; 2]> = SmallVec::new();
        for code in self.habitatvoorstellen.iter().filter_map(|v| v.vegtype_in_dt.as_ref()) {
            if !codes.contains(code) {
                codes.push(code.clone());
            }
        }
        codes
    }

    pub fn append_toelichting(&mut self, extra: &str) {
        if !self.toelichting.is_empty() {
            self.toelichting.push(' ');
        }
        self.toelichting.push_str(extra);
    }

    /// Demote an assigned habitat type whose cluster is too small
    ///
    /// Returns `false` (and changes nothing) unless the keuze was assigned.
    pub fn demote_minimum_area(&mut self, cluster_area: f64, minimum: f64) -> bool {
        if !self.is_toegekend() {
            return false;
        }
        let note = format!(
            "{} Oppervlak van het cluster met {} is {:.2}, minimum is {:.2}.",
            KeuzeStatus::MinimumOppNietGehaald.toelichting(),
            self.habtype,
            cluster_area,
            minimum
        );
        self.status = KeuzeStatus::MinimumOppNietGehaald;
        self.habtype = H0000.to_string();
        self.kwaliteit = Kwaliteit::Nvt;
        self.append_toelichting(&note);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_status_has_one_class() {
        use KeuzeStatus::*;
        let statuses = [
            HabitattypeToegekend,
            VoldoetNietAanHabtypevoorwaarden,
            VoldoetAanMeerdereHabtypen,
            WachtenOpMozaiek,
            NietGeautomatiseerdCriterium,
            NietGeautomatiseerdVegtype,
            GeenOpgegevenVegtypen,
            VegtypenNietInDeftabel,
            MinimumOppNietGehaald,
        ];
        for status in statuses {
            let keuze = HabitatKeuze::sentinel(status, 100.0, vec![], "");
            match status.habtype_class() {
                HabtypeClass::Habitattype => assert!(keuze.is_err()),
                HabtypeClass::GeenHabitat => assert_eq!(keuze.unwrap().habtype(), H0000),
                HabtypeClass::Onbepaald => assert_eq!(keuze.unwrap().habtype(), HXXXX),
            }
        }
    }

    #[test]
    fn test_toegekend_rejects_sentinels() {
        assert!(HabitatKeuze::toegekend(H0000, Kwaliteit::Goed, 100.0, vec![], "").is_err());
        assert!(HabitatKeuze::toegekend("H2130", Kwaliteit::Nvt, 100.0, vec![], "").is_err());
        let keuze = HabitatKeuze::toegekend("H2130", Kwaliteit::Goed, 100.0, vec![], "").unwrap();
        assert_eq!(keuze.kwaliteit(), Kwaliteit::Goed);
    }

    #[test]
    fn test_demote() {
        let mut keuze = HabitatKeuze::toegekend("H2130", Kwaliteit::Matig, 40.0, vec![], "ok").unwrap();
        assert!(keuze.demote_minimum_area(80.0, 100.0));
        assert_eq!(keuze.status(), KeuzeStatus::MinimumOppNietGehaald);
        assert_eq!(keuze.habtype(), H0000);
        assert_eq!(keuze.kwaliteit(), Kwaliteit::Nvt);
        assert!(keuze.toelichting().contains("minimum is 100.00"));
        assert!(!keuze.demote_minimum_area(80.0, 100.0));
    }

    #[test]
    fn test_kwaliteit() {
        assert_eq!(Kwaliteit::parse("G"), Some(Kwaliteit::Goed));
        assert_eq!(Kwaliteit::parse(" matig "), Some(Kwaliteit::Matig));
        assert_eq!(Kwaliteit::parse(""), Some(Kwaliteit::Nvt));
        assert_eq!(Kwaliteit::parse("slecht"), None);
        assert_eq!(Kwaliteit::Matig.best(Kwaliteit::Goed), Kwaliteit::Goed);
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&KeuzeStatus::WachtenOpMozaiek).unwrap();
        assert_eq!(json, r#""WACHTEN_OP_MOZAIEK""#);
    }
}
