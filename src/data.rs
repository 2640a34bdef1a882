//! Definition table loading and lookup
//!
//! The definition table maps vegetation codes to candidate habitat types, each
//! with its quality, criterion tree and mosaic rule. It arrives already cleaned
//! (CSV or DataFrame); this module only parses the cells and indexes the rows.
//!
//! Columns: `Habitattype`, `Kwaliteit`, `SBB`, `VvN`, `mits`, `mozaiek`.
//! `mits` / `mozaiek` hold serde JSON of the tagged trees; empty means none.

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::criteria::{Criterion, OverrideCriterium};
use crate::error::HabResult;
use crate::mosaic::MosaicRule;
use crate::resolver::types::{Kwaliteit, H0000, HXXXX};
use crate::vegetation::{CodeFamily, VegCode};

pub const COL_HABITATTYPE: &str = "Habitattype";
pub const COL_KWALITEIT: &str = "Kwaliteit";
pub const COL_SBB: &str = "SBB";
pub const COL_VVN: &str = "VvN";
pub const COL_MITS: &str = "mits";
pub const COL_MOZAIEK: &str = "mozaiek";

/// One (code → habitat type) line of the table
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionRow {
    pub habtype: String,
    pub kwaliteit: Kwaliteit,
    pub code: VegCode,
    pub mits: Criterion,
    pub mozaiek: MosaicRule,
    /// Line in the source table (0-based, header excluded)
    pub source_row: usize,
}

/// Indexed definition table
///
/// Rows are indexed by (family, klasse): a code can only match table codes of
/// its own class.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    rows: Vec<DefinitionRow>,
    by_class: FxHashMap<(CodeFamily, u16), Vec<usize>>,
}

impl DefinitionTable {
    /// Validate every row, index them and determine the mosaic rules' codes
    pub fn new(rows: Vec<DefinitionRow>) -> HabResult<Self> {
        for row in &rows {
            row.mits.validate()?;
            row.mozaiek.validate()?;
        }

        let mut table = Self {
            rows,
            by_class: FxHashMap::default(),
        };
        table.reindex();
        table.determine_mosaic_rules()?;
        Ok(table)
    }

    fn reindex(&mut self) {
        self.by_class.clear();
        for (idx, row) in self.rows.iter().enumerate() {
            self.by_class
                .entry((row.code.family(), row.code.klasse()))
                .or_default()
                .push(idx);
        }
    }

    /// Fill the qualifying codes of every standard mosaic rule, once
    fn determine_mosaic_rules(&mut self) -> HabResult<()> {
        let mut determined: Vec<(usize, MosaicRule)> = Vec::new();

        for (idx, row) in self.rows.iter().enumerate() {
            if let MosaicRule::Standaard(rule) = &row.mozaiek {
                let Some(habtype) = &rule.kwalificerend_habtype else {
                    continue;
                };
                let filtered = self.rows_for_habtype(habtype);
                let mut rule = rule.clone();
                rule.determine_kwalificerende_vegtypen(&filtered)?;
                determined.push((idx, MosaicRule::Standaard(rule)));
            }
        }

        for (idx, rule) in determined {
            self.rows[idx].mozaiek = rule;
        }
        Ok(())
    }

    pub fn rows(&self) -> &[DefinitionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose code is of the same family and class as `code`
    pub fn rows_for_class<'a>(&'a self, code: &VegCode) -> impl Iterator<Item = (usize, &'a DefinitionRow)> + 'a {
        self.by_class
            .get(&(code.family(), code.klasse()))
            .into_iter()
            .flatten()
            .map(move |&idx| (idx, &self.rows[idx]))
    }

    /// The table filtered to one habitat type, as mosaic rules require
    pub fn rows_for_habtype(&self, habtype: &str) -> Vec<&DefinitionRow> {
        self.rows.iter().filter(|row| row.habtype == habtype).collect()
    }

    /// Replace every criterion displayed as an override's `mitsnaam`
    ///
    /// Returns the number of replaced nodes.
    pub fn apply_overrides(&mut self, overrides: &[OverrideCriterium]) -> usize {
        let mut replaced = 0;
        for replacement in overrides {
            let count: usize = self
                .rows
                .iter_mut()
                .map(|row| row.mits.apply_override(replacement))
                .sum();
            if count == 0 {
                tracing::warn!("Override '{}' matched no criterion in the table", replacement.mitsnaam);
            }
            replaced += count;
        }
        tracing::info!("Applied {} criterion overrides ({} nodes replaced)", overrides.len(), replaced);
        replaced
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a cleaned definition table from CSV
    ///
    /// Every column is read as text so that codes like `08` keep their form.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to create CSV reader: {}", path.display()))?
            .finish()
            .with_context(|| format!("Failed to load definition table: {}", path.display()))?;

        let table = Self::from_dataframe(&df)
            .with_context(|| format!("Invalid definition table: {}", path.display()))?;
        tracing::info!("Loaded definition table {}: {} rows", path.display(), table.len());
        Ok(table)
    }

    /// Build from an already loaded DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let habtypen = string_column(df, COL_HABITATTYPE)?
            .with_context(|| format!("Column '{}' not found", COL_HABITATTYPE))?;
        let kwaliteiten = string_column(df, COL_KWALITEIT)?
            .with_context(|| format!("Column '{}' not found", COL_KWALITEIT))?;
        let sbb = string_column(df, COL_SBB)?;
        let vvn = string_column(df, COL_VVN)?;
        let mitsen = string_column(df, COL_MITS)?;
        let mozaieken = string_column(df, COL_MOZAIEK)?;

        if sbb.is_none() && vvn.is_none() {
            bail!("Definition table needs an '{}' or '{}' column", COL_SBB, COL_VVN);
        }

        let cell = |column: &Option<&StringChunked>, idx: usize| -> Option<String> {
            column
                .and_then(|c| c.get(idx))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let mut rows = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let habtype = cell(&Some(habtypen), idx)
                .with_context(|| format!("Row {}: empty habitat type", idx))?;
            let kwaliteit_text = cell(&Some(kwaliteiten), idx).unwrap_or_default();
            let kwaliteit = Kwaliteit::parse(&kwaliteit_text)
                .with_context(|| format!("Row {}: unknown quality '{}'", idx, kwaliteit_text))?;

            if habtype == HXXXX {
                bail!("Row {}: {} cannot be a table outcome", idx, HXXXX);
            }
            if (habtype == H0000) != (kwaliteit == Kwaliteit::Nvt) {
                bail!("Row {}: habitat type {} does not agree with quality {}", idx, habtype, kwaliteit);
            }

            let mits = match cell(&mitsen, idx) {
                Some(json) => serde_json::from_str::<Criterion>(&json)
                    .with_context(|| format!("Row {}: invalid criterion JSON", idx))?,
                None => Criterion::Geen,
            };
            let mozaiek = match cell(&mozaieken, idx) {
                Some(json) => serde_json::from_str::<MosaicRule>(&json)
                    .with_context(|| format!("Row {}: invalid mosaic rule JSON", idx))?,
                None => MosaicRule::Geen,
            };

            let codes = [
                (CodeFamily::Sbb, cell(&sbb, idx)),
                (CodeFamily::Vvn, cell(&vvn, idx)),
            ];
            for (family, text) in codes {
                let Some(text) = text else { continue };
                let code = VegCode::parse(family, &text).with_context(|| format!("Row {}", idx))?;
                rows.push(DefinitionRow {
                    habtype: habtype.clone(),
                    kwaliteit,
                    code,
                    mits: mits.clone(),
                    mozaiek: mozaiek.clone(),
                    source_row: idx,
                });
            }
        }

        Ok(Self::new(rows)?)
    }
}

/// String column when present; absent columns are `None`, wrong types an error
fn string_column<'a>(df: &'a DataFrame, name: &str) -> Result<Option<&'a StringChunked>> {
    match df.column(name) {
        Ok(column) => {
            let chunked = column
                .str()
                .with_context(|| format!("Column '{}' is not string type", name))?;
            Ok(Some(chunked))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::AttributeRow;
    use crate::utils::tristate::TriState;

    fn table_df() -> DataFrame {
        df![
            COL_HABITATTYPE => ["H2130", "H2130", "H4030", "H0000"],
            COL_KWALITEIT => ["Goed", "Matig", "G", "Nvt"],
            COL_SBB => [Some("14a1"), None, Some("20a"), None],
            COL_VVN => [Some("14aa1"), Some("14aa"), None, Some("42")],
            COL_MITS => [
                r#"{"type":"fgr","wanted_fgrtypen":["Duinen"]}"#,
                "",
                "",
                "",
            ],
            COL_MOZAIEK => [
                "",
                r#"{"type":"standaard","kwalificerend_habtype":"H2130"}"#,
                "",
                "",
            ],
        ]
        .unwrap()
    }

    #[test]
    fn test_from_dataframe() {
        let table = DefinitionTable::from_dataframe(&table_df()).unwrap();
        // First row has both an SBB and a VvN code
        assert_eq!(table.len(), 5);
        assert_eq!(table.rows()[0].code, VegCode::parse_sbb("14a1").unwrap());
        assert_eq!(table.rows()[1].code, VegCode::parse_vvn("14aa1").unwrap());
        assert_eq!(table.rows()[1].source_row, 0);
        assert!(matches!(table.rows()[0].mits, Criterion::Fgr(_)));
        assert_eq!(table.rows()[3].kwaliteit, Kwaliteit::Goed);
    }

    #[test]
    fn test_mosaic_rules_are_determined_on_load() {
        let table = DefinitionTable::from_dataframe(&table_df()).unwrap();
        let MosaicRule::Standaard(rule) = &table.rows()[2].mozaiek else {
            panic!("expected a standard mosaic rule");
        };
        // The H2130 row that itself has a mosaic rule is left out
        assert_eq!(
            rule.kwalificerende_vegtypen,
            Some(vec![VegCode::parse_sbb("14a1").unwrap(), VegCode::parse_vvn("14aa1").unwrap()])
        );
    }

    #[test]
    fn test_rows_for_class() {
        let table = DefinitionTable::from_dataframe(&table_df()).unwrap();
        let survey = VegCode::parse_vvn("14aa1b").unwrap();
        let found: Vec<usize> = table.rows_for_class(&survey).map(|(idx, _)| idx).collect();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(table.rows_for_habtype("H2130").len(), 3);
    }

    #[test]
    fn test_bad_code_and_quality_rejected() {
        let df = df![
            COL_HABITATTYPE => ["H2130"],
            COL_KWALITEIT => ["Goed"],
            COL_VVN => ["not-a-code"],
        ]
        .unwrap();
        assert!(DefinitionTable::from_dataframe(&df).is_err());

        let df = df![
            COL_HABITATTYPE => ["H2130"],
            COL_KWALITEIT => ["Nvt"],
            COL_VVN => ["14aa"],
        ]
        .unwrap();
        assert!(DefinitionTable::from_dataframe(&df).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut table = DefinitionTable::from_dataframe(&table_df()).unwrap();
        let leaf = OverrideCriterium::new("mits in FGR Duinen", TriState::True, None, None).unwrap();
        // Both rows from the first line carry the criterion
        assert_eq!(table.apply_overrides(&[leaf]), 2);

        let mut mits = table.rows()[0].mits.clone();
        mits.check(&AttributeRow::new().as_row()).unwrap();
        assert_eq!(mits.evaluation().unwrap(), TriState::True);
    }

    #[test]
    #[ignore] // Requires a definition table on disk
    fn test_load_csv() {
        let table = DefinitionTable::load_csv("data/definitietabel.csv").expect("Failed to load table");
        assert!(!table.is_empty());
    }
}
