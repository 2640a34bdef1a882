//! Vegetation code → habitat proposals
//!
//! For every surveyed code the matcher keeps the table rows at the most specific
//! match level found for that code. Ties are all kept. Codes of one complex-part
//! are never filtered against each other.
//!
//! The table is static and the same (code, percentage) pairs recur across a
//! survey, so lookups are memoised. Cached proposals are handed out as clones:
//! every polygon gets its own criteria to check.

use moka::sync::Cache;
use std::sync::Arc;

use crate::data::DefinitionTable;
use crate::resolver::types::HabitatVoorstel;
use crate::vegetation::{MatchLevel, VegCode, VegTypeInfo};

/// Default number of memoised (code, percentage) lookups
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

type MatchKey = (VegCode, u64);

pub struct HabitatMatcher {
    table: DefinitionTable,
    cache: Cache<MatchKey, Arc<Vec<HabitatVoorstel>>>,
}

impl HabitatMatcher {
    pub fn new(table: DefinitionTable) -> Self {
        Self::with_capacity(table, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(table: DefinitionTable, capacity: u64) -> Self {
        tracing::info!(
            "Initializing habitat matcher ({} table rows, cache capacity {})",
            table.len(),
            capacity
        );
        let cache = Cache::builder().max_capacity(capacity).build();
        Self { table, cache }
    }

    pub fn table(&self) -> &DefinitionTable {
        &self.table
    }

    /// All proposals for the codes of one complex-part
    ///
    /// Empty when no code matches.
    pub fn find_habitats(&self, info: &VegTypeInfo) -> Vec<HabitatVoorstel> {
        info.codes()
            .into_iter()
            .flat_map(|code| self.match_code(code, info.percentage))
            .collect()
    }

    /// Like `find_habitats`, plus a placeholder for every code that matched nothing
    pub fn proposals_for_part(&self, info: &VegTypeInfo) -> Vec<HabitatVoorstel> {
        let mut voorstellen = Vec::new();
        for code in info.codes() {
            let found = self.match_code(code, info.percentage);
            if found.is_empty() {
                voorstellen.push(HabitatVoorstel::not_in_definition_table(code.clone(), info.percentage));
            } else {
                voorstellen.extend(found);
            }
        }
        voorstellen
    }

    /// Proposals for one surveyed code at its maximum match level
    pub fn match_code(&self, code: &VegCode, percentage: f64) -> Vec<HabitatVoorstel> {
        let key = (code.clone(), percentage.to_bits());
        let cached = self
            .cache
            .get_with(key, || Arc::new(self.lookup(code, percentage)));
        cached.as_ref().clone()
    }

    fn lookup(&self, code: &VegCode, percentage: f64) -> Vec<HabitatVoorstel> {
        let scored: Vec<(usize, MatchLevel)> = self
            .table
            .rows_for_class(code)
            .map(|(idx, row)| (idx, row.code.specificity_of_match(code)))
            .filter(|(_, level)| level.is_match())
            .collect();

        let Some(best) = scored.iter().map(|(_, level)| *level).max() else {
            return Vec::new();
        };

        scored
            .into_iter()
            .filter(|(_, level)| *level == best)
            .map(|(idx, level)| {
                let row = &self.table.rows()[idx];
                let mut mits = row.mits.clone();
                mits.reset();
                let mut mozaiek = row.mozaiek.clone();
                mozaiek.reset();
                HabitatVoorstel {
                    onderbouwend_vegtype: Some(code.clone()),
                    vegtype_in_dt: Some(row.code.clone()),
                    habtype: row.habtype.clone(),
                    kwaliteit: row.kwaliteit,
                    mits,
                    mozaiek,
                    match_level: level,
                    percentage,
                    idx_in_dt: Some(idx),
                }
            })
            .collect()
    }

    /// Approximate number of memoised lookups
    pub fn cached_lookups(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}
