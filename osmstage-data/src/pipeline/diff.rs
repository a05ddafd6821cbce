//! Incremental updates of the production schema.
//!
//! A diff re-derives the dependency closure of every changed element into a
//! scratch buffer, then swaps the buffer into production with one
//! [`StorageDriver::replace_rows`] call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;
use osmstage_core::{ElementKey, ElementKind, OutputRow, row_id};
use rayon::prelude::*;

use super::emit::{Consumption, Emitted, Emitter};
use super::{DefectCounts, Pipeline, PipelineError};
use crate::cache::ElementStore;
use crate::ingest::Change;
use crate::storage::{RowScope, StorageDriver};

/// Outcome of an applied diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffReport {
    /// Changes in the batch.
    pub changes: usize,
    /// Elements whose rows were cleared and derived again.
    pub rederived: usize,
    /// Rows written per physical table.
    pub rows_per_table: BTreeMap<String, u64>,
    /// Geometry defects per category.
    pub defects: DefectCounts,
}

impl DiffReport {
    /// Rows written across every table.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.rows_per_table.values().sum()
    }
}

impl<D: StorageDriver> Pipeline<D> {
    /// Apply `changes` to the deployed production schema.
    ///
    /// Every changed element, everything that depends on it and the member
    /// ways of affected relations are derived again. Their old rows are
    /// replaced in one unit; a failure leaves production and its snapshot
    /// untouched.
    pub fn apply_diff(&self, changes: &[Change]) -> Result<DiffReport, PipelineError> {
        let state = self.state()?;
        state.check_diff()?;
        let schema = &state.schemas.production;
        let tables = self.table_defs();
        for table in &tables {
            if !self.driver.table_exists(schema, &table.name)? {
                return Err(PipelineError::Inconsistent {
                    schema: schema.clone(),
                    table: table.name.clone(),
                });
            }
        }

        let snapshot = self.config.cache_path(schema);
        let store = ElementStore::load(&snapshot)?;

        let mut affected = BTreeSet::new();
        collect_affected(&store, changes, &mut affected);
        for change in changes {
            match change {
                Change::Upsert(element) => {
                    store.put(element.clone());
                }
                Change::Delete(key) => {
                    store.delete(*key);
                }
            }
        }
        collect_affected(&store, changes, &mut affected);

        let pool = self.thread_pool()?;
        let (rows, defects) = pool.install(|| self.rederive(&store, &affected));
        let scope = row_scope(&affected);
        self.driver.replace_rows(schema, &tables, &scope, &rows)?;
        store.save(&snapshot)?;

        let mut rows_per_table = BTreeMap::new();
        for row in &rows {
            *rows_per_table.entry(row.physical_table()).or_insert(0_u64) += 1;
        }
        let report = DiffReport {
            changes: changes.len(),
            rederived: affected.len(),
            rows_per_table,
            defects,
        };
        info!(
            "Applied {} changes to {schema}: {} elements re-derived, {} rows written",
            report.changes,
            report.rederived,
            report.total_rows()
        );
        Ok(report)
    }

    fn rederive(
        &self,
        store: &ElementStore,
        affected: &BTreeSet<ElementKey>,
    ) -> (Vec<OutputRow>, DefectCounts) {
        let emitter = Emitter::new(store, &self.classifier);

        // Every assembled relation that may claim an affected way.
        let mut assembling: BTreeSet<i64> = affected
            .iter()
            .filter(|key| key.kind == ElementKind::Relation)
            .map(|key| key.id)
            .collect();
        for key in affected.iter().filter(|key| key.kind == ElementKind::Way) {
            assembling.extend(emitter.assembled_parents(key.id).map(|relation| relation.id));
        }
        let mut relation_rows: HashMap<i64, Emitted> = assembling
            .into_par_iter()
            .filter_map(|id| {
                store
                    .relation(id)
                    .map(|relation| (id, emitter.relation_rows(&relation)))
            })
            .collect();
        let mut consumed: HashMap<i64, Consumption> = HashMap::new();
        for emitted in relation_rows.values() {
            for (way_id, table, label) in &emitted.consumed {
                consumed
                    .entry(*way_id)
                    .or_default()
                    .insert((*table, label.clone()));
            }
        }

        let mut derived: Vec<Emitted> = affected
            .par_iter()
            .filter_map(|key| match key.kind {
                ElementKind::Node => store.node(key.id).map(|node| emitter.node_rows(&node)),
                ElementKind::Way => store
                    .way(key.id)
                    .map(|way| emitter.way_rows(&way, consumed.get(&key.id))),
                ElementKind::Relation => None,
            })
            .collect();
        derived.extend(
            affected
                .iter()
                .filter(|key| key.kind == ElementKind::Relation)
                .filter_map(|key| relation_rows.remove(&key.id)),
        );

        let mut rows = Vec::new();
        let mut defects = DefectCounts::new();
        for emitted in derived {
            for defect in &emitted.defects {
                *defects.entry(defect.category().to_owned()).or_default() += 1;
            }
            rows.extend(emitted.rows);
        }
        rows.sort_by_key(OutputRow::sort_key);
        (rows, defects)
    }
}

/// Add the keys of `changes`, their dependents and the member ways of every
/// affected relation to `affected`, as the store currently links them.
fn collect_affected(store: &ElementStore, changes: &[Change], affected: &mut BTreeSet<ElementKey>) {
    for change in changes {
        let key = change.key();
        affected.insert(key);
        affected.extend(store.dependents(key));
    }
    let mut pending: Vec<i64> = affected
        .iter()
        .filter(|key| key.kind == ElementKind::Relation)
        .map(|key| key.id)
        .collect();
    let mut expanded = BTreeSet::new();
    while let Some(id) = pending.pop() {
        if !expanded.insert(id) {
            continue;
        }
        let Some(relation) = store.relation(id) else {
            continue;
        };
        for member in &relation.members {
            let key = member.target.key();
            match key.kind {
                ElementKind::Way => {
                    affected.insert(key);
                }
                ElementKind::Relation => pending.push(key.id),
                ElementKind::Node => {}
            }
        }
    }
}

fn row_scope(affected: &BTreeSet<ElementKey>) -> RowScope {
    let mut scope = RowScope::default();
    for key in affected {
        match key.kind {
            ElementKind::Node => {
                scope.nodes.insert(key.id);
            }
            ElementKind::Way => {
                scope.row_ids.insert(key.id);
            }
            ElementKind::Relation => {
                scope.row_ids.insert(row_id(*key));
            }
        }
    }
    scope
}
