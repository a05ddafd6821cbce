//! Full import into the import schema.
//!
//! Elements are loaded into the element store first. Rows are then derived
//! in four barrier-separated stages: nodes, ways outside assembled
//! relations, relations, and finally the ways held back for the relation
//! stage. Workers hand row batches to a single writer thread.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread;

use log::{info, warn};
use osmstage_core::{ElementKind, OutputRow};
use rayon::prelude::*;

use super::emit::{Consumption, Emitted, Emitter};
use super::writer::{self, RowCounts};
use super::{DefectCounts, Pipeline, PipelineError, add_counts, log_summary};
use crate::cache::ElementStore;
use crate::ingest::{ElementSource, IngestSummary};
use crate::storage::StorageDriver;

/// Outcome of a completed import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportReport {
    /// Elements read from the source.
    pub summary: IngestSummary,
    /// Rows written per physical table.
    pub rows_per_table: BTreeMap<String, u64>,
    /// Geometry defects per category.
    pub defects: DefectCounts,
}

impl ImportReport {
    /// Rows written across every table.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.rows_per_table.values().sum()
    }

    /// Defects across every category.
    #[must_use]
    pub fn total_defects(&self) -> u64 {
        self.defects.values().sum()
    }
}

/// Per-stage accumulator, merged across workers.
#[derive(Debug, Default)]
struct StageTally {
    rows: u64,
    defects: BTreeMap<&'static str, u64>,
    consumed: HashMap<i64, Consumption>,
}

impl StageTally {
    /// Take the bookkeeping out of `emitted` and hand back its rows.
    fn absorb(&mut self, emitted: Emitted) -> Vec<OutputRow> {
        for defect in &emitted.defects {
            *self.defects.entry(defect.category()).or_default() += 1;
        }
        for (way_id, table, label) in emitted.consumed {
            self.consumed.entry(way_id).or_default().insert((table, label));
        }
        self.rows += emitted.rows.len() as u64;
        emitted.rows
    }

    fn combine(mut self, other: Self) -> Self {
        self.rows += other.rows;
        for (category, count) in other.defects {
            *self.defects.entry(category).or_default() += count;
        }
        for (way_id, pairs) in other.consumed {
            self.consumed.entry(way_id).or_default().extend(pairs);
        }
        self
    }

    fn defect_total(&self) -> u64 {
        self.defects.values().sum()
    }
}

/// Why the stages stopped before the last one finished.
enum Interrupted {
    Cancelled(&'static str),
    /// The writer hung up; its own error explains why.
    WriterGone(&'static str),
}

impl From<Interrupted> for PipelineError {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::Cancelled(stage) => Self::Cancelled { stage },
            Interrupted::WriterGone(stage) => Self::WriterStopped { stage },
        }
    }
}

impl<D: StorageDriver> Pipeline<D> {
    /// Import every element of `source` into the import schema.
    ///
    /// Requires an absent import schema. On failure or cancellation the
    /// import schema is left incomplete and cannot be deployed until it is
    /// discarded and imported again.
    pub fn import<S>(&self, source: &S) -> Result<ImportReport, PipelineError>
    where
        S: ElementSource + ?Sized,
    {
        let state = self.state()?;
        let importing = state.importing()?;
        let schema = importing.schemas.import.clone();
        self.driver.drop_schema(&schema)?;
        self.driver.create_tables(&schema, &self.table_defs())?;
        self.driver.store_state(&importing)?;
        info!("Importing into schema {schema}");

        let store = ElementStore::new();
        let summary = source.read_elements(&|element| {
            store.put(element);
        })?;
        log_summary(&summary);
        if summary.skipped > 0 {
            warn!("Skipped {} invalid elements", summary.skipped);
        }

        let pool = self.thread_pool()?;
        let (rows_per_table, tally) = self.derive_rows(&pool, &store, &schema)?;

        self.check_cancelled("snapshot")?;
        store.save(&self.config.cache_path(&schema))?;
        self.driver.store_state(&importing.imported())?;

        let mut defects = DefectCounts::new();
        add_counts(
            &mut defects,
            tally
                .defects
                .into_iter()
                .map(|(category, count)| (category.to_owned(), count)),
        );
        let report = ImportReport {
            summary,
            rows_per_table,
            defects,
        };
        info!(
            "Import complete: {} rows, {} defects",
            report.total_rows(),
            report.total_defects()
        );
        Ok(report)
    }

    fn derive_rows(
        &self,
        pool: &rayon::ThreadPool,
        store: &ElementStore,
        schema: &str,
    ) -> Result<(RowCounts, StageTally), PipelineError> {
        let (sender, receiver) = sync_channel(self.config.channel_capacity.max(1));
        thread::scope(|scope| {
            let writer = scope
                .spawn(|| writer::drain(&self.driver, schema, self.config.batch_size, receiver));
            let staged = pool.install(|| self.run_stages(store, sender));
            let written = writer
                .join()
                .map_err(|_| PipelineError::WriterPanicked)?;
            // A storage failure explains a hung-up channel, so it wins.
            let counts = written?;
            Ok((counts, staged.map_err(PipelineError::from)?))
        })
    }

    fn run_stages(
        &self,
        store: &ElementStore,
        sender: SyncSender<Vec<OutputRow>>,
    ) -> Result<StageTally, Interrupted> {
        let emitter = Emitter::new(store, &self.classifier);

        self.barrier("node")?;
        let nodes = store.ids(ElementKind::Node);
        let node_tally = run_stage("node", &nodes, &sender, |id| {
            store
                .node(id)
                .map(|node| emitter.node_rows(&node))
                .unwrap_or_default()
        })?;

        self.barrier("way")?;
        let (deferred, standalone): (Vec<i64>, Vec<i64>) = store
            .ids(ElementKind::Way)
            .into_par_iter()
            .partition(|&id| emitter.has_assembled_parent(id));
        let way_tally = run_stage("way", &standalone, &sender, |id| {
            store
                .way(id)
                .map(|way| emitter.way_rows(&way, None))
                .unwrap_or_default()
        })?;

        self.barrier("relation")?;
        let relations = store.ids(ElementKind::Relation);
        let relation_tally = run_stage("relation", &relations, &sender, |id| {
            store
                .relation(id)
                .map(|relation| emitter.relation_rows(&relation))
                .unwrap_or_default()
        })?;

        self.barrier("member way")?;
        let consumed = &relation_tally.consumed;
        let member_tally = run_stage("member way", &deferred, &sender, |id| {
            store
                .way(id)
                .map(|way| emitter.way_rows(&way, consumed.get(&id)))
                .unwrap_or_default()
        })?;

        Ok(node_tally
            .combine(way_tally)
            .combine(relation_tally)
            .combine(member_tally))
    }
}

impl<D: StorageDriver> Pipeline<D> {
    fn barrier(&self, stage: &'static str) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled(stage));
        }
        Ok(())
    }
}

fn run_stage<F>(
    stage: &'static str,
    ids: &[i64],
    sender: &SyncSender<Vec<OutputRow>>,
    derive: F,
) -> Result<StageTally, Interrupted>
where
    F: Fn(i64) -> Emitted + Sync,
{
    let tally = ids
        .par_iter()
        .map_with(sender.clone(), |sender, &id| {
            let mut tally = StageTally::default();
            let rows = tally.absorb(derive(id));
            if !rows.is_empty() {
                sender
                    .send(rows)
                    .map_err(|_| Interrupted::WriterGone(stage))?;
            }
            Ok(tally)
        })
        .try_reduce(StageTally::default, |left, right| Ok(left.combine(right)))?;

    info!(
        "{stage} stage: {} elements, {} rows, {} defects",
        ids.len(),
        tally.rows,
        tally.defect_total()
    );
    if tally.defect_total() > 0 {
        warn!("{stage} stage dropped geometry: {:?}", tally.defects);
    }
    Ok(tally)
}
