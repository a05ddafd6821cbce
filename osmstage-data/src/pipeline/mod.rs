//! Pipeline controller: imports, schema transitions and diffs.
//!
//! The controller threads an explicit [`ImportState`] through every
//! operation. The state is loaded from the storage driver at the start of an
//! operation and stored back by the driver in the same transaction as the
//! schema change it describes.
//!
//! Each schema has an element store snapshot next to it in the cache
//! directory (`<schema>.cache`). Diffs need the production snapshot to find
//! the dependency closure of a change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use osmstage_core::TagClassifier;
use thiserror::Error;

use crate::cache::CacheError;
use crate::ingest::{IngestSummary, SourceError};
use crate::state::{ImportState, SchemaNames, TransitionError};
use crate::storage::{StorageDriver, StorageError, TableDef};

mod diff;
mod emit;
mod import;
mod writer;

pub use diff::DiffReport;
pub use import::ImportReport;

const DEFAULT_BATCH_SIZE: usize = 10_000;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tuning and naming for a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Schema names.
    pub schemas: SchemaNames,
    /// Directory holding element store snapshots.
    pub cache_dir: Utf8PathBuf,
    /// Rows per storage flush.
    pub batch_size: usize,
    /// Row batches queued between workers and the writer.
    pub channel_capacity: usize,
    /// Worker threads. Zero lets rayon decide.
    pub workers: usize,
}

impl PipelineConfig {
    /// Defaults with snapshots kept under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            schemas: SchemaNames::default(),
            cache_dir: cache_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            workers: 0,
        }
    }

    /// Snapshot file for `schema`.
    #[must_use]
    pub fn cache_path(&self, schema: &str) -> Utf8PathBuf {
        self.cache_dir.join(format!("{schema}.cache"))
    }
}

/// Shared flag that stops an import at the next stage barrier.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors raised by the pipeline controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The operation is not valid in the current state.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// The storage driver failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An element store snapshot could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The element source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The worker pool could not be started.
    #[error("failed to start worker pool")]
    ThreadPool(#[source] rayon::ThreadPoolBuildError),
    /// A cache file could not be moved or removed.
    #[error("failed to update cache file {path}")]
    CacheFile {
        /// File involved.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The import was cancelled; the import schema stays incomplete.
    #[error("import cancelled before the {stage} stage")]
    Cancelled {
        /// Stage that did not run.
        stage: &'static str,
    },
    /// A table expected in a schema is missing.
    #[error("table {table} is missing from schema {schema}; revert the deploy or re-import")]
    Inconsistent {
        /// Schema inspected.
        schema: String,
        /// Physical table name.
        table: String,
    },
    /// The row writer stopped before every row was handed over.
    #[error("row writer stopped before the {stage} stage finished")]
    WriterStopped {
        /// Stage whose rows were refused.
        stage: &'static str,
    },
    /// The row writer thread panicked.
    #[error("row writer thread panicked")]
    WriterPanicked,
}

/// Defect counts keyed by category.
pub type DefectCounts = BTreeMap<String, u64>;

/// Drives imports, deploys and diffs against a storage driver.
#[derive(Debug)]
pub struct Pipeline<D> {
    driver: D,
    classifier: TagClassifier,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl<D: StorageDriver> Pipeline<D> {
    /// Pipeline writing through `driver` with rules from `classifier`.
    pub fn new(driver: D, classifier: TagClassifier, config: PipelineConfig) -> Self {
        Self {
            driver,
            classifier,
            config,
            cancel: CancelToken::default(),
        }
    }

    /// The storage driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The compiled mapping.
    pub fn classifier(&self) -> &TagClassifier {
        &self.classifier
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels a running import.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The recorded state, or a fresh one for an empty database.
    pub fn state(&self) -> Result<ImportState, PipelineError> {
        Ok(self
            .driver
            .load_state()?
            .unwrap_or_else(|| ImportState::with_schemas(self.config.schemas.clone())))
    }

    /// Drop the import schema and its snapshot, whatever their condition.
    pub fn discard_staging(&self) -> Result<ImportState, PipelineError> {
        let state = self.state()?;
        let schemas = &state.schemas;
        self.driver.drop_schema(&schemas.import)?;
        let next = state.discarded();
        self.driver.store_state(&next)?;
        remove_cache(&self.config.cache_path(&schemas.import))?;
        info!("Discarded import schema {}", schemas.import);
        Ok(next)
    }

    /// Promote the completed import schema to production.
    ///
    /// The previous production schema becomes the backup, replacing any
    /// older backup. The database swap is one transaction; snapshot files
    /// follow once it has committed.
    pub fn deploy(&self) -> Result<ImportState, PipelineError> {
        let state = self.state()?;
        let next = state.deployed()?;
        let schemas = &state.schemas;
        self.driver.deploy(schemas, &next)?;

        let import = self.config.cache_path(&schemas.import);
        let production = self.config.cache_path(&schemas.production);
        let backup = self.config.cache_path(&schemas.backup);
        remove_cache(&backup)?;
        move_cache(&production, &backup)?;
        move_cache(&import, &production)?;
        Ok(next)
    }

    /// Restore the backup schema to production.
    ///
    /// The displaced production schema becomes a complete import schema.
    pub fn revert_deploy(&self) -> Result<ImportState, PipelineError> {
        let state = self.state()?;
        let next = state.reverted()?;
        let schemas = &state.schemas;
        self.driver.revert_deploy(schemas, &next)?;

        let import = self.config.cache_path(&schemas.import);
        let production = self.config.cache_path(&schemas.production);
        let backup = self.config.cache_path(&schemas.backup);
        remove_cache(&import)?;
        move_cache(&production, &import)?;
        move_cache(&backup, &production)?;
        Ok(next)
    }

    /// Drop the backup schema and its snapshot.
    pub fn remove_backup(&self) -> Result<ImportState, PipelineError> {
        let state = self.state()?;
        let next = state.backup_removed()?;
        self.driver.remove_backup(&state.schemas, &next)?;
        remove_cache(&self.config.cache_path(&state.schemas.backup))?;
        info!("Removed backup schema {}", state.schemas.backup);
        Ok(next)
    }

    fn table_defs(&self) -> Vec<TableDef> {
        self.classifier
            .physical_tables()
            .into_iter()
            .map(|(kind, name)| TableDef::new(name, kind))
            .collect()
    }

    fn check_cancelled(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, PipelineError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|index| format!("osmstage-worker-{index}"))
            .build()
            .map_err(PipelineError::ThreadPool)
    }
}

/// Merge per-stage tallies of summary data.
fn add_counts(into: &mut DefectCounts, from: impl IntoIterator<Item = (String, u64)>) {
    for (key, count) in from {
        *into.entry(key).or_default() += count;
    }
}

fn move_cache(from: &Utf8Path, to: &Utf8Path) -> Result<(), PipelineError> {
    if !osmstage_fs::file_exists(from).map_err(|source| PipelineError::CacheFile {
        path: from.to_owned(),
        source,
    })? {
        return remove_cache(to);
    }
    osmstage_fs::rename_sibling(from, to).map_err(|source| PipelineError::CacheFile {
        path: from.to_owned(),
        source,
    })
}

fn remove_cache(path: &Utf8Path) -> Result<(), PipelineError> {
    osmstage_fs::remove_file_if_exists(path).map_err(|source| PipelineError::CacheFile {
        path: path.to_owned(),
        source,
    })
}

/// Summary of elements read, shared by reports.
pub(crate) fn log_summary(summary: &IngestSummary) {
    info!(
        "Read {} nodes, {} ways and {} relations ({} skipped)",
        summary.nodes, summary.ways, summary.relations, summary.skipped
    );
}
