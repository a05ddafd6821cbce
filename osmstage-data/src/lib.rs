//! Ingestion, persistence and the import pipeline for osmstage.
//!
//! Responsibilities:
//! - Decode element feeds (PBF files, change files, in-memory lists).
//! - Hold every element in a sharded store with a reverse dependency index.
//! - Derive rows through `osmstage-core` and write them via a storage driver.
//! - Move schemas through import, deploy, revert and diff.
//!
//! Boundaries:
//! - Classification and geometry rules live in `osmstage-core`.
//! - Process configuration and argument parsing live in `osmstage-cli`.
//!
//! Invariants:
//! - Pipeline state is an explicit [`ImportState`] persisted by the driver.
//! - No global mutable state.

mod cache;
mod ingest;
mod pipeline;
mod state;
mod storage;

pub use cache::{
    CacheError, DependencyIndex, ElementStore, ResolvedWay, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
pub use ingest::{
    Change, ElementSource, IngestSummary, MemorySource, PbfSource, SourceError, read_change_file,
    read_changes,
};
pub use pipeline::{
    CancelToken, DefectCounts, DiffReport, ImportReport, Pipeline, PipelineConfig, PipelineError,
};
pub use state::{ImportState, Phase, SchemaNames, StagingStatus, TransitionError};
pub use storage::{RowScope, SqliteDriver, StorageDriver, StorageError, StoredRow, TableDef};
