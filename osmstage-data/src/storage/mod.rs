//! Storage drivers: where derived rows end up.
//!
//! Responsibilities:
//! - Create, fill and drop the physical tables of one schema.
//! - Swap schemas atomically on deploy and revert.
//! - Persist the [`ImportState`] alongside the tables it describes.
//!
//! Boundaries:
//! - Drivers never derive rows; they receive [`OutputRow`] batches.
//! - Every method is a single transaction. A failed call leaves the store
//!   as it was before the call.

use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use osmstage_core::{OutputRow, TableKind};
use rusqlite::Error as SqliteError;
use thiserror::Error;

use crate::state::{ImportState, SchemaNames};

mod schema;
mod sqlite;

pub use sqlite::{SqliteDriver, StoredRow};


/// A physical table to create or clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Physical table name, e.g. `osm_roads_gen0`.
    pub name: String,
    /// Geometry kind of the logical table.
    pub kind: TableKind,
}

impl TableDef {
    /// Table `name` holding `kind` geometries.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Row ids cleared by [`StorageDriver::replace_rows`].
///
/// Point tables hold node rows only, so they are cleared by node id. Other
/// tables are cleared by row id: way ids and negated relation ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowScope {
    /// Node ids to clear from point tables.
    pub nodes: BTreeSet<i64>,
    /// Row ids to clear from line and polygon tables.
    pub row_ids: BTreeSet<i64>,
}

impl RowScope {
    /// Ids to clear from a table of `kind`.
    #[must_use]
    pub const fn ids_for(&self, kind: TableKind) -> &BTreeSet<i64> {
        match kind {
            TableKind::Point => &self.nodes,
            TableKind::LineString | TableKind::Polygon => &self.row_ids,
        }
    }

    /// Whether nothing is cleared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.row_ids.is_empty()
    }
}

/// Relational sink for derived rows.
pub trait StorageDriver: Send + Sync {
    /// Create empty `tables` in `schema`.
    fn create_tables(&self, schema: &str, tables: &[TableDef]) -> Result<(), StorageError>;

    /// Drop every table of `schema`.
    fn drop_schema(&self, schema: &str) -> Result<(), StorageError>;

    /// Append `rows` to their tables in `schema`.
    fn write_rows(&self, schema: &str, rows: &[OutputRow]) -> Result<(), StorageError>;

    /// Clear the `scope` rows from every table in `tables`, then append
    /// `rows`, as one unit.
    fn replace_rows(
        &self,
        schema: &str,
        tables: &[TableDef],
        scope: &RowScope,
        rows: &[OutputRow],
    ) -> Result<(), StorageError>;

    /// Drop the backup, move production to backup and import to
    /// production, then record `next`.
    fn deploy(&self, schemas: &SchemaNames, next: &ImportState) -> Result<(), StorageError>;

    /// Drop the import schema, move production to import and backup to
    /// production, then record `next`.
    fn revert_deploy(&self, schemas: &SchemaNames, next: &ImportState)
    -> Result<(), StorageError>;

    /// Drop the backup schema, then record `next`.
    fn remove_backup(&self, schemas: &SchemaNames, next: &ImportState)
    -> Result<(), StorageError>;

    /// Whether `table` exists in `schema`.
    fn table_exists(&self, schema: &str, table: &str) -> Result<bool, StorageError>;

    /// The recorded state, if any.
    fn load_state(&self) -> Result<Option<ImportState>, StorageError>;

    /// Record `state`.
    fn store_state(&self, state: &ImportState) -> Result<(), StorageError>;
}

/// Errors raised by storage drivers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened.
    #[error("failed to open database at {path}")]
    Open {
        /// Database file.
        path: Utf8PathBuf,
        /// SQLite error.
        #[source]
        source: SqliteError,
    },
    /// A connection setting could not be applied.
    #[error("failed to apply SQLite pragma {pragma}")]
    Pragma {
        /// Pragma name.
        pragma: &'static str,
        /// SQLite error.
        #[source]
        source: SqliteError,
    },
    /// A bookkeeping migration step failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Step description.
        step: &'static str,
        /// SQLite error.
        #[source]
        source: SqliteError,
    },
    /// The database was written by an incompatible build.
    #[error(
        "expected osmstage schema version {expected} but found {found}; apply migrations before retrying"
    )]
    VersionMismatch {
        /// Version this build writes.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
    /// A schema or table name is not a plain identifier.
    #[error("{name:?} is not a valid schema or table name")]
    InvalidName {
        /// Offending name.
        name: String,
    },
    /// A statement failed.
    #[error("failed to {operation} on {table}")]
    Query {
        /// What was being done.
        operation: &'static str,
        /// Physical table or schema involved.
        table: String,
        /// SQLite error.
        #[source]
        source: SqliteError,
    },
    /// Row tags or geometry could not be encoded.
    #[error("failed to encode row for {table}")]
    Serialize {
        /// Physical table the row was destined for.
        table: String,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A stored row could not be decoded.
    #[error("stored row in {table} is corrupt")]
    CorruptRow {
        /// Physical table.
        table: String,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The recorded state could not be decoded or encoded.
    #[error("recorded import state is corrupt")]
    CorruptState {
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
}
