//! Bookkeeping tables shared by every schema.

use rusqlite::{OptionalExtension, Transaction};

use super::StorageError;

pub(super) const SCHEMA_VERSION: i64 = 1;

/// Create the version and state tables, or check an existing version.
pub(super) fn initialise(transaction: &Transaction<'_>) -> Result<(), StorageError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS osmstage_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create osmstage_state",
        "CREATE TABLE IF NOT EXISTS osmstage_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            state TEXT NOT NULL
        )",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM osmstage_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| StorageError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StorageError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO osmstage_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| StorageError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), StorageError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| StorageError::Migration { step, source })
}
