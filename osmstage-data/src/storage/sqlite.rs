//! SQLite storage driver.
//!
//! SQLite has no schemas that can be renamed inside one transaction, so a
//! schema is a table-name prefix: table `osm_roads` of schema `import` is
//! stored as `import__osm_roads`. Moving a schema renames every table with
//! the prefix. Geometries are stored as `geo` JSON with bounding-box columns
//! for coarse spatial filtering.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8Path;
use geo::Geometry;
use log::info;
use osmstage_core::{OutputRow, Tags};
use rusqlite::{Connection, OptionalExtension, params};

use super::{RowScope, StorageDriver, StorageError, TableDef, schema};
use crate::state::{ImportState, SchemaNames};

const SEPARATOR: &str = osmstage_core::mapping::SCHEMA_SEPARATOR;

/// A row read back from a table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Signed row id.
    pub osm_id: i64,
    /// Type label.
    pub type_label: String,
    /// Column values.
    pub tags: Tags,
    /// Stored geometry.
    pub geometry: Geometry<f64>,
}

/// Storage driver backed by one SQLite database.
///
/// # Examples
/// ```
/// use osmstage_core::TableKind;
/// use osmstage_data::{SqliteDriver, StorageDriver, TableDef};
///
/// # fn main() -> Result<(), osmstage_data::StorageError> {
/// let driver = SqliteDriver::open_in_memory()?;
/// driver.create_tables("import", &[TableDef::new("osm_roads", TableKind::LineString)])?;
/// assert!(driver.table_exists("import", "osm_roads")?);
/// assert!(!driver.table_exists("production", "osm_roads")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDriver {
    connection: Mutex<Connection>,
}

impl SqliteDriver {
    /// Open or create the database at `path`.
    pub fn open(path: &Utf8Path) -> Result<Self, StorageError> {
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| StorageError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(|source| StorageError::Pragma {
                pragma: "journal_mode",
                source,
            })?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let connection = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::from_connection(connection)
    }

    fn from_connection(mut connection: Connection) -> Result<Self, StorageError> {
        connection
            .busy_timeout(Duration::from_secs(30))
            .map_err(|source| StorageError::Pragma {
                pragma: "busy_timeout",
                source,
            })?;
        let transaction = connection
            .transaction()
            .map_err(|source| StorageError::Migration {
                step: "begin schema transaction",
                source,
            })?;
        schema::initialise(&transaction)?;
        transaction
            .commit()
            .map_err(|source| StorageError::Migration {
                step: "commit schema transaction",
                source,
            })?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Run `operation` with exclusive access to the connection.
    pub fn with_connection<T>(&self, operation: impl FnOnce(&mut Connection) -> T) -> T {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        operation(&mut connection)
    }

    /// Logical names of the tables in `schema`, sorted.
    pub fn tables(&self, schema: &str) -> Result<Vec<String>, StorageError> {
        validate_name(schema)?;
        self.with_connection(|connection| list_tables(connection, schema))
    }

    /// Every row of `table` in `schema`, ordered by id and type label.
    pub fn rows(&self, schema: &str, table: &str) -> Result<Vec<StoredRow>, StorageError> {
        let name = physical(schema, table)?;
        self.with_connection(|connection| {
            let query = |source| StorageError::Query {
                operation: "read rows",
                table: name.clone(),
                source,
            };
            let mut statement = connection
                .prepare(&format!(
                    "SELECT osm_id, type, tags, geometry FROM \"{name}\" ORDER BY osm_id, type, fid"
                ))
                .map_err(query)?;
            let raw = statement
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(query)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query)?;
            raw.into_iter()
                .map(|(osm_id, type_label, tags, geometry)| -> Result<_, StorageError> {
                    let corrupt = |source| StorageError::CorruptRow {
                        table: name.clone(),
                        source,
                    };
                    Ok(StoredRow {
                        osm_id,
                        type_label,
                        tags: serde_json::from_str(&tags).map_err(corrupt)?,
                        geometry: serde_json::from_str(&geometry).map_err(corrupt)?,
                    })
                })
                .collect()
        })
    }

    /// Number of rows in `table` of `schema`.
    pub fn row_count(&self, schema: &str, table: &str) -> Result<i64, StorageError> {
        let name = physical(schema, table)?;
        self.with_connection(|connection| {
            connection
                .query_row(&format!("SELECT count(*) FROM \"{name}\""), [], |row| {
                    row.get(0)
                })
                .map_err(|source| StorageError::Query {
                    operation: "count rows",
                    table: name.clone(),
                    source,
                })
        })
    }
}

impl StorageDriver for SqliteDriver {
    fn create_tables(&self, schema: &str, tables: &[TableDef]) -> Result<(), StorageError> {
        let names = tables
            .iter()
            .map(|table| physical(schema, &table.name))
            .collect::<Result<Vec<_>, _>>()?;
        self.in_transaction(schema, |transaction| {
            for name in &names {
                transaction
                    .execute_batch(&format!(
                        "CREATE TABLE \"{name}\" (
                            fid INTEGER PRIMARY KEY,
                            osm_id INTEGER NOT NULL,
                            type TEXT NOT NULL,
                            tags TEXT NOT NULL,
                            geometry TEXT NOT NULL,
                            min_x REAL,
                            min_y REAL,
                            max_x REAL,
                            max_y REAL
                        );
                        CREATE INDEX \"{name}{SEPARATOR}osm_id\" ON \"{name}\"(osm_id);"
                    ))
                    .map_err(|source| StorageError::Query {
                        operation: "create table",
                        table: name.clone(),
                        source,
                    })?;
            }
            Ok(())
        })
    }

    fn drop_schema(&self, schema: &str) -> Result<(), StorageError> {
        validate_name(schema)?;
        self.in_transaction(schema, |transaction| drop_tables(transaction, schema))
    }

    fn write_rows(&self, schema: &str, rows: &[OutputRow]) -> Result<(), StorageError> {
        validate_name(schema)?;
        self.in_transaction(schema, |transaction| insert_rows(transaction, schema, rows))
    }

    fn replace_rows(
        &self,
        schema: &str,
        tables: &[TableDef],
        scope: &RowScope,
        rows: &[OutputRow],
    ) -> Result<(), StorageError> {
        validate_name(schema)?;
        self.in_transaction(schema, |transaction| {
            for table in tables {
                let name = physical(schema, &table.name)?;
                let delete = |source| StorageError::Query {
                    operation: "delete rows",
                    table: name.clone(),
                    source,
                };
                let mut statement = transaction
                    .prepare_cached(&format!("DELETE FROM \"{name}\" WHERE osm_id = ?1"))
                    .map_err(delete)?;
                for id in scope.ids_for(table.kind) {
                    statement.execute([id]).map_err(delete)?;
                }
            }
            insert_rows(transaction, schema, rows)
        })
    }

    fn deploy(&self, schemas: &SchemaNames, next: &ImportState) -> Result<(), StorageError> {
        validate_schemas(schemas)?;
        self.in_transaction(&schemas.import, |transaction| {
            drop_tables(transaction, &schemas.backup)?;
            rename_schema(transaction, &schemas.production, &schemas.backup)?;
            rename_schema(transaction, &schemas.import, &schemas.production)?;
            write_state(transaction, next)
        })?;
        info!(
            "Deployed {} as {}; previous tables kept in {}",
            schemas.import, schemas.production, schemas.backup
        );
        Ok(())
    }

    fn revert_deploy(
        &self,
        schemas: &SchemaNames,
        next: &ImportState,
    ) -> Result<(), StorageError> {
        validate_schemas(schemas)?;
        self.in_transaction(&schemas.backup, |transaction| {
            drop_tables(transaction, &schemas.import)?;
            rename_schema(transaction, &schemas.production, &schemas.import)?;
            rename_schema(transaction, &schemas.backup, &schemas.production)?;
            write_state(transaction, next)
        })?;
        info!(
            "Restored {} as {}; reverted tables kept in {}",
            schemas.backup, schemas.production, schemas.import
        );
        Ok(())
    }

    fn remove_backup(
        &self,
        schemas: &SchemaNames,
        next: &ImportState,
    ) -> Result<(), StorageError> {
        validate_schemas(schemas)?;
        self.in_transaction(&schemas.backup, |transaction| {
            drop_tables(transaction, &schemas.backup)?;
            write_state(transaction, next)
        })
    }

    fn table_exists(&self, schema: &str, table: &str) -> Result<bool, StorageError> {
        let name = physical(schema, table)?;
        self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&name],
                    |_| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
                .map_err(|source| StorageError::Query {
                    operation: "look up table",
                    table: name.clone(),
                    source,
                })
        })
    }

    fn load_state(&self) -> Result<Option<ImportState>, StorageError> {
        let raw: Option<String> = self.with_connection(|connection| {
            connection
                .query_row("SELECT state FROM osmstage_state WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|source| StorageError::Query {
                    operation: "read state",
                    table: "osmstage_state".to_owned(),
                    source,
                })
        })?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|source| StorageError::CorruptState { source })
        })
        .transpose()
    }

    fn store_state(&self, state: &ImportState) -> Result<(), StorageError> {
        self.in_transaction("osmstage_state", |transaction| {
            write_state(transaction, state)
        })
    }
}

impl SqliteDriver {
    fn in_transaction<T>(
        &self,
        scope: &str,
        operation: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.with_connection(|connection| {
            let failed = |operation: &'static str| {
                move |source| StorageError::Query {
                    operation,
                    table: scope.to_owned(),
                    source,
                }
            };
            let transaction = connection
                .transaction()
                .map_err(failed("begin transaction"))?;
            let value = operation(&transaction)?;
            transaction.commit().map_err(failed("commit transaction"))?;
            Ok(value)
        })
    }
}

fn insert_rows(
    connection: &Connection,
    schema: &str,
    rows: &[OutputRow],
) -> Result<(), StorageError> {
    for row in rows {
        let name = physical(schema, &row.physical_table())?;
        let serialize = |source| StorageError::Serialize {
            table: name.clone(),
            source,
        };
        let tags = serde_json::to_string(&row.tags).map_err(serialize)?;
        let geometry = serde_json::to_string(&row.geometry).map_err(serialize)?;
        let bounds = row.bounds();
        let mut statement = connection
            .prepare_cached(&format!(
                "INSERT INTO \"{name}\" (osm_id, type, tags, geometry, min_x, min_y, max_x, max_y)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))
            .map_err(|source| StorageError::Query {
                operation: "prepare insert",
                table: name.clone(),
                source,
            })?;
        statement
            .execute(params![
                row.osm_id,
                row.type_label,
                tags,
                geometry,
                bounds.map(|rect| rect.min().x),
                bounds.map(|rect| rect.min().y),
                bounds.map(|rect| rect.max().x),
                bounds.map(|rect| rect.max().y),
            ])
            .map_err(|source| StorageError::Query {
                operation: "insert row",
                table: name.clone(),
                source,
            })?;
    }
    Ok(())
}

fn list_tables(connection: &Connection, schema: &str) -> Result<Vec<String>, StorageError> {
    let prefix = format!("{schema}{SEPARATOR}");
    let query = |source| StorageError::Query {
        operation: "list tables",
        table: schema.to_owned(),
        source,
    };
    let mut statement = connection
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1
             ORDER BY name",
        )
        .map_err(query)?;
    let names = statement
        .query_map([&prefix], |row| row.get::<_, String>(0))
        .map_err(query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query)?;
    Ok(names
        .into_iter()
        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_owned))
        .collect())
}

fn drop_tables(connection: &Connection, schema: &str) -> Result<(), StorageError> {
    for table in list_tables(connection, schema)? {
        let name = physical(schema, &table)?;
        connection
            .execute_batch(&format!("DROP TABLE \"{name}\""))
            .map_err(|source| StorageError::Query {
                operation: "drop table",
                table: name.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Move every table of `from` into `to`. Index names follow their table.
fn rename_schema(connection: &Connection, from: &str, to: &str) -> Result<(), StorageError> {
    for table in list_tables(connection, from)? {
        let source_name = physical(from, &table)?;
        let target_name = physical(to, &table)?;
        connection
            .execute_batch(&format!(
                "DROP INDEX IF EXISTS \"{source_name}{SEPARATOR}osm_id\";
                 ALTER TABLE \"{source_name}\" RENAME TO \"{target_name}\";
                 CREATE INDEX \"{target_name}{SEPARATOR}osm_id\" ON \"{target_name}\"(osm_id);"
            ))
            .map_err(|source| StorageError::Query {
                operation: "rename table",
                table: source_name.clone(),
                source,
            })?;
    }
    Ok(())
}

fn write_state(connection: &Connection, state: &ImportState) -> Result<(), StorageError> {
    let json =
        serde_json::to_string(state).map_err(|source| StorageError::CorruptState { source })?;
    connection
        .execute(
            "INSERT INTO osmstage_state (id, state) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state",
            [json],
        )
        .map(|_| ())
        .map_err(|source| StorageError::Query {
            operation: "write state",
            table: "osmstage_state".to_owned(),
            source,
        })
}

fn physical(schema: &str, table: &str) -> Result<String, StorageError> {
    validate_name(schema)?;
    validate_name(table)?;
    Ok(format!("{schema}{SEPARATOR}{table}"))
}

fn validate_schemas(schemas: &SchemaNames) -> Result<(), StorageError> {
    validate_name(&schemas.import)?;
    validate_name(&schemas.production)?;
    validate_name(&schemas.backup)
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.contains(SEPARATOR);
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName {
            name: name.to_owned(),
        })
    }
}
