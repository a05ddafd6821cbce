//! Opening the database, mapping and cache directory shared by every command.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use osmstage_core::TagClassifier;
use osmstage_data::{Pipeline, PipelineConfig, SchemaNames, SqliteDriver};

use crate::{ARG_BATCH_SIZE, ARG_DATABASE, ARG_MAPPING, CliError};

/// Environment variables that can supply the required store options of one
/// subcommand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvNames {
    pub(crate) database: &'static str,
    pub(crate) mapping: &'static str,
}

/// Resolved locations of the database, cache directory and mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoreConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) cache_dir: Utf8PathBuf,
    pub(crate) mapping: Utf8PathBuf,
}

/// Worker pool and batching options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tuning {
    pub(crate) workers: usize,
    pub(crate) batch_size: usize,
}

impl Tuning {
    pub(crate) fn resolve(
        workers: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<Self, CliError> {
        let defaults = PipelineConfig::new(Utf8PathBuf::new());
        let batch_size = batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(CliError::ZeroArgument {
                field: ARG_BATCH_SIZE,
            });
        }
        Ok(Self {
            workers: workers.unwrap_or(defaults.workers),
            batch_size,
        })
    }
}

impl Default for Tuning {
    fn default() -> Self {
        let defaults = PipelineConfig::new(Utf8PathBuf::new());
        Self {
            workers: defaults.workers,
            batch_size: defaults.batch_size,
        }
    }
}

impl StoreConfig {
    /// Fill in defaults and report the first missing required option.
    ///
    /// Without an explicit cache directory, snapshots live in
    /// `<database stem>-cache` next to the database file.
    pub(crate) fn resolve(
        database: Option<Utf8PathBuf>,
        cache_dir: Option<Utf8PathBuf>,
        mapping: Option<Utf8PathBuf>,
        env: EnvNames,
    ) -> Result<Self, CliError> {
        let database = database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: env.database,
        })?;
        let mapping = mapping.ok_or(CliError::MissingArgument {
            field: ARG_MAPPING,
            env: env.mapping,
        })?;
        let cache_dir = cache_dir.unwrap_or_else(|| default_cache_dir(&database));
        Ok(Self {
            database,
            cache_dir,
            mapping,
        })
    }

    /// Load the mapping and open a pipeline over the database.
    pub(crate) fn open(
        &self,
        tuning: Tuning,
        schemas: SchemaNames,
    ) -> Result<Pipeline<SqliteDriver>, CliError> {
        require_existing(&self.mapping, ARG_MAPPING)?;
        let classifier = load_mapping(&self.mapping)?;
        osmstage_fs::ensure_parent_dir(&self.database).map_err(|source| {
            CliError::PrepareDirectory {
                path: self.database.clone(),
                source,
            }
        })?;
        let driver =
            SqliteDriver::open(&self.database).map_err(|source| CliError::OpenDatabase {
                path: self.database.clone(),
                source,
            })?;
        debug!(
            "Opened {} with snapshots in {}",
            self.database, self.cache_dir
        );
        let mut config = PipelineConfig::new(self.cache_dir.clone());
        config.schemas = schemas;
        config.workers = tuning.workers;
        config.batch_size = tuning.batch_size;
        Ok(Pipeline::new(driver, classifier, config))
    }
}

fn default_cache_dir(database: &Utf8Path) -> Utf8PathBuf {
    let stem = database.file_stem().unwrap_or("osmstage");
    database.with_file_name(format!("{stem}-cache"))
}

fn load_mapping(path: &Utf8Path) -> Result<TagClassifier, CliError> {
    let file = osmstage_fs::open_utf8_file(path).map_err(|source| CliError::OpenMapping {
        path: path.to_path_buf(),
        source,
    })?;
    TagClassifier::from_reader(file).map_err(|source| CliError::InvalidMapping {
        path: path.to_path_buf(),
        source,
    })
}

/// Fail unless `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match osmstage_fs::file_exists(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}
