//! Command-line interface for the osmstage importer.
//!
//! Each subcommand resolves its options from CLI flags, `OSMSTAGE_CMDS_*`
//! environment variables and configuration files, then drives one pipeline
//! operation against a SQLite database.
#![forbid(unsafe_code)]

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmstage_data::{
    DiffReport, ImportReport, ImportState, PbfSource, PipelineError, SchemaNames, StagingStatus,
    read_change_file,
};
use serde::{Deserialize, Serialize};

mod error;
mod store;

pub use error::CliError;
use store::{EnvNames, StoreConfig, Tuning, require_existing};

const ARG_DATABASE: &str = "database";
const ARG_CACHE_DIR: &str = "cache-dir";
const ARG_MAPPING: &str = "mapping";
const ARG_INPUT: &str = "input";
const ARG_CHANGES: &str = "changes";
const ARG_WORKERS: &str = "workers";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_OVERWRITE_STAGING: &str = "overwrite-staging";
const ARG_IMPORT_SCHEMA: &str = "import-schema";
const ARG_PRODUCTION_SCHEMA: &str = "production-schema";
const ARG_BACKUP_SCHEMA: &str = "backup-schema";

macro_rules! command_env {
    ($command:literal, $field:literal) => {
        concat!("OSMSTAGE_CMDS_", $command, "_", $field)
    };
}

macro_rules! env_names {
    ($command:literal) => {
        EnvNames {
            database: command_env!($command, "DATABASE"),
            mapping: command_env!($command, "MAPPING"),
        }
    };
}

const ENV_IMPORT_INPUT: &str = command_env!("IMPORT", "INPUT");
const ENV_DIFF_CHANGES: &str = command_env!("DIFF", "CHANGES");

/// Run the osmstage CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    dispatch(cli.command)
}

fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Import(args) => {
            run_import(&args.into_config()?)?;
        }
        Command::Deploy(args) => {
            run_deploy(&args.into_config()?)?;
        }
        Command::Diff(args) => {
            run_diff(&args.into_config()?)?;
        }
        Command::RevertDeploy(args) => {
            run_revert_deploy(&args.into_config()?)?;
        }
        Command::RemoveBackup(args) => {
            run_remove_backup(&args.into_config()?)?;
        }
    }
    Ok(())
}

fn pipeline_error(command: &'static str) -> impl FnOnce(PipelineError) -> CliError {
    move |source| CliError::Pipeline { command, source }
}

fn run_import(config: &ImportConfig) -> Result<ImportReport, CliError> {
    require_existing(&config.input, ARG_INPUT)?;
    let pipeline = config.store.open(config.tuning, config.schemas.clone())?;
    let state = pipeline.state().map_err(pipeline_error("import"))?;
    if state.staging != StagingStatus::Absent {
        if config.overwrite_staging {
            pipeline
                .discard_staging()
                .map_err(pipeline_error("import"))?;
        } else {
            warn!(
                "Import schema {} is {}; pass --{ARG_OVERWRITE_STAGING} to replace it",
                state.schemas.import, state.staging
            );
        }
    }
    let report = pipeline
        .import(&PbfSource::new(&config.input))
        .map_err(pipeline_error("import"))?;
    log_import(&report);
    Ok(report)
}

fn run_deploy(config: &StoreConfig) -> Result<ImportState, CliError> {
    let pipeline = config.open(Tuning::default(), SchemaNames::default())?;
    let state = pipeline.deploy().map_err(pipeline_error("deploy"))?;
    info!("Deployed schema {}", state.schemas.production);
    Ok(state)
}

fn run_diff(config: &DiffConfig) -> Result<DiffReport, CliError> {
    require_existing(&config.changes, ARG_CHANGES)?;
    let changes = read_change_file(&config.changes)?;
    let pipeline = config.store.open(config.tuning, SchemaNames::default())?;
    let report = pipeline
        .apply_diff(&changes)
        .map_err(pipeline_error("diff"))?;
    for (table, rows) in &report.rows_per_table {
        info!("{table}: {rows} rows");
    }
    Ok(report)
}

fn run_revert_deploy(config: &StoreConfig) -> Result<ImportState, CliError> {
    let pipeline = config.open(Tuning::default(), SchemaNames::default())?;
    let state = pipeline
        .revert_deploy()
        .map_err(pipeline_error("revert-deploy"))?;
    info!("Restored schema {}", state.schemas.production);
    Ok(state)
}

fn run_remove_backup(config: &StoreConfig) -> Result<ImportState, CliError> {
    let pipeline = config.open(Tuning::default(), SchemaNames::default())?;
    pipeline
        .remove_backup()
        .map_err(pipeline_error("remove-backup"))
}

fn log_import(report: &ImportReport) {
    if let Some(bounds) = report.summary.bounds {
        let (min, max) = (bounds.min(), bounds.max());
        info!(
            "Bounds: {:.6},{:.6} {:.6},{:.6}",
            min.x, min.y, max.x, max.y
        );
    }
    for (table, rows) in &report.rows_per_table {
        info!("{table}: {rows} rows");
    }
    for (category, count) in &report.defects {
        info!("{category}: {count} defects");
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osmstage",
    about = "Import OpenStreetMap data into staged SQLite schemas",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import an OSM PBF file into the import schema.
    Import(ImportArgs),
    /// Promote the completed import schema to production.
    Deploy(DeployArgs),
    /// Apply a change file to the production schema.
    Diff(DiffArgs),
    /// Restore the backup schema to production.
    RevertDeploy(RevertDeployArgs),
    /// Drop the backup schema.
    RemoveBackup(RemoveBackupArgs),
}

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "import",
    long_about = "Read every element of an OSM PBF file, classify it with the \
                 mapping and write rows into the import schema. Paths can \
                 come from CLI flags, configuration files, or environment \
                 variables.",
    about = "Import an OSM PBF file into the import schema"
)]
#[ortho_config(prefix = "OSMSTAGE")]
struct ImportArgs {
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    database: Option<Utf8PathBuf>,
    /// Directory holding element store snapshots.
    #[arg(long = ARG_CACHE_DIR, value_name = "path")]
    #[serde(default)]
    cache_dir: Option<Utf8PathBuf>,
    /// Path to the JSON mapping document.
    #[arg(long = ARG_MAPPING, value_name = "path")]
    #[serde(default)]
    mapping: Option<Utf8PathBuf>,
    /// Path to the OpenStreetMap PBF file.
    #[arg(long = ARG_INPUT, value_name = "path")]
    #[serde(default)]
    input: Option<Utf8PathBuf>,
    /// Discard an existing import schema before importing.
    #[arg(long = ARG_OVERWRITE_STAGING)]
    #[serde(default)]
    overwrite_staging: bool,
    /// Worker threads; 0 uses one per core.
    #[arg(long = ARG_WORKERS, value_name = "count")]
    #[serde(default)]
    workers: Option<usize>,
    /// Rows per write transaction.
    #[arg(long = ARG_BATCH_SIZE, value_name = "rows")]
    #[serde(default)]
    batch_size: Option<usize>,
    /// Name of the import schema for a fresh database.
    #[arg(long = ARG_IMPORT_SCHEMA, value_name = "name")]
    #[serde(default)]
    import_schema: Option<String>,
    /// Name of the production schema for a fresh database.
    #[arg(long = ARG_PRODUCTION_SCHEMA, value_name = "name")]
    #[serde(default)]
    production_schema: Option<String>,
    /// Name of the backup schema for a fresh database.
    #[arg(long = ARG_BACKUP_SCHEMA, value_name = "name")]
    #[serde(default)]
    backup_schema: Option<String>,
}

impl ImportArgs {
    fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportConfig {
    store: StoreConfig,
    input: Utf8PathBuf,
    overwrite_staging: bool,
    tuning: Tuning,
    schemas: SchemaNames,
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let store = StoreConfig::resolve(
            args.database,
            args.cache_dir,
            args.mapping,
            env_names!("IMPORT"),
        )?;
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_IMPORT_INPUT,
        })?;
        let tuning = Tuning::resolve(args.workers, args.batch_size)?;
        let defaults = SchemaNames::default();
        let schemas = SchemaNames {
            import: args.import_schema.unwrap_or(defaults.import),
            production: args.production_schema.unwrap_or(defaults.production),
            backup: args.backup_schema.unwrap_or(defaults.backup),
        };
        Ok(Self {
            store,
            input,
            overwrite_staging: args.overwrite_staging,
            tuning,
            schemas,
        })
    }
}

/// CLI arguments for the `diff` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "diff",
    about = "Apply a JSON-lines change file to the production schema"
)]
#[ortho_config(prefix = "OSMSTAGE")]
struct DiffArgs {
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    database: Option<Utf8PathBuf>,
    /// Directory holding element store snapshots.
    #[arg(long = ARG_CACHE_DIR, value_name = "path")]
    #[serde(default)]
    cache_dir: Option<Utf8PathBuf>,
    /// Path to the JSON mapping document.
    #[arg(long = ARG_MAPPING, value_name = "path")]
    #[serde(default)]
    mapping: Option<Utf8PathBuf>,
    /// Path to the change file.
    #[arg(long = ARG_CHANGES, value_name = "path")]
    #[serde(default)]
    changes: Option<Utf8PathBuf>,
    /// Worker threads; 0 uses one per core.
    #[arg(long = ARG_WORKERS, value_name = "count")]
    #[serde(default)]
    workers: Option<usize>,
    /// Rows per write transaction.
    #[arg(long = ARG_BATCH_SIZE, value_name = "rows")]
    #[serde(default)]
    batch_size: Option<usize>,
}

impl DiffArgs {
    fn into_config(self) -> Result<DiffConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DiffConfig::try_from(merged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffConfig {
    store: StoreConfig,
    changes: Utf8PathBuf,
    tuning: Tuning,
}

impl TryFrom<DiffArgs> for DiffConfig {
    type Error = CliError;

    fn try_from(args: DiffArgs) -> Result<Self, Self::Error> {
        let store = StoreConfig::resolve(
            args.database,
            args.cache_dir,
            args.mapping,
            env_names!("DIFF"),
        )?;
        let changes = args.changes.ok_or(CliError::MissingArgument {
            field: ARG_CHANGES,
            env: ENV_DIFF_CHANGES,
        })?;
        Ok(Self {
            store,
            changes,
            tuning: Tuning::resolve(args.workers, args.batch_size)?,
        })
    }
}

/// Declares the argument struct of a subcommand that only needs the store
/// options.
macro_rules! store_args {
    ($name:ident, $command:literal, $env:literal, $about:literal) => {
        #[doc = concat!("CLI arguments for the `", $command, "` subcommand.")]
        #[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
        #[command(name = $command, about = $about)]
        #[ortho_config(prefix = "OSMSTAGE")]
        struct $name {
            /// Path to the SQLite database.
            #[arg(long = ARG_DATABASE, value_name = "path")]
            #[serde(default)]
            database: Option<Utf8PathBuf>,
            /// Directory holding element store snapshots.
            #[arg(long = ARG_CACHE_DIR, value_name = "path")]
            #[serde(default)]
            cache_dir: Option<Utf8PathBuf>,
            /// Path to the JSON mapping document.
            #[arg(long = ARG_MAPPING, value_name = "path")]
            #[serde(default)]
            mapping: Option<Utf8PathBuf>,
        }

        impl $name {
            fn into_config(self) -> Result<StoreConfig, CliError> {
                let merged = self.load_and_merge().map_err(CliError::Configuration)?;
                StoreConfig::resolve(
                    merged.database,
                    merged.cache_dir,
                    merged.mapping,
                    env_names!($env),
                )
            }
        }
    };
}

store_args!(
    DeployArgs,
    "deploy",
    "DEPLOY",
    "Promote the completed import schema to production"
);
store_args!(
    RevertDeployArgs,
    "revert-deploy",
    "REVERT_DEPLOY",
    "Restore the backup schema to production"
);
store_args!(
    RemoveBackupArgs,
    "remove-backup",
    "REMOVE_BACKUP",
    "Drop the backup schema and its snapshot"
);

#[cfg(test)]
mod tests;
