//! Error types emitted by the osmstage CLI.
//!
//! Pipeline and source failures are wrapped rather than flattened so the
//! printed chain still names the stage or file that failed.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmstage_core::MappingError;
use osmstage_data::{PipelineError, SourceError, StorageError};
use thiserror::Error;

/// Errors emitted by the osmstage CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A numeric option was set to zero where at least one is needed.
    #[error("{field} must be at least 1")]
    ZeroArgument { field: &'static str },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The mapping document could not be opened.
    #[error("failed to open mapping at {path:?}: {source}")]
    OpenMapping {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The mapping document was rejected.
    #[error("mapping at {path:?} is invalid: {source}")]
    InvalidMapping {
        path: Utf8PathBuf,
        #[source]
        source: MappingError,
    },
    /// The directory holding the database could not be created.
    #[error("failed to prepare directory for {path:?}: {source}")]
    PrepareDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The database could not be opened.
    #[error("failed to open database at {path:?}: {source}")]
    OpenDatabase {
        path: Utf8PathBuf,
        #[source]
        source: StorageError,
    },
    /// The change file could not be read.
    #[error(transparent)]
    Changes(#[from] SourceError),
    /// The pipeline rejected or failed the command.
    #[error("{command} failed: {source}")]
    Pipeline {
        command: &'static str,
        #[source]
        source: PipelineError,
    },
}
