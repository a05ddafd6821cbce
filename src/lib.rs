//! Facade crate for the osmstage importer.
//!
//! This crate re-exports the element model, mapping and geometry types of
//! `osmstage-core` together with the staging pipeline of `osmstage-data`.

#![forbid(unsafe_code)]

pub use osmstage_core::{
    Classification, Element, ElementKey, ElementKind, Generalizer, GeometryDefect, MappingConfig,
    MappingError, Node, OutputRow, Relation, TableKind, TagClassifier, Way,
};

pub use osmstage_data::{
    CancelToken, Change, DiffReport, ElementSource, ImportReport, ImportState, MemorySource,
    PbfSource, Pipeline, PipelineConfig, PipelineError, SourceError, SqliteDriver, StorageDriver,
    StorageError, read_change_file,
};
