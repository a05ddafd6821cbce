//! Test helpers for preparing databases, mappings and input files.

use super::*;
use osmstage_core::Element;
use osmstage_core::test_support::{FIXTURE_MAPPING, node, way};
use osmstage_data::{ImportState, MemorySource, Pipeline, SqliteDriver};
use std::fs;
use tempfile::TempDir;

/// A temporary directory holding a database, its snapshots and a mapping.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 tempdir");
        fs::write(root.join("mapping.json"), FIXTURE_MAPPING).expect("write mapping");
        Self { _dir: dir, root }
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("osm.sqlite")
    }

    pub(super) fn mapping(&self) -> Utf8PathBuf {
        self.root.join("mapping.json")
    }

    pub(super) fn cache_dir(&self) -> Utf8PathBuf {
        self.root.join("cache")
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Write `contents` to `name` inside the workspace.
    pub(super) fn write(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write workspace file");
        path
    }

    pub(super) fn store(&self) -> StoreConfig {
        StoreConfig {
            database: self.database(),
            cache_dir: self.cache_dir(),
            mapping: self.mapping(),
        }
    }

    /// The `--database`, `--cache-dir` and `--mapping` flags for this workspace.
    pub(super) fn store_flags(&self) -> Vec<String> {
        vec![
            format!("--{ARG_DATABASE}"),
            self.database().into_string(),
            format!("--{ARG_CACHE_DIR}"),
            self.cache_dir().into_string(),
            format!("--{ARG_MAPPING}"),
            self.mapping().into_string(),
        ]
    }

    fn pipeline(&self) -> Pipeline<SqliteDriver> {
        self.store()
            .open(Tuning::default(), SchemaNames::default())
            .expect("open pipeline")
    }

    /// Import a single road tagged `highway` into the import schema.
    pub(super) fn import_road(&self, highway: &str) {
        let elements: Vec<Element> = vec![
            node(1, 13.0, 52.0).into(),
            node(2, 13.1, 52.0).into(),
            way(10, &[1, 2], &[("highway", highway)]).into(),
        ];
        self.pipeline()
            .import(&MemorySource::new(elements))
            .expect("seed import");
    }

    pub(super) fn deploy(&self) {
        self.pipeline().deploy().expect("seed deploy");
    }

    pub(super) fn state(&self) -> ImportState {
        self.pipeline().state().expect("load state")
    }

    /// Type labels of the roads in `schema`.
    pub(super) fn road_types(&self, schema: &str) -> Vec<String> {
        self.pipeline()
            .driver()
            .rows(schema, "osm_roads")
            .expect("read roads")
            .into_iter()
            .map(|row| row.type_label)
            .collect()
    }
}

/// Parse `args` as a process command line and run the selected command.
pub(super) fn invoke(args: &[String]) -> Result<(), CliError> {
    let mut invocation = vec!["osmstage".to_owned()];
    invocation.extend(args.iter().cloned());
    Cli::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| dispatch(cli.command))
}
