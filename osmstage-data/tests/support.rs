use camino::Utf8PathBuf;
use osmstage_core::test_support::fixture_classifier;
use osmstage_data::{Pipeline, PipelineConfig, SqliteDriver, StoredRow};
use tempfile::TempDir;

/// A pipeline over a private SQLite file and cache directory.
pub struct Harness {
    _dir: TempDir,
    #[allow(dead_code, reason = "only the lifecycle suite opens a second connection")]
    pub database: Utf8PathBuf,
    pub pipeline: Pipeline<SqliteDriver>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir {path:?} is not UTF-8"));
        let database = root.join("osm.sqlite");
        let driver = SqliteDriver::open(&database)
            .unwrap_or_else(|err| panic!("failed to open database: {err}"));
        let classifier =
            fixture_classifier().unwrap_or_else(|err| panic!("fixture mapping invalid: {err}"));
        let mut config = PipelineConfig::new(root.join("cache"));
        config.batch_size = 4;
        config.workers = 2;
        Self {
            _dir: dir,
            database,
            pipeline: Pipeline::new(driver, classifier, config),
        }
    }

    /// Rows of `table` in `schema`.
    pub fn rows(&self, schema: &str, table: &str) -> Vec<StoredRow> {
        self.pipeline
            .driver()
            .rows(schema, table)
            .unwrap_or_else(|err| panic!("failed to read {schema}.{table}: {err}"))
    }

    /// `(id, type)` pairs of `table` in `schema`.
    pub fn keys(&self, schema: &str, table: &str) -> Vec<(i64, String)> {
        self.rows(schema, table)
            .into_iter()
            .map(|row| (row.osm_id, row.type_label))
            .collect()
    }

    /// Whether `table` in `schema` has a row for `osm_id`.
    pub fn has_row(&self, schema: &str, table: &str, osm_id: i64) -> bool {
        self.rows(schema, table)
            .iter()
            .any(|row| row.osm_id == osm_id)
    }
}
