//! Behavioural tests for deploys, reverts and diffs.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use geo::Coord;
use osmstage_core::test_support::{node, outer, relation, square_nodes, square_ring, way};
use osmstage_core::{Element, ElementKey, Projection};
use osmstage_data::{Change, MemorySource, PipelineError, TransitionError};

mod support;

use support::Harness;

#[fixture]
fn harness() -> RefCell<Option<Harness>> {
    RefCell::new(Some(Harness::new()))
}

#[fixture]
fn outcome() -> RefCell<Option<Result<(), PipelineError>>> {
    RefCell::new(None)
}

/// Road types read by a second connection, one entry per read.
type Reads = Vec<Result<Vec<String>, String>>;

#[fixture]
fn reads() -> RefCell<Reads> {
    RefCell::new(Vec::new())
}

fn read_production_roads(connection: &rusqlite::Connection) -> rusqlite::Result<Vec<String>> {
    let mut statement =
        connection.prepare("SELECT type FROM production__osm_roads ORDER BY type")?;
    let types = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(types)
}

fn with_harness<T>(harness: &RefCell<Option<Harness>>, act: impl FnOnce(&Harness) -> T) -> T {
    let guard = harness.borrow();
    act(guard.as_ref().expect("harness prepared"))
}

fn road(highway: &str) -> MemorySource {
    let elements: Vec<Element> = vec![
        node(1, 13.0, 52.0).into(),
        node(2, 13.1, 52.0).into(),
        way(10, &[1, 2], &[("highway", highway)]).into(),
    ];
    elements.into_iter().collect()
}

fn import_and_deploy(harness: &Harness, source: &MemorySource) {
    harness
        .pipeline
        .import(source)
        .unwrap_or_else(|err| panic!("import failed: {err}"));
    harness
        .pipeline
        .deploy()
        .unwrap_or_else(|err| panic!("deploy failed: {err}"));
}

fn record(outcome: &RefCell<Option<Result<(), PipelineError>>>, result: Result<(), PipelineError>) {
    *outcome.borrow_mut() = Some(result);
}

fn expect_success(outcome: &RefCell<Option<Result<(), PipelineError>>>) {
    let guard = outcome.borrow();
    match guard.as_ref().expect("operation attempted") {
        Ok(()) => {}
        Err(err) => panic!("expected success, got {err:?}"),
    }
}

fn road_types(harness: &Harness, schema: &str) -> Vec<String> {
    harness
        .keys(schema, "osm_roads")
        .into_iter()
        .map(|(_, type_label)| type_label)
        .collect()
}

fn max_x(harness: &Harness, table: &str, osm_id: i64) -> f64 {
    harness.pipeline.driver().with_connection(|connection| {
        connection
            .query_row(
                &format!("SELECT max_x FROM production__{table} WHERE osm_id = ?1"),
                [osm_id],
                |row| row.get(0),
            )
            .unwrap_or_else(|err| panic!("no row {osm_id} in {table}: {err}"))
    })
}

#[given("a deployed import of a primary road")]
fn deployed_primary(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| import_and_deploy(harness, &road("primary")));
}

#[given("a completed import of a trunk road")]
fn imported_trunk(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        harness
            .pipeline
            .import(&road("trunk"))
            .unwrap_or_else(|err| panic!("import failed: {err}"));
    });
}

#[given("the import has been deployed")]
fn deployed_import(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        harness
            .pipeline
            .deploy()
            .unwrap_or_else(|err| panic!("deploy failed: {err}"));
    });
}

#[given("a deployed building relation whose outer way shares a node with a road")]
fn building_and_road(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    let mut elements: Vec<Element> = square_nodes(1, 13.0, 52.0, 0.001)
        .into_iter()
        .map(Element::from)
        .collect();
    elements.extend([
        node(5, 13.01, 52.01).into(),
        way(3001, &square_ring(1), &[]).into(),
        way(3002, &[3, 5], &[("highway", "primary")]).into(),
        relation(
            3101,
            vec![outer(3001)],
            &[("type", "multipolygon"), ("building", "yes")],
        )
        .into(),
    ]);
    let source: MemorySource = elements.into_iter().collect();
    with_harness(harness, |harness| import_and_deploy(harness, &source));
}

#[given("a deployed type-only relation around a building way")]
fn type_only_relation(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    let mut elements: Vec<Element> = square_nodes(1, 13.0, 52.0, 0.001)
        .into_iter()
        .map(Element::from)
        .collect();
    elements.extend([
        way(50111, &square_ring(1), &[("building", "yes")]).into(),
        relation(50121, vec![outer(50111)], &[("type", "multipolygon")]).into(),
    ]);
    let source: MemorySource = elements.into_iter().collect();
    with_harness(harness, |harness| {
        import_and_deploy(harness, &source);
        assert!(!harness.has_row("production", "osm_buildings", 50111));
    });
}

#[given("a generalized production table has gone missing")]
fn missing_table(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        harness.pipeline.driver().with_connection(|connection| {
            connection
                .execute_batch("DROP TABLE production__osm_roads_gen1")
                .unwrap_or_else(|err| panic!("failed to drop table: {err}"));
        });
    });
}

#[when("I deploy the import")]
fn deploy(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    let result = with_harness(harness, |harness| harness.pipeline.deploy().map(drop));
    record(outcome, result);
}

#[when("I deploy the import while another connection reads production")]
fn deploy_under_reader(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
    #[from(reads)] reads: &RefCell<Reads>,
) {
    let result = with_harness(harness, |harness| {
        let database = harness.database.clone();
        let started = Barrier::new(2);
        let deployed = AtomicBool::new(false);
        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let connection = rusqlite::Connection::open(database.as_std_path())
                    .unwrap_or_else(|err| panic!("reader failed to open: {err}"));
                connection
                    .busy_timeout(Duration::from_secs(5))
                    .unwrap_or_else(|err| panic!("reader busy timeout: {err}"));
                let mut seen = Vec::new();
                seen.push(read_production_roads(&connection).map_err(|err| err.to_string()));
                started.wait();
                loop {
                    let finished = deployed.load(Ordering::Acquire);
                    seen.push(read_production_roads(&connection).map_err(|err| err.to_string()));
                    if finished {
                        break seen;
                    }
                }
            });
            started.wait();
            let result = harness.pipeline.deploy().map(drop);
            deployed.store(true, Ordering::Release);
            let seen = reader
                .join()
                .unwrap_or_else(|_| panic!("reader thread panicked"));
            *reads.borrow_mut() = seen;
            result
        })
    });
    record(outcome, result);
}

#[when("I revert the deploy")]
fn revert(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    let result = with_harness(harness, |harness| harness.pipeline.revert_deploy().map(drop));
    record(outcome, result);
}

#[when("I apply a diff deleting node 1")]
fn delete_node(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    let changes = [Change::Delete(ElementKey::node(1))];
    let result = with_harness(harness, |harness| {
        harness.pipeline.apply_diff(&changes).map(drop)
    });
    record(outcome, result);
}

#[when("I apply a diff moving the shared node")]
fn move_shared_node(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    let changes = [Change::Upsert(node(3, 13.002, 52.002).into())];
    let result = with_harness(harness, |harness| {
        harness.pipeline.apply_diff(&changes).map(drop)
    });
    record(outcome, result);
}

#[when("I apply a diff deleting the relation")]
fn delete_relation(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    let changes = [Change::Delete(ElementKey::relation(50121))];
    let result = with_harness(harness, |harness| {
        harness.pipeline.apply_diff(&changes).map(drop)
    });
    record(outcome, result);
}

#[then("production holds the trunk road")]
fn production_trunk(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    expect_success(outcome);
    with_harness(harness, |harness| {
        assert_eq!(road_types(harness, "production"), vec!["trunk".to_owned()]);
    });
}

#[then("the backup holds the primary road")]
fn backup_primary(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        assert_eq!(road_types(harness, "backup"), vec!["primary".to_owned()]);
        let state = harness
            .pipeline
            .state()
            .unwrap_or_else(|err| panic!("state unreadable: {err}"));
        assert!(state.has_backup);
    });
}

#[then("production holds the primary road")]
fn production_primary(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    expect_success(outcome);
    with_harness(harness, |harness| {
        assert_eq!(road_types(harness, "production"), vec!["primary".to_owned()]);
    });
}

#[then("the import schema holds the trunk road ready to deploy again")]
fn import_trunk(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        assert_eq!(road_types(harness, "import"), vec!["trunk".to_owned()]);
        let state = harness
            .pipeline
            .deploy()
            .unwrap_or_else(|err| panic!("redeploy failed: {err}"));
        assert!(state.has_backup);
        assert_eq!(road_types(harness, "production"), vec!["trunk".to_owned()]);
    });
}

#[then("the diff is refused because nothing is deployed")]
fn refused_not_deployed(#[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>) {
    let guard = outcome.borrow();
    assert!(matches!(
        guard.as_ref().expect("diff attempted"),
        Err(PipelineError::Transition(TransitionError::NotDeployed))
    ));
}

#[then("the road and the relation reach the new coordinate")]
fn moved_rows(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    expect_success(outcome);
    let moved = Projection::WebMercator.project(Coord {
        x: 13.002,
        y: 52.002,
    });
    with_harness(harness, |harness| {
        let building = max_x(harness, "osm_buildings", -3101);
        assert!((building - moved.x).abs() < 1e-6, "building max_x {building}");
        let road_min_y: f64 = harness.pipeline.driver().with_connection(|connection| {
            connection
                .query_row(
                    "SELECT min_y FROM production__osm_roads WHERE osm_id = 3002",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or_else(|err| panic!("road row missing: {err}"))
        });
        assert!((road_min_y - moved.y).abs() < 1e-6, "road min_y {road_min_y}");
    });
}

#[then("each re-derived element has exactly one row per table")]
fn no_stale_rows(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        for (table, osm_id) in [
            ("osm_buildings", -3101),
            ("osm_roads", 3002),
            ("osm_roads_gen0", 3002),
            ("osm_roads_gen1", 3002),
        ] {
            let count = harness
                .rows("production", table)
                .iter()
                .filter(|row| row.osm_id == osm_id)
                .count();
            assert_eq!(count, 1, "rows for {osm_id} in {table}");
        }
    });
}

#[then("the building way has its own row again")]
fn way_released(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
) {
    expect_success(outcome);
    with_harness(harness, |harness| {
        assert!(harness.has_row("production", "osm_buildings", 50111));
    });
}

#[then("the relation row is gone")]
fn relation_gone(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        assert!(!harness.has_row("production", "osm_buildings", -50121));
    });
}

#[then("the diff is refused as inconsistent")]
fn refused_inconsistent(#[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>) {
    let guard = outcome.borrow();
    assert!(matches!(
        guard.as_ref().expect("diff attempted"),
        Err(PipelineError::Inconsistent { .. })
    ));
}

#[then("production still holds the primary road")]
fn primary_untouched(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |harness| {
        assert_eq!(road_types(harness, "production"), vec!["primary".to_owned()]);
    });
}

#[then("every read saw only the primary road or only the trunk road")]
fn reads_saw_whole_sets(
    #[from(outcome)] outcome: &RefCell<Option<Result<(), PipelineError>>>,
    #[from(reads)] reads: &RefCell<Reads>,
) {
    expect_success(outcome);
    let reads = reads.borrow();
    for read in reads.iter() {
        match read {
            Ok(types) => assert!(
                types == &["primary"] || types == &["trunk"],
                "reader saw a partial production set: {types:?}"
            ),
            Err(err) => panic!("reader failed: {err}"),
        }
    }
    assert_eq!(reads.first(), Some(&Ok(vec!["primary".to_owned()])));
    assert_eq!(reads.last(), Some(&Ok(vec!["trunk".to_owned()])));
}

#[scenario(path = "tests/features/lifecycle.feature", index = 0)]
fn deploying_keeps_backup(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 1)]
fn reverting_restores_backup(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 2)]
fn refusing_early_diffs(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 3)]
fn moving_shared_nodes(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 4)]
fn deleting_relations(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 5)]
fn refusing_inconsistent_diffs(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/lifecycle.feature", index = 6)]
fn readers_during_deploy(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), PipelineError>>>,
    reads: RefCell<Reads>,
) {
    let _ = (harness, outcome, reads);
}
