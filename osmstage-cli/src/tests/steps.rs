//! Behaviour-driven step definitions running CLI commands against a
//! temporary database.

use super::helpers::{Workspace, invoke};
use super::*;
use osmstage_data::TransitionError;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use std::fs;

/// Scenario state: the workspace, any extra flags and the command outcome.
#[derive(Debug)]
struct CommandWorld {
    workspace: Workspace,
    extra_args: RefCell<Vec<String>>,
    outcome: RefCell<Option<Result<(), CliError>>>,
}

impl CommandWorld {
    fn new() -> Self {
        Self {
            workspace: Workspace::new(),
            extra_args: RefCell::new(Vec::new()),
            outcome: RefCell::new(None),
        }
    }

    fn run(&self, command: &str) {
        let mut args = vec![command.to_owned()];
        args.extend(self.workspace.store_flags());
        args.extend(self.extra_args.borrow().iter().cloned());
        self.outcome.replace(Some(invoke(&args)));
    }

    fn error(&self) -> std::cell::Ref<'_, CliError> {
        std::cell::Ref::map(self.outcome.borrow(), |outcome| {
            match outcome.as_ref().expect("command ran") {
                Ok(()) => panic!("expected the command to fail"),
                Err(err) => err,
            }
        })
    }
}

#[fixture]
fn world() -> CommandWorld {
    CommandWorld::new()
}

#[given("a database with a completed import of a primary road")]
fn completed_primary(#[from(world)] world: &CommandWorld) {
    world.workspace.import_road("primary");
}

#[given("a database with a deployed primary road")]
fn deployed_primary(#[from(world)] world: &CommandWorld) {
    world.workspace.import_road("primary");
    world.workspace.deploy();
}

#[given("a database where a trunk road replaced a primary road")]
fn trunk_replaced_primary(#[from(world)] world: &CommandWorld) {
    world.workspace.import_road("primary");
    world.workspace.deploy();
    world.workspace.import_road("trunk");
    world.workspace.deploy();
}

#[given("a change file retagging the road as trunk")]
fn retagging_change_file(#[from(world)] world: &CommandWorld) {
    let path = world.workspace.write(
        "changes.jsonl",
        br#"{"action": "modify", "type": "way", "id": 10, "refs": [1, 2], "tags": {"highway": "trunk"}}"#,
    );
    world
        .extra_args
        .borrow_mut()
        .extend([format!("--{ARG_CHANGES}"), path.into_string()]);
}

#[given("the mapping file has been removed")]
fn mapping_removed(#[from(world)] world: &CommandWorld) {
    fs::remove_file(world.workspace.mapping()).expect("remove mapping");
}

#[given("a corrupt PBF file")]
fn corrupt_pbf(#[from(world)] world: &CommandWorld) {
    let path = world
        .workspace
        .write("corrupt.osm.pbf", b"not a protocol buffer");
    world
        .extra_args
        .borrow_mut()
        .extend([format!("--{ARG_INPUT}"), path.into_string()]);
}

#[when("I run the deploy command")]
fn run_deploy_command(#[from(world)] world: &CommandWorld) {
    world.run("deploy");
}

#[when("I run the revert-deploy command")]
fn run_revert_command(#[from(world)] world: &CommandWorld) {
    world.run("revert-deploy");
}

#[when("I run the remove-backup command")]
fn run_remove_backup_command(#[from(world)] world: &CommandWorld) {
    world.run("remove-backup");
}

#[when("I run the diff command")]
fn run_diff_command(#[from(world)] world: &CommandWorld) {
    world.run("diff");
}

#[when("I run the import command")]
fn run_import_command(#[from(world)] world: &CommandWorld) {
    world.run("import");
}

#[then("the command succeeds")]
fn command_succeeds(#[from(world)] world: &CommandWorld) {
    let outcome = world.outcome.borrow();
    if let Err(err) = outcome.as_ref().expect("command ran") {
        panic!("expected success, got {err:?}");
    }
}

#[then("the command fails")]
fn command_fails(#[from(world)] world: &CommandWorld) {
    let _ = world.error();
}

#[then("production holds the primary road")]
fn production_primary(#[from(world)] world: &CommandWorld) {
    assert_eq!(
        world.workspace.road_types("production"),
        vec!["primary".to_owned()]
    );
}

#[then("production holds the trunk road")]
fn production_trunk(#[from(world)] world: &CommandWorld) {
    assert_eq!(
        world.workspace.road_types("production"),
        vec!["trunk".to_owned()]
    );
}

#[then("no backup schema remains")]
fn no_backup(#[from(world)] world: &CommandWorld) {
    assert!(!world.workspace.state().has_backup);
    let snapshot = world.workspace.cache_dir().join("backup.cache");
    assert!(!snapshot.as_std_path().exists(), "backup snapshot should be removed");
}

#[then("the CLI reports that the mapping file is missing")]
fn reports_missing_mapping(#[from(world)] world: &CommandWorld) {
    match &*world.error() {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(*field, ARG_MAPPING);
            assert_eq!(*path, world.workspace.mapping());
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[then("the import is refused because the import schema is complete")]
fn refused_complete_staging(#[from(world)] world: &CommandWorld) {
    match &*world.error() {
        CliError::Pipeline {
            command,
            source:
                PipelineError::Transition(TransitionError::StagingNotAbsent {
                    status: StagingStatus::Complete,
                }),
        } => assert_eq!(*command, "import"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(world.workspace.road_types("import"), vec!["primary".to_owned()]);
}

#[then("the import schema is left incomplete")]
fn staging_incomplete(#[from(world)] world: &CommandWorld) {
    assert_eq!(world.workspace.state().staging, StagingStatus::Incomplete);
}

macro_rules! register_command_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/commands.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: CommandWorld) {
            let _ = world;
        }
    };
}

register_command_scenario!(deploying_completed_import, "deploying a completed import");
register_command_scenario!(reverting_deploy, "reverting a deploy");
register_command_scenario!(removing_backup, "removing the backup schema");
register_command_scenario!(applying_change_file, "applying a change file");
register_command_scenario!(rejecting_missing_mapping, "rejecting a missing mapping file");
register_command_scenario!(
    refusing_import_over_completed,
    "refusing to import over a completed import"
);
register_command_scenario!(failed_import_incomplete, "leaving a failed import incomplete");
