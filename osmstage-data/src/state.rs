//! Import state machine.
//!
//! The state is a plain value threaded through the pipeline and persisted by
//! the storage driver. Transition methods validate the current state and
//! return the next one without side effects; the driver commits the new
//! value in the same transaction as the schema change it describes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a production schema has ever been deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No production schema exists yet.
    #[default]
    Importing,
    /// A production schema is live.
    Deployed,
}

/// Condition of the import schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingStatus {
    /// No import schema exists.
    #[default]
    Absent,
    /// An import started and did not finish; the schema must not be deployed.
    Incomplete,
    /// An import finished and may be deployed.
    Complete,
}

impl fmt::Display for StagingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Absent => "absent",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        };
        f.write_str(label)
    }
}

/// Names of the three schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNames {
    /// Schema written by imports.
    pub import: String,
    /// Live schema.
    pub production: String,
    /// Previous production schema.
    pub backup: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            import: "import".to_owned(),
            production: "production".to_owned(),
            backup: "backup".to_owned(),
        }
    }
}

/// Persisted pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportState {
    /// Deployment phase.
    pub phase: Phase,
    /// Import schema condition.
    pub staging: StagingStatus,
    /// Whether a backup schema exists.
    pub has_backup: bool,
    /// Schema names in use.
    pub schemas: SchemaNames,
}

/// A requested transition is not valid from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// An import needs an absent import schema.
    #[error("import schema is {status}; discard it before importing again")]
    StagingNotAbsent {
        /// Current status.
        status: StagingStatus,
    },
    /// A deploy needs a completed import.
    #[error("import schema is {status}; only a complete import can be deployed")]
    StagingNotComplete {
        /// Current status.
        status: StagingStatus,
    },
    /// The operation needs a deployed production schema.
    #[error("no production schema has been deployed")]
    NotDeployed,
    /// The operation needs a backup schema.
    #[error("no backup schema exists")]
    NoBackup,
}

impl ImportState {
    /// Fresh state using `schemas`.
    #[must_use]
    pub fn with_schemas(schemas: SchemaNames) -> Self {
        Self {
            schemas,
            ..Self::default()
        }
    }

    /// State while an import writes the import schema.
    pub fn importing(&self) -> Result<Self, TransitionError> {
        if self.staging != StagingStatus::Absent {
            return Err(TransitionError::StagingNotAbsent {
                status: self.staging,
            });
        }
        Ok(Self {
            staging: StagingStatus::Incomplete,
            ..self.clone()
        })
    }

    /// State after an import finished writing.
    #[must_use]
    pub fn imported(&self) -> Self {
        Self {
            staging: StagingStatus::Complete,
            ..self.clone()
        }
    }

    /// State after the import schema was discarded.
    #[must_use]
    pub fn discarded(&self) -> Self {
        Self {
            staging: StagingStatus::Absent,
            ..self.clone()
        }
    }

    /// State after the import schema replaced production.
    ///
    /// A previous production schema becomes the backup.
    pub fn deployed(&self) -> Result<Self, TransitionError> {
        if self.staging != StagingStatus::Complete {
            return Err(TransitionError::StagingNotComplete {
                status: self.staging,
            });
        }
        Ok(Self {
            phase: Phase::Deployed,
            staging: StagingStatus::Absent,
            has_backup: self.phase == Phase::Deployed,
            schemas: self.schemas.clone(),
        })
    }

    /// State after the backup was restored to production.
    ///
    /// The displaced production schema becomes a complete import schema,
    /// so a revert can itself be undone by deploying again.
    pub fn reverted(&self) -> Result<Self, TransitionError> {
        if !self.has_backup {
            return Err(TransitionError::NoBackup);
        }
        Ok(Self {
            phase: Phase::Deployed,
            staging: StagingStatus::Complete,
            has_backup: false,
            schemas: self.schemas.clone(),
        })
    }

    /// State after the backup schema was dropped.
    pub fn backup_removed(&self) -> Result<Self, TransitionError> {
        if !self.has_backup {
            return Err(TransitionError::NoBackup);
        }
        Ok(Self {
            has_backup: false,
            ..self.clone()
        })
    }

    /// Check that diffs may be applied.
    pub const fn check_diff(&self) -> Result<(), TransitionError> {
        match self.phase {
            Phase::Deployed => Ok(()),
            Phase::Importing => Err(TransitionError::NotDeployed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn first_deploy_has_no_backup() {
        let state = ImportState::default()
            .importing()
            .expect("start import")
            .imported();
        let deployed = state.deployed().expect("deploy");
        assert_eq!(deployed.phase, Phase::Deployed);
        assert_eq!(deployed.staging, StagingStatus::Absent);
        assert!(!deployed.has_backup);
    }

    #[rstest]
    fn second_deploy_keeps_backup() {
        let first = ImportState::default()
            .importing()
            .and_then(|state| state.imported().deployed())
            .expect("first deploy");
        let second = first
            .importing()
            .and_then(|state| state.imported().deployed())
            .expect("second deploy");
        assert!(second.has_backup);
        let reverted = second.reverted().expect("revert");
        assert_eq!(reverted.staging, StagingStatus::Complete);
        assert!(!reverted.has_backup);
        assert_eq!(reverted.reverted(), Err(TransitionError::NoBackup));
    }

    #[rstest]
    #[case(StagingStatus::Absent)]
    #[case(StagingStatus::Incomplete)]
    fn only_complete_imports_deploy(#[case] staging: StagingStatus) {
        let state = ImportState {
            staging,
            ..ImportState::default()
        };
        assert_eq!(
            state.deployed(),
            Err(TransitionError::StagingNotComplete { status: staging })
        );
    }

    #[rstest]
    fn incomplete_import_blocks_new_import() {
        let state = ImportState::default().importing().expect("start import");
        assert_eq!(
            state.importing(),
            Err(TransitionError::StagingNotAbsent {
                status: StagingStatus::Incomplete
            })
        );
        assert!(state.discarded().importing().is_ok());
    }

    #[rstest]
    fn diffs_need_a_deployment() {
        assert_eq!(
            ImportState::default().check_diff(),
            Err(TransitionError::NotDeployed)
        );
    }

    #[rstest]
    fn state_round_trips_through_json() {
        let state = ImportState {
            phase: Phase::Deployed,
            staging: StagingStatus::Complete,
            has_backup: true,
            schemas: SchemaNames::default(),
        };
        let json = serde_json::to_string(&state).expect("encode");
        assert!(json.contains("\"deployed\""));
        assert_eq!(
            serde_json::from_str::<ImportState>(&json).expect("decode"),
            state
        );
    }
}
