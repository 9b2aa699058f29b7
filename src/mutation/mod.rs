//! Reversible system mutations.
//!
//! Every mutation is a [`MutationAction`] with its own apply/restore logic and
//! a stable snapshot key. The [`MutationRunner`] walks a list of actions in
//! order and turns each failure into an [`ActionOutcome`] instead of aborting
//! the batch. Only persistence failures propagate, since losing a snapshot
//! would silently break restore.

pub mod actions;
pub mod runner;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::store::{SnapshotStore, StoreError};
use crate::utils::command::{display_command, powershell_args, CommandOutput, CommandRunner};

pub use actions::default_actions;
pub use runner::MutationRunner;

/// Errors raised by a single action
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot '{key}' is unusable: {reason}")]
    InvalidSnapshot { key: String, reason: String },

    #[error("snapshot written outside of an action")]
    NoActiveAction,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-action lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    NotRun,
    Snapshotted,
    Applied { succeeded: bool },
    Restored { succeeded: bool },
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::NotRun => write!(f, "not run"),
            ActionState::Snapshotted => write!(f, "snapshotted"),
            ActionState::Applied { succeeded: true } => write!(f, "applied"),
            ActionState::Applied { succeeded: false } => write!(f, "apply failed"),
            ActionState::Restored { succeeded: true } => write!(f, "restored"),
            ActionState::Restored { succeeded: false } => write!(f, "restore failed"),
        }
    }
}

/// Result of one apply or restore call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action_name: String,
    pub succeeded: bool,
    /// Always starts with the action name
    pub message: String,
    pub state: ActionState,
}

/// One independent, reversible system lever
pub trait MutationAction {
    fn name(&self) -> &str;

    /// Key under which the pre-mutation state is persisted; stable across runs
    fn snapshot_key(&self) -> &'static str;

    /// Snapshot the current state through `ctx`, then mutate it.
    /// Returns a short description of what changed.
    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError>;

    /// Bring the system back to `snapshot`, the payload written by a previous `apply`
    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError>;
}

/// Scoped access to the store and the command runner for the action being run.
///
/// Replaces any shared scratch state between actions: an action only sees its
/// own snapshot key.
pub struct MutationContext<'a> {
    store: &'a mut SnapshotStore,
    runner: &'a dyn CommandRunner,
    current_key: Option<&'static str>,
    state: ActionState,
}

impl<'a> MutationContext<'a> {
    pub fn new(store: &'a mut SnapshotStore, runner: &'a dyn CommandRunner) -> Self {
        Self {
            store,
            runner,
            current_key: None,
            state: ActionState::NotRun,
        }
    }

    /// Point the context at the next action
    pub(crate) fn begin(&mut self, key: &'static str) {
        self.current_key = Some(key);
        self.state = ActionState::NotRun;
    }

    pub(crate) fn finish(&mut self) {
        self.current_key = None;
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn store(&self) -> &SnapshotStore {
        self.store
    }

    /// Persist the pre-mutation state under the current action's key
    pub fn snapshot<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<(), MutationError> {
        let key = self.current_key.ok_or(MutationError::NoActiveAction)?;
        self.store.set(key, payload)?;
        self.state = ActionState::Snapshotted;
        Ok(())
    }

    /// Run a command and fail on a non-zero exit status
    pub fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, MutationError> {
        let output = self.run_unchecked(program, args)?;
        if !output.success {
            let detail = if output.stderr.trim().is_empty() {
                format!("exit status {:?}", output.code)
            } else {
                output.stderr.trim().to_string()
            };
            return Err(MutationError::CommandFailed {
                command: display_command(program, args),
                detail,
            });
        }
        Ok(output)
    }

    /// Run a command, only failing when it cannot be started
    pub fn run_unchecked(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, MutationError> {
        self.runner
            .run(program, args)
            .map_err(|source| MutationError::Spawn {
                command: display_command(program, args),
                source,
            })
    }

    pub fn powershell(&self, script: &str) -> Result<CommandOutput, MutationError> {
        self.run("powershell", &powershell_args(script))
    }

    pub fn powershell_unchecked(&self, script: &str) -> Result<CommandOutput, MutationError> {
        self.run_unchecked("powershell", &powershell_args(script))
    }
}
