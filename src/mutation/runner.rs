//! Ordered, failure-isolated application and restoration of mutations.

use log::{debug, info, warn};

use super::{ActionOutcome, ActionState, MutationAction, MutationContext, MutationError};
use crate::store::StoreError;

/// Walks a list of actions in order
pub struct MutationRunner;

impl MutationRunner {
    /// Apply every action in order, one outcome per action.
    ///
    /// A failing action yields a failed outcome and the batch continues. A
    /// store failure aborts the batch and is returned to the caller.
    pub fn apply_all(
        actions: &[Box<dyn MutationAction>],
        ctx: &mut MutationContext<'_>,
    ) -> Result<Vec<ActionOutcome>, StoreError> {
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            ctx.begin(action.snapshot_key());
            let result = action.apply(ctx);
            let snapshotted = ctx.state() == ActionState::Snapshotted;
            ctx.finish();

            let outcome = match result {
                Ok(detail) => {
                    info!("{}: {}", action.name(), detail);
                    ActionOutcome {
                        action_name: action.name().to_string(),
                        succeeded: true,
                        message: format!("{}: {}", action.name(), detail),
                        state: ActionState::Applied { succeeded: true },
                    }
                }
                Err(MutationError::Store(e)) => return Err(e),
                Err(e) => {
                    warn!(
                        "{} failed ({}): {}",
                        action.name(),
                        if snapshotted { "after snapshot" } else { "before snapshot" },
                        e
                    );
                    ActionOutcome {
                        action_name: action.name().to_string(),
                        succeeded: false,
                        message: format!("{}: failed ({})", action.name(), e),
                        state: ActionState::Applied { succeeded: false },
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Restore every action from its persisted snapshot.
    ///
    /// Actions without a snapshot are reported as needing manual recovery.
    pub fn restore_all(
        actions: &[Box<dyn MutationAction>],
        ctx: &mut MutationContext<'_>,
    ) -> Result<Vec<ActionOutcome>, StoreError> {
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let key = action.snapshot_key();
            let Some(snapshot) = ctx.store().get(key).cloned() else {
                warn!("No snapshot '{}' for {}", key, action.name());
                outcomes.push(ActionOutcome {
                    action_name: action.name().to_string(),
                    succeeded: false,
                    message: format!(
                        "{}: no backup found, manual recovery required",
                        action.name()
                    ),
                    state: ActionState::NotRun,
                });
                continue;
            };

            debug!("Restoring {} from snapshot '{}'", action.name(), key);
            ctx.begin(key);
            let result = action.restore(ctx, &snapshot);
            ctx.finish();

            let outcome = match result {
                Ok(detail) => {
                    info!("{}: {}", action.name(), detail);
                    ActionOutcome {
                        action_name: action.name().to_string(),
                        succeeded: true,
                        message: format!("{}: {}", action.name(), detail),
                        state: ActionState::Restored { succeeded: true },
                    }
                }
                Err(MutationError::Store(e)) => return Err(e),
                Err(e) => {
                    warn!("Restoring {} failed: {}", action.name(), e);
                    ActionOutcome {
                        action_name: action.name().to_string(),
                        succeeded: false,
                        message: format!("{}: restore failed ({})", action.name(), e),
                        state: ActionState::Restored { succeeded: false },
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
