//! Task identity, lifecycle state, and completion handles.
//!
//! # Invariants
//! - A task reaches a terminal state exactly once; the terminal state is
//!   immutable thereafter (`TaskRecord::set_state` ignores later writes).
//! - `TaskId` is unique within a process.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ScopeError;

/// Unique identifier for a task.
///
/// # Properties
/// - Globally unique within an execution context
/// - Immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Completed
///                   \-> Failed
///                   \-> Cancelled
///        \-> Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Registered with a scope, not yet dispatched by the scheduler
    Pending,
    /// Dispatched and executing (or suspended at a yield point)
    Running,
    /// Work returned a value
    Completed,
    /// Cancelled before producing a value
    Cancelled,
    /// Work returned an error or panicked
    Failed { reason: String },
}

impl TaskState {
    /// Check if the task is in a terminal state.
    ///
    /// # Property
    /// `is_terminal()` implies no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed { .. }
        )
    }

    /// Check if the task can still make progress.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// Shared bookkeeping record for a scheduled task.
///
/// The owning scope keeps one reference (for snapshots), the task handle
/// keeps another, and the spawned wrapper keeps a third to drive state
/// transitions.
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    state: Mutex<TaskState>,
}

impl TaskRecord {
    pub(crate) fn new(label: String) -> Self {
        Self {
            id: TaskId::new(),
            label,
            state: Mutex::new(TaskState::Pending),
        }
    }

    /// Transition to `next` unless a terminal state was already reached.
    ///
    /// The spawned wrapper is the only writer after registration, but the
    /// terminal-once invariant is still enforced here rather than trusted.
    pub(crate) fn set_state(&self, next: TaskState) {
        let mut state = self.state.lock().unwrap();
        if !state.is_terminal() {
            *state = next;
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.lock().unwrap().clone()
    }
}

/// Handle to a scheduled task: the caller's side of eventual completion.
///
/// Dropping the handle does not cancel or detach the task; the owning scope
/// still tracks it, and an unobserved failure is still reported through the
/// scope's failure handler.
pub struct TaskHandle<T> {
    record: Arc<TaskRecord>,
    rx: oneshot::Receiver<Result<T, ScopeError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        record: Arc<TaskRecord>,
        rx: oneshot::Receiver<Result<T, ScopeError>>,
    ) -> Self {
        Self { record, rx }
    }

    pub fn id(&self) -> TaskId {
        self.record.id
    }

    pub fn label(&self) -> &str {
        &self.record.label
    }

    /// Snapshot of the task's current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.record.state()
    }

    /// Suspend until the task is terminal; return its value or its error.
    ///
    /// Suspension yields to the scheduler and never blocks the carrier
    /// thread. Consumes the handle: a task's result is observed at most once.
    pub async fn join(self) -> Result<T, ScopeError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // The wrapper always sends before exiting; losing the sender
            // means the runtime shut down underneath the task.
            Err(_) => Err(ScopeError::TaskPanicked {
                label: self.record.label.clone(),
                message: "task was lost before reporting a result".into(),
            }),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.record.id)
            .field("label", &self.record.label)
            .field("state", &self.record.state())
            .finish()
    }
}

/// Suspend until every handle is terminal, or until the first failure.
///
/// On success, results are returned in the order the handles were passed in
/// (scheduling order), independent of completion order. On failure, the
/// first failure *observed* — completion-time order, not registration
/// order — is returned exactly once, immediately, without waiting for the
/// remaining tasks. Their scopes still track them, so nothing leaks.
pub async fn join_all<T>(
    handles: impl IntoIterator<Item = TaskHandle<T>>,
) -> Result<Vec<T>, ScopeError> {
    use futures::stream::{FuturesUnordered, StreamExt};

    let mut pending = FuturesUnordered::new();
    let mut total = 0;
    for (index, handle) in handles.into_iter().enumerate() {
        total += 1;
        pending.push(async move { (index, handle.join().await) });
    }

    let mut slots: Vec<Option<T>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    while let Some((index, outcome)) = pending.next().await {
        match outcome {
            Ok(value) => slots[index] = Some(value),
            Err(err) => return Err(err),
        }
    }

    // Every future completed without error, so every slot is filled.
    Ok(slots
        .into_iter()
        .map(|slot| slot.expect("joined task left no result"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_immutable() {
        let record = TaskRecord::new("t".into());
        assert_eq!(record.state(), TaskState::Pending);

        record.set_state(TaskState::Running);
        record.set_state(TaskState::Completed);
        assert_eq!(record.state(), TaskState::Completed);

        // Later transitions are ignored once terminal.
        record.set_state(TaskState::Cancelled);
        record.set_state(TaskState::Failed {
            reason: "late".into(),
        });
        assert_eq!(record.state(), TaskState::Completed);
    }

    #[test]
    fn state_classification() {
        assert!(TaskState::Pending.is_active());
        assert!(TaskState::Running.is_active());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Failed { reason: "x".into() }.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }
}
