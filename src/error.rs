//! Error taxonomy for scope and task operations.
//!
//! Errors are local until they cross a `join` boundary (explicit propagation
//! to the awaiter) or escape unhandled from a task's work (implicit
//! propagation to the owning scope, triggering sibling cancellation).

use std::sync::Arc;

use thiserror::Error;

/// Shared cause of a task failure.
///
/// The cause is reference-counted so the same underlying error can reach both
/// the awaiter of the failed task and the owning scope's failure handler.
pub type Cause = Arc<anyhow::Error>;

/// Errors surfaced by scope and task operations.
///
/// # Propagation
/// - `ScopeCancelled` is returned synchronously from scheduling calls.
/// - `TaskFailed` / `TaskPanicked` reach awaiters of the task and bubble
///   through the scope tree according to the scope's failure policy.
/// - `TaskCancelled` reaches awaiters only; cancellation itself is not a
///   failure and never re-triggers propagation.
#[derive(Debug, Clone, Error)]
pub enum ScopeError {
    /// Scheduling was attempted on a scope that is already cancelled.
    #[error("scope '{label}' is cancelled and cannot accept new work")]
    ScopeCancelled { label: String },

    /// The awaited task's work returned an error that nothing handled.
    #[error("task '{label}' failed: {cause}")]
    TaskFailed { label: String, cause: Cause },

    /// The awaited task was cancelled before it could complete.
    #[error("task '{label}' was cancelled")]
    TaskCancelled { label: String },

    /// The task's work panicked. Treated like a failure for propagation.
    #[error("task '{label}' panicked: {message}")]
    TaskPanicked { label: String, message: String },
}

impl ScopeError {
    /// Check whether this error represents a task failure (as opposed to
    /// cancellation fallout or a scheduling refusal).
    ///
    /// Only failures trigger sibling cancellation and upward propagation.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ScopeError::TaskFailed { .. } | ScopeError::TaskPanicked { .. }
        )
    }

    /// The diagnostic label of the task or scope this error refers to.
    pub fn label(&self) -> &str {
        match self {
            ScopeError::ScopeCancelled { label }
            | ScopeError::TaskFailed { label, .. }
            | ScopeError::TaskCancelled { label }
            | ScopeError::TaskPanicked { label, .. } => label,
        }
    }
}
