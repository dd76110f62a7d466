//! # taskscope
//!
//! Structured concurrency scopes on top of tokio.
//!
//! This library provides:
//! - Scopes that own trees of concurrent tasks for joint lifecycle and
//!   cancellation management
//! - Cooperative cancellation that always reaches the whole subtree
//! - Failure propagation with per-scope propagate/isolate policies
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │            Scheduler             │
//!        │   (explicit handle, no global)   │
//!        └────────────────┬─────────────────┘
//!                         │ spawns wrappers
//!                         ▼
//!        Scope ──┬── Task   Task   Task
//!                └── Scope ──┬── Task
//!                            └── Task
//! ```
//!
//! ## Lifecycle
//! 1. Build a [`Scheduler`] from a runtime handle and create a root [`Scope`]
//! 2. `schedule` work; hold [`TaskHandle`]s for results
//! 3. `join` the scope: it is complete only when every descendant is terminal
//! 4. A failure cancels its siblings and bubbles up until an isolating scope
//!
//! Suspension (`join`, `join_all`, sleeps inside work) always yields to the
//! scheduler and never blocks a carrier thread; tasks migrate freely between
//! carriers across suspension points, and the runtime makes pre-yield writes
//! visible to whichever carrier resumes the task.
//!
//! ## Modules
//! - `scope`: scope tree, configuration, cancellation, failure propagation
//! - `task`: task identity, lifecycle states, completion handles
//! - `scheduler`: explicit carrier-pool handle passed to scope creation
//! - `iosim`: simulated I/O collaborators for demos and tests

pub mod error;
pub mod iosim;
pub mod scheduler;
pub mod scope;
pub mod task;

pub use error::ScopeError;
pub use scheduler::Scheduler;
pub use scope::{FailurePolicy, Scope, ScopeConfig, ScopeSnapshot, TaskSnapshot};
pub use task::{join_all, TaskHandle, TaskId, TaskState};
