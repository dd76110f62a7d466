//! Structured task scopes: joint lifecycle and cancellation management for
//! trees of concurrent tasks.
//!
//! # Structure
//! - A root scope is created against an explicit [`Scheduler`].
//! - Child scopes share the root's scheduler and derive their cancellation
//!   token from the parent, so cancelling any scope reaches its whole
//!   subtree regardless of which reference scheduled a descendant.
//!
//! # Invariants
//! - A scope is not complete until every task and child scope it ever
//!   created has reached a terminal state (`join` enforces this).
//! - Cancellation is irreversible: a cancelled scope refuses new work with
//!   [`ScopeError::ScopeCancelled`] forever.
//! - Cancellation is cooperative: running work observes it at its next
//!   suspension point; a non-suspending region runs to its next yield.
//!
//! # Thread Safety
//! The child-set and completion accounting are guarded by an internal lock;
//! task wrappers mutate them from arbitrary carrier threads.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::ScopeError;
use crate::scheduler::Scheduler;
use crate::task::{TaskHandle, TaskId, TaskRecord, TaskState};

/// Callback invoked for every task failure the scope observes.
pub type FailureHandler = Arc<dyn Fn(&ScopeError) + Send + Sync>;

/// What a scope does with a child failure after cancelling its own subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Forward the failure to the parent scope, cancelling upward.
    Propagate,
    /// Contain the failure: the scope's own subtree is cancelled, the
    /// parent never hears about it.
    Isolate,
}

/// Configuration for a scope: diagnostic label, failure policy, and an
/// optional failure handler.
///
/// Replaces ad-hoc context composition with named fields; the carrier
/// selection concern lives in the [`Scheduler`] passed to [`Scope::new`].
#[derive(Clone)]
pub struct ScopeConfig {
    pub label: String,
    pub policy: FailurePolicy,
    pub on_failure: Option<FailureHandler>,
}

impl ScopeConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            policy: FailurePolicy::Propagate,
            on_failure: None,
        }
    }

    /// Make this scope an isolating boundary for failure propagation.
    pub fn isolating(mut self) -> Self {
        self.policy = FailurePolicy::Isolate;
        self
    }

    /// Install a handler that observes every failure reported to the scope.
    ///
    /// Without a handler, failures are reported through `tracing::error!`.
    pub fn with_failure_handler(
        mut self,
        handler: impl Fn(&ScopeError) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for ScopeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeConfig")
            .field("label", &self.label)
            .field("policy", &self.policy)
            .field("on_failure", &self.on_failure.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

#[derive(Default)]
struct ScopeState {
    /// Non-terminal descendant tasks, counted transitively: scheduling
    /// anywhere in the subtree increments every ancestor.
    live: usize,
    /// First failure recorded at this scope (locally raised or propagated).
    first_error: Option<ScopeError>,
    /// Every task ever scheduled directly on this scope, for snapshots.
    tasks: Vec<Arc<TaskRecord>>,
    /// Child scopes, for snapshots. Weak: a scope does not keep an
    /// abandoned child alive.
    children: Vec<Weak<ScopeInner>>,
}

struct ScopeInner {
    label: String,
    policy: FailurePolicy,
    on_failure: Option<FailureHandler>,
    scheduler: Scheduler,
    cancel_token: CancellationToken,
    parent: Option<Weak<ScopeInner>>,
    state: Mutex<ScopeState>,
    idle: Notify,
}

/// A node in the task hierarchy. Cheap to clone; clones share the scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a root scope on an explicitly provided scheduler.
    pub fn new(config: ScopeConfig, scheduler: &Scheduler) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                label: config.label,
                policy: config.policy,
                on_failure: config.on_failure,
                scheduler: scheduler.clone(),
                cancel_token: CancellationToken::new(),
                parent: None,
                state: Mutex::new(ScopeState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Create a child scope.
    ///
    /// The child inherits the parent's scheduler and derives its
    /// cancellation token from the parent's, so cancelling the parent
    /// cancels the child and everything below it.
    ///
    /// # Errors
    /// `ScopeCancelled` if this scope is already cancelled.
    pub fn child(&self, config: ScopeConfig) -> Result<Scope, ScopeError> {
        if self.inner.cancel_token.is_cancelled() {
            return Err(ScopeError::ScopeCancelled {
                label: self.inner.label.clone(),
            });
        }
        let child = Arc::new(ScopeInner {
            label: config.label,
            policy: config.policy,
            on_failure: config.on_failure,
            scheduler: self.inner.scheduler.clone(),
            cancel_token: self.inner.cancel_token.child_token(),
            parent: Some(Arc::downgrade(&self.inner)),
            state: Mutex::new(ScopeState::default()),
            idle: Notify::new(),
        });
        self.inner
            .state
            .lock()
            .unwrap()
            .children
            .push(Arc::downgrade(&child));
        Ok(Scope { inner: child })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Check whether cancellation has been requested for this scope.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }

    /// Register `work` as a child task of this scope.
    ///
    /// Registration is non-blocking: the task starts on the scope's
    /// scheduler and the returned handle represents eventual completion.
    /// Work that resolves to `Err` counts as an unhandled task failure and
    /// triggers the scope's failure policy; work that handles its own
    /// errors and returns `Ok` triggers nothing.
    ///
    /// # Errors
    /// `ScopeCancelled` if this scope is already cancelled.
    pub fn schedule<T, F>(
        &self,
        label: impl Into<String>,
        work: F,
    ) -> Result<TaskHandle<T>, ScopeError>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let inner = &self.inner;
        if inner.cancel_token.is_cancelled() {
            return Err(ScopeError::ScopeCancelled {
                label: inner.label.clone(),
            });
        }

        let record = Arc::new(TaskRecord::new(label));
        inner.retain(&record);
        tracing::trace!(scope = %inner.label, task = %record.label, id = %record.id, "scheduled task");

        let (tx, rx) = oneshot::channel();
        let cancel_token = inner.cancel_token.clone();
        let owner = Arc::clone(inner);
        let task = Arc::clone(&record);
        inner.scheduler.spawn(async move {
            task.set_state(TaskState::Running);
            // Biased select: once cancellation is requested, it wins every
            // race at the next poll, so a task cancelled before its first
            // suspension point can never reach Completed.
            let outcome: Result<T, ScopeError> = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => Err(ScopeError::TaskCancelled {
                    label: task.label.clone(),
                }),
                finished = AssertUnwindSafe(work).catch_unwind() => match finished {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(cause)) => Err(ScopeError::TaskFailed {
                        label: task.label.clone(),
                        cause: Arc::new(cause),
                    }),
                    Err(payload) => Err(ScopeError::TaskPanicked {
                        label: task.label.clone(),
                        message: panic_message(payload),
                    }),
                },
            };
            match outcome {
                Ok(value) => {
                    task.set_state(TaskState::Completed);
                    let _ = tx.send(Ok(value));
                }
                Err(err) => {
                    match &err {
                        ScopeError::TaskCancelled { .. } => task.set_state(TaskState::Cancelled),
                        other => task.set_state(TaskState::Failed {
                            reason: other.to_string(),
                        }),
                    }
                    if err.is_failure() {
                        owner.report_failure(err.clone());
                    }
                    // The awaiter may be gone; the failure was already
                    // reported through the scope, so this is not a loss.
                    let _ = tx.send(Err(err));
                }
            }
            owner.release();
        });

        Ok(TaskHandle::new(record, rx))
    }

    /// Cancel this scope and, recursively, every non-terminal descendant.
    ///
    /// Idempotent and irreversible. Cooperative: each descendant observes
    /// cancellation at its next suspension point and ends Cancelled; no
    /// thread is interrupted.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Schedule a cancellation of this scope after `delay`.
    ///
    /// This is the timeout model: a detached watchdog, excluded from the
    /// scope's completion accounting so it never keeps `join` waiting.
    pub fn cancel_after(&self, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        self.inner.scheduler.spawn(async move {
            tokio::select! {
                _ = inner.cancel_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tracing::debug!(scope = %inner.label, ?delay, "deadline elapsed");
                    inner.cancel();
                }
            }
        });
    }

    /// Suspend until every descendant ever created is terminal.
    ///
    /// Returns the first failure recorded at this scope (locally raised or
    /// propagated from below), or `Ok(())` for any mix of completions and
    /// cancellations.
    pub async fn join(&self) -> Result<(), ScopeError> {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Enable before checking so a release between the check and the
            // await still wakes us.
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock().unwrap();
                if state.live == 0 {
                    return match &state.first_error {
                        Some(err) => Err(err.clone()),
                        None => Ok(()),
                    };
                }
            }
            notified.await;
        }
    }

    /// Point-in-time view of the scope subtree for diagnostics.
    pub fn snapshot(&self) -> ScopeSnapshot {
        self.inner.snapshot()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("Scope")
            .field("label", &self.inner.label)
            .field("policy", &self.inner.policy)
            .field("cancelled", &self.inner.cancel_token.is_cancelled())
            .field("live", &state.live)
            .finish()
    }
}

impl ScopeInner {
    fn parent_arc(&self) -> Option<Arc<ScopeInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Count a new task against this scope and every ancestor.
    fn retain(&self, record: &Arc<TaskRecord>) {
        {
            let mut state = self.state.lock().unwrap();
            state.live += 1;
            state.tasks.push(Arc::clone(record));
        }
        let mut current = self.parent_arc();
        while let Some(node) = current {
            node.state.lock().unwrap().live += 1;
            current = node.parent_arc();
        }
    }

    /// Retire a terminal task from this scope and every ancestor, waking
    /// joiners of any scope that becomes quiescent.
    fn release(&self) {
        let idle = {
            let mut state = self.state.lock().unwrap();
            state.live -= 1;
            state.live == 0
        };
        if idle {
            self.idle.notify_waiters();
        }
        let mut current = self.parent_arc();
        while let Some(node) = current {
            let idle = {
                let mut state = node.state.lock().unwrap();
                state.live -= 1;
                state.live == 0
            };
            if idle {
                node.idle.notify_waiters();
            }
            current = node.parent_arc();
        }
    }

    fn cancel(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        tracing::debug!(scope = %self.label, "cancelling scope subtree");
        // Child tokens observe this recursively.
        self.cancel_token.cancel();
    }

    /// Handle an unhandled task failure surfacing at this scope.
    ///
    /// Records the first failure for `join`, reports through the configured
    /// handler (or a log line), cancels the remaining subtree, and bubbles
    /// the error to the parent unless this scope isolates.
    fn report_failure(&self, err: ScopeError) {
        let first = {
            let mut state = self.state.lock().unwrap();
            if state.first_error.is_none() {
                state.first_error = Some(err.clone());
                true
            } else {
                false
            }
        };
        match &self.on_failure {
            Some(handler) => handler(&err),
            None if first => {
                tracing::error!(scope = %self.label, error = %err, "unhandled task failure")
            }
            None => {}
        }
        self.cancel();
        if self.policy == FailurePolicy::Propagate {
            if let Some(parent) = self.parent_arc() {
                parent.report_failure(err);
            }
        }
    }

    fn snapshot(&self) -> ScopeSnapshot {
        let (tasks, children, live) = {
            let state = self.state.lock().unwrap();
            let tasks = state
                .tasks
                .iter()
                .map(|record| TaskSnapshot {
                    id: record.id,
                    label: record.label.clone(),
                    state: record.state(),
                })
                .collect();
            let children: Vec<_> = state.children.iter().filter_map(Weak::upgrade).collect();
            (tasks, children, state.live)
        };
        ScopeSnapshot {
            label: self.label.clone(),
            cancelled: self.cancel_token.is_cancelled(),
            live,
            tasks,
            children: children.iter().map(|child| child.snapshot()).collect(),
        }
    }
}

/// Serializable view of one task for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub label: String,
    pub state: TaskState,
}

/// Serializable view of a scope subtree for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub label: String,
    pub cancelled: bool,
    /// Non-terminal tasks in this subtree at snapshot time.
    pub live: usize,
    pub tasks: Vec<TaskSnapshot>,
    pub children: Vec<ScopeSnapshot>,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::join_all;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn root(label: &str) -> Scope {
        Scope::new(ScopeConfig::new(label), &Scheduler::current())
    }

    /// Collects every error a failure handler observes.
    fn collecting_handler() -> (Arc<Mutex<Vec<ScopeError>>>, ScopeConfig) {
        let seen: Arc<Mutex<Vec<ScopeError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = ScopeConfig::new("handled").with_failure_handler(move |err| {
            sink.lock().unwrap().push(err.clone());
        });
        (seen, config)
    }

    #[tokio::test(start_paused = true)]
    async fn join_waits_for_every_task() {
        let scope = root("root");
        let done = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let done = Arc::clone(&done);
            let handle = scope
                .schedule(format!("task-{i}"), async move {
                    tokio::time::sleep(Duration::from_millis(10 * (i + 1))).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            handles.push(handle);
        }

        assert_ok!(scope.join().await);
        assert_eq!(done.load(Ordering::SeqCst), 5);
        for handle in &handles {
            assert_eq!(handle.state(), TaskState::Completed);
        }
    }

    #[tokio::test]
    async fn cancelled_scope_refuses_new_work() {
        let scope = root("root");
        scope.cancel();

        let err = scope
            .schedule("late", async { Ok(()) })
            .expect_err("cancelled scope accepted work");
        assert!(matches!(err, ScopeError::ScopeCancelled { .. }));

        let err = scope
            .child(ScopeConfig::new("late-child"))
            .expect_err("cancelled scope produced a child");
        assert!(matches!(err, ScopeError::ScopeCancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_suspension_still_cancels_everything() {
        let scope = root("root");
        let side_effect = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for i in 0..4 {
            let side_effect = Arc::clone(&side_effect);
            let handle = scope
                .schedule(format!("task-{i}"), async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    side_effect.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            handles.push(handle);
        }

        scope.cancel();
        assert_ok!(scope.join().await);

        assert!(!side_effect.load(Ordering::SeqCst));
        for handle in handles {
            assert_eq!(handle.state(), TaskState::Cancelled);
            let err = handle.join().await.expect_err("cancelled task completed");
            assert!(matches!(err, ScopeError::TaskCancelled { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let scope = root("root");
        let handle = scope
            .schedule("sleeper", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .unwrap();

        scope.cancel();
        scope.cancel();
        assert_ok!(scope.join().await);

        assert_eq!(handle.state(), TaskState::Cancelled);
        assert!(scope.is_cancelled());
        // Still refused after the second cancel, same as after the first.
        assert!(scope.schedule("again", async { Ok(()) }).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_cancels_siblings_and_reaches_awaiter() {
        let (seen, config) = collecting_handler();
        let scope = Scope::new(config, &Scheduler::current());

        let failing = scope
            .schedule("failing", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<i32, _>(anyhow::anyhow!("boom"))
            })
            .unwrap();
        let sibling = scope
            .schedule("sibling", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .unwrap();

        let err = failing.join().await.expect_err("failing task succeeded");
        assert!(matches!(err, ScopeError::TaskFailed { .. }));
        assert!(err.to_string().contains("boom"));

        let err = sibling.join().await.expect_err("sibling escaped cancellation");
        assert!(matches!(err, ScopeError::TaskCancelled { .. }));

        let err = scope.join().await.expect_err("scope join hid the failure");
        assert!(err.to_string().contains("boom"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn join_all_preserves_scheduling_order() {
        let scope = root("root");

        let mut handles = Vec::new();
        for i in 1..=10u64 {
            let handle = scope
                .schedule(format!("task-{i}"), async move {
                    // Later-scheduled tasks finish earlier.
                    tokio::time::sleep(Duration::from_millis(11 - i)).await;
                    Ok(i)
                })
                .unwrap();
            handles.push(handle);
        }

        let results = join_all(handles).await.unwrap();
        assert_eq!(results, (1..=10).collect::<Vec<_>>());
        assert_ok!(scope.join().await);
    }

    #[tokio::test(start_paused = true)]
    async fn join_all_surfaces_first_failure_without_waiting() {
        let (_, config) = collecting_handler();
        let scope = Scope::new(config, &Scheduler::current());
        let slow_finished = Arc::new(AtomicBool::new(false));

        let failing = scope
            .schedule("failing", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("boom"))
            })
            .unwrap();
        let slow = {
            let slow_finished = Arc::clone(&slow_finished);
            scope
                .schedule("slow", async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    slow_finished.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
        };

        let err = join_all(vec![failing, slow])
            .await
            .expect_err("aggregate join missed the failure");
        assert!(err.to_string().contains("boom"));
        assert!(!slow_finished.load(Ordering::SeqCst));

        // The scope still tracks the cancelled sibling to quiescence.
        assert!(scope.join().await.is_err());
        assert!(!slow_finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn isolating_scope_contains_failure() {
        let parent = root("parent");
        let healthy_done = Arc::new(AtomicBool::new(false));

        let healthy = {
            let healthy_done = Arc::clone(&healthy_done);
            parent
                .schedule("healthy", async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    healthy_done.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
        };

        let seen: Arc<Mutex<Vec<ScopeError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let boundary = parent
            .child(
                ScopeConfig::new("boundary")
                    .isolating()
                    .with_failure_handler(move |err| sink.lock().unwrap().push(err.clone())),
            )
            .unwrap();

        boundary
            .schedule::<(), _>("failing", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("contained"))
            })
            .unwrap();
        let inner_sibling = boundary
            .schedule("inner-sibling", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .unwrap();

        // The parent completes cleanly; the failure stays behind the boundary.
        assert_ok!(parent.join().await);
        assert!(healthy_done.load(Ordering::SeqCst));
        assert_eq!(healthy.state(), TaskState::Completed);
        assert!(!parent.is_cancelled());

        // Inside the boundary, the failing task took its siblings down.
        assert_eq!(inner_sibling.state(), TaskState::Cancelled);
        assert!(boundary.join().await.is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unawaited_failure_is_still_reported() {
        let (seen, config) = collecting_handler();
        let scope = Scope::new(config, &Scheduler::current());

        let handle = scope
            .schedule::<(), _>("dropped", async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(anyhow::anyhow!("nobody is listening"))
            })
            .unwrap();
        drop(handle);

        let err = scope.join().await.expect_err("failure was swallowed");
        assert!(err.to_string().contains("nobody is listening"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], ScopeError::TaskFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_grandchildren() {
        let parent = root("parent");
        let child = parent.child(ScopeConfig::new("child")).unwrap();

        let grandchild = child
            .schedule("grandchild", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .unwrap();

        parent.cancel();
        assert_ok!(parent.join().await);

        assert_eq!(grandchild.state(), TaskState::Cancelled);
        assert!(child.is_cancelled());
        // The whole subtree refuses new work, whichever reference is used.
        assert!(child.schedule("late", async { Ok(()) }).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_acts_as_timeout() {
        let scope = root("root");
        let handle = scope
            .schedule("slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .unwrap();

        scope.cancel_after(Duration::from_millis(50));
        assert_ok!(scope.join().await);

        assert!(scope.is_cancelled());
        assert_eq!(handle.state(), TaskState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_is_contained_and_treated_as_failure() {
        let (seen, config) = collecting_handler();
        let scope = Scope::new(config, &Scheduler::current());

        let panicking = scope
            .schedule::<(), _>("panicking", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                panic!("kaboom")
            })
            .unwrap();
        let sibling = scope
            .schedule("sibling", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .unwrap();

        let err = panicking.join().await.expect_err("panic went unnoticed");
        assert!(matches!(err, ScopeError::TaskPanicked { .. }));
        assert!(err.to_string().contains("kaboom"));

        assert!(matches!(
            sibling.join().await,
            Err(ScopeError::TaskCancelled { .. })
        ));
        assert!(scope.join().await.is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_subtree_state() {
        let scope = root("root");
        let child = scope.child(ScopeConfig::new("child")).unwrap();

        scope.schedule("ok", async { Ok(()) }).unwrap();
        child
            .schedule::<(), _>("failing", async { Err(anyhow::anyhow!("boom")) })
            .unwrap();

        let _ = scope.join().await;
        let snapshot = scope.snapshot();

        assert_eq!(snapshot.label, "root");
        assert_eq!(snapshot.live, 0);
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.children.len(), 1);
        assert_eq!(snapshot.children[0].label, "child");
        assert!(matches!(
            snapshot.children[0].tasks[0].state,
            TaskState::Failed { .. }
        ));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["label"], "root");
        assert_eq!(json["children"][0]["label"], "child");
    }
}
