//! Cancellable task adapter: wires a unit of work to a promise.
//!
//! This is the thin lifecycle shim between the settlement engine and an
//! externally supplied cooperative task. The engine consumes exactly one
//! completion signal per task and offers the task a cancellation query; the
//! task promises to call the finish entry point exactly once.
//!
//! - [`Task`] is the unit-of-work trait. Its `run` receives a
//!   [`TaskFinisher`] and must consume it with [`TaskFinisher::finish`]
//!   before returning — by ownership, finishing twice is impossible.
//! - [`TaskFinisher::is_discarded`] is the cooperative cancellation query:
//!   a task may poll it at checkpoints and finish early with whatever
//!   cancellation convention its domain uses (a dedicated error, or a
//!   "no value" marker inside `V`).
//! - [`spawn_task`] submits the task to an execution context and returns
//!   the promise its completion will settle.
//!
//! Dropping a finisher without calling `finish` is a usage-contract
//! violation on the task's side; the adapter catches it and logs an error,
//! leaving the promise unresolved rather than inventing an outcome.

use crate::context::ContextHandle;
use crate::error::ContractViolation;
use crate::promise::Promise;
use crate::tracing_compat::error;

/// A cancellable unit of work that reports completion exactly once.
pub trait Task<V, E>: Send + 'static
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs the work. Must consume `finisher` via [`TaskFinisher::finish`]
    /// exactly once, either on completion or after observing cancellation.
    fn run(self: Box<Self>, finisher: TaskFinisher<V, E>);
}

// A bare closure works as a task.
impl<V, E, F> Task<V, E> for F
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: FnOnce(TaskFinisher<V, E>) + Send + 'static,
{
    fn run(self: Box<Self>, finisher: TaskFinisher<V, E>) {
        (*self)(finisher);
    }
}

/// The completion entry point handed to a running [`Task`].
///
/// Consuming [`finish`] enforces the exactly-once completion contract at
/// the type level; what remains detectable only at runtime — dropping the
/// finisher without finishing — is caught in `Drop`.
///
/// [`finish`]: TaskFinisher::finish
#[derive(Debug)]
pub struct TaskFinisher<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    promise: Option<Promise<V, E>>,
}

impl<V, E> TaskFinisher<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Reports the task's outcome, settling the promise.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::AlreadyResolved`] if the owning promise was
    /// settled from elsewhere — the producer breaking its own contract.
    pub fn finish(mut self, outcome: Result<V, E>) -> Result<(), ContractViolation> {
        let promise = self
            .promise
            .take()
            .expect("finisher promise taken before drop");
        match outcome {
            Ok(value) => promise.resolve_value(value),
            Err(err) => promise.resolve_error(Some(err)),
        }
    }

    /// Returns `true` if the task's owner has discarded the promise (or
    /// any promise derived from it). Cooperative: the task decides whether
    /// and how to wind down.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.promise
            .as_ref()
            .is_some_and(Promise::is_discarded)
    }

    /// Reports progress on the owning promise.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::ProgressAfterResolution`] if the promise was
    /// already settled.
    pub fn update_progress(&self, progress: f64) -> Result<f64, ContractViolation> {
        self.promise
            .as_ref()
            .expect("finisher promise taken before drop")
            .update_progress(progress)
    }
}

impl<V, E> Drop for TaskFinisher<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if self.promise.is_some() {
            // The task terminated without calling finish. That is the
            // task's contract violation to fix; surface it loudly.
            error!("task dropped its finisher without reporting completion");
        }
    }
}

/// Runs `task` on `ctx` and returns the promise its completion settles.
///
/// The promise is the producer handle: hold it to poll
/// [`Promise::is_discarded`]-driven cancellation from the outside, register
/// reactions on it, or hand it to consumers.
pub fn spawn_task<V, E, T>(ctx: &ContextHandle, task: T) -> Promise<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    T: Task<V, E>,
{
    let promise = Promise::new();
    let finisher = TaskFinisher {
        promise: Some(promise.clone()),
    };
    let boxed: Box<T> = Box::new(task);
    ctx.submit(Box::new(move || boxed.run(finisher)));
    promise
}
