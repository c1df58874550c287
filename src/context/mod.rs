//! Execution contexts for reaction delivery.
//!
//! The settlement engine owns no threads of its own. Every reaction is
//! delivered by submitting a job to an [`ExecutionContext`] chosen at
//! registration time, and every context is expected to run submitted jobs
//! asynchronously while preserving submission order. This is what gives the
//! engine its two delivery guarantees:
//!
//! - a reaction bound to context Q always runs on Q, and
//! - reactions always run later, never on the caller's stack.
//!
//! Two implementations ship with the crate:
//!
//! - [`SerialContext`]: one named worker thread draining a FIFO queue. This
//!   is the production context and the default.
//! - [`ManualContext`]: a queue drained only by explicit calls, for
//!   deterministic tests.
//!
//! # The default context
//!
//! Registrations that name no context fall back to a process-wide default.
//! The default is an explicit, injectable slot rather than a hidden
//! singleton: install your own handle once at startup with
//! [`set_default_context`], or let the first use lazily install a
//! [`SerialContext`] named `"vow-default"`.

mod manual;
mod serial;

pub use manual::ManualContext;
pub use serial::{SerialContext, SerialContextOptions};

use crate::error::ContractViolation;
use std::sync::{Arc, OnceLock};

/// A unit of work submitted to an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A scheduler that runs submitted jobs asynchronously, in submission order.
///
/// Implementations must never run a job synchronously inside [`submit`]:
/// the engine relies on `submit` returning before the job executes to rule
/// out reentrancy (a producer settling a promise while holding its own lock
/// must not re-enter consumer code on its own stack).
///
/// [`submit`]: ExecutionContext::submit
pub trait ExecutionContext: Send + Sync {
    /// Enqueues a job for asynchronous execution.
    ///
    /// Jobs submitted to the same context must execute in submission order.
    fn submit(&self, job: Job);

    /// A human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// A shared handle to an execution context.
pub type ContextHandle = Arc<dyn ExecutionContext>;

static DEFAULT_CONTEXT: OnceLock<ContextHandle> = OnceLock::new();

/// Installs the process-wide default execution context.
///
/// May be called at most once, before anything has used the default; the
/// slot is write-once for the life of the process.
///
/// # Errors
///
/// Returns [`ContractViolation::DefaultContextInstalled`] if a default
/// context is already in place (installed explicitly, or lazily by a prior
/// use of [`default_context`]).
pub fn set_default_context(ctx: ContextHandle) -> Result<(), ContractViolation> {
    DEFAULT_CONTEXT
        .set(ctx)
        .map_err(|_| ContractViolation::DefaultContextInstalled)
}

/// Returns the process-wide default execution context.
///
/// If none has been installed, lazily installs a [`SerialContext`] named
/// `"vow-default"` and returns it.
#[must_use]
pub fn default_context() -> ContextHandle {
    Arc::clone(
        DEFAULT_CONTEXT.get_or_init(|| Arc::new(SerialContext::named("vow-default"))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_stable_across_calls() {
        let a = default_context();
        let b = default_context();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn set_default_after_use_is_rejected() {
        let _ = default_context();
        let err = set_default_context(Arc::new(ManualContext::new()));
        assert_eq!(err, Err(ContractViolation::DefaultContextInstalled));
    }
}
