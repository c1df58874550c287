//! Reaction types and the registration surface.
//!
//! A *reaction* is a closure a consumer attaches to a promise. Success and
//! failure reactions run at most once, receive the settled value or error,
//! and return a [`Resolution`] that drives the settlement of the child
//! promise created at registration. Progress reactions run on every
//! progress update, in registration order.
//!
//! [`ReactionSet`] is the builder fed to [`Promise::register`]: every slot
//! is optional, mirroring the shape of the single registration entry point
//! (success?, failure?, progress?, context?).
//!
//! [`Promise::register`]: crate::Promise::register

use crate::context::ContextHandle;
use crate::promise::Promise;
use std::sync::Arc;

/// What a success or failure reaction resolves its child promise with.
///
/// Returning [`Resolution::Chain`] defers the child's settlement to another
/// promise (monadic flattening); the other two variants settle it
/// immediately through the normal resolution path.
#[derive(Debug)]
pub enum Resolution<V, E> {
    /// Settle the child with a plain value.
    Value(V),
    /// Settle the child with an error (a failure reaction re-raising or
    /// translating, or a success reaction turning the chain to failure).
    Error(E),
    /// Link the child's settlement to another promise's eventual outcome.
    Chain(Promise<V, E>),
}

/// A single-shot success reaction.
pub(crate) type SuccessFn<V, E> = Box<dyn FnOnce(V) -> Resolution<V, E> + Send + 'static>;

/// A single-shot failure reaction.
pub(crate) type FailureFn<V, E> = Box<dyn FnOnce(E) -> Resolution<V, E> + Send + 'static>;

/// A progress reaction; may fire many times, shared with the dispatcher.
pub(crate) type ProgressFn = Arc<dyn Fn(f64) + Send + Sync + 'static>;

/// A set of reactions to register in one call.
///
/// Built fluently; every slot is optional. Registering a set with neither a
/// success nor a failure reaction returns the same promise instead of a
/// child, which is how progress-only observers and fan-out work.
///
/// # Example
///
/// ```ignore
/// let child = promise.register(
///     ReactionSet::new()
///         .on_success(|v: u32| Resolution::Value(v * 2))
///         .on_progress(|p| println!("{p:.0}%"))
///         .on_context(ctx),
/// )?;
/// ```
pub struct ReactionSet<V, E> {
    pub(crate) success: Option<SuccessFn<V, E>>,
    pub(crate) failure: Option<FailureFn<V, E>>,
    pub(crate) progress: Vec<ProgressFn>,
    pub(crate) context: Option<ContextHandle>,
}

impl<V, E> ReactionSet<V, E> {
    /// Creates an empty reaction set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            success: None,
            failure: None,
            progress: Vec::new(),
            context: None,
        }
    }

    /// Sets the success reaction.
    #[must_use]
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce(V) -> Resolution<V, E> + Send + 'static,
    {
        self.success = Some(Box::new(f));
        self
    }

    /// Sets the failure reaction.
    #[must_use]
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(E) -> Resolution<V, E> + Send + 'static,
    {
        self.failure = Some(Box::new(f));
        self
    }

    /// Appends a progress reaction. May be called repeatedly; reactions
    /// fire in the order they were appended.
    #[must_use]
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress.push(Arc::new(f));
        self
    }

    /// Binds every reaction in this set to the given execution context.
    ///
    /// Without this, the process-wide default context is used.
    #[must_use]
    pub fn on_context(mut self, ctx: ContextHandle) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Returns `true` if the set carries a success or failure reaction
    /// (i.e. registering it will create a child promise).
    #[must_use]
    pub fn settles(&self) -> bool {
        self.success.is_some() || self.failure.is_some()
    }
}

impl<V, E> Default for ReactionSet<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> std::fmt::Debug for ReactionSet<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionSet")
            .field("success", &self.success.is_some())
            .field("failure", &self.failure.is_some())
            .field("progress", &self.progress.len())
            .field("context", &self.context.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_does_not_settle() {
        let set = ReactionSet::<u32, String>::new();
        assert!(!set.settles());
    }

    #[test]
    fn success_slot_settles() {
        let set = ReactionSet::<u32, String>::new().on_success(Resolution::Value);
        assert!(set.settles());
    }

    #[test]
    fn progress_only_does_not_settle() {
        let set = ReactionSet::<u32, String>::new().on_progress(|_| {});
        assert!(!set.settles());
        assert_eq!(set.progress.len(), 1);
    }
}
