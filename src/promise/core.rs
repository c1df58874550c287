//! Settlement core: the exactly-once state machine behind [`Promise`].
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      SETTLEMENT & DISPATCH                         │
//! │                                                                    │
//! │   Producer                                Consumer                 │
//! │     │                                        │                     │
//! │     │── Promise::new() ──► parent            │                     │
//! │     │                        │◄── register(success, ctx) ──│       │
//! │     │                        │─── child ────────────────►│         │
//! │     │                        │                                     │
//! │     │── resolve_value(v) ───►│                                     │
//! │     │                        │── ctx.submit(success(v)) ──► later  │
//! │     │                        │        └── settles child            │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Exactly-once settlement**: among concurrent resolve calls, one wins;
//!   the rest see [`ContractViolation::AlreadyResolved`].
//! - **Async-always delivery**: a reaction never runs on the stack that
//!   settled the promise or registered the reaction, even when the promise
//!   was already resolved at registration time. Delivery is always a
//!   submission to the reaction's bound context.
//! - **No lost reactions**: registration and settlement serialize on one
//!   interior lock; a reaction attached concurrently with resolution is
//!   either stored before the state flips or dispatched against the settled
//!   state.
//! - **Tunneling**: an error skips links that registered no failure
//!   reaction, and a value skips failure-only links, each propagating
//!   unchanged into the link's child.

use crate::context::{default_context, ContextHandle};
use crate::error::ContractViolation;
use crate::promise::chain;
use crate::promise::reaction::{FailureFn, ProgressFn, ReactionSet, Resolution, SuccessFn};
use crate::tracing_compat::trace;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Settlement state. Flips away from `Unresolved` at most once.
enum State<V, E> {
    Unresolved,
    Value(V),
    Error(E),
}

impl<V, E> State<V, E> {
    const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    const fn tag(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Value(_) => "value",
            Self::Error(_) => "error",
        }
    }
}

/// One registration that supplied a success and/or failure reaction,
/// together with the child promise it produced.
struct Link<V, E> {
    success: Option<(SuccessFn<V, E>, ContextHandle)>,
    failure: Option<(FailureFn<V, E>, ContextHandle)>,
    child: Promise<V, E>,
}

/// The shared mutable record of one promise. All read-modify-write
/// sequences on it happen under one lock.
struct Inner<V, E> {
    state: State<V, E>,
    /// In `[0.0, 1.0]`; forced to 1.0 when the state becomes `Value`.
    progress: f64,
    /// Advisory discard flag, false → true only.
    discarded: bool,
    /// True once a success reaction has ever been registered.
    success_assigned: bool,
    /// True once a failure reaction has ever been registered.
    failure_assigned: bool,
    /// Pending links, drained at settlement.
    links: Vec<Link<V, E>>,
    /// Progress reactions in registration order.
    progress_reactions: Vec<(ProgressFn, ContextHandle)>,
}

/// A deferred result: settled exactly once by its producer, observed
/// through registered reactions by any number of consumers.
///
/// `Promise` is a cheap cloneable handle; clones observe the same
/// settlement. All operations may be called from any thread.
///
/// See the [crate docs](crate) for the delivery and chaining rules.
pub struct Promise<V, E> {
    inner: Arc<Mutex<Inner<V, E>>>,
}

impl<V, E> Clone for Promise<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> fmt::Debug for Promise<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("promise lock poisoned");
        f.debug_struct("Promise")
            .field("state", &inner.state.tag())
            .field("progress", &inner.progress)
            .field("discarded", &inner.discarded)
            .field("links", &inner.links.len())
            .field("progress_reactions", &inner.progress_reactions.len())
            .finish()
    }
}

impl<V, E> Promise<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates an unresolved promise with progress `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(State::Unresolved, 0.0)
    }

    /// Creates a promise already settled with `value` (progress `1.0`).
    #[must_use]
    pub fn with_value(value: V) -> Self {
        Self::from_state(State::Value(value), 1.0)
    }

    /// Creates a promise already settled with `error`.
    #[must_use]
    pub fn with_error(error: E) -> Self {
        Self::from_state(State::Error(error), 0.0)
    }

    fn from_state(state: State<V, E>, progress: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                progress,
                discarded: false,
                success_assigned: false,
                failure_assigned: false,
                links: Vec::new(),
                progress_reactions: Vec::new(),
            })),
        }
    }

    /// Settles the promise with a value.
    ///
    /// Forces progress to `1.0` (without notifying progress reactions) and
    /// dispatches the success reaction of every pending link on its bound
    /// context; failure-only links receive the value unchanged.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::AlreadyResolved`] if the promise was already
    /// settled; the stored outcome is left untouched.
    pub fn resolve_value(&self, value: V) -> Result<(), ContractViolation> {
        let links = {
            let mut inner = self.lock();
            if inner.state.is_resolved() {
                return Err(ContractViolation::AlreadyResolved);
            }
            inner.state = State::Value(value.clone());
            inner.progress = 1.0;
            std::mem::take(&mut inner.links)
        };
        trace!("promise settled with value");

        for link in links {
            Self::deliver_value(link, value.clone());
        }
        Ok(())
    }

    /// Settles the promise with an error.
    ///
    /// Passing `None` is the no-error sentinel: a silent no-op that neither
    /// settles the promise nor counts against the exactly-once contract.
    /// Otherwise dispatches the failure reaction of every pending link;
    /// success-only links tunnel the error unchanged into their child.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::AlreadyResolved`] if the promise was already
    /// settled with a value or an error.
    pub fn resolve_error(&self, error: Option<E>) -> Result<(), ContractViolation> {
        let Some(error) = error else {
            return Ok(());
        };

        let links = {
            let mut inner = self.lock();
            if inner.state.is_resolved() {
                return Err(ContractViolation::AlreadyResolved);
            }
            inner.state = State::Error(error.clone());
            std::mem::take(&mut inner.links)
        };
        trace!("promise settled with error");

        for link in links {
            Self::deliver_error(link, error.clone());
        }
        Ok(())
    }

    /// Stores a progress update, clamped to `[0.0, 1.0]`, and dispatches
    /// every progress reaction in registration order on its own context.
    /// Returns the clamped value actually stored.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::ProgressAfterResolution`] if the promise is
    /// already settled.
    pub fn update_progress(&self, progress: f64) -> Result<f64, ContractViolation> {
        let clamped = progress.clamp(0.0, 1.0);

        let inner = &mut *self.lock();
        if inner.state.is_resolved() {
            return Err(ContractViolation::ProgressAfterResolution);
        }
        inner.progress = clamped;

        // Submitting under the lock linearizes racing updates: every
        // context sees the notifications in the same global order the
        // updates were applied.
        for (react, ctx) in &inner.progress_reactions {
            let react = Arc::clone(react);
            ctx.submit(Box::new(move || react(clamped)));
        }
        Ok(clamped)
    }

    /// Registers a set of reactions in one call.
    ///
    /// Returns a newly created child promise if the set carried a success
    /// or failure reaction; its settlement will be driven by whichever
    /// reaction the outcome selects (or by tunneling). Otherwise returns a
    /// clone of `self`, so any number of progress-only or empty
    /// registrations can branch off one producer result.
    ///
    /// If the promise is already settled, delivery is still scheduled on
    /// the bound context — never performed on the calling stack.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::SuccessAlreadyRegistered`] /
    /// [`ContractViolation::FailureAlreadyRegistered`] if the respective
    /// single-slot reaction was registered before; the earlier
    /// registration and its child are unaffected.
    pub fn register(&self, set: ReactionSet<V, E>) -> Result<Self, ContractViolation> {
        self.register_with(set, None)
    }

    /// Registration core. `forward_child` substitutes an existing promise
    /// for the freshly created child; the chain composer uses this to
    /// flatten a reaction-returned promise onto the link's child.
    pub(super) fn register_with(
        &self,
        set: ReactionSet<V, E>,
        forward_child: Option<Self>,
    ) -> Result<Self, ContractViolation> {
        let ReactionSet {
            success,
            failure,
            progress,
            context,
        } = set;
        let ctx = context.unwrap_or_else(default_context);

        let mut inner = self.lock();
        if success.is_some() && inner.success_assigned {
            return Err(ContractViolation::SuccessAlreadyRegistered);
        }
        if failure.is_some() && inner.failure_assigned {
            return Err(ContractViolation::FailureAlreadyRegistered);
        }

        // Progress reactions attach only while unresolved; attached to a
        // settled promise they could never fire, so they are dropped.
        if !inner.state.is_resolved() {
            for react in progress {
                inner.progress_reactions.push((react, Arc::clone(&ctx)));
            }
        }

        if success.is_none() && failure.is_none() {
            drop(inner);
            return Ok(self.clone());
        }

        inner.success_assigned |= success.is_some();
        inner.failure_assigned |= failure.is_some();

        let child = forward_child.unwrap_or_else(Self::new);
        let link = Link {
            success: success.map(|f| (f, Arc::clone(&ctx))),
            failure: failure.map(|f| (f, Arc::clone(&ctx))),
            child: child.clone(),
        };

        let settled = match &inner.state {
            State::Unresolved => None,
            State::Value(v) => Some(Ok(v.clone())),
            State::Error(e) => Some(Err(e.clone())),
        };
        match settled {
            None => {
                inner.links.push(link);
                drop(inner);
            }
            // Already settled: deliver now, still via context submission
            Some(outcome) => {
                drop(inner);
                match outcome {
                    Ok(value) => Self::deliver_value(link, value),
                    Err(error) => Self::deliver_error(link, error),
                }
            }
        }
        Ok(child)
    }

    /// Hands a settled value to one link.
    fn deliver_value(link: Link<V, E>, value: V) {
        match link.success {
            Some((react, ctx)) => {
                let child = link.child;
                ctx.submit(Box::new(move || {
                    let resolution = react(value);
                    chain::settle_child(&child, resolution);
                }));
            }
            // Failure-only link: the value tunnels through unchanged. The
            // child's own dispatcher keeps its delivery asynchronous.
            None => link
                .child
                .resolve_value(value)
                .expect("derived promise was resolved outside its chain"),
        }
    }

    /// Hands a settled error to one link.
    fn deliver_error(link: Link<V, E>, error: E) {
        match link.failure {
            Some((react, ctx)) => {
                let child = link.child;
                ctx.submit(Box::new(move || {
                    let resolution = react(error);
                    chain::settle_child(&child, resolution);
                }));
            }
            // Success-only link: the error tunnels through unchanged,
            // short-circuiting success reactions further down the chain.
            None => link
                .child
                .resolve_error(Some(error))
                .expect("derived promise was resolved outside its chain"),
        }
    }

    // === Sugar over `register` ===

    /// Registers a success reaction on the default context.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::SuccessAlreadyRegistered`] on a second
    /// success registration.
    pub fn then<F>(&self, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(V) -> Resolution<V, E> + Send + 'static,
    {
        self.register(ReactionSet::new().on_success(f))
    }

    /// Registers a success reaction bound to `ctx`.
    ///
    /// # Errors
    ///
    /// See [`Promise::then`].
    pub fn then_on<F>(&self, ctx: ContextHandle, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(V) -> Resolution<V, E> + Send + 'static,
    {
        self.register(ReactionSet::new().on_success(f).on_context(ctx))
    }

    /// Registers a failure reaction on the default context.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::FailureAlreadyRegistered`] on a second
    /// failure registration.
    pub fn on_error<F>(&self, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(E) -> Resolution<V, E> + Send + 'static,
    {
        self.register(ReactionSet::new().on_failure(f))
    }

    /// Registers a failure reaction bound to `ctx`.
    ///
    /// # Errors
    ///
    /// See [`Promise::on_error`].
    pub fn on_error_on<F>(&self, ctx: ContextHandle, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(E) -> Resolution<V, E> + Send + 'static,
    {
        self.register(ReactionSet::new().on_failure(f).on_context(ctx))
    }

    /// Appends a progress reaction on the default context. Returns the
    /// same promise, not a child.
    pub fn on_progress<F>(&self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.on_progress_on(default_context(), f)
    }

    /// Appends a progress reaction bound to `ctx`. Returns the same
    /// promise, not a child.
    pub fn on_progress_on<F>(&self, ctx: ContextHandle, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.register(ReactionSet::new().on_progress(f).on_context(ctx))
            .expect("progress-only registration cannot violate the contract")
    }

    /// Registers a single completion reaction receiving `Ok(value)` or
    /// `Err(error)`, on the default context. Occupies both the success and
    /// the failure slot.
    ///
    /// # Errors
    ///
    /// A violation if either single-slot reaction was registered before.
    pub fn on_completion<F>(&self, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(Result<V, E>) -> Resolution<V, E> + Send + 'static,
    {
        self.on_completion_on(default_context(), f)
    }

    /// Registers a completion reaction bound to `ctx`.
    ///
    /// # Errors
    ///
    /// See [`Promise::on_completion`].
    pub fn on_completion_on<F>(&self, ctx: ContextHandle, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(Result<V, E>) -> Resolution<V, E> + Send + 'static,
    {
        // One closure behind both slots; settlement selects exactly one.
        let shared = Arc::new(Mutex::new(Some(f)));
        let for_failure = Arc::clone(&shared);
        self.register(
            ReactionSet::new()
                .on_success(move |value| {
                    let f = shared
                        .lock()
                        .expect("completion reaction lock poisoned")
                        .take()
                        .expect("completion reaction invoked twice");
                    f(Ok(value))
                })
                .on_failure(move |error| {
                    let f = for_failure
                        .lock()
                        .expect("completion reaction lock poisoned")
                        .take()
                        .expect("completion reaction invoked twice");
                    f(Err(error))
                })
                .on_context(ctx),
        )
    }

    /// Derives a promise for a projection of the value: `f` maps the
    /// settled value, errors tunnel through unchanged.
    ///
    /// # Errors
    ///
    /// See [`Promise::then`].
    pub fn project<F>(&self, f: F) -> Result<Self, ContractViolation>
    where
        F: FnOnce(V) -> V + Send + 'static,
    {
        self.then(move |value| Resolution::Value(f(value)))
    }

    // === Observers ===

    /// Returns `true` once the promise is settled with a value or error.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lock().state.is_resolved()
    }

    /// Returns `true` once a success or failure reaction has been
    /// registered on this promise.
    #[must_use]
    pub fn is_assigned_callback(&self) -> bool {
        let inner = self.lock();
        inner.success_assigned || inner.failure_assigned
    }

    /// Returns the stored progress, in `[0.0, 1.0]`. Always `1.0` after
    /// settlement with a value.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    /// Marks the promise as discarded.
    ///
    /// Purely advisory: settlement and delivery proceed regardless. A
    /// producer may poll [`Promise::is_discarded`] at checkpoints and
    /// choose to settle early.
    pub fn discard(&self) {
        self.lock().discarded = true;
    }

    /// Returns `true` if this promise, or any promise derived from it down
    /// the chain, has been discarded.
    ///
    /// Polling descendants is what lets a producer holding the root of a
    /// chain observe a consumer discarding a derived promise. The flag
    /// itself is never propagated.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        let (own, children) = {
            let inner = self.lock();
            let children: Vec<Self> = inner.links.iter().map(|l| l.child.clone()).collect();
            (inner.discarded, children)
        };
        own || children.iter().any(Self::is_discarded)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V, E>> {
        self.inner.lock().expect("promise lock poisoned")
    }
}

impl<V, E> Default for Promise<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
