//! Vow: a thread-safe promise/deferred-result engine with queue-affine,
//! always-asynchronous reaction delivery.
//!
//! # Overview
//!
//! A producer returns a [`Promise`] instead of accepting a callback. It
//! later *settles* the promise exactly once — with a value or an error —
//! and may report progress in between. Consumers attach *reactions*;
//! attaching a success or failure reaction yields a child promise, so
//! reactions compose into chains where each link's settlement is driven by
//! what its reaction returns.
//!
//! # Core Guarantees
//!
//! - **Exactly-once settlement**: concurrent resolve calls race safely;
//!   one wins, the rest get a [`ContractViolation`]
//! - **Async-always delivery**: a reaction never runs on the caller's
//!   stack, even when registered after settlement — it is always submitted
//!   to its bound [`ExecutionContext`]
//! - **Queue affinity**: each reaction runs on the context chosen at
//!   registration; absent a choice, the injectable process-wide default
//! - **Monadic chaining**: a reaction returning a promise links the child
//!   to that promise's eventual outcome ([`Resolution::Chain`])
//! - **Tunneling**: errors skip links without failure reactions; values
//!   skip failure-only links
//! - **Advisory discard**: cooperative cancellation signaling that never
//!   blocks settlement or delivery
//!
//! # Example
//!
//! ```ignore
//! use vow::{Promise, Resolution};
//!
//! // Producer side
//! let promise: Promise<u32, String> = Promise::new();
//! let producer = promise.clone();
//! std::thread::spawn(move || {
//!     producer.update_progress(0.5).unwrap();
//!     producer.resolve_value(42).unwrap();
//! });
//!
//! // Consumer side: chained, delivered asynchronously
//! let done = promise
//!     .then(|v| Resolution::Value(v * 2))?
//!     .on_error(|e| Resolution::Error(e))?;
//! ```
//!
//! # A Known Footgun
//!
//! An error reaching the end of a chain with no failure reaction anywhere
//! along it is simply never observed — there is no implicit logging and no
//! crash. Attach a failure or completion reaction at the point where you
//! want errors to surface.
//!
//! # Module Structure
//!
//! - [`promise`]: the settlement core, reaction registry, and chain
//!   composer
//! - [`context`]: execution contexts and the process-wide default
//! - [`task`]: the cancellable-task adapter
//! - [`error`]: contract-violation types
//! - [`tracing_compat`]: feature-gated structured logging shim

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod context;
pub mod error;
pub mod promise;
pub mod task;
pub mod tracing_compat;

// Re-exports for convenient access to core types
pub use context::{
    default_context, set_default_context, ContextHandle, ExecutionContext, Job, ManualContext,
    SerialContext, SerialContextOptions,
};
pub use error::ContractViolation;
pub use promise::{Promise, ReactionSet, Resolution};
pub use task::{spawn_task, Task, TaskFinisher};
