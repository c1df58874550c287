//! The settlement engine: promises, reactions, and chaining.
//!
//! A [`Promise`] decouples an asynchronous producer from its consumers. The
//! producer settles it exactly once with a value or an error, optionally
//! reporting progress along the way; consumers attach reactions that are
//! always delivered asynchronously on the execution context chosen at
//! registration. Registering a success or failure reaction yields a child
//! promise whose settlement is driven by what the reaction returns
//! (a [`Resolution`]), forming chains with monadic flattening and error
//! tunneling.

mod chain;
mod core;
mod reaction;

pub use self::core::Promise;
pub use self::reaction::{ReactionSet, Resolution};
