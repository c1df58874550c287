//! Error types for the settlement engine.
//!
//! The engine distinguishes two error classes:
//!
//! - **Contract violations** ([`ContractViolation`]): programming mistakes in
//!   producer or consumer code — resolving a promise twice, registering a
//!   second success reaction, writing progress after settlement. These are
//!   surfaced immediately at the call site as `Err` values and are not
//!   recoverable in any meaningful sense; callers should treat them as bugs.
//! - **Domain errors** (the `E` parameter of a promise): opaque,
//!   caller-defined values carried through the failure path of a chain. The
//!   engine never inspects them.

use thiserror::Error;

/// A violation of the settlement engine's usage contract.
///
/// Every variant indicates a bug in the calling code rather than a runtime
/// failure. The operations that can detect a violation return
/// `Result<_, ContractViolation>` so the mistake is reported at the call
/// site instead of being swallowed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContractViolation {
    /// The promise was already settled with a value or an error.
    #[error("promise is already resolved")]
    AlreadyResolved,

    /// A success reaction has already been registered on this promise.
    #[error("success reaction is already registered")]
    SuccessAlreadyRegistered,

    /// A failure reaction has already been registered on this promise.
    #[error("failure reaction is already registered")]
    FailureAlreadyRegistered,

    /// A progress update was attempted after the promise settled.
    #[error("progress update on a resolved promise")]
    ProgressAfterResolution,

    /// The process-wide default execution context was already installed.
    #[error("default execution context is already installed")]
    DefaultContextInstalled,
}
