//! # dht11-watchdog
//!
//! Fail-fast safety net for GPIO bit-banging.
//!
//! A wedged kernel GPIO driver must never hang a long-lived caller such as a
//! periodic recording service. This crate provides the pieces that converge
//! on one cleanup path:
//!
//! - [`cancel`] - [`CancelToken`], an explicit acquisition context that holds
//!   the release hooks of every GPIO line currently claimed
//! - [`guard`] - [`WatchdogGuard`], a scoped deadline that cancels the token
//!   and terminates the process when an acquisition overruns
//! - [`signals`] - [`TerminationListener`], which routes SIGINT/SIGTERM into
//!   the same cancellation path
//! - [`error`] - watchdog error types
//!
//! ## Cleanup guarantees
//!
//! - `CancelToken::cancel()` is idempotent and allocation-free
//! - every registered hook runs at most once
//! - signal delivery is handled on an ordinary thread via `sigwait`, never
//!   inside an async signal handler
//!
//! ## Example
//!
//! ```rust
//! use dht11_watchdog::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//!
//! let token = CancelToken::new();
//! let released = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&released);
//! let _registration = token
//!     .register(Arc::new(move || flag.store(true, Ordering::SeqCst)))
//!     .expect("slot available");
//!
//! let guard = WatchdogGuard::arm(
//!     Duration::from_secs(30),
//!     token.clone(),
//!     ExpiryAction::Terminate { exit_code: WATCHDOG_EXIT_CODE },
//! )
//! .expect("watchdog thread");
//!
//! // ... acquisition ...
//!
//! assert!(guard.disarm());
//! assert!(!released.load(Ordering::SeqCst));
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cancel;
pub mod error;
pub mod guard;

#[cfg(unix)]
pub mod signals;

pub mod prelude;

pub use cancel::{CancelToken, HookRegistration, MAX_RELEASE_HOOKS, ReleaseHook};
pub use error::{WatchdogError, WatchdogResult};
pub use guard::{ExpiryAction, WatchdogGuard};

#[cfg(unix)]
pub use signals::TerminationListener;

use std::time::Duration;

/// Ceiling for one complete acquisition before the watchdog fires.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Process exit status used by the watchdog and the signal path.
pub const WATCHDOG_EXIT_CODE: i32 = 1;
