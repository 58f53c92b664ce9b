//! Prelude module for common watchdog types.

pub use crate::cancel::{CancelToken, HookRegistration, ReleaseHook};
pub use crate::error::{WatchdogError, WatchdogResult};
pub use crate::guard::{ExpiryAction, WatchdogGuard};
pub use crate::{WATCHDOG_EXIT_CODE, WATCHDOG_TIMEOUT};

#[cfg(unix)]
pub use crate::signals::TerminationListener;
