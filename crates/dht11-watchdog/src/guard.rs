//! Scoped acquisition deadline.

use crate::cancel::CancelToken;
use crate::error::{WatchdogError, WatchdogResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// What happens after the deadline fires and resources are released.
pub enum ExpiryAction {
    /// Terminate the process with the given exit status.
    Terminate {
        /// Exit status passed to `std::process::exit`.
        exit_code: i32,
    },
    /// Invoke a callback instead of terminating (embedding and tests).
    Notify(Box<dyn FnOnce(&WatchdogError) + Send>),
}

impl fmt::Debug for ExpiryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate { exit_code } => f
                .debug_struct("Terminate")
                .field("exit_code", exit_code)
                .finish(),
            Self::Notify(_) => f.write_str("Notify(..)"),
        }
    }
}

#[derive(Default)]
struct GuardShared {
    disarmed: Mutex<bool>,
    wake: Condvar,
    fired: AtomicBool,
}

/// Deadline armed for the duration of one acquisition.
///
/// A background thread sleeps until either the guard is disarmed or the
/// ceiling elapses. On expiry it logs, cancels the [`CancelToken`] (releasing
/// every registered GPIO line), flags the condition and runs the
/// [`ExpiryAction`]. Dropping the guard disarms it.
pub struct WatchdogGuard {
    ceiling: Duration,
    shared: Arc<GuardShared>,
    thread: Option<JoinHandle<()>>,
}

impl WatchdogGuard {
    /// Arm a deadline of `ceiling` from now.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::SpawnFailed`] if the timer thread cannot be
    /// started.
    pub fn arm(ceiling: Duration, token: CancelToken, action: ExpiryAction) -> WatchdogResult<Self> {
        let shared = Arc::new(GuardShared::default());
        let timer = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("dht11-watchdog".into())
            .spawn(move || run_timer(&timer, ceiling, &token, action))
            .map_err(|_spawn| WatchdogError::SpawnFailed("watchdog"))?;

        debug!(ceiling_ms = ceiling.as_millis(), "Watchdog armed");
        Ok(Self {
            ceiling,
            shared,
            thread: Some(thread),
        })
    }

    /// The configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Whether the deadline has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }

    /// Disarm the deadline.
    ///
    /// Returns `true` if the guard was disarmed before it fired.
    pub fn disarm(mut self) -> bool {
        self.stop();
        !self.has_fired()
    }

    fn stop(&mut self) {
        {
            let mut disarmed = self.shared.disarmed.lock();
            *disarmed = true;
            self.shared.wake.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Watchdog thread panicked");
            }
        }
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchdogGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogGuard")
            .field("ceiling", &self.ceiling)
            .field("fired", &self.has_fired())
            .finish_non_exhaustive()
    }
}

fn run_timer(shared: &GuardShared, ceiling: Duration, token: &CancelToken, action: ExpiryAction) {
    let deadline = Instant::now() + ceiling;
    {
        let mut disarmed = shared.disarmed.lock();
        while !*disarmed {
            if shared.wake.wait_until(&mut disarmed, deadline).timed_out() {
                break;
            }
        }
        if *disarmed {
            return;
        }
    }

    let err = WatchdogError::timeout(ceiling);
    error!(error = %err, "Watchdog timeout - GPIO operations hung");
    token.cancel();
    shared.fired.store(true, Ordering::Release);

    match action {
        ExpiryAction::Terminate { exit_code } => terminate(exit_code),
        ExpiryAction::Notify(callback) => callback(&err),
    }
}

#[allow(clippy::exit, reason = "the watchdog is the designated fail-fast exit path")]
fn terminate(exit_code: i32) {
    std::process::exit(exit_code);
}
