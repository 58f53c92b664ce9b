//! Termination signal routing.
//!
//! SIGINT and SIGTERM are blocked in the installing thread (and inherited by
//! every thread spawned afterwards) and collected synchronously by a
//! dedicated thread through `sigwait(3)`. Cleanup therefore runs in an
//! ordinary thread context rather than inside an async signal handler.

#![allow(unsafe_code, reason = "signal masks are only reachable through libc")]

use crate::WATCHDOG_EXIT_CODE;
use crate::cancel::CancelToken;
use crate::error::{WatchdogError, WatchdogResult};
use std::fmt;
use std::thread::JoinHandle;
use tracing::info;

/// Background listener that cancels the acquisition and exits on SIGINT/SIGTERM.
pub struct TerminationListener {
    _thread: JoinHandle<()>,
}

impl TerminationListener {
    /// Block termination signals and start the listener thread.
    ///
    /// Must be called before any other thread is spawned so that every
    /// thread inherits the blocked mask.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal mask cannot be changed or the thread
    /// cannot be started.
    pub fn install(token: CancelToken) -> WatchdogResult<Self> {
        let set = termination_set();

        // SAFETY: `set` is an initialised sigset_t; the old mask is not requested.
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(WatchdogError::SignalSetup(rc));
        }

        let thread = std::thread::Builder::new()
            .name("dht11-signals".into())
            .spawn(move || listen(&set, &token))
            .map_err(|_spawn| WatchdogError::SpawnFailed("signal"))?;

        Ok(Self { _thread: thread })
    }
}

impl fmt::Debug for TerminationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationListener").finish_non_exhaustive()
    }
}

fn termination_set() -> libc::sigset_t {
    // SAFETY: sigset_t is plain data; sigemptyset initialises it before use.
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    // SAFETY: `set` is a valid, writable sigset_t.
    unsafe { libc::sigemptyset(&mut set) };
    // SAFETY: `set` was initialised by sigemptyset and SIGINT is a valid signal.
    unsafe { libc::sigaddset(&mut set, libc::SIGINT) };
    // SAFETY: as above, for SIGTERM.
    unsafe { libc::sigaddset(&mut set, libc::SIGTERM) };
    set
}

fn listen(set: &libc::sigset_t, token: &CancelToken) {
    loop {
        let mut signal: libc::c_int = 0;
        // SAFETY: both pointers reference live stack values for the duration of the call.
        if unsafe { libc::sigwait(set, &mut signal) } != 0 {
            continue;
        }
        info!(signal, "Caught signal, exiting");
        token.cancel();
        exit_on_signal();
    }
}

#[allow(clippy::exit, reason = "termination signals end the process after cleanup")]
fn exit_on_signal() {
    std::process::exit(WATCHDOG_EXIT_CODE);
}
