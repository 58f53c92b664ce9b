//! Explicit cancellation context for one acquisition.
//!
//! Whoever claims a GPIO line registers a [`ReleaseHook`] here for as long as
//! the claim lasts. The watchdog and the termination-signal listener hold
//! clones of the same [`CancelToken`] and call [`CancelToken::cancel`], which
//! runs each outstanding hook exactly once.

use crate::error::{WatchdogError, WatchdogResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Number of hooks one token can hold at a time.
pub const MAX_RELEASE_HOOKS: usize = 8;

/// How long `cancel` waits for a concurrent registration to finish.
const CANCEL_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Idempotent, thread-safe release callback for one held resource.
pub type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

struct HookSlot {
    id: u64,
    hook: ReleaseHook,
}

struct CancelState {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    slots: Mutex<[Option<HookSlot>; MAX_RELEASE_HOOKS]>,
}

impl Default for CancelState {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Default::default()),
        }
    }
}

/// Shared cancellation context.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Register a hook that releases a held resource on cancellation.
    ///
    /// The hook stays registered until the returned [`HookRegistration`] is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::Cancelled`] if the token is already cancelled
    /// and [`WatchdogError::HookSlotsExhausted`] if every slot is taken.
    pub fn register(&self, hook: ReleaseHook) -> WatchdogResult<HookRegistration> {
        if self.is_cancelled() {
            return Err(WatchdogError::Cancelled);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.inner.slots.lock();
        let free = slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(WatchdogError::HookSlotsExhausted(MAX_RELEASE_HOOKS))?;
        *free = Some(HookSlot { id, hook });
        drop(slots);

        // Cancel may have raced with registration and missed this slot.
        if self.is_cancelled() {
            self.run_hooks();
        }

        Ok(HookRegistration {
            state: Arc::clone(&self.inner),
            id,
        })
    }

    /// Cancel the acquisition and release every registered resource.
    ///
    /// Safe to call any number of times from any thread; returns `true` only
    /// for the call that flipped the token. Does not allocate.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        self.run_hooks();
        first
    }

    /// Number of hooks currently registered.
    #[must_use]
    pub fn registered_hooks(&self) -> usize {
        self.inner.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    fn run_hooks(&self) {
        let Some(mut slots) = self.inner.slots.try_lock_for(CANCEL_LOCK_TIMEOUT) else {
            warn!("Release hooks busy, skipping cleanup");
            return;
        };
        for slot in slots.iter_mut() {
            if let Some(entry) = slot.take() {
                (entry.hook)();
            }
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Keeps a hook registered; dropping it deregisters without running the hook.
#[must_use = "the hook is deregistered as soon as the registration is dropped"]
pub struct HookRegistration {
    state: Arc<CancelState>,
    id: u64,
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        let mut slots = self.state.slots.lock();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|entry| entry.id == self.id) {
                *slot = None;
            }
        }
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("id", &self.id)
            .finish()
    }
}
