//! Shared holder for a hardware line that another thread may release.

#![cfg_attr(
    not(all(target_os = "linux", any(feature = "cdev", feature = "rppal"))),
    allow(dead_code, reason = "only the hardware backends hold lines outside tests")
)]

use super::LineAddress;
use crate::error::{AcqResult, AcquisitionError};
use dht11_watchdog::ReleaseHook;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on how long a release hook waits for an in-progress operation.
pub(crate) const HOOK_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

struct SlotInner<T> {
    value: Mutex<Option<T>>,
    released: AtomicBool,
}

/// Line resource guarded for per-operation access and cross-thread release.
///
/// Releasing marks the slot first and then drops the resource. If an
/// operation holds the lock past [`HOOK_LOCK_TIMEOUT`], the owner drops the
/// resource on its next access, which then fails.
pub(crate) struct ReleasableSlot<T> {
    inner: Arc<SlotInner<T>>,
    address: LineAddress,
}

impl<T: Send + 'static> ReleasableSlot<T> {
    pub(crate) fn new(value: T, address: LineAddress) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                value: Mutex::new(Some(value)),
                released: AtomicBool::new(false),
            }),
            address,
        }
    }

    pub(crate) fn address(&self) -> &LineAddress {
        &self.address
    }

    pub(crate) fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Run `op` on the held resource.
    ///
    /// Fails with [`AcquisitionError::HardwareError`] once released.
    pub(crate) fn with<R>(&self, op: impl FnOnce(&mut T) -> R) -> AcqResult<R> {
        let mut slot = self.inner.value.lock();
        if self.is_released() {
            if slot.take().is_some() {
                debug!(line = %self.address, "Dropped GPIO line after deferred release");
            }
            return Err(AcquisitionError::hardware(format!(
                "{} was released",
                self.address
            )));
        }
        slot.as_mut()
            .map(op)
            .ok_or_else(|| AcquisitionError::hardware(format!("{} was released", self.address)))
    }

    /// Release from the owning thread. Returns whether the resource was held.
    pub(crate) fn release(&self) -> bool {
        self.inner.released.store(true, Ordering::Release);
        self.inner.value.lock().take().is_some()
    }

    /// Release callback for the cancellation token.
    pub(crate) fn release_hook(&self) -> ReleaseHook {
        let inner = Arc::clone(&self.inner);
        let address = self.address.clone();
        Arc::new(move || {
            inner.released.store(true, Ordering::Release);
            match inner.value.try_lock_for(HOOK_LOCK_TIMEOUT) {
                Some(mut slot) => {
                    if slot.take().is_some() {
                        debug!(line = %address, "GPIO line released by cancellation");
                    }
                }
                None => warn!(
                    line = %address,
                    "GPIO line busy, release deferred to the owning thread"
                ),
            }
        })
    }
}

impl<T> fmt::Debug for ReleasableSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleasableSlot")
            .field("address", &self.address)
            .field("released", &self.inner.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{GpioChip, GpioLine, Level, LineHandle};
    use dht11_watchdog::CancelToken;
    use std::sync::mpsc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Resource that records when it is dropped.
    struct Tracked(Arc<AtomicBool>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Line whose reads can be held open from the test.
    struct StallingLine {
        slot: ReleasableSlot<Tracked>,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        resume: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GpioLine for StallingLine {
        fn request_output(&mut self, _initial: Level) -> AcqResult<()> {
            self.slot.with(|_| ())
        }

        fn request_input(&mut self) -> AcqResult<()> {
            self.slot.with(|_| ())
        }

        fn set_level(&mut self, _level: Level) -> AcqResult<()> {
            self.slot.with(|_| ())
        }

        fn get_level(&mut self) -> AcqResult<Level> {
            let entered = self.entered.lock().take();
            let resume = self.resume.lock().take();
            self.slot.with(|_| {
                if let (Some(entered), Some(resume)) = (entered, resume) {
                    if entered.send(()).is_ok() {
                        drop(resume.recv_timeout(Duration::from_secs(5)));
                    }
                }
                Level::High
            })
        }

        fn release(&mut self) {
            self.slot.release();
        }

        fn release_hook(&self) -> ReleaseHook {
            self.slot.release_hook()
        }
    }

    struct StallingChip {
        dropped: Arc<AtomicBool>,
        entered: mpsc::Sender<()>,
        resume: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GpioChip for StallingChip {
        type Line = StallingLine;

        fn open(&self, address: &LineAddress) -> AcqResult<StallingLine> {
            Ok(StallingLine {
                slot: ReleasableSlot::new(Tracked(Arc::clone(&self.dropped)), address.clone()),
                entered: Mutex::new(Some(self.entered.clone())),
                resume: Mutex::new(self.resume.lock().take()),
            })
        }
    }

    fn address() -> LineAddress {
        LineAddress::new("/dev/gpiochip0", 4)
    }

    #[test]
    fn test_hook_releases_idle_line() {
        let dropped = Arc::new(AtomicBool::new(false));
        let slot = ReleasableSlot::new(Tracked(Arc::clone(&dropped)), address());
        let hook = slot.release_hook();
        hook();
        assert!(slot.is_released());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(matches!(slot.with(|_| ()), Err(AcquisitionError::HardwareError(_))));
    }

    #[test]
    fn test_release_is_idempotent() {
        let dropped = Arc::new(AtomicBool::new(false));
        let slot = ReleasableSlot::new(Tracked(Arc::clone(&dropped)), address());
        assert!(slot.release());
        assert!(!slot.release());
        slot.release_hook()();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_cancel_during_stalled_read_marks_line_released() -> TestResult {
        let dropped = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let chip = StallingChip {
            dropped: Arc::clone(&dropped),
            entered: entered_tx,
            resume: Mutex::new(Some(resume_rx)),
        };
        let cancel = CancelToken::new();
        let mut handle = LineHandle::claim(&chip, &address(), &cancel)?;

        std::thread::scope(|scope| -> TestResult {
            let reader = scope.spawn(|| handle.get_level());
            entered_rx.recv_timeout(Duration::from_secs(5))?;

            // the reader holds the line lock for the whole cancellation
            assert!(cancel.cancel());
            assert!(!dropped.load(Ordering::SeqCst));
            assert!(logs_contain("release deferred to the owning thread"));

            resume_tx.send(())?;
            let level = reader.join().map_err(|_panic| "reader panicked")?;
            assert_eq!(level, Ok(Level::High));
            Ok(())
        })?;

        assert!(handle.line.slot.is_released());
        assert!(matches!(handle.get_level(), Err(AcquisitionError::HardwareError(_))));
        assert!(dropped.load(Ordering::SeqCst));
        Ok(())
    }
}
