//! Integration tests for scoped elevation.

use dht11_scheduler::{
    ElevationConfig, PosixScheduler, RecordingScheduler, RtElevation, SchedEvent,
};
use proptest::prelude::*;

#[test]
fn test_guard_restores_on_drop() {
    let scheduler = RecordingScheduler::new();
    {
        let guard = RtElevation::acquire(&scheduler, &ElevationConfig::default());
        assert!(guard.is_elevated());
        assert!(scheduler.is_elevated());
    }
    assert!(!scheduler.is_elevated());
    assert_eq!(
        scheduler.events(),
        vec![SchedEvent::Elevated { priority: 99 }, SchedEvent::Restored]
    );
}

#[test]
fn test_guard_restores_on_early_return() {
    fn attempt() -> Result<u8, &'static str> {
        Err("attempt failed")
    }

    fn fallible(scheduler: &RecordingScheduler) -> Result<u8, &'static str> {
        let _guard = RtElevation::acquire(scheduler, &ElevationConfig::default());
        let frame = attempt()?;
        Ok(frame)
    }

    let scheduler = RecordingScheduler::new();
    assert!(fallible(&scheduler).is_err());
    assert!(!scheduler.is_elevated());
}

#[test]
fn test_guard_restores_on_panic() {
    let scheduler = RecordingScheduler::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = RtElevation::acquire(&scheduler, &ElevationConfig::default());
        panic!("decoder blew up");
    }));
    assert!(result.is_err());
    assert!(!scheduler.is_elevated());
    assert_eq!(scheduler.events().last(), Some(&SchedEvent::Restored));
}

#[test]
fn test_refused_elevation_is_not_fatal() {
    let scheduler = RecordingScheduler::refusing();
    let guard = RtElevation::acquire(&scheduler, &ElevationConfig::default());
    assert!(!guard.is_elevated());
    drop(guard);
    // Nothing was granted, so nothing is restored.
    assert_eq!(scheduler.events(), vec![SchedEvent::Refused]);
}

#[test]
fn test_disabled_config_never_touches_scheduler() {
    let scheduler = RecordingScheduler::new();
    let guard = RtElevation::acquire(&scheduler, &ElevationConfig::disabled());
    assert!(!guard.is_elevated());
    drop(guard);
    assert!(scheduler.events().is_empty());
}

#[test]
fn test_explicit_release() {
    let scheduler = RecordingScheduler::new();
    let guard = RtElevation::acquire(&scheduler, &ElevationConfig::new().with_priority(42));
    guard.release();
    assert_eq!(
        scheduler.events(),
        vec![SchedEvent::Elevated { priority: 42 }, SchedEvent::Restored]
    );
}

#[test]
fn test_platform_scheduler_never_panics() {
    // Unprivileged CI runners refuse SCHED_FIFO; either outcome is acceptable.
    let scheduler = PosixScheduler::new();
    let guard = RtElevation::acquire(&scheduler, &ElevationConfig::default());
    drop(guard);
}

proptest! {
    #[test]
    fn prop_invalid_priority_never_elevates(priority in prop_oneof![i32::MIN..1, 100..i32::MAX]) {
        let scheduler = RecordingScheduler::new();
        let guard = RtElevation::acquire(&scheduler, &ElevationConfig::new().with_priority(priority));
        prop_assert!(!guard.is_elevated());
        drop(guard);
        prop_assert!(scheduler.events().is_empty());
    }

    #[test]
    fn prop_every_elevation_is_restored(priority in 1i32..=99, rounds in 1usize..8) {
        let scheduler = RecordingScheduler::new();
        for _ in 0..rounds {
            let _guard = RtElevation::acquire(&scheduler, &ElevationConfig::new().with_priority(priority));
        }
        let events = scheduler.events();
        let elevated = events.iter().filter(|e| matches!(e, SchedEvent::Elevated { .. })).count();
        let restored = events.iter().filter(|e| matches!(e, SchedEvent::Restored)).count();
        prop_assert_eq!(elevated, rounds);
        prop_assert_eq!(restored, rounds);
        prop_assert!(!scheduler.is_elevated());
    }
}
