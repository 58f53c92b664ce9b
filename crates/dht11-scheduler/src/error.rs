//! Error types for the scheduler crate.

use thiserror::Error;

/// Failures while changing the scheduling class of the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedError {
    /// The process lacks the privilege to select a real-time policy.
    #[error("Permission denied changing scheduling policy (CAP_SYS_NICE required)")]
    PermissionDenied,

    /// Real-time scheduling is not available on this platform.
    #[error("Real-time scheduling is not supported on this platform")]
    Unsupported,

    /// Requested priority is outside the policy's range.
    #[error("Invalid real-time priority {0}")]
    InvalidPriority(i32),

    /// Any other OS failure, carrying the raw errno.
    #[error("Scheduler call failed with OS error {0}")]
    Os(i32),
}

impl SchedError {
    /// Whether retrying at a later point could plausibly succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unsupported)
    }
}

/// Result alias for scheduler operations.
pub type SchedResult<T = ()> = Result<T, SchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(SchedError::PermissionDenied.to_string().contains("CAP_SYS_NICE"));
        assert!(SchedError::InvalidPriority(120).to_string().contains("120"));
        assert!(SchedError::Os(22).to_string().contains("22"));
    }

    #[test]
    fn test_permanence() {
        assert!(SchedError::PermissionDenied.is_permanent());
        assert!(SchedError::Unsupported.is_permanent());
        assert!(!SchedError::Os(4).is_permanent());
    }
}
