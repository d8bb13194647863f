//! Configuration types for codesight
//!
//! Validated newtypes for the limits the bundle protocol depends on.

use std::time::Duration;

/// Ceiling for the estimated size of one create/extend or upload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct PayloadLimit(usize);

impl PayloadLimit {
    /// Minimum payload size (1KB)
    pub const MIN: usize = 1024;
    /// Maximum payload size (64MB)
    pub const MAX: usize = 64 * 1024 * 1024;
    /// Default payload size, the service's request ceiling
    pub const DEFAULT: usize = 4_000_000;

    /// Create a new payload limit with validation
    pub fn new(bytes: usize) -> Result<Self, String> {
        if bytes < Self::MIN {
            Err(format!("Payload limit {} is below minimum {}", bytes, Self::MIN))
        } else if bytes > Self::MAX {
            Err(format!("Payload limit {} exceeds maximum {}", bytes, Self::MAX))
        } else {
            Ok(Self(bytes))
        }
    }

    /// Create a limit without validation, for tests and tooling
    pub const fn unchecked(bytes: usize) -> Self {
        Self(bytes)
    }

    /// Get the limit in bytes
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for PayloadLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for PayloadLimit {
    type Error = String;

    fn try_from(bytes: usize) -> Result<Self, Self::Error> {
        Self::new(bytes)
    }
}

impl From<PayloadLimit> for usize {
    fn from(limit: PayloadLimit) -> Self {
        limit.0
    }
}

/// Bounded number of attempts for a retried step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct AttemptLimit(u32);

impl AttemptLimit {
    /// Maximum attempts
    pub const MAX: u32 = 100;
    /// Default upload attempts
    pub const DEFAULT: u32 = 5;

    /// Create a new attempt limit with validation
    pub fn new(attempts: u32) -> Result<Self, String> {
        if attempts == 0 {
            Err("Attempt limit must be at least 1".to_string())
        } else if attempts > Self::MAX {
            Err(format!("Attempt limit {} exceeds maximum {}", attempts, Self::MAX))
        } else {
            Ok(Self(attempts))
        }
    }

    /// Get the number of attempts
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for AttemptLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u32> for AttemptLimit {
    type Error = String;

    fn try_from(attempts: u32) -> Result<Self, Self::Error> {
        Self::new(attempts)
    }
}

impl From<AttemptLimit> for u32 {
    fn from(limit: AttemptLimit) -> Self {
        limit.0
    }
}

/// Time budget and interval for polling analysis status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PollSchedule {
    /// Overall time budget in milliseconds
    pub timeout_ms: u64,
    /// Delay between two polls in milliseconds
    pub interval_ms: u64,
}

impl PollSchedule {
    /// Create a new poll schedule with validation
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self, String> {
        let schedule = Self {
            timeout_ms: timeout.as_millis() as u64,
            interval_ms: interval.as_millis() as u64,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check the interval is positive and fits in the timeout
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("Poll interval must be greater than 0".to_string());
        }
        if self.interval_ms > self.timeout_ms {
            return Err(format!(
                "Poll interval {}ms exceeds poll timeout {}ms",
                self.interval_ms, self.timeout_ms
            ));
        }
        Ok(())
    }

    /// Overall time budget
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between polls
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Number of polls that fit into the time budget
    pub fn attempt_budget(&self) -> u64 {
        (self.timeout_ms / self.interval_ms.max(1)).max(1)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            timeout_ms: 100_000,
            interval_ms: 1_000,
        }
    }
}
