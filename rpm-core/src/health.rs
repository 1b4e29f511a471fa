//! Validity policy that gates consumption of published readings.

use core::fmt;

use crate::config::RpmConfig;
use crate::state::{Millis, RpmState};

/// Reason a slot's reading is not usable.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HealthFault {
    /// Slot has no backend.
    Disabled,
    /// Backend has not published anything yet.
    NoReading,
    /// Last publish is older than the staleness window.
    Stale { age_ms: u32 },
    /// Scaled rate fell below the configured minimum.
    BelowMinimum { rpm: f32 },
    /// Scaled rate exceeded the configured maximum.
    AboveMaximum { rpm: f32 },
    /// Signal quality is under the configured threshold.
    LowQuality { quality: f32 },
    /// Scaled rate is NaN or infinite.
    NonFinite,
}

impl fmt::Display for HealthFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthFault::Disabled => f.write_str("disabled"),
            HealthFault::NoReading => f.write_str("no reading"),
            HealthFault::Stale { age_ms } => write!(f, "stale ({age_ms} ms)"),
            HealthFault::BelowMinimum { rpm } => write!(f, "below minimum ({rpm:.1} rpm)"),
            HealthFault::AboveMaximum { rpm } => write!(f, "above maximum ({rpm:.1} rpm)"),
            HealthFault::LowQuality { quality } => write!(f, "low quality ({quality:.2})"),
            HealthFault::NonFinite => f.write_str("non-finite rate"),
        }
    }
}

/// Bounds applied to every slot when a consumer asks for a reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HealthPolicy {
    pub minimum: f32,
    pub maximum: f32,
    pub quality_min: f32,
    pub timeout_ms: u32,
}

impl HealthPolicy {
    /// Captures the global bounds from the current configuration.
    #[must_use]
    pub const fn from_config(config: &RpmConfig) -> Self {
        Self {
            minimum: config.minimum,
            maximum: config.maximum,
            quality_min: config.quality_min,
            timeout_ms: config.timeout_ms,
        }
    }

    /// Evaluates one slot, returning the scaled rate when every check passes.
    ///
    /// Checks run in a fixed order: reading present, freshness, finiteness,
    /// rate window, quality. The first failure wins.
    pub fn evaluate(&self, state: &RpmState, scaling: f32, now: Millis) -> Result<f32, HealthFault> {
        let age_ms = state.age_ms(now).ok_or(HealthFault::NoReading)?;
        if age_ms > self.timeout_ms {
            return Err(HealthFault::Stale { age_ms });
        }

        let rpm = state.rate_rpm() * scaling;
        if !rpm.is_finite() {
            return Err(HealthFault::NonFinite);
        }
        if rpm < self.minimum {
            return Err(HealthFault::BelowMinimum { rpm });
        }
        if rpm > self.maximum {
            return Err(HealthFault::AboveMaximum { rpm });
        }

        let quality = state.signal_quality();
        if quality < self.quality_min {
            return Err(HealthFault::LowQuality { quality });
        }

        Ok(rpm)
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from_config(&RpmConfig::new())
    }
}

/// Lifecycle of a slot as observed by consumers.
///
/// `Disabled` only changes through detection. An active slot moves from
/// `ActiveUnread` to `ActiveFresh` on its first publish and then alternates
/// between `ActiveFresh` and `ActiveStale` with elapsed time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotStatus {
    Disabled,
    ActiveUnread,
    ActiveFresh,
    ActiveStale,
}

impl SlotStatus {
    /// Derives the status of an active slot from its record.
    #[must_use]
    pub fn of_active(state: &RpmState, timeout_ms: u32, now: Millis) -> Self {
        match state.age_ms(now) {
            None => SlotStatus::ActiveUnread,
            Some(age) if age > timeout_ms => SlotStatus::ActiveStale,
            Some(_) => SlotStatus::ActiveFresh,
        }
    }

    /// Encodes the status for lock-free publication.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            SlotStatus::Disabled => 0,
            SlotStatus::ActiveUnread => 1,
            SlotStatus::ActiveFresh => 2,
            SlotStatus::ActiveStale => 3,
        }
    }

    /// Decodes a published status, treating unknown values as disabled.
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            1 => SlotStatus::ActiveUnread,
            2 => SlotStatus::ActiveFresh,
            3 => SlotStatus::ActiveStale,
            _ => SlotStatus::Disabled,
        }
    }

    /// Short label used by the operator console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SlotStatus::Disabled => "disabled",
            SlotStatus::ActiveUnread => "unread",
            SlotStatus::ActiveFresh => "fresh",
            SlotStatus::ActiveStale => "stale",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
