//! Per-slot measurement records and the bounded identifiers that index them.
//!
//! Backends never see the whole table: each tick hands a backend a
//! [`SlotWriter`] borrowed from exactly one [`RpmState`], so the single-writer
//! rule is enforced by the borrow checker rather than by convention.

use core::fmt;

use crate::config::MAX_INSTANCES;

/// Milliseconds on the firmware's monotonic clock. Wraps like a hardware tick counter.
pub type Millis = u32;

/// Returns the elapsed time between two wrapping millisecond stamps.
#[must_use]
pub const fn elapsed_ms(now: Millis, earlier: Millis) -> u32 {
    now.wrapping_sub(earlier)
}

/// Validated slot index (`0 <= index < MAX_INSTANCES`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct InstanceId(u8);

impl InstanceId {
    /// Every slot identifier, in index order.
    pub const ALL: [InstanceId; MAX_INSTANCES] =
        [InstanceId(0), InstanceId(1), InstanceId(2), InstanceId(3)];

    /// Attempts to construct an identifier from a raw index.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_INSTANCES {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Deterministic index for lookups into per-slot arrays.
    #[must_use]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw slot number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// One-based number used by parameter names and console output (`RPM1`..).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self.0 + 1
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpm{}", self.ordinal())
    }
}

/// Raised when a count would exceed the slot table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CountOverflow {
    pub requested: usize,
}

/// Number of active slots, bounded by [`MAX_INSTANCES`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct InstanceCount(u8);

impl InstanceCount {
    /// No active slots.
    pub const ZERO: Self = Self(0);

    /// Validates and wraps a count.
    pub fn new(value: usize) -> Result<Self, CountOverflow> {
        if value <= MAX_INSTANCES {
            u8::try_from(value)
                .map(Self)
                .map_err(|_| CountOverflow { requested: value })
        } else {
            Err(CountOverflow { requested: value })
        }
    }

    /// Returns the count as a `u8`.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the count as a `usize`.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the incremented count, failing once the table is full.
    pub fn increment(self) -> Result<Self, CountOverflow> {
        Self::new(self.as_usize() + 1)
    }
}

/// Measurement record filled in by a slot's backend.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RpmState {
    instance: InstanceId,
    rate_rpm: f32,
    last_reading_ms: Option<Millis>,
    signal_quality: f32,
}

impl RpmState {
    /// Creates an empty record bound to `instance`.
    #[must_use]
    pub const fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            rate_rpm: 0.0,
            last_reading_ms: None,
            signal_quality: 0.0,
        }
    }

    /// Slot that owns this record.
    #[must_use]
    pub const fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Last published rate before scaling.
    #[must_use]
    pub const fn rate_rpm(&self) -> f32 {
        self.rate_rpm
    }

    /// Timestamp of the most recent publish, if any.
    #[must_use]
    pub const fn last_reading_ms(&self) -> Option<Millis> {
        self.last_reading_ms
    }

    /// Last published signal quality.
    #[must_use]
    pub const fn signal_quality(&self) -> f32 {
        self.signal_quality
    }

    /// Milliseconds since the last publish, or `None` before the first one.
    #[must_use]
    pub fn age_ms(&self, now: Millis) -> Option<u32> {
        self.last_reading_ms.map(|stamp| elapsed_ms(now, stamp))
    }

    /// Hands out the write capability for this slot.
    pub(crate) fn writer(&mut self, now: Millis) -> SlotWriter<'_> {
        SlotWriter { state: self, now }
    }
}

/// Write capability for exactly one slot during one tick.
///
/// Publishing stamps the record with the tick time. Dropping the writer without
/// publishing leaves the record untouched, which is how a backend without new
/// data lets its slot age.
pub struct SlotWriter<'a> {
    state: &'a mut RpmState,
    now: Millis,
}

impl SlotWriter<'_> {
    /// Slot this writer is bound to.
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.state.instance
    }

    /// Tick timestamp that will be applied on publish.
    #[must_use]
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Timestamp of the previous publish, if any.
    #[must_use]
    pub fn last_reading_ms(&self) -> Option<Millis> {
        self.state.last_reading_ms
    }

    /// Stores a new reading. Quality is clamped into `[0, 1]`; NaN becomes `0`.
    pub fn publish(self, rate_rpm: f32, signal_quality: f32) {
        let quality = if signal_quality.is_nan() {
            0.0
        } else {
            signal_quality.clamp(0.0, 1.0)
        };

        self.state.rate_rpm = rate_rpm;
        self.state.signal_quality = quality;
        self.state.last_reading_ms = Some(self.now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_bounded() {
        assert!(InstanceId::new(3).is_some());
        assert!(InstanceId::new(4).is_none());
        assert_eq!(InstanceId::ALL[2].as_index(), 2);
        assert_eq!(InstanceId::ALL[0].ordinal(), 1);
    }

    #[test]
    fn instance_count_rejects_overflow() {
        let full = InstanceCount::new(MAX_INSTANCES).expect("full table is a valid count");
        assert_eq!(full.as_usize(), MAX_INSTANCES);
        assert_eq!(
            full.increment(),
            Err(CountOverflow {
                requested: MAX_INSTANCES + 1
            })
        );
        assert!(InstanceCount::new(usize::MAX).is_err());
    }

    #[test]
    fn writer_stamps_and_clamps() {
        let mut state = RpmState::new(InstanceId::ALL[1]);
        assert_eq!(state.age_ms(10), None);

        state.writer(250).publish(1_200.0, 1.7);

        assert_eq!(state.rate_rpm(), 1_200.0);
        assert_eq!(state.signal_quality(), 1.0);
        assert_eq!(state.last_reading_ms(), Some(250));
        assert_eq!(state.age_ms(400), Some(150));
        assert_eq!(state.instance(), InstanceId::ALL[1]);
    }

    #[test]
    fn unused_writer_leaves_state_untouched() {
        let mut state = RpmState::new(InstanceId::ALL[0]);
        state.writer(10).publish(500.0, 0.8);

        let writer = state.writer(900);
        assert_eq!(writer.last_reading_ms(), Some(10));
        drop(writer);

        assert_eq!(state.last_reading_ms(), Some(10));
        assert_eq!(state.rate_rpm(), 500.0);
    }

    #[test]
    fn age_survives_counter_wrap() {
        let mut state = RpmState::new(InstanceId::ALL[0]);
        state.writer(u32::MAX - 5).publish(100.0, 1.0);
        assert_eq!(state.age_ms(10), Some(16));
    }
}
