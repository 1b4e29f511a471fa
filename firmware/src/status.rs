#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Lock-free copy of the latest sensor readings.
//!
//! The tick task publishes every snapshot here so readers outside the manager
//! lock (governors, logging) never contend with the tick. Floats are stored as
//! raw bits; timestamps carry a `+1` offset so zero means "never published".

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use rpm_core::{InstanceId, MAX_INSTANCES, Millis, RpmSnapshot, SlotStatus};

struct SlotCell {
    status: AtomicU8,
    healthy: AtomicBool,
    rpm_bits: AtomicU32,
    quality_bits: AtomicU32,
}

impl SlotCell {
    const fn new() -> Self {
        Self {
            status: AtomicU8::new(0),
            healthy: AtomicBool::new(false),
            rpm_bits: AtomicU32::new(0),
            quality_bits: AtomicU32::new(0),
        }
    }
}

/// Published view of one slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PublishedReading {
    pub status: SlotStatus,
    pub healthy: bool,
    pub rpm: f32,
    pub quality: f32,
}

/// Atomic mirror of an [`RpmSnapshot`].
pub struct StatusBoard {
    slots: [SlotCell; MAX_INSTANCES],
    published_at: AtomicU32,
}

impl StatusBoard {
    pub const fn new() -> Self {
        Self {
            slots: [const { SlotCell::new() }; MAX_INSTANCES],
            published_at: AtomicU32::new(0),
        }
    }

    /// Stores every slot of `snapshot`.
    pub fn publish(&self, snapshot: &RpmSnapshot) {
        for (cell, slot) in self.slots.iter().zip(snapshot.slots.iter()) {
            cell.rpm_bits.store(slot.rpm.to_bits(), Ordering::Relaxed);
            cell.quality_bits.store(slot.quality.to_bits(), Ordering::Relaxed);
            cell.healthy.store(slot.is_healthy(), Ordering::Relaxed);
            cell.status.store(slot.status.to_raw(), Ordering::Relaxed);
        }
        self.published_at
            .store(snapshot.taken_at.wrapping_add(1), Ordering::Release);
    }

    /// Latest published view of `instance`.
    pub fn reading(&self, instance: InstanceId) -> PublishedReading {
        let cell = &self.slots[instance.as_index()];
        PublishedReading {
            status: SlotStatus::from_raw(cell.status.load(Ordering::Relaxed)),
            healthy: cell.healthy.load(Ordering::Relaxed),
            rpm: f32::from_bits(cell.rpm_bits.load(Ordering::Relaxed)),
            quality: f32::from_bits(cell.quality_bits.load(Ordering::Relaxed)),
        }
    }

    /// Scaled rate of `instance` if its last published reading was healthy.
    pub fn healthy_rpm(&self, instance: InstanceId) -> Option<f32> {
        let reading = self.reading(instance);
        reading.healthy.then_some(reading.rpm)
    }

    /// Bit `n` is set when slot `n` was healthy at the last publish.
    pub fn healthy_mask(&self) -> u8 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.healthy.load(Ordering::Relaxed))
            .fold(0, |mask, (index, _)| mask | (1 << index))
    }

    /// Tick time of the last publish, if any.
    pub fn published_at(&self) -> Option<Millis> {
        match self.published_at.load(Ordering::Acquire) {
            0 => None,
            raw => Some(raw.wrapping_sub(1)),
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Board-wide status mirror written by the tick task.
pub static STATUS: StatusBoard = StatusBoard::new();
