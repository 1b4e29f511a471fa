//! Edge-timing adapter for GPIO capture pins.

use super::{MICROS_PER_MINUTE, RpmBackend};
use crate::state::SlotWriter;

/// Latest period measured between consecutive edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgePeriod {
    pub period_us: u32,
    pub jitter_us: u32,
    /// Increments every time the capture logic produces a new period.
    pub sequence: u32,
}

/// Source exposing the most recent edge period.
pub trait EdgeCapture {
    fn latest_period(&mut self) -> Option<EdgePeriod>;
}

/// Publishes each new edge period as a rate; repeated sequences are ignored.
pub struct PinBackend<S> {
    source: Option<S>,
    last_sequence: Option<u32>,
}

impl<S> PinBackend<S> {
    #[must_use]
    pub const fn new(source: Option<S>) -> Self {
        Self {
            source,
            last_sequence: None,
        }
    }

    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

impl<S: EdgeCapture> RpmBackend for PinBackend<S> {
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self, slot: SlotWriter<'_>) {
        let Some(period) = self.source.as_mut().and_then(EdgeCapture::latest_period) else {
            return;
        };
        if self.last_sequence == Some(period.sequence) {
            return;
        }
        self.last_sequence = Some(period.sequence);

        if period.period_us == 0 {
            return;
        }

        let period_us = period.period_us as f32;
        let rpm = MICROS_PER_MINUTE / period_us;
        let quality = 1.0 - period.jitter_us as f32 / period_us;
        slot.publish(rpm, quality);
    }
}
