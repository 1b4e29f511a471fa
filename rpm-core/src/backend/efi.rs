//! Adapter over engine telemetry reported by the EFI subsystem.

use super::RpmBackend;
use crate::state::{Millis, SlotWriter};

/// Engine speed as last reported by the EFI subsystem.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineSample {
    pub rpm: f32,
    pub updated_ms: Millis,
}

/// Source exposing the engine speed reported by the EFI subsystem.
pub trait EngineTelemetry {
    fn engine_rpm(&mut self) -> Option<EngineSample>;
}

/// Mirrors EFI engine speed whenever the EFI update timestamp advances.
///
/// A sample already present when the backend is created counts as seen, so
/// only telemetry the ECU produces after detection is published.
pub struct EfiBackend<S> {
    source: Option<S>,
    last_update_ms: Option<Millis>,
}

impl<S: EngineTelemetry> EfiBackend<S> {
    #[must_use]
    pub fn new(mut source: Option<S>) -> Self {
        let last_update_ms = source
            .as_mut()
            .and_then(EngineTelemetry::engine_rpm)
            .map(|sample| sample.updated_ms);
        Self {
            source,
            last_update_ms,
        }
    }
}

impl<S> EfiBackend<S> {
    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

impl<S: EngineTelemetry> RpmBackend for EfiBackend<S> {
    fn update(&mut self, slot: SlotWriter<'_>) {
        let Some(sample) = self.source.as_mut().and_then(EngineTelemetry::engine_rpm) else {
            return;
        };
        if self.last_update_ms == Some(sample.updated_ms) {
            return;
        }
        self.last_update_ms = Some(sample.updated_ms);
        slot.publish(sample.rpm, 1.0);
    }
}
