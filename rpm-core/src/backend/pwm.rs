//! Pulse-counting adapter.

use super::{MICROS_PER_MINUTE, RpmBackend};
use crate::state::SlotWriter;

/// Pulses counted over one closed measurement window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseWindow {
    pub pulses: u32,
    pub window_us: u32,
}

/// Source that accumulates pulses and hands out completed windows.
pub trait PulseCounter {
    /// Closes the current window and returns it, or `None` when no window has elapsed.
    fn take_window(&mut self) -> Option<PulseWindow>;
}

/// Converts pulse windows into revolutions per minute (one pulse per revolution).
pub struct PwmBackend<S> {
    source: Option<S>,
}

impl<S> PwmBackend<S> {
    #[must_use]
    pub const fn new(source: Option<S>) -> Self {
        Self { source }
    }

    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

impl<S: PulseCounter> RpmBackend for PwmBackend<S> {
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self, slot: SlotWriter<'_>) {
        let Some(window) = self.source.as_mut().and_then(PulseCounter::take_window) else {
            return;
        };
        if window.window_us == 0 {
            return;
        }

        if window.pulses == 0 {
            slot.publish(0.0, 0.0);
        } else {
            let rpm = window.pulses as f32 * MICROS_PER_MINUTE / window.window_us as f32;
            slot.publish(rpm, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InstanceId, RpmState};

    struct FixedWindow(Option<PulseWindow>);

    impl PulseCounter for FixedWindow {
        fn take_window(&mut self) -> Option<PulseWindow> {
            self.0.take()
        }
    }

    #[test]
    fn converts_pulses_to_rpm() {
        let mut backend = PwmBackend::new(Some(FixedWindow(Some(PulseWindow {
            pulses: 50,
            window_us: 100_000,
        }))));
        let mut state = RpmState::new(InstanceId::ALL[0]);

        backend.update(state.writer(10));
        assert_eq!(state.rate_rpm(), 30_000.0);
        assert_eq!(state.signal_quality(), 1.0);

        backend.update(state.writer(20));
        assert_eq!(state.last_reading_ms(), Some(10));
    }

    #[test]
    fn empty_window_reports_zero_quality() {
        let mut backend = PwmBackend::new(Some(FixedWindow(Some(PulseWindow {
            pulses: 0,
            window_us: 100_000,
        }))));
        let mut state = RpmState::new(InstanceId::ALL[0]);

        backend.update(state.writer(5));
        assert_eq!(state.rate_rpm(), 0.0);
        assert_eq!(state.signal_quality(), 0.0);
        assert_eq!(state.last_reading_ms(), Some(5));
    }

    #[test]
    fn missing_source_is_a_no_op() {
        let mut backend = PwmBackend::<FixedWindow>::new(None);
        let mut state = RpmState::new(InstanceId::ALL[0]);
        backend.update(state.writer(5));
        assert_eq!(state.last_reading_ms(), None);
        assert!(!backend.has_source());
    }
}
