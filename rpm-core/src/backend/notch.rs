//! Adapter over the harmonic notch frequency tracker.

use super::RpmBackend;
use crate::state::SlotWriter;

/// Dominant frequency reported by the tracker.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NotchPeak {
    pub hz: f32,
    pub confidence: f32,
}

pub trait NotchTracker {
    fn peak_frequency(&mut self) -> Option<NotchPeak>;
}

pub struct NotchBackend<S> {
    source: Option<S>,
}

impl<S> NotchBackend<S> {
    #[must_use]
    pub const fn new(source: Option<S>) -> Self {
        Self { source }
    }

    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

impl<S: NotchTracker> RpmBackend for NotchBackend<S> {
    fn update(&mut self, slot: SlotWriter<'_>) {
        if let Some(peak) = self.source.as_mut().and_then(NotchTracker::peak_frequency) {
            slot.publish(peak.hz * 60.0, peak.confidence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InstanceId, RpmState};

    struct Peak;

    impl NotchTracker for Peak {
        fn peak_frequency(&mut self) -> Option<NotchPeak> {
            Some(NotchPeak {
                hz: 80.0,
                confidence: 0.7,
            })
        }
    }

    #[test]
    fn frequency_becomes_rpm() {
        let mut backend = NotchBackend::new(Some(Peak));
        let mut state = RpmState::new(InstanceId::ALL[3]);
        backend.update(state.writer(9));
        assert_eq!(state.rate_rpm(), 4_800.0);
        assert!((state.signal_quality() - 0.7).abs() < 1e-6);
    }
}
