//! Simulated rotor used by host builds and the emulator.

use super::RpmBackend;
use crate::state::{InstanceId, SlotWriter};

/// Quality reported for simulated readings.
pub const SIM_SIGNAL_QUALITY: f32 = 0.5;

/// Source of simulated rotor speeds, keyed by slot.
pub trait SimulatedRotor {
    fn rotor_rpm(&mut self, instance: InstanceId) -> Option<f32>;
}

pub struct SimBackend<S> {
    instance: InstanceId,
    source: Option<S>,
}

impl<S> SimBackend<S> {
    #[must_use]
    pub const fn new(instance: InstanceId, source: Option<S>) -> Self {
        Self { instance, source }
    }

    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

impl<S: SimulatedRotor> RpmBackend for SimBackend<S> {
    fn update(&mut self, slot: SlotWriter<'_>) {
        let instance = self.instance;
        if let Some(rpm) = self.source.as_mut().and_then(|rotor| rotor.rotor_rpm(instance)) {
            slot.publish(rpm, SIM_SIGNAL_QUALITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RpmState;

    struct Spinning;

    impl SimulatedRotor for Spinning {
        fn rotor_rpm(&mut self, instance: InstanceId) -> Option<f32> {
            Some(1_000.0 * f32::from(instance.ordinal()))
        }
    }

    #[test]
    fn publishes_rotor_speed_for_its_slot() {
        let id = InstanceId::ALL[1];
        let mut backend = SimBackend::new(id, Some(Spinning));
        let mut state = RpmState::new(id);
        backend.update(state.writer(3));
        assert_eq!(state.rate_rpm(), 2_000.0);
        assert_eq!(state.signal_quality(), SIM_SIGNAL_QUALITY);
    }
}
