//! Backend contract and the closed set of sensing adapters.
//!
//! A backend is invoked once per tick with a [`SlotWriter`] for its own slot.
//! Signal processing happens in the platform layer: each adapter consumes a
//! pre-captured source provided by a [`SensorHardware`] implementation and only
//! converts units before publishing.

pub mod efi;
pub mod notch;
pub mod pin;
pub mod pwm;
pub mod sim;

use crate::config::{InstanceConfig, PinId, RpmType};
use crate::state::{InstanceId, SlotWriter};

pub use efi::{EfiBackend, EngineSample, EngineTelemetry};
pub use notch::{NotchBackend, NotchPeak, NotchTracker};
pub use pin::{EdgeCapture, EdgePeriod, PinBackend};
pub use pwm::{PulseCounter, PulseWindow, PwmBackend};
pub use sim::{SimBackend, SimulatedRotor};

/// Microseconds per minute, used by every period/frequency conversion.
pub(crate) const MICROS_PER_MINUTE: f32 = 60_000_000.0;

/// Single operation every sensing backend implements.
pub trait RpmBackend {
    /// Publishes a new reading through `slot`, or drops it to leave the slot untouched.
    fn update(&mut self, slot: SlotWriter<'_>);
}

/// Platform capability that hands out pre-captured measurement sources.
///
/// Factories return `None` when the source cannot be provided (missing pin,
/// peripheral absent). The slot still gets a backend; it simply never publishes.
pub trait SensorHardware {
    type PulseCounter: PulseCounter;
    type EdgeCapture: EdgeCapture;
    type EngineTelemetry: EngineTelemetry;
    type NotchTracker: NotchTracker;
    type SimulatedRotor: SimulatedRotor;

    fn pulse_counter(&mut self, instance: InstanceId, pin: Option<PinId>)
    -> Option<Self::PulseCounter>;

    fn edge_capture(&mut self, instance: InstanceId, pin: Option<PinId>)
    -> Option<Self::EdgeCapture>;

    fn engine_telemetry(&mut self, instance: InstanceId) -> Option<Self::EngineTelemetry>;

    fn notch_tracker(&mut self, instance: InstanceId) -> Option<Self::NotchTracker>;

    fn simulated_rotor(&mut self, instance: InstanceId) -> Option<Self::SimulatedRotor>;

    /// Called when a slot's backend is torn down so the platform can free its source.
    fn release(&mut self, _instance: InstanceId) {}
}

/// Backend bound to one slot, one variant per supported sensing method.
pub enum Driver<H: SensorHardware> {
    Pwm(PwmBackend<H::PulseCounter>),
    Pin(PinBackend<H::EdgeCapture>),
    Efi(EfiBackend<H::EngineTelemetry>),
    Notch(NotchBackend<H::NotchTracker>),
    Sim(SimBackend<H::SimulatedRotor>),
}

impl<H: SensorHardware> Driver<H> {
    /// Builds the backend matching `kind`, or `None` for a disabled slot.
    #[must_use]
    pub fn for_slot(
        kind: RpmType,
        instance: InstanceId,
        config: &InstanceConfig,
        hardware: &mut H,
    ) -> Option<Self> {
        let driver = match kind {
            RpmType::None => return None,
            RpmType::Pwm => Driver::Pwm(PwmBackend::new(
                hardware.pulse_counter(instance, config.pin),
            )),
            RpmType::Pin => Driver::Pin(PinBackend::new(
                hardware.edge_capture(instance, config.pin),
            )),
            RpmType::Efi => Driver::Efi(EfiBackend::new(hardware.engine_telemetry(instance))),
            RpmType::HarmonicNotch => {
                Driver::Notch(NotchBackend::new(hardware.notch_tracker(instance)))
            }
            RpmType::Sim => Driver::Sim(SimBackend::new(
                instance,
                hardware.simulated_rotor(instance),
            )),
        };
        Some(driver)
    }

    /// Sensing method implemented by this backend.
    #[must_use]
    pub const fn kind(&self) -> RpmType {
        match self {
            Driver::Pwm(_) => RpmType::Pwm,
            Driver::Pin(_) => RpmType::Pin,
            Driver::Efi(_) => RpmType::Efi,
            Driver::Notch(_) => RpmType::HarmonicNotch,
            Driver::Sim(_) => RpmType::Sim,
        }
    }

    /// Returns `true` when the platform supplied a measurement source.
    #[must_use]
    pub const fn has_source(&self) -> bool {
        match self {
            Driver::Pwm(backend) => backend.has_source(),
            Driver::Pin(backend) => backend.has_source(),
            Driver::Efi(backend) => backend.has_source(),
            Driver::Notch(backend) => backend.has_source(),
            Driver::Sim(backend) => backend.has_source(),
        }
    }
}

impl<H: SensorHardware> RpmBackend for Driver<H> {
    fn update(&mut self, slot: SlotWriter<'_>) {
        match self {
            Driver::Pwm(backend) => backend.update(slot),
            Driver::Pin(backend) => backend.update(slot),
            Driver::Efi(backend) => backend.update(slot),
            Driver::Notch(backend) => backend.update(slot),
            Driver::Sim(backend) => backend.update(slot),
        }
    }
}
