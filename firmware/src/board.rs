#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board wiring: capture inputs and the boot-time sensor configuration.
//!
//! Parameter pin numbers follow the autopilot convention of numbering the
//! auxiliary inputs from 50. Each input is routed to one EXTI line and owns one
//! [`crate::sensors::CaptureChannel`].

use rpm_core::params::{self, ParamError};
use rpm_core::{PinId, RpmConfig};

/// Number of capture inputs routed on the board.
pub const CAPTURE_INPUTS: usize = 4;

/// Parameter pin numbers of the capture inputs, indexed by channel.
pub const CAPTURE_PINS: [PinId; CAPTURE_INPUTS] =
    [PinId::new(50), PinId::new(51), PinId::new(52), PinId::new(53)];

/// Parameter overrides applied on top of [`RpmConfig::new`] at boot.
///
/// Slot 1 counts pulses on the first input, slot 2 times edges on the second.
pub const BOARD_PARAMS: &[(&str, &str)] = &[
    ("RPM1_TYPE", "1"),
    ("RPM1_PIN", "50"),
    ("RPM2_TYPE", "2"),
    ("RPM2_PIN", "51"),
    ("RPM_MIN", "100"),
    ("RPM_MAX", "20000"),
];

/// Resolves a parameter pin number to a capture channel.
pub fn channel_for(pin: PinId) -> Option<usize> {
    CAPTURE_PINS.iter().position(|candidate| *candidate == pin)
}

/// Builds the boot configuration, returning the first rejected override, if any.
///
/// Rejected overrides are skipped; the remaining ones still apply.
pub fn boot_config() -> (RpmConfig, Option<(&'static str, ParamError)>) {
    let mut config = RpmConfig::new();
    let mut rejected = None;

    for &(name, value) in BOARD_PARAMS {
        if let Err(error) = params::set(&mut config, name, value) {
            rejected.get_or_insert((name, error));
        }
    }

    (config, rejected)
}
