//! Sensor configuration shared by firmware and host targets.
//!
//! The manager only ever reads these values. They are populated by the
//! composition root before detection runs and may later be adjusted through
//! the parameter table in [`crate::params`]. Slot types are stored as raw codes
//! so an unsupported value survives until detection decides what to do with it.

use core::fmt;

/// Maximum number of RPM measurement instances available on this platform.
pub const MAX_INSTANCES: usize = 4;

/// Default staleness window applied by the health policy.
pub const DEFAULT_TIMEOUT_MS: u32 = 1_000;

/// Default upper rate bound in revolutions per minute.
pub const DEFAULT_MAXIMUM_RPM: f32 = 100_000.0;

/// Default lower rate bound in revolutions per minute.
pub const DEFAULT_MINIMUM_RPM: f32 = 10.0;

/// Default minimum acceptable signal quality.
pub const DEFAULT_QUALITY_MIN: f32 = 0.5;

/// Sensing method configured for a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RpmType {
    /// Slot disabled.
    None,
    /// Pulse counting on a PWM-capable input.
    Pwm,
    /// Edge timing on a GPIO capture pin.
    Pin,
    /// Engine telemetry reported by the EFI subsystem.
    Efi,
    /// Rate derived from the harmonic notch tracker.
    HarmonicNotch,
    /// Simulated rotor (host and emulator targets).
    Sim,
}

impl RpmType {
    const NONE_CODE: u8 = 0;
    const PWM_CODE: u8 = 1;
    const PIN_CODE: u8 = 2;
    const EFI_CODE: u8 = 3;
    const HNTCH_CODE: u8 = 4;
    const SIM_CODE: u8 = 10;

    /// Encodes the type into its persisted parameter code.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            RpmType::None => Self::NONE_CODE,
            RpmType::Pwm => Self::PWM_CODE,
            RpmType::Pin => Self::PIN_CODE,
            RpmType::Efi => Self::EFI_CODE,
            RpmType::HarmonicNotch => Self::HNTCH_CODE,
            RpmType::Sim => Self::SIM_CODE,
        }
    }

    /// Decodes a parameter code, returning `None` for unsupported values.
    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            Self::NONE_CODE => Some(RpmType::None),
            Self::PWM_CODE => Some(RpmType::Pwm),
            Self::PIN_CODE => Some(RpmType::Pin),
            Self::EFI_CODE => Some(RpmType::Efi),
            Self::HNTCH_CODE => Some(RpmType::HarmonicNotch),
            Self::SIM_CODE => Some(RpmType::Sim),
            _ => None,
        }
    }

    /// Returns `true` when the sensing method needs a physical pin.
    #[must_use]
    pub const fn requires_pin(self) -> bool {
        matches!(self, RpmType::Pwm | RpmType::Pin)
    }

    /// Short label used by logs and the operator console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RpmType::None => "none",
            RpmType::Pwm => "pwm",
            RpmType::Pin => "pin",
            RpmType::Efi => "efi",
            RpmType::HarmonicNotch => "hntch",
            RpmType::Sim => "sim",
        }
    }
}

impl fmt::Display for RpmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hardware pin identifier. Negative parameter values mean "no pin".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinId(u8);

impl PinId {
    /// Wraps a raw pin number.
    #[must_use]
    pub const fn new(pin: u8) -> Self {
        Self(pin)
    }

    /// Decodes the signed parameter representation.
    #[must_use]
    pub fn from_param(value: i16) -> Option<Self> {
        u8::try_from(value).ok().map(Self)
    }

    /// Returns the raw pin number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }
}

/// Per-slot configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InstanceConfig {
    raw_type: u8,
    pub pin: Option<PinId>,
    pub scaling: f32,
}

impl InstanceConfig {
    /// A disabled slot with unit scaling and no pin.
    pub const DISABLED: Self = Self {
        raw_type: RpmType::None.to_raw(),
        pin: None,
        scaling: 1.0,
    };

    /// Creates a configuration for the supplied sensing method.
    #[must_use]
    pub const fn new(kind: RpmType, pin: Option<PinId>, scaling: f32) -> Self {
        Self {
            raw_type: kind.to_raw(),
            pin,
            scaling,
        }
    }

    /// Creates a configuration from an unvalidated type code.
    #[must_use]
    pub const fn from_raw_type(raw_type: u8, pin: Option<PinId>, scaling: f32) -> Self {
        Self {
            raw_type,
            pin,
            scaling,
        }
    }

    /// Returns the stored type code exactly as configured.
    #[must_use]
    pub const fn raw_type(&self) -> u8 {
        self.raw_type
    }

    /// Replaces the type code.
    pub fn set_raw_type(&mut self, raw_type: u8) {
        self.raw_type = raw_type;
    }

    /// Returns the decoded sensing method, or `None` when the code is unsupported.
    #[must_use]
    pub const fn kind(&self) -> Option<RpmType> {
        RpmType::from_raw(self.raw_type)
    }

    /// Returns `true` when the slot is configured with a supported, non-`none` method.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        match self.kind() {
            Some(RpmType::None) | None => false,
            Some(_) => true,
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// Complete sensor configuration: per-slot settings plus global health bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RpmConfig {
    pub instances: [InstanceConfig; MAX_INSTANCES],
    pub maximum: f32,
    pub minimum: f32,
    pub quality_min: f32,
    pub timeout_ms: u32,
}

impl RpmConfig {
    /// Configuration with every slot disabled and default bounds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instances: [InstanceConfig::DISABLED; MAX_INSTANCES],
            maximum: DEFAULT_MAXIMUM_RPM,
            minimum: DEFAULT_MINIMUM_RPM,
            quality_min: DEFAULT_QUALITY_MIN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Builder-style helper that installs a slot configuration.
    ///
    /// Indices outside the slot table are ignored.
    #[must_use]
    pub fn with_instance(mut self, index: usize, config: InstanceConfig) -> Self {
        if let Some(slot) = self.instances.get_mut(index) {
            *slot = config;
        }
        self
    }

    /// Builder-style helper that sets the valid rate window.
    #[must_use]
    pub const fn with_bounds(mut self, minimum: f32, maximum: f32) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Builder-style helper that sets the minimum acceptable quality.
    #[must_use]
    pub const fn with_quality_min(mut self, quality_min: f32) -> Self {
        self.quality_min = quality_min;
        self
    }

    /// Builder-style helper that sets the staleness window.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Returns the configuration for a slot index, if it exists.
    #[must_use]
    pub fn instance(&self, index: usize) -> Option<&InstanceConfig> {
        self.instances.get(index)
    }
}

impl Default for RpmConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_match_parameter_table() {
        let fixtures = [
            (RpmType::None, 0),
            (RpmType::Pwm, 1),
            (RpmType::Pin, 2),
            (RpmType::Efi, 3),
            (RpmType::HarmonicNotch, 4),
            (RpmType::Sim, 10),
        ];

        for (kind, code) in fixtures {
            assert_eq!(kind.to_raw(), code);
            assert_eq!(RpmType::from_raw(code), Some(kind));
        }
        assert_eq!(RpmType::from_raw(7), None);
    }

    #[test]
    fn unsupported_type_is_not_enabled() {
        let config = InstanceConfig::from_raw_type(42, None, 1.0);
        assert_eq!(config.kind(), None);
        assert!(!config.is_enabled());
        assert_eq!(config.raw_type(), 42);
    }

    #[test]
    fn negative_pin_parameter_means_no_pin() {
        assert_eq!(PinId::from_param(-1), None);
        assert_eq!(PinId::from_param(54), Some(PinId::new(54)));
        assert_eq!(PinId::from_param(300), None);
    }

    #[test]
    fn builder_ignores_out_of_range_slots() {
        let config = RpmConfig::new()
            .with_instance(1, InstanceConfig::new(RpmType::Efi, None, 1.0))
            .with_instance(9, InstanceConfig::new(RpmType::Pwm, None, 1.0));

        assert!(config.instances[1].is_enabled());
        assert_eq!(
            config.instances.iter().filter(|slot| slot.is_enabled()).count(),
            1
        );
    }
}
