//! Named tunables backing [`RpmConfig`].
//!
//! Parameters are described by a compile-time catalog so the console, the
//! firmware's board defaults, and tests all agree on names, ranges and
//! defaults. Values are parsed from text because every writer today is a
//! console line or a board table.

use core::fmt;

use crate::config::{
    DEFAULT_MAXIMUM_RPM, DEFAULT_MINIMUM_RPM, DEFAULT_QUALITY_MIN, DEFAULT_TIMEOUT_MS,
    MAX_INSTANCES, PinId, RpmConfig,
};
use crate::state::InstanceId;

/// Which field of the configuration a parameter maps to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamKey {
    Type(InstanceId),
    Pin(InstanceId),
    Scaling(InstanceId),
    Maximum,
    Minimum,
    QualityMin,
    TimeoutMs,
}

impl ParamKey {
    /// Returns `true` when changing the parameter only takes effect after re-detection.
    #[must_use]
    pub const fn requires_detection(self) -> bool {
        matches!(self, ParamKey::Type(_) | ParamKey::Pin(_))
    }
}

/// Accepted value domain for a parameter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamRange {
    Integer { min: i32, max: i32 },
    Float { min: f32, max: f32 },
}

/// Catalog entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub key: ParamKey,
    pub range: ParamRange,
    pub default: ParamValue,
}

/// Typed parameter value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamValue {
    Integer(i32),
    Float(f32),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value:.3}"),
        }
    }
}

/// Errors raised while reading or writing parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamError {
    UnknownName,
    /// Text could not be parsed for the parameter's value type.
    InvalidValue { name: &'static str },
    OutOfRange { name: &'static str, range: ParamRange },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::UnknownName => f.write_str("unknown parameter"),
            ParamError::InvalidValue { name } => write!(f, "{name}: invalid value"),
            ParamError::OutOfRange {
                name,
                range: ParamRange::Integer { min, max },
            } => write!(f, "{name}: value must be {min}..={max}"),
            ParamError::OutOfRange {
                name,
                range: ParamRange::Float { min, max },
            } => write!(f, "{name}: value must be {min:.1}..={max:.1}"),
        }
    }
}

/// Result of a successful write.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParamChange {
    pub spec: &'static ParamSpec,
    pub previous: ParamValue,
    pub value: ParamValue,
}

impl ParamChange {
    #[must_use]
    pub const fn requires_detection(&self) -> bool {
        self.spec.key.requires_detection()
    }
}

const TYPE_RANGE: ParamRange = ParamRange::Integer { min: 0, max: 255 };
const PIN_RANGE: ParamRange = ParamRange::Integer { min: -1, max: 255 };
const SCALING_RANGE: ParamRange = ParamRange::Float {
    min: 0.0,
    max: 1_000.0,
};
const RATE_RANGE: ParamRange = ParamRange::Float {
    min: 0.0,
    max: 1_000_000.0,
};
const QUALITY_RANGE: ParamRange = ParamRange::Float { min: 0.0, max: 1.0 };
const TIMEOUT_RANGE: ParamRange = ParamRange::Integer {
    min: 1,
    max: 60_000,
};

const fn slot_params(id: InstanceId, names: [&'static str; 3]) -> [ParamSpec; 3] {
    [
        ParamSpec {
            name: names[0],
            key: ParamKey::Type(id),
            range: TYPE_RANGE,
            default: ParamValue::Integer(0),
        },
        ParamSpec {
            name: names[1],
            key: ParamKey::Pin(id),
            range: PIN_RANGE,
            default: ParamValue::Integer(-1),
        },
        ParamSpec {
            name: names[2],
            key: ParamKey::Scaling(id),
            range: SCALING_RANGE,
            default: ParamValue::Float(1.0),
        },
    ]
}

const SLOT_NAMES: [[&str; 3]; MAX_INSTANCES] = [
    ["RPM1_TYPE", "RPM1_PIN", "RPM1_SCALING"],
    ["RPM2_TYPE", "RPM2_PIN", "RPM2_SCALING"],
    ["RPM3_TYPE", "RPM3_PIN", "RPM3_SCALING"],
    ["RPM4_TYPE", "RPM4_PIN", "RPM4_SCALING"],
];

static SLOT_PARAMS: [[ParamSpec; 3]; MAX_INSTANCES] = [
    slot_params(InstanceId::ALL[0], SLOT_NAMES[0]),
    slot_params(InstanceId::ALL[1], SLOT_NAMES[1]),
    slot_params(InstanceId::ALL[2], SLOT_NAMES[2]),
    slot_params(InstanceId::ALL[3], SLOT_NAMES[3]),
];

#[allow(clippy::cast_possible_wrap)]
static GLOBAL_PARAMS: [ParamSpec; 4] = [
    ParamSpec {
        name: "RPM_MAX",
        key: ParamKey::Maximum,
        range: RATE_RANGE,
        default: ParamValue::Float(DEFAULT_MAXIMUM_RPM),
    },
    ParamSpec {
        name: "RPM_MIN",
        key: ParamKey::Minimum,
        range: RATE_RANGE,
        default: ParamValue::Float(DEFAULT_MINIMUM_RPM),
    },
    ParamSpec {
        name: "RPM_MIN_QUAL",
        key: ParamKey::QualityMin,
        range: QUALITY_RANGE,
        default: ParamValue::Float(DEFAULT_QUALITY_MIN),
    },
    ParamSpec {
        name: "RPM_TIMEOUT",
        key: ParamKey::TimeoutMs,
        range: TIMEOUT_RANGE,
        default: ParamValue::Integer(DEFAULT_TIMEOUT_MS as i32),
    },
];

/// Iterates every parameter in display order: per-slot entries first, then globals.
pub fn all() -> impl Iterator<Item = &'static ParamSpec> {
    SLOT_PARAMS.iter().flatten().chain(GLOBAL_PARAMS.iter())
}

/// Finds a parameter by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static ParamSpec> {
    all().find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Reads the current value of a parameter.
#[must_use]
pub fn get(config: &RpmConfig, spec: &ParamSpec) -> ParamValue {
    match spec.key {
        ParamKey::Type(id) => {
            ParamValue::Integer(i32::from(config.instances[id.as_index()].raw_type()))
        }
        ParamKey::Pin(id) => ParamValue::Integer(
            config.instances[id.as_index()]
                .pin
                .map_or(-1, |pin| i32::from(pin.number())),
        ),
        ParamKey::Scaling(id) => ParamValue::Float(config.instances[id.as_index()].scaling),
        ParamKey::Maximum => ParamValue::Float(config.maximum),
        ParamKey::Minimum => ParamValue::Float(config.minimum),
        ParamKey::QualityMin => ParamValue::Float(config.quality_min),
        ParamKey::TimeoutMs => {
            ParamValue::Integer(i32::try_from(config.timeout_ms).unwrap_or(i32::MAX))
        }
    }
}

/// Parses `text`, validates it against the catalog, and writes it into `config`.
pub fn set(config: &mut RpmConfig, name: &str, text: &str) -> Result<ParamChange, ParamError> {
    let spec = find(name).ok_or(ParamError::UnknownName)?;
    let value = parse_value(spec, text)?;
    let previous = get(config, spec);
    apply(config, spec, value)?;

    Ok(ParamChange {
        spec,
        previous,
        value,
    })
}

fn parse_value(spec: &'static ParamSpec, text: &str) -> Result<ParamValue, ParamError> {
    let invalid = ParamError::InvalidValue { name: spec.name };
    let out_of_range = ParamError::OutOfRange {
        name: spec.name,
        range: spec.range,
    };

    match spec.range {
        ParamRange::Integer { min, max } => {
            let value = text.trim().parse::<i32>().map_err(|_| invalid)?;
            if (min..=max).contains(&value) {
                Ok(ParamValue::Integer(value))
            } else {
                Err(out_of_range)
            }
        }
        ParamRange::Float { min, max } => {
            let value = text.trim().parse::<f32>().map_err(|_| invalid)?;
            if value.is_finite() && (min..=max).contains(&value) {
                Ok(ParamValue::Float(value))
            } else {
                Err(out_of_range)
            }
        }
    }
}

fn apply(
    config: &mut RpmConfig,
    spec: &'static ParamSpec,
    value: ParamValue,
) -> Result<(), ParamError> {
    let invalid = ParamError::InvalidValue { name: spec.name };

    match (spec.key, value) {
        (ParamKey::Type(id), ParamValue::Integer(code)) => {
            let code = u8::try_from(code).map_err(|_| invalid)?;
            config.instances[id.as_index()].set_raw_type(code);
        }
        (ParamKey::Pin(id), ParamValue::Integer(pin)) => {
            let pin = i16::try_from(pin).map_err(|_| invalid)?;
            config.instances[id.as_index()].pin = PinId::from_param(pin);
        }
        (ParamKey::Scaling(id), ParamValue::Float(scaling)) => {
            config.instances[id.as_index()].scaling = scaling;
        }
        (ParamKey::Maximum, ParamValue::Float(maximum)) => config.maximum = maximum,
        (ParamKey::Minimum, ParamValue::Float(minimum)) => config.minimum = minimum,
        (ParamKey::QualityMin, ParamValue::Float(quality)) => config.quality_min = quality,
        (ParamKey::TimeoutMs, ParamValue::Integer(timeout)) => {
            config.timeout_ms = u32::try_from(timeout).map_err(|_| invalid)?;
        }
        _ => return Err(invalid),
    }

    Ok(())
}
