//! Instance manager: detection, the periodic tick, and validated accessors.
//!
//! The manager is the only interface consumers use. It owns the configuration,
//! the per-slot state table, and one optional backend per slot. Backends write
//! raw (pre-scaling) rates; every accessor applies the slot's scaling and the
//! [`HealthPolicy`] before exposing a value.

use core::{array, fmt};

use crate::backend::{Driver, RpmBackend, SensorHardware};
use crate::config::{MAX_INSTANCES, RpmConfig, RpmType};
use crate::health::{HealthFault, HealthPolicy, SlotStatus};
use crate::state::{InstanceCount, InstanceId, Millis, RpmState};

/// Errors returned by the reading accessors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RpmError {
    /// Index outside `0..MAX_INSTANCES`.
    InvalidInstance { index: u8 },
    /// Slot has no backend.
    Disabled,
    /// Slot is active but its reading failed the health policy.
    Unhealthy(HealthFault),
}

impl From<HealthFault> for RpmError {
    fn from(fault: HealthFault) -> Self {
        match fault {
            HealthFault::Disabled => RpmError::Disabled,
            other => RpmError::Unhealthy(other),
        }
    }
}

impl fmt::Display for RpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpmError::InvalidInstance { index } => {
                write!(f, "invalid instance {index} (max {MAX_INSTANCES})")
            }
            RpmError::Disabled => f.write_str("instance disabled"),
            RpmError::Unhealthy(fault) => write!(f, "unhealthy: {fault}"),
        }
    }
}

/// Pre-arm failures derived from the configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ArmingCheckError {
    /// A pin-based sensing method is configured without a pin.
    MissingPin { instance: InstanceId },
    /// The rate window is inverted.
    InvertedBounds { minimum: f32, maximum: f32 },
}

impl fmt::Display for ArmingCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmingCheckError::MissingPin { instance } => write!(f, "{instance}: no pin set"),
            ArmingCheckError::InvertedBounds { minimum, maximum } => {
                write!(f, "minimum {minimum:.1} exceeds maximum {maximum:.1}")
            }
        }
    }
}

/// Outcome of detection for one slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotDetection {
    /// Type `none`; no backend.
    Disabled,
    /// Backend created. `has_source` is false when the platform could not supply one.
    Detected { kind: RpmType, has_source: bool },
    /// Configured code is not a known sensing method; slot left disabled.
    Unsupported { code: u8 },
}

/// Per-slot detection results returned by [`RpmManager::init`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectionReport {
    pub slots: [SlotDetection; MAX_INSTANCES],
    pub active: InstanceCount,
}

impl DetectionReport {
    /// Iterates slots paired with their identifiers.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, SlotDetection)> + '_ {
        InstanceId::ALL.into_iter().zip(self.slots.iter().copied())
    }
}

/// Copyable view of one slot at an instant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlotSnapshot {
    pub instance: InstanceId,
    pub kind: Option<RpmType>,
    pub status: SlotStatus,
    /// Last published rate with scaling applied.
    pub rpm: f32,
    pub quality: f32,
    pub age_ms: Option<u32>,
    pub health: Result<f32, HealthFault>,
}

impl SlotSnapshot {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.health.is_ok()
    }
}

/// Copyable view of the whole table, used by telemetry and the console.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RpmSnapshot {
    pub taken_at: Millis,
    pub slots: [SlotSnapshot; MAX_INSTANCES],
}

impl RpmSnapshot {
    /// Snapshot of a single slot.
    #[must_use]
    pub fn slot(&self, instance: InstanceId) -> &SlotSnapshot {
        &self.slots[instance.as_index()]
    }
}

/// Owns the sensor table and the backends that fill it.
pub struct RpmManager<H: SensorHardware> {
    config: RpmConfig,
    hardware: H,
    state: [RpmState; MAX_INSTANCES],
    drivers: [Option<Driver<H>>; MAX_INSTANCES],
    active: InstanceCount,
}

impl<H: SensorHardware> RpmManager<H> {
    /// Creates a manager with every slot disabled. Call [`Self::init`] to detect sensors.
    #[must_use]
    pub fn new(config: RpmConfig, hardware: H) -> Self {
        Self {
            config,
            hardware,
            state: InstanceId::ALL.map(RpmState::new),
            drivers: array::from_fn(|_| None),
            active: InstanceCount::ZERO,
        }
    }

    /// Scans every slot and instantiates the configured backends.
    ///
    /// Existing backends are torn down first, so this also serves as
    /// re-detection after a type or pin change.
    pub fn init(&mut self) -> DetectionReport {
        self.shutdown();

        let mut slots = [SlotDetection::Disabled; MAX_INSTANCES];
        for id in InstanceId::ALL {
            let index = id.as_index();
            let slot_config = self.config.instances[index];

            let Some(kind) = slot_config.kind() else {
                slots[index] = SlotDetection::Unsupported {
                    code: slot_config.raw_type(),
                };
                continue;
            };

            let Some(driver) = Driver::for_slot(kind, id, &slot_config, &mut self.hardware) else {
                continue;
            };

            slots[index] = SlotDetection::Detected {
                kind,
                has_source: driver.has_source(),
            };
            self.drivers[index] = Some(driver);
            if let Ok(next) = self.active.increment() {
                self.active = next;
            }
        }

        DetectionReport {
            slots,
            active: self.active,
        }
    }

    /// Releases every backend and resets the state table.
    pub fn shutdown(&mut self) {
        for (id, driver) in InstanceId::ALL.into_iter().zip(self.drivers.iter_mut()) {
            if driver.take().is_some() {
                self.hardware.release(id);
            }
        }
        self.state = InstanceId::ALL.map(RpmState::new);
        self.active = InstanceCount::ZERO;
    }

    /// Runs one tick: each active backend gets exclusive access to its own slot.
    pub fn update(&mut self, now: Millis) {
        for (driver, state) in self.drivers.iter_mut().zip(self.state.iter_mut()) {
            if let Some(driver) = driver {
                driver.update(state.writer(now));
            }
        }
    }

    /// Number of slots with a backend.
    #[must_use]
    pub fn num_sensors(&self) -> u8 {
        self.active.get()
    }

    #[must_use]
    pub fn active_count(&self) -> InstanceCount {
        self.active
    }

    /// Returns `true` when `index` names a slot that has a backend and is still
    /// configured with a sensing method.
    #[must_use]
    pub fn enabled(&self, index: u8) -> bool {
        InstanceId::new(index).is_some_and(|id| self.driver(id).is_some())
    }

    /// Returns `true` when the slot's reading passes the health policy.
    #[must_use]
    pub fn healthy(&self, index: u8, now: Millis) -> bool {
        InstanceId::new(index).is_some_and(|id| self.health(id, now).is_ok())
    }

    /// Evaluates the health policy for a slot, returning the scaled rate or the first failure.
    pub fn health(&self, instance: InstanceId, now: Millis) -> Result<f32, HealthFault> {
        let index = instance.as_index();
        if self.driver(instance).is_none() {
            return Err(HealthFault::Disabled);
        }
        HealthPolicy::from_config(&self.config).evaluate(
            &self.state[index],
            self.config.instances[index].scaling,
            now,
        )
    }

    /// Scaled rate for a healthy slot.
    pub fn get_rpm(&self, index: u8, now: Millis) -> Result<f32, RpmError> {
        let id = Self::instance(index)?;
        self.health(id, now).map_err(RpmError::from)
    }

    /// Last published signal quality of an active slot.
    pub fn get_signal_quality(&self, index: u8) -> Result<f32, RpmError> {
        let id = Self::instance(index)?;
        if self.driver(id).is_none() {
            return Err(RpmError::Disabled);
        }
        Ok(self.state[id.as_index()].signal_quality())
    }

    /// Lifecycle state of a slot.
    #[must_use]
    pub fn status(&self, instance: InstanceId, now: Millis) -> SlotStatus {
        let index = instance.as_index();
        if self.driver(instance).is_none() {
            SlotStatus::Disabled
        } else {
            SlotStatus::of_active(&self.state[index], self.config.timeout_ms, now)
        }
    }

    /// Sensing method of the backend currently bound to a slot.
    #[must_use]
    pub fn kind(&self, instance: InstanceId) -> Option<RpmType> {
        self.driver(instance).map(Driver::kind)
    }

    /// Raw record for a slot.
    #[must_use]
    pub fn state(&self, instance: InstanceId) -> &RpmState {
        &self.state[instance.as_index()]
    }

    /// Captures every slot at `now`.
    #[must_use]
    pub fn snapshot(&self, now: Millis) -> RpmSnapshot {
        let slots = InstanceId::ALL.map(|id| {
            let state = &self.state[id.as_index()];
            SlotSnapshot {
                instance: id,
                kind: self.kind(id),
                status: self.status(id, now),
                rpm: state.rate_rpm() * self.config.instances[id.as_index()].scaling,
                quality: state.signal_quality(),
                age_ms: state.age_ms(now),
                health: self.health(id, now),
            }
        });

        RpmSnapshot {
            taken_at: now,
            slots,
        }
    }

    /// Pre-arm validation of the configuration.
    pub fn arming_checks(&self) -> Result<(), ArmingCheckError> {
        for (id, slot) in InstanceId::ALL.into_iter().zip(self.config.instances.iter()) {
            if slot.kind().is_some_and(RpmType::requires_pin) && slot.pin.is_none() {
                return Err(ArmingCheckError::MissingPin { instance: id });
            }
        }

        if self.config.minimum > self.config.maximum {
            return Err(ArmingCheckError::InvertedBounds {
                minimum: self.config.minimum,
                maximum: self.config.maximum,
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &RpmConfig {
        &self.config
    }

    /// Mutable configuration access for live tuning. Setting a slot's type to
    /// `none` (or an unsupported code) disables it immediately; any other type
    /// or pin change takes effect on the next [`Self::init`].
    pub fn config_mut(&mut self) -> &mut RpmConfig {
        &mut self.config
    }

    /// Backend of a slot whose configured type still names a sensing method.
    fn driver(&self, instance: InstanceId) -> Option<&Driver<H>> {
        let index = instance.as_index();
        if !self.config.instances[index].is_enabled() {
            return None;
        }
        self.drivers[index].as_ref()
    }

    fn instance(index: u8) -> Result<InstanceId, RpmError> {
        InstanceId::new(index).ok_or(RpmError::InvalidInstance { index })
    }
}
