//! RPM sensor instance management shared by the firmware and the emulator.
//!
//! Up to four sensing slots are configured, detected and ticked by
//! [`RpmManager`]; consumers only see readings that pass the health policy.

#![no_std]

pub mod backend;
pub mod config;
pub mod health;
pub mod manager;
pub mod params;
pub mod repl;
pub mod state;
pub mod telemetry;

pub use config::{InstanceConfig, MAX_INSTANCES, PinId, RpmConfig, RpmType};
pub use health::{HealthFault, HealthPolicy, SlotStatus};
pub use manager::{
    ArmingCheckError, DetectionReport, RpmError, RpmManager, RpmSnapshot, SlotDetection,
    SlotSnapshot,
};
pub use state::{InstanceCount, InstanceId, Millis, RpmState, SlotWriter};
