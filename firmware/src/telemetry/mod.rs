//! Telemetry ring plus log mirroring for the firmware.
//!
//! Records land in the shared [`TelemetryRecorder`] ring; every newly written
//! record is also emitted over defmt (or stdout on host builds) so bring-up
//! does not need a ring dump.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use rpm_core::params::{ParamChange, ParamKey};
use rpm_core::telemetry::{
    EventId, TELEMETRY_RING_CAPACITY, TelemetryPayload, TelemetryRecord, TelemetryRecorder,
};
use rpm_core::{DetectionReport, Millis, RpmSnapshot};

/// Ring recorder that logs each record as it is written.
pub struct FirmwareTelemetry {
    recorder: TelemetryRecorder<TELEMETRY_RING_CAPACITY>,
}

impl FirmwareTelemetry {
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &TelemetryRecorder<TELEMETRY_RING_CAPACITY> {
        &self.recorder
    }

    /// Records detection results and restarts health tracking.
    pub fn record_detection(&mut self, report: &DetectionReport, timestamp: Millis) -> usize {
        let written = self.recorder.record_detection(report, timestamp);
        self.log_latest(written);
        written
    }

    /// Records health transitions between the previous and current snapshot.
    pub fn observe(&mut self, snapshot: &RpmSnapshot) -> usize {
        let written = self.recorder.observe(snapshot);
        self.log_latest(written);
        written
    }

    pub fn record_param_change(&mut self, change: &ParamChange, timestamp: Millis) -> EventId {
        let id = self.recorder.record_param_change(change, timestamp);
        self.log_latest(1);
        id
    }

    fn log_latest(&self, count: usize) {
        let skip = self.recorder.len().saturating_sub(count);
        for record in self.recorder.oldest_first().skip(skip) {
            log_record(record);
        }
    }
}

impl Default for FirmwareTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable rendering of a record's payload.
pub struct PayloadDetail<'a>(pub &'a TelemetryPayload);

impl fmt::Display for PayloadDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Detection(detection) => {
                write!(f, "type={}", detection.raw_type)?;
                if let Some(kind) = detection.kind {
                    write!(f, " ({kind})")?;
                }
                if !detection.has_source {
                    f.write_str(" no-source")?;
                }
                Ok(())
            }
            TelemetryPayload::Health(health) => {
                write!(f, "rpm={:.1} q={:.2}", health.rpm, health.quality)?;
                match health.fault {
                    Some(fault) => write!(f, " fault={fault}"),
                    None => Ok(()),
                }
            }
            TelemetryPayload::Param(param) => {
                match param.key {
                    ParamKey::Type(id) => write!(f, "{id} type")?,
                    ParamKey::Pin(id) => write!(f, "{id} pin")?,
                    ParamKey::Scaling(id) => write!(f, "{id} scaling")?,
                    ParamKey::Maximum => f.write_str("maximum")?,
                    ParamKey::Minimum => f.write_str("minimum")?,
                    ParamKey::QualityMin => f.write_str("quality-min")?,
                    ParamKey::TimeoutMs => f.write_str("timeout")?,
                }
                if param.requires_detection {
                    f.write_str(" (detect pending)")?;
                }
                Ok(())
            }
        }
    }
}

fn log_record(record: &TelemetryRecord) {
    emit_log(record, &PayloadDetail(&record.details));
}

#[cfg(target_os = "none")]
fn emit_log(record: &TelemetryRecord, detail: &PayloadDetail<'_>) {
    defmt::info!(
        "telemetry:rpm #{} {} t={}ms {}",
        record.id,
        defmt::Display2Format(&record.event),
        record.timestamp,
        defmt::Display2Format(detail)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &TelemetryRecord, detail: &PayloadDetail<'_>) {
    println!(
        "telemetry:rpm #{} {} t={}ms {}",
        record.id, record.event, record.timestamp, detail
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpm_core::health::HealthFault;
    use rpm_core::telemetry::{DetectionTelemetry, HealthTelemetry, TelemetryEventKind};
    use rpm_core::{InstanceConfig, InstanceId, RpmConfig, RpmManager, RpmType, params};

    use crate::sensors::BoardHardware;

    fn fixed_clock() -> u32 {
        0
    }

    #[test]
    fn detection_and_health_transitions_are_recorded() {
        let config = RpmConfig::new().with_instance(3, InstanceConfig::new(RpmType::Sim, None, 1.0));
        let mut manager = RpmManager::new(config, BoardHardware::new(fixed_clock));
        let mut telemetry = FirmwareTelemetry::new();

        let report = manager.init();
        assert_eq!(telemetry.record_detection(&report, 0), 1);

        manager.update(10);
        assert_eq!(telemetry.observe(&manager.snapshot(10)), 1);
        assert_eq!(telemetry.observe(&manager.snapshot(20)), 0);
        assert_eq!(
            telemetry.recorder().latest().map(|record| record.event),
            Some(TelemetryEventKind::SensorHealthy(InstanceId::ALL[3]))
        );
    }

    #[test]
    fn param_changes_are_recorded() {
        let mut config = RpmConfig::new();
        let mut telemetry = FirmwareTelemetry::new();
        let change = params::set(&mut config, "RPM2_PIN", "51").expect("valid pin");

        let id = telemetry.record_param_change(&change, 40);

        let record = telemetry.recorder().latest().copied().expect("record written");
        assert_eq!(record.id, id);
        assert_eq!(record.event, TelemetryEventKind::ParamChanged);
        assert_eq!(
            PayloadDetail(&record.details).to_string(),
            "rpm2 pin (detect pending)"
        );
    }

    #[test]
    fn payload_details_render_compactly() {
        let detection = TelemetryPayload::Detection(DetectionTelemetry {
            raw_type: 2,
            kind: Some(RpmType::Pin),
            has_source: false,
        });
        assert_eq!(PayloadDetail(&detection).to_string(), "type=2 (pin) no-source");

        let health = TelemetryPayload::Health(HealthTelemetry {
            rpm: 950.0,
            quality: 0.4,
            fault: Some(HealthFault::LowQuality { quality: 0.4 }),
        });
        let rendered = PayloadDetail(&health).to_string();
        assert!(rendered.starts_with("rpm=950.0 q=0.40 fault="), "{rendered}");

        assert_eq!(PayloadDetail(&TelemetryPayload::None).to_string(), "");
    }
}
