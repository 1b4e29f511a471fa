//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! Events carry compact numeric codes so they can be mirrored over diagnostics
//! channels. Payloads keep the extra metadata the console and transcript
//! tooling print while remaining `no_std` compatible.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::config::{MAX_INSTANCES, RpmType};
use crate::health::HealthFault;
use crate::manager::{DetectionReport, RpmSnapshot, SlotDetection};
use crate::params::{ParamChange, ParamKey};
use crate::state::{InstanceId, Millis};

/// Monotonic identifier assigned to each record. Wraps on overflow.
pub type EventId = u32;

/// Records kept before the oldest is overwritten.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    SensorDetected(InstanceId),
    UnsupportedType(InstanceId),
    SensorHealthy(InstanceId),
    SensorUnhealthy(InstanceId),
    ParamChanged,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::SensorDetected(id) => write!(f, "sensor-detected {id}"),
            TelemetryEventKind::UnsupportedType(id) => write!(f, "unsupported-type {id}"),
            TelemetryEventKind::SensorHealthy(id) => write!(f, "sensor-healthy {id}"),
            TelemetryEventKind::SensorUnhealthy(id) => write!(f, "sensor-unhealthy {id}"),
            TelemetryEventKind::ParamChanged => f.write_str("param-changed"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const DETECTED_BASE: u16 = 0x0000;
    const UNSUPPORTED_BASE: u16 = 0x0004;
    const HEALTHY_BASE: u16 = 0x0008;
    const UNHEALTHY_BASE: u16 = 0x000C;
    const PARAM_CHANGED_CODE: u16 = 0x0010;

    /// Packs the event into one `u16`, slot in the low bits.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::SensorDetected(id) => Self::DETECTED_BASE + id.get() as u16,
            TelemetryEventKind::UnsupportedType(id) => Self::UNSUPPORTED_BASE + id.get() as u16,
            TelemetryEventKind::SensorHealthy(id) => Self::HEALTHY_BASE + id.get() as u16,
            TelemetryEventKind::SensorUnhealthy(id) => Self::UNHEALTHY_BASE + id.get() as u16,
            TelemetryEventKind::ParamChanged => Self::PARAM_CHANGED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let slot = |base: u16| u8::try_from(code - base).ok().and_then(InstanceId::new);

        match code {
            Self::PARAM_CHANGED_CODE => TelemetryEventKind::ParamChanged,
            value if (Self::DETECTED_BASE..Self::UNSUPPORTED_BASE).contains(&value) => {
                slot(Self::DETECTED_BASE).map_or(TelemetryEventKind::Custom(value), |id| {
                    TelemetryEventKind::SensorDetected(id)
                })
            }
            value if (Self::UNSUPPORTED_BASE..Self::HEALTHY_BASE).contains(&value) => {
                slot(Self::UNSUPPORTED_BASE).map_or(TelemetryEventKind::Custom(value), |id| {
                    TelemetryEventKind::UnsupportedType(id)
                })
            }
            value if (Self::HEALTHY_BASE..Self::UNHEALTHY_BASE).contains(&value) => {
                slot(Self::HEALTHY_BASE).map_or(TelemetryEventKind::Custom(value), |id| {
                    TelemetryEventKind::SensorHealthy(id)
                })
            }
            value if (Self::UNHEALTHY_BASE..Self::PARAM_CHANGED_CODE).contains(&value) => {
                slot(Self::UNHEALTHY_BASE).map_or(TelemetryEventKind::Custom(value), |id| {
                    TelemetryEventKind::SensorUnhealthy(id)
                })
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Event-specific detail.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    /// Nothing beyond the event itself.
    None,
    /// Detection outcome for a slot.
    Detection(DetectionTelemetry),
    /// Reading at the moment a slot changed health.
    Health(HealthTelemetry),
    /// Parameter write.
    Param(ParamTelemetry),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectionTelemetry {
    pub raw_type: u8,
    pub kind: Option<RpmType>,
    pub has_source: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HealthTelemetry {
    pub rpm: f32,
    pub quality: f32,
    pub fault: Option<HealthFault>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParamTelemetry {
    pub key: ParamKey,
    pub requires_detection: bool,
}

/// One ring entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Millis,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Append-only event ring that also tracks per-slot health for `observe`.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    last_healthy: [Option<bool>; MAX_INSTANCES],
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Empty recorder; every slot starts with unknown health.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_healthy: [None; MAX_INSTANCES],
            next_event_id: 0,
        }
    }

    /// Records from oldest to newest.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Newest record.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Appends a record and returns its id.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Millis,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Records one event per detected or rejected slot and restarts health tracking.
    ///
    /// Returns the number of events written.
    pub fn record_detection(&mut self, report: &DetectionReport, timestamp: Millis) -> usize {
        let mut written = 0;
        for (id, outcome) in report.iter() {
            let index = id.as_index();
            let (event, details) = match outcome {
                SlotDetection::Disabled => {
                    self.last_healthy[index] = None;
                    continue;
                }
                SlotDetection::Detected { kind, has_source } => {
                    self.last_healthy[index] = Some(false);
                    (
                        TelemetryEventKind::SensorDetected(id),
                        DetectionTelemetry {
                            raw_type: kind.to_raw(),
                            kind: Some(kind),
                            has_source,
                        },
                    )
                }
                SlotDetection::Unsupported { code } => {
                    self.last_healthy[index] = None;
                    (
                        TelemetryEventKind::UnsupportedType(id),
                        DetectionTelemetry {
                            raw_type: code,
                            kind: None,
                            has_source: false,
                        },
                    )
                }
            };

            self.record(event, TelemetryPayload::Detection(details), timestamp);
            written += 1;
        }
        written
    }

    /// Records a parameter write.
    pub fn record_param_change(&mut self, change: &ParamChange, timestamp: Millis) -> EventId {
        self.record(
            TelemetryEventKind::ParamChanged,
            TelemetryPayload::Param(ParamTelemetry {
                key: change.spec.key,
                requires_detection: change.requires_detection(),
            }),
            timestamp,
        )
    }

    /// Diffs `snapshot` against the previous observation and records health transitions.
    ///
    /// Active slots start out unhealthy, so the first healthy reading after
    /// detection is recorded. Returns the number of events written.
    pub fn observe(&mut self, snapshot: &RpmSnapshot) -> usize {
        let mut written = 0;
        for slot in &snapshot.slots {
            let index = slot.instance.as_index();
            if slot.kind.is_none() {
                self.last_healthy[index] = None;
                continue;
            }

            let healthy = slot.is_healthy();
            let previous = self.last_healthy[index].unwrap_or(false);
            self.last_healthy[index] = Some(healthy);
            if healthy == previous {
                continue;
            }

            let event = if healthy {
                TelemetryEventKind::SensorHealthy(slot.instance)
            } else {
                TelemetryEventKind::SensorUnhealthy(slot.instance)
            };
            let details = HealthTelemetry {
                rpm: slot.rpm,
                quality: slot.quality,
                fault: slot.health.err(),
            };
            self.record(event, TelemetryPayload::Health(details), snapshot.taken_at);
            written += 1;
        }
        written
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::SlotStatus;
    use crate::manager::SlotSnapshot;
    use crate::state::InstanceCount;

    fn snapshot(taken_at: Millis, health: [Option<Result<f32, HealthFault>>; 4]) -> RpmSnapshot {
        let mut slots = InstanceId::ALL.map(|instance| SlotSnapshot {
            instance,
            kind: None,
            status: SlotStatus::Disabled,
            rpm: 0.0,
            quality: 0.0,
            age_ms: None,
            health: Err(HealthFault::Disabled),
        });
        for (slot, health) in slots.iter_mut().zip(health) {
            if let Some(health) = health {
                slot.kind = Some(RpmType::Sim);
                slot.status = SlotStatus::ActiveFresh;
                slot.rpm = health.unwrap_or(0.0);
                slot.quality = 0.5;
                slot.age_ms = Some(0);
                slot.health = health;
            }
        }
        RpmSnapshot { taken_at, slots }
    }

    #[test]
    fn event_codes_round_trip() {
        let fixtures = [
            (TelemetryEventKind::SensorDetected(InstanceId::ALL[0]), 0x00),
            (TelemetryEventKind::UnsupportedType(InstanceId::ALL[3]), 0x07),
            (TelemetryEventKind::SensorHealthy(InstanceId::ALL[1]), 0x09),
            (TelemetryEventKind::SensorUnhealthy(InstanceId::ALL[2]), 0x0E),
            (TelemetryEventKind::ParamChanged, 0x10),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code);
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0xA5),
            TelemetryEventKind::Custom(0xA5)
        );
    }

    #[test]
    fn detection_report_produces_events() {
        let report = DetectionReport {
            slots: [
                SlotDetection::Detected {
                    kind: RpmType::Efi,
                    has_source: true,
                },
                SlotDetection::Disabled,
                SlotDetection::Unsupported { code: 9 },
                SlotDetection::Disabled,
            ],
            active: InstanceCount::new(1).expect("valid count"),
        };

        let mut recorder = TelemetryRecorder::<8>::new();
        assert_eq!(recorder.record_detection(&report, 5), 2);

        let events: heapless::Vec<TelemetryEventKind, 8> =
            recorder.oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events.as_slice(),
            &[
                TelemetryEventKind::SensorDetected(InstanceId::ALL[0]),
                TelemetryEventKind::UnsupportedType(InstanceId::ALL[2]),
            ]
        );

        match recorder.latest().map(|record| record.details) {
            Some(TelemetryPayload::Detection(details)) => {
                assert_eq!(details.raw_type, 9);
                assert_eq!(details.kind, None);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn observe_records_only_transitions() {
        let mut recorder = TelemetryRecorder::<8>::new();

        let unread = snapshot(0, [Some(Err(HealthFault::NoReading)), None, None, None]);
        assert_eq!(recorder.observe(&unread), 0);

        let fresh = snapshot(10, [Some(Ok(1_500.0)), None, None, None]);
        assert_eq!(recorder.observe(&fresh), 1);
        assert_eq!(recorder.observe(&fresh), 0);

        let stale_fault = HealthFault::Stale { age_ms: 1_990 };
        let stale = snapshot(2_000, [Some(Err(stale_fault)), None, None, None]);
        assert_eq!(recorder.observe(&stale), 1);

        let record = recorder.latest().copied().expect("transition recorded");
        assert_eq!(record.id, 1);
        assert_eq!(record.timestamp, 2_000);
        assert_eq!(
            record.event,
            TelemetryEventKind::SensorUnhealthy(InstanceId::ALL[0])
        );
        match record.details {
            TelemetryPayload::Health(details) => {
                assert!(matches!(details.fault, Some(HealthFault::Stale { .. })));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<2>::new();
        for code in 0..3 {
            recorder.record(
                TelemetryEventKind::Custom(0x100 + code),
                TelemetryPayload::none(),
                0,
            );
        }
        assert_eq!(recorder.len(), 2);
        let first = recorder.oldest_first().next().copied().expect("oldest entry");
        assert_eq!(first.id, 1);
    }
}
