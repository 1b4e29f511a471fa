//! Shared text rendering for sensor readings.
//!
//! [`ReadingFormatter`] keeps the console output identical across the
//! firmware and the emulator. Each `write_*` method emits exactly one line
//! without a terminator.

use core::fmt;

use crate::health::SlotStatus;
use crate::manager::{ArmingCheckError, RpmSnapshot, SlotSnapshot};
use crate::state::InstanceId;

/// Renders an [`RpmSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct ReadingFormatter<'a> {
    snapshot: &'a RpmSnapshot,
}

impl<'a> ReadingFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a RpmSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes one slot (e.g. `rpm1 pwm fresh rpm=2000.0 q=0.90 age=+12ms ok`).
    pub fn write_slot_line<W: fmt::Write>(
        &self,
        writer: &mut W,
        instance: InstanceId,
    ) -> fmt::Result {
        let slot = self.snapshot.slot(instance);
        write!(writer, "{instance}")?;

        let Some(kind) = slot.kind else {
            return writer.write_str(" disabled");
        };

        write!(writer, " {kind} {}", slot.status)?;
        if slot.status == SlotStatus::ActiveUnread {
            return writer.write_str(" no-data");
        }

        write!(writer, " rpm={:.1} q={:.2} age=", slot.rpm, slot.quality)?;
        write_age(writer, slot.age_ms)?;
        write_health(writer, slot)
    }

    /// Writes the aggregate line (e.g. `sensors active=2 healthy=1`).
    pub fn write_summary_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let active = self
            .snapshot
            .slots
            .iter()
            .filter(|slot| slot.kind.is_some())
            .count();
        let healthy = self
            .snapshot
            .slots
            .iter()
            .filter(|slot| slot.is_healthy())
            .count();

        write!(writer, "sensors active={active} healthy={healthy}")
    }
}

/// Writes the pre-arm line (e.g. `prearm ok` or `prearm fail: rpm1: no pin set`).
pub fn write_arming_line<W: fmt::Write>(
    writer: &mut W,
    result: Result<(), ArmingCheckError>,
) -> fmt::Result {
    match result {
        Ok(()) => writer.write_str("prearm ok"),
        Err(error) => write!(writer, "prearm fail: {error}"),
    }
}

fn write_health<W: fmt::Write>(writer: &mut W, slot: &SlotSnapshot) -> fmt::Result {
    match slot.health {
        Ok(_) => writer.write_str(" ok"),
        Err(fault) => write!(writer, " unhealthy ({fault})"),
    }
}

fn write_age<W: fmt::Write>(writer: &mut W, age_ms: Option<u32>) -> fmt::Result {
    match age_ms {
        None => writer.write_str("n/a"),
        Some(millis) if millis >= 1_000 => {
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(millis) => write!(writer, "+{millis}ms"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpmType;
    use crate::health::HealthFault;
    use heapless::String;

    fn snapshot() -> RpmSnapshot {
        let mut slots = InstanceId::ALL.map(|instance| SlotSnapshot {
            instance,
            kind: None,
            status: SlotStatus::Disabled,
            rpm: 0.0,
            quality: 0.0,
            age_ms: None,
            health: Err(HealthFault::Disabled),
        });
        slots[0] = SlotSnapshot {
            kind: Some(RpmType::Pwm),
            status: SlotStatus::ActiveFresh,
            rpm: 2_000.0,
            quality: 0.9,
            age_ms: Some(12),
            health: Ok(2_000.0),
            ..slots[0]
        };
        slots[1] = SlotSnapshot {
            kind: Some(RpmType::Efi),
            status: SlotStatus::ActiveStale,
            rpm: 900.0,
            quality: 1.0,
            age_ms: Some(1_250),
            health: Err(HealthFault::Stale { age_ms: 1_250 }),
            ..slots[1]
        };
        slots[2] = SlotSnapshot {
            kind: Some(RpmType::Sim),
            status: SlotStatus::ActiveUnread,
            health: Err(HealthFault::NoReading),
            ..slots[2]
        };
        RpmSnapshot {
            taken_at: 5_000,
            slots,
        }
    }

    fn render(instance: InstanceId) -> String<96> {
        let snapshot = snapshot();
        let mut line = String::new();
        ReadingFormatter::new(&snapshot)
            .write_slot_line(&mut line, instance)
            .expect("line fits");
        line
    }

    #[test]
    fn renders_each_slot_state() {
        assert_eq!(
            render(InstanceId::ALL[0]).as_str(),
            "rpm1 pwm fresh rpm=2000.0 q=0.90 age=+12ms ok"
        );
        assert_eq!(
            render(InstanceId::ALL[1]).as_str(),
            "rpm2 efi stale rpm=900.0 q=1.00 age=+1.2s unhealthy (stale (1250 ms))"
        );
        assert_eq!(render(InstanceId::ALL[2]).as_str(), "rpm3 sim unread no-data");
        assert_eq!(render(InstanceId::ALL[3]).as_str(), "rpm4 disabled");
    }

    #[test]
    fn renders_summary_and_arming() {
        let snapshot = snapshot();
        let mut line: String<64> = String::new();
        ReadingFormatter::new(&snapshot)
            .write_summary_line(&mut line)
            .expect("line fits");
        assert_eq!(line.as_str(), "sensors active=3 healthy=1");

        let mut line: String<64> = String::new();
        write_arming_line(
            &mut line,
            Err(ArmingCheckError::MissingPin {
                instance: InstanceId::ALL[0],
            }),
        )
        .expect("line fits");
        assert_eq!(line.as_str(), "prearm fail: rpm1: no pin set");
    }
}
