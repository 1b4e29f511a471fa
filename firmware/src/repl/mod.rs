//! Operator console session for the USB CDC link.
//!
//! Bytes arriving from the host are assembled into lines and executed through
//! the shared [`CommandExecutor`]. The manager lives behind a blocking mutex,
//! so [`LockedConsole`] takes the lock once per console operation and never
//! across an await point.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::cell::RefCell;
use core::{fmt, mem, str};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use rpm_core::backend::SensorHardware;
use rpm_core::params::{self, ParamChange, ParamError};
use rpm_core::repl::commands::{CommandExecutor, EOL, SensorConsole};
use rpm_core::{ArmingCheckError, DetectionReport, Millis, RpmConfig, RpmManager, RpmSnapshot};

use crate::telemetry::FirmwareTelemetry;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Largest rendered response for a single line.
pub const OUTPUT_CAPACITY: usize = 768;

/// Size of one USB transfer carrying console bytes.
pub const FRAME_LEN: usize = 64;

/// Chunk of console bytes moving between the USB task and the session.
pub type ReplFrame = Vec<u8, FRAME_LEN>;

/// Prompt written after every processed line.
pub const PROMPT: &str = "> ";

/// Errors surfaced by the session itself. Command failures are rendered to the
/// operator instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplError {
    /// Assembled line was not UTF-8.
    InvalidUtf8,
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was discarded.
    LineOverflow,
    /// Response did not fit the output buffer.
    OutputOverflow,
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
            ReplError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
            ReplError::OutputOverflow => f.write_str("response truncated"),
        }
    }
}

impl From<fmt::Error> for ReplError {
    fn from(_: fmt::Error) -> Self {
        ReplError::OutputOverflow
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Disconnected,
    Connected,
}

/// Line-oriented console session.
pub struct ReplSession<C> {
    executor: CommandExecutor<C>,
    buffer: Vec<u8, MAX_LINE_LEN>,
    state: SessionState,
}

impl<C> ReplSession<C>
where
    C: SensorConsole,
{
    pub fn new(console: C) -> Self {
        Self {
            executor: CommandExecutor::new(console),
            buffer: Vec::new(),
            state: SessionState::Disconnected,
        }
    }

    /// Marks the host as attached and writes the first prompt.
    pub fn on_connect<W: fmt::Write>(&mut self, out: &mut W) -> Result<(), ReplError> {
        self.state = SessionState::Connected;
        self.buffer.clear();
        out.write_str(PROMPT)?;
        Ok(())
    }

    pub fn on_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.buffer.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Feeds one byte. A line terminator executes the buffered line and writes
    /// the response followed by a fresh prompt into `out`.
    pub fn ingest<W: fmt::Write>(
        &mut self,
        byte: u8,
        now: Millis,
        out: &mut W,
    ) -> Result<(), ReplError> {
        if self.state != SessionState::Connected {
            return Ok(());
        }

        match byte {
            b'\r' | b'\n' => self.process_line(now, out),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(())
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.buffer.clear();
                    return Err(ReplError::LineOverflow);
                }
                Ok(())
            }
        }
    }

    fn process_line<W: fmt::Write>(&mut self, now: Millis, out: &mut W) -> Result<(), ReplError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let line = mem::take(&mut self.buffer);
        let line = str::from_utf8(line.as_slice()).map_err(|_| ReplError::InvalidUtf8)?;
        match self.executor.execute(line, now) {
            Ok(outcome) => outcome.write_lines(out)?,
            Err(error) => write!(out, "error: {error}{EOL}")?,
        }
        out.write_str(PROMPT)?;
        Ok(())
    }
}

/// [`SensorConsole`] over a manager shared with the tick task.
///
/// Parameter writes and detections are mirrored into telemetry.
pub struct LockedConsole<'a, M: RawMutex, H: SensorHardware> {
    manager: &'a Mutex<M, RefCell<RpmManager<H>>>,
    telemetry: &'a Mutex<M, RefCell<FirmwareTelemetry>>,
    clock: fn() -> Millis,
}

impl<'a, M: RawMutex, H: SensorHardware> LockedConsole<'a, M, H> {
    pub fn new(
        manager: &'a Mutex<M, RefCell<RpmManager<H>>>,
        telemetry: &'a Mutex<M, RefCell<FirmwareTelemetry>>,
        clock: fn() -> Millis,
    ) -> Self {
        Self {
            manager,
            telemetry,
            clock,
        }
    }

    fn with_manager<R>(&self, f: impl FnOnce(&mut RpmManager<H>) -> R) -> R {
        self.manager.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn with_telemetry(&self, f: impl FnOnce(&mut FirmwareTelemetry)) {
        self.telemetry.lock(|cell| f(&mut cell.borrow_mut()));
    }
}

impl<M: RawMutex, H: SensorHardware> SensorConsole for LockedConsole<'_, M, H> {
    fn snapshot(&mut self, now: Millis) -> RpmSnapshot {
        self.with_manager(|manager| manager.snapshot(now))
    }

    fn config(&mut self) -> RpmConfig {
        self.with_manager(|manager| *manager.config())
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<ParamChange, ParamError> {
        let change = self.with_manager(|manager| params::set(manager.config_mut(), name, value))?;
        let now = (self.clock)();
        self.with_telemetry(|telemetry| {
            telemetry.record_param_change(&change, now);
        });
        Ok(change)
    }

    fn detect(&mut self) -> DetectionReport {
        let report = self.with_manager(RpmManager::init);
        let now = (self.clock)();
        self.with_telemetry(|telemetry| {
            telemetry.record_detection(&report, now);
        });
        report
    }

    fn arming_checks(&mut self) -> Result<(), ArmingCheckError> {
        self.with_manager(|manager| manager.arming_checks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::String;
    use rpm_core::telemetry::TelemetryEventKind;
    use rpm_core::{InstanceConfig, RpmType};

    use crate::sensors::BoardHardware;

    fn clock() -> u32 {
        0
    }

    fn millis() -> Millis {
        250
    }

    type SharedManager = Mutex<NoopRawMutex, RefCell<RpmManager<BoardHardware>>>;
    type SharedTelemetry = Mutex<NoopRawMutex, RefCell<FirmwareTelemetry>>;

    fn shared() -> (SharedManager, SharedTelemetry) {
        let config = RpmConfig::new().with_instance(0, InstanceConfig::new(RpmType::Sim, None, 1.0));
        let mut manager = RpmManager::new(config, BoardHardware::new(clock));
        manager.init();
        (
            Mutex::new(RefCell::new(manager)),
            Mutex::new(RefCell::new(FirmwareTelemetry::new())),
        )
    }

    fn feed<C: SensorConsole>(
        session: &mut ReplSession<C>,
        bytes: &[u8],
        now: Millis,
    ) -> String<OUTPUT_CAPACITY> {
        let mut out = String::new();
        for byte in bytes {
            session.ingest(*byte, now, &mut out).expect("ingest should succeed");
        }
        out
    }

    #[test]
    fn bytes_are_ignored_until_connected() {
        let (manager, telemetry) = shared();
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));

        assert_eq!(feed(&mut session, b"status\r", 0).as_str(), "");

        let mut banner: String<8> = String::new();
        session.on_connect(&mut banner).expect("prompt fits");
        assert_eq!(banner.as_str(), PROMPT);
        assert!(session.is_connected());
    }

    #[test]
    fn completed_lines_render_through_the_executor() {
        let (manager, telemetry) = shared();
        manager.lock(|cell| cell.borrow_mut().update(100));
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));
        session.on_connect(&mut String::<8>::new()).expect("prompt fits");

        let out = feed(&mut session, b"rpm 1\r\n", 112);
        assert_eq!(
            out.as_str(),
            "rpm1 sim fresh rpm=1500.0 q=0.50 age=+12ms ok\r\n> "
        );
    }

    #[test]
    fn backspace_edits_the_pending_line() {
        let (manager, telemetry) = shared();
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));
        session.on_connect(&mut String::<8>::new()).expect("prompt fits");

        let out = feed(&mut session, b"statux\x7fs\r", 0);
        assert!(out.starts_with("sensors active=1"), "{out}");
    }

    #[test]
    fn command_errors_are_reported_to_the_operator() {
        let (manager, telemetry) = shared();
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));
        session.on_connect(&mut String::<8>::new()).expect("prompt fits");

        let out = feed(&mut session, b"reboot\r", 0);
        assert!(out.starts_with("error: syntax"), "{out}");
        assert!(out.ends_with(PROMPT));
    }

    #[test]
    fn overflow_discards_the_line() {
        let (manager, telemetry) = shared();
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));
        session.on_connect(&mut String::<8>::new()).expect("prompt fits");
        let mut out: String<OUTPUT_CAPACITY> = String::new();

        for _ in 0..MAX_LINE_LEN {
            session.ingest(b'a', 0, &mut out).expect("within limit");
        }
        assert_eq!(session.ingest(b'b', 0, &mut out), Err(ReplError::LineOverflow));

        let out = feed(&mut session, b"\r", 0);
        assert_eq!(out.as_str(), "");
    }

    #[test]
    fn console_writes_reach_the_manager_and_telemetry() {
        let (manager, telemetry) = shared();
        let mut session = ReplSession::new(LockedConsole::new(&manager, &telemetry, millis));
        session.on_connect(&mut String::<8>::new()).expect("prompt fits");

        assert!(manager.lock(|cell| cell.borrow().enabled(0)));
        feed(&mut session, b"param set RPM1_TYPE=0\r", 0);
        assert!(!manager.lock(|cell| cell.borrow().enabled(0)));
        assert_eq!(manager.lock(|cell| cell.borrow().num_sensors()), 1);

        let out = feed(&mut session, b"detect\r", 0);
        assert!(out.contains("active=0"), "{out}");
        assert!(!manager.lock(|cell| cell.borrow().enabled(0)));

        let events = telemetry.lock(|cell| {
            cell.borrow()
                .recorder()
                .oldest_first()
                .map(|record| (record.event, record.timestamp))
                .collect::<std::vec::Vec<_>>()
        });
        assert_eq!(events, [(TelemetryEventKind::ParamChanged, 250)]);
    }
}
