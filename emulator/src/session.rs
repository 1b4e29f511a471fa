use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rpm_core::backend::{
    EdgeCapture, EdgePeriod, EngineSample, EngineTelemetry, NotchPeak, NotchTracker, PulseCounter,
    PulseWindow, SensorHardware, SimulatedRotor,
};
use rpm_core::repl::commands::{CommandExecutor, CommandOutcome, EOL};
use rpm_core::telemetry::TelemetryRecorder;
use rpm_core::{
    InstanceConfig, InstanceId, MAX_INSTANCES, Millis, PinId, RpmConfig, RpmManager, RpmType,
};

/// Period of the emulated scheduler tick.
pub const TICK_PERIOD_MS: Millis = 10;

/// Length of one emulated pulse-counting window.
const PULSE_WINDOW_MS: Millis = 500;

/// Peak confidence reported by the emulated notch tracker.
const NOTCH_CONFIDENCE: f32 = 0.9;

const MICROS_PER_MINUTE: f32 = 60_000_000.0;

/// Rotor speeds each profile starts with, per slot.
const INITIAL_ROTOR_RPM: [f32; MAX_INSTANCES] = [1_500.0, 3_000.0, 4_500.0, 6_000.0];

pub const LOCAL_COMMANDS: &[(&str, &str)] = &[
    ("tick", "tick <ms>           - advance emulated time"),
    ("sim", "sim <n> <rpm|off>   - set or stop the rotor feeding slot n"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Single,
    Dual,
    Mixed,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Single => "transcripts/emulator-single.log",
            TranscriptProfile::Dual => "transcripts/emulator-dual.log",
            TranscriptProfile::Mixed => "transcripts/emulator-mixed.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Single => "RPM Emulator single-sensor transcript",
            TranscriptProfile::Dual => "RPM Emulator dual-sensor transcript",
            TranscriptProfile::Mixed => "RPM Emulator mixed-backend transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("single") {
            Ok(Self::Single)
        } else if tag.eq_ignore_ascii_case("dual") {
            Ok(Self::Dual)
        } else if tag.eq_ignore_ascii_case("mixed") {
            Ok(Self::Mixed)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }

    /// Slot layout the profile boots with.
    pub fn config(self) -> RpmConfig {
        let slot = |kind, pin: Option<u8>| InstanceConfig::new(kind, pin.map(PinId::new), 1.0);
        let base = RpmConfig::new();
        match self {
            TranscriptProfile::Single => base.with_instance(0, slot(RpmType::Sim, None)),
            TranscriptProfile::Dual => base
                .with_instance(0, slot(RpmType::Sim, None))
                .with_instance(1, slot(RpmType::Pin, Some(50))),
            TranscriptProfile::Mixed => base
                .with_instance(0, slot(RpmType::Pwm, Some(50)))
                .with_instance(1, slot(RpmType::Pin, Some(51)))
                .with_instance(2, slot(RpmType::Efi, None))
                .with_instance(3, slot(RpmType::HarmonicNotch, None)),
        }
    }
}

/// Emulated rotors shared by every source the hardware hands out.
struct Bench {
    now: Millis,
    rotors: [Option<f32>; MAX_INSTANCES],
    window_start: [Millis; MAX_INSTANCES],
    pulse_residue: [f32; MAX_INSTANCES],
}

impl Bench {
    fn new() -> Self {
        Self {
            now: 0,
            rotors: INITIAL_ROTOR_RPM.map(Some),
            window_start: [0; MAX_INSTANCES],
            pulse_residue: [0.0; MAX_INSTANCES],
        }
    }
}

/// Hardware whose every source is driven by the emulated bench.
pub struct BenchHardware {
    bench: Rc<RefCell<Bench>>,
}

pub struct BenchSource {
    bench: Rc<RefCell<Bench>>,
    slot: usize,
}

impl BenchHardware {
    fn source(&self, instance: InstanceId) -> BenchSource {
        BenchSource {
            bench: Rc::clone(&self.bench),
            slot: instance.as_index(),
        }
    }
}

impl SensorHardware for BenchHardware {
    type PulseCounter = BenchSource;
    type EdgeCapture = BenchSource;
    type EngineTelemetry = BenchSource;
    type NotchTracker = BenchSource;
    type SimulatedRotor = BenchSource;

    fn pulse_counter(&mut self, instance: InstanceId, _pin: Option<PinId>) -> Option<BenchSource> {
        let source = self.source(instance);
        {
            let mut bench = self.bench.borrow_mut();
            bench.window_start[source.slot] = bench.now;
            bench.pulse_residue[source.slot] = 0.0;
        }
        Some(source)
    }

    fn edge_capture(&mut self, instance: InstanceId, _pin: Option<PinId>) -> Option<BenchSource> {
        Some(self.source(instance))
    }

    fn engine_telemetry(&mut self, instance: InstanceId) -> Option<BenchSource> {
        Some(self.source(instance))
    }

    fn notch_tracker(&mut self, instance: InstanceId) -> Option<BenchSource> {
        Some(self.source(instance))
    }

    fn simulated_rotor(&mut self, instance: InstanceId) -> Option<BenchSource> {
        Some(self.source(instance))
    }
}

impl BenchSource {
    fn rotor(&self) -> Option<f32> {
        self.bench.borrow().rotors[self.slot]
    }
}

impl PulseCounter for BenchSource {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn take_window(&mut self) -> Option<PulseWindow> {
        let mut bench = self.bench.borrow_mut();
        let elapsed = bench.now.wrapping_sub(bench.window_start[self.slot]);
        if elapsed < PULSE_WINDOW_MS {
            return None;
        }
        bench.window_start[self.slot] = bench.now;

        let window_us = elapsed.saturating_mul(1_000);
        let rpm = bench.rotors[self.slot].unwrap_or(0.0).max(0.0);
        let exact = bench.pulse_residue[self.slot] + rpm * window_us as f32 / MICROS_PER_MINUTE;
        let pulses = exact.floor();
        bench.pulse_residue[self.slot] = exact - pulses;

        Some(PulseWindow {
            pulses: pulses as u32,
            window_us,
        })
    }
}

impl EdgeCapture for BenchSource {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn latest_period(&mut self) -> Option<EdgePeriod> {
        let rpm = self.rotor().filter(|rpm| *rpm > 0.0)?;
        Some(EdgePeriod {
            period_us: (MICROS_PER_MINUTE / rpm).round() as u32,
            jitter_us: 0,
            sequence: self.bench.borrow().now,
        })
    }
}

impl EngineTelemetry for BenchSource {
    fn engine_rpm(&mut self) -> Option<EngineSample> {
        let rpm = self.rotor()?;
        Some(EngineSample {
            rpm,
            updated_ms: self.bench.borrow().now,
        })
    }
}

impl NotchTracker for BenchSource {
    fn peak_frequency(&mut self) -> Option<NotchPeak> {
        let rpm = self.rotor()?;
        Some(NotchPeak {
            hz: rpm / 60.0,
            confidence: NOTCH_CONFIDENCE,
        })
    }
}

impl SimulatedRotor for BenchSource {
    fn rotor_rpm(&mut self, _instance: InstanceId) -> Option<f32> {
        self.rotor()
    }
}

pub struct Session {
    executor: CommandExecutor<RpmManager<BenchHardware>>,
    bench: Rc<RefCell<Bench>>,
    telemetry: TelemetryRecorder,
    transcript: TranscriptLogger,
    now: Millis,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let bench = Rc::new(RefCell::new(Bench::new()));
        let hardware = BenchHardware {
            bench: Rc::clone(&bench),
        };
        let manager = RpmManager::new(profile.config(), hardware);

        Ok(Self {
            executor: CommandExecutor::new(manager),
            bench,
            telemetry: TelemetryRecorder::new(),
            transcript,
            now: 0,
        })
    }

    /// Runs initial detection and returns the rendered report.
    pub fn boot(&mut self) -> io::Result<Vec<String>> {
        let report = self.executor.console_mut().init();
        let written = self.telemetry.record_detection(&report, self.now);
        let mut lines = render(&CommandOutcome::Detected(report));
        lines.extend(self.drain_telemetry(written));
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    /// Boots the bench and serves console lines from `input` until `exit`,
    /// `quit` or end of input, echoing a time-stamped prompt before each line.
    pub fn serve<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        writeln!(output, "RPM Emulator ready. Type `help` for commands or `exit` to quit.")?;
        for line in self.boot()? {
            writeln!(output, "{line}")?;
        }

        let mut lines = input.lines();
        loop {
            write!(output, "[{}ms] > ", self.now)?;
            output.flush()?;

            let Some(line) = lines.next().transpose()? else {
                writeln!(output)?;
                return Ok(());
            };
            let command = line.trim();
            if ["exit", "quit"]
                .iter()
                .any(|word| command.eq_ignore_ascii_case(word))
            {
                writeln!(output, "Session closed.")?;
                return Ok(());
            }

            for response in self.handle_command(command)? {
                writeln!(output, "{response}")?;
            }
        }
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript
            .append_line(self.elapsed(), TranscriptRole::Host, trimmed)?;

        let lines = match local_command(trimmed) {
            Some(Ok(LocalCommand::Tick(ms))) => self.advance(ms),
            Some(Ok(LocalCommand::Sim { index, rpm })) => self.set_rotor(index, rpm),
            Some(Err(message)) => vec![format!("error: {message}")],
            None => self.execute(trimmed),
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn execute(&mut self, line: &str) -> Vec<String> {
        let outcome = match self.executor.execute(line, self.now) {
            Ok(outcome) => outcome,
            Err(error) => return vec![format!("error: {error}")],
        };

        let mut lines = render(&outcome);
        match &outcome {
            CommandOutcome::Detected(report) => {
                let written = self.telemetry.record_detection(report, self.now);
                lines.extend(self.drain_telemetry(written));
            }
            CommandOutcome::ParamSet(change) => {
                self.telemetry.record_param_change(change, self.now);
                lines.extend(self.drain_telemetry(1));
            }
            CommandOutcome::Help { topic: None } => {
                lines.extend(LOCAL_COMMANDS.iter().map(|(_, usage)| (*usage).to_string()));
            }
            _ => {}
        }
        lines
    }

    /// Steps emulated time forward one scheduler tick at a time.
    fn advance(&mut self, ms: Millis) -> Vec<String> {
        let target = self.now.saturating_add(ms);
        let mut lines = Vec::new();
        while self.now < target {
            self.now = self.now.saturating_add(TICK_PERIOD_MS).min(target);
            self.bench.borrow_mut().now = self.now;

            let manager = self.executor.console_mut();
            manager.update(self.now);
            let snapshot = manager.snapshot(self.now);
            let written = self.telemetry.observe(&snapshot);
            lines.extend(self.drain_telemetry(written));
        }
        lines.push(format!("t={}ms", self.now));
        lines
    }

    fn set_rotor(&mut self, index: u8, rpm: Option<f32>) -> Vec<String> {
        let Some(id) = index.checked_sub(1).and_then(InstanceId::new) else {
            return vec![format!("error: no slot {index}")];
        };
        self.bench.borrow_mut().rotors[id.as_index()] = rpm;
        match rpm {
            Some(rpm) => vec![format!("{id} rotor={rpm:.1}")],
            None => vec![format!("{id} rotor=off")],
        }
    }

    fn drain_telemetry(&self, count: usize) -> Vec<String> {
        let skip = self.telemetry.len().saturating_sub(count);
        self.telemetry
            .oldest_first()
            .skip(skip)
            .map(|record| {
                format!(
                    "telemetry:rpm #{} {} t={}ms",
                    record.id, record.event, record.timestamp
                )
            })
            .collect()
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis(u64::from(self.now))
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum LocalCommand {
    Tick(Millis),
    Sim { index: u8, rpm: Option<f32> },
}

/// Recognises emulator-only commands; everything else goes to the console.
fn local_command(line: &str) -> Option<Result<LocalCommand, String>> {
    let mut words = line.split_whitespace();
    let keyword = words.next()?;
    let args: Vec<&str> = words.collect();

    if keyword.eq_ignore_ascii_case("tick") {
        let parsed = match args.as_slice() {
            [ms] => ms
                .parse::<Millis>()
                .map(LocalCommand::Tick)
                .map_err(|_| format!("invalid duration `{ms}`")),
            _ => Err("usage: tick <ms>".to_string()),
        };
        return Some(parsed);
    }

    if keyword.eq_ignore_ascii_case("sim") {
        let parsed = match args.as_slice() {
            [index, rpm] => match index.parse::<u8>() {
                Ok(index) if rpm.eq_ignore_ascii_case("off") => {
                    Ok(LocalCommand::Sim { index, rpm: None })
                }
                Ok(index) => rpm
                    .parse::<f32>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(|value| LocalCommand::Sim {
                        index,
                        rpm: Some(value),
                    })
                    .ok_or_else(|| format!("invalid rpm `{rpm}`")),
                Err(_) => Err(format!("invalid slot `{index}`")),
            },
            _ => Err("usage: sim <n> <rpm|off>".to_string()),
        };
        return Some(parsed);
    }

    None
}

fn render(outcome: &CommandOutcome) -> Vec<String> {
    let mut buffer = String::new();
    // Writing into a String cannot fail.
    let _ = outcome.write_lines(&mut buffer);
    buffer
        .split(EOL)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are emulated milliseconds since boot"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
