//! High-level console command dispatcher.
//!
//! Parsed commands are executed against any [`SensorConsole`]: the manager
//! itself on host targets, or a lock-guarded handle on the firmware. Outcomes
//! are plain values so every front-end renders them the same way through
//! [`CommandOutcome::write_lines`].

use core::fmt;

use crate::backend::SensorHardware;
use crate::config::RpmConfig;
use crate::manager::{ArmingCheckError, DetectionReport, RpmManager, RpmSnapshot, SlotDetection};
use crate::params::{self, ParamChange, ParamError, ParamSpec};
use crate::state::{InstanceId, Millis};

use super::catalog::{self, CommandSpec};
use super::grammar::{self, Command, HelpCommand, ParamCommand, RpmCommand};
use super::status::{ReadingFormatter, write_arming_line};

/// Line terminator used by every rendered outcome.
pub const EOL: &str = "\r\n";

/// Operations the console needs from the sensor subsystem.
pub trait SensorConsole {
    fn snapshot(&mut self, now: Millis) -> RpmSnapshot;

    fn config(&mut self) -> RpmConfig;

    fn set_param(&mut self, name: &str, value: &str) -> Result<ParamChange, ParamError>;

    /// Re-runs detection.
    fn detect(&mut self) -> DetectionReport;

    fn arming_checks(&mut self) -> Result<(), ArmingCheckError>;
}

impl<H: SensorHardware> SensorConsole for RpmManager<H> {
    fn snapshot(&mut self, now: Millis) -> RpmSnapshot {
        RpmManager::snapshot(self, now)
    }

    fn config(&mut self) -> RpmConfig {
        *RpmManager::config(self)
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<ParamChange, ParamError> {
        params::set(self.config_mut(), name, value)
    }

    fn detect(&mut self) -> DetectionReport {
        self.init()
    }

    fn arming_checks(&mut self) -> Result<(), ArmingCheckError> {
        RpmManager::arming_checks(self)
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Readings {
        snapshot: RpmSnapshot,
        instance: Option<InstanceId>,
    },
    ParamShow {
        spec: Option<&'static ParamSpec>,
        config: RpmConfig,
    },
    ParamSet(ParamChange),
    Detected(DetectionReport),
    Status {
        snapshot: RpmSnapshot,
        arming: Result<(), ArmingCheckError>,
    },
    Help {
        topic: Option<&'static CommandSpec>,
    },
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Param(ParamError),
    UnknownTopic(&'a str),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<ParamError> for CommandError<'_> {
    fn from(error: ParamError) -> Self {
        Self::Param(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "syntax: {error}"),
            CommandError::Param(error) => write!(f, "param: {error}"),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
        }
    }
}

/// Dispatches console commands onto a [`SensorConsole`].
pub struct CommandExecutor<C> {
    console: C,
}

impl<C> CommandExecutor<C> {
    /// Creates a new executor around the provided console.
    #[must_use]
    pub const fn new(console: C) -> Self {
        Self { console }
    }

    /// Returns an immutable reference to the underlying console.
    #[must_use]
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Returns a mutable reference to the underlying console.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Consumes the executor and yields the inner console.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.console
    }
}

impl<C> CommandExecutor<C>
where
    C: SensorConsole,
{
    /// Parses and executes a console line.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
        now: Millis,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    fn dispatch<'a>(
        &mut self,
        command: Command<'a>,
        now: Millis,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        match command {
            Command::Rpm(RpmCommand { instance }) => Ok(CommandOutcome::Readings {
                snapshot: self.console.snapshot(now),
                instance,
            }),
            Command::Param(ParamCommand::Show { name }) => {
                let spec = match name {
                    Some(name) => Some(params::find(name).ok_or(ParamError::UnknownName)?),
                    None => None,
                };
                Ok(CommandOutcome::ParamShow {
                    spec,
                    config: self.console.config(),
                })
            }
            Command::Param(ParamCommand::Set { name, value }) => {
                let change = self.console.set_param(name, value)?;
                Ok(CommandOutcome::ParamSet(change))
            }
            Command::Detect => Ok(CommandOutcome::Detected(self.console.detect())),
            Command::Status => Ok(CommandOutcome::Status {
                snapshot: self.console.snapshot(now),
                arming: self.console.arming_checks(),
            }),
            Command::Help(HelpCommand { topic }) => match topic {
                None => Ok(CommandOutcome::Help { topic: None }),
                Some(name) => catalog::find(name)
                    .map(|spec| CommandOutcome::Help { topic: Some(spec) })
                    .ok_or(CommandError::UnknownTopic(name)),
            },
        }
    }
}

impl CommandOutcome {
    /// Renders the outcome as console lines, each terminated by [`EOL`].
    pub fn write_lines<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self {
            CommandOutcome::Readings { snapshot, instance } => {
                let formatter = ReadingFormatter::new(snapshot);
                match instance {
                    Some(id) => {
                        formatter.write_slot_line(writer, *id)?;
                        writer.write_str(EOL)
                    }
                    None => {
                        for id in InstanceId::ALL {
                            formatter.write_slot_line(writer, id)?;
                            writer.write_str(EOL)?;
                        }
                        Ok(())
                    }
                }
            }
            CommandOutcome::ParamShow { spec, config } => match spec {
                Some(spec) => write_param_line(writer, spec, config),
                None => params::all().try_for_each(|spec| write_param_line(writer, spec, config)),
            },
            CommandOutcome::ParamSet(change) => {
                write!(
                    writer,
                    "{} {} -> {}",
                    change.spec.name, change.previous, change.value
                )?;
                if change.requires_detection() {
                    writer.write_str(" (run `detect` to apply)")?;
                }
                writer.write_str(EOL)
            }
            CommandOutcome::Detected(report) => {
                for (id, outcome) in report.iter() {
                    match outcome {
                        SlotDetection::Disabled => write!(writer, "{id} disabled")?,
                        SlotDetection::Detected { kind, has_source } => {
                            write!(writer, "{id} detected {kind}")?;
                            if !has_source {
                                writer.write_str(" (no source)")?;
                            }
                        }
                        SlotDetection::Unsupported { code } => {
                            write!(writer, "{id} unsupported type {code}")?;
                        }
                    }
                    writer.write_str(EOL)?;
                }
                write!(writer, "active={}{EOL}", report.active.get())
            }
            CommandOutcome::Status { snapshot, arming } => {
                ReadingFormatter::new(snapshot).write_summary_line(writer)?;
                writer.write_str(EOL)?;
                write_arming_line(writer, *arming)?;
                writer.write_str(EOL)
            }
            CommandOutcome::Help { topic: Some(spec) } => {
                write!(writer, "{} - {}{EOL}", spec.usage, spec.summary)
            }
            CommandOutcome::Help { topic: None } => {
                for spec in catalog::commands() {
                    write!(writer, "{:<8}{}{EOL}", spec.name, spec.summary)?;
                }
                Ok(())
            }
        }
    }
}

fn write_param_line<W: fmt::Write>(
    writer: &mut W,
    spec: &ParamSpec,
    config: &RpmConfig,
) -> fmt::Result {
    write!(writer, "{} = {}{EOL}", spec.name, params::get(config, spec))
}
