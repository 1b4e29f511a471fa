//! Operator console shared between firmware and emulator targets.
//!
//! The grammar lives in [`grammar`] and is implemented with a token/parse
//! pipeline that stays compatible with `no_std`. [`commands`] executes parsed
//! lines against a [`commands::SensorConsole`] and renders the results.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
