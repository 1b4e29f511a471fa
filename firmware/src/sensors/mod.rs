#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board measurement sources handed to the sensor manager.
//!
//! Edge tasks and other subsystems publish raw captures into lock-free cells;
//! the manager's tick drains them through the [`SensorHardware`] sources below.
//! Timestamps are stored with a `+1` offset so zero can mean "nothing captured
//! yet".

use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use rpm_core::backend::{
    EdgeCapture, EdgePeriod, EngineSample, EngineTelemetry, NotchPeak, NotchTracker, PulseCounter,
    PulseWindow, SensorHardware, SimulatedRotor,
};
use rpm_core::{InstanceId, MAX_INSTANCES, PinId};

use crate::board::{self, CAPTURE_INPUTS};

/// Rotor speeds reported by simulated slots on the bench.
pub const BENCH_ROTOR_RPM: [f32; MAX_INSTANCES] = [1_500.0, 3_000.0, 4_500.0, 6_000.0];

/// Wrapping microsecond clock used to time pulse windows.
pub type MicrosClock = fn() -> u32;

/// Shortest pulse-counting window. Shorter windows hold too few pulses to
/// resolve rotor speed at the manager's tick rate.
pub const MIN_WINDOW_US: u32 = 250_000;

fn encode_stamp(stamp: u32) -> u32 {
    stamp.wrapping_add(1)
}

fn decode_stamp(raw: u32) -> Option<u32> {
    if raw == 0 {
        None
    } else {
        Some(raw.wrapping_sub(1))
    }
}

/// Edge statistics for one capture input.
pub struct CaptureChannel {
    pulses: AtomicU32,
    last_edge: AtomicU32,
    period_us: AtomicU32,
    jitter_us: AtomicU32,
    sequence: AtomicU32,
    claimed: AtomicBool,
}

impl CaptureChannel {
    pub const fn new() -> Self {
        Self {
            pulses: AtomicU32::new(0),
            last_edge: AtomicU32::new(0),
            period_us: AtomicU32::new(0),
            jitter_us: AtomicU32::new(0),
            sequence: AtomicU32::new(0),
            claimed: AtomicBool::new(false),
        }
    }

    /// Records one rising edge observed at `now_us`.
    pub fn record_edge(&self, now_us: u32) {
        self.pulses.fetch_add(1, Ordering::Relaxed);

        let previous = self.last_edge.swap(encode_stamp(now_us), Ordering::Relaxed);
        let Some(previous) = decode_stamp(previous) else {
            return;
        };

        let period = now_us.wrapping_sub(previous);
        let last_period = self.period_us.swap(period, Ordering::Relaxed);
        let jitter = if last_period == 0 {
            0
        } else {
            period.abs_diff(last_period)
        };
        self.jitter_us.store(jitter, Ordering::Relaxed);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    fn take_pulses(&self) -> u32 {
        self.pulses.swap(0, Ordering::Relaxed)
    }

    fn latest_period(&self) -> Option<EdgePeriod> {
        let sequence = self.sequence.load(Ordering::Acquire);
        if sequence == 0 {
            return None;
        }

        Some(EdgePeriod {
            period_us: self.period_us.load(Ordering::Relaxed),
            jitter_us: self.jitter_us.load(Ordering::Relaxed),
            sequence,
        })
    }

    /// Returns `true` if the channel was free.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn release(&self) {
        self.pulses.store(0, Ordering::Relaxed);
        self.last_edge.store(0, Ordering::Relaxed);
        self.period_us.store(0, Ordering::Relaxed);
        self.jitter_us.store(0, Ordering::Relaxed);
        self.sequence.store(0, Ordering::Relaxed);
        self.claimed.store(false, Ordering::Release);
    }
}

impl Default for CaptureChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest engine speed published by the engine-management link.
pub struct EngineCell {
    rpm_bits: AtomicU32,
    updated_ms: AtomicU32,
}

impl EngineCell {
    pub const fn new() -> Self {
        Self {
            rpm_bits: AtomicU32::new(0),
            updated_ms: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, rpm: f32, now_ms: u32) {
        self.rpm_bits.store(rpm.to_bits(), Ordering::Relaxed);
        self.updated_ms.store(encode_stamp(now_ms), Ordering::Release);
    }

    fn sample(&self) -> Option<EngineSample> {
        let updated_ms = decode_stamp(self.updated_ms.load(Ordering::Acquire))?;
        Some(EngineSample {
            rpm: f32::from_bits(self.rpm_bits.load(Ordering::Relaxed)),
            updated_ms,
        })
    }
}

impl Default for EngineCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Dominant rotor frequency published by the harmonic notch tracker.
pub struct NotchCell {
    hz_bits: AtomicU32,
    confidence_bits: AtomicU32,
    valid: AtomicBool,
}

impl NotchCell {
    pub const fn new() -> Self {
        Self {
            hz_bits: AtomicU32::new(0),
            confidence_bits: AtomicU32::new(0),
            valid: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, hz: f32, confidence: f32) {
        self.hz_bits.store(hz.to_bits(), Ordering::Relaxed);
        self.confidence_bits.store(confidence.to_bits(), Ordering::Relaxed);
        self.valid.store(true, Ordering::Release);
    }

    /// Takes the pending peak, leaving the cell empty until the tracker publishes again.
    fn take(&self) -> Option<NotchPeak> {
        if !self.valid.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(NotchPeak {
            hz: f32::from_bits(self.hz_bits.load(Ordering::Relaxed)),
            confidence: f32::from_bits(self.confidence_bits.load(Ordering::Relaxed)),
        })
    }
}

impl Default for NotchCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture cells shared by the edge tasks and the sensor manager.
pub static CAPTURE_CHANNELS: [CaptureChannel; CAPTURE_INPUTS] =
    [const { CaptureChannel::new() }; CAPTURE_INPUTS];

/// Engine speed published by the engine-management link.
pub static ENGINE: EngineCell = EngineCell::new();

/// Rotor frequency published by the notch tracker.
pub static NOTCH: NotchCell = NotchCell::new();

/// Counts pulses since the previous window, closing it once
/// [`MIN_WINDOW_US`] has elapsed.
pub struct PulseSource {
    channel: &'static CaptureChannel,
    clock: MicrosClock,
    window_start: u32,
}

impl PulseCounter for PulseSource {
    fn take_window(&mut self) -> Option<PulseWindow> {
        let now = (self.clock)();
        let window_us = now.wrapping_sub(self.window_start);
        if window_us < MIN_WINDOW_US {
            return None;
        }
        self.window_start = now;
        Some(PulseWindow {
            pulses: self.channel.take_pulses(),
            window_us,
        })
    }
}

pub struct EdgeSource {
    channel: &'static CaptureChannel,
}

impl EdgeCapture for EdgeSource {
    fn latest_period(&mut self) -> Option<EdgePeriod> {
        self.channel.latest_period()
    }
}

pub struct EngineSource {
    cell: &'static EngineCell,
}

impl EngineTelemetry for EngineSource {
    fn engine_rpm(&mut self) -> Option<EngineSample> {
        self.cell.sample()
    }
}

pub struct NotchSource {
    cell: &'static NotchCell,
}

impl NotchTracker for NotchSource {
    fn peak_frequency(&mut self) -> Option<NotchPeak> {
        self.cell.take()
    }
}

/// Fixed-speed rotor for bench bring-up without sensors attached.
pub struct BenchRotor;

impl SimulatedRotor for BenchRotor {
    fn rotor_rpm(&mut self, instance: InstanceId) -> Option<f32> {
        BENCH_ROTOR_RPM.get(instance.as_index()).copied()
    }
}

/// Board implementation of [`SensorHardware`].
pub struct BoardHardware {
    channels: &'static [CaptureChannel; CAPTURE_INPUTS],
    engine: &'static EngineCell,
    notch: &'static NotchCell,
    clock: MicrosClock,
    bound: [Option<usize>; MAX_INSTANCES],
}

impl BoardHardware {
    /// Hardware backed by the board-wide capture cells.
    pub fn new(clock: MicrosClock) -> Self {
        Self::with_cells(&CAPTURE_CHANNELS, &ENGINE, &NOTCH, clock)
    }

    pub fn with_cells(
        channels: &'static [CaptureChannel; CAPTURE_INPUTS],
        engine: &'static EngineCell,
        notch: &'static NotchCell,
        clock: MicrosClock,
    ) -> Self {
        Self {
            channels,
            engine,
            notch,
            clock,
            bound: [None; MAX_INSTANCES],
        }
    }

    /// Binds the capture channel behind `pin` to `instance`.
    ///
    /// Fails when the pin is not a capture input or another slot already owns it.
    fn bind(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<&'static CaptureChannel> {
        let index = board::channel_for(pin?)?;
        let channel = &self.channels[index];
        if !channel.claim() {
            return None;
        }
        self.bound[instance.as_index()] = Some(index);
        Some(channel)
    }
}

impl SensorHardware for BoardHardware {
    type PulseCounter = PulseSource;
    type EdgeCapture = EdgeSource;
    type EngineTelemetry = EngineSource;
    type NotchTracker = NotchSource;
    type SimulatedRotor = BenchRotor;

    fn pulse_counter(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<PulseSource> {
        let channel = self.bind(instance, pin)?;
        Some(PulseSource {
            channel,
            clock: self.clock,
            window_start: (self.clock)(),
        })
    }

    fn edge_capture(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<EdgeSource> {
        let channel = self.bind(instance, pin)?;
        Some(EdgeSource { channel })
    }

    fn engine_telemetry(&mut self, _instance: InstanceId) -> Option<EngineSource> {
        Some(EngineSource { cell: self.engine })
    }

    fn notch_tracker(&mut self, _instance: InstanceId) -> Option<NotchSource> {
        Some(NotchSource { cell: self.notch })
    }

    fn simulated_rotor(&mut self, _instance: InstanceId) -> Option<BenchRotor> {
        Some(BenchRotor)
    }

    fn release(&mut self, instance: InstanceId) {
        if let Some(index) = self.bound[instance.as_index()].take() {
            self.channels[index].release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpm_core::{InstanceConfig, RpmConfig, RpmManager, RpmType};

    static NOW_US: AtomicU32 = AtomicU32::new(0);

    fn test_clock() -> u32 {
        NOW_US.load(Ordering::Relaxed)
    }

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    fn hardware() -> (BoardHardware, &'static [CaptureChannel; CAPTURE_INPUTS]) {
        let channels = leak([const { CaptureChannel::new() }; CAPTURE_INPUTS]);
        let hardware = BoardHardware::with_cells(
            channels,
            leak(EngineCell::new()),
            leak(NotchCell::new()),
            test_clock,
        );
        (hardware, channels)
    }

    #[test]
    fn edges_produce_period_and_jitter() {
        let channel = CaptureChannel::new();
        assert_eq!(channel.latest_period(), None);

        channel.record_edge(1_000);
        assert_eq!(channel.latest_period(), None);

        channel.record_edge(21_000);
        channel.record_edge(40_000);
        assert_eq!(
            channel.latest_period(),
            Some(EdgePeriod {
                period_us: 19_000,
                jitter_us: 1_000,
                sequence: 2,
            })
        );
        assert_eq!(channel.take_pulses(), 3);
        assert_eq!(channel.take_pulses(), 0);
    }

    #[test]
    fn edge_period_survives_clock_wrap() {
        let channel = CaptureChannel::new();
        channel.record_edge(u32::MAX - 499);
        channel.record_edge(500);
        assert_eq!(channel.latest_period().map(|edge| edge.period_us), Some(1_000));
    }

    #[test]
    fn a_capture_input_serves_only_one_slot() {
        let (mut hardware, channels) = hardware();
        let pin = Some(PinId::new(51));

        assert!(hardware.edge_capture(InstanceId::ALL[0], pin).is_some());
        assert!(hardware.pulse_counter(InstanceId::ALL[1], pin).is_none());
        assert!(hardware.edge_capture(InstanceId::ALL[2], None).is_none());
        assert!(hardware.edge_capture(InstanceId::ALL[2], Some(PinId::new(9))).is_none());

        channels[1].record_edge(10);
        hardware.release(InstanceId::ALL[0]);
        assert_eq!(channels[1].latest_period(), None);
        assert!(hardware.pulse_counter(InstanceId::ALL[1], pin).is_some());
    }

    #[test]
    fn manager_reads_pulses_from_the_board() {
        let (hardware, channels) = hardware();
        let config = RpmConfig::new().with_instance(
            0,
            InstanceConfig::new(RpmType::Pwm, Some(PinId::new(50)), 1.0),
        );
        let mut manager = RpmManager::new(config, hardware);

        NOW_US.store(0, Ordering::Relaxed);
        manager.init();

        for edge in 0..64 {
            channels[0].record_edge(edge * 3_000);
        }
        NOW_US.store(100_000, Ordering::Relaxed);
        manager.update(100);
        assert!(!manager.healthy(0, 100));

        NOW_US.store(250_000, Ordering::Relaxed);
        manager.update(250);
        assert_eq!(manager.get_rpm(0, 250), Ok(15_360.0));
    }

    static STEADY_NOW_US: AtomicU32 = AtomicU32::new(0);

    fn steady_clock() -> u32 {
        STEADY_NOW_US.load(Ordering::Relaxed)
    }

    #[test]
    fn steady_rotor_stays_healthy_at_the_tick_rate() {
        let channels = leak([const { CaptureChannel::new() }; CAPTURE_INPUTS]);
        let hardware = BoardHardware::with_cells(
            channels,
            leak(EngineCell::new()),
            leak(NotchCell::new()),
            steady_clock,
        );
        let config = RpmConfig::new()
            .with_instance(
                0,
                InstanceConfig::new(RpmType::Pwm, Some(PinId::new(50)), 1.0),
            )
            .with_bounds(100.0, 20_000.0);
        let mut manager = RpmManager::new(config, hardware);
        manager.init();

        // One edge every 20 ms is 3000 rpm; the manager ticks every 10 ms.
        for now in (10..=2_000u32).step_by(10) {
            if now % 20 == 10 {
                channels[0].record_edge((now - 5) * 1_000);
            }
            STEADY_NOW_US.store(now * 1_000, Ordering::Relaxed);
            manager.update(now);

            if now >= 250 {
                let rpm = manager.get_rpm(0, now);
                assert!(
                    rpm.as_ref().is_ok_and(|rpm| (2_500.0..=3_500.0).contains(rpm)),
                    "t={now}ms rpm={rpm:?}"
                );
            }
        }
    }

    #[test]
    fn notch_peaks_are_consumed_once() {
        let cell = NotchCell::new();
        assert_eq!(cell.take(), None);
        cell.publish(50.0, 0.75);
        assert_eq!(
            cell.take(),
            Some(NotchPeak {
                hz: 50.0,
                confidence: 0.75,
            })
        );
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn engine_samples_carry_their_update_time() {
        let cell = EngineCell::new();
        assert_eq!(cell.sample(), None);
        cell.publish(2_200.0, 0);
        assert_eq!(
            cell.sample(),
            Some(EngineSample {
                rpm: 2_200.0,
                updated_ms: 0,
            })
        );
    }
}
