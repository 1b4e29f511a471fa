#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rpm_core::backend::{
    EdgeCapture, EdgePeriod, EngineSample, EngineTelemetry, NotchPeak, NotchTracker, PulseCounter,
    PulseWindow, SensorHardware, SimulatedRotor,
};
use rpm_core::{InstanceId, MAX_INSTANCES, PinId};

/// Shared test bench: pending readings per slot plus factory bookkeeping.
#[derive(Default)]
pub struct Bench {
    pending: [Option<(f32, f32)>; MAX_INSTANCES],
    unavailable: [bool; MAX_INSTANCES],
    pub created: [u32; MAX_INSTANCES],
    pub released: [u32; MAX_INSTANCES],
    pub pins: [Option<PinId>; MAX_INSTANCES],
}

#[derive(Clone, Default)]
pub struct BenchHandle(Rc<RefCell<Bench>>);

impl BenchHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one reading for `slot`; the next tick consumes it.
    pub fn feed(&self, slot: usize, rpm: f32, quality: f32) {
        self.0.borrow_mut().pending[slot] = Some((rpm, quality));
    }

    pub fn make_unavailable(&self, slot: usize) {
        self.0.borrow_mut().unavailable[slot] = true;
    }

    pub fn created(&self, slot: usize) -> u32 {
        self.0.borrow().created[slot]
    }

    pub fn released(&self, slot: usize) -> u32 {
        self.0.borrow().released[slot]
    }

    pub fn pin(&self, slot: usize) -> Option<PinId> {
        self.0.borrow().pins[slot]
    }

    pub fn hardware(&self) -> MockHardware {
        MockHardware {
            bench: self.clone(),
        }
    }

    fn take(&self, instance: InstanceId) -> Option<(f32, f32)> {
        self.0.borrow_mut().pending[instance.as_index()].take()
    }
}

pub struct MockHardware {
    bench: BenchHandle,
}

impl MockHardware {
    fn source(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<MockSource> {
        let mut bench = self.bench.0.borrow_mut();
        let index = instance.as_index();
        bench.created[index] += 1;
        bench.pins[index] = pin;
        if bench.unavailable[index] {
            return None;
        }
        Some(MockSource {
            instance,
            bench: self.bench.clone(),
            sequence: 0,
        })
    }
}

impl SensorHardware for MockHardware {
    type PulseCounter = MockSource;
    type EdgeCapture = MockSource;
    type EngineTelemetry = MockSource;
    type NotchTracker = MockSource;
    type SimulatedRotor = MockSource;

    fn pulse_counter(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<MockSource> {
        self.source(instance, pin)
    }

    fn edge_capture(&mut self, instance: InstanceId, pin: Option<PinId>) -> Option<MockSource> {
        self.source(instance, pin)
    }

    fn engine_telemetry(&mut self, instance: InstanceId) -> Option<MockSource> {
        self.source(instance, None)
    }

    fn notch_tracker(&mut self, instance: InstanceId) -> Option<MockSource> {
        self.source(instance, None)
    }

    fn simulated_rotor(&mut self, instance: InstanceId) -> Option<MockSource> {
        self.source(instance, None)
    }

    fn release(&mut self, instance: InstanceId) {
        self.bench.0.borrow_mut().released[instance.as_index()] += 1;
    }
}

/// Converts queued (rpm, quality) pairs into whatever unit each source reports.
pub struct MockSource {
    instance: InstanceId,
    bench: BenchHandle,
    sequence: u32,
}

impl MockSource {
    fn next(&mut self) -> Option<(f32, f32)> {
        let reading = self.bench.take(self.instance);
        if reading.is_some() {
            self.sequence += 1;
        }
        reading
    }
}

impl PulseCounter for MockSource {
    fn take_window(&mut self) -> Option<PulseWindow> {
        self.next().map(|(rpm, _)| PulseWindow {
            pulses: rpm as u32,
            window_us: 60_000_000,
        })
    }
}

impl EdgeCapture for MockSource {
    fn latest_period(&mut self) -> Option<EdgePeriod> {
        self.next().map(|(rpm, quality)| {
            let period_us = (60_000_000.0 / rpm) as u32;
            EdgePeriod {
                period_us,
                jitter_us: ((1.0 - quality) * period_us as f32).round() as u32,
                sequence: self.sequence,
            }
        })
    }
}

impl EngineTelemetry for MockSource {
    fn engine_rpm(&mut self) -> Option<EngineSample> {
        self.next().map(|(rpm, _)| EngineSample {
            rpm,
            updated_ms: self.sequence,
        })
    }
}

impl NotchTracker for MockSource {
    fn peak_frequency(&mut self) -> Option<NotchPeak> {
        self.next().map(|(rpm, quality)| NotchPeak {
            hz: rpm / 60.0,
            confidence: quality,
        })
    }
}

impl SimulatedRotor for MockSource {
    fn rotor_rpm(&mut self, instance: InstanceId) -> Option<f32> {
        assert_eq!(instance, self.instance, "rotor queried for another slot");
        self.next().map(|(rpm, _)| rpm)
    }
}
