use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use rpm_core::{Millis, RpmManager, SlotDetection};
use static_cell::StaticCell;

use crate::board;
use crate::repl::{LockedConsole, ReplFrame};
use crate::sensors::{BoardHardware, CAPTURE_CHANNELS};
use crate::telemetry::FirmwareTelemetry;
use crate::usb;

mod capture_task;
mod repl_task;
mod rpm_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Depth of the byte queues between the USB task and the console task.
const REPL_QUEUE_DEPTH: usize = 8;

pub(super) type SharedManager = Mutex<CriticalSectionRawMutex, RefCell<RpmManager<BoardHardware>>>;
pub(super) type SharedTelemetry = Mutex<CriticalSectionRawMutex, RefCell<FirmwareTelemetry>>;
pub(super) type FirmwareConsole = LockedConsole<'static, CriticalSectionRawMutex, BoardHardware>;
pub(super) type ReplQueue = Channel<CriticalSectionRawMutex, ReplFrame, REPL_QUEUE_DEPTH>;

pub(super) static REPL_RX_QUEUE: ReplQueue = Channel::new();
pub(super) static REPL_TX_QUEUE: ReplQueue = Channel::new();
/// Raised with `true` when the host asserts DTR, `false` when it drops it.
pub(super) static REPL_LINK: Signal<CriticalSectionRawMutex, bool> = Signal::new();

static MANAGER: StaticCell<SharedManager> = StaticCell::new();
static TELEMETRY: StaticCell<SharedTelemetry> = StaticCell::new();
static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

/// Milliseconds since boot, wrapping.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn now_ms() -> Millis {
    Instant::now().as_millis() as Millis
}

/// Microseconds since boot, wrapping.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn now_us() -> u32 {
    Instant::now().as_micros() as u32
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA6,
        PA7,
        EXTI0,
        EXTI1,
        EXTI6,
        EXTI7,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let (config, rejected) = board::boot_config();
    if let Some((name, error)) = rejected {
        defmt::warn!(
            "rpm: board override {} rejected: {}",
            name,
            defmt::Display2Format(&error)
        );
    }

    let manager: &'static SharedManager = MANAGER.init(Mutex::new(RefCell::new(RpmManager::new(
        config,
        BoardHardware::new(now_us),
    ))));
    let telemetry: &'static SharedTelemetry =
        TELEMETRY.init(Mutex::new(RefCell::new(FirmwareTelemetry::new())));

    let report = manager.lock(|cell| cell.borrow_mut().init());
    for (id, outcome) in report.iter() {
        match outcome {
            SlotDetection::Disabled => {}
            SlotDetection::Detected { kind, has_source } => defmt::info!(
                "rpm: {} detected {} source={}",
                id.ordinal(),
                kind.label(),
                has_source
            ),
            SlotDetection::Unsupported { code } => {
                defmt::warn!("rpm: {} unsupported type {}", id.ordinal(), code);
            }
        }
    }
    telemetry.lock(|cell| cell.borrow_mut().record_detection(&report, now_ms()));
    if let Err(error) = manager.lock(|cell| cell.borrow().arming_checks()) {
        defmt::warn!("rpm: prearm {}", defmt::Display2Format(&error));
    }

    let inputs = [
        ExtiInput::new(PA0, EXTI0, Pull::Down),
        ExtiInput::new(PA1, EXTI1, Pull::Down),
        ExtiInput::new(PA6, EXTI6, Pull::Down),
        ExtiInput::new(PA7, EXTI7, Pull::Down),
    ];
    for (input, channel) in inputs.into_iter().zip(CAPTURE_CHANNELS.iter()) {
        spawner
            .spawn(capture_task::run(input, channel))
            .expect("failed to spawn capture task");
    }

    spawner
        .spawn(rpm_task::run(manager, telemetry))
        .expect("failed to spawn rpm task");

    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    spawner
        .spawn(usb_task::run(storage, USB, PA12, PA11))
        .expect("failed to spawn USB task");

    spawner
        .spawn(repl_task::run(LockedConsole::new(manager, telemetry, now_ms)))
        .expect("failed to spawn REPL task");

    core::future::pending::<()>().await;
}
