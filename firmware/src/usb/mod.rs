//! USB device exposing the operator console as a single CDC ACM interface.

use embassy_usb::class::cdc_acm::{CdcAcmClass, ControlChanged, Receiver, Sender, State};
use embassy_usb::driver::Driver;
use embassy_usb::{Builder, Config, UsbDevice};

use crate::repl::FRAME_LEN;

#[allow(clippy::cast_possible_truncation)]
pub const MAX_PACKET_SIZE: u16 = FRAME_LEN as u16;

const CONTROL_BUFFER_LEN: usize = 64;
const CONFIG_DESCRIPTOR_LEN: usize = 256;
const BOS_DESCRIPTOR_LEN: usize = 256;
const MSOS_DESCRIPTOR_LEN: usize = 256;

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "RPM Sensor Board",
            product: "RPM Sensor Console",
            serial_number: None,
        }
    }
}

/// Backing storage for the builder and the CDC ACM class.
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    console_state: State<'static>,
}

impl UsbDeviceStorage {
    pub fn new() -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            console_state: State::new(),
        }
    }
}

impl Default for UsbDeviceStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Split handles for the console interface.
pub struct ConsolePort<D: Driver<'static>> {
    pub sender: Sender<'static, D>,
    pub receiver: Receiver<'static, D>,
    pub control: ControlChanged<'static>,
}

/// Builds the USB device and its console port.
pub fn build<D>(
    driver: D,
    storage: &'static mut UsbDeviceStorage,
    strings: UsbDeviceStrings,
) -> (UsbDevice<'static, D>, ConsolePort<D>)
where
    D: Driver<'static>,
{
    let mut config = Config::new(0x1209, 0x0001);
    config.manufacturer = Some(strings.manufacturer);
    config.product = Some(strings.product);
    config.serial_number = strings.serial_number;
    #[allow(clippy::cast_possible_truncation)]
    {
        config.max_packet_size_0 = MAX_PACKET_SIZE as u8;
    }
    config.max_power = 100;

    let mut builder = Builder::new(
        driver,
        config,
        &mut storage.config_descriptor,
        &mut storage.bos_descriptor,
        &mut storage.msos_descriptor,
        &mut storage.control_buf,
    );

    let class = CdcAcmClass::new(&mut builder, &mut storage.console_state, MAX_PACKET_SIZE);
    let (sender, receiver, control) = class.split_with_control();
    let device = builder.build();

    (
        device,
        ConsolePort {
            sender,
            receiver,
            control,
        },
    )
}
