use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Sender};
use embassy_usb::driver::{Driver, EndpointError};

use super::{REPL_LINK, REPL_RX_QUEUE, REPL_TX_QUEUE};
use crate::repl::ReplFrame;
use crate::usb::{self, ConsolePort, UsbDeviceStorage, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    storage: &'static mut UsbDeviceStorage,
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);
    let (mut device, port) = usb::build(driver, storage, UsbDeviceStrings::default());

    join(device.run(), run_console(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console<D>(port: ConsolePort<D>) -> !
where
    D: Driver<'static>,
{
    let ConsolePort {
        mut sender,
        mut receiver,
        control,
    } = port;
    let rx_queue = REPL_RX_QUEUE.sender();
    let tx_queue = REPL_TX_QUEUE.receiver();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &sender).await;
        let mut pending_tx: Option<ReplFrame> = None;

        defmt::info!("usb: console connected");
        REPL_LINK.signal(true);

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    let frame = match pending_tx.take() {
                        Some(frame) => frame,
                        None => tx_queue.receive().await,
                    };
                    let result = sender.write_packet(&frame).await;
                    if result.is_err() {
                        pending_tx = Some(frame);
                    }
                    result
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(0)) | Either3::Second(Ok(())) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = ReplFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err() {
                        defmt::warn!("usb: dropping console frame len={} (overflow)", count);
                        continue;
                    }
                    rx_queue.send(frame).await;
                }
                Either3::First(Err(EndpointError::Disabled))
                | Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either3::First(Err(_)) => defmt::warn!("usb: console read error"),
                Either3::Second(Err(_)) => defmt::warn!("usb: console write error"),
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: console host dropped DTR");
                        break;
                    }
                }
            }
        }

        REPL_LINK.signal(false);
    }
}

async fn wait_for_dtr<D>(control: &ControlChanged<'static>, sender: &Sender<'static, D>)
where
    D: Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
