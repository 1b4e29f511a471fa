use core::fmt::Write as _;

use embassy_futures::select::{Either, select};
use heapless::String;

use super::{FirmwareConsole, REPL_LINK, REPL_RX_QUEUE, REPL_TX_QUEUE, now_ms};
use crate::repl::{FRAME_LEN, OUTPUT_CAPACITY, ReplError, ReplFrame, ReplSession};

#[embassy_executor::task]
pub async fn run(console: FirmwareConsole) -> ! {
    let rx = REPL_RX_QUEUE.receiver();
    let mut session = ReplSession::new(console);
    let mut output: String<OUTPUT_CAPACITY> = String::new();

    loop {
        match select(REPL_LINK.wait(), rx.receive()).await {
            Either::First(true) => {
                output.clear();
                let result = session.on_connect(&mut output);
                respond(&mut output, result).await;
            }
            Either::First(false) => session.on_disconnect(),
            Either::Second(frame) => {
                for &byte in &frame {
                    output.clear();
                    let result = session.ingest(byte, now_ms(), &mut output);
                    respond(&mut output, result).await;
                }
            }
        }
    }
}

async fn respond(output: &mut String<OUTPUT_CAPACITY>, result: Result<(), ReplError>) {
    if let Err(error) = result {
        defmt::warn!("repl: {}", defmt::Display2Format(&error));
        output.clear();
        // The buffer was just cleared, so the message always fits.
        let _ = write!(output, "\r\nerror: {error}\r\n> ");
    }
    send(output.as_bytes()).await;
}

async fn send(bytes: &[u8]) {
    let tx = REPL_TX_QUEUE.sender();
    for chunk in bytes.chunks(FRAME_LEN) {
        let mut frame = ReplFrame::new();
        if frame.extend_from_slice(chunk).is_ok() {
            tx.send(frame).await;
        }
    }
}
