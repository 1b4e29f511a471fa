use embassy_stm32::exti::ExtiInput;

use super::now_us;
use crate::sensors::CaptureChannel;

/// Timestamps every rising edge on one capture input.
#[embassy_executor::task(pool_size = 4)]
pub async fn run(mut input: ExtiInput<'static>, channel: &'static CaptureChannel) -> ! {
    loop {
        input.wait_for_rising_edge().await;
        channel.record_edge(now_us());
    }
}
