use embassy_time::{Duration, Ticker};

use super::{SharedManager, SharedTelemetry, now_ms};
use crate::status::STATUS;

/// Period of the sensor tick.
const TICK_PERIOD: Duration = Duration::from_millis(10);

#[embassy_executor::task]
pub async fn run(manager: &'static SharedManager, telemetry: &'static SharedTelemetry) -> ! {
    let mut ticker = Ticker::every(TICK_PERIOD);
    let mut healthy_mask = STATUS.healthy_mask();

    loop {
        ticker.next().await;
        let now = now_ms();

        let snapshot = manager.lock(|cell| {
            let mut manager = cell.borrow_mut();
            manager.update(now);
            manager.snapshot(now)
        });

        STATUS.publish(&snapshot);
        telemetry.lock(|cell| cell.borrow_mut().observe(&snapshot));

        let mask = STATUS.healthy_mask();
        if mask != healthy_mask {
            defmt::info!("rpm: healthy mask {=u8:04b} -> {=u8:04b}", healthy_mask, mask);
            healthy_mask = mask;
        }
    }
}
