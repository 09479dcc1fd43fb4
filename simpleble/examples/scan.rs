use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use host_executor::Executor;
use simpleble::ffi::SimpleBle;
use simpleble::{Bluetooth, Config, DeliveryPolicy};
use tracing::info;
use tracing::metadata::LevelFilter;

const SCAN_TIME: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let executor = Executor::new();
    let bluetooth = Bluetooth::new(
        Arc::new(SimpleBle::new()),
        executor.spawner(),
        Config::from_env()?,
    );

    if !bluetooth.is_bluetooth_enabled() {
        info!("Bluetooth is disabled");
        return Ok(());
    }

    let Some(adapter) = bluetooth.list_adapters()?.into_iter().next() else {
        info!("no adapters found");
        return Ok(());
    };
    info!("scanning with {} ({})", adapter.identifier()?, adapter.address()?);

    adapter.set_callback_on_scan_found(DeliveryPolicy::QueueAll, |found| {
        info!(
            "{} [{}] ({}): {:?}",
            found.identifier, found.address, found.rssi, found.manufacturer_data,
        );
        found.peripheral.release();
    })?;
    adapter.set_callback_on_scan_stop(DeliveryPolicy::Coalesce, || info!("scan stopped"))?;

    adapter.scan_start()?;
    let deadline = Instant::now() + SCAN_TIME;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        executor.turn(remaining);
    }
    adapter.scan_stop()?;
    executor.run_until_stalled();

    Ok(())
}
