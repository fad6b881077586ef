//! Console G-code sender for Lasersaur machines.
//!
//! Streams a G-code file to the firmware and prints status changes until
//! the queue drains.

use anyhow::{bail, Context};
use lasaurlink::{
    init_logging, ConnectionParams, ManagerConfig, SerialService, BUILD_DATE, VERSION,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("lasaurlink {} (built {})", VERSION, BUILD_DATE);
        eprintln!("usage: {} <port> [gcode-file]", args[0]);
        bail!("no serial port given");
    }

    let port = &args[1];
    let service = SerialService::start(ManagerConfig::default());
    service.connect(ConnectionParams::for_port(port)).await?;

    if let Some(path) = args.get(2) {
        let gcode = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path))?;
        service.queue_gcode(gcode).await?;
    }

    let mut status_rx = service.watch_status();
    let mut idle_ticks = 0u32;
    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow().clone();
                if let Some(error) = &status.last_error {
                    tracing::error!(%error, "machine reported an error");
                }
                tracing::info!(
                    ready = status.ready,
                    x = status.x.as_deref().unwrap_or("-"),
                    y = status.y.as_deref().unwrap_or("-"),
                    "status"
                );
                idle_ticks = 0;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if status_rx.borrow().ready {
                    idle_ticks += 1;
                    // A few quiet seconds after the stream finishes.
                    if idle_ticks >= 3 {
                        break;
                    }
                }
            }
        }
    }

    service.disconnect().await?;
    service.shutdown();
    Ok(())
}
