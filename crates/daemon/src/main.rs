//! `siesta-daemon` -- idle-aware sleep-policy daemon.
//!
//! Samples processor load, memory pressure, and network throughput on
//! a fixed interval, combines them with user-idle time, and either
//! holds the machine awake or lets it (and, past the idle threshold,
//! makes it) sleep. The policy lives in a hand-editable JSON file that
//! is re-read every cycle, so edits apply without a restart.
//!
//! # Environment variables
//!
//! | Variable            | Required | Default                               | Description                   |
//! |---------------------|----------|---------------------------------------|-------------------------------|
//! | `SIESTA_CONFIG_DIR` | no       | `<OS config dir>/siesta`              | Directory of `policy.json`    |
//! | `RUST_LOG`          | no       | `siesta_daemon=info,siesta_core=info` | Log filter                    |

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siesta_core::FileConfigProvider;
use siesta_daemon::idle::SystemIdleProbe;
use siesta_daemon::monitor::MonitorLoop;
use siesta_daemon::power::SystemPowerSurface;
use siesta_daemon::sampler::{BandwidthSource, CpuSource, MetricSource, RamSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siesta_daemon=info,siesta_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider =
        FileConfigProvider::at_default_location().context("resolving the policy file location")?;

    tracing::info!(
        policy_file = %provider.path().display(),
        "Starting siesta-daemon",
    );

    // Sampling handles are opened once here and live for the whole
    // loop; the loop discards one priming read from each before the
    // first cycle.
    let sources: Vec<Box<dyn MetricSource>> = vec![
        Box::new(CpuSource::open()),
        Box::new(RamSource::open()),
        Box::new(BandwidthSource::open()),
    ];

    let monitor = MonitorLoop::new(
        provider,
        sources,
        SystemIdleProbe::new(),
        SystemPowerSurface::new(),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    monitor.run(cancel).await;
    Ok(())
}
