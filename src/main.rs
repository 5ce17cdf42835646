//! ==============================================================================
//! main.rs - temperature host entry point
//! ==============================================================================
//!
//! purpose:
//!     samples a temperature sensor every couple of seconds, drives an
//!     indicator output when a user-set threshold is crossed (with hysteresis)
//!     and keeps a persistent history of readings, serving all of it over a
//!     small web page.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - open the non-volatile store (wiping it if it is unreadable)
//!     - run the sampling loop
//!     - serve the web page / api
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────────┐            ┌─────────────────────────┐  │
//!     │  │ sampling loop   │            │ web server              │  │
//!     │  │ (2s cycle)      │            │ (port 3000)             │  │
//!     │  └────────┬────────┘            └────────────┬────────────┘  │
//!     │           │ writes                     reads │ set threshold │
//!     │           └──────────────┬──────────────────┘               │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │  monitor  │ <- state.rs                │
//!     │                    └─────┬─────┘                            │
//!     │      (Clone-able handle to temperature, threshold, history)  │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                    ┌───────────┼────────────┐
//!                    ▼           ▼            ▼
//!              ┌──────────┐ ┌──────────┐ ┌──────────┐
//!              │ adc      │ │ gpio     │ │ kv store │
//!              │ (hal.rs) │ │ (hal.rs) │ │(store.rs)│
//!              └──────────┘ └──────────┘ └──────────┘
//!
//! ==============================================================================

mod clock;
mod config;
mod convert;
mod hal;
mod history;
mod hysteresis;
mod input;
mod sampler;
mod server;
mod state;
mod store;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::hal::HardwareProvider;
use crate::store::{FileStore, KvStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration (logging is not up yet, so the loader's
    // own messages are replayed through a temporary default subscriber)
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().finish(),
        config::HostConfig::load_or_default,
    );
    init_logging(&config.logging.level);

    info!("===========================================================");
    info!("  Temperature Host");
    info!("  sample -> threshold -> history");
    info!("===========================================================");
    config.print_summary();

    // step 2: hardware
    let hal: Arc<dyn HardwareProvider> = Arc::new(hal::Hal::new(&config.sensor)?);
    hal.configure_output(config.indicator.gpio_pin)
        .with_context(|| format!("failed to configure indicator pin {}", config.indicator.gpio_pin))?;

    // step 3: storage + shared state
    let history = history::HistoryLog::new(open_store(&config.storage));
    let monitor = state::Monitor::new(
        history,
        hal.clone(),
        config.indicator.gpio_pin,
        config.storage_timeout(),
    );

    // step 4: start the web server in background
    let web_state = server::WebState { monitor: monitor.clone(), window: config.history.window };
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_server(web_state, &bind).await {
            error!("[ERROR] Web server error: {:#}", e);
        }
    });

    // step 5: main sampling loop
    let clock = Arc::new(clock::SystemClock::new(config.clock.utc_offset_hours));
    let sampler = sampler::Sampler::new(monitor, hal, clock, config.logging.show_sensor_data);
    info!("[STARTUP] ✓ Program initialized successfully");
    sampler.run(config.poll_interval()).await;

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// open the data file; an unreadable file is wiped, an unusable directory
/// degrades to a volatile store
fn open_store(config: &config::StorageConfig) -> Box<dyn KvStore> {
    match FileStore::open(&config.path, &config.namespace, config.max_entries) {
        Ok(store) => {
            info!("[STORE] ✓ Opened {}", store.path().display());
            return Box::new(store);
        }
        Err(e) => warn!("[STORE] Failed to open {}: {} -> clearing store", config.path.display(), e),
    }

    match FileStore::create_empty(&config.path, &config.namespace, config.max_entries) {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(
                "[STORE] Cannot write {}: {} -> history will not survive a restart",
                config.path.display(),
                e
            );
            Box::new(MemoryStore::new(&config.namespace, config.max_entries))
        }
    }
}
