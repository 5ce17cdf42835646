//! ==============================================================================
//! sampler.rs - periodic sampling loop
//! ==============================================================================
//!
//! one cycle:
//!     adc sample -> convert -> shared temperature -> threshold controller
//!     (indicator) -> history append
//!
//! cycles are independent. a failed sensor read or an out-of-range sample
//! skips the rest of that cycle, a storage failure is already recovered by the
//! history log; neither ever stops the loop.
//!
//! ==============================================================================

use crate::clock::Clock;
use crate::convert::convert;
use crate::hal::HardwareProvider;
use crate::hysteresis::Indicator;
use crate::state::Monitor;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// what a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// reading stored as the given sequence
    Stored { celsius: f64, indicator: Indicator, sequence: u16 },
    /// reading applied but the history append failed (log wiped)
    NotStored { celsius: f64, indicator: Indicator },
    /// sensor read or conversion failed, nothing changed
    Skipped,
}

pub struct Sampler {
    monitor: Monitor,
    hal: Arc<dyn HardwareProvider>,
    clock: Arc<dyn Clock>,
    show_sensor_data: bool,
}

impl Sampler {
    pub fn new(
        monitor: Monitor,
        hal: Arc<dyn HardwareProvider>,
        clock: Arc<dyn Clock>,
        show_sensor_data: bool,
    ) -> Self {
        Self { monitor, hal, clock, show_sensor_data }
    }

    /// run forever, one cycle per interval
    pub async fn run(&self, interval: Duration) {
        info!("[RUNTIME] Starting temperature sampling ({:?} interval)", interval);
        loop {
            self.cycle().await;
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn cycle(&self) -> CycleOutcome {
        // 1. sample (blocking bus access off the async workers)
        let hal = self.hal.clone();
        let raw = match tokio::task::spawn_blocking(move || hal.read_adc()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("[SENSOR] ⚠ Read error: {:#}", e);
                return CycleOutcome::Skipped;
            }
            Err(e) => {
                warn!("[SENSOR] ⚠ Read task failed: {}", e);
                return CycleOutcome::Skipped;
            }
        };

        // 2. convert
        let celsius = match convert(i32::from(raw)) {
            Ok(celsius) => celsius,
            Err(e) => {
                warn!("[SENSOR] ⚠ Sample rejected: {}", e);
                return CycleOutcome::Skipped;
            }
        };

        if self.show_sensor_data {
            info!("[SENSOR] Temperature: {:.2} °C (raw {})", celsius, raw);
        } else {
            debug!("[SENSOR] Temperature: {:.2} °C (raw {})", celsius, raw);
        }

        // 3. publish + control
        self.monitor.record_temperature(celsius).await;
        let indicator = self.monitor.apply_threshold(celsius).await;

        // 4. persist
        match self.monitor.append_history(self.clock.timestamp(), celsius).await {
            Ok(sequence) => CycleOutcome::Stored { celsius, indicator, sequence },
            Err(e) => {
                warn!("[HISTORY] ⚠ Reading not stored: {}", e);
                CycleOutcome::NotStored { celsius, indicator }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::hal::TestHal;
    use crate::history::HistoryLog;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;

    const PIN: u8 = 4;

    fn sampler(raw: u16, capacity: usize) -> (Sampler, Monitor, Arc<TestHal>) {
        let hal = Arc::new(TestHal::new(raw));
        let log = HistoryLog::new(Box::new(MemoryStore::new("temp_mem", capacity)));
        let monitor = Monitor::new(log, hal.clone(), PIN, Duration::from_millis(500));
        let clock = Arc::new(FixedClock("2023-12-15 10:00:00".to_string()));
        (Sampler::new(monitor.clone(), hal.clone(), clock, false), monitor, hal)
    }

    #[tokio::test]
    async fn test_cycle_publishes_and_stores() {
        let (sampler, monitor, _) = sampler(1324, 64);

        let outcome = sampler.cycle().await;
        match outcome {
            CycleOutcome::Stored { celsius, indicator, sequence } => {
                assert!((celsius - 40.0).abs() < 1e-9);
                assert_eq!(indicator, Indicator::Off);
                assert_eq!(sequence, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!((monitor.read_temperature().await - 40.0).abs() < 1e-9);
        let slots = monitor.snapshot_history(10).await;
        assert_eq!(slots[0].as_ref().unwrap().to_string(), "2023-12-15 10:00:00 40.00");
    }

    #[tokio::test]
    async fn test_cycle_drives_indicator() {
        let (sampler, monitor, hal) = sampler(1324, 64);
        monitor.set_threshold(39.5).await;

        sampler.cycle().await;
        assert!(hal.gpio_level(PIN));

        // hotter raw sample means colder reading: ~27 °C releases the latch
        hal.raw.store(1430, Ordering::SeqCst);
        sampler.cycle().await;
        assert!(!hal.gpio_level(PIN));
    }

    #[tokio::test]
    async fn test_sensor_failure_skips_cycle() {
        let (sampler, monitor, hal) = sampler(1324, 64);
        sampler.cycle().await;

        hal.fail_adc.store(true, Ordering::SeqCst);
        assert_eq!(sampler.cycle().await, CycleOutcome::Skipped);
        assert_eq!(monitor.status().await.records, 1);

        hal.fail_adc.store(false, Ordering::SeqCst);
        assert!(matches!(sampler.cycle().await, CycleOutcome::Stored { sequence: 2, .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_sample_never_reaches_state() {
        let (sampler, monitor, hal) = sampler(1324, 64);
        sampler.cycle().await;

        // u16 samples above ~7730 have no real root
        hal.raw.store(9000, Ordering::SeqCst);
        assert_eq!(sampler.cycle().await, CycleOutcome::Skipped);
        let t = monitor.read_temperature().await;
        assert!(t.is_finite() && (t - 40.0).abs() < 1e-9);
        assert_eq!(monitor.status().await.records, 1);
    }

    #[tokio::test]
    async fn test_full_store_keeps_loop_running() {
        // cursor + 2 records fit
        let (sampler, monitor, _) = sampler(1324, 3);
        assert!(matches!(sampler.cycle().await, CycleOutcome::Stored { sequence: 1, .. }));
        assert!(matches!(sampler.cycle().await, CycleOutcome::Stored { sequence: 2, .. }));
        assert!(matches!(sampler.cycle().await, CycleOutcome::NotStored { .. }));
        assert!(monitor.snapshot_history(10).await.iter().all(Option::is_none));
        assert!(matches!(sampler.cycle().await, CycleOutcome::Stored { sequence: 1, .. }));
    }
}
