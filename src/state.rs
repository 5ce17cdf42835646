//! ==============================================================================
//! state.rs - shared state coordinator
//! ==============================================================================
//!
//! purpose:
//!     the single owner of everything the sampling loop and the web handlers
//!     share: the current temperature, the threshold controller and the
//!     history log. all access goes through `Monitor`, a clone-able handle.
//!
//! writers:
//!     - sampling loop: temperature, threshold latch (apply_threshold), history
//!       appends
//!     - web handlers: threshold value (set_threshold), history clear
//!
//! locking:
//!     - temperature: tokio RwLock, many readers OR the sampler
//!     - threshold: tokio Mutex, evaluation and replacement are serialised, the
//!       indicator pin is written while holding it so pin and latch agree
//!     - history: std Mutex taken inside spawn_blocking. append, last and clear
//!       are each one transaction; every transaction is bounded by the storage
//!       timeout and a timeout counts as a storage failure (store wiped)
//!
//! ==============================================================================

use crate::hal::HardwareProvider;
use crate::history::{HistoryLog, HistoryRecord};
use crate::hysteresis::{Indicator, ThresholdState};
use crate::store::StorageError;

use serde::Serialize;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// everything the status endpoint reports
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub temperature: f64,
    pub threshold: f64,
    pub overcome: bool,
    pub enabled: bool,
    pub indicator: Indicator,
    pub records: u16,
}

#[derive(Clone)]
pub struct Monitor {
    temperature: Arc<RwLock<f64>>,
    threshold: Arc<Mutex<ThresholdState>>,
    history: Arc<std::sync::Mutex<HistoryLog>>,
    hal: Arc<dyn HardwareProvider>,
    indicator_pin: u8,
    storage_timeout: Duration,
}

impl Monitor {
    pub fn new(
        history: HistoryLog,
        hal: Arc<dyn HardwareProvider>,
        indicator_pin: u8,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            temperature: Arc::new(RwLock::new(0.0)),
            threshold: Arc::new(Mutex::new(ThresholdState::default())),
            history: Arc::new(std::sync::Mutex::new(history)),
            hal,
            indicator_pin,
            storage_timeout,
        }
    }

    // ==========================================================================
    // reads (web handlers)
    // ==========================================================================

    pub async fn read_temperature(&self) -> f64 {
        *self.temperature.read().await
    }

    pub async fn read_threshold(&self) -> ThresholdState {
        *self.threshold.lock().await
    }

    /// most recent `n` history slots, newest first. storage trouble yields
    /// empty slots, never an error.
    pub async fn snapshot_history(&self, n: usize) -> Vec<Option<HistoryRecord>> {
        self.with_history("snapshot", move |log| log.last(n))
            .await
            .unwrap_or_else(|_| vec![None; n])
    }

    pub async fn status(&self) -> Status {
        let temperature = self.read_temperature().await;
        let threshold = self.read_threshold().await;
        let records = self.with_history("count", |log| log.count()).await.unwrap_or(0);

        Status {
            temperature,
            threshold: threshold.value,
            overcome: threshold.overcome,
            enabled: threshold.is_enabled(),
            indicator: if self.hal.gpio_level(self.indicator_pin) { Indicator::On } else { Indicator::Off },
            records,
        }
    }

    // ==========================================================================
    // writes (web handlers)
    // ==========================================================================

    /// replace the threshold. the latch is cleared and the indicator forced
    /// off before the next evaluation can run.
    pub async fn set_threshold(&self, value: f64) {
        let mut threshold = self.threshold.lock().await;
        let indicator = threshold.set(value);
        self.drive_indicator(indicator);
        info!("[THRESHOLD] Set to {:.2}", value);
    }

    pub async fn clear_history(&self) {
        if self.with_history("clear", |log| log.clear()).await.is_ok() {
            info!("[HISTORY] Cleared on request");
        }
    }

    // ==========================================================================
    // writes (sampling loop)
    // ==========================================================================

    pub async fn record_temperature(&self, celsius: f64) {
        *self.temperature.write().await = celsius;
    }

    /// run one controller step and drive the indicator accordingly
    pub async fn apply_threshold(&self, celsius: f64) -> Indicator {
        let mut threshold = self.threshold.lock().await;
        let indicator = threshold.evaluate(celsius);
        self.drive_indicator(indicator);
        indicator
    }

    pub async fn append_history(&self, timestamp: String, celsius: f64) -> Result<u16, StorageError> {
        self.with_history("append", move |log| log.append(&timestamp, celsius))
            .await?
    }

    // ==========================================================================
    // internals
    // ==========================================================================

    fn drive_indicator(&self, indicator: Indicator) {
        let level = indicator.is_on();
        if self.hal.gpio_level(self.indicator_pin) == level {
            return;
        }
        if let Err(e) = self.hal.write_gpio(self.indicator_pin, level) {
            warn!("[GPIO] Failed to drive indicator pin {}: {:#}", self.indicator_pin, e);
        }
    }

    /// run one history transaction off the async workers, bounded by the
    /// storage timeout
    async fn with_history<T, F>(&self, op: &'static str, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut HistoryLog) -> T + Send + 'static,
        T: Send + 'static,
    {
        let history = self.history.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut log = history.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut log)
        });

        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("[HISTORY] {} transaction aborted: {} -> clearing store", op, e);
                self.spawn_recovery();
                Err(StorageError::Io(std::io::Error::other(e.to_string())))
            }
            Err(_) => {
                warn!(
                    "[HISTORY] {} transaction exceeded {:?} -> clearing store",
                    op, self.storage_timeout
                );
                self.spawn_recovery();
                Err(StorageError::Timeout)
            }
        }
    }

    /// wipe the log once the stuck transaction lets go of it
    fn spawn_recovery(&self) {
        let history = self.history.clone();
        tokio::task::spawn_blocking(move || {
            history.lock().unwrap_or_else(PoisonError::into_inner).clear();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::TestHal;
    use crate::history::COUNT_KEY;
    use crate::hysteresis::DISABLED_THRESHOLD;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::atomic::{AtomicBool, Ordering};

    const PIN: u8 = 4;
    const TS: &str = "2023-12-15 10:00:00";

    fn monitor() -> (Monitor, Arc<TestHal>) {
        let hal = Arc::new(TestHal::new(1450));
        let log = HistoryLog::new(Box::new(MemoryStore::new("temp_mem", 256)));
        (Monitor::new(log, hal.clone(), PIN, Duration::from_millis(500)), hal)
    }

    /// store whose cursor reads stall while `slow` is set
    struct SlowStore {
        inner: MemoryStore,
        slow: Arc<AtomicBool>,
    }

    impl KvStore for SlowStore {
        fn get_u16(&self, key: &str) -> Result<u16, StorageError> {
            if self.slow.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.inner.get_u16(key)
        }
        fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
            self.inner.set_u16(key, value)
        }
        fn get_str(&self, key: &str) -> Result<String, StorageError> {
            self.inner.get_str(key)
        }
        fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set_str(key, value)
        }
        fn erase_all(&mut self) -> Result<(), StorageError> {
            self.inner.erase_all()
        }
        fn commit(&mut self) -> Result<(), StorageError> {
            self.inner.commit()
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (monitor, _) = monitor();
        assert_eq!(monitor.read_temperature().await, 0.0);
        let threshold = monitor.read_threshold().await;
        assert_eq!(threshold.value, DISABLED_THRESHOLD);
        assert!(!threshold.overcome);
        assert!(monitor.snapshot_history(10).await.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_threshold_drives_indicator() {
        let (monitor, hal) = monitor();
        monitor.set_threshold(25.0).await;

        let mut levels = Vec::new();
        for t in [24.0, 25.0, 24.5, 23.9] {
            monitor.apply_threshold(t).await;
            levels.push(hal.gpio_level(PIN));
        }
        assert_eq!(levels, vec![false, true, true, false]);
    }

    #[tokio::test]
    async fn test_set_threshold_forces_indicator_off() {
        let (monitor, hal) = monitor();
        monitor.set_threshold(25.0).await;
        assert_eq!(monitor.apply_threshold(30.0).await, Indicator::On);
        assert!(hal.gpio_level(PIN));

        monitor.set_threshold(40.0).await;
        assert!(!hal.gpio_level(PIN));
        assert!(!monitor.read_threshold().await.overcome);
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let (monitor, _) = monitor();
        for v in [20.0, 21.5, 19.75] {
            monitor.append_history(TS.to_string(), v).await.unwrap();
        }

        let rendered: Vec<String> = monitor
            .snapshot_history(10)
            .await
            .iter()
            .map(|s| s.as_ref().map(|r| r.to_string()).unwrap_or_default())
            .collect();
        assert_eq!(rendered[0], "2023-12-15 10:00:00 19.75");
        assert_eq!(rendered[1], "2023-12-15 10:00:00 21.50");
        assert_eq!(rendered[2], "2023-12-15 10:00:00 20.00");
        assert!(rendered[3..].iter().all(String::is_empty));

        let status = monitor.status().await;
        assert_eq!(status.records, 3);

        monitor.clear_history().await;
        assert_eq!(monitor.status().await.records, 0);
    }

    #[tokio::test]
    async fn test_status_reports_state() {
        let (monitor, _) = monitor();
        monitor.record_temperature(26.0).await;
        monitor.set_threshold(25.0).await;
        monitor.apply_threshold(26.0).await;

        let status = monitor.status().await;
        assert_eq!(status.temperature, 26.0);
        assert_eq!(status.threshold, 25.0);
        assert!(status.overcome);
        assert!(status.enabled);
        assert_eq!(status.indicator, Indicator::On);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_storage_timeout_wipes_history() {
        let mut store = MemoryStore::new("temp_mem", 16);
        store.set_u16(COUNT_KEY, 1).unwrap();
        store.set_str("t1", "2023-12-15 10:00:00 20.00").unwrap();
        let slow = Arc::new(AtomicBool::new(true));
        let log = HistoryLog::new(Box::new(SlowStore { inner: store, slow: slow.clone() }));
        let monitor = Monitor::new(log, Arc::new(TestHal::new(1450)), PIN, Duration::from_millis(50));

        assert!(matches!(
            monitor.append_history(TS.to_string(), 21.0).await,
            Err(StorageError::Timeout)
        ));

        // the stalled append still lands; recovery must wipe it afterwards
        slow.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(monitor.status().await.records, 0);
        assert!(monitor.snapshot_history(10).await.iter().all(Option::is_none));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshots_never_see_partial_appends() {
        let (monitor, _) = monitor();

        let writer = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    monitor.record_temperature(f64::from(i)).await;
                    monitor.append_history(TS.to_string(), f64::from(i)).await.unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let slots = monitor.snapshot_history(10).await;
                        let filled: Vec<u16> =
                            slots.iter().map_while(|s| s.as_ref().map(|r| r.sequence)).collect();
                        // filled slots form one contiguous, newest-first run
                        for pair in filled.windows(2) {
                            assert_eq!(pair[0], pair[1] + 1);
                        }
                        assert!(slots[filled.len()..].iter().all(Option::is_none));
                        let t = monitor.read_temperature().await;
                        assert!((0.0..100.0).contains(&t));
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(monitor.status().await.records, 100);
    }
}
