//! Background clipboard watcher.
//!
//! One tokio task drives a fixed-interval clipboard sample and records every
//! change. The same task applies retention hourly and, when configured,
//! starts periodic syncs. Clipboard reads, PNG encoding and store writes all
//! run on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::clipboard::ClipboardAccess;
use crate::capture::detector::ChangeDetector;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::history::History;
use crate::sync::Reconciler;

const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodic sync settings for the watcher.
pub struct AutoSync {
    pub reconciler: Arc<Reconciler>,
    pub profile: String,
    pub interval: Duration,
}

pub struct WatcherOptions {
    pub poll_interval: Duration,
    /// `0` disables retention.
    pub retention_days: u32,
    pub retention_interval: Duration,
    pub auto_sync: Option<AutoSync>,
}

impl WatcherOptions {
    /// Options from the settings file, without auto sync.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            retention_days: config.history.retention_days,
            retention_interval: RETENTION_INTERVAL,
            auto_sync: None,
        }
    }

    #[must_use]
    pub fn with_auto_sync(mut self, auto_sync: AutoSync) -> Self {
        self.auto_sync = Some(auto_sync);
        self
    }
}

/// Handle to a running watcher task.
pub struct Watcher {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Watcher {
    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// Whatever is on the clipboard at startup is treated as already seen.
    pub fn spawn<C>(detector: ChangeDetector<C>, history: History, options: WatcherOptions) -> Self
    where
        C: ClipboardAccess + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch_loop(detector, history, options, cancel.clone()));
        Self { handle, cancel }
    }

    /// Token that stops the watcher when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for the task. Takes effect within one poll interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| Error::Other(format!("watcher task failed to join: {e}")))
    }
}

type SharedDetector<C> = Arc<Mutex<ChangeDetector<C>>>;

async fn watch_loop<C: ClipboardAccess + Send + 'static>(
    detector: ChangeDetector<C>,
    history: History,
    options: WatcherOptions,
    cancel: CancellationToken,
) {
    let detector: SharedDetector<C> = Arc::new(Mutex::new(detector));
    run_blocking("prime", {
        let detector = Arc::clone(&detector);
        move || {
            if let Ok(mut detector) = detector.lock() {
                detector.prime();
            }
        }
    })
    .await;

    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut retention = tokio::time::interval(options.retention_interval);
    retention.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sync_ticker = options.auto_sync.as_ref().map(|auto| {
        let mut t = tokio::time::interval_at(Instant::now() + auto.interval, auto.interval);
        t.set_missed_tick_behavior(MissedTickBehavior::Delay);
        t
    });
    let sync_in_flight = Arc::new(AtomicBool::new(false));

    info!(
        interval_ms = options.poll_interval.as_millis(),
        auto_sync = options.auto_sync.is_some(),
        "Clipboard watcher started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let detector = Arc::clone(&detector);
                let history = history.clone();
                run_blocking("sample", move || sample_and_record(&detector, &history)).await;
            }
            _ = retention.tick() => {
                if options.retention_days > 0 {
                    let history = history.clone();
                    let days = options.retention_days;
                    run_blocking("retention", move || apply_retention(&history, days)).await;
                }
            }
            () = next_tick(sync_ticker.as_mut()) => {
                if let Some(auto) = &options.auto_sync {
                    start_sync(auto, &sync_in_flight);
                }
            }
            () = cancel.cancelled() => {
                info!("Clipboard watcher shutting down");
                break;
            }
        }
    }
}

/// Run clipboard or store work on the blocking pool and wait for it.
async fn run_blocking<F>(what: &'static str, work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = tokio::task::spawn_blocking(work).await {
        warn!(task = what, error = %e, "Watcher task failed");
    }
}

fn sample_and_record<C: ClipboardAccess>(detector: &SharedDetector<C>, history: &History) {
    let change = match detector.lock() {
        Ok(mut detector) => detector.tick(),
        Err(_) => {
            warn!("Change detector lock poisoned");
            return;
        }
    };
    if let Some(change) = change {
        if let Err(e) = history.record(change) {
            warn!(error = %e, "Failed to record clipboard change");
        }
    }
}

fn apply_retention(history: &History, days: u32) {
    match history.apply_retention(days) {
        Ok(outcome) if outcome.removed > 0 => {
            debug!(removed = outcome.removed, "Periodic retention");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Periodic retention failed"),
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn start_sync(auto: &AutoSync, in_flight: &Arc<AtomicBool>) {
    if in_flight.swap(true, Ordering::SeqCst) {
        debug!("Previous sync still running, skipping");
        return;
    }

    let reconciler = Arc::clone(&auto.reconciler);
    let profile = auto.profile.clone();
    let in_flight = Arc::clone(in_flight);
    tokio::spawn(async move {
        let report = reconciler.sync_with_timeout(Some(profile)).await;
        in_flight.store(false, Ordering::SeqCst);
        if report.success {
            info!(message = %report.message, "Automatic sync");
        } else {
            warn!(message = %report.message, "Automatic sync failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryClipboard;
    use crate::events::{CoreEvent, EventBus};
    use crate::storage::{ImageStore, RawImage, SqliteStorage};
    use tempfile::TempDir;

    fn options() -> WatcherOptions {
        WatcherOptions {
            poll_interval: Duration::from_millis(10),
            retention_days: 30,
            retention_interval: RETENTION_INTERVAL,
            auto_sync: None,
        }
    }

    #[tokio::test]
    async fn test_watcher_records_changes_until_stopped() {
        let dir = TempDir::new().unwrap();
        let clipboard = MemoryClipboard::new();
        clipboard.set_text("before start").unwrap();

        let history = History::new(
            SqliteStorage::open_memory().unwrap(),
            ImageStore::new(dir.path()),
            Box::new(clipboard.clone()),
            EventBus::default(),
        );
        let mut rx = history.events().subscribe();
        let detector = ChangeDetector::new(
            clipboard.clone(),
            history.images().clone(),
            true,
            history.ignore_marker(),
        );

        let watcher = Watcher::spawn(detector, history.clone(), options());
        tokio::time::sleep(Duration::from_millis(50)).await;
        clipboard.set_text("copied while watching").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, CoreEvent::EntryAdded { .. }));

        watcher.stop().await.unwrap();

        let page = history.list(None, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].content, "copied while watching");
    }

    /// Clipboard whose every read takes a while, like a busy X11 owner.
    struct SlowClipboard;

    impl ClipboardAccess for SlowClipboard {
        fn read_text(&mut self) -> Result<Option<String>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(None)
        }

        fn read_image(&mut self) -> Result<Option<RawImage>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(None)
        }

        fn write_text(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn write_image(&mut self, _image: &RawImage) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_clipboard_does_not_stall_the_runtime() {
        let dir = TempDir::new().unwrap();
        let history = History::new(
            SqliteStorage::open_memory().unwrap(),
            ImageStore::new(dir.path()),
            Box::new(MemoryClipboard::new()),
            EventBus::default(),
        );
        let detector = ChangeDetector::new(
            SlowClipboard,
            history.images().clone(),
            true,
            history.ignore_marker(),
        );

        let watcher = Watcher::spawn(detector, history, options());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // This test runs on a single-threaded runtime: a sample executed on
        // it would hold up the timer for at least 300 ms.
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(200));

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let dir = TempDir::new().unwrap();
        let clipboard = MemoryClipboard::new();
        let history = History::new(
            SqliteStorage::open_memory().unwrap(),
            ImageStore::new(dir.path()),
            Box::new(clipboard.clone()),
            EventBus::default(),
        );
        let detector = ChangeDetector::new(clipboard, history.images().clone(), true, history.ignore_marker());
        let mut opts = options();
        opts.poll_interval = Duration::from_secs(3600);

        let watcher = Watcher::spawn(detector, history, opts);
        tokio::time::timeout(Duration::from_secs(5), watcher.stop())
            .await
            .unwrap()
            .unwrap();
    }
}
