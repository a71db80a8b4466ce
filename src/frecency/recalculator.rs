//! Frecency recalculation scheduler
//!
//! Keeps the cached frecency of pages and origins fresh without blocking
//! foreground writes:
//!
//! 1. The store flags a row stale and calls back into
//!    [`FrecencyRecalculator::maybe_start_frecency_recalculation`].
//! 2. That arms the pending flag and wakes the deferred task.
//! 3. After `task_interval` the task recalculates one chunk and re-arms
//!    itself while stale rows remain.
//!
//! Passes are serialized; the SQLite work of a pass runs on the blocking
//! pool. The pending flag is refreshed from the database after every pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

use super::interval::{RecalculationInterval, TokioInterval};
use super::topic::ObserverTopic;
use crate::config::RecalculatorConfig;
use crate::places::{ChunkOutcome, PlacesStore};
use crate::telemetry::{FRECENCY_RECALC_CHUNK_TIME_MS, TimingHistogram};
use crate::utils::{Result, SchedulerError, now_micros};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcState {
    /// Nothing is stale
    Idle,
    /// Stale rows exist, no pass in progress
    Pending,
    /// A chunked pass is in progress
    Running,
}

/// Background frecency recalculator
pub struct FrecencyRecalculator {
    store: PlacesStore,
    config: RecalculatorConfig,
    interval: Box<dyn RecalculationInterval>,
    histogram: Arc<TimingHistogram>,
    pending: AtomicBool,
    running: AtomicBool,
    /// Bumped on every external dirty notification
    dirty_generation: AtomicU64,
    pass_lock: Mutex<()>,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
}

impl FrecencyRecalculator {
    /// Create a recalculator with a tokio check interval and hook it up to
    /// the store's dirty notifications.
    pub fn new(store: PlacesStore, config: RecalculatorConfig) -> Arc<Self> {
        let interval = Box::new(TokioInterval::new(config.check_interval));
        Self::with_interval(store, config, interval)
    }

    /// Create a recalculator with a custom check interval
    pub fn with_interval(
        store: PlacesStore,
        config: RecalculatorConfig,
        interval: Box<dyn RecalculationInterval>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let recalculator = Arc::new(Self {
            store,
            config,
            interval,
            histogram: Arc::new(TimingHistogram::new(FRECENCY_RECALC_CHUNK_TIME_MS)),
            // Assume stale rows on cold start
            pending: AtomicBool::new(true),
            running: AtomicBool::new(false),
            dirty_generation: AtomicU64::new(0),
            pass_lock: Mutex::new(()),
            wake: Arc::new(Notify::new()),
            shutdown,
        });

        let weak = Arc::downgrade(&recalculator);
        recalculator.store.set_dirty_listener(Arc::new(move || {
            if let Some(recalculator) = weak.upgrade() {
                recalculator.maybe_start_frecency_recalculation();
            }
        }));

        recalculator
    }

    /// Whether stale pages or origins are known to exist
    pub fn is_recalculation_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Current scheduler state
    pub fn state(&self) -> RecalcState {
        if self.running.load(Ordering::SeqCst) {
            RecalcState::Running
        } else if self.is_recalculation_pending() {
            RecalcState::Pending
        } else {
            RecalcState::Idle
        }
    }

    /// Chunk timing histogram
    pub fn histogram(&self) -> Arc<TimingHistogram> {
        Arc::clone(&self.histogram)
    }

    /// The underlying history store
    pub fn store(&self) -> &PlacesStore {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &RecalculatorConfig {
        &self.config
    }

    /// Arm the pending state and wake the deferred task. Does no database
    /// work itself.
    pub fn maybe_start_frecency_recalculation(&self) {
        self.dirty_generation.fetch_add(1, Ordering::SeqCst);
        if !self.pending.swap(true, Ordering::SeqCst) {
            log::debug!("Frecency recalculation armed");
        }
        self.wake.notify_one();
    }

    /// Recalculate at most `chunk_size` stale pages and `chunk_size` stale
    /// origins. Remaining rows are left for later passes.
    pub async fn recalculate_some_frecencies(&self, chunk_size: usize) -> Result<ChunkOutcome> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown.into());
        }

        let _pass = self.pass_lock.lock().await;
        let running = RunningGuard::set(&self.running);
        let generation = self.dirty_generation.load(Ordering::SeqCst);

        let store = self.store.clone();
        let params = self.config.frecency.clone();
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            store.recalculate_chunk(chunk_size, &params, now_micros())
        })
        .await;
        drop(running);
        let outcome = result??;

        if !outcome.is_empty() {
            let elapsed = started.elapsed();
            self.histogram.record_duration(elapsed);
            log::debug!(
                "Recalculated frecency of {} pages and {} origins in {:?}",
                outcome.places_updated,
                outcome.origins_updated,
                elapsed
            );
        }

        self.settle_pending(generation, outcome.still_pending);
        Ok(outcome)
    }

    /// Recalculate every stale row, chunk by chunk. Returns the number of
    /// pages recalculated.
    pub async fn recalculate_any_outdated_frecencies(&self) -> Result<usize> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut total = 0;
        loop {
            let outcome = self.recalculate_some_frecencies(chunk_size).await?;
            total += outcome.places_updated;
            if !outcome.still_pending {
                break;
            }
        }
        log::info!("Recalculated frecency of {} outdated pages", total);
        Ok(total)
    }

    /// Decay all page frecencies by the configured rate, then schedule the
    /// origins for recalculation.
    pub async fn decay(&self) -> Result<usize> {
        let store = self.store.clone();
        let rate = self.config.decay_rate;
        let decayed = tokio::task::spawn_blocking(move || store.decay(rate)).await??;
        self.maybe_start_frecency_recalculation();
        Ok(decayed)
    }

    /// Handle an observer notification
    pub async fn observe(&self, topic: ObserverTopic) -> Result<()> {
        log::trace!("Got {} topic", topic);
        match topic {
            ObserverTopic::Idle => {
                self.interval.stop();
            }
            ObserverTopic::Active => {
                // New stale rows restart the work; returning from idle alone
                // does not.
            }
            ObserverTopic::IdleDaily => {
                self.decay().await?;
            }
            ObserverTopic::RecalculationNeeded => {
                self.maybe_start_frecency_recalculation();
            }
            ObserverTopic::TestExecuteTask => {
                self.run_task().await?;
            }
        }
        Ok(())
    }

    /// Start the deferred task loop and the check interval. Must be called
    /// from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.interval.start(Arc::clone(&self.wake));
        if self.is_recalculation_pending() {
            self.wake.notify_one();
        }

        let this = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = this.wake.notified() => {}
                    _ = shutdown.changed() => break,
                }
                // Let bursts of writes coalesce into one chunk
                tokio::select! {
                    _ = tokio::time::sleep(this.config.task_interval) => {}
                    _ = shutdown.changed() => break,
                }
                if let Err(e) = this.run_task().await {
                    log::warn!("Frecency recalculation failed: {}", e);
                }
            }
            this.interval.stop();
            log::debug!("Frecency recalculation task stopped");
        })
    }

    /// Stop the deferred task and the check interval
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.interval.stop();
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Body of the deferred task: check the database, run one chunk, and
    /// re-arm while work remains.
    async fn run_task(&self) -> Result<()> {
        if !self.refresh_pending().await? {
            return Ok(());
        }

        let outcome = self
            .recalculate_some_frecencies(self.config.chunk_size.max(1))
            .await?;
        if outcome.still_pending {
            self.wake.notify_one();
        }
        Ok(())
    }

    async fn refresh_pending(&self) -> Result<bool> {
        let generation = self.dirty_generation.load(Ordering::SeqCst);
        let store = self.store.clone();
        let outdated = tokio::task::spawn_blocking(move || store.has_outdated()).await??;
        self.settle_pending(generation, outdated);
        Ok(self.is_recalculation_pending())
    }

    // A dirty notification that raced with the database read keeps the
    // flag set; its row may have been committed after the read.
    fn settle_pending(&self, generation: u64, outdated: bool) {
        let raced = self.dirty_generation.load(Ordering::SeqCst) != generation;
        self.pending.store(outdated || raced, Ordering::SeqCst);
    }
}

/// Clears the running flag when a pass ends, including when its future is
/// dropped mid-flight.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frecency::interval::MockRecalculationInterval;
    use crate::places::VisitTransition;
    use crate::utils::PlacesError;
    use std::time::Duration;

    fn idle_interval() -> Box<MockRecalculationInterval> {
        let mut interval = MockRecalculationInterval::new();
        interval.expect_start().return_const(());
        interval.expect_stop().return_const(());
        Box::new(interval)
    }

    fn recalculator() -> Arc<FrecencyRecalculator> {
        let store = PlacesStore::open_in_memory().unwrap();
        FrecencyRecalculator::with_interval(store, RecalculatorConfig::default(), idle_interval())
    }

    #[test]
    fn test_cold_start_is_pending() {
        let recalc = recalculator();
        assert!(recalc.is_recalculation_pending());
        assert_eq!(recalc.state(), RecalcState::Pending);
    }

    #[tokio::test]
    async fn test_recalculate_any_clears_pending() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://example.com/", None).unwrap();

        let updated = recalc.recalculate_any_outdated_frecencies().await.unwrap();
        assert_eq!(updated, 1);
        assert!(!recalc.is_recalculation_pending());
        assert_eq!(recalc.state(), RecalcState::Idle);
        assert!(recalc.store().origin_frecency("example.com").unwrap().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_empty_pass_records_no_sample() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://example.com/", None).unwrap();

        recalc.recalculate_any_outdated_frecencies().await.unwrap();
        let samples = recalc.histogram().sample_count();
        assert_eq!(samples, 1);

        recalc.recalculate_any_outdated_frecencies().await.unwrap();
        recalc.recalculate_some_frecencies(10).await.unwrap();
        assert_eq!(recalc.histogram().sample_count(), samples);
    }

    #[tokio::test]
    async fn test_cancelled_pass_is_not_running() {
        let recalc = recalculator();
        for i in 0..2000 {
            recalc
                .store()
                .insert_bookmark(&format!("https://host{}.example/", i), None)
                .unwrap();
        }

        let mut pass = tokio_test::task::spawn(recalc.recalculate_some_frecencies(2000));
        let in_flight = pass.poll().is_pending();
        if in_flight {
            assert_eq!(recalc.state(), RecalcState::Running);
        }
        drop(pass);

        assert_ne!(recalc.state(), RecalcState::Running);
        if in_flight {
            assert_eq!(recalc.state(), RecalcState::Pending);
        }
    }

    #[test]
    fn test_dirty_write_during_pass_keeps_pending() {
        let recalc = recalculator();
        recalc.settle_pending(recalc.dirty_generation.load(Ordering::SeqCst), false);
        assert!(!recalc.is_recalculation_pending());

        let generation = recalc.dirty_generation.load(Ordering::SeqCst);
        recalc.maybe_start_frecency_recalculation();
        recalc.settle_pending(generation, false);
        assert!(recalc.is_recalculation_pending());

        let generation = recalc.dirty_generation.load(Ordering::SeqCst);
        recalc.settle_pending(generation, false);
        assert!(!recalc.is_recalculation_pending());
    }

    #[tokio::test]
    async fn test_chunked_passes() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://a.example/", None).unwrap();
        recalc.store().insert_bookmark("https://b.example/", None).unwrap();
        recalc.recalculate_any_outdated_frecencies().await.unwrap();

        recalc.store().mark_outdated("https://a.example/").unwrap();
        recalc.store().mark_outdated("https://b.example/").unwrap();

        let outcome = recalc.recalculate_some_frecencies(1).await.unwrap();
        assert_eq!(outcome.places_updated, 1);
        assert!(recalc.is_recalculation_pending());

        recalc.recalculate_some_frecencies(2).await.unwrap();
        assert!(!recalc.is_recalculation_pending());
    }

    #[tokio::test]
    async fn test_outside_write_arms_pending() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://example.com/", None).unwrap();
        recalc.recalculate_any_outdated_frecencies().await.unwrap();
        assert!(!recalc.is_recalculation_pending());

        assert!(recalc.store().mark_outdated("https://example.com/").unwrap());
        assert!(recalc.is_recalculation_pending());
    }

    #[test]
    fn test_maybe_start_wakes_deferred_task() {
        let recalc = recalculator();
        recalc.maybe_start_frecency_recalculation();
        // The stored permit completes the wait immediately
        tokio_test::block_on(recalc.wake.notified());
        assert!(recalc.is_recalculation_pending());
    }

    #[tokio::test]
    async fn test_idle_stops_interval_and_active_does_not_restart() {
        let mut interval = MockRecalculationInterval::new();
        interval.expect_stop().times(1).return_const(());
        interval.expect_start().times(0);

        let store = PlacesStore::open_in_memory().unwrap();
        let recalc =
            FrecencyRecalculator::with_interval(store, RecalculatorConfig::default(), Box::new(interval));

        recalc.observe(ObserverTopic::Idle).await.unwrap();
        recalc.observe(ObserverTopic::Active).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_task_topic_runs_one_chunk() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://example.com/", None).unwrap();

        recalc.observe(ObserverTopic::TestExecuteTask).await.unwrap();
        assert!(!recalc.is_recalculation_pending());
        assert_eq!(recalc.store().origin_frecency("example.com").unwrap(), Some(140));
    }

    #[tokio::test]
    async fn test_execute_task_without_work() {
        let recalc = recalculator();
        recalc.observe(ObserverTopic::TestExecuteTask).await.unwrap();
        assert!(!recalc.is_recalculation_pending());
        assert_eq!(recalc.histogram().sample_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_daily_decays() {
        let recalc = recalculator();
        recalc.store().insert_bookmark("https://example.com/", None).unwrap();
        recalc.recalculate_any_outdated_frecencies().await.unwrap();

        recalc.observe(ObserverTopic::IdleDaily).await.unwrap();
        assert!(recalc.is_recalculation_pending());

        recalc.recalculate_any_outdated_frecencies().await.unwrap();
        // 140 * 0.975 = 136.5, truncated
        assert_eq!(recalc.store().origin_frecency("example.com").unwrap(), Some(136));
    }

    #[tokio::test]
    async fn test_recalculation_needed_topic() {
        let recalc = recalculator();
        recalc.recalculate_any_outdated_frecencies().await.unwrap();
        assert!(!recalc.is_recalculation_pending());

        recalc.observe(ObserverTopic::RecalculationNeeded).await.unwrap();
        assert!(recalc.is_recalculation_pending());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_passes() {
        let recalc = recalculator();
        recalc.shutdown();
        assert!(recalc.is_shut_down());
        assert!(matches!(
            recalc.recalculate_some_frecencies(10).await,
            Err(PlacesError::Scheduler(SchedulerError::ShutDown))
        ));
    }

    #[tokio::test]
    async fn test_background_task_drains_stale_rows() {
        let store = PlacesStore::open_in_memory().unwrap();
        let config = RecalculatorConfig::default()
            .with_chunk_size(1)
            .with_task_interval(Duration::from_millis(5))
            .with_check_interval(Duration::from_millis(20));
        let recalc = FrecencyRecalculator::new(store, config);
        let task = recalc.start();

        let now = now_micros();
        for i in 0..3 {
            recalc
                .store()
                .add_visit(&format!("https://site{}.example/", i), now, VisitTransition::Link)
                .unwrap();
        }
        assert!(recalc.is_recalculation_pending());

        let drained = async {
            while recalc.is_recalculation_pending() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), drained)
            .await
            .expect("background task should drain stale rows");

        for i in 0..3 {
            let host = format!("site{}.example", i);
            assert_eq!(recalc.store().origin_frecency(&host).unwrap(), Some(100));
        }

        recalc.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("task should stop")
            .unwrap();
    }
}
