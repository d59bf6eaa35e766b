//! PollingScheduler - cancellable fixed-cadence tick driving the poll operation.
//!
//! `start` spawns the tick loop and returns a `PollHandle`. The first tick
//! fires immediately, then every `interval`. A tick is a no-op while the
//! enable accessor returns false. Ticks never overlap: the loop awaits the
//! tick's future before waiting for the next tick, and ticks missed while a
//! poll was outstanding are skipped rather than burst.
//!
//! Cancelling (or dropping) the handle flips the shared `Liveness` flag,
//! signals the loop and aborts it; callbacks check `Liveness` before they
//! mutate shared state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shared "scheduler active" flag handed to every tick.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// A liveness that is never cancelled, for polls driven by hand.
    pub fn always() -> Self {
        Self::new()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// Request ids with a poll outstanding. Holding a permit excludes any other
/// poll of the same id, whether scheduled or manual.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another poll of `request_id` is outstanding.
    pub fn try_acquire(&self, request_id: &str) -> Option<InFlightPermit> {
        let mut ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(request_id.to_string()) {
            return None;
        }
        Some(InFlightPermit {
            ids: self.0.clone(),
            request_id: request_id.to_string(),
        })
    }

    pub fn contains(&self, request_id: &str) -> bool {
        let ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        ids.contains(request_id)
    }
}

/// Released on drop, including when the polling task is aborted mid-flight.
#[derive(Debug)]
pub struct InFlightPermit {
    ids: Arc<Mutex<HashSet<String>>>,
    request_id: String,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.remove(&self.request_id);
    }
}

/// Something the scheduler can drive: one call per enabled tick.
#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll_tick(&self, liveness: &Liveness);
}

// ---------------------------------------------------------------------------
// PollingScheduler
// ---------------------------------------------------------------------------

/// Shortest cadence a scheduler will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct PollingScheduler {
    interval: Duration,
}

impl PollingScheduler {
    /// Intervals below [`MIN_INTERVAL`] (including zero) are raised to it.
    pub fn new(interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_INTERVAL.as_millis() as u64,
                "Poll interval too short, clamping"
            );
        }
        Self {
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the tick loop on the current runtime.
    pub fn start<E, T, Fut>(&self, is_enabled: E, mut on_tick: T) -> PollHandle
    where
        E: Fn() -> bool + Send + Sync + 'static,
        T: FnMut(Liveness) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let liveness = Liveness::new();
        let live = liveness.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::debug!(
                interval_ms = interval.as_millis() as u64,
                "Polling scheduler started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                if !live.is_active() {
                    break;
                }
                if !is_enabled() {
                    tracing::trace!("Auto-poll disabled, tick skipped");
                    continue;
                }

                let tick = on_tick(live.clone());
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = tick => {}
                }
            }

            tracing::debug!("Polling scheduler stopped");
        });

        PollHandle {
            shutdown: shutdown_tx,
            liveness,
            task,
        }
    }

    /// Drive `target` on every enabled tick.
    pub fn start_polling<T, E>(&self, target: Arc<T>, is_enabled: E) -> PollHandle
    where
        T: PollTarget + ?Sized + 'static,
        E: Fn() -> bool + Send + Sync + 'static,
    {
        self.start(is_enabled, move |live| {
            let target = target.clone();
            async move { target.poll_tick(&live).await }
        })
    }
}

// ---------------------------------------------------------------------------
// PollHandle
// ---------------------------------------------------------------------------

/// Owning handle of a running tick loop; dropping it stops the loop.
#[derive(Debug)]
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    liveness: Liveness,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the loop. No tick fires after this returns. Idempotent.
    pub fn cancel(&self) {
        self.liveness.deactivate();
        let _ = self.shutdown.send(true);
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        self.liveness.is_active() && !self.task.is_finished()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const INTERVAL: Duration = Duration::from_millis(2000);

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_immediately() {
        let ticks = counter();
        let t = ticks.clone();
        let _handle = PollingScheduler::new(INTERVAL).start(
            || true,
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let scheduler = PollingScheduler::new(Duration::ZERO);
        assert_eq!(scheduler.interval(), MIN_INTERVAL);

        let ticks = counter();
        let t = ticks.clone();
        let handle = scheduler.start(
            || true,
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        // t = 0, 100, 200
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_fixed_cadence() {
        let ticks = counter();
        let t = ticks.clone();
        let _handle = PollingScheduler::new(INTERVAL).start(
            || true,
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        // t = 0, 2000, 4000
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_ticks_do_nothing() {
        let ticks = counter();
        let enabled = Arc::new(AtomicBool::new(false));
        let t = ticks.clone();
        let e = enabled.clone();
        let _handle = PollingScheduler::new(INTERVAL).start(
            move || e.load(Ordering::SeqCst),
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        enabled.store(true, Ordering::SeqCst);
        // next tick at t = 8000
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_ticks() {
        let ticks = counter();
        let t = ticks.clone();
        let handle = PollingScheduler::new(INTERVAL).start(
            || true,
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        handle.cancel();
        assert!(!handle.liveness().is_active());
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let ticks = counter();
        let t = ticks.clone();
        let handle = PollingScheduler::new(INTERVAL).start(
            || true,
            move |_| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        let liveness = handle.liveness();

        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(handle);
        assert!(!liveness.is_active());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn in_flight_permit_excludes_until_dropped() {
        let in_flight = InFlight::new();
        let permit = in_flight.try_acquire("R1").unwrap();
        assert!(in_flight.try_acquire("R1").is_none());
        assert!(in_flight.try_acquire("R2").is_some());
        assert!(in_flight.contains("R1"));

        drop(permit);
        assert!(!in_flight.contains("R1"));
        assert!(in_flight.try_acquire("R1").is_some());
    }

    struct Target(Arc<AtomicUsize>);

    #[async_trait]
    impl PollTarget for Target {
        async fn poll_tick(&self, liveness: &Liveness) {
            if liveness.is_active() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_polling_drives_a_target() {
        let ticks = counter();
        let _handle = PollingScheduler::new(INTERVAL).start_polling(Arc::new(Target(ticks.clone())), || true);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_never_overlap() {
        let running = counter();
        let max_running = counter();
        let ticks = counter();
        let (r, m, t) = (running.clone(), max_running.clone(), ticks.clone());

        let _handle = PollingScheduler::new(INTERVAL).start(
            || true,
            move |_| {
                let (r, m, t) = (r.clone(), m.clone(), t.clone());
                async move {
                    let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5000)).await;
                    r.fetch_sub(1, Ordering::SeqCst);
                    t.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(11_000)).await;
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
