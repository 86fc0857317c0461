//! Proactive access-token refresh
//!
//! The scheduler is a two-state machine: Idle when no session is active,
//! Armed while a recurring check runs. Each check decides from the token's
//! embedded expiry whether a refresh is due; the manager supplies the check.

use super::task::TaskSlot;
use crate::utils::jwt;
use crate::utils::logging::LoggingHelper;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default time between expiry checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default margin before expiry at which a refresh is requested
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Shortest accepted time between checks
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted time between checks; tokio instants overflow well past this
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Armed,
}

/// Recurring expiry check tied to the session lifecycle
pub struct RefreshScheduler {
    interval: Duration,
    buffer: Duration,
    timer: TaskSlot,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(interval: Duration, buffer: Duration) -> Self {
        Self {
            interval: interval.clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL),
            buffer,
            timer: TaskSlot::default(),
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Whether `token` is inside the refresh buffer at `now`
    #[must_use]
    pub fn is_due(&self, token: &str, now: DateTime<Utc>) -> bool {
        let buffer = chrono::Duration::from_std(self.buffer).unwrap_or(chrono::Duration::MAX);
        let remaining = jwt::time_until_expiry(token, now);
        let due = jwt::needs_refresh(token, now, buffer);
        LoggingHelper::log_refresh_check(remaining.map(|d| d.num_seconds()), due);
        due
    }

    /// Start the recurring check; no-op while a live timer exists
    ///
    /// `tick` runs once per interval, the first time one interval after
    /// arming. Returning `false` from it stops the timer.
    pub fn arm<F, Fut>(&self, tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = self.interval;
        let started = self.timer.spawn_if_idle(move || async move {
            let mut tick = tick;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick().await {
                    break;
                }
            }
        });

        if started {
            LoggingHelper::log_refresh_transition(
                true,
                self.interval.as_secs(),
                self.buffer.as_secs(),
            );
        }
        started
    }

    /// Cancel the timer and return to Idle
    pub fn disarm(&self) -> bool {
        let cancelled = self.timer.cancel();
        if cancelled {
            LoggingHelper::log_refresh_transition(false, 0, 0);
        }
        cancelled
    }

    #[must_use]
    pub fn state(&self) -> RefreshState {
        if self.timer.is_active() {
            RefreshState::Armed
        } else {
            RefreshState::Idle
        }
    }

    /// Number of timers created so far
    #[must_use]
    pub fn timers_started(&self) -> usize {
        self.timer.started()
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, DEFAULT_REFRESH_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_is_due_inside_buffer() {
        let scheduler = RefreshScheduler::default();
        let now = Utc::now();

        let soon = TestFixtures::access_token_expiring_in(chrono::Duration::minutes(4));
        let later = TestFixtures::access_token_expiring_in(chrono::Duration::minutes(30));

        assert!(scheduler.is_due(&soon, now));
        assert!(!scheduler.is_due(&later, now));
        assert!(!scheduler.is_due("opaque", now));
    }

    #[test]
    fn test_interval_is_clamped() {
        let scheduler = RefreshScheduler::new(Duration::ZERO, DEFAULT_REFRESH_BUFFER);
        assert_eq!(scheduler.interval(), MIN_CHECK_INTERVAL);

        let scheduler = RefreshScheduler::new(Duration::from_secs(u64::MAX), DEFAULT_REFRESH_BUFFER);
        assert_eq!(scheduler.interval(), MAX_CHECK_INTERVAL);

        let scheduler = RefreshScheduler::new(MAX_CHECK_INTERVAL, DEFAULT_REFRESH_BUFFER);
        assert_eq!(scheduler.interval(), MAX_CHECK_INTERVAL);
    }

    #[tokio::test]
    async fn test_huge_interval_keeps_timer_alive() {
        let scheduler = RefreshScheduler::new(Duration::from_secs(u64::MAX), DEFAULT_REFRESH_BUFFER);

        assert!(scheduler.arm(|| async { true }));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.state(), RefreshState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_interval() {
        let scheduler = RefreshScheduler::new(Duration::from_secs(60), DEFAULT_REFRESH_BUFFER);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        assert!(scheduler.arm(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        }));
        assert_eq!(scheduler.state(), RefreshState::Armed);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_does_not_duplicate_timer() {
        let scheduler = RefreshScheduler::default();

        assert!(scheduler.arm(|| async { true }));
        assert!(!scheduler.arm(|| async { true }));
        assert_eq!(scheduler.timers_started(), 1);

        assert!(scheduler.disarm());
        assert_eq!(scheduler.state(), RefreshState::Idle);
        assert!(!scheduler.disarm());

        assert!(scheduler.arm(|| async { true }));
        assert_eq!(scheduler.timers_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_stops_timer() {
        let scheduler = RefreshScheduler::new(Duration::from_secs(10), DEFAULT_REFRESH_BUFFER);
        scheduler.arm(|| async { false });

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.state(), RefreshState::Idle);
    }
}
