use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Source of wall-clock time for age checks (update cache freshness).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Restart-on-signal timer: each `schedule` supersedes the pending one, so
/// only the last call inside a quiet period runs.
///
/// Runs on `tokio::time`, so a paused test runtime drives it virtually.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, after: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            task.await;
        });

        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drop the pending task if it has not fired yet. Returns whether one
    /// was still waiting.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording_task(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> impl Future<Output = ()> {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(value);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_last_scheduled_task_runs() {
        let debouncer = Debouncer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        debouncer.schedule(Duration::from_millis(1000), recording_task(&log, 1));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.schedule(Duration::from_millis(1000), recording_task(&log, 2));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.schedule(Duration::from_millis(1000), recording_task(&log, 3));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(log.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(log.lock().unwrap().as_slice(), &[3]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_pending_task() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        debouncer.schedule(Duration::from_millis(500), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_debouncer_cancels_pending_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        {
            let debouncer = Debouncer::new();
            debouncer.schedule(Duration::from_millis(500), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(90 * 60));
        assert_eq!(clock.now() - start, chrono::Duration::minutes(90));
    }
}
