use std::sync::Mutex;

const APP_NAME: &str = "Review Popup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// Short-lived user-facing notice for settings and audio outcomes.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: ToastLevel, body: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, level: ToastLevel, body: &str) {
        send(level, body);
    }
}

/// Show a desktop notification. The D-Bus round trip blocks, so inside a
/// tokio runtime it runs on the blocking pool.
pub fn send(level: ToastLevel, body: impl Into<String>) {
    let body = body.into();
    off_runtime(move || show(level, &body));
}

fn off_runtime(job: impl FnOnce() + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(job);
        }
        Err(_) => job(),
    }
}

fn show(level: ToastLevel, body: &str) {
    let summary = match level {
        ToastLevel::Success => APP_NAME.to_string(),
        ToastLevel::Error => format!("{APP_NAME}: error"),
    };

    if let Err(err) = notify_rust::Notification::new()
        .appname(APP_NAME)
        .summary(&summary)
        .body(body)
        .show()
    {
        tracing::warn!(?level, "system notification failed: {err}");
    }
}

/// Keeps toasts in memory instead of showing them.
#[derive(Debug, Default)]
pub struct ToastLog {
    entries: Mutex<Vec<(ToastLevel, String)>>,
}

impl ToastLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(ToastLevel, String)> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, level: ToastLevel) -> usize {
        self.entries()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .count()
    }
}

impl Notifier for ToastLog {
    fn notify(&self, level: ToastLevel, body: &str) {
        tracing::debug!(?level, body, "toast");
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((level, body.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn inside_runtime_blocking_work_leaves_the_worker_thread() {
        let caller = std::thread::current().id();
        let (tx, rx) = tokio::sync::oneshot::channel();

        off_runtime(move || {
            let _ = tx.send(std::thread::current().id());
        });

        let worker = rx.await.expect("job should run");
        assert_ne!(worker, caller);
    }

    #[test]
    fn without_runtime_work_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        off_runtime(move || flag.store(true, Ordering::SeqCst));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn toast_log_counts_by_level() {
        let log = ToastLog::new();
        log.notify(ToastLevel::Success, "saved");
        log.notify(ToastLevel::Error, "failed");
        log.notify(ToastLevel::Error, "failed again");

        assert_eq!(log.count(ToastLevel::Error), 2);
        assert_eq!(log.entries()[0], (ToastLevel::Success, "saved".to_string()));
    }
}
