use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::lock;

/// Delays an action until no newer action arrived for the quiet period.
///
/// Each call replaces the pending action. A forced call runs immediately on the caller's
/// task and also drops whatever was pending.
#[derive(Default)]
pub struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounce<F>(&self, delay: Duration, force: bool, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        if force {
            drop(pending);
            action();
            return;
        }

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.pending).take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_last_value() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=5 {
            let sink = Arc::clone(&fired);
            debouncer.debounce(Duration::from_secs(1), false, move || {
                sink.lock().unwrap().push(value);
            });
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec![5]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_bypasses_delay_and_drops_pending() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&fired);
        debouncer.debounce(Duration::from_secs(1), false, move || {
            sink.lock().unwrap().push("slow");
        });
        let sink = Arc::clone(&fired);
        debouncer.debounce(Duration::from_secs(1), true, move || {
            sink.lock().unwrap().push("forced");
        });
        assert_eq!(*fired.lock().unwrap(), vec!["forced"]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["forced"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_action() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&fired);
        debouncer.debounce(Duration::from_millis(500), false, move || {
            *sink.lock().unwrap() += 1;
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*fired.lock().unwrap(), 0);
    }
}
