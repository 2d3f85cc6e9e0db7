//! Single-Flight Task Scheduler
//!
//! Runs at most one logical task at a time. Scheduling a new task cancels the previous one,
//! and a result produced by a superseded task is never applied: the result callback runs
//! while holding the scheduler slot lock and only if the task's generation is still current.
//!
//! Callbacks must not call back into the same scheduler.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

use super::lock;
use crate::error::Error;

/// What a task should do after a result was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    /// Sleep for the period, then run again
    Continue,
    /// Finish the task
    Stop,
}

pub type TaskFuture<T> = BoxFuture<'static, Result<T, Error>>;
type TaskFn<T> = Box<dyn Fn() -> TaskFuture<T> + Send + Sync>;
type SuccessFn<T> = Box<dyn Fn(T) -> TaskFlow + Send + Sync>;
type ErrorFn = Box<dyn Fn(Error) -> TaskFlow + Send + Sync>;

/// A repeatable unit of async work with result callbacks
pub struct PeriodicTask<T> {
    period: Option<Duration>,
    task: TaskFn<T>,
    on_success: SuccessFn<T>,
    on_error: ErrorFn,
}

impl<T> PeriodicTask<T> {
    /// Task that repeats every `period` after each applied result
    pub fn new<F, S, E>(period: Duration, task: F, on_success: S, on_error: E) -> Self
    where
        F: Fn() -> TaskFuture<T> + Send + Sync + 'static,
        S: Fn(T) -> TaskFlow + Send + Sync + 'static,
        E: Fn(Error) -> TaskFlow + Send + Sync + 'static,
    {
        Self {
            period: Some(period),
            task: Box::new(task),
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }

    /// Task that runs exactly once
    pub fn once<F, S, E>(task: F, on_success: S, on_error: E) -> Self
    where
        F: Fn() -> TaskFuture<T> + Send + Sync + 'static,
        S: Fn(T) -> TaskFlow + Send + Sync + 'static,
        E: Fn(Error) -> TaskFlow + Send + Sync + 'static,
    {
        Self {
            period: None,
            task: Box::new(task),
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }
}

struct ActiveTask {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active: Option<ActiveTask>,
}

impl Slot {
    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.generation == generation)
    }

    fn stop_active(&mut self) -> bool {
        self.generation += 1;
        match self.active.take() {
            Some(active) => {
                active.token.cancel();
                active.handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Holds at most one running [`PeriodicTask`]
pub struct SingleTaskScheduler<T> {
    slot: Arc<Mutex<Slot>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Default for SingleTaskScheduler<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            _result: PhantomData,
        }
    }
}

impl<T: Send + 'static> SingleTaskScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current task, if any, and start `task`. Must be called within a tokio
    /// runtime.
    pub fn schedule_task(&self, task: PeriodicTask<T>) {
        let mut slot = lock(&self.slot);
        if slot.stop_active() {
            debug!("Superseding running task");
        }

        slot.generation += 1;
        let generation = slot.generation;
        let token = CancellationToken::new();
        let handle = tokio::spawn(
            run_task(task, generation, token.clone(), Arc::clone(&self.slot))
                .instrument(Span::current()),
        );

        slot.active = Some(ActiveTask {
            generation,
            token,
            handle,
        });
    }

    /// Cancel the current task. Safe to call when nothing is running.
    pub fn cancel_task(&self) {
        if lock(&self.slot).stop_active() {
            debug!("Task cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.slot).active.is_some()
    }
}

impl<T> Drop for SingleTaskScheduler<T> {
    fn drop(&mut self) {
        // a running callback may release the last owner while holding the slot; that task
        // stops on its own once its owner is gone
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.stop_active();
        }
    }
}

async fn run_task<T>(
    task: PeriodicTask<T>,
    generation: u64,
    token: CancellationToken,
    slot: Arc<Mutex<Slot>>,
) {
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = (task.task)() => result,
        };

        let flow = {
            let guard = lock(&slot);
            if token.is_cancelled() || !guard.is_current(generation) {
                debug!(generation, "Discarding result of superseded task");
                return;
            }
            match result {
                Ok(value) => (task.on_success)(value),
                Err(e) => (task.on_error)(e),
            }
        };

        let period = match (flow, task.period) {
            (TaskFlow::Continue, Some(period)) => period,
            _ => break,
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }
    }

    let mut guard = lock(&slot);
    if guard.is_current(generation) {
        guard.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> TaskFlow + Send + Sync) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);
        (applied, move |value| {
            sink.lock().unwrap().push(value);
            TaskFlow::Continue
        })
    }

    fn delayed(value: u32, delay: Duration) -> impl Fn() -> TaskFuture<u32> + Send + Sync {
        move || {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }) as TaskFuture<u32>
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_is_never_applied() {
        let scheduler = SingleTaskScheduler::new();
        let (applied, on_success) = recorder();
        scheduler.schedule_task(PeriodicTask::once(
            delayed(1, Duration::from_secs(5)),
            on_success,
            |_| TaskFlow::Stop,
        ));

        let sink = Arc::clone(&applied);
        scheduler.schedule_task(PeriodicTask::once(
            delayed(2, Duration::from_secs(1)),
            move |value| {
                sink.lock().unwrap().push(value);
                TaskFlow::Stop
            },
            |_| TaskFlow::Stop,
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*applied.lock().unwrap(), vec![2]);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_repeats_until_cancelled() {
        let scheduler = SingleTaskScheduler::new();
        let (applied, on_success) = recorder();
        scheduler.schedule_task(PeriodicTask::new(
            Duration::from_secs(10),
            delayed(7, Duration::from_millis(100)),
            on_success,
            |_| TaskFlow::Stop,
        ));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(applied.lock().unwrap().len(), 3);

        scheduler.cancel_task();
        scheduler.cancel_task();
        assert!(!scheduler.is_active());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(applied.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_callback_can_stop_repetition() {
        let scheduler: SingleTaskScheduler<u32> = SingleTaskScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let error_counter = Arc::clone(&errors);
        scheduler.schedule_task(PeriodicTask::new(
            Duration::from_secs(1),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(Error::QuoteSource("offline".to_string())) })
                    as TaskFuture<u32>
            },
            |_| TaskFlow::Continue,
            move |_| {
                error_counter.fetch_add(1, Ordering::SeqCst);
                TaskFlow::Stop
            },
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_active());
    }
}
