//! Async task helpers used by the swap engine

pub mod debounce;
pub mod scheduler;
pub mod subscription;

pub use debounce::Debouncer;
pub use scheduler::{PeriodicTask, SingleTaskScheduler, TaskFlow, TaskFuture};
pub use subscription::SubscriptionSlot;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
