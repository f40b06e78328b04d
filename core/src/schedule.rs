//! Periodic background tasks
//!
//! Every background loop (model reload, request log rotation, drift
//! watchdog) is a [`PeriodicTask`]: an explicit cycle function plus an
//! interval. Tests drive `run_cycle` directly; production wraps it with
//! [`spawn_periodic`], which owns the timer and the per-cycle error boundary.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// Name used in log records
    fn name(&self) -> &'static str;

    /// Time between the starts of two cycles
    fn interval(&self) -> Duration;

    /// One iteration of the loop
    async fn run_cycle(&self) -> anyhow::Result<()>;
}

/// Run `task` forever on its interval
///
/// The first cycle starts immediately. A cycle that returns an error or
/// panics is logged and the loop continues with the next tick.
pub fn spawn_periodic<T>(task: Arc<T>) -> JoinHandle<()>
where
    T: PeriodicTask + ?Sized,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(task.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_guarded(task.as_ref()).await;
        }
    })
}

/// Run a single cycle inside the error boundary; returns whether it succeeded
pub async fn run_guarded<T>(task: &T) -> bool
where
    T: PeriodicTask + ?Sized,
{
    match AssertUnwindSafe(task.run_cycle()).catch_unwind().await {
        Ok(Ok(())) => {
            debug!(task = task.name(), "Cycle completed");
            true
        }
        Ok(Err(e)) => {
            error!(task = task.name(), error = %format!("{:#}", e), "Cycle failed");
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(task = task.name(), panic = %message, "Cycle panicked");
            false
        }
    }
}
