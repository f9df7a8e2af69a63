//! Recurring daily timers.
//!
//! The alert scheduler only talks to the [`Timer`] trait; [`TokioTimer`]
//! implements it with one sleep-until loop per named job.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{AlertContext, AlertName, CheckTime};

/// Work run each time a job fires.
#[async_trait]
pub trait AlertCallback: Send + Sync {
    async fn fire(&self, context: AlertContext);
}

/// A named recurring daily job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertJob {
    pub name: AlertName,
    pub time: CheckTime,
    pub context: AlertContext,
}

/// Scheduling capability used by the alert scheduler.
pub trait Timer: Send + Sync {
    /// Start firing `job` daily. A job already scheduled under the same
    /// name is replaced. A job whose time is out of range is not scheduled.
    fn schedule(&self, job: AlertJob, callback: Arc<dyn AlertCallback>);

    /// Stop a job. Returns whether a job of that name existed. No firing
    /// starts after this returns; one already running may finish.
    fn cancel(&self, name: &AlertName) -> bool;

    fn contains(&self, name: &AlertName) -> bool;

    /// Names of all scheduled jobs, sorted.
    fn names(&self) -> Vec<AlertName>;

    /// Cancel everything.
    fn shutdown(&self);
}

/// Next instant strictly after `now` at which the local wall clock of
/// `offset` shows `at`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
    let local_day = (now.naive_utc() + shift).date();
    let candidate = Utc.from_utc_datetime(&(local_day.and_time(at) - shift));
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// A running job loop and the flag its firings check before calling back.
#[derive(Debug)]
struct Running {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl Running {
    fn stop(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// [`Timer`] backed by tokio tasks. Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioTimer {
    offset: FixedOffset,
    jobs: Mutex<HashMap<AlertName, Running>>,
}

impl TokioTimer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset, jobs: Mutex::new(HashMap::new()) }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<AlertName, Running>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one firing unless the job was cancelled after its loop woke up.
async fn fire_unless_cancelled(
    cancelled: &AtomicBool,
    callback: &dyn AlertCallback,
    context: AlertContext,
) {
    if !cancelled.load(Ordering::SeqCst) {
        callback.fire(context).await;
    }
}

async fn run_daily(
    job: AlertJob,
    at: NaiveTime,
    offset: FixedOffset,
    callback: Arc<dyn AlertCallback>,
    cancelled: Arc<AtomicBool>,
) {
    let mut after = Utc::now();
    loop {
        let next = next_fire(after, at, offset);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(alert = %job.name, next = %next, "alert sleeping");
        tokio::time::sleep(wait).await;

        debug!(alert = %job.name, "alert firing");
        let callback = Arc::clone(&callback);
        let cancelled = Arc::clone(&cancelled);
        let context = job.context.clone();
        // the callback runs on its own task so a slow check never delays the next day
        tokio::spawn(async move {
            fire_unless_cancelled(&cancelled, callback.as_ref(), context).await;
        });

        after = next.max(Utc::now());
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, job: AlertJob, callback: Arc<dyn AlertCallback>) {
        let name = job.name.clone();
        let Some(at) = job.time.to_naive_time() else {
            warn!(alert = %name, time = ?job.time, "invalid check time, job not scheduled");
            if let Some(previous) = self.jobs().remove(&name) {
                previous.stop();
            }
            return;
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_daily(job, at, self.offset, callback, Arc::clone(&cancelled)));
        let previous = self.jobs().insert(name, Running { handle, cancelled });
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    fn cancel(&self, name: &AlertName) -> bool {
        let removed = self.jobs().remove(name);
        match removed {
            Some(running) => {
                running.stop();
                true
            }
            None => false,
        }
    }

    fn contains(&self, name: &AlertName) -> bool {
        self.jobs().contains_key(name)
    }

    fn names(&self) -> Vec<AlertName> {
        let mut names: Vec<_> = self.jobs().keys().cloned().collect();
        names.sort();
        names
    }

    fn shutdown(&self) {
        let drained: Vec<Running> = self.jobs().drain().map(|(_, running)| running).collect();
        for running in drained {
            running.stop();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
