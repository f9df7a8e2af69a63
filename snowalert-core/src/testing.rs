//! In-process doubles for the external collaborators, used by unit and
//! integration tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{
    error::{StoreError, Unavailable},
    forecast::{Forecast, ForecastEntry},
    model::{AlertName, ChatId, Coordinates, LocationKey},
    notify::Notifier,
    provider::ForecastSource,
    store::{Document, Persistence},
    timer::{AlertCallback, AlertJob, Timer},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct MemoryInner {
    document: Mutex<Option<Document>>,
    flushes: AtomicUsize,
    fail: AtomicBool,
}

/// [`Persistence`] that keeps the document in memory and counts saves.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<MemoryInner>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        let store = Self::new();
        *lock(&store.inner.document) = Some(document);
        store
    }

    /// Last saved document.
    pub fn stored(&self) -> Option<Document> {
        lock(&self.inner.document).clone()
    }

    pub fn flush_count(&self) -> usize {
        self.inner.flushes.load(Ordering::SeqCst)
    }

    pub fn reset_flush_count(&self) {
        self.inner.flushes.store(0, Ordering::SeqCst);
    }

    /// Make every following save fail.
    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Option<Document>, StoreError> {
        Ok(self.stored())
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: "memory".into(),
                source: std::io::Error::other("save disabled"),
            });
        }
        *lock(&self.inner.document) = Some(document.clone());
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type ManualJobs = BTreeMap<AlertName, (AlertJob, Arc<dyn AlertCallback>)>;

/// [`Timer`] that never fires on its own; tests fire jobs by name.
#[derive(Default)]
pub struct ManualTimer {
    jobs: Mutex<ManualJobs>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<AlertJob> {
        lock(&self.jobs).values().map(|(job, _)| job.clone()).collect()
    }

    /// Run the callback of `name` once. Returns false when no such job exists.
    pub async fn fire(&self, name: &AlertName) -> bool {
        let entry = lock(&self.jobs)
            .get(name)
            .map(|(job, callback)| (job.context.clone(), Arc::clone(callback)));
        match entry {
            Some((context, callback)) => {
                callback.fire(context).await;
                true
            }
            None => false,
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, job: AlertJob, callback: Arc<dyn AlertCallback>) {
        let mut jobs = lock(&self.jobs);
        if job.time.to_naive_time().is_none() {
            jobs.remove(&job.name);
            return;
        }
        jobs.insert(job.name.clone(), (job, callback));
    }

    fn cancel(&self, name: &AlertName) -> bool {
        lock(&self.jobs).remove(name).is_some()
    }

    fn contains(&self, name: &AlertName) -> bool {
        lock(&self.jobs).contains_key(name)
    }

    fn names(&self) -> Vec<AlertName> {
        lock(&self.jobs).keys().cloned().collect()
    }

    fn shutdown(&self) {
        lock(&self.jobs).clear();
    }
}

#[derive(Debug, Default)]
struct FakeState {
    resolutions: HashMap<LocationKey, (Coordinates, String)>,
    failing: HashSet<LocationKey>,
    unavailable: bool,
    snow: bool,
    stale: bool,
}

/// [`ForecastSource`] producing synthetic forecasts starting an hour from now
/// (or an hour ago when stale).
///
/// Requests resolve to themselves unless a resolution was configured.
#[derive(Debug, Default)]
pub struct FakeForecastSource {
    state: Mutex<FakeState>,
    fetches: AtomicUsize,
}

impl FakeForecastSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snap requests for `requested` onto `resolved`, named `city`.
    pub fn resolve(&self, requested: Coordinates, resolved: Coordinates, city: &str) {
        lock(&self.state)
            .resolutions
            .insert(requested.key(), (resolved, city.to_string()));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Fail every request for `requested` only.
    pub fn fail_for(&self, requested: Coordinates) {
        lock(&self.state).failing.insert(requested.key());
    }

    pub fn set_snow(&self, snow: bool) {
        lock(&self.state).snow = snow;
    }

    /// Produce forecasts whose first slot is already in the past.
    pub fn set_stale(&self, stale: bool) {
        lock(&self.state).stale = stale;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastSource for FakeForecastSource {
    async fn fetch(&self, at: Coordinates) -> Result<Forecast, Unavailable> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        let key = at.key();
        if state.unavailable || state.failing.contains(&key) {
            return Err(Unavailable::Request("fake source offline".into()));
        }

        let (resolved, city) = state
            .resolutions
            .get(&key)
            .cloned()
            .unwrap_or_else(|| (at, format!("City {key}")));

        let start = if state.stale {
            Utc::now() - Duration::hours(1)
        } else {
            Utc::now() + Duration::hours(1)
        };
        let entries = (0..16)
            .map(|slot| {
                let dt = start + Duration::hours(3 * slot);
                ForecastEntry {
                    dt,
                    dt_txt: dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                    temp_k: 271.0,
                    descriptions: vec![if state.snow { "snow" } else { "clear sky" }.to_string()],
                    snow_mm: (state.snow && (2..4).contains(&slot)).then_some(1.5),
                }
            })
            .collect();

        Ok(Forecast { resolved, city, entries })
    }
}

/// [`Notifier`] that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(ChatId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(ChatId, String)> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        lock(&self.messages).push((chat, text.to_string()));
        Ok(())
    }
}
