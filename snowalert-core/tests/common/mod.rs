//! Shared harness for alert service integration tests.

#![allow(dead_code)]

use snowalert_core::{
    AlertService, ChatId, CheckTime, Coordinates, Document, DurableStore, Settings,
    testing::{FakeForecastSource, ManualTimer, MemoryPersistence, RecordingNotifier},
};
use std::sync::Arc;

pub const OPERATOR: ChatId = ChatId(1);

/// Service wired to in-memory doubles.
pub struct Harness {
    pub service: Arc<AlertService>,
    pub source: Arc<FakeForecastSource>,
    pub timer: Arc<ManualTimer>,
    pub notifier: Arc<RecordingNotifier>,
    pub persistence: MemoryPersistence,
}

pub fn settings(times: &[(u32, u32)]) -> Settings {
    Settings {
        check_times: times.iter().map(|(h, m)| CheckTime::new(*h, *m)).collect(),
        operator: Some(OPERATOR),
    }
}

impl Harness {
    /// Fresh service over an empty store, with flush counting reset after
    /// the initial document write.
    pub fn new(times: &[(u32, u32)]) -> Self {
        Self::with_source(times, Arc::new(FakeForecastSource::new()))
    }

    pub fn with_source(times: &[(u32, u32)], source: Arc<FakeForecastSource>) -> Self {
        let persistence = MemoryPersistence::new();
        let store = DurableStore::open(Box::new(persistence.clone())).unwrap();
        persistence.reset_flush_count();
        let timer = Arc::new(ManualTimer::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = AlertService::new(
            store,
            source.clone(),
            timer.clone(),
            notifier.clone(),
            settings(times),
        );

        Self { service: Arc::new(service), source, timer, notifier, persistence }
    }

    /// Start a second service over `document`, as after a restart.
    pub async fn restarted(
        document: Document,
        times: &[(u32, u32)],
        source: Arc<FakeForecastSource>,
    ) -> Result<Self, snowalert_core::RecoveryError> {
        let persistence = MemoryPersistence::with_document(document);
        let store = DurableStore::open(Box::new(persistence.clone())).unwrap();
        let timer = Arc::new(ManualTimer::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = AlertService::start(
            store,
            source.clone(),
            timer.clone(),
            notifier.clone(),
            settings(times),
        )
        .await?;

        Ok(Self { service: Arc::new(service), source, timer, notifier, persistence })
    }
}

/// Source that snaps requests near Göttingen onto `(51.5, 9.9)`.
pub fn goettingen_source() -> Arc<FakeForecastSource> {
    let source = Arc::new(FakeForecastSource::new());
    source.resolve(Coordinates::new(51.55, 9.95), Coordinates::new(51.5, 9.9), "Göttingen");
    source.resolve(Coordinates::new(51.5, 9.9), Coordinates::new(51.5, 9.9), "Göttingen");
    source
}
