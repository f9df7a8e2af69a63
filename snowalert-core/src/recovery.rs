//! Startup replay of the durable document.
//!
//! Runs in two phases: stored cities first, through the registry with
//! persistence suppressed, then every alert record straight into the timer.
//! Nothing is flushed, so replaying the same document again is harmless.

use std::sync::Arc;
use tracing::info;

use crate::{
    error::RecoveryError,
    location::{Location, Persist},
    model::AlertRecord,
    service::AlertService,
    store::Document,
};

/// What a recovery pass restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub locations: usize,
    pub alerts: usize,
}

impl AlertService {
    /// Rebuild registry, associations and jobs from `document`.
    ///
    /// A stored city that no longer resolves aborts recovery; serving with
    /// part of the schedule missing would break the store/schedule match.
    pub async fn recover(&self, document: &Document) -> Result<RecoveryReport, RecoveryError> {
        let mut report = RecoveryReport::default();

        for coords in document.city_coordinates() {
            let forecast = self
                .source
                .fetch(coords)
                .await
                .map_err(|source| RecoveryError::Location { coords, source })?;
            let candidate = Location::new(forecast, Arc::clone(&self.source));

            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.registry.adopt(candidate, &mut state.store, Persist::Suppressed)?;
            report.locations += 1;
        }
        info!(locations = report.locations, "recovered locations");

        let mut records: Vec<&AlertRecord> = document.alerts.values().collect();
        records.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.name.cmp(&b.name)));

        let mut state = self.state.lock().await;
        for record in records {
            if self.scheduler.replay(&mut state, record) {
                report.alerts += 1;
            }
        }
        state.sync_chats();
        info!(alerts = report.alerts, "recovered alerts");

        Ok(report)
    }
}
