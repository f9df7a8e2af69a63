//! Shared forecast handles keyed by resolved location.

use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{StoreError, Unavailable},
    forecast::{Forecast, SnowReport},
    model::{Coordinates, LocationKey},
    provider::ForecastSource,
    store::DurableStore,
};

/// Whether creating a location may write to the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    Flush,
    /// Replay mode: the store already holds what is being rebuilt.
    Suppressed,
}

#[derive(Debug)]
struct Cached {
    forecast: Forecast,
}

/// A resolved place with its cached forecast.
///
/// One handle exists per [`LocationKey`]; every chat referencing the place
/// shares it.
#[derive(Debug)]
pub struct Location {
    key: LocationKey,
    coords: Coordinates,
    city: String,
    source: Arc<dyn ForecastSource>,
    cache: Mutex<Cached>,
}

impl Location {
    /// Wrap a freshly fetched forecast.
    pub fn new(forecast: Forecast, source: Arc<dyn ForecastSource>) -> Self {
        Self {
            key: forecast.resolved.key(),
            coords: forecast.resolved,
            city: forecast.city.clone(),
            source,
            cache: Mutex::new(Cached { forecast }),
        }
    }

    pub fn key(&self) -> &LocationKey {
        &self.key
    }

    pub fn coords(&self) -> Coordinates {
        self.coords
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    /// Current forecast, refreshed first when the cached one is outdated.
    ///
    /// A failed refresh keeps the old data; only when that data is still
    /// outdated is the location reported unavailable.
    pub async fn forecast(&self) -> Result<Forecast, Unavailable> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();

        if cache.forecast.is_outdated(now) {
            debug!(location = %self.key, "refreshing outdated forecast");
            match self.source.fetch(self.coords).await {
                Ok(forecast) => cache.forecast = forecast,
                Err(e) => warn!(location = %self.key, error = %e, "forecast refresh failed"),
            }
        }

        if cache.forecast.is_outdated(now) {
            return Err(Unavailable::Stale);
        }
        Ok(cache.forecast.clone())
    }

    pub async fn check_snow_tomorrow(&self) -> Result<SnowReport, Unavailable> {
        Ok(self.forecast().await?.check_snow_tomorrow(Utc::now()))
    }

    pub async fn pretty_forecast(&self) -> Result<String, Unavailable> {
        Ok(self.forecast().await?.pretty())
    }
}

/// Canonical key → live location handle.
#[derive(Debug, Default)]
pub struct LocationRegistry {
    locations: HashMap<LocationKey, Arc<Location>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LocationKey) -> Option<Arc<Location>> {
        self.locations.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LocationKey> {
        self.locations.keys()
    }

    /// Keep `candidate` unless a handle for its key already exists, in which
    /// case the existing one wins and the candidate is dropped.
    ///
    /// A key not yet listed among the stored cities is appended and flushed
    /// unless `persist` is [`Persist::Suppressed`].
    pub fn adopt(
        &mut self,
        candidate: Location,
        store: &mut DurableStore,
        persist: Persist,
    ) -> Result<(LocationKey, Arc<Location>), StoreError> {
        let key = candidate.key().clone();
        if let Some(existing) = self.locations.get(&key) {
            return Ok((key, Arc::clone(existing)));
        }

        if persist == Persist::Flush && !store.document().has_city(&key) {
            let coords = candidate.coords();
            store.document_mut().cities.push([coords.lat, coords.lon]);
            if let Err(e) = store.flush() {
                store.document_mut().cities.pop();
                return Err(e);
            }
        }

        info!(location = %key, city = %candidate.city(), "location registered");
        let handle = Arc::new(candidate);
        self.locations.insert(key.clone(), Arc::clone(&handle));
        Ok((key, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForecastSource, MemoryPersistence};

    fn store() -> (MemoryPersistence, DurableStore) {
        let backend = MemoryPersistence::new();
        let store = DurableStore::open(Box::new(backend.clone())).unwrap();
        backend.reset_flush_count();
        (backend, store)
    }

    #[tokio::test]
    async fn same_resolved_location_is_shared() {
        let source = Arc::new(FakeForecastSource::new());
        source.resolve(Coordinates::new(51.55, 9.95), Coordinates::new(51.5, 9.9), "Göttingen");
        let (backend, mut store) = store();
        let mut registry = LocationRegistry::new();

        let first = source.fetch(Coordinates::new(51.5, 9.9)).await.unwrap();
        let second = source.fetch(Coordinates::new(51.55, 9.95)).await.unwrap();
        let (k1, h1) = registry
            .adopt(Location::new(first, source.clone()), &mut store, Persist::Flush)
            .unwrap();
        let (k2, h2) = registry
            .adopt(Location::new(second, source.clone()), &mut store, Persist::Flush)
            .unwrap();

        assert_eq!(k1, k2);
        assert!(Arc::ptr_eq(&h1, &h2));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.document().cities, vec![[51.5, 9.9]]);
        assert_eq!(backend.flush_count(), 1);
    }

    #[tokio::test]
    async fn suppressed_adopt_does_not_touch_store() {
        let source = Arc::new(FakeForecastSource::new());
        let (backend, mut store) = store();
        let mut registry = LocationRegistry::new();

        let forecast = source.fetch(Coordinates::new(48.1, 11.6)).await.unwrap();
        registry
            .adopt(Location::new(forecast, source.clone()), &mut store, Persist::Suppressed)
            .unwrap();

        assert!(store.document().cities.is_empty());
        assert_eq!(backend.flush_count(), 0);
    }

    #[tokio::test]
    async fn failed_flush_leaves_registry_untouched() {
        let source = Arc::new(FakeForecastSource::new());
        let (backend, mut store) = store();
        let mut registry = LocationRegistry::new();
        backend.fail_saves(true);

        let forecast = source.fetch(Coordinates::new(48.1, 11.6)).await.unwrap();
        let result =
            registry.adopt(Location::new(forecast, source.clone()), &mut store, Persist::Flush);

        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(store.document().cities.is_empty());
    }

    #[tokio::test]
    async fn stale_forecast_is_refreshed_or_unavailable() {
        let source = Arc::new(FakeForecastSource::new());
        let at = Coordinates::new(48.1, 11.6);
        let mut stale = source.fetch(at).await.unwrap();
        stale.entries.clear();

        let location = Location::new(stale.clone(), source.clone());
        assert!(location.forecast().await.is_ok());

        source.set_unavailable(true);
        let location = Location::new(stale, source.clone());
        assert!(matches!(location.forecast().await, Err(Unavailable::Stale)));
    }
}
