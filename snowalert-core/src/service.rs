//! Process-wide alert state and the operations command handlers call.
//!
//! Registry, associations and the durable document live in one [`State`]
//! behind a single lock. Every multi-step mutation holds that lock for its
//! whole duration; forecast fetches happen before the lock is taken.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    Config,
    error::{AlertError, RecoveryError, StoreError},
    location::{Location, LocationRegistry, Persist},
    model::{AlertContext, AlertName, ChatId, CheckTime, Coordinates, LocationKey},
    notify::Notifier,
    provider::ForecastSource,
    scheduler::AlertScheduler,
    store::{Associations, Document, DurableStore},
    timer::{AlertCallback, Timer},
};

pub(crate) struct State {
    pub(crate) registry: LocationRegistry,
    pub(crate) associations: Associations,
    pub(crate) store: DurableStore,
}

impl State {
    fn new(store: DurableStore) -> Self {
        Self {
            registry: LocationRegistry::new(),
            associations: Associations::new(),
            store,
        }
    }

    /// Mirror the in-memory associations into the document.
    pub(crate) fn sync_chats(&mut self) {
        self.store.document_mut().chats = self.associations.clone();
    }

    pub(crate) fn flush(&mut self) -> Result<(), StoreError> {
        self.sync_chats();
        self.store.flush()
    }
}

/// Behaviour knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub check_times: Vec<CheckTime>,
    pub operator: Option<ChatId>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_times: config.check_times.clone(),
            operator: config.operator_chat,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Job callback: check tomorrow's forecast and tell the chat.
struct SnowCheck {
    state: Arc<Mutex<State>>,
    notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl AlertCallback for SnowCheck {
    async fn fire(&self, context: AlertContext) {
        let chat = context.chat();
        let location = self.state.lock().await.registry.get(context.location());

        let text = match location {
            None => {
                warn!(chat = %chat, location = %context.location(), "alert fired for unknown location");
                Some(format!("Could not check weather for {}", context.location()))
            }
            Some(location) => match location.check_snow_tomorrow().await {
                Ok(report) if report.snow => {
                    info!(chat = %chat, location = %location.key(), "snow forecast, notifying");
                    Some(format!("Snow Alert! {}:\n{}", location.city(), report.details_text()))
                }
                Ok(_) => {
                    debug!(chat = %chat, location = %location.key(), "no snow forecast");
                    None
                }
                Err(e) => {
                    warn!(chat = %chat, location = %location.key(), error = %e, "snow check failed");
                    Some(format!("Could not check weather for {}", location.city()))
                }
            },
        };

        if let Some(text) = text {
            if let Err(e) = self.notifier.send(chat, &text).await {
                warn!(chat = %chat, error = %e, "failed to deliver alert");
            }
        }
    }
}

/// Outcome of a successful `/alert`.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub location: Arc<Location>,
    pub alerts: Vec<AlertName>,
}

/// One line of `/list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertListing {
    pub chat: ChatId,
    pub location: LocationKey,
    pub alerts: Vec<AlertName>,
}

pub struct AlertService {
    pub(crate) state: Arc<Mutex<State>>,
    pub(crate) scheduler: AlertScheduler,
    pub(crate) source: Arc<dyn ForecastSource>,
    timer: Arc<dyn Timer>,
    settings: Settings,
}

impl AlertService {
    /// Wire the service together without replaying the store.
    pub fn new(
        store: DurableStore,
        source: Arc<dyn ForecastSource>,
        timer: Arc<dyn Timer>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        let state = Arc::new(Mutex::new(State::new(store)));
        let callback = Arc::new(SnowCheck { state: Arc::clone(&state), notifier });
        let scheduler =
            AlertScheduler::new(Arc::clone(&timer), callback, settings.check_times.clone());

        Self { state, scheduler, source, timer, settings }
    }

    /// Build the service and restore the persisted schedule before returning.
    pub async fn start(
        store: DurableStore,
        source: Arc<dyn ForecastSource>,
        timer: Arc<dyn Timer>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Result<Self, RecoveryError> {
        let document = store.document().clone();
        let service = Self::new(store, source, timer, notifier, settings);
        service.recover(&document).await?;
        Ok(service)
    }

    pub fn is_operator(&self, chat: ChatId) -> bool {
        self.settings.operator == Some(chat)
    }

    pub(crate) async fn resolve_with(
        &self,
        coords: Coordinates,
        persist: Persist,
    ) -> Result<(LocationKey, Arc<Location>), AlertError> {
        let forecast = self.source.fetch(coords).await?;
        let candidate = Location::new(forecast, Arc::clone(&self.source));

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        Ok(state.registry.adopt(candidate, &mut state.store, persist)?)
    }

    /// Fetch a forecast for `coords` and return the handle for the place the
    /// source resolved it to, creating it on first reference.
    pub async fn resolve_or_create(
        &self,
        coords: Coordinates,
    ) -> Result<(LocationKey, Arc<Location>), AlertError> {
        self.resolve_with(coords, Persist::Flush).await
    }

    /// Schedule one alert per time for `chat` at an already resolved location.
    pub async fn register(
        &self,
        chat: ChatId,
        location: &LocationKey,
        times: &[CheckTime],
    ) -> Result<Vec<AlertName>, AlertError> {
        let mut state = self.state.lock().await;
        self.scheduler.register(&mut state, chat, location, times)
    }

    /// Resolve `coords` and register the configured check times there.
    pub async fn subscribe(
        &self,
        chat: ChatId,
        coords: Coordinates,
    ) -> Result<Subscription, AlertError> {
        let (key, location) = self.resolve_or_create(coords).await?;
        let alerts = self.register(chat, &key, &self.settings.check_times).await?;
        Ok(Subscription { location, alerts })
    }

    /// Cancel every alert of `chat` at the location keyed by `coords`.
    ///
    /// The coordinates must be the resolved ones reported at registration.
    pub async fn unregister(&self, chat: ChatId, coords: Coordinates) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        self.scheduler.unregister(&mut state, chat, coords)
    }

    /// Alerts visible to `chat`; the operator sees every chat.
    pub async fn list(&self, chat: ChatId) -> Vec<AlertListing> {
        let state = self.state.lock().await;
        let all = self.is_operator(chat);

        state
            .associations
            .iter()
            .filter(|(owner, _)| all || **owner == chat)
            .flat_map(|(owner, locations)| {
                locations.iter().map(move |(location, alerts)| AlertListing {
                    chat: *owner,
                    location: location.clone(),
                    alerts: alerts.clone(),
                })
            })
            .collect()
    }

    /// Locations `chat` has alerts for, with their handles when known.
    pub async fn locations_for(&self, chat: ChatId) -> Vec<(LocationKey, Option<Arc<Location>>)> {
        let state = self.state.lock().await;
        state
            .associations
            .get(&chat)
            .map(|locations| {
                locations
                    .keys()
                    .map(|key| (key.clone(), state.registry.get(key)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn location_keys(&self) -> Vec<LocationKey> {
        let state = self.state.lock().await;
        let mut keys: Vec<_> = state.registry.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn associations(&self) -> Associations {
        self.state.lock().await.associations.clone()
    }

    /// Snapshot of the in-memory durable document.
    pub async fn document(&self) -> Document {
        self.state.lock().await.store.document().clone()
    }

    pub fn job_names(&self) -> Vec<AlertName> {
        self.timer.names()
    }

    /// Stop every job. State stays readable.
    pub fn shutdown(&self) {
        info!(jobs = self.timer.names().len(), "stopping alert jobs");
        self.timer.shutdown();
    }
}
