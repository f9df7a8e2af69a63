//! Maps (chat, location, check time) triples onto named daily jobs and keeps
//! the durable store and the chat associations in step with the timer.

use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, warn};

use crate::{
    error::{AlertError, StoreError},
    model::{AlertContext, AlertName, AlertRecord, ChatId, CheckTime, Coordinates, LocationKey},
    service::State,
    store::Associations,
    timer::{AlertCallback, AlertJob, Timer},
};

pub struct AlertScheduler {
    timer: Arc<dyn Timer>,
    callback: Arc<dyn AlertCallback>,
    check_times: Vec<CheckTime>,
}

impl AlertScheduler {
    pub fn new(
        timer: Arc<dyn Timer>,
        callback: Arc<dyn AlertCallback>,
        check_times: Vec<CheckTime>,
    ) -> Self {
        Self { timer, callback, check_times }
    }

    /// Alert names the configured check times give for a chat and location.
    pub fn alert_names(&self, location: &LocationKey, chat: ChatId) -> Vec<AlertName> {
        self.check_times
            .iter()
            .map(|time| AlertName::derive(location, *time, chat))
            .collect()
    }

    fn start_job(&self, name: AlertName, time: CheckTime, context: AlertContext) {
        self.timer
            .schedule(AlertJob { name, time, context }, Arc::clone(&self.callback));
    }

    /// Schedule one job per time, all or nothing.
    ///
    /// Nothing is touched when a time is out of range or any derived name is
    /// already associated with the chat and location. A failed flush rolls every new job back.
    pub(crate) fn register(
        &self,
        state: &mut State,
        chat: ChatId,
        location: &LocationKey,
        times: &[CheckTime],
    ) -> Result<Vec<AlertName>, AlertError> {
        if let Some(time) = times.iter().find(|time| time.to_naive_time().is_none()) {
            return Err(AlertError::InvalidTime { time: *time });
        }

        let planned: Vec<(CheckTime, AlertName)> = times
            .iter()
            .map(|time| (*time, AlertName::derive(location, *time, chat)))
            .collect();

        let existing = state.associations.get(&chat).and_then(|locations| locations.get(location));
        let mut seen = HashSet::new();
        for (_, name) in &planned {
            let taken = existing.is_some_and(|names| names.contains(name));
            if taken || !seen.insert(name) {
                debug!(chat = %chat, alert = %name, "duplicate alert rejected");
                return Err(AlertError::DuplicateAlert { name: name.clone() });
            }
        }

        for (time, name) in &planned {
            let context = AlertContext(chat, location.clone());
            self.start_job(name.clone(), *time, context.clone());
            state.store.document_mut().alerts.insert(
                name.clone(),
                AlertRecord { time: *time, context, name: name.clone() },
            );
            state
                .associations
                .entry(chat)
                .or_default()
                .entry(location.clone())
                .or_default()
                .push(name.clone());
        }

        if let Err(e) = state.flush() {
            warn!(chat = %chat, location = %location, error = %e, "rolling back alert registration");
            for (_, name) in &planned {
                self.timer.cancel(name);
                state.store.document_mut().alerts.remove(name);
                remove_association(&mut state.associations, chat, location, name);
            }
            state.sync_chats();
            return Err(e.into());
        }

        let names: Vec<AlertName> = planned.into_iter().map(|(_, name)| name).collect();
        info!(chat = %chat, location = %location, alerts = names.len(), "alerts registered");
        Ok(names)
    }

    /// Cancel every alert of `chat` at the location keyed by `coords`.
    ///
    /// Returns the number of jobs actually cancelled; nothing to remove is
    /// not an error. A failed flush restores every job, record and
    /// association entry this call removed.
    pub(crate) fn unregister(
        &self,
        state: &mut State,
        chat: ChatId,
        coords: Coordinates,
    ) -> Result<usize, StoreError> {
        let location = coords.key();
        let associated = state
            .associations
            .get(&chat)
            .and_then(|l| l.get(&location))
            .cloned();

        let mut candidates = self.alert_names(&location, chat);
        for name in associated.iter().flatten() {
            if !candidates.contains(name) {
                candidates.push(name.clone());
            }
        }

        let mut cancelled = Vec::new();
        let mut removed = Vec::new();
        let mut changed = false;
        for name in &candidates {
            if self.timer.cancel(name) {
                cancelled.push(name.clone());
            }
            if let Some(record) = state.store.document_mut().alerts.remove(name) {
                removed.push(record);
                changed = true;
            }
            changed |= remove_association(&mut state.associations, chat, &location, name);
        }

        let flushed = if changed { state.flush() } else { Ok(()) };
        if let Err(e) = flushed {
            warn!(chat = %chat, location = %location, error = %e, "rolling back alert removal");
            self.restore(state, chat, &location, &cancelled, removed, associated);
            return Err(e);
        }

        info!(chat = %chat, location = %location, cancelled = cancelled.len(), "alerts removed");
        Ok(cancelled.len())
    }

    /// Undo an unregister whose flush failed.
    fn restore(
        &self,
        state: &mut State,
        chat: ChatId,
        location: &LocationKey,
        cancelled: &[AlertName],
        removed: Vec<AlertRecord>,
        associated: Option<Vec<AlertName>>,
    ) {
        for name in cancelled {
            let time = removed
                .iter()
                .find(|record| &record.name == name)
                .map(|record| record.time)
                .or_else(|| {
                    self.check_times
                        .iter()
                        .copied()
                        .find(|time| &AlertName::derive(location, *time, chat) == name)
                });
            match time {
                Some(time) => {
                    self.start_job(name.clone(), time, AlertContext(chat, location.clone()))
                }
                None => warn!(alert = %name, "cannot restore job without a known check time"),
            }
        }

        for record in removed {
            state.store.document_mut().alerts.insert(record.name.clone(), record);
        }
        if let Some(names) = associated {
            state
                .associations
                .entry(chat)
                .or_default()
                .insert(location.clone(), names);
        }
        state.sync_chats();
    }

    /// Rebuild a persisted alert without duplicate checks or persistence.
    ///
    /// Replaying the same record twice leaves one job and one association
    /// entry. Records with an out-of-range time are skipped.
    pub(crate) fn replay(&self, state: &mut State, record: &AlertRecord) -> bool {
        if record.time.to_naive_time().is_none() {
            warn!(alert = %record.name, time = ?record.time, "skipping stored alert with invalid time");
            return false;
        }

        let chat = record.context.chat();
        let location = record.context.location();
        if state.registry.get(location).is_none() {
            warn!(alert = %record.name, location = %location, "replaying alert for unknown location");
        }

        self.start_job(record.name.clone(), record.time, record.context.clone());

        let names = state
            .associations
            .entry(chat)
            .or_default()
            .entry(location.clone())
            .or_default();
        if !names.contains(&record.name) {
            names.push(record.name.clone());
        }
        true
    }
}

/// Drop `name` from the association, pruning empty lists and chats.
fn remove_association(
    associations: &mut Associations,
    chat: ChatId,
    location: &LocationKey,
    name: &AlertName,
) -> bool {
    let Some(locations) = associations.get_mut(&chat) else {
        return false;
    };
    let Some(names) = locations.get_mut(location) else {
        return false;
    };

    let before = names.len();
    names.retain(|n| n != name);
    let removed = names.len() != before;

    if names.is_empty() {
        locations.remove(location);
    }
    if locations.is_empty() {
        associations.remove(&chat);
    }
    removed
}
