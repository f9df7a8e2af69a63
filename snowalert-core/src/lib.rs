//! Core library of the snow alert bot.
//!
//! This crate defines:
//! - Configuration handling
//! - The forecast source abstraction and its OpenWeatherMap implementation
//! - The location registry, durable alert store and alert scheduler
//! - Startup recovery of the persisted schedule
//! - Chat command handlers
//!
//! The chat transport is left to the binary; it only needs to feed text into
//! [`CommandHandler`] and implement [`Notifier`].

pub mod commands;
pub mod config;
pub mod error;
pub mod forecast;
pub mod location;
pub mod model;
pub mod notify;
pub mod provider;
pub mod recovery;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod testing;
pub mod timer;

pub use commands::{Command, CommandHandler};
pub use config::{Config, ProviderConfig};
pub use error::{AlertError, RecoveryError, StoreError, Unavailable};
pub use forecast::{Forecast, ForecastEntry, SnowReport};
pub use location::{Location, LocationRegistry};
pub use model::{AlertContext, AlertName, AlertRecord, ChatId, CheckTime, Coordinates, LocationKey};
pub use notify::Notifier;
pub use provider::ForecastSource;
pub use recovery::RecoveryReport;
pub use service::{AlertListing, AlertService, Settings, Subscription};
pub use store::{Document, DurableStore, JsonFileStore, Persistence};
pub use timer::{Timer, TokioTimer};
