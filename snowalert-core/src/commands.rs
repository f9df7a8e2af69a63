//! Chat command handlers: text in, reply text out.

use std::{fmt::Write, sync::Arc};
use tracing::{error, warn};

use crate::{
    error::AlertError,
    model::{ChatId, Coordinates},
    service::AlertService,
};

pub const HELP: &str = "Telegram SnowAlert Bot.
    - Use `/alert <lat> <lon>` to get daily alerts for location
    - Use `/disable <lat> <lon>` to disable the alerts of a location
    - Use `/weather` to get a short weather forecast for alert locations
    - Use `/snow` to manually check for snow tomorrow on alert locations
    - Use `/list` to list all alerts";

const ALERT_USAGE: &str = "Usage: `/alert <lat> <lon>`";
const DISABLE_USAGE: &str = "Usage: `/disable <lat> <lon>`";
const NO_LOCATIONS: &str = "No locations configured";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Alert(Option<Coordinates>),
    Disable(Option<Coordinates>),
    List,
    Weather,
    Snow,
    Unknown(String),
}

impl Command {
    /// Parse `/name args…`; a `@botname` suffix on the command is ignored.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Unknown(String::new());
        };
        let name = head.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        let args: Vec<&str> = words.collect();

        match name.to_lowercase().as_str() {
            "start" | "help" => Self::Help,
            "alert" => Self::Alert(parse_coordinates(&args)),
            "disable" => Self::Disable(parse_coordinates(&args)),
            "list" => Self::List,
            "weather" => Self::Weather,
            "snow" => Self::Snow,
            other => Self::Unknown(other.to_string()),
        }
    }
}

fn parse_coordinates(args: &[&str]) -> Option<Coordinates> {
    let [lat, lon, ..] = args else {
        return None;
    };
    let lat: f64 = lat.parse().ok()?;
    let lon: f64 = lon.parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then(|| Coordinates::new(lat, lon))
}

/// Turns chat commands into core operations.
#[derive(Clone)]
pub struct CommandHandler {
    service: Arc<AlertService>,
}

impl CommandHandler {
    pub fn new(service: Arc<AlertService>) -> Self {
        Self { service }
    }

    /// Run one command for `chat` and return the reply. Never fails; errors
    /// become reply text.
    pub async fn handle(&self, chat: ChatId, text: &str) -> String {
        match Command::parse(text) {
            Command::Help => HELP.to_string(),
            Command::Alert(Some(coords)) => self.alert(chat, coords).await,
            Command::Alert(None) => ALERT_USAGE.to_string(),
            Command::Disable(Some(coords)) => self.disable(chat, coords).await,
            Command::Disable(None) => DISABLE_USAGE.to_string(),
            Command::List => self.list(chat).await,
            Command::Weather => self.weather(chat).await,
            Command::Snow => self.snow(chat).await,
            Command::Unknown(_) => "Unknown command. Use /help".to_string(),
        }
    }

    async fn alert(&self, chat: ChatId, coords: Coordinates) -> String {
        match self.service.subscribe(chat, coords).await {
            Ok(sub) => {
                let resolved = sub.location.coords();
                format!(
                    "Set snow alerts for {}: {} {}",
                    sub.location.city(),
                    resolved.lat,
                    resolved.lon
                )
            }
            Err(AlertError::Unavailable(e)) => {
                warn!(chat = %chat, error = %e, "could not create forecast");
                "Could not create forecast. Please try again later.".to_string()
            }
            Err(AlertError::DuplicateAlert { .. }) => {
                format!("Alert already active. {ALERT_USAGE}")
            }
            Err(e @ AlertError::InvalidTime { .. }) => {
                error!(chat = %chat, error = %e, "configured check time rejected");
                "Could not create alerts. Please check the configured times.".to_string()
            }
            Err(AlertError::Store(e)) => {
                error!(chat = %chat, error = %e, "could not persist alerts");
                "Could not save alerts. Please try again later.".to_string()
            }
        }
    }

    async fn disable(&self, chat: ChatId, coords: Coordinates) -> String {
        match self.service.unregister(chat, coords).await {
            Ok(removed) => format!("Removed jobs: {removed}"),
            Err(e) => {
                error!(chat = %chat, error = %e, "could not persist alert removal");
                "Could not save changes. Please try again later.".to_string()
            }
        }
    }

    async fn list(&self, chat: ChatId) -> String {
        let listings = self.service.list(chat).await;
        if listings.is_empty() {
            return "No jobs".to_string();
        }

        let operator = self.service.is_operator(chat);
        let mut text = String::new();
        for listing in listings {
            let names: Vec<&str> = listing.alerts.iter().map(|n| n.as_str()).collect();
            if operator {
                let _ = write!(text, "{} ", listing.chat);
            }
            let _ = writeln!(text, "{}: {}", listing.location, names.join(", "));
        }
        text
    }

    async fn weather(&self, chat: ChatId) -> String {
        let locations = self.service.locations_for(chat).await;
        if locations.is_empty() {
            return NO_LOCATIONS.to_string();
        }

        let mut text = String::new();
        for (key, location) in locations {
            let forecast = match location {
                Some(location) => location.pretty_forecast().await.ok(),
                None => None,
            };
            match forecast {
                Some(pretty) => text.push_str(&pretty),
                None => {
                    let _ = writeln!(text, "Could not check weather for {key}");
                }
            }
        }
        text
    }

    async fn snow(&self, chat: ChatId) -> String {
        let locations = self.service.locations_for(chat).await;
        if locations.is_empty() {
            return NO_LOCATIONS.to_string();
        }

        let mut text = String::new();
        for (key, location) in locations {
            let Some(location) = location else {
                let _ = writeln!(text, "Could not check weather for {key}");
                continue;
            };
            match location.check_snow_tomorrow().await {
                Ok(report) if report.snow => {
                    let _ = write!(text, "{}:\n{}", location.city(), report.details_text());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(chat = %chat, location = %key, error = %e, "manual snow check failed");
                    let _ = writeln!(text, "Could not check weather for {key}");
                }
            }
        }

        if text.is_empty() {
            "No snow tomorrow".to_string()
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/alert 51.5 9.9"),
            Command::Alert(Some(Coordinates::new(51.5, 9.9)))
        );
        assert_eq!(
            Command::parse("/disable@SnowAlertBot -33.8 151.2"),
            Command::Disable(Some(Coordinates::new(-33.8, 151.2)))
        );
        assert_eq!(Command::parse("/start"), Command::Help);
        assert_eq!(Command::parse("  /LIST  "), Command::List);
    }

    #[test]
    fn bad_arguments_parse_as_usage() {
        assert_eq!(Command::parse("/alert"), Command::Alert(None));
        assert_eq!(Command::parse("/alert 51.5"), Command::Alert(None));
        assert_eq!(Command::parse("/alert north 9.9"), Command::Alert(None));
        assert_eq!(Command::parse("/disable NaN 1"), Command::Disable(None));
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(Command::parse("/frost"), Command::Unknown("frost".into()));
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
    }
}
