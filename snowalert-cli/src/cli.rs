use anyhow::{Context, Result, bail};
use chrono::{NaiveTime, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Text};
use snowalert_core::{
    AlertService, ChatId, CheckTime, Config, Coordinates, DurableStore, JsonFileStore, Settings,
    TokioTimer, provider::source_from_config,
};
use std::sync::Arc;
use tracing::info;

use crate::console::{self, ConsoleNotifier};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "snowalert", version, about = "Daily snow alerts for saved locations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set the API key, operator chat and check times.
    Configure,

    /// Restore saved alerts and serve commands read from stdin.
    ///
    /// Each input line is `<chat_id> <command...>`, e.g. `42 /alert 51.5 9.9`.
    Run,

    /// Check a single location for snow tomorrow and exit.
    Check {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lon: f64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Run => run().await,
            Command::Check { lat, lon } => check(Coordinates::new(lat, lon)).await,
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Text::new("OpenWeatherMap API key:")
        .with_default(config.openweather_api_key().unwrap_or_default())
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_openweather_api_key(api_key.trim().to_string());
    }

    let operator = CustomType::<i64>::new("Operator chat id (0 for none):")
        .with_default(config.operator_chat.map(|c| c.0).unwrap_or(0))
        .prompt()?;
    config.operator_chat = (operator != 0).then_some(ChatId(operator));

    let current: Vec<String> = config.check_times.iter().map(ToString::to_string).collect();
    let times = Text::new("Daily check times (HH:MM, comma separated):")
        .with_default(&current.join(", "))
        .prompt()?;
    config.check_times = parse_times(&times)?;

    config.utc_offset_minutes = CustomType::<i32>::new("UTC offset of the check times, in minutes:")
        .with_default(config.utc_offset_minutes)
        .prompt()?;

    config.validate()?;
    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn parse_times(input: &str) -> Result<Vec<CheckTime>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map(CheckTime::from)
                .with_context(|| format!("Invalid check time: {s}"))
        })
        .collect()
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    let source = source_from_config(&config)?;
    let store_path = config.store_path()?;
    let store = DurableStore::open(Box::new(JsonFileStore::new(store_path.clone())))
        .context("Failed to open alert store")?;
    let timer = Arc::new(TokioTimer::new(config.utc_offset()?));

    info!(store = %store_path.display(), "starting alert service");
    let service = AlertService::start(
        store,
        source,
        timer,
        Arc::new(ConsoleNotifier),
        Settings::from_config(&config),
    )
    .await
    .context("Failed to restore saved alerts")?;
    let service = Arc::new(service);

    console::serve(Arc::clone(&service)).await?;
    service.shutdown();
    Ok(())
}

async fn check(coords: Coordinates) -> Result<()> {
    let config = Config::load()?;
    let source = source_from_config(&config)?;

    let forecast = source.fetch(coords).await?;
    if forecast.is_outdated(Utc::now()) {
        bail!("Provider returned an outdated forecast for {coords}");
    }

    let report = forecast.check_snow_tomorrow(Utc::now());
    let resolved = forecast.resolved;
    println!("{} ({resolved})", forecast.city);
    if report.snow {
        print!("{}", report.details_text());
    } else {
        println!("No snow tomorrow");
    }
    Ok(())
}
