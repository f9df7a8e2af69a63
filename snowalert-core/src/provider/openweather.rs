use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::{Coordinates, Forecast, ForecastEntry, Unavailable};

use super::ForecastSource;

const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct OpenWeatherSource {
    api_key: String,
    http: Client,
}

impl OpenWeatherSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { api_key: api_key.into(), http }
    }

    async fn fetch_forecast(&self, at: Coordinates) -> Result<Forecast, Unavailable> {
        let res = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| Unavailable::Request(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Unavailable::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(Unavailable::Status {
                status: status.to_string(),
                body: truncate_body(&body),
            });
        }

        parse_forecast(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
    coord: OwCoord,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwSnow {
    #[serde(rename = "3h", default)]
    three_hours: f64,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    dt_txt: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    snow: Option<OwSnow>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    // OWM reports the code as a string on success and a number on errors
    cod: serde_json::Value,
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

fn parse_forecast(body: &str) -> Result<Forecast, Unavailable> {
    let parsed: OwForecastResponse = serde_json::from_str(body)
        .map_err(|e| Unavailable::Malformed(format!("failed to parse OpenWeather forecast JSON: {e}")))?;

    if parsed.cod.as_str() != Some("200") {
        return Err(Unavailable::Status {
            status: parsed.cod.to_string(),
            body: truncate_body(body),
        });
    }

    let entries = parsed
        .list
        .into_iter()
        .map(|entry| {
            let dt = unix_to_utc(entry.dt).ok_or_else(|| {
                Unavailable::Malformed(format!("invalid forecast timestamp {}", entry.dt))
            })?;
            Ok(ForecastEntry {
                dt,
                dt_txt: entry.dt_txt,
                temp_k: entry.main.temp,
                descriptions: entry.weather.into_iter().map(|w| w.description).collect(),
                snow_mm: entry.snow.map(|s| s.three_hours),
            })
        })
        .collect::<Result<Vec<_>, Unavailable>>()?;

    Ok(Forecast {
        resolved: Coordinates::new(parsed.city.coord.lat, parsed.city.coord.lon),
        city: parsed.city.name,
        entries,
    })
}

#[async_trait]
impl ForecastSource for OpenWeatherSource {
    async fn fetch(&self, at: Coordinates) -> Result<Forecast, Unavailable> {
        match self.fetch_forecast(at).await {
            Ok(forecast) => {
                info!(requested = %at, resolved = %forecast.resolved, city = %forecast.city, "forecast updated");
                Ok(forecast)
            }
            Err(e) => {
                warn!(requested = %at, error = %e, "forecast request failed");
                Err(e)
            }
        }
    }
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
