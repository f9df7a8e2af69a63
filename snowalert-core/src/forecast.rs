use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::model::Coordinates;

const KELVIN_OFFSET: f64 = 273.15;

/// A 3-hourly forecast as returned by a [`ForecastSource`](crate::ForecastSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Coordinates the source actually resolved the request to.
    pub resolved: Coordinates,
    /// Display name of the resolved place.
    pub city: String,
    pub entries: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub dt: DateTime<Utc>,
    /// Source-formatted slot label, e.g. `2024-01-05 09:00:00`.
    pub dt_txt: String,
    pub temp_k: f64,
    pub descriptions: Vec<String>,
    /// Snow volume for the slot; `None` when the slot carries no snow block.
    pub snow_mm: Option<f64>,
}

impl ForecastEntry {
    fn temp_c(&self) -> f64 {
        self.temp_k - KELVIN_OFFSET
    }
}

/// Result of checking a forecast for snow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnowReport {
    pub snow: bool,
    pub details: Vec<String>,
}

impl SnowReport {
    pub fn details_text(&self) -> String {
        self.details.concat()
    }
}

impl Forecast {
    /// A forecast whose first slot already lies in the past needs a refresh.
    pub fn is_outdated(&self, now: DateTime<Utc>) -> bool {
        self.entries.first().is_none_or(|entry| entry.dt < now)
    }

    /// Scan every slot up to `limit` for snow.
    pub fn check_snow(&self, limit: DateTime<Utc>) -> SnowReport {
        let mut report = SnowReport::default();
        for entry in self.entries.iter().take_while(|e| e.dt <= limit) {
            let Some(mm) = entry.snow_mm else {
                continue;
            };
            report.snow = true;
            report.details.push(format!(
                "{}: {:.1}°C, {:?}, {}mm\n",
                entry.dt_txt,
                entry.temp_c(),
                entry.descriptions,
                mm
            ));
        }
        report
    }

    /// Snow between now and the end of tomorrow's early slots.
    pub fn check_snow_tomorrow(&self, now: DateTime<Utc>) -> SnowReport {
        self.check_snow(now + Duration::days(1) + Duration::hours(3))
    }

    /// City header followed by every fourth slot (12 hour steps).
    pub fn pretty(&self) -> String {
        let mut out = format!("{}: \n", self.city);
        for entry in self.entries.iter().step_by(4) {
            let _ = writeln!(
                out,
                "{}: {:.1}°C, {:?}",
                entry.dt_txt,
                entry.temp_c(),
                entry.descriptions
            );
        }
        out
    }
}
