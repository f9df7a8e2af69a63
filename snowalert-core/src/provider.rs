use crate::{Config, Coordinates, Forecast, Unavailable, provider::openweather::OpenWeatherSource};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Anything that can produce a 3-hourly forecast for a coordinate pair.
///
/// The returned forecast carries the coordinates the source snapped the
/// request to; callers key locations on those, not on the request.
#[async_trait]
pub trait ForecastSource: Send + Sync + Debug {
    async fn fetch(&self, at: Coordinates) -> Result<Forecast, Unavailable>;
}

/// Construct the OpenWeatherMap source from config.
pub fn source_from_config(config: &Config) -> anyhow::Result<Arc<dyn ForecastSource>> {
    let api_key = config.openweather_api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeatherMap API key configured.\n\
                 Hint: run `snowalert configure` or set OPENWEATHER_API_KEY."
        )
    })?;

    Ok(Arc::new(OpenWeatherSource::new(api_key)))
}
