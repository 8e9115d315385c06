//! Weather summaries shown next to a recommendation.
//!
//! Provides the `WeatherProvider` trait and a wttr.in implementation. The
//! summary is opaque display text; every failure degrades to
//! [`WEATHER_UNAVAILABLE`] instead of surfacing an error.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Shown when no weather summary could be fetched.
pub const WEATHER_UNAVAILABLE: &str = "Weather data not available";

/// Errors from a single weather fetch. Swallowed by [`WeatherProvider::current`].
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Could not build HTTP client: {0}")]
    Client(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unexpected status: HTTP {0}")]
    Status(u16),

    #[error("Empty response body")]
    EmptyBody,
}

/// Trait for weather sources.
pub trait WeatherProvider {
    /// Current weather summary for a location, or [`WEATHER_UNAVAILABLE`].
    fn current(&self, location: &str) -> impl Future<Output = String> + Send;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;
}

/// wttr.in client configuration.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// Base URL of the wttr.in service
    pub base_url: String,
    /// wttr.in format string (condition, temperature, moon phase)
    pub format: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wttr.in".to_string(),
            format: "%C+%t+%m".to_string(),
            timeout_secs: 6,
        }
    }
}

/// Weather provider backed by wttr.in (no API key required).
pub struct WttrClient {
    config: WeatherConfig,
    client: reqwest::Client,
}

impl WttrClient {
    pub fn new(config: WeatherConfig) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WeatherError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Build the request URL for a location.
    fn build_url(&self, location: &str) -> String {
        format!(
            "{}/{}?format={}",
            self.config.base_url.trim_end_matches('/'),
            location.trim().replace(' ', "+"),
            self.config.format
        )
    }

    async fn fetch(&self, location: &str) -> Result<String, WeatherError> {
        let url = self.build_url(location);
        tracing::debug!(url = %url, "Fetching weather");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WeatherError::Connection(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(WeatherError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Connection(e.to_string()))?;

        let summary = body.trim();
        if summary.is_empty() {
            return Err(WeatherError::EmptyBody);
        }

        Ok(summary.to_string())
    }
}

impl WeatherProvider for WttrClient {
    async fn current(&self, location: &str) -> String {
        match self.fetch(location).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::debug!(location, error = %e, "Weather lookup failed");
                WEATHER_UNAVAILABLE.to_string()
            }
        }
    }

    fn name(&self) -> &'static str {
        "wttr.in"
    }
}
