//! Current weather lookup against the OpenWeather API.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Default OpenWeather current-conditions endpoint.
pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// City used when the request does not name one.
pub const DEFAULT_WEATHER_CITY: &str = "London";

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_city: String,
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENWEATHER_URL.to_string(),
            default_city: DEFAULT_WEATHER_CITY.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum WeatherError {
    /// Non-success status or a body without the expected fields
    #[error("Could not fetch weather data for {0}.")]
    Unavailable(String),

    #[error("Error fetching weather: {0}")]
    Request(#[from] reqwest::Error),
}

/// Parsed subset of the OpenWeather response.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub description: String,
    pub temp: Value,
    pub feels_like: Value,
    pub humidity: Value,
}

impl std::fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Weather in {}: {}, Temp: {}°C (feels like {}°C), Humidity: {}%",
            self.city, self.description, self.temp, self.feels_like, self.humidity
        )
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    weather: Vec<ApiCondition>,
    main: Option<ApiMain>,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: Value,
    feels_like: Value,
    humidity: Value,
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    config: WeatherConfig,
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new(config: WeatherConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn default_city(&self) -> &str {
        &self.config.default_city
    }

    /// Look up `city` and return the user-facing reply. Never fails.
    pub async fn lookup(&self, city: &str) -> String {
        match self.fetch(city).await {
            Ok(report) => report.to_string(),
            Err(e) => {
                tracing::warn!(city = %city, "Weather lookup failed: {}", e);
                e.to_string()
            }
        }
    }

    pub async fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        tracing::debug!(city = %city, "Fetching weather");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("q", city),
                ("appid", self.config.api_key.as_str()),
                ("units", "metric"),
            ])
            .timeout(self.config.timeout)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(WeatherError::Unavailable(city.to_string()));
        }

        // Any JSON body lacking the reported fields is treated like a miss
        let parsed = serde_json::from_value::<ApiResponse>(body).ok();
        let Some((condition, main)) =
            parsed.and_then(|body| Some((body.weather.into_iter().next()?, body.main?)))
        else {
            return Err(WeatherError::Unavailable(city.to_string()));
        };

        Ok(WeatherReport {
            city: city.to_string(),
            description: capitalize(&condition.description),
            temp: main.temp,
            feels_like: main.feels_like,
            humidity: main.humidity,
        })
    }
}

/// Upper-case the first character and lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
