//! Open-Meteo geocoding and current-conditions client.

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use super::{ProviderError, WeatherProvider, check_status};

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub country: Option<String>,
}

fn default_timezone() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    /// Celsius.
    pub temperature: f64,
    /// km/h.
    pub windspeed: f64,
    #[serde(default)]
    pub weathercode: u8,
    #[serde(default = "default_is_day")]
    pub is_day: u8,
}

fn default_is_day() -> u8 {
    1
}

impl CurrentWeather {
    /// Plain-language label for the WMO weather code.
    pub fn description(&self) -> &'static str {
        match self.weathercode {
            0 => "clear sky",
            1 => "mainly clear",
            2 => "partly cloudy",
            3 => "overcast",
            45 | 48 => "fog",
            51 | 53 | 55 => "drizzle",
            56 | 57 => "freezing drizzle",
            61 | 63 | 65 => "rain",
            66 | 67 => "freezing rain",
            71 | 73 | 75 | 77 => "snow",
            80..=82 => "rain showers",
            85 | 86 => "snow showers",
            95 => "thunderstorm",
            96 | 99 => "thunderstorm with hail",
            _ => "unsettled weather",
        }
    }
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Location>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

pub struct OpenMeteoClient {
    http: reqwest::Client,
}

impl OpenMeteoClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherProvider for OpenMeteoClient {
    fn geocode<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<Location>, ProviderError>> {
        Box::pin(async move {
            let url = format!("{}?name={}&count=1", GEOCODING_URL, urlencoding::encode(name));
            debug!("Geocoding '{}'", name);
            let response = check_status(self.http.get(&url).send().await?).await?;
            let parsed: GeocodingResponse = response.json().await?;
            Ok(parsed.results.into_iter().next())
        })
    }

    fn current<'a>(&'a self, location: &'a Location) -> BoxFuture<'a, Result<CurrentWeather, ProviderError>> {
        Box::pin(async move {
            let url = format!(
                "{}?latitude={}&longitude={}&current_weather=true&timezone={}",
                FORECAST_URL,
                location.latitude,
                location.longitude,
                urlencoding::encode(&location.timezone)
            );
            debug!("Fetching weather for {}", location.name);
            let response = check_status(self.http.get(&url).send().await?).await?;
            let parsed: ForecastResponse = response.json().await?;
            Ok(parsed.current_weather)
        })
    }
}
