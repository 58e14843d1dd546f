//! External capabilities: fitness data, weather and calendar.
//!
//! Steps only see the traits in this module. Concrete clients live in the
//! submodules and own their HTTP and OAuth details.

pub mod calendar;
pub mod oauth;
pub mod strava;
pub mod weather;

use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

pub use calendar::{CalendarEvent, EventDraft, GoogleCalendarClient};
pub use oauth::{OAuthApp, OAuthToken, TokenStore};
pub use strava::{Activity, Athlete, AthleteStats, StravaClient};
pub use weather::{CurrentWeather, Location, OpenMeteoClient};

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// No stored credentials for this user and provider.
    NotConnected(&'static str),
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
    Storage(String),
}

impl ProviderError {
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotConnected(provider) => write!(f, "{provider} is not connected"),
            ProviderError::Http(e) => write!(f, "HTTP error: {e}"),
            ProviderError::Api { status, body } => write!(f, "API error {status}: {body}"),
            ProviderError::Parse(e) => write!(f, "Parse error: {e}"),
            ProviderError::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else {
            ProviderError::Http(e.to_string())
        }
    }
}

/// Turn a non-2xx response into `ProviderError::Api`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api { status: status.as_u16(), body })
}

/// Read-only fitness data for one user.
pub trait FitnessProvider: Send + Sync {
    fn athlete<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Athlete, ProviderError>>;

    fn activities_since<'a>(
        &'a self,
        user_id: &'a str,
        after: DateTime<Utc>,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Activity>, ProviderError>>;

    fn stats<'a>(
        &'a self,
        user_id: &'a str,
        athlete_id: i64,
    ) -> BoxFuture<'a, Result<AthleteStats, ProviderError>>;
}

pub trait WeatherProvider: Send + Sync {
    /// Resolve a place name. `Ok(None)` means the name is unknown.
    fn geocode<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<Location>, ProviderError>>;

    fn current<'a>(&'a self, location: &'a Location) -> BoxFuture<'a, Result<CurrentWeather, ProviderError>>;
}

pub trait CalendarProvider: Send + Sync {
    fn events<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        query: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<CalendarEvent>, ProviderError>>;

    fn create<'a>(
        &'a self,
        user_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>>;

    fn update<'a>(
        &'a self,
        user_id: &'a str,
        event_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>>;

    fn delete<'a>(&'a self, user_id: &'a str, event_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>>;
}

/// Stand-in for an integration that has no OAuth app configured.
pub struct Disconnected(pub &'static str);

impl FitnessProvider for Disconnected {
    fn athlete<'a>(&'a self, _user_id: &'a str) -> BoxFuture<'a, Result<Athlete, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }

    fn activities_since<'a>(
        &'a self,
        _user_id: &'a str,
        _after: DateTime<Utc>,
        _limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Activity>, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }

    fn stats<'a>(&'a self, _user_id: &'a str, _athlete_id: i64) -> BoxFuture<'a, Result<AthleteStats, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }
}

impl CalendarProvider for Disconnected {
    fn events<'a>(
        &'a self,
        _user_id: &'a str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _query: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<CalendarEvent>, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }

    fn create<'a>(&'a self, _user_id: &'a str, _draft: &'a EventDraft) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }

    fn update<'a>(
        &'a self,
        _user_id: &'a str,
        _event_id: &'a str,
        _draft: &'a EventDraft,
    ) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }

    fn delete<'a>(&'a self, _user_id: &'a str, _event_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move { Err(ProviderError::NotConnected(self.0)) })
    }
}
