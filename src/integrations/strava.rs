//! Strava v3 API client.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::oauth::OAuthApp;
use super::{FitnessProvider, ProviderError, check_status};

const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    pub id: i64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sport_type: String,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub moving_time: i64,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub suffer_score: Option<f64>,
}

impl Activity {
    pub fn is_run(&self) -> bool {
        matches!(self.sport_type.as_str(), "Run" | "TrailRun" | "VirtualRun")
    }

    /// Minutes per kilometer, when distance is known.
    pub fn pace_min_per_km(&self) -> Option<f64> {
        (self.distance > 0.0).then(|| (self.moving_time as f64 / 60.0) / (self.distance / 1000.0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub count: u32,
    pub distance: f64,
    pub moving_time: i64,
    #[serde(default)]
    pub elevation_gain: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AthleteStats {
    #[serde(default)]
    pub recent_run_totals: Totals,
    #[serde(default)]
    pub ytd_run_totals: Totals,
    #[serde(default)]
    pub all_run_totals: Totals,
}

pub struct StravaClient {
    oauth: OAuthApp,
    http: reqwest::Client,
}

impl StravaClient {
    pub fn new(oauth: OAuthApp) -> Self {
        Self {
            oauth,
            http: reqwest::Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        user_id: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let token = self.oauth.access_token(user_id).await?;
        debug!("Strava GET {}", path);
        let response = self
            .http
            .get(format!("{STRAVA_API_BASE}{path}"))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

impl FitnessProvider for StravaClient {
    fn athlete<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Athlete, ProviderError>> {
        Box::pin(async move { self.get(user_id, "/athlete", &[]).await })
    }

    fn activities_since<'a>(
        &'a self,
        user_id: &'a str,
        after: DateTime<Utc>,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Activity>, ProviderError>> {
        Box::pin(async move {
            let query = [
                ("after", after.timestamp().to_string()),
                ("per_page", limit.clamp(1, 200).to_string()),
            ];
            self.get(user_id, "/athlete/activities", &query).await
        })
    }

    fn stats<'a>(&'a self, user_id: &'a str, athlete_id: i64) -> BoxFuture<'a, Result<AthleteStats, ProviderError>> {
        Box::pin(async move { self.get(user_id, &format!("/athletes/{athlete_id}/stats"), &[]).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_parses_strava_payload() {
        let json = r#"{
            "id": 154504250376,
            "name": "Morning Run",
            "sport_type": "Run",
            "distance": 8012.4,
            "moving_time": 2460,
            "elapsed_time": 2532,
            "total_elevation_gain": 41.0,
            "start_date": "2026-10-14T01:12:44Z",
            "start_date_local": "2026-10-14T06:42:44Z",
            "average_heartrate": 148.2,
            "kudos_count": 3
        }"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert!(activity.is_run());
        assert_eq!(activity.moving_time, 2460);
        let pace = activity.pace_min_per_km().unwrap();
        assert!((pace - 5.117).abs() < 0.01);
    }

    #[test]
    fn test_stats_tolerates_missing_totals() {
        let stats: AthleteStats =
            serde_json::from_str(r#"{"recent_run_totals":{"count":4,"distance":30500.0,"moving_time":10800}}"#)
                .unwrap();
        assert_eq!(stats.recent_run_totals.count, 4);
        assert_eq!(stats.ytd_run_totals.count, 0);
    }

    #[test]
    fn test_zero_distance_has_no_pace() {
        let activity: Activity = serde_json::from_str(
            r#"{"id":1,"name":"Yoga","sport_type":"Yoga","distance":0.0,"moving_time":1800,"start_date":"2026-10-14T01:12:44Z"}"#,
        )
        .unwrap();
        assert!(!activity.is_run());
        assert!(activity.pace_min_per_km().is_none());
    }
}
