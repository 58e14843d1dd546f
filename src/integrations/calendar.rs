//! Google Calendar v3 client.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::oauth::OAuthApp;
use super::{CalendarProvider, ProviderError, check_status};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const MAX_RESULTS: u32 = 25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    /// Set instead of `date_time` for all-day events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl EventTime {
    pub fn at(date_time: DateTime<FixedOffset>) -> Self {
        Self { date_time: Some(date_time), date: None }
    }

    pub fn label(&self) -> String {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => dt.format("%a %d %b %H:%M").to_string(),
            (None, Some(d)) => format!("{} (all day)", d.format("%a %d %b")),
            (None, None) => "unscheduled".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default)]
    pub location: Option<String>,
}

impl CalendarEvent {
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("(untitled)")
    }

    /// One line, e.g. `Tue 20 Oct 07:00 Easy run [id: abc]`.
    pub fn line(&self) -> String {
        let mut line = format!("{} {}", self.start.label(), self.title());
        if let Some(ref location) = self.location {
            line.push_str(&format!(" @ {location}"));
        }
        line.push_str(&format!(" [id: {}]", self.id));
        line
    }
}

/// Fields for creating or patching an event. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDraft {
    pub summary: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
struct EventBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<BodyTime<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<BodyTime<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct BodyTime<'a> {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: &'a str,
}

fn event_body<'a>(draft: &'a EventDraft, time_zone: &'a str) -> EventBody<'a> {
    let time = |dt: &Option<DateTime<FixedOffset>>| {
        dt.map(|dt| BodyTime { date_time: dt.to_rfc3339(), time_zone })
    };
    EventBody {
        summary: draft.summary.as_deref(),
        start: time(&draft.start),
        end: time(&draft.end),
        location: draft.location.as_deref(),
        description: draft.description.as_deref(),
    }
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

pub struct GoogleCalendarClient {
    oauth: OAuthApp,
    http: reqwest::Client,
    calendar_id: String,
    time_zone: String,
}

impl GoogleCalendarClient {
    pub fn new(oauth: OAuthApp, calendar_id: String, time_zone: String) -> Self {
        Self {
            oauth,
            http: reqwest::Client::new(),
            calendar_id,
            time_zone,
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            CALENDAR_API_BASE,
            urlencoding::encode(&self.calendar_id)
        )
    }
}

impl CalendarProvider for GoogleCalendarClient {
    fn events<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        query: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<CalendarEvent>, ProviderError>> {
        Box::pin(async move {
            let token = self.oauth.access_token(user_id).await?;
            let mut params = vec![
                ("timeMin", from.to_rfc3339()),
                ("timeMax", to.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", MAX_RESULTS.to_string()),
            ];
            if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
                params.push(("q", q.to_string()));
            }
            debug!("Listing calendar events {} .. {}", from, to);
            let response = self
                .http
                .get(self.events_url())
                .bearer_auth(token)
                .query(&params)
                .send()
                .await?;
            let list: EventList = check_status(response).await?.json().await?;
            Ok(list.items)
        })
    }

    fn create<'a>(&'a self, user_id: &'a str, draft: &'a EventDraft) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>> {
        Box::pin(async move {
            let token = self.oauth.access_token(user_id).await?;
            let response = self
                .http
                .post(self.events_url())
                .bearer_auth(token)
                .json(&event_body(draft, &self.time_zone))
                .send()
                .await?;
            let event: CalendarEvent = check_status(response).await?.json().await?;
            info!("📅 Created event {}", event.id);
            Ok(event)
        })
    }

    fn update<'a>(
        &'a self,
        user_id: &'a str,
        event_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, Result<CalendarEvent, ProviderError>> {
        Box::pin(async move {
            let token = self.oauth.access_token(user_id).await?;
            let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
            let response = self
                .http
                .patch(url)
                .bearer_auth(token)
                .json(&event_body(draft, &self.time_zone))
                .send()
                .await?;
            let event: CalendarEvent = check_status(response).await?.json().await?;
            info!("📅 Updated event {}", event.id);
            Ok(event)
        })
    }

    fn delete<'a>(&'a self, user_id: &'a str, event_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let token = self.oauth.access_token(user_id).await?;
            let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
            let response = self.http.delete(url).bearer_auth(token).send().await?;
            check_status(response).await?;
            info!("📅 Deleted event {}", event_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_list_parses_timed_and_all_day() {
        let list: EventList = serde_json::from_str(
            r#"{"items":[
                {"id":"a1","summary":"Standup","start":{"dateTime":"2026-10-19T09:30:00+05:30"},"end":{"dateTime":"2026-10-19T09:45:00+05:30"}},
                {"id":"b2","summary":"Marathon expo","start":{"date":"2026-10-24"},"end":{"date":"2026-10-25"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].start.label(), "Mon 19 Oct 09:30");
        assert_eq!(list.items[1].start.label(), "Sat 24 Oct (all day)");
        assert!(list.items[1].line().ends_with("[id: b2]"));
    }

    #[test]
    fn test_patch_body_skips_unset_fields() {
        let draft = EventDraft {
            summary: Some("Tempo run".into()),
            ..Default::default()
        };
        let body = serde_json::to_value(event_body(&draft, "Asia/Kolkata")).unwrap();
        assert_eq!(body, serde_json::json!({ "summary": "Tempo run" }));
    }

    #[test]
    fn test_create_body_includes_time_zone() {
        let start = DateTime::parse_from_rfc3339("2026-10-20T07:00:00+05:30").unwrap();
        let draft = EventDraft {
            summary: Some("Easy run".into()),
            start: Some(start),
            end: Some(start + chrono::Duration::minutes(45)),
            ..Default::default()
        };
        let body = serde_json::to_value(event_body(&draft, "Asia/Kolkata")).unwrap();
        assert_eq!(body["start"]["timeZone"], "Asia/Kolkata");
        assert_eq!(body["end"]["dateTime"], "2026-10-20T07:45:00+05:30");
    }
}
