//! Per-run state passed `&mut` through every step.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::routing::Specialist;
use crate::integrations::{Activity, Athlete, AthleteStats};
use crate::memory::MemoryRecord;
use crate::workflow::Slot;

/// Asked when no city can be found in the request or the profile.
pub const CITY_QUESTION: &str = "Which city would you like the weather forecast for?";

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub home_city: Option<String>,
    pub interests: Vec<String>,
    pub timezone: Tz,
}

impl UserProfile {
    /// One line for prompts.
    pub fn describe(&self) -> String {
        let mut out = format!("Name: {}", self.name);
        if let Some(ref email) = self.email {
            out.push_str(&format!(". Email: {email}"));
        }
        if let Some(ref city) = self.home_city {
            out.push_str(&format!(". Home city: {city}"));
        }
        if !self.interests.is_empty() {
            out.push_str(&format!(". Interests: {}", self.interests.join(", ")));
        }
        out
    }
}

/// Raw data behind a fitness summary.
#[derive(Debug, Clone)]
pub struct FitnessSnapshot {
    pub athlete: Athlete,
    /// Newest first.
    pub activities: Vec<Activity>,
    pub stats: Option<AthleteStats>,
}

#[derive(Debug, Clone)]
pub struct FitnessReport {
    pub summary: String,
    /// `None` when the provider could not be reached.
    pub snapshot: Option<FitnessSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAdvice {
    pub is_good_day_to_run: bool,
    pub reasoning: String,
    pub suggested_activity: String,
}

impl RecoveryAdvice {
    /// Rule-of-thumb verdict from volume alone, used when the model can't be asked.
    pub fn from_load(load: &WeeklyLoad) -> Self {
        let ran_today = load.days_since_last_run == Some(0);
        if ran_today || load.runs >= 6 {
            return Self {
                is_good_day_to_run: false,
                reasoning: format!("You've logged {} runs this week, so your legs could use a break.", load.runs),
                suggested_activity: "rest, mobility work or an easy walk".to_string(),
            };
        }
        let easy_km = if load.runs == 0 {
            5.0
        } else {
            (load.distance_km / load.runs as f64).clamp(3.0, 10.0)
        };
        Self {
            is_good_day_to_run: true,
            reasoning: "Your recent volume leaves room for a run.".to_string(),
            suggested_activity: format!("an easy {easy_km:.0} km run"),
        }
    }
}

/// Running volume over the last seven days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklyLoad {
    pub runs: usize,
    pub distance_km: f64,
    pub moving_minutes: f64,
    pub longest_km: f64,
    pub days_since_last_run: Option<i64>,
}

impl WeeklyLoad {
    pub fn from_activities(activities: &[Activity], now: DateTime<Utc>) -> Self {
        let since = now - Duration::days(7);
        let mut load = WeeklyLoad::default();
        let mut last_run: Option<DateTime<Utc>> = None;

        for run in activities.iter().filter(|a| a.is_run() && a.start_date >= since) {
            let km = run.distance / 1000.0;
            load.runs += 1;
            load.distance_km += km;
            load.moving_minutes += run.moving_time as f64 / 60.0;
            load.longest_km = load.longest_km.max(km);
            last_run = Some(last_run.map_or(run.start_date, |t| t.max(run.start_date)));
        }
        load.days_since_last_run = last_run.map(|t| (now - t).num_days());
        load
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub advice: RecoveryAdvice,
    pub load: WeeklyLoad,
}

impl RecoveryReport {
    pub fn text(&self) -> String {
        let verdict = if self.advice.is_good_day_to_run {
            "Today looks like a good day to run."
        } else {
            "Today is better spent recovering."
        };
        format!(
            "{} {} Suggested: {}. Last 7 days: {} runs, {:.1} km, {:.0} min.",
            verdict,
            self.advice.reasoning.trim(),
            self.advice.suggested_activity.trim(),
            self.load.runs,
            self.load.distance_km,
            self.load.moving_minutes
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherResult {
    Forecast(String),
    /// Neither the request nor the profile names a city.
    CityNotFound,
    /// Lookup failed; the text is safe to show.
    Unavailable(String),
}

impl WeatherResult {
    pub fn text(&self) -> &str {
        match self {
            WeatherResult::Forecast(text) | WeatherResult::Unavailable(text) => text,
            WeatherResult::CityNotFound => CITY_QUESTION,
        }
    }
}

pub struct WorkflowContext {
    request: String,
    pub user: UserProfile,
    pub now: DateTime<Utc>,
    pub routing_label: Option<String>,
    pub specialist: Option<Specialist>,
    pub prior_memories: Slot<Vec<MemoryRecord>>,
    pub fitness: Slot<FitnessReport>,
    pub recovery: Slot<RecoveryReport>,
    pub weather: Slot<WeatherResult>,
    pub calendar: Slot<String>,
    pub general: Slot<String>,
    pub reply: Slot<String>,
}

impl WorkflowContext {
    pub fn new(request: impl Into<String>, user: UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            request: request.into(),
            user,
            now,
            routing_label: None,
            specialist: None,
            prior_memories: Slot::new("prior_memories"),
            fitness: Slot::new("fitness"),
            recovery: Slot::new("recovery"),
            weather: Slot::new("weather"),
            calendar: Slot::new("calendar"),
            general: Slot::new("general"),
            reply: Slot::new("reply"),
        }
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    /// The request prefixed with recalled exchanges, if any.
    pub fn request_with_memories(&self) -> String {
        let memories = self.prior_memories.get().map(Vec::as_slice).unwrap_or_default();
        if memories.is_empty() {
            return self.request.clone();
        }
        let recalled: Vec<String> = memories.iter().map(|m| format!("- {}", m.summary())).collect();
        format!(
            "Relevant earlier conversation:\n{}\n\nCurrent request: {}",
            recalled.join("\n"),
            self.request
        )
    }
}
