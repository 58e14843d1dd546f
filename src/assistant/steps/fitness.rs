use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use crate::assistant::context::{FitnessReport, FitnessSnapshot, WorkflowContext};
use crate::assistant::routing::Specialist;
use crate::assistant::{FITNESS, FORMAT, RECOVERY, prompts};
use crate::integrations::{Activity, FitnessProvider, ProviderError};
use crate::llm::{LanguageModel, Prompt};
use crate::workflow::{Step, StepError, Transition};

const LOOKBACK_DAYS: i64 = 14;
const MAX_ACTIVITIES: u32 = 30;

/// Compact activity row for prompts.
#[derive(Serialize)]
pub(crate) struct ActivityRow {
    date: String,
    name: String,
    sport: String,
    km: f64,
    minutes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pace_min_per_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_hr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effort: Option<f64>,
}

impl From<&Activity> for ActivityRow {
    fn from(a: &Activity) -> Self {
        let round = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            date: a.start_date.format("%Y-%m-%d").to_string(),
            name: a.name.clone(),
            sport: a.sport_type.clone(),
            km: round(a.distance / 1000.0),
            minutes: round(a.moving_time as f64 / 60.0),
            pace_min_per_km: a.pace_min_per_km().map(round),
            avg_hr: a.average_heartrate,
            effort: a.suffer_score,
        }
    }
}

/// Fetches recent Strava data and summarises it for the question asked.
pub struct FitnessStep {
    llm: Arc<dyn LanguageModel>,
    provider: Arc<dyn FitnessProvider>,
}

impl FitnessStep {
    pub fn new(llm: Arc<dyn LanguageModel>, provider: Arc<dyn FitnessProvider>) -> Self {
        Self { llm, provider }
    }

    async fn snapshot(&self, user_id: &str, now: DateTime<Utc>) -> Result<FitnessSnapshot, ProviderError> {
        let athlete = self.provider.athlete(user_id).await?;
        let mut activities = self
            .provider
            .activities_since(user_id, now - Duration::days(LOOKBACK_DAYS), MAX_ACTIVITIES)
            .await?;
        activities.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        let stats = match self.provider.stats(user_id, athlete.id).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Strava stats unavailable: {}", e);
                None
            }
        };
        Ok(FitnessSnapshot { athlete, activities, stats })
    }

    async fn summarise(&self, ctx: &WorkflowContext, snapshot: &FitnessSnapshot) -> String {
        let rows: Vec<ActivityRow> = snapshot.activities.iter().map(ActivityRow::from).collect();
        let data = serde_json::json!({
            "athlete": {
                "name": snapshot.athlete.firstname,
                "city": snapshot.athlete.city,
            },
            "activities_last_14_days": rows,
            "totals": snapshot.stats,
        });
        let user = format!("{}\n\nStrava data:\n{}", ctx.request_with_memories(), data);

        match self.llm.generate(Prompt::new(prompts::FITNESS, user)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => digest(snapshot),
            Err(e) => {
                warn!("Fitness summary failed, using digest: {}", e);
                digest(snapshot)
            }
        }
    }
}

/// Plain summary used when the model is unavailable.
fn digest(snapshot: &FitnessSnapshot) -> String {
    let runs: Vec<&Activity> = snapshot.activities.iter().filter(|a| a.is_run()).collect();
    let km: f64 = runs.iter().map(|a| a.distance / 1000.0).sum();
    let mut out = format!("You logged {} runs in the last {} days covering {:.1} km.", runs.len(), LOOKBACK_DAYS, km);
    if let Some(latest) = runs.first() {
        out.push_str(&format!(
            " Latest: {} on {}, {:.1} km.",
            latest.name,
            latest.start_date.format("%d %b"),
            latest.distance / 1000.0
        ));
    }
    out
}

fn unavailable_message(err: &ProviderError) -> String {
    match err {
        ProviderError::NotConnected(_) => {
            "Your Strava account isn't connected yet, so I can't see your training data.".to_string()
        }
        _ => "I couldn't reach Strava right now, so I don't have your latest training data.".to_string(),
    }
}

impl Step<WorkflowContext> for FitnessStep {
    fn name(&self) -> &'static str {
        FITNESS
    }

    fn successors(&self) -> &'static [&'static str] {
        &[RECOVERY, FORMAT]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let report = match self.snapshot(&ctx.user.user_id, ctx.now).await {
                Ok(snapshot) => {
                    info!("🏃 {} activities fetched", snapshot.activities.len());
                    let summary = self.summarise(ctx, &snapshot).await;
                    FitnessReport { summary, snapshot: Some(snapshot) }
                }
                Err(e) => {
                    warn!("Strava unavailable for user {}: {}", ctx.user.user_id, e);
                    FitnessReport { summary: unavailable_message(&e), snapshot: None }
                }
            };
            ctx.fitness.fill(report)?;

            if ctx.specialist == Some(Specialist::Recovery) {
                Ok(Transition::Next(RECOVERY))
            } else {
                Ok(Transition::Next(FORMAT))
            }
        })
    }
}
