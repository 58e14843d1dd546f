use std::sync::Arc;

use chrono::Duration;
use futures::future::BoxFuture;
use tracing::{info, warn};

use super::fitness::ActivityRow;
use crate::assistant::context::{RecoveryAdvice, RecoveryReport, WeeklyLoad, WorkflowContext};
use crate::assistant::{CALENDAR, NEED_FITNESS_DATA, RECOVERY, prompts};
use crate::llm::{LanguageModel, Prompt, generate_structured};
use crate::workflow::{END, Step, StepError, Transition};

/// Decides whether today is a run day from the past week of activities.
///
/// Without fitness data the run ends here with [`NEED_FITNESS_DATA`].
pub struct RecoveryStep {
    llm: Arc<dyn LanguageModel>,
}

impl RecoveryStep {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

impl Step<WorkflowContext> for RecoveryStep {
    fn name(&self) -> &'static str {
        RECOVERY
    }

    fn successors(&self) -> &'static [&'static str] {
        &[CALENDAR, END]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let fitness = ctx.fitness.require()?;
            let Some(snapshot) = fitness.snapshot.as_ref().filter(|s| !s.activities.is_empty()) else {
                info!("No fitness data for recovery analysis");
                return Ok(Transition::Finish(NEED_FITNESS_DATA.to_string()));
            };

            let week_start = ctx.now - Duration::days(7);
            let week: Vec<ActivityRow> = snapshot
                .activities
                .iter()
                .filter(|a| a.start_date >= week_start)
                .map(ActivityRow::from)
                .collect();
            let load = WeeklyLoad::from_activities(&snapshot.activities, ctx.now);
            let data = serde_json::json!({ "runs_past_week": week, "weekly_load": load });
            let user = format!(
                "Today is {}.\n\nActivity data:\n{}\n\nUser asked: {}",
                ctx.now.with_timezone(&ctx.user.timezone).format("%A %d %B %Y"),
                data,
                ctx.request()
            );

            let prompt = Prompt::new(prompts::RECOVERY, user).with_schema(prompts::recovery_schema());
            let advice = match generate_structured::<RecoveryAdvice>(self.llm.as_ref(), prompt).await {
                Ok(advice) => advice,
                Err(e) => {
                    warn!("Recovery analysis failed, using weekly load only: {}", e);
                    RecoveryAdvice::from_load(&load)
                }
            };

            info!("🛌 Good day to run: {}", advice.is_good_day_to_run);
            ctx.recovery.fill(RecoveryReport { advice, load })?;
            Ok(Transition::Next(CALENDAR))
        })
    }
}
