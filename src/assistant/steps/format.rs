use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::assistant::context::{WeatherResult, WorkflowContext};
use crate::assistant::{FALLBACK_REPLY, FORMAT, MEMORY, prompts};
use crate::llm::{LanguageModel, Prompt};
use crate::workflow::{Step, StepError, Transition};

/// Non-empty specialist outputs in fixed order: fitness, recovery, weather,
/// calendar, general.
pub(crate) fn compose(ctx: &WorkflowContext) -> Vec<String> {
    let sections = [
        ctx.fitness.get().map(|f| f.summary.clone()),
        ctx.recovery.get().map(|r| r.text()),
        ctx.weather.get().map(|w| w.text().to_string()),
        ctx.calendar.get().cloned(),
        ctx.general.get().cloned(),
    ];
    sections
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Merges whatever the specialists produced into the reply.
pub struct FormatStep {
    llm: Arc<dyn LanguageModel>,
}

impl FormatStep {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    async fn polish(&self, composed: String) -> String {
        match self.llm.generate(Prompt::new(prompts::TELEGRAM_RESPONSE, composed.clone())).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => composed,
            Err(e) => {
                warn!("Reply polishing failed, sending composed text: {}", e);
                composed
            }
        }
    }
}

impl Step<WorkflowContext> for FormatStep {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn successors(&self) -> &'static [&'static str] {
        &[MEMORY]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let sections = compose(ctx);
            let asks_for_city = sections.len() == 1 && ctx.weather.get() == Some(&WeatherResult::CityNotFound);

            let reply = if sections.is_empty() {
                FALLBACK_REPLY.to_string()
            } else if asks_for_city {
                sections.join("")
            } else {
                self.polish(sections.join("\n\n")).await
            };
            ctx.reply.fill(reply)?;
            Ok(Transition::Next(MEMORY))
        })
    }
}
