use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use crate::assistant::context::WorkflowContext;
use crate::assistant::routing::{Specialist, select_specialist};
use crate::assistant::{CALENDAR, FITNESS, GENERAL, ROUTE, WEATHER, prompts};
use crate::llm::{LanguageModel, Prompt, generate_structured};
use crate::workflow::{Step, StepError, Transition};

#[derive(Debug, Deserialize)]
struct RouteDecision {
    appropriate_node: String,
}

/// Asks the model which specialist should answer.
pub struct RouteStep {
    llm: Arc<dyn LanguageModel>,
}

impl RouteStep {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

impl Step<WorkflowContext> for RouteStep {
    fn name(&self) -> &'static str {
        ROUTE
    }

    fn successors(&self) -> &'static [&'static str] {
        &[FITNESS, WEATHER, CALENDAR, GENERAL]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let prompt = Prompt::new(prompts::ROUTER, ctx.request()).with_schema(prompts::route_schema());
            let label = match generate_structured::<RouteDecision>(self.llm.as_ref(), prompt).await {
                Ok(decision) => decision.appropriate_node,
                Err(e) => {
                    warn!("Routing failed, using {}: {}", Specialist::General.label(), e);
                    String::new()
                }
            };

            let specialist = select_specialist(&label);
            info!("🧭 '{}' → {:?}", label.trim(), specialist);
            ctx.routing_label = Some(label);
            ctx.specialist = Some(specialist);
            Ok(Transition::Next(specialist.step()))
        })
    }
}
