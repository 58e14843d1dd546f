use std::sync::Arc;

use futures::future::BoxFuture;

use crate::assistant::context::WorkflowContext;
use crate::assistant::{FORMAT, GENERAL, prompts};
use crate::llm::{LanguageModel, Prompt};
use crate::workflow::{Step, StepError, Transition};

/// Open-ended questions, answered with web search grounding.
pub struct GeneralStep {
    llm: Arc<dyn LanguageModel>,
}

impl GeneralStep {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

impl Step<WorkflowContext> for GeneralStep {
    fn name(&self) -> &'static str {
        GENERAL
    }

    fn successors(&self) -> &'static [&'static str] {
        &[FORMAT]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let system = format!("{}\n\nAbout the user: {}", prompts::GENERAL, ctx.user.describe());
            let prompt = Prompt::new(system, ctx.request_with_memories()).with_web_search();
            let answer = self
                .llm
                .generate(prompt)
                .await
                .map_err(|e| StepError::capability("language model", e))?;
            ctx.general.fill(answer.trim().to_string())?;
            Ok(Transition::Next(FORMAT))
        })
    }
}
