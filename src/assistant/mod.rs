//! The personal assistant: specialist steps wired into one workflow.
//!
//! ```text
//! Memory -> Route -> {Fitness, Weather, Calendar, General}
//! Fitness -> {Recovery, Format}
//! Recovery -> {Calendar, End}
//! Calendar -> {Format, End}
//! Weather, General -> Format -> Memory -> End
//! ```

pub mod context;
pub mod prompts;
pub mod routing;
pub mod steps;


use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::integrations::{CalendarProvider, FitnessProvider, WeatherProvider};
use crate::llm::LanguageModel;
use crate::memory::MemoryStore;
use crate::workflow::{GraphError, Workflow};

pub use context::{UserProfile, WorkflowContext};
pub use routing::{Specialist, select_specialist};
use steps::{CalendarStep, FitnessStep, FormatStep, GeneralStep, MemoryStep, RecoveryStep, RouteStep, WeatherStep};

pub const MEMORY: &str = "Memory";
pub const ROUTE: &str = "Route";
pub const FITNESS: &str = "Fitness";
pub const RECOVERY: &str = "Recovery";
pub const WEATHER: &str = "Weather";
pub const CALENDAR: &str = "Calendar";
pub const GENERAL: &str = "General";
pub const FORMAT: &str = "Format";

/// Sent when a run fails for any reason.
pub const APOLOGY: &str = "Sorry, something went wrong on my side. Please try again in a moment.";

/// Sent when no specialist produced anything.
pub const FALLBACK_REPLY: &str =
    "I'm not sure how to help with that yet. Ask me about your runs, recovery, the weather, your calendar, or anything else!";

/// Ends a recovery request when there is no training data to analyse.
pub const NEED_FITNESS_DATA: &str =
    "I need some recent activity data to judge your recovery. Log a run on Strava (or connect your account) and ask me again.";

/// Capabilities the steps call out to.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LanguageModel>,
    pub fitness: Arc<dyn FitnessProvider>,
    pub weather: Arc<dyn WeatherProvider>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub memory: Arc<dyn MemoryStore>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssistantSettings {
    /// Prior exchanges recalled per request.
    pub memory_limit: usize,
    pub run_timeout: Duration,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            memory_limit: 5,
            run_timeout: Duration::from_secs(90),
        }
    }
}

/// Build and validate the assistant graph.
pub fn build_workflow(services: &Services, settings: AssistantSettings) -> Result<Workflow<WorkflowContext>, GraphError> {
    Workflow::builder(MEMORY)
        .step(MemoryStep::new(services.memory.clone(), settings.memory_limit))
        .step(RouteStep::new(services.llm.clone()))
        .step(FitnessStep::new(services.llm.clone(), services.fitness.clone()))
        .step(RecoveryStep::new(services.llm.clone()))
        .step(WeatherStep::new(services.llm.clone(), services.weather.clone()))
        .step(CalendarStep::new(services.llm.clone(), services.calendar.clone()))
        .step(GeneralStep::new(services.llm.clone()))
        .step(FormatStep::new(services.llm.clone()))
        .reentrant(MEMORY, 2)
        .timeout(settings.run_timeout)
        .build()
}

pub struct Assistant {
    workflow: Workflow<WorkflowContext>,
}

impl Assistant {
    pub fn new(services: Services, settings: AssistantSettings) -> Result<Self, GraphError> {
        let workflow = build_workflow(&services, settings)?;
        Ok(Self { workflow })
    }

    pub fn workflow(&self) -> &Workflow<WorkflowContext> {
        &self.workflow
    }

    /// Answer one message. Never fails; errors are logged and replaced by
    /// [`APOLOGY`].
    pub async fn respond(&self, request: &str, user: UserProfile) -> String {
        self.respond_at(request, user, Utc::now()).await
    }

    pub async fn respond_at(&self, request: &str, user: UserProfile, now: DateTime<Utc>) -> String {
        let user_id = user.user_id.clone();
        let mut ctx = WorkflowContext::new(request, user, now);
        match self.workflow.run(&mut ctx).await {
            Ok(reply) => {
                info!("✅ Replied to user {} ({} chars)", user_id, reply.chars().count());
                reply
            }
            Err(e) => {
                error!("Assistant run failed for user {}: {}", user_id, e);
                APOLOGY.to_string()
            }
        }
    }
}
