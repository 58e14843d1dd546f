use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use crate::assistant::context::WorkflowContext;
use crate::assistant::{CALENDAR, FORMAT, prompts};
use crate::integrations::{CalendarEvent, CalendarProvider, EventDraft, ProviderError};
use crate::llm::{LanguageModel, Prompt, generate_structured};
use crate::workflow::{END, Step, StepError, Transition};

const UPCOMING_DAYS: i64 = 14;
const SEARCH_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CalendarAction {
    List,
    Search,
    Create,
    Update,
    Delete,
}

/// One action chosen by the model for a direct calendar request.
#[derive(Debug, Deserialize)]
struct CalendarPlan {
    action: CalendarAction,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Google Calendar access.
///
/// After recovery analysis it lists what is left of today and hands over to
/// the formatter. Entered straight from routing it plans and executes one
/// calendar action and finishes the run with the confirmation.
pub struct CalendarStep {
    llm: Arc<dyn LanguageModel>,
    provider: Arc<dyn CalendarProvider>,
}

impl CalendarStep {
    pub fn new(llm: Arc<dyn LanguageModel>, provider: Arc<dyn CalendarProvider>) -> Self {
        Self { llm, provider }
    }

    async fn rest_of_today(&self, ctx: &WorkflowContext) -> String {
        let end = end_of_local_day(ctx.now, ctx.user.timezone);
        match self.provider.events(&ctx.user.user_id, ctx.now, end, None).await {
            Ok(events) if events.is_empty() => "Your calendar is free for the rest of today.".to_string(),
            Ok(events) => render("Still on your calendar today:", &events),
            Err(e) => {
                warn!("Calendar unavailable for user {}: {}", ctx.user.user_id, e);
                unavailable_message(&e)
            }
        }
    }

    async fn handle_request(&self, ctx: &WorkflowContext) -> String {
        let user_id = ctx.user.user_id.as_str();
        let upcoming = match self
            .provider
            .events(user_id, ctx.now, ctx.now + Duration::days(UPCOMING_DAYS), None)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!("Calendar unavailable for user {}: {}", user_id, e);
                return unavailable_message(&e);
            }
        };

        let listing = if upcoming.is_empty() {
            "(none)".to_string()
        } else {
            upcoming.iter().map(|e| format!("- {}", e.line())).collect::<Vec<_>>().join("\n")
        };
        let local_now = ctx.now.with_timezone(&ctx.user.timezone);
        let user = format!(
            "Current local time: {} ({})\n\nUpcoming events:\n{}\n\nRequest: {}",
            local_now.format("%Y-%m-%dT%H:%M:%S %A"),
            ctx.user.timezone.name(),
            listing,
            ctx.request_with_memories()
        );
        let prompt = Prompt::new(prompts::CALENDAR_PLANNER, user).with_schema(prompts::calendar_schema());
        let plan = match generate_structured::<CalendarPlan>(self.llm.as_ref(), prompt).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Calendar planner failed for user {}, listing instead: {}", user_id, e);
                return upcoming_text(&upcoming);
            }
        };
        info!("📅 Calendar action {:?}", plan.action);

        match self.execute(ctx, &plan, &upcoming).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Calendar {:?} failed for user {}: {}", plan.action, user_id, e);
                match e {
                    ProviderError::NotConnected(_) => unavailable_message(&e),
                    _ => "I couldn't update your calendar right now. Please try again in a bit.".to_string(),
                }
            }
        }
    }

    async fn execute(
        &self,
        ctx: &WorkflowContext,
        plan: &CalendarPlan,
        upcoming: &[CalendarEvent],
    ) -> Result<String, ProviderError> {
        let user_id = ctx.user.user_id.as_str();
        let tz = ctx.user.timezone;

        match plan.action {
            CalendarAction::List => Ok(upcoming_text(upcoming)),
            CalendarAction::Search => {
                let query = plan.query.as_deref().unwrap_or(ctx.request());
                let found = self
                    .provider
                    .events(user_id, ctx.now, ctx.now + Duration::days(SEARCH_DAYS), Some(query))
                    .await?;
                Ok(if found.is_empty() {
                    format!("I couldn't find any upcoming events matching '{query}'.")
                } else {
                    render(&format!("Events matching '{query}':"), &found)
                })
            }
            CalendarAction::Create => {
                let start = plan.start.as_deref().and_then(|s| parse_local(s, tz));
                let (Some(summary), Some(start)) = (plan.summary.clone(), start) else {
                    return Ok("I need at least a title and a start time to schedule that.".to_string());
                };
                let end = plan
                    .end
                    .as_deref()
                    .and_then(|s| parse_local(s, tz))
                    .filter(|end| *end > start)
                    .unwrap_or(start + Duration::hours(1));
                let draft = EventDraft {
                    summary: Some(summary),
                    start: Some(start),
                    end: Some(end),
                    location: plan.location.clone(),
                    description: plan.description.clone(),
                };
                let event = self.provider.create(user_id, &draft).await?;
                Ok(format!("Scheduled “{}” for {}.", event.title(), event.start.label()))
            }
            CalendarAction::Update => {
                let Some(event_id) = known_id(plan, upcoming) else {
                    return Ok("I couldn't tell which event to change. Could you name it?".to_string());
                };
                let draft = EventDraft {
                    summary: plan.summary.clone(),
                    start: plan.start.as_deref().and_then(|s| parse_local(s, tz)),
                    end: plan.end.as_deref().and_then(|s| parse_local(s, tz)),
                    location: plan.location.clone(),
                    description: plan.description.clone(),
                };
                if draft == EventDraft::default() {
                    return Ok("What would you like to change about that event?".to_string());
                }
                let event = self.provider.update(user_id, event_id, &draft).await?;
                Ok(format!("Updated “{}”, now {}.", event.title(), event.start.label()))
            }
            CalendarAction::Delete => {
                let Some(event_id) = known_id(plan, upcoming) else {
                    return Ok("I couldn't tell which event to delete. Could you name it?".to_string());
                };
                let title = upcoming
                    .iter()
                    .find(|e| e.id == event_id)
                    .map(|e| e.title().to_string())
                    .unwrap_or_else(|| "the event".to_string());
                self.provider.delete(user_id, event_id).await?;
                Ok(format!("Deleted “{title}” from your calendar."))
            }
        }
    }
}

/// The planned event id, only if it is one of the listed events.
fn known_id<'a>(plan: &'a CalendarPlan, upcoming: &[CalendarEvent]) -> Option<&'a str> {
    plan.event_id
        .as_deref()
        .map(str::trim)
        .filter(|id| upcoming.iter().any(|e| e.id == *id))
}

fn render(heading: &str, events: &[CalendarEvent]) -> String {
    let lines: Vec<String> = events.iter().map(|e| format!("• {}", e.line())).collect();
    format!("{}\n{}", heading, lines.join("\n"))
}

fn upcoming_text(upcoming: &[CalendarEvent]) -> String {
    if upcoming.is_empty() {
        "Your calendar is clear for the next two weeks.".to_string()
    } else {
        render("Here's what's coming up:", upcoming)
    }
}

fn unavailable_message(err: &ProviderError) -> String {
    match err {
        ProviderError::NotConnected(_) => "Your Google Calendar isn't connected yet, so I can't see your schedule.".to_string(),
        _ => "I couldn't reach your calendar right now.".to_string(),
    }
}

/// Last second of the local day containing `now`.
fn end_of_local_day(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    now.with_timezone(&tz)
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .and_then(|naive| tz.from_local_datetime(&naive).latest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now + Duration::hours(12))
}

/// RFC 3339, or a local date-time without offset interpreted in `tz`.
fn parse_local(text: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
        .ok()?;
    tz.from_local_datetime(&naive).earliest().map(|dt| dt.fixed_offset())
}

impl Step<WorkflowContext> for CalendarStep {
    fn name(&self) -> &'static str {
        CALENDAR
    }

    fn successors(&self) -> &'static [&'static str] {
        &[FORMAT, END]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            if ctx.recovery.is_filled() {
                let today = self.rest_of_today(ctx).await;
                ctx.calendar.fill(today)?;
                return Ok(Transition::Next(FORMAT));
            }

            let text = self.handle_request(ctx).await;
            ctx.calendar.fill(text.clone())?;
            Ok(Transition::Finish(text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_interprets_naive_in_zone() {
        let tz: Tz = "Asia/Kolkata".parse().unwrap();
        let dt = parse_local("2026-10-20T07:00:00", tz).unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-10-20T07:00:00+05:30");

        let dt = parse_local("2026-10-20T07:00:00Z", tz).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);

        assert!(parse_local("next tuesday", tz).is_none());
    }

    #[test]
    fn test_end_of_local_day() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let now = DateTime::parse_from_rfc3339("2026-10-18T09:00:00Z").unwrap().with_timezone(&Utc);
        let end = end_of_local_day(now, tz);
        // BST, so 23:59:59 local is 22:59:59 UTC.
        assert_eq!(end.to_rfc3339(), "2026-10-18T22:59:59+00:00");
    }

    #[test]
    fn test_plan_parses_with_missing_fields() {
        let plan: CalendarPlan = serde_json::from_str(r#"{"action":"delete","event_id":"abc"}"#).unwrap();
        assert_eq!(plan.action, CalendarAction::Delete);
        assert!(plan.summary.is_none());
    }
}
