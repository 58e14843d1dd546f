use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::warn;

use crate::assistant::context::WorkflowContext;
use crate::assistant::{MEMORY, ROUTE};
use crate::memory::{MemoryMessage, MemoryStore};
use crate::workflow::{END, Step, StepError, Transition};

/// Entry and exit of every formatted run.
///
/// First visit (no reply yet) recalls related exchanges and hands over to
/// routing. Second visit, after the formatter wrote the reply, stores the
/// exchange and finishes with the reply.
pub struct MemoryStep {
    store: Arc<dyn MemoryStore>,
    limit: usize,
}

impl MemoryStep {
    pub fn new(store: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    async fn recall(&self, ctx: &mut WorkflowContext) -> Result<Transition, StepError> {
        let memories = match self.store.search(ctx.request(), &ctx.user.user_id, self.limit).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!("Memory search failed for user {}: {}", ctx.user.user_id, e);
                Vec::new()
            }
        };
        ctx.prior_memories.fill(memories)?;
        Ok(Transition::Next(ROUTE))
    }

    async fn remember(&self, ctx: &WorkflowContext, reply: String) -> Result<Transition, StepError> {
        let messages = vec![MemoryMessage::user(ctx.request()), MemoryMessage::assistant(reply.clone())];
        let metadata = json!({
            "specialist": ctx.specialist.map(|s| s.label()),
            "routing_label": ctx.routing_label,
            "at": ctx.now.to_rfc3339(),
        });
        if let Err(e) = self.store.add(&ctx.user.user_id, messages, metadata).await {
            warn!("Memory store failed for user {}: {}", ctx.user.user_id, e);
        }
        Ok(Transition::Finish(reply))
    }
}

impl Step<WorkflowContext> for MemoryStep {
    fn name(&self) -> &'static str {
        MEMORY
    }

    fn successors(&self) -> &'static [&'static str] {
        &[ROUTE, END]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            match ctx.reply.get().cloned() {
                Some(reply) => self.remember(ctx, reply).await,
                None => self.recall(ctx).await,
            }
        })
    }
}
