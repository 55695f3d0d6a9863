//! Per-user conversation context: loading, envelope merges driven by the flow engine,
//! message history and explicit clears.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use reune_core::audit::{AuditContext, AuditSink};
use reune_core::config::ConversationConfig;
use reune_core::domain::conversation::{
    ConversationContext, ConversationMessage, MessageRole, UserId,
};
use reune_core::domain::event::EventId;
use reune_core::errors::{ApplicationError, DomainError};
use reune_core::flows::{
    starts_new_cycle, EventPlanningFlow, FlowContext, FlowEngine, FlowEvent, TransitionOutcome,
};
use reune_db::repositories::{
    ConversationContextRepository, ConversationMessageRepository, RepositoryError,
};

use crate::envelope::PlannerEnvelope;
use crate::llm::ChatMessage;

const SUMMARY_SNIPPET_CHARS: usize = 80;

#[derive(Clone, Debug, PartialEq)]
pub struct AppliedEnvelope {
    pub context: ConversationContext,
    /// The flow engine's rejection, if any; the state is then unchanged.
    pub transition: Result<TransitionOutcome, DomainError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearOutcome {
    pub context_removed: bool,
    pub messages_removed: u64,
}

pub struct ContextManager {
    contexts: Arc<dyn ConversationContextRepository>,
    messages: Arc<dyn ConversationMessageRepository>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<EventPlanningFlow>,
    config: ConversationConfig,
}

impl ContextManager {
    pub fn new(
        contexts: Arc<dyn ConversationContextRepository>,
        messages: Arc<dyn ConversationMessageRepository>,
        audit: Arc<dyn AuditSink>,
        config: ConversationConfig,
    ) -> Self {
        Self { contexts, messages, audit, engine: FlowEngine::default(), config }
    }

    pub async fn load_or_create(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, ApplicationError> {
        if let Some(existing) = self.contexts.find_by_user(user_id).await.map_err(persistence)? {
            return Ok(existing);
        }

        let context = ConversationContext::initial(user_id.clone(), now);
        self.contexts.upsert(context.clone()).await.map_err(persistence)?;
        debug!(
            event_name = "conversation.context_created",
            user_id = %user_id,
            "created conversation context"
        );
        Ok(context)
    }

    pub async fn save(
        &self,
        mut context: ConversationContext,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, ApplicationError> {
        context.updated_at = now;
        self.contexts.upsert(context.clone()).await.map_err(persistence)?;
        Ok(context)
    }

    /// Merges the envelope into the context, advances the state machine and persists.
    ///
    /// A rejected transition leaves `state` untouched but still records the merged slots,
    /// the intent and the confidence.
    pub async fn apply_envelope(
        &self,
        mut context: ConversationContext,
        envelope: &PlannerEnvelope,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AppliedEnvelope, ApplicationError> {
        let intent = envelope.intent();
        if starts_new_cycle(&context.state, intent) {
            context.reset_cycle();
        }

        context.merge_payload(&envelope.payload());
        context.recompute_missing(intent);

        let flow_context = FlowContext { missing_required_slots: context.core_slots_missing() };
        let audit = AuditContext::new(
            Some(context.user_id.clone()),
            context.event_id.clone(),
            correlation_id,
            "conversation",
        );
        let transition = match self.engine.apply_with_audit(
            &context.state,
            &FlowEvent::from_intent(intent),
            &flow_context,
            self.audit.as_ref(),
            &audit,
        ) {
            Ok(outcome) => {
                context.state = outcome.to;
                Ok(outcome)
            }
            Err(error) => {
                let error = DomainError::from(error);
                warn!(
                    event_name = "conversation.transition_rejected",
                    correlation_id,
                    user_id = %context.user_id,
                    intent = intent.as_str(),
                    state = context.state.as_str(),
                    error = %error,
                    "state machine rejected the turn"
                );
                Err(error)
            }
        };

        context.last_intent = Some(intent);
        context.set_confidence(envelope.confidence());

        let context = self.save(context, now).await?;
        Ok(AppliedEnvelope { context, transition })
    }

    pub async fn link_event(
        &self,
        mut context: ConversationContext,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, ApplicationError> {
        context.event_id = Some(event_id);
        self.save(context, now).await
    }

    /// Unlinks the event but keeps the rest of the context. Returns whether a context existed.
    pub async fn clear_event_id(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let Some(mut context) =
            self.contexts.find_by_user(user_id).await.map_err(persistence)?
        else {
            return Ok(false);
        };
        context.event_id = None;
        self.save(context, now).await?;
        Ok(true)
    }

    /// Deletes the context and every stored message of the user.
    pub async fn clear(&self, user_id: &UserId) -> Result<ClearOutcome, ApplicationError> {
        let context_removed = self.contexts.delete_by_user(user_id).await.map_err(persistence)?;
        let messages_removed = self.messages.clear_user(user_id).await.map_err(persistence)?;
        debug!(
            event_name = "conversation.cleared",
            user_id = %user_id,
            context_removed,
            messages_removed,
            "conversation history cleared"
        );
        Ok(ClearOutcome { context_removed, messages_removed })
    }

    pub async fn record_message(
        &self,
        user_id: &UserId,
        event_id: Option<EventId>,
        role: MessageRole,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let message = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            event_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        self.messages.append(message).await.map_err(persistence)
    }

    /// Stored history shaped for a model call: older messages folded into one system
    /// message, the most recent ones verbatim.
    ///
    /// The folded summary is kept on `context.summary` and persists with the next save.
    pub async fn history(
        &self,
        context: &mut ConversationContext,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        let stored = self
            .messages
            .list_recent(&context.user_id, self.config.history_limit)
            .await
            .map_err(persistence)?;
        let folded = fold_history(
            &stored,
            self.config.recent_messages as usize,
            context.summary.as_deref(),
        );
        context.summary = folded.summary;
        Ok(folded.messages)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FoldedHistory {
    pub summary: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Older messages are summarized; without any, the previous summary is carried over.
pub fn fold_history(
    messages: &[ConversationMessage],
    recent: usize,
    previous_summary: Option<&str>,
) -> FoldedHistory {
    let split = messages.len().saturating_sub(recent);
    let (older, latest) = messages.split_at(split);

    let summary = summarize_messages(older).or_else(|| previous_summary.map(str::to_string));
    let mut folded = Vec::with_capacity(latest.len() + 1);
    if let Some(summary) = &summary {
        folded.push(ChatMessage::new(MessageRole::System, summary));
    }
    folded.extend(latest.iter().map(|message| ChatMessage::new(message.role, &message.content)));
    FoldedHistory { summary, messages: folded }
}

/// One line per message, each cut to a short snippet.
pub fn summarize_messages(messages: &[ConversationMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let lines = messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "usuário",
                MessageRole::Assistant => "assistente",
                MessageRole::System => "sistema",
                MessageRole::Tool => "ferramenta",
            };
            format!("- {speaker}: {}", snippet(&message.content))
        })
        .collect::<Vec<_>>();
    Some(format!("Resumo da conversa anterior:\n{}", lines.join("\n")))
}

fn snippet(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SUMMARY_SNIPPET_CHARS {
        return flat;
    }
    let cut = flat.chars().take(SUMMARY_SNIPPET_CHARS).collect::<String>();
    format!("{}…", cut.trim_end())
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
