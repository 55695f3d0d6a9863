use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use reune_core::audit::{AuditSink, TracingAuditSink};
use reune_core::config::{AppConfig, ConversationConfig, GatewayConfig};
use reune_core::domain::conversation::{
    ConversationContext, ConversationState, Intent, MessageRole, UserId, SLOT_EVENT_DATE,
    SLOT_EVENT_TYPE, SLOT_PEOPLE_COUNT,
};
use reune_core::domain::event::{Event, EventId, EventPlan, NewEvent};
use reune_core::errors::ApplicationError;
use reune_core::flows::FlowAction;
use reune_db::repositories::{
    ConversationContextRepository, ConversationMessageRepository, EventPlanRepository,
};

use crate::context::ContextManager;
use crate::conversation::{parse_item_command, ItemCommand, MessageSignals};
use crate::edits::{apply_item_command, EditOutcome};
use crate::envelope::PlannerEnvelope;
use crate::gateway::{mask_pii, GatewayOutcome, GatewayRequest, ModelGateway};
use crate::guardrails::{CallOrigin, GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::tools::{ToolCallRequest, ToolName, ToolRegistry, ToolResult};

pub const SYSTEM_PROMPT: &str = "Você é o assistente de planejamento de eventos do Reune. \
Responda somente com um objeto JSON no formato \
{\"intent\": \"create_event|update_event|generate_items|confirm_event|small_talk|unknown\", \
\"payload\": {\"tipo_evento\": string, \"qtd_pessoas\": inteiro, \"data_evento\": \"AAAA-MM-DD\"}, \
\"confidence\": número entre 0 e 1}. \
Nunca invente preços: os valores estimados vêm da tabela de referência.";

const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub struct ToolExecution {
    pub tool: String,
    pub origin: CallOrigin,
    pub result: ToolResult,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub correlation_id: String,
    pub intent: Intent,
    pub state: ConversationState,
    pub missing_slots: Vec<String>,
    pub event_id: Option<EventId>,
    pub reply: String,
    pub tool_results: Vec<ToolExecution>,
    /// The model reply came from the idempotency cache.
    pub replayed: bool,
    /// The turn went through the model gateway instead of the rule-based fast path.
    pub used_model: bool,
}

pub struct AgentRuntimeBuilder {
    client: Option<Arc<dyn LlmClient>>,
    contexts: Option<Arc<dyn ConversationContextRepository>>,
    messages: Option<Arc<dyn ConversationMessageRepository>>,
    plans: Option<Arc<dyn EventPlanRepository>>,
    audit: Arc<dyn AuditSink>,
    gateway: GatewayConfig,
    conversation: ConversationConfig,
    guardrails: GuardrailPolicy,
    temperature: f32,
    upstream_timeout: Option<StdDuration>,
}

impl Default for AgentRuntimeBuilder {
    fn default() -> Self {
        Self {
            client: None,
            contexts: None,
            messages: None,
            plans: None,
            audit: Arc::new(TracingAuditSink),
            gateway: GatewayConfig::default(),
            conversation: ConversationConfig::default(),
            guardrails: GuardrailPolicy::default(),
            temperature: DEFAULT_TEMPERATURE,
            upstream_timeout: None,
        }
    }
}

impl AgentRuntimeBuilder {
    /// Gateway, history and model settings taken from the loaded config.
    pub fn config(mut self, config: &AppConfig) -> Self {
        self.gateway = config.gateway.clone();
        self.conversation = config.conversation.clone();
        self.temperature = config.llm.temperature;
        self.upstream_timeout = Some(StdDuration::from_secs(config.llm.timeout_secs));
        self
    }

    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn repositories(
        mut self,
        contexts: Arc<dyn ConversationContextRepository>,
        messages: Arc<dyn ConversationMessageRepository>,
        plans: Arc<dyn EventPlanRepository>,
    ) -> Self {
        self.contexts = Some(contexts);
        self.messages = Some(messages);
        self.plans = Some(plans);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn gateway_config(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn conversation_config(mut self, conversation: ConversationConfig) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn build(self) -> Result<AgentRuntime, ApplicationError> {
        let client = self
            .client
            .ok_or_else(|| ApplicationError::Configuration("model client is required".into()))?;
        let (Some(contexts), Some(messages), Some(plans)) =
            (self.contexts, self.messages, self.plans)
        else {
            return Err(ApplicationError::Configuration("repositories are required".into()));
        };

        let mut gateway = ModelGateway::from_config(client, &self.gateway);
        if let Some(timeout) = self.upstream_timeout {
            gateway = gateway.with_timeout(timeout);
        }

        Ok(AgentRuntime {
            gateway,
            context: ContextManager::new(contexts, messages, self.audit.clone(), self.conversation),
            tools: ToolRegistry::standard(plans.clone(), self.guardrails, self.audit),
            plans,
            temperature: self.temperature,
        })
    }
}

/// One conversational turn: classify, consult the model when needed, merge into the
/// context, run the resulting tools and record the exchange.
pub struct AgentRuntime {
    gateway: ModelGateway,
    context: ContextManager,
    tools: ToolRegistry,
    plans: Arc<dyn EventPlanRepository>,
    temperature: f32,
}

impl AgentRuntime {
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::default()
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn handle_turn(
        &self,
        user_id: &UserId,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ApplicationError> {
        self.handle_turn_at(user_id, utterance, Utc::now(), cancel).await
    }

    pub async fn handle_turn_at(
        &self,
        user_id: &UserId,
        utterance: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let signals = MessageSignals::read(utterance, now.year());
        let mut context = self.context.load_or_create(user_id, now).await?;
        let previous_state = context.state;

        if context.state == ConversationState::ItemsPendingConfirmation
            && !signals.corrects_slots()
        {
            if let (Some(event_id), Some(command)) =
                (context.event_id.clone(), parse_item_command(utterance))
            {
                let edit = ItemEdit { event_id, command, correlation_id };
                return self.edit_items(user_id, context, edit, utterance, now).await;
            }
        }

        let fast_path = matches!(signals.intent, Intent::ConfirmEvent | Intent::SmallTalk)
            || (signals.intent.affects_event() && signals.has_core_slots())
            || (signals.intent.affects_event() && signals.corrects_slots());

        let mut replayed = false;
        let mut model_tool_calls = Vec::new();
        let mut envelope = if fast_path {
            PlannerEnvelope::from_signals(&signals)
        } else {
            let request = self.model_request(&mut context, utterance, &correlation_id).await?;
            match self.gateway.complete_at(request, now, cancel).await {
                GatewayOutcome::Replayed(response) => {
                    replayed = true;
                    model_tool_calls = response.tool_calls;
                    envelope_or_rules(&response.content, &signals)
                }
                GatewayOutcome::Fresh(response) => {
                    model_tool_calls = response.tool_calls;
                    envelope_or_rules(&response.content, &signals)
                }
                GatewayOutcome::RateLimited(decision) => {
                    return Err(ApplicationError::RateLimited {
                        user_id: user_id.to_string(),
                        count: decision.count,
                        limit: decision.limit,
                    });
                }
                GatewayOutcome::Cancelled => return Err(ApplicationError::Cancelled),
                GatewayOutcome::Failed => PlannerEnvelope::from_signals(&signals),
            }
        };
        envelope.fill_missing(&signals.payload());

        let applied =
            self.context.apply_envelope(context, &envelope, &correlation_id, now).await?;
        let mut context = applied.context;
        let actions = applied.transition.map(|outcome| outcome.actions).unwrap_or_default();

        let mut tool_results = Vec::new();
        for action in actions {
            let Some(tool) = tool_for_action(action) else {
                continue;
            };
            if tool == ToolName::GenerateItemList {
                let Some((event_type, people_count)) = context.core_slots() else {
                    context = self.resume_collecting(context, &correlation_id, now).await?;
                    break;
                };
                context = self.ensure_event(context, event_type, people_count, now).await?;
            }
            let Some(event_id) = context.event_id.clone() else {
                warn!(
                    event_name = "conversation.action_skipped",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    tool = tool.as_str(),
                    "no event linked to the conversation"
                );
                break;
            };

            let arguments = self.flow_arguments(tool, &event_id, &context).await?;
            let execution = self
                .run_tool(user_id, tool.as_str(), arguments, CallOrigin::Flow, &correlation_id)
                .await;
            let failed = !execution.result.ok;
            tool_results.push(execution);
            if failed {
                if context.state != previous_state {
                    warn!(
                        event_name = "conversation.state_restored",
                        correlation_id = %correlation_id,
                        user_id = %user_id,
                        tool = tool.as_str(),
                        from = context.state.as_str(),
                        to = previous_state.as_str(),
                        "flow action failed, state not advanced"
                    );
                    context.state = previous_state;
                    context = self.context.save(context, now).await?;
                }
                break;
            }
        }

        for call in model_tool_calls {
            let arguments = with_event_id(call.arguments.clone(), context.event_id.as_ref());
            let execution = self
                .run_tool(user_id, &call.name, arguments, CallOrigin::Model, &correlation_id)
                .await;
            tool_results.push(execution);
        }

        let reply = compose_reply(&context, &tool_results);
        self.context
            .record_message(user_id, context.event_id.clone(), MessageRole::User, utterance, now)
            .await?;
        self.context
            .record_message(user_id, context.event_id.clone(), MessageRole::Assistant, &reply, now)
            .await?;

        info!(
            event_name = "conversation.turn_completed",
            correlation_id = %correlation_id,
            user_id = %user_id,
            intent = envelope.intent().as_str(),
            state = context.state.as_str(),
            used_model = !fast_path,
            replayed,
            tools = tool_results.len(),
            "turn handled"
        );

        Ok(TurnOutcome {
            correlation_id,
            intent: envelope.intent(),
            state: context.state,
            missing_slots: context.missing_slots.clone(),
            event_id: context.event_id.clone(),
            reply,
            tool_results,
            replayed,
            used_model: !fast_path,
        })
    }

    /// Applies an item command to the pending list without consulting the model.
    async fn edit_items(
        &self,
        user_id: &UserId,
        context: ConversationContext,
        edit: ItemEdit,
        utterance: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, ApplicationError> {
        let reply = match self.plans.find_plan(&edit.event_id).await.map_err(persistence)? {
            None => "Não encontrei o evento desta conversa.".to_string(),
            Some(plan) => {
                let decision = self.tools.policy().evaluate(&GuardrailIntent::ToolCall {
                    tool: ToolName::ConfirmItems.as_str(),
                    event_id: edit.event_id.clone(),
                    owner: plan.event.owner_id.clone(),
                    requester: user_id.clone(),
                    origin: CallOrigin::Flow,
                });
                match decision {
                    GuardrailDecision::Allow => self.apply_edit(&plan, &edit).await?,
                    GuardrailDecision::Deny { user_message, .. }
                    | GuardrailDecision::Degrade { user_message, .. } => user_message,
                }
            }
        };

        self.context
            .record_message(user_id, context.event_id.clone(), MessageRole::User, utterance, now)
            .await?;
        self.context
            .record_message(user_id, context.event_id.clone(), MessageRole::Assistant, &reply, now)
            .await?;

        info!(
            event_name = "conversation.turn_completed",
            correlation_id = %edit.correlation_id,
            user_id = %user_id,
            intent = Intent::UpdateEvent.as_str(),
            state = context.state.as_str(),
            used_model = false,
            replayed = false,
            tools = 0,
            "item edit handled"
        );

        Ok(TurnOutcome {
            correlation_id: edit.correlation_id,
            intent: Intent::UpdateEvent,
            state: context.state,
            missing_slots: context.missing_slots.clone(),
            event_id: context.event_id.clone(),
            reply,
            tool_results: Vec::new(),
            replayed: false,
            used_model: false,
        })
    }

    async fn apply_edit(
        &self,
        plan: &EventPlan,
        edit: &ItemEdit,
    ) -> Result<String, ApplicationError> {
        match apply_item_command(&plan.items, &edit.command, &plan.event) {
            Ok(EditOutcome::Applied { items, feedback }) => {
                let count = items.len();
                let total: f64 = items.iter().map(|item| item.estimated_value).sum();
                self.plans.replace_items(&edit.event_id, items).await.map_err(persistence)?;
                info!(
                    event_name = "conversation.items_edited",
                    correlation_id = %edit.correlation_id,
                    evento_id = %edit.event_id,
                    items = count,
                    "pending item list edited"
                );
                Ok(format!(
                    "{feedback} A lista agora tem {count} itens, total estimado de R$ {total:.2}. \
                     Posso confirmar?"
                ))
            }
            Ok(EditOutcome::NotFound { target }) => {
                Ok(format!("Não encontrei {target} na lista. Pode conferir o nome?"))
            }
            Err(error) => {
                warn!(
                    event_name = "conversation.item_edit_rejected",
                    correlation_id = %edit.correlation_id,
                    evento_id = %edit.event_id,
                    error = %error,
                    "item edit left the list unchanged"
                );
                Ok("Não consegui aplicar essa alteração. Pode repetir com outro valor?".into())
            }
        }
    }

    async fn model_request(
        &self,
        context: &mut ConversationContext,
        utterance: &str,
        correlation_id: &str,
    ) -> Result<GatewayRequest, ApplicationError> {
        let mut messages = self.context.history(context).await?;
        messages.push(ChatMessage::new(MessageRole::User, utterance));

        let system_prompt = format!(
            "{SYSTEM_PROMPT}\nEstado atual: {}. Dados coletados: {}. Faltando: {}.",
            context.state.as_str(),
            Value::Object(context.collected_data.clone()),
            if context.missing_slots.is_empty() {
                "nada".to_string()
            } else {
                context.missing_slots.join(", ")
            },
        );

        Ok(GatewayRequest {
            user_id: context.user_id.clone(),
            correlation_id: correlation_id.to_string(),
            chat: ChatRequest { system_prompt, messages, temperature: self.temperature },
            idempotency_payload: Some(json!({
                "user_id": context.user_id.as_str(),
                "state": context.state.as_str(),
                "text": utterance.trim(),
            })),
        })
    }

    /// Back to `collecting_core` when the item list was requested without usable core slots.
    async fn resume_collecting(
        &self,
        mut context: ConversationContext,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, ApplicationError> {
        context.state = ConversationState::CollectingCore;
        context.missing_slots = context.core_slots_missing();
        warn!(
            event_name = "conversation.core_slots_unusable",
            correlation_id,
            user_id = %context.user_id,
            missing = ?context.missing_slots,
            "item list requested without usable core slots, asking again"
        );
        self.context.save(context, now).await
    }

    /// Links an event matching the collected core slots, creating one when the linked event
    /// is missing or was planned with different details.
    async fn ensure_event(
        &self,
        context: ConversationContext,
        event_type: String,
        people_count: u32,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, ApplicationError> {
        if let Some(event_id) = &context.event_id {
            let linked = self.plans.find_event(event_id).await.map_err(persistence)?;
            if linked.is_some_and(|event| matches_details(&event, &event_type, people_count)) {
                return Ok(context);
            }
        }

        let date = context
            .slot_str(SLOT_EVENT_DATE)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
        let event = self
            .plans
            .create_event(NewEvent {
                owner_id: context.user_id.clone(),
                name: format!("{event_type} para {people_count} pessoas"),
                event_type,
                people_count,
                date,
            })
            .await
            .map_err(persistence)?;
        info!(
            event_name = "conversation.event_created",
            user_id = %context.user_id,
            evento_id = %event.id,
            "event created for the conversation"
        );
        self.context.link_event(context, event.id, now).await
    }

    async fn flow_arguments(
        &self,
        tool: ToolName,
        event_id: &EventId,
        context: &ConversationContext,
    ) -> Result<Value, ApplicationError> {
        let mut arguments = json!({ "evento_id": event_id });
        match tool {
            ToolName::GenerateItemList => {
                if let Some((event_type, people_count)) = context.core_slots() {
                    arguments["tipo_evento"] = json!(event_type);
                    arguments["qtd_pessoas"] = json!(people_count);
                }
            }
            ToolName::ConfirmItems => {
                let items = self
                    .plans
                    .find_plan(event_id)
                    .await
                    .map_err(persistence)?
                    .map(|plan| plan.items)
                    .unwrap_or_default();
                arguments["itens_editados"] = serde_json::to_value(items)
                    .map_err(|error| ApplicationError::Integration(error.to_string()))?;
            }
            ToolName::GetPlan => arguments["finalizar"] = json!(true),
            _ => {}
        }
        Ok(arguments)
    }

    async fn run_tool(
        &self,
        user_id: &UserId,
        tool: &str,
        arguments: Value,
        origin: CallOrigin,
        correlation_id: &str,
    ) -> ToolExecution {
        let request = ToolCallRequest {
            tool: tool.to_string(),
            arguments,
            requester: user_id.clone(),
            origin,
            correlation_id: correlation_id.to_string(),
        };
        let result = self.tools.dispatch(&request).await;
        ToolExecution { tool: request.tool, origin, result }
    }
}

struct ItemEdit {
    event_id: EventId,
    command: ItemCommand,
    correlation_id: String,
}

fn envelope_or_rules(content: &str, signals: &MessageSignals) -> PlannerEnvelope {
    PlannerEnvelope::from_model_output(content).unwrap_or_else(|| {
        warn!(
            event_name = "envelope.no_json",
            content = %mask_pii(content),
            "model reply carried no JSON object, using rule-based envelope"
        );
        PlannerEnvelope::from_signals(signals)
    })
}

fn tool_for_action(action: FlowAction) -> Option<ToolName> {
    match action {
        FlowAction::PromptForMissingSlots => None,
        FlowAction::GenerateItemList => Some(ToolName::GenerateItemList),
        FlowAction::ConfirmItems => Some(ToolName::ConfirmItems),
        FlowAction::ComputeCostSplit => Some(ToolName::ComputeCostSplit),
        FlowAction::GetPlan => Some(ToolName::GetPlan),
    }
}

fn matches_details(event: &Event, event_type: &str, people_count: u32) -> bool {
    event.event_type == event_type && event.people_count == people_count
}

/// Model tool calls may omit `evento_id`; the linked event fills it in.
fn with_event_id(arguments: Value, event_id: Option<&EventId>) -> Value {
    let mut object = match arguments {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => return other,
    };
    if let Some(event_id) = event_id {
        object.entry("evento_id").or_insert_with(|| json!(event_id));
    }
    Value::Object(object)
}

fn compose_reply(context: &ConversationContext, results: &[ToolExecution]) -> String {
    let failure = results.iter().rev().find_map(|execution| execution.result.error.as_ref());
    if let Some(failure) = failure {
        return format!("Não consegui concluir essa etapa: {}", failure.message);
    }

    match context.state {
        ConversationState::Idle => {
            "Olá! Posso ajudar a planejar um evento. Qual é o tipo e quantas pessoas vão?"
                .to_string()
        }
        ConversationState::CollectingCore => {
            let missing = context
                .missing_slots
                .iter()
                .map(|slot| match slot.as_str() {
                    SLOT_EVENT_TYPE => "o tipo do evento",
                    SLOT_PEOPLE_COUNT => "a quantidade de pessoas",
                    other => other,
                })
                .collect::<Vec<_>>();
            if missing.is_empty() {
                "Pode me contar mais sobre o evento?".to_string()
            } else {
                format!("Para seguir com o planejamento, preciso saber {}.", missing.join(" e "))
            }
        }
        ConversationState::ItemsPendingConfirmation => match latest_data(results, "itens") {
            Some(items) => format!(
                "Montei uma lista com {} itens, total estimado de R$ {:.2}. Posso confirmar?",
                items.as_array().map(Vec::len).unwrap_or(0),
                sum_field(items, "valor_estimado"),
            ),
            None => "A lista de itens está aguardando sua confirmação.".to_string(),
        },
        ConversationState::DistributionPendingConfirmation => {
            match latest_data(results, "resumo") {
                Some(summary) => format!(
                    "Itens confirmados. O custo total de R$ {:.2} foi dividido entre {} pessoas. \
                     Confirma a divisão?",
                    summary["valor_total"].as_f64().unwrap_or(0.0),
                    summary["por_participante"].as_array().map(Vec::len).unwrap_or(0),
                ),
                None => "A divisão de custos está aguardando sua confirmação.".to_string(),
            }
        }
        ConversationState::Finalized => "Plano finalizado! Bom evento.".to_string(),
    }
}

fn latest_data<'a>(results: &'a [ToolExecution], key: &str) -> Option<&'a Value> {
    results
        .iter()
        .rev()
        .filter_map(|execution| execution.result.data.as_ref())
        .find_map(|data| data.get(key))
}

fn sum_field(items: &Value, field: &str) -> f64 {
    items
        .as_array()
        .map(|items| items.iter().filter_map(|item| item[field].as_f64()).sum())
        .unwrap_or(0.0)
}

fn persistence(error: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
