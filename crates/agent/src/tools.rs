use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reune_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use reune_core::domain::conversation::UserId;
use reune_core::domain::event::{
    Event, EventId, EventStatus, InviteStatus, Item, ItemId, ItemPriority, Participant,
    ParticipantId,
};
use reune_core::planning::{profile_for, summarize_costs, CostSplitter, EqualCostSplitter};
use reune_db::repositories::{EventPlanRepository, RepositoryError};

use crate::guardrails::{CallOrigin, GuardrailDecision, GuardrailIntent, GuardrailPolicy};

/// Argument keys through which a caller could try to dictate prices for a generated list.
const PRICE_KEYS: &[&str] = &["valor_estimado", "valor_unitario", "preco", "precos"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    GenerateItemList,
    ConfirmItems,
    ComputeCostSplit,
    AddParticipants,
    GetPlan,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        Self::GenerateItemList,
        Self::ConfirmItems,
        Self::ComputeCostSplit,
        Self::AddParticipants,
        Self::GetPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateItemList => "generateItemList",
            Self::ConfirmItems => "confirmItems",
            Self::ComputeCostSplit => "computeCostSplit",
            Self::AddParticipants => "addParticipants",
            Self::GetPlan => "getPlan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == value.trim())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("itens_editados must be a non-empty list")]
    InvalidEditedItems,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("{message}")]
    Guardrail { reason_code: &'static str, message: String },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::InvalidEditedItems => "invalid_itens_editados",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence_error",
            Self::Guardrail { reason_code, .. } => reason_code,
        }
    }

    fn from_decision(decision: GuardrailDecision) -> Option<Self> {
        match decision {
            GuardrailDecision::Allow => None,
            GuardrailDecision::Deny { reason_code, user_message, .. }
            | GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                Some(Self::Guardrail { reason_code, message: user_message })
            }
        }
    }
}

impl From<RepositoryError> for ToolError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub code: String,
    pub message: String,
}

/// Uniform result shape returned for every dispatched call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ToolFailure { code: error.code().to_string(), message: error.to_string() }),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|failure| failure.code.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub tool: String,
    pub arguments: Value,
    pub requester: UserId,
    pub origin: CallOrigin,
    pub correlation_id: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Runs against an event whose ownership was already checked.
    async fn execute(&self, event: &Event, input: Value) -> Result<Value, ToolError>;
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
    plans: Arc<dyn EventPlanRepository>,
    policy: GuardrailPolicy,
    audit: Arc<dyn AuditSink>,
}

impl ToolRegistry {
    pub fn new(
        plans: Arc<dyn EventPlanRepository>,
        policy: GuardrailPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { tools: HashMap::new(), plans, policy, audit }
    }

    /// Registry with every planning tool installed and costs split equally.
    pub fn standard(
        plans: Arc<dyn EventPlanRepository>,
        policy: GuardrailPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::with_splitter(plans, policy, audit, Arc::new(EqualCostSplitter))
    }

    pub fn with_splitter(
        plans: Arc<dyn EventPlanRepository>,
        policy: GuardrailPolicy,
        audit: Arc<dyn AuditSink>,
        splitter: Arc<dyn CostSplitter>,
    ) -> Self {
        let mut registry = Self::new(plans.clone(), policy, audit);
        registry.register(GenerateItemListTool::new(plans.clone()));
        registry.register(ConfirmItemsTool::new(plans.clone()));
        registry.register(ComputeCostSplitTool::new(plans.clone(), splitter));
        registry.register(AddParticipantsTool::new(plans.clone()));
        registry.register(GetPlanTool::new(plans));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().as_str(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    pub async fn dispatch(&self, request: &ToolCallRequest) -> ToolResult {
        let outcome = self.try_dispatch(request).await;
        let audit = AuditContext::new(
            Some(request.requester.clone()),
            event_id_from_arguments(&request.arguments).ok(),
            request.correlation_id.clone(),
            request.origin.as_str(),
        );

        match outcome {
            Ok(data) => {
                info!(
                    event_name = "tool.dispatched",
                    correlation_id = %request.correlation_id,
                    user_id = %request.requester,
                    tool = %request.tool,
                    origin = request.origin.as_str(),
                    "tool call executed"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "tool.dispatched",
                        AuditCategory::Tool,
                        AuditOutcome::Success,
                    )
                    .with_metadata("tool", request.tool.clone()),
                );
                ToolResult::success(data)
            }
            Err(error) => {
                let (event_name, outcome) = match &error {
                    ToolError::Guardrail { .. } => ("tool.denied", AuditOutcome::Rejected),
                    _ => ("tool.failed", AuditOutcome::Failed),
                };
                warn!(
                    event_name,
                    correlation_id = %request.correlation_id,
                    user_id = %request.requester,
                    tool = %request.tool,
                    origin = request.origin.as_str(),
                    error_code = error.code(),
                    "tool call not executed"
                );
                self.audit.emit(
                    AuditEvent::from_context(&audit, event_name, AuditCategory::Tool, outcome)
                        .with_metadata("tool", request.tool.clone())
                        .with_metadata("error_code", error.code()),
                );
                ToolResult::failure(&error)
            }
        }
    }

    async fn try_dispatch(&self, request: &ToolCallRequest) -> Result<Value, ToolError> {
        let Some(tool) = self.tools.get(request.tool.trim()) else {
            return Err(self.refuse(GuardrailIntent::UnknownTool { tool: request.tool.clone() }));
        };
        let name = tool.name().as_str();

        let event_id = event_id_from_arguments(&request.arguments)
            .map_err(|detail| self.invalid_arguments(name, detail))?;

        if request.origin == CallOrigin::Model
            && tool.name() == ToolName::GenerateItemList
            && carries_price_keys(&request.arguments)
        {
            return Err(self.refuse(GuardrailIntent::PriceOverride { tool: name, event_id }));
        }

        let event = self
            .plans
            .find_event(&event_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("event {event_id}")))?;

        let decision = self.policy.evaluate(&GuardrailIntent::ToolCall {
            tool: name,
            event_id,
            owner: event.owner_id.clone(),
            requester: request.requester.clone(),
            origin: request.origin,
        });
        if let Some(refusal) = ToolError::from_decision(decision) {
            return Err(refusal);
        }

        tool.execute(&event, request.arguments.clone()).await.map_err(|error| match error {
            ToolError::InvalidParams(detail) => self.invalid_arguments(name, detail),
            other => other,
        })
    }

    /// Argument failures go through the policy; the detail stays in the message.
    fn invalid_arguments(&self, tool: &'static str, detail: String) -> ToolError {
        let intent = GuardrailIntent::InvalidArguments { tool, detail: detail.clone() };
        match self.policy.evaluate(&intent) {
            GuardrailDecision::Allow => ToolError::InvalidParams(detail),
            GuardrailDecision::Deny { reason_code, user_message, .. }
            | GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                ToolError::Guardrail { reason_code, message: format!("{user_message} ({detail})") }
            }
        }
    }

    fn refuse(&self, intent: GuardrailIntent) -> ToolError {
        let decision = self.policy.evaluate(&intent);
        ToolError::from_decision(decision).unwrap_or_else(|| ToolError::Guardrail {
            reason_code: "not_permitted",
            message: format!("{} is not permitted", intent.action_key()),
        })
    }
}

fn event_id_from_arguments(arguments: &Value) -> Result<EventId, String> {
    let Some(object) = arguments.as_object() else {
        return Err("arguments must be an object".to_string());
    };
    match object.get("evento_id") {
        Some(Value::String(raw)) => {
            EventId::parse(raw).ok_or_else(|| format!("evento_id `{raw}` is not numeric"))
        }
        Some(Value::Number(number)) => number
            .as_u64()
            .map(|id| EventId(id.to_string()))
            .ok_or_else(|| format!("evento_id `{number}` is not a non-negative integer")),
        Some(_) => Err("evento_id must be a string or an integer".to_string()),
        None => Err("evento_id is required".to_string()),
    }
}

fn carries_price_keys(arguments: &Value) -> bool {
    arguments
        .as_object()
        .is_some_and(|object| PRICE_KEYS.iter().any(|key| object.contains_key(*key)))
}

fn parse_arguments<T>(input: Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(input).map_err(|error| ToolError::InvalidParams(error.to_string()))
}

async fn plan_value(
    plans: &dyn EventPlanRepository,
    event_id: &EventId,
) -> Result<Value, ToolError> {
    let plan = plans
        .find_plan(event_id)
        .await?
        .ok_or_else(|| ToolError::NotFound(format!("event {event_id}")))?;
    let summary = summarize_costs(&plan.participants, &plan.distribution);

    let mut value = to_value(&plan)?;
    if let Value::Object(object) = &mut value {
        object.insert("resumo".to_string(), to_value(&summary)?);
    }
    Ok(value)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|error| ToolError::Persistence(error.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct GenerateItemListArgs {
    #[serde(default)]
    tipo_evento: Option<String>,
    #[serde(default)]
    qtd_pessoas: Option<u32>,
    #[serde(default)]
    preferencias: Option<Map<String, Value>>,
}

impl GenerateItemListArgs {
    /// Explicit arguments win; absent ones fall back to the stored event.
    fn resolve(&self, event: &Event) -> Result<(String, u32), ToolError> {
        let event_type = match &self.tipo_evento {
            Some(event_type) if event_type.trim().is_empty() => {
                return Err(ToolError::InvalidParams("tipo_evento must not be empty".to_string()));
            }
            Some(event_type) => event_type.trim().to_string(),
            None => event.event_type.clone(),
        };
        let people = match self.qtd_pessoas {
            Some(0) => {
                return Err(ToolError::InvalidParams("qtd_pessoas must be at least 1".to_string()));
            }
            Some(people) => people,
            None => event.people_count,
        };
        Ok((event_type, people))
    }
}

pub struct GenerateItemListTool {
    plans: Arc<dyn EventPlanRepository>,
}

impl GenerateItemListTool {
    pub fn new(plans: Arc<dyn EventPlanRepository>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Tool for GenerateItemListTool {
    fn name(&self) -> ToolName {
        ToolName::GenerateItemList
    }

    async fn execute(&self, event: &Event, input: Value) -> Result<Value, ToolError> {
        let args: GenerateItemListArgs = parse_arguments(input)?;
        let (event_type, people) = args.resolve(event)?;
        if let Some(preferences) = &args.preferencias {
            debug!(
                event_name = "tool.preferences_received",
                evento_id = %event.id,
                keys = preferences.len(),
                "quantities come from the reference profile"
            );
        }
        let items = profile_for(&event_type).estimate(&event.id, people);
        self.plans.replace_items(&event.id, items).await?;
        self.plans.set_status(&event.id, EventStatus::ItensPendentes).await?;
        plan_value(self.plans.as_ref(), &event.id).await
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmItemsArgs {
    #[serde(default)]
    itens_editados: Option<Vec<EditedItem>>,
}

#[derive(Debug, Deserialize)]
struct EditedItem {
    #[serde(default)]
    id: Option<String>,
    nome_item: String,
    quantidade: f64,
    #[serde(default = "default_unit")]
    unidade: String,
    #[serde(default)]
    valor_estimado: f64,
    #[serde(default = "default_category")]
    categoria: String,
    #[serde(default)]
    prioridade: ItemPriority,
}

fn default_unit() -> String {
    "un".to_string()
}

fn default_category() -> String {
    "geral".to_string()
}

impl EditedItem {
    fn into_item(self, event_id: &EventId) -> Result<Item, ToolError> {
        let name = self.nome_item.trim();
        if name.is_empty() {
            return Err(ToolError::InvalidParams("nome_item must not be empty".to_string()));
        }
        let amounts = [("quantidade", self.quantidade), ("valor_estimado", self.valor_estimado)];
        for (field, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(ToolError::InvalidParams(format!(
                    "{field} of `{name}` must be a non-negative number"
                )));
            }
        }

        Ok(Item {
            id: ItemId(self.id.unwrap_or_else(|| Uuid::new_v4().to_string())),
            event_id: event_id.clone(),
            name: name.to_string(),
            quantity: self.quantidade,
            unit: self.unidade,
            estimated_value: self.valor_estimado,
            category: self.categoria,
            priority: self.prioridade,
        })
    }
}

pub struct ConfirmItemsTool {
    plans: Arc<dyn EventPlanRepository>,
}

impl ConfirmItemsTool {
    pub fn new(plans: Arc<dyn EventPlanRepository>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Tool for ConfirmItemsTool {
    fn name(&self) -> ToolName {
        ToolName::ConfirmItems
    }

    async fn execute(&self, event: &Event, input: Value) -> Result<Value, ToolError> {
        let args: ConfirmItemsArgs = parse_arguments(input)?;
        let edited = args.itens_editados.unwrap_or_default();
        if edited.is_empty() {
            return Err(ToolError::InvalidEditedItems);
        }
        let items = edited
            .into_iter()
            .map(|item| item.into_item(&event.id))
            .collect::<Result<Vec<_>, _>>()?;

        self.plans.replace_items(&event.id, items).await?;
        self.plans.set_status(&event.id, EventStatus::ItensConfirmados).await?;
        plan_value(self.plans.as_ref(), &event.id).await
    }
}

pub struct ComputeCostSplitTool {
    plans: Arc<dyn EventPlanRepository>,
    splitter: Arc<dyn CostSplitter>,
}

impl ComputeCostSplitTool {
    pub fn new(plans: Arc<dyn EventPlanRepository>, splitter: Arc<dyn CostSplitter>) -> Self {
        Self { plans, splitter }
    }
}

#[async_trait]
impl Tool for ComputeCostSplitTool {
    fn name(&self) -> ToolName {
        ToolName::ComputeCostSplit
    }

    async fn execute(&self, event: &Event, _input: Value) -> Result<Value, ToolError> {
        let plan = self
            .plans
            .find_plan(&event.id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("event {}", event.id)))?;

        let rows = self.splitter.split(&plan.items, &plan.participants);
        let summary = summarize_costs(&plan.participants, &rows);
        self.plans.replace_distribution(&event.id, rows.clone()).await?;
        self.plans.set_status(&event.id, EventStatus::DistribuicaoPronta).await?;

        Ok(json!({
            "evento_id": event.id,
            "distribuicao": to_value(&rows)?,
            "resumo": to_value(&summary)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AddParticipantsArgs {
    #[serde(default)]
    participantes: Vec<NewParticipant>,
}

#[derive(Debug, Deserialize)]
struct NewParticipant {
    nome_participante: String,
    #[serde(default)]
    contato: Option<String>,
    #[serde(default)]
    status_convite: Option<InviteStatus>,
    #[serde(default)]
    preferencias: Option<Map<String, Value>>,
}

pub struct AddParticipantsTool {
    plans: Arc<dyn EventPlanRepository>,
}

impl AddParticipantsTool {
    pub fn new(plans: Arc<dyn EventPlanRepository>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Tool for AddParticipantsTool {
    fn name(&self) -> ToolName {
        ToolName::AddParticipants
    }

    async fn execute(&self, event: &Event, input: Value) -> Result<Value, ToolError> {
        let args: AddParticipantsArgs = parse_arguments(input)?;
        if args.participantes.is_empty() {
            return Ok(json!({ "evento_id": event.id, "participantes": [] }));
        }

        let mut participants = Vec::with_capacity(args.participantes.len());
        for new in args.participantes {
            let name = new.nome_participante.trim();
            if name.is_empty() {
                return Err(ToolError::InvalidParams(
                    "nome_participante must not be empty".to_string(),
                ));
            }
            participants.push(Participant {
                id: ParticipantId(Uuid::new_v4().to_string()),
                event_id: event.id.clone(),
                name: name.to_string(),
                contact: new.contato.filter(|contact| !contact.trim().is_empty()),
                invite_status: new.status_convite.unwrap_or_default(),
                preferences: new.preferencias,
                amount_due: None,
            });
        }

        let added = to_value(&participants)?;
        self.plans.add_participants(&event.id, participants).await?;
        Ok(json!({ "evento_id": event.id, "participantes": added }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GetPlanArgs {
    /// Marks the event `finalizado` before reading it back.
    #[serde(default)]
    finalizar: bool,
}

pub struct GetPlanTool {
    plans: Arc<dyn EventPlanRepository>,
}

impl GetPlanTool {
    pub fn new(plans: Arc<dyn EventPlanRepository>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Tool for GetPlanTool {
    fn name(&self) -> ToolName {
        ToolName::GetPlan
    }

    async fn execute(&self, event: &Event, input: Value) -> Result<Value, ToolError> {
        let args: GetPlanArgs = parse_arguments(input)?;
        if args.finalizar {
            self.plans.set_status(&event.id, EventStatus::Finalizado).await?;
        }
        plan_value(self.plans.as_ref(), &event.id).await
    }
}
