//! Validation of structured planner output.
//!
//! The model is asked to answer with `{intent, payload, confidence}`. Tagged schemas are
//! tried in a fixed order; the first one whose discriminant and fields check out wins.
//! When none does, the untagged base envelope takes the raw value as-is. Validation
//! never fails a turn.

use serde_json::{json, Map, Number, Value};
use thiserror::Error;

use reune_core::domain::conversation::{clamp_confidence, Intent};
use reune_core::domain::event::EventId;

use crate::conversation::MessageSignals;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("field `{field}`: {reason}")]
pub struct SchemaMismatch {
    pub field: &'static str,
    pub reason: &'static str,
}

impl SchemaMismatch {
    fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

/// Slots an event-affecting envelope may carry. Unknown keys survive in `extra`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventPayload {
    pub tipo_evento: Option<String>,
    pub categoria_evento: Option<String>,
    pub subtipo_evento: Option<String>,
    pub qtd_pessoas: Option<u32>,
    pub data_evento: Option<String>,
    pub menu: Option<String>,
    pub finalidade_evento: Option<String>,
    pub evento_id: Option<EventId>,
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope {
    pub payload: EventPayload,
    pub confidence: f64,
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FreeEnvelope {
    pub payload: Map<String, Value>,
    pub confidence: f64,
    pub extra: Map<String, Value>,
}

/// Terminal fallback: any intent string, payload passed through unfiltered.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseEnvelope {
    pub intent: String,
    pub payload: Map<String, Value>,
    pub confidence: f64,
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlannerEnvelope {
    CreateEvent(EventEnvelope),
    GenerateItems(EventEnvelope),
    UpdateEvent(EventEnvelope),
    ConfirmEvent(EventEnvelope),
    SmallTalk(FreeEnvelope),
    Unknown(FreeEnvelope),
    Base(BaseEnvelope),
}

type Schema = fn(&Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch>;

const TAGGED_SCHEMAS: [(Intent, Schema); 6] = [
    (Intent::CreateEvent, create_event_schema),
    (Intent::GenerateItems, generate_items_schema),
    (Intent::UpdateEvent, update_event_schema),
    (Intent::ConfirmEvent, confirm_event_schema),
    (Intent::SmallTalk, small_talk_schema),
    (Intent::Unknown, unknown_schema),
];

impl PlannerEnvelope {
    pub fn validate(raw: &Value) -> Self {
        let Some(object) = raw.as_object() else {
            return Self::Base(base_envelope(&Map::new()));
        };

        let tag = object.get("intent").and_then(Value::as_str);
        for (intent, schema) in TAGGED_SCHEMAS {
            if tag != Some(intent.as_str()) {
                continue;
            }
            match schema(object) {
                Ok(envelope) => return envelope,
                Err(mismatch) => {
                    tracing::debug!(
                        event_name = "envelope.schema_rejected",
                        intent = intent.as_str(),
                        %mismatch,
                        "tagged schema rejected planner output"
                    );
                }
            }
        }

        Self::Base(base_envelope(object))
    }

    /// Extracts the first JSON object from free-form model text and validates it.
    /// Returns `None` when the text carries no JSON object at all.
    pub fn from_model_output(content: &str) -> Option<Self> {
        extract_json_object(content).map(|raw| Self::validate(&raw))
    }

    /// Envelope derived from rule-based signals, for turns that skip or lose the model call.
    pub fn from_signals(signals: &MessageSignals) -> Self {
        Self::validate(&json!({
            "intent": signals.intent.as_str(),
            "payload": Value::Object(signals.payload()),
            "confidence": signals.rule_confidence(),
        }))
    }

    /// Authoritative intent. Unrecognized base intents read as `unknown`.
    pub fn intent(&self) -> Intent {
        match self {
            Self::CreateEvent(_) => Intent::CreateEvent,
            Self::GenerateItems(_) => Intent::GenerateItems,
            Self::UpdateEvent(_) => Intent::UpdateEvent,
            Self::ConfirmEvent(_) => Intent::ConfirmEvent,
            Self::SmallTalk(_) => Intent::SmallTalk,
            Self::Unknown(_) => Intent::Unknown,
            Self::Base(base) => Intent::parse(&base.intent).unwrap_or(Intent::Unknown),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::CreateEvent(envelope)
            | Self::GenerateItems(envelope)
            | Self::UpdateEvent(envelope)
            | Self::ConfirmEvent(envelope) => envelope.confidence,
            Self::SmallTalk(envelope) | Self::Unknown(envelope) => envelope.confidence,
            Self::Base(envelope) => envelope.confidence,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Base(_))
    }

    /// Payload as a slot map, with coerced values for typed event fields.
    pub fn payload(&self) -> Map<String, Value> {
        match self {
            Self::CreateEvent(envelope)
            | Self::GenerateItems(envelope)
            | Self::UpdateEvent(envelope)
            | Self::ConfirmEvent(envelope) => envelope.payload.to_map(),
            Self::SmallTalk(envelope) | Self::Unknown(envelope) => envelope.payload.clone(),
            Self::Base(envelope) => envelope.payload.clone(),
        }
    }

    /// Adds slots the envelope did not carry. Values already present are kept.
    pub fn fill_missing(&mut self, slots: &Map<String, Value>) {
        match self {
            Self::CreateEvent(envelope)
            | Self::GenerateItems(envelope)
            | Self::UpdateEvent(envelope)
            | Self::ConfirmEvent(envelope) => envelope.payload.fill_missing(slots),
            Self::SmallTalk(envelope) | Self::Unknown(envelope) => {
                fill_map(&mut envelope.payload, slots)
            }
            Self::Base(envelope) => fill_map(&mut envelope.payload, slots),
        }
    }

    /// Wire shape `{intent, payload, confidence}` plus any passthrough keys.
    pub fn to_value(&self) -> Value {
        let extra = match self {
            Self::CreateEvent(envelope)
            | Self::GenerateItems(envelope)
            | Self::UpdateEvent(envelope)
            | Self::ConfirmEvent(envelope) => &envelope.extra,
            Self::SmallTalk(envelope) | Self::Unknown(envelope) => &envelope.extra,
            Self::Base(envelope) => &envelope.extra,
        };
        let intent = match self {
            Self::Base(envelope) => envelope.intent.clone(),
            other => other.intent().as_str().to_string(),
        };

        let mut object = extra.clone();
        object.insert("intent".to_string(), Value::String(intent));
        object.insert("payload".to_string(), Value::Object(self.payload()));
        object.insert("confidence".to_string(), json!(self.confidence()));
        Value::Object(object)
    }
}

impl EventPayload {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        let strings = [
            ("tipo_evento", &self.tipo_evento),
            ("categoria_evento", &self.categoria_evento),
            ("subtipo_evento", &self.subtipo_evento),
            ("data_evento", &self.data_evento),
            ("menu", &self.menu),
            ("finalidade_evento", &self.finalidade_evento),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(people) = self.qtd_pessoas {
            map.insert("qtd_pessoas".to_string(), Value::Number(Number::from(people)));
        }
        if let Some(event_id) = &self.evento_id {
            map.insert("evento_id".to_string(), Value::String(event_id.0.clone()));
        }
        map
    }

    fn fill_missing(&mut self, slots: &Map<String, Value>) {
        let mut merged = slots.clone();
        merged.extend(self.to_map());
        if let Ok(filled) = event_payload(Some(&Value::Object(merged))) {
            *self = filled;
        }
    }
}

fn fill_map(target: &mut Map<String, Value>, slots: &Map<String, Value>) {
    for (key, value) in slots {
        if target.get(key).map_or(true, Value::is_null) {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn create_event_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    event_envelope(raw).map(PlannerEnvelope::CreateEvent)
}

fn generate_items_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    event_envelope(raw).map(PlannerEnvelope::GenerateItems)
}

fn update_event_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    event_envelope(raw).map(PlannerEnvelope::UpdateEvent)
}

fn confirm_event_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    event_envelope(raw).map(PlannerEnvelope::ConfirmEvent)
}

fn small_talk_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    free_envelope(raw).map(PlannerEnvelope::SmallTalk)
}

fn unknown_schema(raw: &Map<String, Value>) -> Result<PlannerEnvelope, SchemaMismatch> {
    free_envelope(raw).map(PlannerEnvelope::Unknown)
}

fn event_envelope(raw: &Map<String, Value>) -> Result<EventEnvelope, SchemaMismatch> {
    Ok(EventEnvelope {
        payload: event_payload(raw.get("payload"))?,
        confidence: strict_confidence(raw.get("confidence"))?,
        extra: passthrough(raw),
    })
}

fn free_envelope(raw: &Map<String, Value>) -> Result<FreeEnvelope, SchemaMismatch> {
    let payload = match raw.get("payload") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(payload)) => payload.clone(),
        Some(_) => return Err(SchemaMismatch::new("payload", "expected an object")),
    };
    Ok(FreeEnvelope {
        payload,
        confidence: strict_confidence(raw.get("confidence"))?,
        extra: passthrough(raw),
    })
}

fn base_envelope(raw: &Map<String, Value>) -> BaseEnvelope {
    BaseEnvelope {
        intent: raw
            .get("intent")
            .and_then(Value::as_str)
            .unwrap_or(Intent::Unknown.as_str())
            .to_string(),
        payload: raw.get("payload").and_then(Value::as_object).cloned().unwrap_or_default(),
        confidence: strict_confidence(raw.get("confidence")).unwrap_or(0.0),
        extra: passthrough(raw),
    }
}

fn passthrough(raw: &Map<String, Value>) -> Map<String, Value> {
    raw.iter()
        .filter(|(key, _)| !matches!(key.as_str(), "intent" | "payload" | "confidence"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn event_payload(raw: Option<&Value>) -> Result<EventPayload, SchemaMismatch> {
    let object = match raw {
        None | Some(Value::Null) => return Ok(EventPayload::default()),
        Some(Value::Object(object)) => object,
        Some(_) => return Err(SchemaMismatch::new("payload", "expected an object")),
    };

    let mut payload = EventPayload::default();
    for (key, value) in object {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "tipo_evento" => {
                let event_type = optional_string("tipo_evento", value)?;
                if event_type.is_empty() {
                    return Err(SchemaMismatch::new("tipo_evento", "must not be empty"));
                }
                payload.tipo_evento = Some(event_type);
            }
            "categoria_evento" => {
                payload.categoria_evento = Some(optional_string("categoria_evento", value)?)
            }
            "subtipo_evento" => {
                payload.subtipo_evento = Some(optional_string("subtipo_evento", value)?)
            }
            "data_evento" => payload.data_evento = Some(optional_string("data_evento", value)?),
            "menu" => payload.menu = Some(optional_string("menu", value)?),
            "finalidade_evento" => {
                payload.finalidade_evento = Some(optional_string("finalidade_evento", value)?)
            }
            "qtd_pessoas" => payload.qtd_pessoas = Some(positive_count(value)?),
            "evento_id" => payload.evento_id = Some(numeric_event_id(value)?),
            _ => {
                payload.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(payload)
}

fn optional_string(field: &'static str, value: &Value) -> Result<String, SchemaMismatch> {
    value.as_str().map(str::to_string).ok_or(SchemaMismatch::new(field, "expected a string"))
}

fn positive_count(value: &Value) -> Result<u32, SchemaMismatch> {
    let number = coerce_number(value)
        .ok_or(SchemaMismatch::new("qtd_pessoas", "expected a number"))?;
    if number.fract() != 0.0 || number < 1.0 || number > f64::from(u32::MAX) {
        return Err(SchemaMismatch::new("qtd_pessoas", "expected a positive integer"));
    }
    Ok(number as u32)
}

fn numeric_event_id(value: &Value) -> Result<EventId, SchemaMismatch> {
    let parsed = match value {
        Value::String(raw) => EventId::parse(raw),
        Value::Number(number) => number.as_u64().map(|id| EventId(id.to_string())),
        _ => None,
    };
    parsed.ok_or(SchemaMismatch::new("evento_id", "must be numeric"))
}

/// Missing confidence is 0. Coercible values are clamped into [0,1]; anything else
/// rejects the schema.
fn strict_confidence(value: Option<&Value>) -> Result<f64, SchemaMismatch> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(value) => coerce_number(value)
            .filter(|number| number.is_finite())
            .map(clamp_confidence)
            .ok_or(SchemaMismatch::new("confidence", "expected a number")),
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn extract_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
