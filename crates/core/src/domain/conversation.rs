use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::event::EventId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const SLOT_EVENT_TYPE: &str = "tipo_evento";
pub const SLOT_PEOPLE_COUNT: &str = "qtd_pessoas";
pub const SLOT_EVENT_DATE: &str = "data_evento";
pub const SLOT_EVENT_ID: &str = "evento_id";

/// Slots every planning cycle must collect before an item list can be generated.
pub const CORE_SLOTS: [&str; 2] = [SLOT_EVENT_TYPE, SLOT_PEOPLE_COUNT];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateEvent,
    UpdateEvent,
    GenerateItems,
    ConfirmEvent,
    SmallTalk,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::CreateEvent,
        Intent::UpdateEvent,
        Intent::GenerateItems,
        Intent::ConfirmEvent,
        Intent::SmallTalk,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::GenerateItems => "generate_items",
            Self::ConfirmEvent => "confirm_event",
            Self::SmallTalk => "small_talk",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create_event" => Some(Self::CreateEvent),
            "update_event" => Some(Self::UpdateEvent),
            "generate_items" => Some(Self::GenerateItems),
            "confirm_event" => Some(Self::ConfirmEvent),
            "small_talk" => Some(Self::SmallTalk),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Intents whose payload carries event slots.
    pub fn affects_event(&self) -> bool {
        matches!(self, Self::CreateEvent | Self::UpdateEvent | Self::GenerateItems)
    }

    pub fn required_slots(&self) -> &'static [&'static str] {
        if self.affects_event() {
            &CORE_SLOTS
        } else {
            &[]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "collecting_core")]
    CollectingCore,
    #[serde(rename = "itens_pendentes_confirmacao")]
    ItemsPendingConfirmation,
    #[serde(rename = "distrib_pendente_confirmacao")]
    DistributionPendingConfirmation,
    #[serde(rename = "finalizado")]
    Finalized,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingCore => "collecting_core",
            Self::ItemsPendingConfirmation => "itens_pendentes_confirmacao",
            Self::DistributionPendingConfirmation => "distrib_pendente_confirmacao",
            Self::Finalized => "finalizado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "collecting_core" => Some(Self::CollectingCore),
            "itens_pendentes_confirmacao" => Some(Self::ItemsPendingConfirmation),
            "distrib_pendente_confirmacao" => Some(Self::DistributionPendingConfirmation),
            "finalizado" => Some(Self::Finalized),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: UserId,
    pub state: ConversationState,
    #[serde(rename = "evento_id")]
    pub event_id: Option<EventId>,
    pub collected_data: Map<String, Value>,
    pub missing_slots: Vec<String>,
    pub confidence_level: f64,
    pub last_intent: Option<Intent>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub const INITIAL_CONFIDENCE: f64 = 0.5;

    pub fn initial(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            state: ConversationState::Idle,
            event_id: None,
            collected_data: Map::new(),
            missing_slots: Vec::new(),
            confidence_level: Self::INITIAL_CONFIDENCE,
            last_intent: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Core slots count as present only when they hold a usable value.
    pub fn has_slot(&self, slot: &str) -> bool {
        match slot {
            SLOT_EVENT_TYPE => self.event_type().is_some(),
            SLOT_PEOPLE_COUNT => self.people_count().is_some(),
            _ => self.collected_data.get(slot).is_some_and(|value| !value.is_null()),
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.slot_str(SLOT_EVENT_TYPE).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn people_count(&self) -> Option<u32> {
        self.slot_u32(SLOT_PEOPLE_COUNT).filter(|count| *count >= 1)
    }

    /// Both core slots, when the cycle has collected usable values for them.
    pub fn core_slots(&self) -> Option<(String, u32)> {
        Some((self.event_type()?.to_string(), self.people_count()?))
    }

    pub fn slot_str(&self, slot: &str) -> Option<&str> {
        self.collected_data.get(slot).and_then(Value::as_str)
    }

    pub fn slot_u32(&self, slot: &str) -> Option<u32> {
        let value = self.collected_data.get(slot)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|n| n.fract() == 0.0 && *n >= 0.0).map(|n| n as u64))
            .or_else(|| value.as_str().and_then(|raw| raw.trim().parse::<u64>().ok()))
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Overwrites every slot carried by `payload`. Null values are treated as absent and
    /// never erase a stored slot. `evento_id` links the context instead of being stored as a slot.
    ///
    /// Core slots are coerced first; a value that does not coerce is dropped, so a stored
    /// value survives and a missing slot stays missing.
    pub fn merge_payload(&mut self, payload: &Map<String, Value>) {
        for (key, value) in payload {
            if value.is_null() {
                continue;
            }
            if key == SLOT_EVENT_ID {
                if let Some(event_id) = event_id_from_value(value) {
                    self.event_id = Some(event_id);
                }
                continue;
            }
            let value = match key.as_str() {
                SLOT_EVENT_TYPE => coerce_event_type(value),
                SLOT_PEOPLE_COUNT => coerce_people_count(value),
                _ => Some(value.clone()),
            };
            if let Some(value) = value {
                self.collected_data.insert(key.clone(), value);
            }
        }
    }

    /// Required slots for `intent` that are still absent, in declaration order.
    ///
    /// Intents that carry no event slots keep the cycle's core requirement while the
    /// conversation is still collecting it, so a greeting mid-collection does not
    /// forget what is outstanding.
    pub fn recompute_missing(&mut self, intent: Intent) {
        let required: &[&str] = if intent.affects_event() {
            intent.required_slots()
        } else if self.state == ConversationState::CollectingCore {
            &CORE_SLOTS
        } else {
            &[]
        };

        self.missing_slots = required
            .iter()
            .filter(|slot| !self.has_slot(slot))
            .map(|slot| (*slot).to_string())
            .collect();
    }

    pub fn core_slots_missing(&self) -> Vec<String> {
        CORE_SLOTS
            .iter()
            .filter(|slot| !self.has_slot(slot))
            .map(|slot| (*slot).to_string())
            .collect()
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence_level = clamp_confidence(confidence);
    }

    /// Starts a new planning cycle: collected slots and the event link are dropped.
    pub fn reset_cycle(&mut self) {
        self.collected_data.clear();
        self.missing_slots.clear();
        self.event_id = None;
        self.summary = None;
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn coerce_event_type(value: &Value) -> Option<Value> {
    let event_type = value.as_str()?.trim();
    (!event_type.is_empty()).then(|| Value::String(event_type.to_string()))
}

/// Positive integer, given as a number or a numeric string.
fn coerce_people_count(value: &Value) -> Option<Value> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() || number.fract() != 0.0 || number < 1.0 {
        return None;
    }
    u32::try_from(number as u64).ok().map(Value::from)
}

fn event_id_from_value(value: &Value) -> Option<EventId> {
    match value {
        Value::String(raw) => EventId::parse(raw),
        Value::Number(number) => number.as_u64().map(|id| EventId(id.to_string())),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// A stored conversation turn fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "evento_id")]
    pub event_id: Option<EventId>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map, Value};

    use super::{
        clamp_confidence, ConversationContext, ConversationState, Intent, UserId, SLOT_EVENT_TYPE,
        SLOT_PEOPLE_COUNT,
    };
    use crate::domain::event::EventId;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn initial_context_is_idle_with_half_confidence() {
        let context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        assert_eq!(context.state, ConversationState::Idle);
        assert!(context.collected_data.is_empty());
        assert!(context.missing_slots.is_empty());
        assert_eq!(context.confidence_level, 0.5);
    }

    #[test]
    fn explicit_values_overwrite_stored_slots() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.merge_payload(&payload(json!({"qtd_pessoas": 10})));
        context.merge_payload(&payload(json!({"qtd_pessoas": 15})));

        assert_eq!(context.collected_data.get(SLOT_PEOPLE_COUNT), Some(&json!(15)));
        assert_eq!(context.slot_u32(SLOT_PEOPLE_COUNT), Some(15));
    }

    #[test]
    fn null_values_do_not_erase_slots_and_event_id_links_context() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.merge_payload(&payload(json!({"tipo_evento": "churrasco"})));
        context.merge_payload(&payload(json!({"tipo_evento": null, "evento_id": "77"})));

        assert_eq!(context.slot_str(SLOT_EVENT_TYPE), Some("churrasco"));
        assert_eq!(context.event_id, Some(EventId("77".to_string())));
        assert!(!context.collected_data.contains_key("evento_id"));
    }

    #[test]
    fn unusable_core_values_never_reach_collected_data() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.merge_payload(&payload(json!({"tipo_evento": "  ", "qtd_pessoas": "muitas"})));
        assert!(!context.has_slot(SLOT_EVENT_TYPE));
        assert!(!context.has_slot(SLOT_PEOPLE_COUNT));
        assert_eq!(context.core_slots_missing().len(), 2);

        context.merge_payload(&payload(json!({"tipo_evento": " pizza ", "qtd_pessoas": "8"})));
        for bad in [json!("muitas"), json!(0), json!(-2), json!(2.5), json!(true)] {
            context.merge_payload(&payload(json!({ "qtd_pessoas": bad, "tipo_evento": 7 })));
        }

        assert_eq!(context.collected_data.get(SLOT_PEOPLE_COUNT), Some(&json!(8)));
        assert_eq!(context.core_slots(), Some(("pizza".to_string(), 8)));
    }

    #[test]
    fn stored_garbage_counts_as_missing() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.collected_data.insert(SLOT_EVENT_TYPE.to_string(), json!("churrasco"));
        context.collected_data.insert(SLOT_PEOPLE_COUNT.to_string(), json!("muitas"));

        context.recompute_missing(Intent::GenerateItems);
        assert_eq!(context.missing_slots, vec![SLOT_PEOPLE_COUNT.to_string()]);
        assert_eq!(context.core_slots(), None);
    }

    #[test]
    fn missing_slots_never_list_present_slots() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.merge_payload(&payload(json!({"tipo_evento": "churrasco"})));
        context.recompute_missing(Intent::CreateEvent);
        assert_eq!(context.missing_slots, vec![SLOT_PEOPLE_COUNT.to_string()]);

        context.merge_payload(&payload(json!({"qtd_pessoas": "12"})));
        context.recompute_missing(Intent::UpdateEvent);
        assert!(context.missing_slots.is_empty());
        assert_eq!(context.slot_u32(SLOT_PEOPLE_COUNT), Some(12));
    }

    #[test]
    fn small_talk_keeps_outstanding_core_slots_while_collecting() {
        let mut context = ConversationContext::initial(UserId("u-1".to_string()), Utc::now());
        context.state = ConversationState::CollectingCore;
        context.recompute_missing(Intent::SmallTalk);
        assert_eq!(context.missing_slots.len(), 2);

        context.state = ConversationState::Idle;
        context.recompute_missing(Intent::SmallTalk);
        assert!(context.missing_slots.is_empty());
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }

    #[test]
    fn state_and_intent_encodings_are_stable() {
        for intent in Intent::ALL {
            assert_eq!(Intent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(
            ConversationState::parse("distrib_pendente_confirmacao"),
            Some(ConversationState::DistributionPendingConfirmation)
        );
        assert_eq!(ConversationState::parse("done"), None);
    }
}
