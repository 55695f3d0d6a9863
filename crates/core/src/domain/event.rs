use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::conversation::UserId;

/// Event identifiers are all-digit strings (`"42"`), matching the numeric keys
/// the planner envelope carries in `evento_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionRowId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Rascunho,
    ItensPendentes,
    ItensConfirmados,
    DistribuicaoPronta,
    Finalizado,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rascunho => "rascunho",
            Self::ItensPendentes => "itens_pendentes",
            Self::ItensConfirmados => "itens_confirmados",
            Self::DistribuicaoPronta => "distribuicao_pronta",
            Self::Finalizado => "finalizado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rascunho" => Some(Self::Rascunho),
            "itens_pendentes" => Some(Self::ItensPendentes),
            "itens_confirmados" => Some(Self::ItensConfirmados),
            "distribuicao_pronta" => Some(Self::DistribuicaoPronta),
            "finalizado" => Some(Self::Finalizado),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner_id: UserId,
    #[serde(rename = "nome_evento")]
    pub name: String,
    #[serde(rename = "tipo_evento")]
    pub event_type: String,
    #[serde(rename = "qtd_pessoas")]
    pub people_count: u32,
    #[serde(rename = "data_evento")]
    pub date: Option<NaiveDate>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }
}

/// Input for creating an event; the store assigns the numeric id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub owner_id: UserId,
    pub name: String,
    pub event_type: String,
    pub people_count: u32,
    pub date: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemPriority {
    A,
    #[default]
    B,
    C,
}

impl ItemPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "evento_id")]
    pub event_id: EventId,
    #[serde(rename = "nome_item")]
    pub name: String,
    #[serde(rename = "quantidade")]
    pub quantity: f64,
    #[serde(rename = "unidade")]
    pub unit: String,
    #[serde(rename = "valor_estimado")]
    pub estimated_value: f64,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "prioridade")]
    pub priority: ItemPriority,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    #[default]
    Pendente,
    Confirmado,
    Recusado,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::Confirmado => "confirmado",
            Self::Recusado => "recusado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pendente" => Some(Self::Pendente),
            "confirmado" => Some(Self::Confirmado),
            "recusado" => Some(Self::Recusado),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(rename = "evento_id")]
    pub event_id: EventId,
    #[serde(rename = "nome_participante")]
    pub name: String,
    #[serde(rename = "contato")]
    pub contact: Option<String>,
    #[serde(rename = "status_convite")]
    pub invite_status: InviteStatus,
    #[serde(rename = "preferencias")]
    pub preferences: Option<Map<String, Value>>,
    #[serde(rename = "valor_responsavel")]
    pub amount_due: Option<f64>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.invite_status != InviteStatus::Recusado
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub id: DistributionRowId,
    #[serde(rename = "evento_id")]
    pub event_id: EventId,
    pub item_id: ItemId,
    #[serde(rename = "participante_id")]
    pub participant_id: ParticipantId,
    #[serde(rename = "quantidade_atribuida")]
    pub assigned_quantity: f64,
    #[serde(rename = "valor_rateado")]
    pub cost_share: f64,
    #[serde(rename = "observacoes")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTotal {
    #[serde(rename = "participante_id")]
    pub participant_id: ParticipantId,
    #[serde(rename = "nome_participante")]
    pub name: String,
    #[serde(rename = "valor_total")]
    pub total: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    #[serde(rename = "valor_total")]
    pub total: f64,
    #[serde(rename = "por_participante")]
    pub per_participant: Vec<ParticipantTotal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPlan {
    #[serde(rename = "evento")]
    pub event: Event,
    #[serde(rename = "itens")]
    pub items: Vec<Item>,
    #[serde(rename = "participantes")]
    pub participants: Vec<Participant>,
    #[serde(rename = "distribuicao")]
    pub distribution: Vec<DistributionRow>,
}

impl EventPlan {
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|item| item.estimated_value).sum()
    }
}
