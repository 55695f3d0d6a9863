use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use reune_core::domain::conversation::{ConversationContext, ConversationMessage, UserId};
use reune_core::domain::event::{
    DistributionRow, Event, EventId, EventPlan, EventStatus, Item, NewEvent, Participant,
};

pub mod context;
pub mod event_plan;
pub mod memory;
pub mod message;

pub use context::SqlConversationContextRepository;
pub use event_plan::SqlEventPlanRepository;
pub use memory::{
    InMemoryConversationContextRepository, InMemoryConversationMessageRepository,
    InMemoryEventPlanRepository,
};
pub use message::SqlConversationMessageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Per-user conversation state. At most one context exists per user.
#[async_trait]
pub trait ConversationContextRepository: Send + Sync {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationContext>, RepositoryError>;

    /// Inserts or replaces the row keyed by `context.user_id`.
    async fn upsert(&self, context: ConversationContext) -> Result<(), RepositoryError>;

    /// Returns whether a context existed.
    async fn delete_by_user(&self, user_id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ConversationMessageRepository: Send + Sync {
    async fn append(&self, message: ConversationMessage) -> Result<(), RepositoryError>;

    /// The newest `limit` messages for the user, oldest first.
    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, RepositoryError>;

    async fn clear_user(&self, user_id: &UserId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait EventPlanRepository: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<Event, RepositoryError>;

    async fn find_event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError>;

    async fn find_plan(&self, id: &EventId) -> Result<Option<EventPlan>, RepositoryError>;

    /// Replaces the item list. Distribution rows of the previous list are dropped with it.
    async fn replace_items(&self, id: &EventId, items: Vec<Item>) -> Result<(), RepositoryError>;

    async fn add_participants(
        &self,
        id: &EventId,
        participants: Vec<Participant>,
    ) -> Result<(), RepositoryError>;

    async fn replace_distribution(
        &self,
        id: &EventId,
        rows: Vec<DistributionRow>,
    ) -> Result<(), RepositoryError>;

    async fn set_status(&self, id: &EventId, status: EventStatus) -> Result<(), RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp `{value}`: {error}")))
}

pub(crate) fn event_key(id: &EventId) -> Result<i64, RepositoryError> {
    id.0.parse::<i64>()
        .map_err(|_| RepositoryError::Decode(format!("event id `{}` is not numeric", id.0)))
}
