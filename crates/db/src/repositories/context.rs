use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;

use reune_core::domain::conversation::{ConversationContext, ConversationState, Intent, UserId};
use reune_core::domain::event::EventId;

use super::{
    column, decode_timestamp, encode_timestamp, ConversationContextRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationContextRepository {
    pool: DbPool,
}

impl SqlConversationContextRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn context_from_row(row: &SqliteRow) -> Result<ConversationContext, RepositoryError> {
    let state_raw: String = column(row, "state")?;
    let state = ConversationState::parse(&state_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversation state `{state_raw}`"))
    })?;

    let collected_raw: String = column(row, "collected_data_json")?;
    let collected_data = serde_json::from_str::<Map<String, Value>>(&collected_raw)
        .map_err(|error| RepositoryError::Decode(format!("collected_data_json: {error}")))?;

    let missing_raw: String = column(row, "missing_slots_json")?;
    let missing_slots = serde_json::from_str::<Vec<String>>(&missing_raw)
        .map_err(|error| RepositoryError::Decode(format!("missing_slots_json: {error}")))?;

    let last_intent = column::<Option<String>>(row, "last_intent")?
        .and_then(|raw| Intent::parse(&raw));
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(ConversationContext {
        user_id: UserId(column(row, "user_id")?),
        state,
        event_id: column::<Option<String>>(row, "evento_id")?.map(EventId),
        collected_data,
        missing_slots,
        confidence_level: column(row, "confidence_level")?,
        last_intent,
        summary: column(row, "summary")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ConversationContextRepository for SqlConversationContextRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, state, evento_id, collected_data_json, missing_slots_json,
                    confidence_level, last_intent, summary, created_at, updated_at
             FROM conversation_contexts WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(context_from_row).transpose()
    }

    async fn upsert(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let collected_data = Value::Object(context.collected_data).to_string();
        let missing_slots = serde_json::to_string(&context.missing_slots)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_contexts (user_id, state, evento_id, collected_data_json,
                                                missing_slots_json, confidence_level, last_intent,
                                                summary, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 state = excluded.state,
                 evento_id = excluded.evento_id,
                 collected_data_json = excluded.collected_data_json,
                 missing_slots_json = excluded.missing_slots_json,
                 confidence_level = excluded.confidence_level,
                 last_intent = excluded.last_intent,
                 summary = excluded.summary,
                 updated_at = excluded.updated_at",
        )
        .bind(&context.user_id.0)
        .bind(context.state.as_str())
        .bind(context.event_id.as_ref().map(|id| id.0.as_str()))
        .bind(collected_data)
        .bind(missing_slots)
        .bind(context.confidence_level.clamp(0.0, 1.0))
        .bind(context.last_intent.map(|intent| intent.as_str()))
        .bind(context.summary.as_deref())
        .bind(encode_timestamp(&context.created_at))
        .bind(encode_timestamp(&context.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_by_user(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_contexts WHERE user_id = ?")
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
