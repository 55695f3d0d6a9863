use sqlx::sqlite::SqliteRow;

use reune_core::domain::conversation::{ConversationMessage, MessageRole, UserId};
use reune_core::domain::event::EventId;

use super::{
    column, decode_timestamp, encode_timestamp, ConversationMessageRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationMessageRepository {
    pool: DbPool,
}

impl SqlConversationMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    let role_raw: String = column(row, "role")?;
    let role = MessageRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;
    let created_at: String = column(row, "created_at")?;

    Ok(ConversationMessage {
        id: column(row, "id")?,
        user_id: UserId(column(row, "user_id")?),
        event_id: column::<Option<String>>(row, "evento_id")?.map(EventId),
        role,
        content: column(row, "content")?,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl ConversationMessageRepository for SqlConversationMessageRepository {
    async fn append(&self, message: ConversationMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_messages (id, user_id, evento_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.user_id.0)
        .bind(message.event_id.as_ref().map(|id| id.0.as_str()))
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(encode_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, user_id, evento_id, role, content, created_at FROM (
                 SELECT rowid AS seq, id, user_id, evento_id, role, content, created_at
                 FROM conversation_messages
                 WHERE user_id = ?
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?
             )
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(&user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn clear_user(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_messages WHERE user_id = ?")
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
