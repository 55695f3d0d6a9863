use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;

use reune_core::domain::conversation::UserId;
use reune_core::domain::event::{
    DistributionRow, DistributionRowId, Event, EventId, EventPlan, EventStatus, InviteStatus,
    Item, ItemId, ItemPriority, NewEvent, Participant, ParticipantId,
};

use super::{
    column, decode_timestamp, encode_timestamp, event_key, EventPlanRepository, RepositoryError,
};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlEventPlanRepository {
    pool: DbPool,
}

impl SqlEventPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn ensure_event(&self, key: i64) -> Result<(), RepositoryError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound(format!("event {key}"))),
        }
    }
}

fn event_from_row(row: &SqliteRow) -> Result<Event, RepositoryError> {
    let status_raw: String = column(row, "status")?;
    let status = EventStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event status `{status_raw}`")))?;
    let date = column::<Option<String>>(row, "data_evento")?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|error| RepositoryError::Decode(format!("data_evento `{raw}`: {error}")))
        })
        .transpose()?;
    let people_count: i64 = column(row, "qtd_pessoas")?;
    let people_count = u32::try_from(people_count)
        .map_err(|_| RepositoryError::Decode(format!("qtd_pessoas `{people_count}`")))?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Event {
        id: EventId(column::<i64>(row, "id")?.to_string()),
        owner_id: UserId(column(row, "owner_id")?),
        name: column(row, "nome_evento")?,
        event_type: column(row, "tipo_evento")?,
        people_count,
        date,
        status,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<Item, RepositoryError> {
    let priority_raw: String = column(row, "prioridade")?;
    let priority = ItemPriority::parse(&priority_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{priority_raw}`")))?;

    Ok(Item {
        id: ItemId(column(row, "id")?),
        event_id: EventId(column::<i64>(row, "evento_id")?.to_string()),
        name: column(row, "nome_item")?,
        quantity: column(row, "quantidade")?,
        unit: column(row, "unidade")?,
        estimated_value: column(row, "valor_estimado")?,
        category: column(row, "categoria")?,
        priority,
    })
}

fn participant_from_row(row: &SqliteRow) -> Result<Participant, RepositoryError> {
    let status_raw: String = column(row, "status_convite")?;
    let invite_status = InviteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown invite status `{status_raw}`")))?;
    let preferences = column::<Option<String>>(row, "preferencias_json")?
        .map(|raw| {
            serde_json::from_str::<Map<String, Value>>(&raw)
                .map_err(|error| RepositoryError::Decode(format!("preferencias_json: {error}")))
        })
        .transpose()?;

    Ok(Participant {
        id: ParticipantId(column(row, "id")?),
        event_id: EventId(column::<i64>(row, "evento_id")?.to_string()),
        name: column(row, "nome_participante")?,
        contact: column(row, "contato")?,
        invite_status,
        preferences,
        amount_due: column(row, "valor_responsavel")?,
    })
}

fn distribution_from_row(row: &SqliteRow) -> Result<DistributionRow, RepositoryError> {
    Ok(DistributionRow {
        id: DistributionRowId(column(row, "id")?),
        event_id: EventId(column::<i64>(row, "evento_id")?.to_string()),
        item_id: ItemId(column(row, "item_id")?),
        participant_id: ParticipantId(column(row, "participante_id")?),
        assigned_quantity: column(row, "quantidade_atribuida")?,
        cost_share: column(row, "valor_rateado")?,
        notes: column(row, "observacoes")?,
    })
}

#[async_trait::async_trait]
impl EventPlanRepository for SqlEventPlanRepository {
    async fn create_event(&self, event: NewEvent) -> Result<Event, RepositoryError> {
        let now = encode_timestamp(&Utc::now());
        let result = sqlx::query(
            "INSERT INTO events (owner_id, nome_evento, tipo_evento, qtd_pessoas, data_evento,
                                 status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.owner_id.0)
        .bind(&event.name)
        .bind(&event.event_type)
        .bind(i64::from(event.people_count.max(1)))
        .bind(event.date.map(|date| date.format(DATE_FORMAT).to_string()))
        .bind(EventStatus::Rascunho.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = EventId(result.last_insert_rowid().to_string());
        self.find_event(&id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("event {id}")))
    }

    async fn find_event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        let key = event_key(id)?;
        let row = sqlx::query(
            "SELECT id, owner_id, nome_evento, tipo_evento, qtd_pessoas, data_evento, status,
                    created_at, updated_at
             FROM events WHERE id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn find_plan(&self, id: &EventId) -> Result<Option<EventPlan>, RepositoryError> {
        let Some(event) = self.find_event(id).await? else {
            return Ok(None);
        };
        let key = event_key(id)?;

        let items = sqlx::query(
            "SELECT id, evento_id, nome_item, quantidade, unidade, valor_estimado, categoria,
                    prioridade
             FROM event_items WHERE evento_id = ? ORDER BY position",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(item_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let participants = sqlx::query(
            "SELECT id, evento_id, nome_participante, contato, status_convite, preferencias_json,
                    valor_responsavel
             FROM event_participants WHERE evento_id = ? ORDER BY position",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(participant_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let distribution = sqlx::query(
            "SELECT id, evento_id, item_id, participante_id, quantidade_atribuida, valor_rateado,
                    observacoes
             FROM distribution_rows WHERE evento_id = ? ORDER BY position",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(distribution_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(EventPlan { event, items, participants, distribution }))
    }

    async fn replace_items(&self, id: &EventId, items: Vec<Item>) -> Result<(), RepositoryError> {
        let key = event_key(id)?;
        self.ensure_event(key).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM distribution_rows WHERE evento_id = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_items WHERE evento_id = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO event_items (id, evento_id, position, nome_item, quantidade, unidade,
                                          valor_estimado, categoria, prioridade)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id.0)
            .bind(key)
            .bind(position as i64)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(&item.unit)
            .bind(item.estimated_value)
            .bind(&item.category)
            .bind(item.priority.as_str())
            .execute(&mut *tx)
            .await?;
        }

        touch_event(&mut tx, key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_participants(
        &self,
        id: &EventId,
        participants: Vec<Participant>,
    ) -> Result<(), RepositoryError> {
        let key = event_key(id)?;
        self.ensure_event(key).await?;

        let mut tx = self.pool.begin().await?;
        let next_position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM event_participants WHERE evento_id = ?",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, participant) in participants.iter().enumerate() {
            let preferences = participant
                .preferences
                .as_ref()
                .map(|map| Value::Object(map.clone()).to_string());
            sqlx::query(
                "INSERT INTO event_participants (id, evento_id, position, nome_participante,
                                                 contato,
                                                 status_convite, preferencias_json,
                                                 valor_responsavel)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&participant.id.0)
            .bind(key)
            .bind(next_position + offset as i64)
            .bind(&participant.name)
            .bind(participant.contact.as_deref())
            .bind(participant.invite_status.as_str())
            .bind(preferences)
            .bind(participant.amount_due)
            .execute(&mut *tx)
            .await?;
        }

        touch_event(&mut tx, key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_distribution(
        &self,
        id: &EventId,
        rows: Vec<DistributionRow>,
    ) -> Result<(), RepositoryError> {
        let key = event_key(id)?;
        self.ensure_event(key).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM distribution_rows WHERE evento_id = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for (position, row) in rows.iter().enumerate() {
            sqlx::query(
                "INSERT INTO distribution_rows (id, evento_id, position, item_id, participante_id,
                                                quantidade_atribuida, valor_rateado, observacoes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.id.0)
            .bind(key)
            .bind(position as i64)
            .bind(&row.item_id.0)
            .bind(&row.participant_id.0)
            .bind(row.assigned_quantity)
            .bind(row.cost_share)
            .bind(row.notes.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        touch_event(&mut tx, key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_status(&self, id: &EventId, status: EventStatus) -> Result<(), RepositoryError> {
        let key = event_key(id)?;
        let result = sqlx::query("UPDATE events SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(encode_timestamp(&Utc::now()))
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("event {id}")));
        }
        Ok(())
    }
}

async fn touch_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    key: i64,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE events SET updated_at = ? WHERE id = ?")
        .bind(encode_timestamp(&Utc::now()))
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
