use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use reune_core::domain::conversation::{ConversationContext, ConversationMessage, UserId};
use reune_core::domain::event::{
    DistributionRow, Event, EventId, EventPlan, EventStatus, Item, NewEvent, Participant,
};

use super::{
    event_key, ConversationContextRepository, ConversationMessageRepository, EventPlanRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryConversationContextRepository {
    contexts: RwLock<HashMap<String, ConversationContext>>,
}

#[async_trait::async_trait]
impl ConversationContextRepository for InMemoryConversationContextRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(&user_id.0).cloned())
    }

    async fn upsert(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(context.user_id.0.clone(), context);
        Ok(())
    }

    async fn delete_by_user(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        let mut contexts = self.contexts.write().await;
        Ok(contexts.remove(&user_id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryConversationMessageRepository {
    messages: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

#[async_trait::async_trait]
impl ConversationMessageRepository for InMemoryConversationMessageRepository {
    async fn append(&self, message: ConversationMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        let log = messages.entry(message.user_id.0.clone()).or_default();
        // Stable sort keeps insertion order for equal timestamps.
        let at = log.partition_point(|existing| existing.created_at <= message.created_at);
        log.insert(at, message);
        Ok(())
    }

    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let Some(log) = messages.get(&user_id.0) else {
            return Ok(Vec::new());
        };
        let skip = log.len().saturating_sub(limit as usize);
        Ok(log[skip..].to_vec())
    }

    async fn clear_user(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        Ok(messages.remove(&user_id.0).map_or(0, |log| log.len() as u64))
    }
}

#[derive(Default)]
struct PlanStore {
    next_id: i64,
    plans: HashMap<i64, EventPlan>,
}

#[derive(Default)]
pub struct InMemoryEventPlanRepository {
    store: RwLock<PlanStore>,
}

impl InMemoryEventPlanRepository {
    async fn with_plan<T>(
        &self,
        id: &EventId,
        update: impl FnOnce(&mut EventPlan) -> T,
    ) -> Result<T, RepositoryError> {
        let key = event_key(id)?;
        let mut store = self.store.write().await;
        let plan = store
            .plans
            .get_mut(&key)
            .ok_or_else(|| RepositoryError::NotFound(format!("event {id}")))?;
        let output = update(plan);
        plan.event.updated_at = Utc::now();
        Ok(output)
    }
}

#[async_trait::async_trait]
impl EventPlanRepository for InMemoryEventPlanRepository {
    async fn create_event(&self, event: NewEvent) -> Result<Event, RepositoryError> {
        let mut store = self.store.write().await;
        store.next_id += 1;
        let key = store.next_id;
        let now = Utc::now();
        let created = Event {
            id: EventId(key.to_string()),
            owner_id: event.owner_id,
            name: event.name,
            event_type: event.event_type,
            people_count: event.people_count.max(1),
            date: event.date,
            status: EventStatus::Rascunho,
            created_at: now,
            updated_at: now,
        };
        store.plans.insert(
            key,
            EventPlan {
                event: created.clone(),
                items: Vec::new(),
                participants: Vec::new(),
                distribution: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn find_event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        let key = event_key(id)?;
        let store = self.store.read().await;
        Ok(store.plans.get(&key).map(|plan| plan.event.clone()))
    }

    async fn find_plan(&self, id: &EventId) -> Result<Option<EventPlan>, RepositoryError> {
        let key = event_key(id)?;
        let store = self.store.read().await;
        Ok(store.plans.get(&key).cloned())
    }

    async fn replace_items(&self, id: &EventId, items: Vec<Item>) -> Result<(), RepositoryError> {
        let event_id = id.clone();
        self.with_plan(id, move |plan| {
            plan.items = items
                .into_iter()
                .map(|item| Item { event_id: event_id.clone(), ..item })
                .collect();
            plan.distribution.clear();
        })
        .await
    }

    async fn add_participants(
        &self,
        id: &EventId,
        participants: Vec<Participant>,
    ) -> Result<(), RepositoryError> {
        let event_id = id.clone();
        self.with_plan(id, move |plan| {
            plan.participants.extend(
                participants
                    .into_iter()
                    .map(|participant| Participant { event_id: event_id.clone(), ..participant }),
            );
        })
        .await
    }

    async fn replace_distribution(
        &self,
        id: &EventId,
        rows: Vec<DistributionRow>,
    ) -> Result<(), RepositoryError> {
        let event_id = id.clone();
        self.with_plan(id, move |plan| {
            plan.distribution = rows
                .into_iter()
                .map(|row| DistributionRow { event_id: event_id.clone(), ..row })
                .collect();
        })
        .await
    }

    async fn set_status(&self, id: &EventId, status: EventStatus) -> Result<(), RepositoryError> {
        self.with_plan(id, |plan| plan.event.status = status).await
    }
}
