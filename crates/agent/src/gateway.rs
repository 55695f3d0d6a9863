//! Guards around every outbound model call: PII masking, a per-user sliding-window
//! rate limit and a TTL-bounded idempotency cache.
//!
//! Masking is pattern based and best effort. It catches e-mail and phone shaped text and
//! is not a compliance-grade redaction.
//!
//! The stores are process-local. Check-then-record is atomic per store call, but two
//! processes sharing users need an external store behind the same traits.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reune_core::config::GatewayConfig;
use reune_core::domain::conversation::{MessageRole, UserId};

use crate::llm::{ChatMessage, ChatRequest, LlmClient, ModelResponse};

pub const EMAIL_PLACEHOLDER: &str = "[email]";
pub const PHONE_PLACEHOLDER: &str = "[phone]";
const DEFAULT_UPSTREAM_TIMEOUT: StdDuration = StdDuration::from_secs(30);

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("valid email regex")
    })
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b\+?\d{2,3}[\s-]?\d{3,5}[\s-]?\d{4,6}\b").expect("valid phone regex")
    })
}

fn millis(value: u64) -> Duration {
    i64::try_from(value).ok().and_then(Duration::try_milliseconds).unwrap_or(Duration::MAX)
}

/// Replaces e-mail and phone shaped substrings with fixed placeholders.
pub fn mask_pii(text: &str) -> String {
    let without_email = email_pattern().replace_all(text, EMAIL_PLACEHOLDER);
    phone_pattern().replace_all(&without_email, PHONE_PLACEHOLDER).into_owned()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub ok: bool,
    pub count: usize,
    pub limit: usize,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records an attempt at `now` and reports whether it fits the window.
    /// Rejected attempts are recorded too.
    async fn check(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision;
}

pub struct SlidingWindowRateLimiter {
    window: Duration,
    limit: usize,
    hits: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { window, limit, hits: RwLock::new(HashMap::new()) }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.rate_limit_per_window as usize, millis(config.rate_limit_window_ms))
    }
}

#[async_trait]
impl RateLimitStore for SlidingWindowRateLimiter {
    async fn check(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut hits = self.hits.write().await;
        let recent = hits.entry(key.to_string()).or_default();
        recent.retain(|at| now.signed_duration_since(*at) < self.window);
        recent.push(now);

        let count = recent.len();
        RateLimitDecision { ok: count <= self.limit, count, limit: self.limit }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub response: ModelResponse,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Entries older than the TTL are evicted here and read as absent.
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<ModelResponse>;

    /// Stamps the entry with `now`, replacing any previous one.
    async fn put(&self, key: &str, response: ModelResponse, now: DateTime<Utc>);

    /// Drops every expired entry and returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

pub struct InMemoryIdempotencyCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryIdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(millis(config.idempotency_ttl_ms))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) > self.ttl
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyCache {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<ModelResponse> {
        let mut entries = self.entries.write().await;
        let entry = entries.get(key)?;
        if self.expired(entry, now) {
            entries.remove(key);
            return None;
        }
        Some(entry.response.clone())
    }

    async fn put(&self, key: &str, response: ModelResponse, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry { response, stored_at: now });
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.expired(entry, now));
        before - entries.len()
    }
}

/// Cache key for an idempotency payload.
pub fn idempotency_key(payload: &Value) -> String {
    format!("chat-{payload}")
}

#[derive(Clone, Debug)]
pub struct GatewayRequest {
    pub user_id: UserId,
    pub correlation_id: String,
    pub chat: ChatRequest,
    pub idempotency_payload: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GatewayOutcome {
    Fresh(ModelResponse),
    Replayed(ModelResponse),
    RateLimited(RateLimitDecision),
    /// Upstream error or timeout. The caller decides whether to retry.
    Failed,
    Cancelled,
}

impl GatewayOutcome {
    pub fn response(&self) -> Option<&ModelResponse> {
        match self {
            Self::Fresh(response) | Self::Replayed(response) => Some(response),
            _ => None,
        }
    }
}

pub struct ModelGateway {
    client: Arc<dyn LlmClient>,
    rate_limiter: Arc<dyn RateLimitStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    redact_pii: bool,
    timeout: StdDuration,
}

impl ModelGateway {
    pub fn new(
        client: Arc<dyn LlmClient>,
        rate_limiter: Arc<dyn RateLimitStore>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            client,
            rate_limiter,
            idempotency,
            redact_pii: true,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Gateway with fresh in-process stores sized from config.
    pub fn from_config(client: Arc<dyn LlmClient>, config: &GatewayConfig) -> Self {
        Self::new(
            client,
            Arc::new(SlidingWindowRateLimiter::from_config(config)),
            Arc::new(InMemoryIdempotencyCache::from_config(config)),
        )
        .with_redaction(config.redact_pii)
    }

    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_pii = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn complete(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> GatewayOutcome {
        self.complete_at(request, Utc::now(), cancel).await
    }

    /// Rate limit, then cache lookup, then redaction, upstream call and cache store.
    pub async fn complete_at(
        &self,
        request: GatewayRequest,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> GatewayOutcome {
        let GatewayRequest { user_id, correlation_id, chat, idempotency_payload } = request;

        let decision = self.rate_limiter.check(user_id.as_str(), now).await;
        if !decision.ok {
            warn!(
                event_name = "gateway.rate_limited",
                correlation_id = %correlation_id,
                user_id = %user_id,
                count = decision.count,
                limit = decision.limit,
                "model call rejected by rate limit"
            );
            return GatewayOutcome::RateLimited(decision);
        }

        let key = idempotency_payload.as_ref().map(idempotency_key);
        if let Some(key) = &key {
            if let Some(cached) = self.idempotency.get(key, now).await {
                info!(
                    event_name = "gateway.idempotent_replay",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    "replaying cached model response"
                );
                return GatewayOutcome::Replayed(cached);
            }
        }

        let chat = if self.redact_pii { redact_request(chat) } else { chat };

        let call = tokio::time::timeout(self.timeout, self.client.chat(&chat));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(
                    event_name = "gateway.cancelled",
                    correlation_id = %correlation_id,
                    "model call cancelled"
                );
                return GatewayOutcome::Cancelled;
            }
            result = call => result,
        };

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(
                    event_name = "gateway.upstream_failed",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    error = %mask_pii(&format!("{error:#}")),
                    "model call failed"
                );
                return GatewayOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    event_name = "gateway.upstream_failed",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "model call timed out"
                );
                return GatewayOutcome::Failed;
            }
        };

        if let Some(key) = &key {
            self.idempotency.put(key, response.clone(), now).await;
        }
        GatewayOutcome::Fresh(response)
    }
}

/// The system prompt is operator text and passes through untouched.
fn redact_request(chat: ChatRequest) -> ChatRequest {
    ChatRequest {
        messages: chat
            .messages
            .into_iter()
            .map(|message| match message.role {
                MessageRole::System => message,
                role => ChatMessage { role, content: mask_pii(&message.content) },
            })
            .collect(),
        ..chat
    }
}
