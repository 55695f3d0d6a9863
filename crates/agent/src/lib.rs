//! Agent runtime for reune: turns chat utterances into planning actions.
//!
//! A turn flows through:
//! 1. **Extraction** (`conversation`): rule-based intent and slot reading, used as a
//!    fast path and as a fallback when the model is unavailable.
//! 2. **Model gateway** (`gateway`): rate limiting, idempotent replay, PII redaction and
//!    cancellation around the `LlmClient` seam (`llm`).
//! 3. **Envelope validation** (`envelope`): model output is coerced into a typed,
//!    intent-tagged `PlannerEnvelope`; malformed output degrades to a base envelope.
//! 4. **Context** (`context`): slot merge, the conversation state machine and history.
//! 5. **Tools** (`tools`, `guardrails`): typed planning operations behind ownership checks.
//!    Item edits typed by the user while a list awaits confirmation go through `edits`.
//!
//! The model only proposes intents and slots. Quantities, prices and cost splits always
//! come from `reune_core::planning`.

pub mod context;
pub mod conversation;
pub mod edits;
pub mod envelope;
pub mod gateway;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use runtime::{AgentRuntime, AgentRuntimeBuilder, TurnOutcome};
