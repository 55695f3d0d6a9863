use chrono::{Datelike, Utc};
use serde_json::{json, Value};

use reune_agent::conversation::MessageSignals;

use crate::commands::CommandResult;

/// Offline reading of one utterance: intent plus the slots the extractors found.
pub fn run(text: &str) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::failure("classify", "invalid_params", "text must not be empty", 2);
    }

    let signals = MessageSignals::read(text, Utc::now().year());
    let report = json!({
        "intent": signals.intent.as_str(),
        "slots": Value::Object(signals.payload()),
        "complete": signals.has_core_slots(),
        "confidence": signals.rule_confidence(),
    });
    CommandResult::success("classify", report.to_string())
}
