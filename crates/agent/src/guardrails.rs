use reune_core::domain::conversation::UserId;
use reune_core::domain::event::EventId;

/// Where a tool call came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOrigin {
    /// Derived from the conversation state machine.
    Flow,
    /// Requested by the model through `toolCalls`.
    Model,
    /// Issued by an operator, e.g. the CLI.
    Operator,
}

impl CallOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Model => "model",
            Self::Operator => "operator",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    ToolCall {
        tool: &'static str,
        event_id: EventId,
        owner: UserId,
        requester: UserId,
        origin: CallOrigin,
    },
    UnknownTool { tool: String },
    InvalidArguments { tool: &'static str, detail: String },
    PriceOverride { tool: &'static str, event_id: EventId },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> String {
        match self {
            Self::ToolCall { tool, .. } => format!("tool.{tool}"),
            Self::UnknownTool { .. } => "tool.unknown".to_string(),
            Self::InvalidArguments { tool, .. } => format!("tool.{tool}.invalid_arguments"),
            Self::PriceOverride { .. } => "policy.price_override".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => Some(reason_code),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_set_prices: bool,
    pub model_tool_calls_enabled: bool,
    pub enforce_event_ownership: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            llm_can_set_prices: false,
            model_tool_calls_enabled: true,
            enforce_event_ownership: true,
        }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::ToolCall { origin: CallOrigin::Model, .. }
                if !self.model_tool_calls_enabled =>
            {
                GuardrailDecision::Degrade {
                    reason_code: "model_tool_calls_disabled",
                    user_message: "Não posso executar essa ação pelo chat agora.".to_string(),
                    fallback_path: "conversation_flow_actions",
                }
            }
            GuardrailIntent::ToolCall { owner, requester, origin, .. }
                if self.enforce_event_ownership
                    && *origin != CallOrigin::Operator
                    && owner != requester =>
            {
                GuardrailDecision::Deny {
                    reason_code: "forbidden",
                    user_message: "Esse evento pertence a outra pessoa.".to_string(),
                    fallback_path: "request_event_owner",
                }
            }
            GuardrailIntent::ToolCall { .. } => GuardrailDecision::Allow,
            GuardrailIntent::UnknownTool { .. } => GuardrailDecision::Deny {
                reason_code: "unknown_tool",
                user_message: "Essa ação não existe.".to_string(),
                fallback_path: "supported_tools",
            },
            GuardrailIntent::InvalidArguments { .. } => GuardrailDecision::Degrade {
                reason_code: "invalid_params",
                user_message: "Faltaram dados para essa ação. Pode repetir com mais detalhes?"
                    .to_string(),
                fallback_path: "ask_for_missing_arguments",
            },
            GuardrailIntent::PriceOverride { .. } => GuardrailDecision::Deny {
                reason_code: if self.llm_can_set_prices {
                    "price_override_policy_conflict"
                } else {
                    "price_override_disallowed"
                },
                user_message: "Os valores estimados vêm da tabela de referência.".to_string(),
                fallback_path: "reference_price_table",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use reune_core::domain::conversation::UserId;
    use reune_core::domain::event::EventId;

    use super::{CallOrigin, GuardrailDecision, GuardrailIntent, GuardrailPolicy};

    fn tool_call(owner: &str, requester: &str, origin: CallOrigin) -> GuardrailIntent {
        GuardrailIntent::ToolCall {
            tool: "getPlan",
            event_id: EventId("7".to_string()),
            owner: UserId(owner.to_string()),
            requester: UserId(requester.to_string()),
            origin,
        }
    }

    #[test]
    fn owner_tool_call_allow() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&tool_call("u-1", "u-1", CallOrigin::Flow));
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn foreign_event_denial() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&tool_call("u-1", "u-2", CallOrigin::Model));
        assert_eq!(decision.reason_code(), Some("forbidden"));
        assert!(matches!(decision, GuardrailDecision::Deny { .. }));

        let operator = policy.evaluate(&tool_call("u-1", "ops", CallOrigin::Operator));
        assert_eq!(operator, GuardrailDecision::Allow);
    }

    #[test]
    fn disabled_model_tool_calls_degrade() {
        let policy = GuardrailPolicy { model_tool_calls_enabled: false, ..Default::default() };
        let decision = policy.evaluate(&tool_call("u-1", "u-1", CallOrigin::Model));

        let (reason_code, fallback_path) = match decision {
            GuardrailDecision::Degrade { reason_code, fallback_path, .. } => {
                (reason_code, fallback_path)
            }
            _ => ("", ""),
        };
        assert_eq!(reason_code, "model_tool_calls_disabled");
        assert_eq!(fallback_path, "conversation_flow_actions");

        let from_flow = policy.evaluate(&tool_call("u-1", "u-1", CallOrigin::Flow));
        assert_eq!(from_flow, GuardrailDecision::Allow);
    }

    #[test]
    fn price_override_denial() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&GuardrailIntent::PriceOverride {
            tool: "generateItemList",
            event_id: EventId("7".to_string()),
        });

        let (reason_code, user_message) = match decision {
            GuardrailDecision::Deny { reason_code, user_message, .. } => {
                (reason_code, user_message)
            }
            _ => ("", String::new()),
        };
        assert_eq!(reason_code, "price_override_disallowed");
        assert!(user_message.contains("tabela de referência"));
    }

    #[test]
    fn unknown_tool_and_bad_arguments() {
        let policy = GuardrailPolicy::default();
        let unknown = policy.evaluate(&GuardrailIntent::UnknownTool { tool: "deleteAll".into() });
        assert_eq!(unknown.reason_code(), Some("unknown_tool"));

        let invalid = policy.evaluate(&GuardrailIntent::InvalidArguments {
            tool: "confirmItems",
            detail: "evento_id missing".to_string(),
        });
        assert!(matches!(
            invalid,
            GuardrailDecision::Degrade { reason_code: "invalid_params", .. }
        ));
    }
}
