pub mod classify;
pub mod clear;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod plan;
pub mod split;

use std::future::Future;
use std::sync::Arc;

use reune_agent::guardrails::{CallOrigin, GuardrailPolicy};
use reune_agent::tools::{ToolCallRequest, ToolName, ToolRegistry};
use reune_core::audit::TracingAuditSink;
use reune_core::config::{AppConfig, LoadOptions};
use reune_core::domain::conversation::UserId;
use reune_core::domain::event::EventId;
use reune_core::errors::{ApplicationError, InterfaceError};
use reune_db::repositories::SqlEventPlanRepository;
use reune_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;

/// Requester recorded on tool calls issued from the CLI.
pub const OPERATOR_ID: &str = "operator";

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Failure tuple carried out of async command bodies: `(error_class, message, exit_code)`.
pub(crate) type Failure = (&'static str, String, u8);

/// Maps an application error through its interface class onto an error class and exit code.
pub(crate) fn application_failure(error: ApplicationError, correlation_id: &str) -> Failure {
    let interface = error.into_interface(correlation_id);
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("invalid_params", 2),
        InterfaceError::TooManyRequests { .. } => ("rate_limited", 3),
        InterfaceError::ServiceUnavailable { .. } => ("persistence", 4),
        InterfaceError::Internal { .. } => ("internal", 3),
    };
    let message = format!(
        "{} ({interface}; correlation_id={})",
        interface.user_message(),
        interface.correlation_id()
    );
    (error_class, message, exit_code)
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

/// Runs an async command body on a fresh current-thread runtime.
pub(crate) fn block_on<F>(command: &str, body: F) -> Result<F::Output, CommandResult>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;
    Ok(runtime.block_on(body))
}

/// Connects and brings the schema up to date.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) fn parse_event_id(command: &str, raw: &str) -> Result<EventId, CommandResult> {
    EventId::parse(raw).ok_or_else(|| {
        CommandResult::failure(
            command,
            "invalid_params",
            format!("event id `{raw}` must be numeric"),
            2,
        )
    })
}

/// Runs one planning tool against the configured database as the operator.
pub(crate) fn run_operator_tool(command: &str, tool: ToolName, event_id: EventId) -> CommandResult {
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let outcome = block_on(command, async {
        let pool = open_database(&config).await?;
        let registry = ToolRegistry::standard(
            Arc::new(SqlEventPlanRepository::new(pool.clone())),
            GuardrailPolicy::default(),
            Arc::new(TracingAuditSink),
        );
        let result = registry
            .dispatch(&ToolCallRequest {
                tool: tool.as_str().to_string(),
                arguments: serde_json::json!({ "evento_id": event_id }),
                requester: UserId(OPERATOR_ID.to_string()),
                origin: CallOrigin::Operator,
                correlation_id: format!("cli-{command}"),
            })
            .await;
        pool.close().await;
        Ok::<_, Failure>(result)
    });

    match outcome {
        Err(result) => result,
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
        Ok(Ok(result)) => match (result.data, result.error) {
            (Some(data), _) => CommandResult::success(command, data.to_string()),
            (None, Some(failure)) => {
                let exit_code = if failure.code == "not_found" { 6 } else { 7 };
                CommandResult::failure(command, &failure.code, failure.message, exit_code)
            }
            (None, None) => CommandResult::success(command, "{}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use reune_core::errors::{ApplicationError, DomainError};

    use super::application_failure;

    #[test]
    fn application_errors_map_to_classes_and_exit_codes() {
        let (class, message, code) =
            application_failure(ApplicationError::Persistence("disk full".into()), "cli-clear");
        assert_eq!((class, code), ("persistence", 4));
        assert!(message.contains("disk full"));
        assert!(message.contains("correlation_id=cli-clear"));

        let invalid = DomainError::InvariantViolation("bad".into());
        let (class, _, code) = application_failure(invalid.into(), "cli-clear");
        assert_eq!((class, code), ("invalid_params", 2));

        let limited = ApplicationError::RateLimited { user_id: "u".into(), count: 11, limit: 10 };
        assert_eq!(application_failure(limited, "c").0, "rate_limited");
        let config = ApplicationError::Configuration("missing key".into());
        assert_eq!(application_failure(config, "c").2, 3);
    }
}
