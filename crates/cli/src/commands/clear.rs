use std::sync::Arc;

use reune_agent::context::ContextManager;
use reune_core::audit::TracingAuditSink;
use reune_core::domain::conversation::UserId;
use reune_db::repositories::{SqlConversationContextRepository, SqlConversationMessageRepository};

use crate::commands::{
    application_failure, block_on, load_config, open_database, CommandResult, Failure,
};

/// Deletes a user's conversation context and message history.
pub fn run(user: &str) -> CommandResult {
    let user = user.trim();
    if user.is_empty() {
        return CommandResult::failure("clear", "invalid_params", "user id must not be empty", 2);
    }
    let config = match load_config("clear") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let user_id = UserId(user.to_string());
    let outcome = block_on("clear", async {
        let pool = open_database(&config).await?;
        let manager = ContextManager::new(
            Arc::new(SqlConversationContextRepository::new(pool.clone())),
            Arc::new(SqlConversationMessageRepository::new(pool.clone())),
            Arc::new(TracingAuditSink),
            config.conversation.clone(),
        );
        let cleared = manager
            .clear(&user_id)
            .await
            .map_err(|error| application_failure(error, "cli-clear"))?;
        pool.close().await;
        Ok::<_, Failure>(cleared)
    });

    match outcome {
        Err(result) => result,
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("clear", error_class, message, exit_code)
        }
        Ok(Ok(cleared)) => CommandResult::success(
            "clear",
            format!(
                "cleared history of `{user_id}`: context_removed={}, messages_removed={}",
                cleared.context_removed, cleared.messages_removed
            ),
        ),
    }
}
