use reune_agent::tools::ToolName;

use crate::commands::{parse_event_id, run_operator_tool, CommandResult};

pub fn run(event: &str) -> CommandResult {
    match parse_event_id("plan", event) {
        Ok(event_id) => run_operator_tool("plan", ToolName::GetPlan, event_id),
        Err(result) => result,
    }
}
