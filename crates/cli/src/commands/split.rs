use reune_agent::tools::ToolName;

use crate::commands::{parse_event_id, run_operator_tool, CommandResult};

/// Computes and stores the cost split of an event. The message carries the rows and totals.
pub fn run(event: &str) -> CommandResult {
    match parse_event_id("split", event) {
        Ok(event_id) => run_operator_tool("split", ToolName::ComputeCostSplit, event_id),
        Err(result) => result,
    }
}
