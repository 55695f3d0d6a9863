pub mod engine;
pub mod states;

pub use engine::{
    starts_new_cycle, EventPlanningFlow, FlowDefinition, FlowEngine, FlowTransitionError,
};
pub use states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};
