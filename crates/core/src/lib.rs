//! Domain core for the reune event-planning assistant: conversation state, planning
//! entities, the cost distribution engine, configuration and the error taxonomy.
//! Nothing in this crate performs I/O beyond reading the config file.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod planning;

pub use domain::conversation::{
    ConversationContext, ConversationMessage, ConversationState, Intent, MessageRole, UserId,
};
pub use domain::event::{
    CostSummary, DistributionRow, Event, EventId, EventPlan, EventStatus, InviteStatus, Item,
    ItemId, ItemPriority, NewEvent, Participant, ParticipantId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use planning::{split_costs, summarize_costs};
