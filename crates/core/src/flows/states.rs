use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationState, Intent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    PlanningRequested,
    DetailsUpdated,
    ItemsRequested,
    Confirmed,
    Chatter,
}

impl FlowEvent {
    pub fn from_intent(intent: Intent) -> Self {
        match intent {
            Intent::CreateEvent => Self::PlanningRequested,
            Intent::UpdateEvent => Self::DetailsUpdated,
            Intent::GenerateItems => Self::ItemsRequested,
            Intent::ConfirmEvent => Self::Confirmed,
            Intent::SmallTalk | Intent::Unknown => Self::Chatter,
        }
    }

    pub fn carries_event_details(&self) -> bool {
        matches!(self, Self::PlanningRequested | Self::DetailsUpdated | Self::ItemsRequested)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_slots: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForMissingSlots,
    GenerateItemList,
    ConfirmItems,
    ComputeCostSplit,
    GetPlan,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
