use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::conversation::{ConversationState, Intent};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> ConversationState;
    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// idle -> collecting_core -> itens_pendentes_confirmacao
/// -> distrib_pendente_confirmacao -> finalizado
#[derive(Clone, Debug, Default)]
pub struct EventPlanningFlow;

impl FlowDefinition for EventPlanningFlow {
    fn initial_state(&self) -> ConversationState {
        ConversationState::Idle
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_event_planning(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> ConversationState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<EventPlanningFlow> {
    fn default() -> Self {
        Self::new(EventPlanningFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationState, event: FlowEvent },
}

/// A new event requested after a finished cycle starts over from empty collected data.
pub fn starts_new_cycle(current: &ConversationState, intent: Intent) -> bool {
    *current == ConversationState::Finalized && intent == Intent::CreateEvent
}

fn transition_event_planning(
    current: &ConversationState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationState::{
        CollectingCore, DistributionPendingConfirmation, Finalized, Idle,
        ItemsPendingConfirmation,
    };
    use FlowAction::{ComputeCostSplit, ConfirmItems, GenerateItemList, GetPlan};
    use FlowEvent::{Chatter, Confirmed, PlanningRequested};

    let (to, actions) = match (current, event) {
        (_, Chatter) => (*current, Vec::new()),
        (Idle | CollectingCore | ItemsPendingConfirmation | DistributionPendingConfirmation, e)
            if e.carries_event_details() =>
        {
            collect_or_generate(context)
        }
        (Finalized, PlanningRequested) => collect_or_generate(context),
        (ItemsPendingConfirmation, Confirmed) => {
            (DistributionPendingConfirmation, vec![ConfirmItems, ComputeCostSplit])
        }
        (DistributionPendingConfirmation, Confirmed) => (Finalized, vec![GetPlan]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

fn collect_or_generate(context: &FlowContext) -> (ConversationState, Vec<FlowAction>) {
    if context.missing_required_slots.is_empty() {
        (ConversationState::ItemsPendingConfirmation, vec![FlowAction::GenerateItemList])
    } else {
        (ConversationState::CollectingCore, vec![FlowAction::PromptForMissingSlots])
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::conversation::{ConversationState, Intent, UserId};
    use crate::flows::engine::{
        starts_new_cycle, EventPlanningFlow, FlowDefinition, FlowEngine, FlowTransitionError,
    };
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent};

    fn missing(slots: &[&str]) -> FlowContext {
        FlowContext {
            missing_required_slots: slots.iter().map(|slot| slot.to_string()).collect(),
        }
    }

    #[test]
    fn planning_happy_path_reaches_finalized() {
        let engine = FlowEngine::default();
        let complete = FlowContext::default();
        let mut state = engine.initial_state();

        let generated = engine
            .apply(&state, &FlowEvent::PlanningRequested, &complete)
            .expect("idle -> items pending");
        assert_eq!(generated.to, ConversationState::ItemsPendingConfirmation);
        assert_eq!(generated.actions, vec![FlowAction::GenerateItemList]);
        state = generated.to;

        let confirmed =
            engine.apply(&state, &FlowEvent::Confirmed, &complete).expect("items -> distribution");
        assert_eq!(confirmed.to, ConversationState::DistributionPendingConfirmation);
        assert_eq!(confirmed.actions, vec![FlowAction::ConfirmItems, FlowAction::ComputeCostSplit]);
        state = confirmed.to;

        let finalized =
            engine.apply(&state, &FlowEvent::Confirmed, &complete).expect("distribution -> done");
        assert_eq!(finalized.to, ConversationState::Finalized);
        assert_eq!(finalized.actions, vec![FlowAction::GetPlan]);
    }

    #[test]
    fn missing_core_slots_keep_collecting() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &ConversationState::Idle,
                &FlowEvent::PlanningRequested,
                &missing(&["qtd_pessoas"]),
            )
            .expect("idle -> collecting");

        assert_eq!(outcome.to, ConversationState::CollectingCore);
        assert_eq!(outcome.actions, vec![FlowAction::PromptForMissingSlots]);
    }

    #[test]
    fn updates_after_items_regenerate_the_list() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &ConversationState::DistributionPendingConfirmation,
                &FlowEvent::DetailsUpdated,
                &FlowContext::default(),
            )
            .expect("distribution -> items pending");

        assert_eq!(outcome.to, ConversationState::ItemsPendingConfirmation);
        assert_eq!(outcome.actions, vec![FlowAction::GenerateItemList]);
    }

    #[test]
    fn chatter_never_moves_the_state() {
        let engine = FlowEngine::new(EventPlanningFlow);
        for state in [
            ConversationState::Idle,
            ConversationState::CollectingCore,
            ConversationState::ItemsPendingConfirmation,
            ConversationState::DistributionPendingConfirmation,
            ConversationState::Finalized,
        ] {
            let outcome = engine
                .apply(&state, &FlowEvent::Chatter, &FlowContext::default())
                .expect("chatter");
            assert_eq!(outcome.to, state);
            assert!(outcome.actions.is_empty());
        }
    }

    #[test]
    fn confirm_without_items_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &ConversationState::CollectingCore,
                &FlowEvent::Confirmed,
                &FlowContext::default(),
            )
            .expect_err("nothing to confirm yet");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: ConversationState::CollectingCore,
                event: FlowEvent::Confirmed,
            }
        );
    }

    #[test]
    fn finalized_only_restarts_on_new_event() {
        let engine = FlowEngine::default();
        assert!(engine
            .apply(
                &ConversationState::Finalized,
                &FlowEvent::DetailsUpdated,
                &FlowContext::default(),
            )
            .is_err());

        let restarted = engine
            .apply(
                &ConversationState::Finalized,
                &FlowEvent::PlanningRequested,
                &missing(&["tipo_evento", "qtd_pessoas"]),
            )
            .expect("finalized -> collecting");
        assert_eq!(restarted.to, ConversationState::CollectingCore);

        assert!(starts_new_cycle(&ConversationState::Finalized, Intent::CreateEvent));
        assert!(!starts_new_cycle(&ConversationState::Finalized, Intent::UpdateEvent));
        assert!(!starts_new_cycle(&ConversationState::CollectingCore, Intent::CreateEvent));
        assert_eq!(EventPlanningFlow.initial_state(), ConversationState::Idle);
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit =
            AuditContext::new(Some(UserId("u-9".to_string())), None, "req-42", "context-manager");

        let _ = engine
            .apply_with_audit(
                &ConversationState::Idle,
                &FlowEvent::PlanningRequested,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(
            &ConversationState::Idle,
            &FlowEvent::Confirmed,
            &FlowContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(
            events[0].metadata.get("to").map(String::as_str),
            Some("itens_pendentes_confirmacao")
        );
        assert_eq!(events[1].event_type, "flow.transition_rejected");
    }
}
