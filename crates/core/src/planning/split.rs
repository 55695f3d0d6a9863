//! Cost distribution: an equal split of every item across the active participants.

use uuid::Uuid;

use crate::domain::event::{
    CostSummary, DistributionRow, DistributionRowId, Item, Participant, ParticipantTotal,
};

pub trait CostSplitter: Send + Sync {
    fn split(&self, items: &[Item], participants: &[Participant]) -> Vec<DistributionRow>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EqualCostSplitter;

impl CostSplitter for EqualCostSplitter {
    fn split(&self, items: &[Item], participants: &[Participant]) -> Vec<DistributionRow> {
        split_costs(items, participants)
    }
}

/// Emits one row per (item, active participant) pair.
///
/// Participants who declined (`recusado`) are excluded unless that would leave nobody,
/// in which case the full list is used. Shares that come out non-finite are clamped to 0.
pub fn split_costs(items: &[Item], participants: &[Participant]) -> Vec<DistributionRow> {
    let active = active_participants(participants);
    let divisor = active.len().max(1) as f64;

    let mut rows = Vec::with_capacity(items.len() * active.len());
    for item in items {
        let cost_share = finite_or_zero(item.estimated_value / divisor);
        let assigned_quantity = finite_or_zero(item.quantity / divisor);

        for participant in &active {
            rows.push(DistributionRow {
                id: DistributionRowId(Uuid::new_v4().to_string()),
                event_id: item.event_id.clone(),
                item_id: item.id.clone(),
                participant_id: participant.id.clone(),
                assigned_quantity,
                cost_share,
                notes: None,
            });
        }
    }
    rows
}

/// Total of all shares plus the per-participant totals, in participant order.
pub fn summarize_costs(participants: &[Participant], rows: &[DistributionRow]) -> CostSummary {
    let per_participant = participants
        .iter()
        .filter_map(|participant| {
            let mut assigned =
                rows.iter().filter(|row| row.participant_id == participant.id).peekable();
            assigned.peek()?;
            Some(ParticipantTotal {
                participant_id: participant.id.clone(),
                name: participant.name.clone(),
                total: assigned.map(|row| row.cost_share).sum(),
            })
        })
        .collect::<Vec<_>>();

    CostSummary { total: rows.iter().map(|row| row.cost_share).sum(), per_participant }
}

fn active_participants(participants: &[Participant]) -> Vec<&Participant> {
    let active =
        participants.iter().filter(|participant| participant.is_active()).collect::<Vec<_>>();
    if active.is_empty() {
        participants.iter().collect()
    } else {
        active
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{split_costs, summarize_costs, CostSplitter, EqualCostSplitter};
    use crate::domain::event::{
        EventId, InviteStatus, Item, ItemId, ItemPriority, Participant, ParticipantId,
    };

    fn item(id: &str, quantity: f64, value: f64) -> Item {
        Item {
            id: ItemId(id.to_string()),
            event_id: EventId("7".to_string()),
            name: format!("item {id}"),
            quantity,
            unit: "kg".to_string(),
            estimated_value: value,
            category: "Carnes".to_string(),
            priority: ItemPriority::A,
        }
    }

    fn participant(id: &str, status: InviteStatus) -> Participant {
        Participant {
            id: ParticipantId(id.to_string()),
            event_id: EventId("7".to_string()),
            name: format!("guest {id}"),
            contact: None,
            invite_status: status,
            preferences: None,
            amount_due: None,
        }
    }

    #[test]
    fn shares_sum_back_to_item_value() {
        let items = vec![item("picanha", 4.0, 100.0), item("cerveja", 9.0, 47.3)];
        let participants = vec![
            participant("p1", InviteStatus::Confirmado),
            participant("p2", InviteStatus::Pendente),
            participant("p3", InviteStatus::Confirmado),
        ];

        let rows = split_costs(&items, &participants);
        assert_eq!(rows.len(), 6);

        for item in &items {
            let total: f64 =
                rows.iter().filter(|row| row.item_id == item.id).map(|row| row.cost_share).sum();
            assert!((total - item.estimated_value).abs() < 1e-9);
        }
        let first = &rows[0];
        assert!((first.cost_share - 100.0 / 3.0).abs() < 1e-9);
        assert!((first.assigned_quantity - 4.0 / 3.0).abs() < 1e-9);
        assert!(first.notes.is_none());
    }

    #[test]
    fn declined_participants_are_excluded() {
        let items = vec![item("picanha", 2.0, 80.0)];
        let participants = vec![
            participant("p1", InviteStatus::Confirmado),
            participant("p2", InviteStatus::Recusado),
        ];

        let rows = split_costs(&items, &participants);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].participant_id, ParticipantId("p1".to_string()));
        assert_eq!(rows[0].cost_share, 80.0);
    }

    #[test]
    fn all_declined_falls_back_to_full_list() {
        let items = vec![item("picanha", 2.0, 80.0)];
        let participants = vec![
            participant("p1", InviteStatus::Recusado),
            participant("p2", InviteStatus::Recusado),
        ];

        let rows = EqualCostSplitter.split(&items, &participants);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.cost_share == 40.0));
    }

    #[test]
    fn non_finite_inputs_clamp_to_zero() {
        let items = vec![item("broken", f64::NAN, f64::INFINITY)];
        let participants = vec![participant("p1", InviteStatus::Pendente)];

        let rows = split_costs(&items, &participants);
        assert_eq!(rows[0].cost_share, 0.0);
        assert_eq!(rows[0].assigned_quantity, 0.0);
    }

    #[test]
    fn row_ids_are_fresh_and_empty_inputs_yield_no_rows() {
        let items = vec![item("a", 1.0, 10.0), item("b", 1.0, 10.0)];
        let participants = vec![
            participant("p1", InviteStatus::Pendente),
            participant("p2", InviteStatus::Pendente),
        ];

        let rows = split_costs(&items, &participants);
        let ids = rows.iter().map(|row| row.id.0.clone()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), rows.len());

        assert!(split_costs(&[], &participants).is_empty());
        assert!(split_costs(&items, &[]).is_empty());
    }

    #[test]
    fn summary_totals_per_participant() {
        let items = vec![item("a", 1.0, 30.0), item("b", 1.0, 12.0)];
        let participants = vec![
            participant("p1", InviteStatus::Confirmado),
            participant("p2", InviteStatus::Confirmado),
            participant("p3", InviteStatus::Recusado),
        ];

        let rows = split_costs(&items, &participants);
        let summary = summarize_costs(&participants, &rows);

        assert!((summary.total - 42.0).abs() < 1e-9);
        assert_eq!(summary.per_participant.len(), 2);
        assert!((summary.per_participant[0].total - 21.0).abs() < 1e-9);
    }
}
