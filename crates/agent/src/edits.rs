//! Item commands applied to the pending item list of an event.

use uuid::Uuid;

use reune_core::domain::event::{Event, Item, ItemId, ItemPriority};
use reune_core::errors::DomainError;
use reune_core::planning::{estimate_quantity_per_person, profile_for, ProfileLine};

use crate::conversation::{category_members, normalize_text, EditTarget, ItemCommand};

#[derive(Clone, Debug, PartialEq)]
pub enum EditOutcome {
    Applied { items: Vec<Item>, feedback: String },
    /// Nothing on the list matched; the list is unchanged.
    NotFound { target: String },
}

/// Returns the edited list. Quantities stay finite and non-negative; values follow the
/// item's current unit price, or the reference table for items without one.
pub fn apply_item_command(
    items: &[Item],
    command: &ItemCommand,
    event: &Event,
) -> Result<EditOutcome, DomainError> {
    let mut items = items.to_vec();

    let feedback = match command {
        ItemCommand::Add { name, quantity } => {
            let quantity = match quantity {
                Some(quantity) => non_negative(*quantity, name)?,
                None => {
                    let per_person = estimate_quantity_per_person(name);
                    (per_person * f64::from(event.people_count)).ceil()
                }
            };
            match find_item(&items, name) {
                Some(index) => {
                    let total = items[index].quantity + quantity;
                    items[index] = with_quantity(&items[index], total, event);
                    format!(
                        "Pronto! Adicionei mais {} {} de {}.",
                        format_quantity(quantity),
                        items[index].unit,
                        items[index].name
                    )
                }
                None => {
                    let item = new_item(name, quantity, event);
                    let feedback = format!(
                        "Pronto! Adicionei {} {} de {} na lista.",
                        format_quantity(item.quantity),
                        item.unit,
                        item.name
                    );
                    items.push(item);
                    feedback
                }
            }
        }
        ItemCommand::Remove { name } => {
            let Some(index) = find_item(&items, name) else {
                return Ok(EditOutcome::NotFound { target: name.clone() });
            };
            let removed = items.remove(index);
            format!("Removido! Tirei {} da lista.", removed.name)
        }
        ItemCommand::SetQuantity { name, quantity } => {
            let quantity = non_negative(*quantity, name)?;
            let Some(index) = find_item(&items, name) else {
                return Ok(EditOutcome::NotFound { target: name.clone() });
            };
            items[index] = with_quantity(&items[index], quantity, event);
            let item = &items[index];
            let shown = format_quantity(quantity);
            format!("Alterado! {} agora tem {shown} {}.", item.name, item.unit)
        }
        ItemCommand::AdjustQuantity { name, delta } => {
            let Some(index) = find_item(&items, name) else {
                return Ok(EditOutcome::NotFound { target: name.clone() });
            };
            let quantity = non_negative((items[index].quantity + delta).max(0.0), name)?;
            items[index] = with_quantity(&items[index], quantity, event);
            let item = &items[index];
            let shown = format_quantity(quantity);
            format!("Ajustado! {} agora tem {shown} {}.", item.name, item.unit)
        }
        ItemCommand::Multiply { target, factor } => {
            if !factor.is_finite() || *factor <= 0.0 {
                return Err(DomainError::InvariantViolation(format!(
                    "multiplier {factor} must be a positive number"
                )));
            }
            let selected = select(&items, target);
            if selected.is_empty() {
                return Ok(EditOutcome::NotFound { target: target_label(target) });
            }
            for index in selected {
                let scaled = items[index].quantity * factor;
                items[index] = with_quantity(&items[index], scaled, event);
            }
            let verb = if *factor == 2.0 {
                "Dobrei".to_string()
            } else if *factor == 3.0 {
                "Tripliquei".to_string()
            } else {
                format!("Multipliquei por {}", format_quantity(*factor))
            };
            format!("Feito! {verb} {}.", target_label(target))
        }
    };

    Ok(EditOutcome::Applied { items, feedback })
}

/// Exact name first, then containment either way, then any shared word.
pub fn find_item(items: &[Item], name: &str) -> Option<usize> {
    let wanted = normalize_text(name);
    let names = items.iter().map(|item| normalize_text(&item.name)).collect::<Vec<_>>();

    names
        .iter()
        .position(|candidate| *candidate == wanted)
        .or_else(|| {
            names
                .iter()
                .position(|candidate| candidate.contains(&wanted) || wanted.contains(candidate))
        })
        .or_else(|| {
            let words =
                wanted.split_whitespace().filter(|word| word.len() >= 3).collect::<Vec<_>>();
            names.iter().position(|candidate| words.iter().any(|word| candidate.contains(word)))
        })
}

fn select(items: &[Item], target: &EditTarget) -> Vec<usize> {
    match target {
        EditTarget::All => (0..items.len()).collect(),
        EditTarget::Category(category) => {
            let members = category_members(category);
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| members.contains(&normalize_text(&item.category).as_str()))
                .map(|(index, _)| index)
                .collect()
        }
        EditTarget::Item(name) => find_item(items, name).into_iter().collect(),
    }
}

fn target_label(target: &EditTarget) -> String {
    match target {
        EditTarget::All => "todos os itens".to_string(),
        EditTarget::Category(category) => format!("os itens de {category}"),
        EditTarget::Item(name) => name.clone(),
    }
}

fn non_negative(quantity: f64, name: &str) -> Result<f64, DomainError> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(quantity)
    } else {
        Err(DomainError::InvariantViolation(format!(
            "quantity of `{name}` must be a non-negative number"
        )))
    }
}

fn reference_line(event: &Event, name: &str) -> Option<&'static ProfileLine> {
    let wanted = normalize_text(name);
    profile_for(&event.event_type).lines.iter().find(|line| {
        let candidate = normalize_text(line.name);
        candidate == wanted || candidate.contains(&wanted) || wanted.contains(&candidate)
    })
}

fn with_quantity(item: &Item, quantity: f64, event: &Event) -> Item {
    let unit_price = if item.quantity > 0.0 {
        item.estimated_value / item.quantity
    } else {
        reference_line(event, &item.name).map_or(0.0, |line| line.unit_price)
    };
    Item { quantity, estimated_value: round_cents(quantity * unit_price), ..item.clone() }
}

fn new_item(name: &str, quantity: f64, event: &Event) -> Item {
    let id = ItemId(Uuid::new_v4().to_string());
    match reference_line(event, name) {
        Some(line) => Item {
            id,
            event_id: event.id.clone(),
            name: line.name.to_string(),
            quantity,
            unit: line.unit.to_string(),
            estimated_value: round_cents(quantity * line.unit_price),
            category: line.category.to_string(),
            priority: line.priority,
        },
        None => Item {
            id,
            event_id: event.id.clone(),
            name: name.to_string(),
            quantity,
            unit: "un".to_string(),
            estimated_value: 0.0,
            category: "geral".to_string(),
            priority: ItemPriority::C,
        },
    }
}

fn format_quantity(quantity: f64) -> String {
    format!("{}", round_cents(quantity))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use reune_core::domain::conversation::UserId;
    use reune_core::domain::event::{Event, EventId, EventStatus, Item};
    use reune_core::errors::DomainError;
    use reune_core::planning::profile_for;

    use super::{apply_item_command, find_item, EditOutcome};
    use crate::conversation::{EditTarget, ItemCommand};

    fn event() -> Event {
        Event {
            id: EventId("12".to_string()),
            owner_id: UserId("u-1".to_string()),
            name: "churrasco para 10 pessoas".to_string(),
            event_type: "churrasco".to_string(),
            people_count: 10,
            date: None,
            status: EventStatus::ItensPendentes,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pending() -> Vec<Item> {
        profile_for("churrasco").estimate(&EventId("12".to_string()), 10)
    }

    fn applied(command: ItemCommand) -> (Vec<Item>, String) {
        match apply_item_command(&pending(), &command, &event()) {
            Ok(EditOutcome::Applied { items, feedback }) => (items, feedback),
            other => panic!("expected an applied edit, got {other:?}"),
        }
    }

    fn line<'a>(items: &'a [Item], name: &str) -> &'a Item {
        items.iter().find(|item| item.name == name).expect("item on the list")
    }

    #[test]
    fn items_are_found_by_accentless_and_partial_names() {
        let items = pending();
        let found = |name: &str| find_item(&items, name).map(|index| items[index].name.clone());
        assert_eq!(found("agua").as_deref(), Some("Água"));
        assert_eq!(found("linguica").as_deref(), Some("Linguiça Toscana"));
        assert_eq!(find_item(&items, "sorvete"), None);
    }

    #[test]
    fn remove_and_add_edit_the_list() {
        let (items, feedback) = applied(ItemCommand::Remove { name: "cerveja".to_string() });
        assert_eq!(items.len(), pending().len() - 1);
        assert!(items.iter().all(|item| item.name != "Cerveja"));
        assert!(feedback.contains("Cerveja"));

        let (items, _) =
            applied(ItemCommand::Add { name: "gelo".to_string(), quantity: Some(3.0) });
        let gelo = line(&items, "gelo");
        assert_eq!(gelo.quantity, 3.0);
        assert_eq!(gelo.estimated_value, 0.0);
        assert_eq!(gelo.category, "geral");

        let (items, _) = applied(ItemCommand::Add { name: "cerveja".to_string(), quantity: None });
        let cerveja = line(&items, "Cerveja");
        assert_eq!(cerveja.quantity, 25.0);
        assert_eq!(cerveja.estimated_value, 300.0);
    }

    #[test]
    fn quantity_changes_keep_the_unit_price() {
        let (items, feedback) = applied(ItemCommand::SetQuantity {
            name: "picanha".to_string(),
            quantity: 5.0,
        });
        assert_eq!(line(&items, "Picanha").quantity, 5.0);
        assert_eq!(line(&items, "Picanha").estimated_value, 449.5);
        assert!(feedback.starts_with("Alterado!"));

        let (items, _) =
            applied(ItemCommand::AdjustQuantity { name: "agua".to_string(), delta: -100.0 });
        assert_eq!(line(&items, "Água").quantity, 0.0);
        assert_eq!(line(&items, "Água").estimated_value, 0.0);
    }

    #[test]
    fn multiply_reaches_a_category_or_everything() {
        let (items, feedback) =
            applied(ItemCommand::Multiply { target: EditTarget::Category("bebida"), factor: 2.0 });
        assert_eq!(line(&items, "Cerveja").quantity, 30.0);
        assert_eq!(line(&items, "Refrigerante").quantity, 10.0);
        assert_eq!(line(&items, "Picanha").quantity, 2.0);
        assert_eq!(feedback, "Feito! Dobrei os itens de bebida.");

        let (items, _) = applied(ItemCommand::Multiply { target: EditTarget::All, factor: 3.0 });
        assert_eq!(line(&items, "Sal Grosso").quantity, 3.0);
    }

    #[test]
    fn unknown_targets_and_bad_factors_leave_the_list_alone() {
        let missing = apply_item_command(
            &pending(),
            &ItemCommand::Remove { name: "sorvete".to_string() },
            &event(),
        );
        assert_eq!(missing, Ok(EditOutcome::NotFound { target: "sorvete".to_string() }));

        let zero = apply_item_command(
            &pending(),
            &ItemCommand::Multiply { target: EditTarget::All, factor: 0.0 },
            &event(),
        );
        assert!(matches!(zero, Err(DomainError::InvariantViolation(_))));
    }
}
