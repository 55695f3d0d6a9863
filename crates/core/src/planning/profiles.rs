use uuid::Uuid;

use crate::domain::event::{EventId, Item, ItemId, ItemPriority};

const MEAT_KG_PER_PERSON: f64 = 0.4;
const SAUSAGE_KG_PER_PERSON: f64 = 0.15;
const CHARCOAL_KG_PER_KG_OF_MEAT: f64 = 1.5;

/// How a profile line scales with the guest count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scaling {
    PerPerson(f64),
    /// Share of the total meat weight (`MEAT_KG_PER_PERSON * people`).
    MeatShare(f64),
    /// Charcoal for all grilled weight, meat plus sausage.
    Charcoal,
    Fixed(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfileLine {
    pub name: &'static str,
    pub unit: &'static str,
    pub category: &'static str,
    pub priority: ItemPriority,
    pub scaling: Scaling,
    /// Reference price per unit, used for `valor_estimado`.
    pub unit_price: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemProfile {
    pub id: &'static str,
    pub lines: &'static [ProfileLine],
}

const CHURRASCO_LINES: &[ProfileLine] = &[
    ProfileLine {
        name: "Picanha",
        unit: "kg",
        category: "Carnes",
        priority: ItemPriority::A,
        scaling: Scaling::MeatShare(0.4),
        unit_price: 89.9,
    },
    ProfileLine {
        name: "Linguiça Toscana",
        unit: "kg",
        category: "Carnes",
        priority: ItemPriority::A,
        scaling: Scaling::PerPerson(SAUSAGE_KG_PER_PERSON),
        unit_price: 29.9,
    },
    ProfileLine {
        name: "Asa de Frango",
        unit: "kg",
        category: "Carnes",
        priority: ItemPriority::A,
        scaling: Scaling::MeatShare(0.3),
        unit_price: 24.9,
    },
    ProfileLine {
        name: "Pão de Alho",
        unit: "un",
        category: "Acompanhamentos",
        priority: ItemPriority::B,
        scaling: Scaling::PerPerson(2.0),
        unit_price: 4.5,
    },
    ProfileLine {
        name: "Queijo Coalho",
        unit: "un",
        category: "Acompanhamentos",
        priority: ItemPriority::B,
        scaling: Scaling::PerPerson(1.0),
        unit_price: 3.5,
    },
    ProfileLine {
        name: "Cerveja",
        unit: "L",
        category: "Bebidas",
        priority: ItemPriority::B,
        scaling: Scaling::PerPerson(1.5),
        unit_price: 12.0,
    },
    ProfileLine {
        name: "Refrigerante",
        unit: "L",
        category: "Bebidas",
        priority: ItemPriority::B,
        scaling: Scaling::PerPerson(0.5),
        unit_price: 6.0,
    },
    ProfileLine {
        name: "Água",
        unit: "L",
        category: "Bebidas",
        priority: ItemPriority::B,
        scaling: Scaling::PerPerson(0.5),
        unit_price: 3.0,
    },
    ProfileLine {
        name: "Carvão",
        unit: "kg",
        category: "Utensílios",
        priority: ItemPriority::A,
        scaling: Scaling::Charcoal,
        unit_price: 6.0,
    },
    ProfileLine {
        name: "Sal Grosso",
        unit: "kg",
        category: "Temperos",
        priority: ItemPriority::C,
        scaling: Scaling::Fixed(1.0),
        unit_price: 5.0,
    },
];

pub const CHURRASCO: ItemProfile = ItemProfile { id: "churrasco", lines: CHURRASCO_LINES };

const PROFILES: &[&ItemProfile] = &[&CHURRASCO];

/// Unknown event types fall back to the barbecue profile.
pub fn profile_for(event_type: &str) -> &'static ItemProfile {
    let wanted = event_type.trim().to_lowercase();
    PROFILES.iter().copied().find(|profile| profile.id == wanted).unwrap_or(&CHURRASCO)
}

impl ItemProfile {
    /// Quantities are rounded up to whole units.
    pub fn estimate(&self, event_id: &EventId, people: u32) -> Vec<Item> {
        let people = f64::from(people);
        self.lines
            .iter()
            .map(|line| {
                let quantity = line.scaled_quantity(people).ceil();
                Item {
                    id: ItemId(Uuid::new_v4().to_string()),
                    event_id: event_id.clone(),
                    name: line.name.to_string(),
                    quantity,
                    unit: line.unit.to_string(),
                    estimated_value: round_cents(quantity * line.unit_price),
                    category: line.category.to_string(),
                    priority: line.priority,
                }
            })
            .collect()
    }
}

impl ProfileLine {
    fn scaled_quantity(&self, people: f64) -> f64 {
        match self.scaling {
            Scaling::PerPerson(per_person) => people * per_person,
            Scaling::MeatShare(share) => people * MEAT_KG_PER_PERSON * share,
            Scaling::Charcoal => {
                (people * MEAT_KG_PER_PERSON + people * SAUSAGE_KG_PER_PERSON)
                    * CHARCOAL_KG_PER_KG_OF_MEAT
            }
            Scaling::Fixed(quantity) => quantity,
        }
    }
}

/// Rough per-person quantity for a free-form item name.
pub fn estimate_quantity_per_person(item_name: &str) -> f64 {
    const BY_KEYWORD: &[(&str, f64)] = &[("carne", MEAT_KG_PER_PERSON), ("bebida", 1.0)];

    let name = item_name.to_lowercase();
    BY_KEYWORD
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, quantity)| *quantity)
        .unwrap_or(1.0)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
