pub mod profiles;
pub mod split;

pub use profiles::{estimate_quantity_per_person, profile_for, ItemProfile, ProfileLine};
pub use split::{split_costs, summarize_costs, CostSplitter, EqualCostSplitter};
