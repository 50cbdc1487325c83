//! Entity-biased random selection of display items.
//!
//! A selection pass validates the pool, prefers items carrying at least one
//! entity (url, mention, hashtag, media), fills any shortfall from the rest,
//! and persists the result to a single overwritten slot.

mod engine;
mod slot;

pub use engine::{partition_by_entities, select_items, validate_pool, SelectionEngine, ValidatedPool};
pub use slot::SelectionSlot;
