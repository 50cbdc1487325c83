//! Selection engine implementation.

use crate::error::Result;
use crate::selection::SelectionSlot;
use crate::types::{Item, SelectionSet, Timestamp};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of the validation pass.
#[derive(Clone, Debug, Default)]
pub struct ValidatedPool {
    /// Items that passed validation, in input order.
    pub items: Vec<Item>,
    /// Items dropped for failing item invariants.
    pub invalid: usize,
    /// Items dropped because an earlier item had the same id.
    pub duplicates: usize,
}

impl ValidatedPool {
    pub fn dropped(&self) -> usize {
        self.invalid + self.duplicates
    }
}

/// Drop invalid items and repeated ids, keeping first occurrences.
pub fn validate_pool(pool: &[Item]) -> ValidatedPool {
    let mut seen = HashSet::new();
    let mut validated = ValidatedPool::default();

    for item in pool {
        if !item.is_valid() {
            validated.invalid += 1;
        } else if !seen.insert(item.id.as_str()) {
            validated.duplicates += 1;
        } else {
            validated.items.push(item.clone());
        }
    }

    validated
}

/// Split items into (with entities, without entities), preserving order.
pub fn partition_by_entities(items: Vec<Item>) -> (Vec<Item>, Vec<Item>) {
    items.into_iter().partition(Item::has_entities)
}

/// Pick up to `count` items from `pool`, favoring items with entities.
///
/// Invalid items and repeated ids are dropped first. If enough entity items
/// exist, the result is a uniform sample of them; otherwise every entity item
/// is taken and the remainder is sampled from the others. A pool smaller than
/// `count` is returned whole (shuffled). Shuffling is Fisher–Yates
/// ([`SliceRandom::shuffle`]) over the supplied random source.
pub fn select_items<R: Rng + ?Sized>(pool: &[Item], count: usize, rng: &mut R) -> Vec<Item> {
    let validated = validate_pool(pool);
    if validated.dropped() > 0 {
        debug!(
            invalid = validated.invalid,
            duplicates = validated.duplicates,
            "dropped items before selection"
        );
    }

    let (mut with_entities, mut without_entities) = partition_by_entities(validated.items);

    if with_entities.len() >= count {
        with_entities.shuffle(rng);
        with_entities.truncate(count);
        return with_entities;
    }

    let shortfall = count - with_entities.len();
    without_entities.shuffle(rng);
    without_entities.truncate(shortfall);

    let mut selected = with_entities;
    selected.append(&mut without_entities);
    selected.shuffle(rng);
    selected
}

/// Selects display items and writes them to the selection slot.
pub struct SelectionEngine {
    count: usize,
    rng: Mutex<StdRng>,
    slot: SelectionSlot,
}

impl SelectionEngine {
    /// Engine seeded from OS entropy.
    pub fn new(count: usize, slot: SelectionSlot) -> Self {
        Self::with_rng(count, slot, StdRng::from_entropy())
    }

    /// Engine with a fixed seed, for reproducible selections.
    pub fn seeded(count: usize, slot: SelectionSlot, seed: u64) -> Self {
        Self::with_rng(count, slot, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(count: usize, slot: SelectionSlot, rng: StdRng) -> Self {
        Self {
            count,
            rng: Mutex::new(rng),
            slot,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn slot(&self) -> &SelectionSlot {
        &self.slot
    }

    /// Select up to `count` items from `pool` with the engine's random source.
    pub fn select(&self, pool: &[Item], count: usize) -> Vec<Item> {
        select_items(pool, count, &mut *self.rng.lock())
    }

    /// Select the configured number of items and overwrite the stored selection.
    pub async fn select_and_persist(&self, pool: &[Item], now: Timestamp) -> Result<SelectionSet> {
        let items = self.select(pool, self.count);
        let selection = SelectionSet {
            items,
            written_at: now,
        };
        self.slot.write(&selection).await?;
        Ok(selection)
    }
}
