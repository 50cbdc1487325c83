//! Selection properties: entity preference, uniformity, validation.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tweet_cache::testutil::{item, item_with_entities};
use tweet_cache::{select_items, validate_pool, Item};

fn pool(with_entities: usize, without: usize) -> Vec<Item> {
    let mut items: Vec<Item> = (0..with_entities)
        .map(|i| item_with_entities(&format!("e{i}")))
        .collect();
    items.extend((0..without).map(|i| item(&format!("p{i}"))));
    items
}

fn ids(items: &[Item]) -> HashSet<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

// --- Entity Preference ---

#[test]
fn test_sufficient_entity_items_only() {
    let pool = pool(6, 4);
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..200 {
        let selected = select_items(&pool, 4, &mut rng);
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|i| i.has_entities()));
        assert_eq!(ids(&selected).len(), 4);
    }
}

#[test]
fn test_shortfall_takes_every_entity_item() {
    let pool = pool(2, 3);
    let mut rng = StdRng::seed_from_u64(2);

    for _ in 0..200 {
        let selected = select_items(&pool, 4, &mut rng);
        assert_eq!(selected.len(), 4);
        let chosen = ids(&selected);
        assert!(chosen.contains("e0") && chosen.contains("e1"));
        assert_eq!(selected.iter().filter(|i| !i.has_entities()).count(), 2);
    }
}

#[test]
fn test_starved_pool_returns_everything() {
    let pool = pool(1, 2);
    let mut rng = StdRng::seed_from_u64(3);

    let selected = select_items(&pool, 4, &mut rng);
    assert_eq!(selected.len(), 3);
    assert_eq!(ids(&selected), ids(&pool));
}

#[test]
fn test_entity_items_not_always_first() {
    // The combined selection is shuffled, so a plain item sometimes leads.
    let pool = pool(2, 3);
    let mut rng = StdRng::seed_from_u64(4);

    let plain_first = (0..200)
        .filter(|_| !select_items(&pool, 4, &mut rng)[0].has_entities())
        .count();
    assert!(plain_first > 0);
}

// --- Uniformity ---

#[test]
fn test_every_entity_item_eventually_selected() {
    let pool = pool(6, 4);
    let mut rng = StdRng::seed_from_u64(41);
    let mut seen = HashSet::new();

    for _ in 0..1000 {
        seen.extend(select_items(&pool, 4, &mut rng).into_iter().map(|i| i.id));
    }

    let expected: HashSet<String> = (0..6).map(|i| format!("e{i}")).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_selection_is_roughly_uniform() {
    const TRIALS: usize = 1000;
    let pool = pool(10, 0);
    let mut rng = StdRng::seed_from_u64(42);
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..TRIALS {
        for chosen in select_items(&pool, 4, &mut rng) {
            *counts.entry(chosen.id).or_default() += 1;
        }
    }

    // Each item is expected 400 times; allow a generous band.
    assert_eq!(counts.len(), 10);
    for (id, count) in &counts {
        assert!((300..=500).contains(count), "{id} chosen {count} times");
    }
}

#[test]
fn test_plain_fill_is_roughly_uniform() {
    const TRIALS: usize = 1000;
    let pool = pool(2, 4);
    let mut rng = StdRng::seed_from_u64(43);
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..TRIALS {
        for chosen in select_items(&pool, 4, &mut rng) {
            if !chosen.has_entities() {
                *counts.entry(chosen.id).or_default() += 1;
            }
        }
    }

    // Two of four plain items per trial: 500 expected each.
    assert_eq!(counts.len(), 4);
    for (id, count) in &counts {
        assert!((400..=600).contains(count), "{id} chosen {count} times");
    }
}

// --- Validation ---

#[test]
fn test_invalid_items_are_never_selected() {
    let mut blank_text = item_with_entities("blank");
    blank_text.text = "   ".to_string();
    let mut no_id = item_with_entities("gone");
    no_id.id.clear();

    let mut items = pool(1, 0);
    items.push(blank_text);
    items.push(no_id);
    items.push(item_with_entities("e0"));

    let validated = validate_pool(&items);
    assert_eq!(validated.invalid, 2);
    assert_eq!(validated.duplicates, 1);

    let selected = select_items(&items, 4, &mut StdRng::seed_from_u64(5));
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, "e0");
}

proptest! {
    #[test]
    fn prop_selection_bounds(
        with_entities in 0usize..12,
        without in 0usize..12,
        count in 0usize..8,
        seed in any::<u64>(),
    ) {
        let pool = pool(with_entities, without);
        let selected = select_items(&pool, count, &mut StdRng::seed_from_u64(seed));

        prop_assert_eq!(selected.len(), count.min(with_entities + without));
        prop_assert_eq!(ids(&selected).len(), selected.len());

        let chosen_entities = selected.iter().filter(|i| i.has_entities()).count();
        prop_assert_eq!(chosen_entities, count.min(with_entities));

        let all = ids(&pool);
        prop_assert!(selected.iter().all(|i| all.contains(&i.id)));
    }

    #[test]
    fn prop_validation_keeps_only_valid_unique(ids_in in proptest::collection::vec("[a-c]{0,1}", 0..20)) {
        let items: Vec<Item> = ids_in.iter().map(|id| item(id)).collect();
        let validated = validate_pool(&items);

        let distinct: HashSet<&String> = ids_in.iter().filter(|id| !id.is_empty()).collect();
        prop_assert_eq!(validated.items.len(), distinct.len());
        prop_assert_eq!(validated.items.len() + validated.dropped(), items.len());
        prop_assert!(validated.items.iter().all(Item::is_valid));
    }
}
