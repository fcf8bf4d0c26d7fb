//! Forgetting scenarios: threshold eviction, graph pruning, tier isolation

use std::collections::HashMap;

use chrono::Utc;
use strata_core::{forget_score, Tier};
use strata_e2e_tests::{TestMemory, TraceFactory};

const DAYS: u32 = 30;

#[test]
fn test_no_survivor_scored_above_threshold() {
    let t = TestMemory::in_memory();
    let mix = TraceFactory::forgetting_mix();
    let stored = t
        .memory
        .tiers()
        .add_batch_to(Tier::LongTerm, mix)
        .expect("seed");

    // No graph edges, so every association factor is 1.0
    let now = Utc::now();
    let scores: HashMap<String, f64> = stored
        .iter()
        .map(|tr| (tr.id.clone(), forget_score(tr, now, DAYS, 1.0)))
        .collect();

    let report = t.memory.forget_old(DAYS).expect("forget");
    assert_eq!(report.traces_scanned, stored.len());
    assert!(report.failed_tiers.is_empty());

    for (id, score) in &scores {
        let survived = t.get(id).is_some();
        if *score > t.config.forget_threshold {
            assert!(!survived, "trace {} scored {:.3} but survived", id, score);
        } else {
            assert!(survived, "trace {} scored {:.3} but was forgotten", id, score);
        }
    }

    let forgotten: Vec<String> = stored
        .iter()
        .filter(|tr| report.forgotten_ids.contains(&tr.id))
        .map(|tr| tr.content.clone())
        .collect();
    assert_eq!(forgotten.len(), 3, "forgot {:?}", forgotten);
    assert!(forgotten.iter().any(|c| c.contains("parking spot")));
    assert!(forgotten.iter().any(|c| c.contains("podcast")));
    assert!(forgotten.iter().any(|c| c.contains("middling")));
}

#[test]
fn test_forgotten_traces_leave_the_graph() {
    let t = TestMemory::in_memory();
    let tiers = t.memory.tiers();
    let stale = tiers
        .add_to(Tier::ShortTerm, TraceFactory::aged("an expired coupon code", 0.05, 200))
        .expect("stale");
    let keeper = tiers
        .add_to(Tier::LongTerm, TraceFactory::recalled("mother's birthday", 0.9, 1, 5))
        .expect("keeper");
    let other = tiers
        .add_to(Tier::LongTerm, TraceFactory::recalled("father's birthday", 0.9, 1, 5))
        .expect("other");

    t.memory
        .graph()
        .mutate(|g| {
            g.link(&stale.id, &keeper.id);
            g.link(&keeper.id, &other.id);
        })
        .expect("link");

    let report = t.memory.forget_old(DAYS).expect("forget");
    assert_eq!(report.forgotten_ids, vec![stale.id.clone()]);

    let graph = t.memory.graph();
    assert!(!graph.read(|g| g.contains(&stale.id)));
    assert_eq!(graph.read(|g| g.neighbors(&keeper.id)), vec![other.id.clone()]);
    t.assert_graph_symmetric();
}

#[test]
fn test_failing_tier_does_not_stop_the_pass() {
    let t = TestMemory::failing();
    let tiers = t.memory.tiers();
    let stuck = tiers
        .add_to(Tier::ShortTerm, TraceFactory::aged("stale short-term errand", 0.05, 200))
        .expect("short");
    let gone = tiers
        .add_to(Tier::LongTerm, TraceFactory::aged("stale long-term errand", 0.05, 200))
        .expect("long");

    t.tier_switch(Tier::ShortTerm).fail_delete(true);
    let report = t.memory.forget_old(DAYS).expect("forget");

    assert_eq!(report.failed_tiers, vec![Tier::ShortTerm]);
    assert_eq!(report.forgotten_ids, vec![gone.id.clone()]);
    assert!(t.get(&gone.id).is_none());
    assert!(t.get(&stuck.id).is_some());
}

#[test]
fn test_unreadable_tier_is_reported() {
    let t = TestMemory::failing();
    t.memory
        .tiers()
        .add_to(Tier::LongTerm, TraceFactory::aged("stale note", 0.05, 200))
        .expect("seed");

    t.tier_switch(Tier::Working).fail_get(true);
    let report = t.memory.forget_old(DAYS).expect("forget");
    assert_eq!(report.failed_tiers, vec![Tier::Working]);
    assert_eq!(report.forgotten(), 1);
}

#[test]
fn test_zero_day_window_treats_everything_as_stale() {
    let t = TestMemory::in_memory();
    let tiers = t.memory.tiers();
    let old = tiers
        .add_to(Tier::ShortTerm, TraceFactory::aged("yesterday's weather", 0.1, 1))
        .expect("old");
    // Old but important and well recalled: 0.4 + 0.3 * 0.05 stays under 0.7
    let vital = tiers
        .add_to(Tier::LongTerm, TraceFactory::recalled("blood type is O negative", 0.95, 1, 5))
        .expect("vital");

    let report = t.memory.forget_old(0).expect("forget");
    assert_eq!(report.forgotten_ids, vec![old.id.clone()]);
    assert!(t.get(&vital.id).is_some());
}

#[test]
fn test_empty_system_forgets_nothing() {
    let t = TestMemory::in_memory();
    let report = t.memory.forget_old(DAYS).expect("forget");
    assert_eq!(report.traces_scanned, 0);
    assert_eq!(report.forgotten(), 0);
}
