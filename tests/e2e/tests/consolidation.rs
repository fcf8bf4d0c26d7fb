//! Consolidation scenarios: recall counting, promotion, partial migration
//! and its repair by the maintenance pass

use strata_core::{BatchItem, ConsistencyWarning, MemoryConfig, MemoryType, Scores, Tier};
use strata_e2e_tests::{Backend, CountingAnalyzer, FixtureEmbedder, TestMemory};

fn short_term_batches() -> TestMemory {
    let config = MemoryConfig {
        batch_tier: Tier::ShortTerm,
        ..MemoryConfig::default()
    };
    TestMemory::build(Backend::InMemory, config, CountingAnalyzer::new(), FixtureEmbedder::new())
}

fn recall_once(t: &TestMemory, query: &str) {
    assert!(!t.memory.recall_memory(query, 1).is_empty());
    t.memory.wait_for_background();
}

#[test]
fn test_each_recall_adds_exactly_one() {
    let t = short_term_batches();
    let ids = t
        .memory
        .batch_add(
            vec![BatchItem::new("the bike lock combination is 0815").with_scores(0.05, 0.1)],
            MemoryType::Episodic,
            true,
        )
        .expect("batch");

    for expected in 1..=4 {
        recall_once(&t, "bike lock combination");
        let stored = t.get(&ids[0]).expect("stored");
        assert_eq!(stored.recall_count, expected);
        assert_eq!(stored.tier, Some(Tier::ShortTerm));
    }
}

#[test]
fn test_promotion_after_enough_recalls() {
    let t = short_term_batches();
    let ids = t
        .memory
        .batch_add(
            vec![BatchItem::new("the spare tyre is under the boot floor").with_scores(0.3, 0.1)],
            MemoryType::Episodic,
            true,
        )
        .expect("batch");
    let id = &ids[0];

    // 0.3 × 1 stays put
    recall_once(&t, "spare tyre");
    assert_eq!(t.memory.tiers().tiers_holding(id), vec![Tier::ShortTerm]);

    // 0.3 × 2 = 0.6 > 0.5 moves it
    recall_once(&t, "spare tyre");
    assert_eq!(t.memory.tiers().tiers_holding(id), vec![Tier::LongTerm]);

    let promoted = t.get(id).expect("promoted");
    assert_eq!(promoted.recall_count, 2);
    assert_eq!(promoted.content, "the spare tyre is under the boot floor");
    t.assert_single_owner();
}

#[test]
fn test_working_memory_is_promoted_too() {
    let t = TestMemory::in_memory();
    t.analyzer.set_fixed_scores(Some(Scores {
        importance: 0.6,
        emotional_intensity: 0.1,
    }));
    let id = t
        .memory
        .add_working_memory("call the landlord about the boiler", MemoryType::Procedural)
        .expect("add");

    recall_once(&t, "landlord boiler");
    assert_eq!(t.memory.tiers().tiers_holding(&id), vec![Tier::LongTerm]);
}

#[test]
fn test_partial_migration_is_reconciled_by_maintenance() {
    let t = TestMemory::failing();
    t.analyzer.set_fixed_scores(Some(Scores {
        importance: 0.6,
        emotional_intensity: 0.1,
    }));
    let id = t
        .memory
        .add_memory("the boiler service is due in October", MemoryType::Episodic)
        .expect("add");
    assert_eq!(t.memory.tiers().tiers_holding(&id), vec![Tier::ShortTerm]);

    t.tier_switch(Tier::ShortTerm).fail_delete(true);
    recall_once(&t, "boiler service");

    // Copy written, original left behind
    assert_eq!(
        t.memory.tiers().tiers_holding(&id),
        vec![Tier::ShortTerm, Tier::LongTerm]
    );
    let results = t.memory.recall_memory("boiler service", 5);
    assert_eq!(results.len(), 1, "recall must not repeat a trace");
    t.memory.wait_for_background();

    t.tier_switch(Tier::ShortTerm).fail_delete(false);
    let report = t.memory.manual_maintenance().expect("maintenance");

    assert_eq!(report.duplicates_resolved, 1);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        ConsistencyWarning::DuplicateAcrossTiers { id: dup, tiers }
            if dup == &id && tiers == &vec![Tier::LongTerm, Tier::ShortTerm]
    )));
    assert_eq!(t.memory.tiers().tiers_holding(&id), vec![Tier::LongTerm]);
    assert!(t.get(&id).expect("kept").recall_count >= 1);
    t.assert_single_owner();
}

#[test]
fn test_strengthening_persists_across_reopen() {
    let t = TestMemory::sqlite();
    let id = t
        .memory
        .add_memory("the recycling goes out on Tuesday", MemoryType::Episodic)
        .expect("add");
    recall_once(&t, "recycling day");
    recall_once(&t, "recycling day");

    let t = t.reopen();
    let stored = t.get(&id).expect("persisted");
    assert_eq!(stored.recall_count, 2);
    t.assert_single_owner();
}
