//! Merge scenarios: near-duplicate collapse, weighted statistics, failure
//! isolation, graph rewiring, persistence

use strata_core::{MemoryTrace, MergeReport, Tier};
use strata_e2e_tests::{TestMemory, TraceFactory};

const LIKE: &str = "I like coffee";
const REALLY_LIKE: &str = "I really like coffee";

fn coffee_pair(t: &TestMemory, tier: Tier) -> (MemoryTrace, MemoryTrace) {
    let tiers = t.memory.tiers();
    let a = tiers
        .add_to(tier, TraceFactory::trace(LIKE, 0.9, 0.2))
        .expect("a");
    let b = tiers
        .add_to(tier, TraceFactory::trace(REALLY_LIKE, 0.1, 0.8))
        .expect("b");
    (a, b)
}

fn maintain(t: &TestMemory) -> MergeReport {
    t.memory.manual_maintenance().expect("maintenance")
}

#[test]
fn test_near_duplicates_collapse_into_one() {
    let t = TestMemory::in_memory();
    let (a, b) = coffee_pair(&t, Tier::ShortTerm);

    let report = maintain(&t);
    assert_eq!(report.groups_found, 1);
    assert_eq!(report.groups_merged, 1);
    assert_eq!(report.traces_absorbed, 2);
    assert_eq!(report.failed_groups, 0);

    assert_eq!(t.total(), 1);
    assert!(t.get(&a.id).is_none());
    assert!(t.get(&b.id).is_none());

    let merged = t.get(&report.merged_ids[0]).expect("merged");
    assert_eq!(merged.tier, Some(Tier::ShortTerm));
    assert!(merged.content.contains("coffee"));
    let mut sources = merged.merged_from();
    sources.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(sources, expected);
    t.assert_single_owner();
}

#[test]
fn test_merged_scores_are_weighted_averages() {
    let t = TestMemory::in_memory();
    let tiers = t.memory.tiers();
    let mut a = TraceFactory::trace(LIKE, 0.9, 0.2);
    a.recall_count = 2;
    a.context_tags = ["coffee", "taste"].iter().map(|s| s.to_string()).collect();
    let mut b = TraceFactory::trace(REALLY_LIKE, 0.1, 0.8);
    b.recall_count = 3;
    b.context_tags = ["coffee", "morning"].iter().map(|s| s.to_string()).collect();
    let latest = b.timestamp.max(a.timestamp);
    tiers.add_to(Tier::ShortTerm, a).expect("a");
    tiers.add_to(Tier::ShortTerm, b).expect("b");

    let report = maintain(&t);
    let merged = t.get(&report.merged_ids[0]).expect("merged");

    // w_A = 0.69, w_B = 0.31
    assert!((merged.importance - 0.652).abs() < 1e-9, "importance {}", merged.importance);
    assert!(
        (merged.emotional_intensity - 0.386).abs() < 1e-9,
        "emotional_intensity {}",
        merged.emotional_intensity
    );
    assert_eq!(merged.recall_count, 5);
    assert!(merged.timestamp >= latest);
    let tags: Vec<&str> = merged.context_tags.iter().map(String::as_str).collect();
    assert_eq!(tags, vec!["coffee", "morning", "taste"]);
}

#[test]
fn test_summarize_failure_leaves_group_untouched() {
    let t = TestMemory::in_memory();
    let (a, b) = coffee_pair(&t, Tier::ShortTerm);
    t.analyzer.fail_summarize(true);

    let report = maintain(&t);
    assert_eq!(report.groups_found, 1);
    assert_eq!(report.groups_merged, 0);
    assert_eq!(report.failed_groups, 1);
    assert!(t.get(&a.id).is_some());
    assert!(t.get(&b.id).is_some());
    assert_eq!(t.total(), 2);
}

#[test]
fn test_embedding_failure_skips_merging() {
    let t = TestMemory::in_memory();
    let (a, _) = coffee_pair(&t, Tier::ShortTerm);
    t.embedder.poison(LIKE);

    let report = maintain(&t);
    assert_eq!(report.groups_merged, 0);
    assert!(t.get(&a.id).is_some());
}

#[test]
fn test_merge_rewires_graph_edges() {
    let t = TestMemory::in_memory();
    let (a, b) = coffee_pair(&t, Tier::ShortTerm);
    let espresso = t
        .memory
        .tiers()
        .add_to(
            Tier::LongTerm,
            TraceFactory::trace("the espresso machine needs descaling every month", 0.5, 0.1),
        )
        .expect("espresso");
    t.memory
        .graph()
        .mutate(|g| {
            g.link(&a.id, &b.id);
            g.link(&a.id, &espresso.id);
        })
        .expect("link");

    let report = maintain(&t);
    let merged_id = report.merged_ids[0].clone();

    let graph = t.memory.graph();
    assert_eq!(graph.read(|g| g.neighbors(&merged_id)), vec![espresso.id.clone()]);
    assert_eq!(graph.read(|g| g.neighbors(&espresso.id)), vec![merged_id.clone()]);
    assert!(!graph.read(|g| g.contains(&a.id)));
    assert!(!graph.read(|g| g.contains(&b.id)));
    t.assert_graph_symmetric();
}

#[test]
fn test_short_only_leaves_long_term_alone() {
    let t = TestMemory::in_memory();
    let (a, b) = coffee_pair(&t, Tier::LongTerm);

    let report = t.memory.merge_similar(true).expect("short-only");
    assert_eq!(report.groups_merged, 0);
    assert_eq!(report.traces_scanned, 0);
    assert!(t.get(&a.id).is_some());
    assert!(t.get(&b.id).is_some());

    let report = t.memory.merge_similar(false).expect("full");
    assert_eq!(report.groups_merged, 1);
    assert_eq!(t.memory.stats().expect("stats").long_term, 1);
}

#[test]
fn test_groups_never_span_tiers() {
    let t = TestMemory::in_memory();
    let tiers = t.memory.tiers();
    tiers
        .add_to(Tier::Working, TraceFactory::trace(LIKE, 0.5, 0.5))
        .expect("working");
    tiers
        .add_to(Tier::ShortTerm, TraceFactory::trace(REALLY_LIKE, 0.5, 0.5))
        .expect("short-term");

    let report = maintain(&t);
    assert_eq!(report.groups_found, 0);
    assert_eq!(t.total(), 2);
}

#[test]
fn test_distinct_memories_are_not_merged() {
    let t = TestMemory::in_memory();
    let tiers = t.memory.tiers();
    for content in [
        "the car is due for an MOT in May",
        "grandmother's kitchen smelled of cinnamon",
        "the violin lesson moved to Wednesday",
    ] {
        tiers
            .add_to(Tier::ShortTerm, TraceFactory::trace(content, 0.5, 0.5))
            .expect("add");
    }

    let report = maintain(&t);
    assert_eq!(report.traces_scanned, 3);
    assert_eq!(report.groups_found, 0);
    assert_eq!(t.total(), 3);
}

#[test]
fn test_merge_survives_reopen() {
    let t = TestMemory::sqlite();
    let (a, _) = coffee_pair(&t, Tier::ShortTerm);
    let other = t
        .memory
        .tiers()
        .add_to(Tier::LongTerm, TraceFactory::trace("decaf after 4pm", 0.4, 0.2))
        .expect("other");
    t.memory
        .graph()
        .mutate(|g| g.link(&a.id, &other.id))
        .expect("link");

    let report = maintain(&t);
    let merged_id = report.merged_ids[0].clone();

    let t = t.reopen();
    assert_eq!(t.total(), 2);
    assert!(t.get(&merged_id).is_some());
    assert!(t.get(&a.id).is_none());
    assert_eq!(
        t.memory.graph().read(|g| g.neighbors(&merged_id)),
        vec![other.id.clone()]
    );
    assert!(!t.memory.stats().expect("stats").graph_degraded);
}
