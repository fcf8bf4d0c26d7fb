//! Facade scenarios: placement, batch import, persistence, degraded graph
//! recovery, export, configuration errors

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::{
    BatchItem, HashingEmbedder, HeuristicAnalyzer, MemoryConfig, MemoryError, MemorySystem,
    MemoryType, Scores, Tier, MERGED_FROM_KEY,
};
use strata_e2e_tests::{Backend, CountingAnalyzer, FixtureEmbedder, TestMemory, TraceFactory};

#[test]
fn test_batch_import_skips_analysis() {
    let t = TestMemory::in_memory();
    let contents = TraceFactory::contents(100);
    let ids = t
        .memory
        .batch_add(contents.iter().map(String::as_str), MemoryType::Semantic, true)
        .expect("batch");

    assert_eq!(ids.len(), 100);
    assert_eq!(t.analyzer.total_calls(), 0);

    let stats = t.memory.stats().expect("stats");
    assert_eq!(stats.long_term, 100);
    assert_eq!(stats.graph_edges, 0);
    for trace in t.all_traces() {
        assert_eq!(trace.importance, 0.5);
        assert_eq!(trace.emotional_intensity, 0.5);
        assert_eq!(trace.memory_type, MemoryType::Semantic);
    }

    // Input order is preserved
    let first = t.get(&ids[0]).expect("first");
    assert_eq!(first.content, contents[0]);
}

#[test]
fn test_batch_import_keeps_caller_fields() {
    let t = TestMemory::in_memory();
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), serde_json::json!("journal"));
    let items = vec![
        BatchItem::new("ran 10k in the rain")
            .with_scores(0.9, 0.7)
            .with_tags(["running", "weather"])
            .with_metadata(metadata),
        BatchItem::new("   "),
        BatchItem::from("bought new trainers"),
    ];

    let ids = t.memory.batch_add(items, MemoryType::Episodic, false).expect("batch");
    assert_eq!(ids.len(), 2, "blank items are skipped");

    let run = t.get(&ids[0]).expect("run");
    assert_eq!(run.importance, 0.9);
    assert_eq!(run.emotional_intensity, 0.7);
    assert!(run.context_tags.contains("running"));
    assert_eq!(run.metadata.get("source"), Some(&serde_json::json!("journal")));

    // Only the item without scores was scored; imports are never tagged
    assert_eq!(t.analyzer.score_calls(), 1);
    assert_eq!(t.analyzer.keyword_calls(), 0);
    let trainers = t.get(&ids[1]).expect("trainers");
    assert!(trainers.context_tags.is_empty());
}

#[test]
fn test_scores_are_clamped_before_placement() {
    let analyzer = CountingAnalyzer::new().with_fixed_scores(1.7, -0.3);
    let t = TestMemory::build(
        Backend::InMemory,
        MemoryConfig::default(),
        analyzer,
        FixtureEmbedder::new(),
    );
    let id = t
        .memory
        .add_memory("won the regional chess final", MemoryType::Episodic)
        .expect("add");

    let stored = t.get(&id).expect("stored");
    assert_eq!(stored.importance, 1.0);
    assert_eq!(stored.emotional_intensity, 0.0);
    assert_eq!(stored.tier, Some(Tier::LongTerm));
}

#[test]
fn test_analyzer_failure_uses_neutral_scores() {
    let t = TestMemory::in_memory();
    t.analyzer.fail_all(true);
    let id = t
        .memory
        .add_memory("the gym closes early on Sundays", MemoryType::Procedural)
        .expect("add succeeds without an analyzer");

    let stored = t.get(&id).expect("stored");
    assert_eq!(stored.importance, 0.5);
    assert_eq!(stored.emotional_intensity, 0.5);
    assert_eq!(stored.tier, Some(Tier::ShortTerm));
    assert!(stored.context_tags.is_empty());
}

#[test]
fn test_empty_content_is_rejected() {
    let t = TestMemory::in_memory();
    for content in ["", "  \n\t"] {
        assert!(matches!(
            t.memory.add_memory(content, MemoryType::Episodic),
            Err(MemoryError::InvalidInput(_))
        ));
        assert!(matches!(
            t.memory.add_working_memory(content, MemoryType::Episodic),
            Err(MemoryError::InvalidInput(_))
        ));
    }
    assert_eq!(t.total(), 0);
    assert_eq!(t.analyzer.total_calls(), 0);
}

#[test]
fn test_mixed_workload_keeps_invariants() {
    let t = TestMemory::in_memory();
    let notes = [
        ("the passport is in the desk drawer", 0.9),
        ("the passport renewal form needs a photo", 0.4),
        ("I like coffee", 0.3),
        ("I really like coffee", 0.3),
        ("the bins go out on Monday night", 0.2),
        ("the desk drawer key is on the hook", 0.4),
    ];
    for (content, importance) in notes {
        t.analyzer.set_fixed_scores(Some(Scores {
            importance,
            emotional_intensity: 0.2,
        }));
        t.memory.add_memory(content, MemoryType::Episodic).expect("add");
    }
    t.memory
        .add_working_memory("pick up the passport photos at noon", MemoryType::Procedural)
        .expect("working");

    for _ in 0..3 {
        t.memory.recall_memory("passport", 3);
        t.memory.recall_memory("desk drawer", 2);
    }
    t.memory.wait_for_background();
    t.assert_single_owner();
    t.assert_graph_symmetric();

    let report = t.memory.manual_maintenance().expect("maintenance");
    assert_eq!(report.groups_merged, 1, "the coffee pair merges");
    t.assert_single_owner();
    t.assert_graph_symmetric();

    t.memory.forget_old(30).expect("forget");
    t.assert_single_owner();
    t.assert_graph_symmetric();

    let merged = t
        .all_traces()
        .into_iter()
        .find(|tr| tr.metadata.contains_key(MERGED_FROM_KEY))
        .expect("merged trace");
    assert_eq!(merged.merged_from().len(), 2);
}

#[test]
fn test_memories_persist_across_reopen() {
    let t = TestMemory::sqlite();
    t.analyzer.set_fixed_scores(Some(Scores {
        importance: 0.9,
        emotional_intensity: 0.1,
    }));
    let durable = t
        .memory
        .add_memory("my national insurance number starts with QQ", MemoryType::Semantic)
        .expect("durable");
    t.analyzer.set_fixed_scores(None);
    let brief = t
        .memory
        .add_working_memory("the kettle is on", MemoryType::Episodic)
        .expect("working");
    let before = t.memory.stats().expect("stats");

    let t = t.reopen();
    let after = t.memory.stats().expect("stats");
    assert_eq!(after.total(), before.total());
    assert_eq!(t.get(&durable).and_then(|tr| tr.tier), Some(Tier::LongTerm));
    assert_eq!(t.get(&brief).and_then(|tr| tr.tier), Some(Tier::Working));

    let results = t.memory.recall_memory("national insurance number", 2);
    assert!(results.iter().any(|r| r.id == durable));
}

#[test]
fn test_corrupt_graph_degrades_and_relinks() {
    let t = TestMemory::sqlite();
    let ids: Vec<String> = [
        "the passport is in the desk drawer",
        "the passport expires next June",
    ]
    .iter()
    .map(|c| t.memory.add_memory(c, MemoryType::Episodic).expect("add"))
    .collect();
    assert!(t.memory.graph().read(|g| g.contains(&ids[1])));

    // Nothing flushes the graph on shutdown, so this is what the next open reads
    let dir = t.data_dir();
    std::fs::write(t.graph_path(), "{ this is not json").expect("corrupt graph");
    let t = t.reopen();

    let stats = t.memory.stats().expect("stats");
    assert!(stats.graph_degraded);
    assert_eq!(stats.graph_edges, 0);
    assert_eq!(stats.total(), 2, "tiers are unaffected");

    let quarantined = std::fs::read_dir(&dir)
        .expect("read dir")
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
    assert!(quarantined, "corrupt graph kept aside");

    let results = t.memory.recall_memory("passport", 2);
    assert_eq!(results.len(), 2);
    t.memory.wait_for_background();

    for id in &ids {
        assert!(t.memory.graph().read(|g| g.contains(id)), "{} not relinked", id);
    }
    t.assert_graph_symmetric();
}

#[test]
fn test_isolated_trace_is_relinked_once() {
    let t = TestMemory::sqlite();
    let lonely = t
        .memory
        .add_memory("the loft hatch sticks in wet weather", MemoryType::Episodic)
        .expect("add");
    std::fs::write(t.graph_path(), "[1, 2").expect("corrupt graph");
    let t = t.reopen();
    assert!(t.memory.stats().expect("stats").graph_degraded);

    let graph = t.memory.graph();
    assert!(graph.needs_relink(&lonely));

    // Nothing similar exists, so relinking leaves it without edges
    assert_eq!(t.memory.recall_memory("loft hatch", 1).len(), 1);
    t.memory.wait_for_background();
    assert!(!graph.read(|g| g.contains(&lonely)));
    assert!(graph.is_relinked(&lonely));
    assert!(!graph.needs_relink(&lonely));

    t.memory.recall_memory("loft hatch", 1);
    t.memory.wait_for_background();
    assert!(!graph.needs_relink(&lonely));
    assert_eq!(t.get(&lonely).expect("stored").recall_count, 2);
}

#[test]
fn test_export_snapshot_serializes() {
    let t = TestMemory::in_memory();
    t.memory
        .add_working_memory("water the basil", MemoryType::Procedural)
        .expect("working");
    t.memory
        .add_memory("the basil came from the market", MemoryType::Episodic)
        .expect("add");

    let snapshot = t.memory.export().expect("export");
    assert_eq!(snapshot.working.len(), 1);

    let json = serde_json::to_value(&snapshot).expect("serialize");
    for key in ["exportedAt", "working", "shortTerm", "longTerm", "graph"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    let total: usize = ["working", "shortTerm", "longTerm"]
        .iter()
        .map(|k| json[*k].as_array().map_or(0, Vec::len))
        .sum();
    assert_eq!(total, 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = MemoryConfig {
        merge_threshold: 1.5,
        ..MemoryConfig::default()
    };
    let result = MemorySystem::in_memory(
        config,
        Arc::new(HeuristicAnalyzer::new()),
        Arc::new(HashingEmbedder::new()),
    );
    assert!(matches!(result, Err(MemoryError::Config(_))));

    let vars = vec![("STRATA_FORGET_THRESHOLD".to_string(), "lots".to_string())];
    assert!(matches!(
        MemoryConfig::default().apply_vars(vars),
        Err(MemoryError::Config(_))
    ));
}
