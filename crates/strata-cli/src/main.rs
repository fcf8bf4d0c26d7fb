//! Strata CLI
//!
//! Command-line interface for inspecting and maintaining a tiered memory store.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use strata_core::{
    default_embedder, HeuristicAnalyzer, MemoryConfig, MemorySystem, MemoryTrace, MemoryType,
};

/// Strata - tiered associative memory CLI
#[derive(Parser)]
#[command(name = "strata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Strata tiered memory engine")]
#[command(long_about = "Strata stores memories in working, short-term and long-term tiers.\n\nRecalled memories are strengthened and promoted; near-duplicates are merged and stale memories forgotten.")]
struct Cli {
    /// Data directory (database and association graph)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a memory
    Add {
        /// Content to remember
        content: String,
        /// Memory type (episodic, semantic, procedural)
        #[arg(long = "type", default_value = "episodic")]
        memory_type: MemoryType,
        /// Store in the working tier instead of applying the placement rule
        #[arg(long)]
        working: bool,
    },

    /// Import one memory per non-empty line of a text file
    Import {
        /// Input file
        file: PathBuf,
        /// Memory type for every imported line
        #[arg(long = "type", default_value = "episodic")]
        memory_type: MemoryType,
        /// Skip scoring and tagging (neutral scores)
        #[arg(long)]
        skip_analysis: bool,
    },

    /// Recall memories relevant to a query
    Recall {
        /// Query text
        query: String,
        /// Maximum results
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Reconcile duplicates and merge near-duplicate memories
    Maintain {
        /// Only merge within working and short-term
        #[arg(long)]
        short_only: bool,
    },

    /// Forget stale, unimportant memories
    Forget {
        /// Recency window in days
        #[arg(long, default_value = "30")]
        days: u32,
    },

    /// Show memory statistics
    Stats,

    /// Export every tier and the association graph as JSON
    Export {
        /// Output file path
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let memory = open(config)?;

    match cli.command {
        Commands::Add {
            content,
            memory_type,
            working,
        } => run_add(&memory, &content, memory_type, working),
        Commands::Import {
            file,
            memory_type,
            skip_analysis,
        } => run_import(&memory, &file, memory_type, skip_analysis),
        Commands::Recall { query, limit } => run_recall(&memory, &query, limit),
        Commands::Maintain { short_only } => run_maintain(&memory, short_only),
        Commands::Forget { days } => run_forget(&memory, days),
        Commands::Stats => run_stats(&memory),
        Commands::Export { output } => run_export(&memory, &output),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Defaults, then the config file, then `STRATA_*`, then `--data-dir`
fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<MemoryConfig> {
    let config = match path {
        Some(path) => MemoryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MemoryConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }
    Ok(config)
}

fn open(config: MemoryConfig) -> anyhow::Result<MemorySystem> {
    let embedder = default_embedder().context("Failed to initialize embedder")?;
    let memory = MemorySystem::open(config, Arc::new(HeuristicAnalyzer::new()), embedder)
        .context("Failed to open memory store")?;
    Ok(memory)
}

/// Run add command
fn run_add(
    memory: &MemorySystem,
    content: &str,
    memory_type: MemoryType,
    working: bool,
) -> anyhow::Result<()> {
    let id = if working {
        memory.add_working_memory(content, memory_type)?
    } else {
        memory.add_memory(content, memory_type)?
    };

    let tier = memory
        .tiers()
        .locate(&id)
        .and_then(|t| t.tier)
        .map(|t| t.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{}", "Memory stored".green().bold());
    println!("{}: {}", "ID".white().bold(), id);
    println!("{}: {}", "Tier".white().bold(), tier);
    Ok(())
}

/// Run import command
fn run_import(
    memory: &MemorySystem,
    file: &Path,
    memory_type: MemoryType,
    skip_analysis: bool,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    if lines.is_empty() {
        println!("{}", "Nothing to import.".dimmed());
        return Ok(());
    }

    let ids = memory.batch_add(lines, memory_type, skip_analysis)?;
    println!(
        "{} {} memories into {}",
        "Imported".green().bold(),
        ids.len(),
        memory.config().batch_tier
    );
    Ok(())
}

/// Run recall command
fn run_recall(memory: &MemorySystem, query: &str, limit: usize) -> anyhow::Result<()> {
    let results = memory.recall_memory(query, limit);

    println!("{}", format!("=== Recall: {} ===", query).cyan().bold());
    if results.is_empty() {
        println!("{}", "No memories found.".dimmed());
    }
    for (i, trace) in results.iter().enumerate() {
        print_trace(i + 1, trace);
    }

    // Apply strengthening before the process exits
    memory.wait_for_background();
    Ok(())
}

fn print_trace(rank: usize, trace: &MemoryTrace) {
    let tier = trace.tier.map(|t| t.to_string()).unwrap_or_default();
    let age_days = (Utc::now() - trace.timestamp).num_days();
    println!();
    println!("{} {}", format!("{}.", rank).white().bold(), trace.content);
    println!(
        "   {} {}  {} {:.2}  {} {:.2}  {} {}  {} {}d",
        "tier".dimmed(),
        tier.yellow(),
        "importance".dimmed(),
        trace.importance,
        "emotion".dimmed(),
        trace.emotional_intensity,
        "recalls".dimmed(),
        trace.recall_count,
        "age".dimmed(),
        age_days
    );
    if !trace.context_tags.is_empty() {
        let tags: Vec<&str> = trace.context_tags.iter().map(String::as_str).collect();
        println!("   {} {}", "tags".dimmed(), tags.join(", "));
    }
}

/// Run maintain command
fn run_maintain(memory: &MemorySystem, short_only: bool) -> anyhow::Result<()> {
    let report = memory.merge_similar(short_only)?;

    println!("{}", "=== Maintenance ===".cyan().bold());
    println!("{}: {}", "Traces Scanned".white().bold(), report.traces_scanned);
    println!("{}: {}", "Duplicates Resolved".white().bold(), report.duplicates_resolved);
    println!("{}: {}", "Groups Merged".white().bold(), report.groups_merged);
    println!("{}: {}", "Traces Absorbed".white().bold(), report.traces_absorbed);
    if report.failed_groups > 0 {
        println!("{}: {}", "Failed Groups".red().bold(), report.failed_groups);
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow().bold(), warning);
    }
    println!("{}: {}ms", "Duration".white().bold(), report.duration_ms);
    Ok(())
}

/// Run forget command
fn run_forget(memory: &MemorySystem, days: u32) -> anyhow::Result<()> {
    let report = memory.forget_old(days)?;

    println!("{}", "=== Forgetting ===".cyan().bold());
    println!("{}: {}", "Traces Scanned".white().bold(), report.traces_scanned);
    println!("{}: {}", "Forgotten".white().bold(), report.forgotten());
    if !report.failed_tiers.is_empty() {
        let tiers: Vec<String> = report.failed_tiers.iter().map(|t| t.to_string()).collect();
        println!("{}: {}", "Failed Tiers".red().bold(), tiers.join(", "));
    }
    println!("{}: {}ms", "Duration".white().bold(), report.duration_ms);
    Ok(())
}

/// Run stats command
fn run_stats(memory: &MemorySystem) -> anyhow::Result<()> {
    let stats = memory.stats()?;

    println!("{}", "=== Strata Memory Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "Total Memories".white().bold(), stats.total());
    println!("{}: {}", "Working".white().bold(), stats.working);
    println!("{}: {}", "Short-term".white().bold(), stats.short_term);
    println!("{}: {}", "Long-term".white().bold(), stats.long_term);
    println!();
    println!("{}: {}", "Graph Nodes".white().bold(), stats.graph_nodes);
    println!("{}: {}", "Graph Edges".white().bold(), stats.graph_edges);
    if stats.graph_degraded {
        println!(
            "{}",
            "Association graph failed to load; associations are being rebuilt.".yellow()
        );
    }
    Ok(())
}

/// Run export command
fn run_export(memory: &MemorySystem, output: &Path) -> anyhow::Result<()> {
    let snapshot = memory.export()?;
    let total = snapshot.working.len() + snapshot.short_term.len() + snapshot.long_term.len();

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &snapshot)?;
    writer.flush()?;

    println!(
        "{} {} memories to {}",
        "Exported".green().bold(),
        total,
        output.display()
    );
    Ok(())
}
