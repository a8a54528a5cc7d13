use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use candidate_gate::LocalProbeGate;
use clap::{Parser, Subcommand};
use discovery_hub::{DiscoveryBackend, DiscoveryHub, HeuristicBackend};
use exec_surface::{Action, ScriptedElement, ScriptedSurface};
use failure_heatmap::{FailureHeatmap, HeatmapPolicy};
use interaction_engine::{EngineConfig, InteractionEngine, PerformRequest};
use selector_memory::{KnowledgeStore, StorePolicy};
use sitepilot_core_types::{Locator, LogicalElement};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitepilot_cli::{catalogue, AppConfig};

#[derive(Parser)]
#[command(
    name = "sitepilot",
    version,
    about = "Self-healing web interaction engine",
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_HASH"), ", built ", env!("BUILD_DATE"), ")"
    )
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scripted healing walkthrough (no browser needed)
    Demo,

    /// Inspect learned locators in the knowledge store
    Knowledge {
        /// Only show this page context
        context: Option<String>,
    },

    /// Show currently hot locator patterns for a page context
    Heatmap { context: String },

    /// List the built-in element catalogue
    Catalogue,

    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "sitepilot starting"
    );

    match cli.command {
        Command::Demo => run_demo().await,
        Command::Knowledge { context } => show_knowledge(&config, context.as_deref()),
        Command::Heatmap { context } => show_heatmap(&config, &context),
        Command::Catalogue => {
            show_catalogue();
            Ok(())
        }
        Command::Config => {
            println!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Scripted end-to-end walkthrough: cold discovery, warm cache hit,
/// page drift, self-heal. Runs entirely in memory.
async fn run_demo() -> Result<()> {
    let surface = Arc::new(ScriptedSurface::new());
    let store = Arc::new(KnowledgeStore::new(StorePolicy::default()));
    let heatmap = Arc::new(FailureHeatmap::new(HeatmapPolicy::default()));
    let backends: Vec<Arc<dyn DiscoveryBackend>> = vec![Arc::new(HeuristicBackend::new())];
    let discovery = Arc::new(DiscoveryHub::new(backends));
    let gate = Arc::new(LocalProbeGate::new(surface.clone()));
    let engine = InteractionEngine::new(
        surface.clone(),
        store.clone(),
        heatmap,
        gate,
        discovery,
        EngineConfig::default(),
    );

    let old_locator = Locator::selector("#login-button");
    surface.add_element(ScriptedElement::new(old_locator.clone(), "Log in"));

    let element = LogicalElement::new("login", "login_button");
    let request = || {
        let mut req = PerformRequest::new(element.clone(), Action::Click);
        if let Some(hint) = catalogue::task_hint(&element) {
            req = req.with_hint(hint);
        }
        req
    };

    println!("[1/3] cold start - nothing cached, discovering the login button");
    let outcome = engine.perform(request()).await?;
    println!(
        "      verified after {} attempt(s) in {:?}",
        outcome.attempts, outcome.elapsed
    );

    println!("[2/3] warm run - cached locator, no discovery call");
    let outcome = engine.perform(request()).await?;
    println!(
        "      verified after {} attempt(s) in {:?}",
        outcome.attempts, outcome.elapsed
    );

    println!("[3/3] page drift - the button re-renders under a new selector");
    surface.remove_element(&old_locator);
    surface.add_element(ScriptedElement::new(Locator::selector("#login"), "Log in"));
    let outcome = engine.perform(request()).await?;
    println!(
        "      healed and verified after {} attempt(s) in {:?}",
        outcome.attempts, outcome.elapsed
    );

    println!();
    println!("learned candidates for {element}:");
    for candidate in store.get_candidates(&element) {
        println!(
            "  {:<24} confidence {:.2}  {}+/{}-  via {}",
            candidate.fingerprint(),
            candidate.confidence,
            candidate.success_count,
            candidate.failure_count,
            candidate.discovered_via.name()
        );
    }
    let stats = engine.knowledge_stats();
    println!(
        "store: {} lookups, {:.0}% hit rate",
        stats.total_queries,
        stats.hit_rate * 100.0
    );
    Ok(())
}

fn show_knowledge(config: &AppConfig, context: Option<&str>) -> Result<()> {
    let store = KnowledgeStore::with_persistence(config.knowledge_path(), config.store)?;
    let mut elements = store.elements();
    elements.sort_by_key(|e| e.key());

    let mut shown = 0usize;
    for element in elements {
        if context.is_some_and(|ctx| element.page_context != ctx) {
            continue;
        }
        println!("{element}:");
        for candidate in store.get_candidates(&element) {
            let verified = candidate
                .last_verified_at
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<32} confidence {:.2}  {}+/{}-  via {:<15} last verified {}",
                candidate.fingerprint(),
                candidate.confidence,
                candidate.success_count,
                candidate.failure_count,
                candidate.discovered_via.name(),
                verified
            );
        }
        shown += 1;
    }
    if shown == 0 {
        println!(
            "no learned locators under {}",
            config.knowledge_path().display()
        );
    }
    Ok(())
}

fn show_heatmap(config: &AppConfig, context: &str) -> Result<()> {
    let heatmap = FailureHeatmap::with_persistence(config.heatmap_path(), config.heatmap)?;
    let hot = heatmap.excluded_fingerprints(context);
    if hot.is_empty() {
        println!("no hot patterns for '{context}'");
    } else {
        println!("hot patterns for '{context}' (excluded from discovery):");
        let mut hot: Vec<_> = hot.into_iter().collect();
        hot.sort();
        for fingerprint in hot {
            println!(
                "  {:<32} {} failures in window",
                fingerprint,
                heatmap.live_failures(context, &fingerprint)
            );
        }
    }
    Ok(())
}

fn show_catalogue() {
    for context in catalogue::contexts() {
        println!("{context}:");
        for entry in catalogue::entries() {
            if entry.element.page_context != context {
                continue;
            }
            println!(
                "  {:<24} [{:?}] {}",
                entry.element.element_role, entry.criticality, entry.hint
            );
        }
    }
}
