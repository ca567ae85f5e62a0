//! CLI entry point for the retrieval store.
//!
//! Thin glue over the library facade: read records, drive builds and
//! searches, print results. Fetching history from remote sources and
//! shaping it into records happens upstream of this binary.

use anyhow::Context as _;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use repodex::{
    FastEmbedProvider, Record, RetrievalService, SearchOutcome, Settings, ShardRegistry,
    StoreError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

// JSON output mirrors, kept separate from the library types
#[derive(Debug, Serialize)]
struct SearchReport<'a> {
    partial: bool,
    projects: Vec<ProjectReport<'a>>,
}

#[derive(Debug, Serialize)]
struct ProjectReport<'a> {
    project: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    hits: Vec<HitReport<'a>>,
}

#[derive(Debug, Serialize)]
struct HitReport<'a> {
    external_id: &'a str,
    distance: f32,
    content: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

impl<'a> SearchReport<'a> {
    fn from_outcome(outcome: &'a SearchOutcome) -> Self {
        Self {
            partial: outcome.partial,
            projects: outcome
                .projects
                .iter()
                .map(|group| ProjectReport {
                    project: &group.project,
                    error: group.error.as_deref(),
                    hits: group
                        .hits
                        .iter()
                        .map(|hit| HitReport {
                            external_id: &hit.external_id,
                            distance: hit.distance,
                            content: &hit.content,
                            metadata: &hit.metadata,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Per-project semantic retrieval store
#[derive(Parser)]
#[command(
    name = "repodex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Per-project semantic retrieval store",
    long_about = "Build vector shards from project history and query them in natural language.",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom repodex.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Build or rebuild one project's shard
    #[command(
        about = "Embed records and persist a project shard",
        after_help = "Examples:\n  repodex build backend --records history.jsonl\n  exporter | repodex build backend --records -\n\nInput is JSONL, one record per line:\n  {\"external_id\": \"issue-42\", \"text\": \"...\", \"metadata\": {\"kind\": \"issue\"}}"
    )]
    Build {
        /// Project name the shard is stored under
        project: String,

        /// JSONL file with one record per line ('-' reads stdin)
        #[arg(long)]
        records: PathBuf,
    },

    /// Search one or all projects
    #[command(
        about = "Embed a query and search project shards",
        after_help = "Examples:\n  repodex search \"crash on startup\"\n  repodex search \"dark mode\" --project frontend -k 10\n  repodex search \"auth token refresh\" --json | jq '.projects[].hits[].external_id'"
    )]
    Search {
        /// Natural language query
        query: String,

        /// Results per project (defaults to search.default_k)
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Restrict the search to one project
        #[arg(long)]
        project: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List projects with a shard on disk
    #[command(about = "List projects discovered under the storage root")]
    Projects,

    /// Fetch one stored document by id
    #[command(
        about = "Print a stored document",
        after_help = "Examples:\n  repodex document backend issue-42\n  repodex document backend pr-7 --json"
    )]
    Document {
        /// Project that owns the document
        project: String,

        /// External id the document was stored under
        external_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings as TOML")]
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repodex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };

    match cli.command {
        Commands::Build { project, records } => {
            let records = read_records(&records)?;
            println!("Building '{project}' from {} records...", records.len());

            let service = build_service(&settings)?;
            match service.build(&project, records).await {
                Ok(summary) => {
                    println!(
                        "Indexed {} documents for '{}' ({} dimensions, {} index)",
                        summary.documents, summary.project, summary.dimension, summary.variant
                    );
                    println!("Shard written to {}", summary.path.display());
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Search {
            query,
            limit,
            project,
            json,
        } => {
            let service = build_service(&settings)?;
            match service.search(&query, limit, project.as_deref()).await {
                Ok(outcome) => {
                    if json {
                        let report = SearchReport::from_outcome(&outcome);
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_outcome(&outcome);
                    }
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Projects => {
            let registry = ShardRegistry::new(&settings.storage_root);
            let projects = registry.list_projects();
            if projects.is_empty() {
                println!(
                    "No projects found under {}",
                    settings.storage_root.display()
                );
            } else {
                for name in projects {
                    println!("{name}");
                }
            }
        }

        Commands::Document {
            project,
            external_id,
            json,
        } => {
            let registry = ShardRegistry::new(&settings.storage_root)
                .with_model_hint(&settings.embedding.model);
            let shard = match registry.get(&project).await {
                Ok(shard) => shard,
                Err(e) => fail(&StoreError::Shard(e)),
            };
            match shard.document(&external_id) {
                Some(doc) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(doc)?);
                    } else {
                        println!("{}", doc.content);
                        if !doc.metadata.is_empty() {
                            println!();
                            for (key, value) in &doc.metadata {
                                println!("  {key}: {value}");
                            }
                        }
                    }
                }
                None => fail(&StoreError::DocumentNotFound {
                    project,
                    external_id,
                }),
            }
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            match toml::to_string_pretty(&settings) {
                Ok(toml_str) => println!("{toml_str}"),
                Err(e) => eprintln!("Error displaying config: {e}"),
            }
        }
    }

    Ok(())
}

fn build_service(settings: &Settings) -> anyhow::Result<RetrievalService> {
    let provider =
        FastEmbedProvider::new(&settings.embedding.model, &settings.embedding.cache_dir)
            .context("initializing embedding model")?;
    Ok(RetrievalService::new(settings, Arc::new(provider)))
}

/// Read JSONL records, one per line; blank lines are skipped.
fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path)
            .with_context(|| format!("opening records file {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading records line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("parsing record on line {}", number + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn print_outcome(outcome: &SearchOutcome) {
    if outcome.partial {
        eprintln!("Warning: deadline expired, results are partial\n");
    }
    if outcome.total_hits() == 0 && outcome.projects.iter().all(|group| group.error.is_none()) {
        println!("No results.");
        return;
    }
    for group in &outcome.projects {
        if let Some(reason) = &group.error {
            eprintln!("Project '{}' failed: {reason}\n", group.project);
            continue;
        }
        if group.hits.is_empty() {
            continue;
        }
        println!("Project: {} ({} results)", group.project, group.hits.len());
        for hit in &group.hits {
            println!(
                "  {:.4}  {}  {}",
                hit.distance,
                hit.external_id,
                preview(&hit.content)
            );
        }
        println!();
    }
}

/// First line of the content, truncated for terminal display.
fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 96;
    let first_line = content.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_CHARS {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}

fn fail(e: &StoreError) -> ! {
    eprintln!("Error: {e}");
    let suggestions = e.recovery_suggestions();
    if !suggestions.is_empty() {
        eprintln!("\nSuggestions:");
        for suggestion in suggestions {
            eprintln!("  • {suggestion}");
        }
    }
    std::process::exit(1);
}
