use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use paperloom_common::{Config, ResearchMode, SearchQuery, SessionOverrides, YearRange};
use paperloom_engine::session::{references, Orchestrator, RunSummary};
use paperloom_search::{Aggregator, SearchOptions};
use paperloom_sources::{Discipline, SourceAdapter, SourceRegistry};

#[derive(Parser)]
#[command(name = "paperloom", about = "Multi-database research synthesis engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full research session and print the synthesis.
    Research {
        /// Research topic or question.
        topic: String,
        /// quick | standard | deep | exhaustive | systematic
        #[arg(long, default_value = "standard")]
        mode: ResearchMode,
        /// Comma-separated source ids (defaults to the mode's list).
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        #[arg(long)]
        max_sources: Option<usize>,
        #[arg(long)]
        year_from: Option<i32>,
        #[arg(long)]
        year_to: Option<i32>,
        /// Print the full session record as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// One-shot unified search across the registered databases.
    Search {
        query: String,
        /// Restrict to one source id (single-database entry point).
        #[arg(long)]
        source: Option<String>,
        /// Discipline default source list: biomedicine | cs | physics |
        /// social_science | general
        #[arg(long)]
        discipline: Option<Discipline>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        open_access: bool,
    },
    /// Papers citing (or related to) a provider-local paper id.
    Citations {
        /// Provider-local paper id.
        id: String,
        #[arg(long)]
        source: String,
        /// Fetch related papers instead of citing papers.
        #[arg(long)]
        related: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List registered sources and their capabilities.
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("paperloom=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let registry = Arc::new(SourceRegistry::new(&config));
    let aggregator = Arc::new(Aggregator::new(registry));

    match cli.command {
        Command::Research {
            topic,
            mode,
            sources,
            max_sources,
            year_from,
            year_to,
            json,
        } => {
            let overrides = SessionOverrides {
                sources,
                max_sources,
                year_range: match (year_from, year_to) {
                    (Some(from), Some(to)) => Some(YearRange { from, to }),
                    _ => None,
                },
                ..Default::default()
            };

            let orchestrator = Orchestrator::new(aggregator, config);
            info!(session_id = %orchestrator.session_id(), topic = topic.as_str(), %mode, "Starting research session");
            let session = orchestrator.run(&topic, mode, &overrides).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
                return Ok(());
            }

            if let Some(synthesis) = &session.synthesis {
                println!("{}", synthesis.content);
                println!("---");
                for (i, reference) in references(&session).iter().enumerate() {
                    let year = reference
                        .issued_year
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "n.d.".to_string());
                    println!(
                        "[{}] {} ({year}). {}{}",
                        i + 1,
                        reference.authors.join(", "),
                        reference.title,
                        reference
                            .doi
                            .as_deref()
                            .map(|d| format!(" doi:{d}"))
                            .unwrap_or_default(),
                    );
                }
            }
            println!("{}", RunSummary::from_session(&session));
        }
        Command::Search {
            query,
            source,
            discipline,
            limit,
            open_access,
        } => {
            if let Some(source) = source {
                let response = aggregator
                    .search_database(&source, &SearchQuery::new(&query, limit))
                    .await?;
                print_records(&response.results);
                println!(
                    "\n{} of {} results from {} in {}ms",
                    response.results.len(),
                    response.total,
                    response.source,
                    response.execution_time_ms,
                );
                return Ok(());
            }

            let mut options = SearchOptions::new(&query, limit);
            options.discipline = discipline;
            options.open_access_only = open_access;
            let response = aggregator.search(&options).await;

            print_records(&response.results);
            println!(
                "\n{} results ({} merged duplicates) in {}ms",
                response.results.len(),
                response.deduplicated,
                response.execution_time_ms,
            );
            for error in &response.errors {
                eprintln!("warning: {}: {}", error.source, error.message);
            }
        }
        Command::Citations {
            id,
            source,
            related,
            limit,
        } => {
            let adapter = aggregator.registry().get(&source)?;
            let records = if related {
                adapter.get_related(&id, limit).await?
            } else {
                adapter.get_citations(&id, limit).await?
            };
            print_records(&records);
            println!("\n{} records from {}", records.len(), adapter.name());
        }
        Command::Sources => {
            for adapter in aggregator.registry().adapters() {
                println!(
                    "{:<18} {:<18} full_text={} citations={} related={}",
                    adapter.id(),
                    adapter.name(),
                    adapter.supports_full_text(),
                    adapter.supports_citation_count(),
                    adapter.supports_related_papers(),
                );
            }
        }
    }

    Ok(())
}

fn print_records(records: &[paperloom_common::SearchResult]) {
    for record in records {
        let year = record
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string());
        let citations = record
            .citation_count
            .map(|c| format!(", {c} citations"))
            .unwrap_or_default();
        println!("[{year}] {} ({}{citations})", record.title, record.source);
        if let Some(doi) = &record.doi {
            println!("       doi:{doi}");
        }
    }
}
