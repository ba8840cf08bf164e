//! Search binary entry point.
//!
//! Command-line front end for the PMC semantic search pipeline. Supports both
//! single-query and interactive REPL modes, with table or JSON output.
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --query "tumor metabolism"
//! ```
//!
//! JSON output, offline embedder:
//! ```bash
//! search --query "CRISPR off-target effects" --format json --embedding-provider hashed
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use pmc_semantic_search::{
    config::SearchConfig,
    embedding::{hashed::HashedEmbedding, openai::OpenAIEmbedding, Embedder, EmbeddingProvider, EmbeddingResult},
    models::{QueryResponse, SearchResult},
    pipeline::SearchPipeline,
    storage::{sqlite::SqliteEmbeddingCache, EmbeddingCache},
};
#[cfg(feature = "fastembed")]
use pmc_semantic_search::embedding::fastembed::{parse_model, FastEmbedProvider};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    #[cfg(feature = "fastembed")]
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
    Hashed(HashedEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::Hashed(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
            DynamicEmbeddingProvider::Hashed(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
            DynamicEmbeddingProvider::Hashed(p) => p.model_name(),
        }
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// Local ONNX model via FastEmbed
    FastEmbed,
    /// OpenAI embeddings API (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
    /// Hashed-term vectors, no model download
    Hashed,
}

/// Output format for search results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored scores
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search binary CLI for open-access PMC articles
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Semantic section search over open-access PubMed Central articles",
    long_about = "Find open-access PMC articles for a query, rank their sections by semantic \
                  similarity and print sentence-aligned excerpts with links.

EXAMPLES:
  Single query:
    search --query \"tumor metabolism\"

  JSON output with an offline embedder:
    search --query \"CRISPR off-target effects\" --format json --embedding-provider hashed

  Interactive mode:
    search --interactive"
)]
struct Args {
    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of results to return (defaults to the config value)
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Embedding provider
    #[arg(long, value_enum, default_value = "fast-embed")]
    embedding_provider: EmbeddingProviderType,

    /// Embedding model name (provider-specific)
    #[arg(long, value_name = "NAME")]
    embedding_model: Option<String>,

    /// Embedding cache database (overrides the config value)
    #[arg(long, value_name = "PATH")]
    cache_db: Option<PathBuf>,

    /// Concurrent article fetches (overrides the config value)
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory (only used with FastEmbed provider)
    #[arg(long, value_name = "DIR")]
    model_cache_dir: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Resolve the config file and apply CLI overrides.
fn load_config(args: &Args) -> Result<SearchConfig> {
    let mut config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SearchConfig::default(),
    };

    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(cache_db) = &args.cache_db {
        config.cache_path = cache_db.clone();
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.max_concurrency = max_concurrency;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Instantiate the selected embedding provider
fn create_embedding_provider(
    provider_type: &EmbeddingProviderType,
    model_name: Option<&str>,
    model_cache_dir: Option<PathBuf>,
) -> Result<DynamicEmbeddingProvider> {
    match provider_type {
        #[cfg(feature = "fastembed")]
        EmbeddingProviderType::FastEmbed => {
            info!("Initializing FastEmbed provider");
            let model = model_name
                .map(parse_model)
                .transpose()
                .context("Unsupported FastEmbed model")?;

            let cache_dir = model_cache_dir.unwrap_or_else(|| {
                dirs::cache_dir()
                    .map(|p| p.join("fastembed"))
                    .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
            });
            debug!("Using model cache directory: {}", cache_dir.display());

            let provider = FastEmbedProvider::new(model, Some(cache_dir))
                .context("Failed to initialize FastEmbed provider")?;
            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
        #[cfg(not(feature = "fastembed"))]
        EmbeddingProviderType::FastEmbed => {
            let _ = (model_name, model_cache_dir);
            anyhow::bail!(
                "This build has no FastEmbed support.\n\
                 Rebuild with --features fastembed or use --embedding-provider hashed|openai."
            )
        }
        EmbeddingProviderType::OpenAI => {
            info!("Initializing OpenAI embedding provider");
            let api_key = std::env::var("OPENAI_API_KEY").with_context(|| {
                "OPENAI_API_KEY environment variable required for OpenAI embeddings.\n\
                 Set it with: export OPENAI_API_KEY=your-api-key"
            })?;
            let provider = OpenAIEmbedding::new(api_key, model_name.map(str::to_string))
                .context("Failed to initialize OpenAI provider")?;
            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
        EmbeddingProviderType::Hashed => {
            let dimension = match model_name {
                Some(name) => name
                    .trim_start_matches("hashed-terms-")
                    .parse::<usize>()
                    .with_context(|| format!("Invalid hashed embedding dimension: {}", name))?,
                None => HashedEmbedding::default().dimension(),
            };
            Ok(DynamicEmbeddingProvider::Hashed(HashedEmbedding::new(dimension)))
        }
    }
}

/// Truncate to `max` characters, appending an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Format results as a pretty table
fn format_results_table(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Article").add_attribute(Attribute::Bold),
        Cell::new("Section").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Summary").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let color = match result.score {
            s if s >= 0.7 => Color::Green,
            s if s >= 0.5 => Color::Cyan,
            s if s >= 0.3 => Color::Yellow,
            _ => Color::White,
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&result.source_id),
            Cell::new(truncate_chars(&result.section_label, 30)),
            Cell::new(format!("{:.4}", result.score)).fg(color),
            Cell::new(truncate_chars(&result.summary, 160)),
        ]);
    }

    table.to_string()
}

/// Format a response as JSON
fn format_response_json(response: &QueryResponse) -> Result<String> {
    serde_json::to_string_pretty(response).with_context(|| "Failed to serialize results to JSON")
}

fn print_response(response: &QueryResponse, format: &OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(&response.results));
            println!(
                "\nFound {} results in {:.2}s",
                response.results.len(),
                elapsed_secs
            );
        }
        OutputFormat::Json => println!("{}", format_response_json(response)?),
    }
    Ok(())
}

/// Display detailed view of a single result
fn display_result_detail(result: &SearchResult, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Article: {}", result.source_id);
    println!("Section: {}", result.section_label);
    println!("Score: {:.4}", result.score);
    println!("Link: {}", result.link);
    println!("\nSummary:\n{}", result.summary);
    println!("{}", "═".repeat(80));
}

fn print_help() {
    println!("Commands:");
    println!("  <query>         - Search for articles");
    println!("  /top N          - Set number of results to N");
    println!("  /format table   - Use table output format");
    println!("  /format json    - Use JSON output format");
    println!("  /detail N       - Show full details for result rank N");
    println!("  /help           - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive REPL mode
async fn run_interactive<E: EmbeddingProvider>(
    pipeline: &SearchPipeline<E>,
    mut top_k: usize,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive PMC Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_results: Vec<SearchResult> = Vec::new();

    loop {
        match rl.readline("Search> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts.as_slice() {
                        ["/help"] => print_help(),
                        ["/top", n] => match n.parse::<usize>() {
                            Ok(n) if n > 0 => {
                                top_k = n;
                                println!("Set top-k to {}", top_k);
                            }
                            _ => eprintln!("Invalid number: must be a positive integer"),
                        },
                        ["/format", "table"] => {
                            format = OutputFormat::Table;
                            println!("Set output format to table");
                        }
                        ["/format", "json"] => {
                            format = OutputFormat::Json;
                            println!("Set output format to JSON");
                        }
                        ["/detail", n] => match n.parse::<usize>() {
                            Ok(rank) if rank > 0 && rank <= last_results.len() => {
                                display_result_detail(&last_results[rank - 1], rank);
                            }
                            Ok(rank) if rank > last_results.len() => {
                                eprintln!(
                                    "Rank {} out of range (last search had {} results)",
                                    rank,
                                    last_results.len()
                                );
                            }
                            _ => eprintln!("Invalid rank: must be a positive integer"),
                        },
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", line),
                    }
                    continue;
                }

                let start = Instant::now();
                match pipeline.search(line, top_k).await {
                    Ok(response) => {
                        if let Err(e) = print_response(&response, &format, start.elapsed().as_secs_f64()) {
                            eprintln!("Error formatting output: {}", e);
                        }
                        last_results = response.results;
                    }
                    Err(e) => eprintln!("Search failed: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query<E: EmbeddingProvider>(
    pipeline: &SearchPipeline<E>,
    query: &str,
    top_k: usize,
    format: OutputFormat,
) -> Result<()> {
    let start = Instant::now();
    let response = pipeline
        .search(query, top_k)
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query))?;
    print_response(&response, &format, start.elapsed().as_secs_f64())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let query = match (&args.query, args.interactive) {
        (Some(query), false) => Some(query.clone()),
        (None, true) => None,
        _ => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };

    let config = load_config(&args)?;

    let provider = create_embedding_provider(
        &args.embedding_provider,
        args.embedding_model.as_deref(),
        args.model_cache_dir.clone(),
    )?;
    let embedder = Embedder::new(provider);
    let embedding_config = embedder.config();
    info!(
        "Using embedding model: {} (dimension: {})",
        embedding_config.model_name, embedding_config.dimension
    );

    info!("Opening embedding cache: {}", config.cache_path.display());
    let cache = Arc::new(
        SqliteEmbeddingCache::open(&config.cache_path, embedding_config.model_name.clone())
            .with_context(|| {
                format!("Failed to open embedding cache at {}", config.cache_path.display())
            })?,
    );

    let pipeline = SearchPipeline::from_config(&config, embedder, cache.clone())
        .context("Failed to build search pipeline")?;

    let outcome = match query {
        Some(query) => run_single_query(&pipeline, &query, config.top_k, args.format).await,
        None => run_interactive(&pipeline, config.top_k, args.format).await,
    };

    if let Err(e) = cache.close() {
        warn!("Failed to close embedding cache: {}", e);
    }

    outcome
}
