//! GraphRAG CLI
//!
//! Ask questions over a knowledge graph and a chunk index, one-shot or as a
//! conversation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphrag_agents::{
    ConversationManager, LanguageModel, LlmClient, RetrievalConfig, TeiClient,
};
use graphrag_core::{
    Chunk, CoreError, Entity, EntityType, GraphFact, MergedContext, RetrievalWarning,
};
use graphrag_db::{init_memory, init_persistent, Repository};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// GraphRAG - question answering over a knowledge graph and text chunks
#[derive(Parser)]
#[command(name = "graphrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (defaults to ~/.graphrag/qa)
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Use in-memory database (for testing)
    #[arg(long)]
    memory: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        question: String,

        /// Print the evidence the answer was grounded on
        #[arg(short, long)]
        show_context: bool,
    },

    /// Interactive conversation with history
    Chat,

    /// Show the context a question would retrieve, without answering it
    Context { question: String },

    /// Show the entities extracted from a question
    Entities { question: String },

    /// Import entities, facts and chunks from a JSON file
    Import {
        /// Path to JSON file
        path: PathBuf,

        /// Delete the existing graph and chunks before importing
        #[arg(long)]
        replace: bool,
    },

    /// Show database statistics
    Stats,

    /// Delete the local database (fresh start)
    ResetDb {
        /// Database path (defaults to ~/.graphrag/qa)
        #[arg(short, long)]
        db_path: Option<PathBuf>,
    },
}

/// Pre-extracted graph and chunk data
#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    entities: Vec<ImportEntity>,
    #[serde(default)]
    facts: Vec<ImportFact>,
    #[serde(default)]
    chunks: Vec<ImportChunk>,
}

#[derive(Debug, Deserialize)]
struct ImportEntity {
    name: String,
    #[serde(default, alias = "type")]
    entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportFact {
    subject: String,
    relation: String,
    object: String,
    #[serde(default)]
    source_doc_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportChunk {
    id: String,
    text: String,
    #[serde(default)]
    source_doc_id: Option<String>,
    #[serde(default)]
    embedding: Vec<f32>,
}

fn default_db_path() -> Result<PathBuf> {
    let mut path = dirs::home_dir().context("Could not find home directory")?;
    path.push(".graphrag");
    path.push("qa");
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging (RUST_LOG wins over --verbose)
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::ResetDb { db_path } = &cli.command {
        let path = match db_path.clone().or_else(|| cli.db_path.clone()) {
            Some(path) => path,
            None => default_db_path()?,
        };

        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove db at {}", path.display()))?;
            println!("✓ Removed database at {}", path.display());
        } else {
            println!("Database not found at {}, nothing to remove", path.display());
        }
        return Ok(());
    }

    // Initialize database
    let db = if cli.memory {
        info!("Using in-memory database");
        init_memory().await?
    } else {
        let db_path = match cli.db_path {
            Some(path) => path,
            None => default_db_path()?,
        };

        // Ensure directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Using database at: {}", db_path.display());
        init_persistent(&db_path).await?
    };

    let repo = Repository::new(db);
    repo.health().await.context("Database is not reachable")?;

    let tei = TeiClient::default_local();
    let llm = LlmClient::default_local();
    let config = RetrievalConfig::from_env();

    // Check inference services only when needed
    let needs_llm = matches!(
        cli.command,
        Commands::Ask { .. } | Commands::Chat | Commands::Context { .. } | Commands::Entities { .. }
    );
    let needs_tei = matches!(
        cli.command,
        Commands::Ask { .. } | Commands::Chat | Commands::Context { .. }
    );

    if needs_llm && !llm.health().await.unwrap_or(false) {
        eprintln!("Error: language model is not reachable.");
        eprintln!("  LLM: {} ({})", llm.base_url(), llm.model());
        anyhow::bail!("Language model unavailable");
    }

    if needs_tei && !tei.health().await.unwrap_or(false) {
        // Retrieval degrades to graph-only; not fatal
        eprintln!(
            "Warning: embeddings service at {} is not reachable, vector search disabled.",
            tei.base_url()
        );
    }

    // Execute command
    match cli.command {
        Commands::Ask {
            question,
            show_context,
        } => {
            let session = build_session(repo, tei, llm, config);
            cmd_ask(&session, &question, show_context).await?;
        }
        Commands::Chat => {
            let session = build_session(repo, tei, llm, config);
            cmd_chat(&session).await?;
        }
        Commands::Context { question } => {
            let session = build_session(repo, tei, llm, config);
            cmd_context(&session, &question).await?;
        }
        Commands::Entities { question } => {
            let session = build_session(repo, tei, llm, config);
            cmd_entities(&session, &question).await?;
        }
        Commands::Import { path, replace } => {
            cmd_import(repo, tei, path, replace).await?;
        }
        Commands::Stats => {
            cmd_stats(repo).await?;
        }
        Commands::ResetDb { .. } => {
            // Handled before database init.
        }
    }

    Ok(())
}

fn build_session(
    repo: Repository,
    tei: TeiClient,
    llm: LlmClient,
    config: RetrievalConfig,
) -> ConversationManager {
    let repo = Arc::new(repo);
    let llm: Arc<dyn LanguageModel> = Arc::new(llm);
    ConversationManager::new(repo.clone(), repo, Arc::new(tei), llm, config)
}

fn print_warnings(warnings: &[RetrievalWarning]) {
    for warning in warnings {
        println!("  ⚠ {}", warning);
    }
}

fn print_context(context: &MergedContext) {
    if context.is_empty() {
        println!("(no evidence found)");
        return;
    }
    println!("{}", context.rendered_text);
    println!(
        "\n[{} facts, {} chunks, ~{} tokens]",
        context.facts.len(),
        context.chunks.len(),
        context.token_estimate
    );
}

async fn cmd_ask(session: &ConversationManager, question: &str, show_context: bool) -> Result<()> {
    let answer = session.ask(question).await?;

    println!("{}", answer.text);
    if show_context {
        println!();
        print_context(&answer.context);
    }
    if answer.is_degraded() {
        println!();
        print_warnings(&answer.warnings);
    }

    Ok(())
}

async fn cmd_context(session: &ConversationManager, question: &str) -> Result<()> {
    let outcome = session.context(question).await;
    print_context(&outcome.value);
    print_warnings(&outcome.warnings);
    Ok(())
}

async fn cmd_entities(session: &ConversationManager, question: &str) -> Result<()> {
    let outcome = session.extractor().extract(question).await;

    if outcome.value.is_empty() {
        println!("No entities found.");
    }
    for entity in &outcome.value {
        println!("• {} ({})", entity.name, entity.entity_type);
    }
    print_warnings(&outcome.warnings);

    Ok(())
}

async fn cmd_import(repo: Repository, tei: TeiClient, path: PathBuf, replace: bool) -> Result<()> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let import: ImportFile = serde_json::from_str(&content)
        .map_err(CoreError::from)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))?;

    if replace {
        repo.clear().await.context("Failed to clear the database")?;
        info!("Cleared existing graph and chunks");
    }

    for entity in &import.entities {
        let entity_type = entity
            .entity_type
            .as_deref()
            .map(EntityType::from_label)
            .unwrap_or_default();
        let entity = Entity::new(entity.name.as_str(), entity_type);
        if entity.canonical_name.is_empty() {
            return Err(CoreError::Validation("entity with a blank name".into()).into());
        }
        repo.upsert_entity(&entity).await?;
    }

    for fact in &import.facts {
        if [&fact.subject, &fact.relation, &fact.object]
            .iter()
            .any(|part| part.trim().is_empty())
        {
            return Err(CoreError::Validation(format!(
                "fact with a blank part: ({}, {}, {})",
                fact.subject, fact.relation, fact.object
            ))
            .into());
        }
        let mut graph_fact = GraphFact::new(
            fact.subject.trim(),
            fact.relation.trim(),
            fact.object.trim(),
        );
        if let Some(source) = &fact.source_doc_id {
            graph_fact = graph_fact.with_source(source.as_str());
        }
        repo.add_fact(&graph_fact).await?;
    }

    let mut embedded = 0;
    for item in import.chunks {
        let embedding = if item.embedding.is_empty() {
            embedded += 1;
            tei.embed(&item.text)
                .await
                .with_context(|| format!("Failed to embed chunk {}", item.id))?
        } else {
            item.embedding
        };

        let mut chunk = Chunk::new(item.id, item.text).with_embedding(embedding);
        if let Some(source) = item.source_doc_id {
            chunk = chunk.with_source(source);
        }
        repo.upsert_chunk(&chunk).await?;
    }

    let stats = repo.get_stats().await?;
    println!("✓ Imported from {}", path.display());
    println!("  • Entities: {}", stats.entity_count);
    println!("  • Facts: {}", stats.fact_count);
    println!("  • Chunks: {} ({} embedded now)", stats.chunk_count, embedded);

    Ok(())
}

async fn cmd_stats(repo: Repository) -> Result<()> {
    let stats = repo.get_stats().await?;

    println!("Database Statistics:");
    println!("  • Entities: {}", stats.entity_count);
    println!("  • Facts: {}", stats.fact_count);
    println!("  • Chunks: {}", stats.chunk_count);

    Ok(())
}

async fn cmd_chat(session: &ConversationManager) -> Result<()> {
    println!("GraphRAG - Conversation Mode");
    println!("Commands: /context <question>, /history, /clear, /help, /quit");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("you> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let line = line.trim();
        let (cmd, arg) = match line.split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => continue,

            "/context" => {
                if arg.is_empty() {
                    println!("Usage: /context <question>");
                    continue;
                }
                let outcome = session.context(arg).await;
                print_context(&outcome.value);
                print_warnings(&outcome.warnings);
            }

            "/history" => {
                let history = session.history();
                if history.is_empty() {
                    println!("No history yet.");
                }
                for turn in history {
                    println!("[{}] {}", turn.timestamp.format("%H:%M:%S"), turn.question);
                }
            }

            "/clear" => {
                session.clear_history();
                println!("✓ History cleared");
            }

            "/help" => {
                println!("Commands:");
                println!("  <question>             - Ask a question");
                println!("  /context <question>    - Show retrieved context");
                println!("  /history               - List previous questions");
                println!("  /clear                 - Forget the conversation");
                println!("  /quit                  - Exit");
            }

            "/quit" | "/exit" => {
                println!("Goodbye!");
                break;
            }

            _ => match session.ask(line).await {
                Ok(answer) => {
                    println!("graphrag> {}", answer.text);
                    print_warnings(&answer.warnings);
                }
                Err(e) => {
                    warn!("Question failed: {}", e);
                    println!("Error: {}", e);
                }
            },
        }

        println!();
    }

    Ok(())
}
