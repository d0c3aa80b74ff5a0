//! weft - tool-calling agent CLI.
//!
//! Thin binary over the library: web search, page ingestion with retrieval,
//! one-shot and interactive agent runs, and persistent session transcripts.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use weft_core::agent::{AgentExecutor, ToolCallingAgent};
use weft_core::config::WeftConfig;
use weft_core::document::{TextSplitter, WebLoader, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use weft_core::embedding::{ApiEmbedder, Embedder, LexicalEmbedder};
use weft_core::history::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore};
use weft_core::index::Retriever;
use weft_core::prompt::ChatPrompt;
use weft_core::provider::ModelRegistry;
use weft_core::tool::{RetrieverTool, SearchClient, ToolRegistry, WebSearchTool};
use weft_core::trace::{CallbackSink, RunTracer};
use weft_core::types::AgentEvent;
use weft_core::versioning::{bump_for, ALL_CHANGES, ALL_PACKAGES};

const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Parser, Debug)]
#[command(
    name = "weft",
    version,
    about = "Tool-calling agent CLI: web search, page retrieval, session memory"
)]
struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    json: bool,
    #[arg(
        long,
        global = true,
        help = "Model id override (e.g. gpt-4o-mini, claude-sonnet-4-20250514)"
    )]
    model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the web and print the top results
    Search {
        query: String,
        #[arg(long, default_value_t = 2)]
        max_results: usize,
    },
    /// Ask the agent one question, optionally over ingested pages
    Ask {
        question: String,
        #[arg(long = "url", help = "Page to ingest for retrieval (repeatable)")]
        urls: Vec<String>,
        #[arg(long, help = "Cap on model turns for this run")]
        max_iterations: Option<usize>,
    },
    /// Interactive chat; history lives in memory for the process
    Chat {
        #[arg(long, default_value = "default")]
        session: String,
        #[arg(long = "url", help = "Page to ingest for retrieval (repeatable)")]
        urls: Vec<String>,
    },
    /// One agent exchange against a persistent session transcript
    Agent {
        input: String,
        #[arg(long, default_value = "default")]
        session: String,
        #[arg(long = "url", help = "Page to ingest for retrieval (repeatable)")]
        urls: Vec<String>,
    },
    /// List stored session transcripts
    Sessions,
    /// Print the release versioning policy
    Policy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = WeftConfig::from_env();

    match cli.command {
        Commands::Search { query, max_results } => {
            handle_search(&config, cli.json, &query, max_results).await?;
        }
        Commands::Ask {
            question,
            urls,
            max_iterations,
        } => {
            let executor = build_executor(&config, cli.model, &urls, max_iterations).await?;
            run_once(&executor, &question).await?;
        }
        Commands::Chat { session, urls } => {
            let executor = build_executor(&config, cli.model, &urls, None).await?;
            handle_chat(executor, &session).await?;
        }
        Commands::Agent {
            input,
            session,
            urls,
        } => {
            let executor = build_executor(&config, cli.model, &urls, None).await?;
            let agent = executor.with_history(Arc::new(JsonlHistoryStore::new(&config.history_dir)));

            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let printer = spawn_printer(event_rx);
            let outcome = agent.run(&session, &input, event_tx).await;
            let printed = printer.await.unwrap_or(false);

            let outcome = outcome?;
            if !printed {
                println!("{}", outcome.output);
            }
        }
        Commands::Sessions => {
            let store = JsonlHistoryStore::new(&config.history_dir);
            let ids = store.sessions().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("no stored sessions");
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
        Commands::Policy => {
            handle_policy(cli.json)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

async fn handle_search(
    config: &WeftConfig,
    json: bool,
    query: &str,
    max_results: usize,
) -> anyhow::Result<()> {
    let client = search_client(config)?;
    let results = client.search(query, max_results).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("no results for \"{query}\"");
    } else {
        for result in &results {
            println!("{}", result.title);
            println!("  {}", result.url);
            println!("  {}", result.content.trim());
        }
    }
    Ok(())
}

async fn handle_chat(executor: AgentExecutor, session_id: &str) -> anyhow::Result<()> {
    use tokio::io::AsyncBufReadExt;

    let agent = executor.with_history(Arc::new(MemoryHistoryStore::new()));

    println!("weft chat (type \"exit\" to quit)");
    prompt_marker();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt_marker();
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let printer = spawn_printer(event_rx);
        let outcome = agent.run(session_id, input, event_tx).await;
        let printed = printer.await.unwrap_or(false);

        match outcome {
            Ok(outcome) => {
                if !printed {
                    println!("{}", outcome.output);
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
        prompt_marker();
    }
    Ok(())
}

fn handle_policy(json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<serde_json::Value> = ALL_PACKAGES
            .iter()
            .map(|&package| {
                serde_json::json!({
                    "package": package,
                    "version_line": package.version_line(),
                    "bumps": ALL_CHANGES
                        .iter()
                        .map(|&change| serde_json::json!({
                            "change": change,
                            "bump": bump_for(package, change),
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for package in ALL_PACKAGES {
            let line = package.version_line().unwrap_or("independent");
            println!("{package} ({line})");
            for change in ALL_CHANGES {
                println!("  {:<38} {}", change.to_string(), bump_for(package, change));
            }
        }
    }
    Ok(())
}

/// Assemble an executor for the chosen model. Pages given on the command
/// line are ingested into a retriever tool; the run tracer is attached
/// when enabled.
async fn build_executor(
    config: &WeftConfig,
    model_override: Option<String>,
    urls: &[String],
    max_iterations: Option<usize>,
) -> anyhow::Result<AgentExecutor> {
    let model_id = model_override.unwrap_or_else(|| config.model.clone());
    let models = ModelRegistry::from_config(config);
    let model = models.for_model(&model_id)?;

    let mut tools = ToolRegistry::new();
    if config.search_api_key.is_some() {
        tools.register(Box::new(WebSearchTool::new(search_client(config)?)));
    }
    if !urls.is_empty() {
        let retriever = ingest(config, urls).await?;
        tools.register(Box::new(RetrieverTool::new(
            retriever,
            "docs_search",
            "Search the ingested web pages for passages relevant to a query.",
        )));
    }

    let agent =
        ToolCallingAgent::from_registry(model, model_id.as_str(), &tools, ChatPrompt::default());
    let mut executor = AgentExecutor::new(agent, tools);
    if let Some(n) = max_iterations {
        executor = executor.with_max_iterations(n);
    }
    if config.tracing_enabled {
        let mut tracer = RunTracer::new();
        tracer.add_sink(Arc::new(CallbackSink::new(|event| {
            tracing::info!(target: "weft::trace", "{}", event.kind.summary());
        })));
        executor = executor.with_tracer(Arc::new(tracer));
    }
    Ok(executor)
}

/// Fetch and chunk pages, then index them; slow embedding happens up front
/// rather than during the agent run.
async fn ingest(config: &WeftConfig, urls: &[String]) -> anyhow::Result<Retriever> {
    let loader = WebLoader::new();
    let docs = loader.load_all(urls).await?;

    let splitter = TextSplitter::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)?;
    let chunks = splitter.split_documents(&docs);
    tracing::info!(pages = docs.len(), chunks = chunks.len(), "ingested pages");

    let retriever = Retriever::from_documents(chunks, build_embedder(config)).await?;
    Ok(retriever)
}

fn build_embedder(config: &WeftConfig) -> Arc<dyn Embedder> {
    match &config.openai_api_key {
        Some(key) => {
            let mut embedder = ApiEmbedder::new(key, EMBEDDING_MODEL);
            if let Some(base) = &config.openai_base_url {
                embedder = embedder.with_base_url(base);
            }
            Arc::new(embedder)
        }
        // No embeddings credential: fall back to deterministic local vectors
        None => Arc::new(LexicalEmbedder::new(LexicalEmbedder::DEFAULT_DIM)),
    }
}

fn search_client(config: &WeftConfig) -> anyhow::Result<SearchClient> {
    let key = config.search_key()?;
    Ok(match &config.search_base_url {
        Some(base) => SearchClient::with_base_url(key, base.clone()),
        None => SearchClient::new(key),
    })
}

async fn run_once(executor: &AgentExecutor, input: &str) -> anyhow::Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(event_rx);
    let outcome = executor.run(input, &[], event_tx).await;
    let printed = printer.await.unwrap_or(false);

    let outcome = outcome?;
    if !printed {
        println!("{}", outcome.output);
    }
    Ok(())
}

/// Print run events as they arrive: answer text to stdout, tool activity to
/// stderr. Returns whether any answer text was streamed.
fn spawn_printer(
    mut event_rx: mpsc::UnboundedReceiver<AgentEvent>,
) -> tokio::task::JoinHandle<bool> {
    tokio::spawn(async move {
        let mut printed = false;
        while let Some(event) = event_rx.recv().await {
            match event {
                AgentEvent::MessageDelta { text } => {
                    print!("{text}");
                    flush_stdout();
                    printed = true;
                }
                AgentEvent::ToolStart { tool_name, .. } => {
                    eprintln!("[{tool_name}] running");
                }
                AgentEvent::ToolEnd {
                    content, is_error, ..
                } if is_error => {
                    eprintln!("[tool error] {content}");
                }
                AgentEvent::RunEnd { .. } if printed => println!(),
                _ => {}
            }
        }
        printed
    })
}

fn prompt_marker() {
    print!("> ");
    flush_stdout();
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}
