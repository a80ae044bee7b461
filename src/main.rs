//! sitechat command line: crawl a site, build its knowledge index, and
//! answer questions about it from the terminal or over HTTP.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitechat::api::{self, AppState};
use sitechat::config::{CrawlConfig, SiteChatConfig};
use sitechat::crawler::{PageFetcher, SiteCrawler, StaticFetcher};
use sitechat::index::{InMemoryVectorIndex, KnowledgeIndex, VectorIndex};
use sitechat::providers::{
    CompletionProvider, EmbeddingProvider, OpenAiCompletionProvider, OpenAiEmbeddingProvider,
};
use sitechat::types::{ChatMessage, SiteChatError};
use sitechat::workflow::{self, ChatWorkflow};

#[derive(Parser)]
#[command(name = "sitechat", version, about = "Turn a website into a queryable knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve,
    /// Crawl a website and rebuild the knowledge index.
    Index {
        /// Origin URL to crawl from.
        url: String,
        /// Maximum link depth from the origin.
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Maximum number of pages to fetch.
        #[arg(long, default_value_t = 100)]
        max_pages: usize,
        /// Render pages in a headless browser before extraction.
        #[arg(long)]
        rendered: bool,
    },
    /// Interactive chat against the current index.
    Chat {
        /// Passages retrieved per question.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// One-off retrieval without composition.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete the current index.
    Drop,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SiteChatError> {
    let config = Arc::new(SiteChatConfig::from_env()?);

    let store: Arc<dyn VectorIndex> = match &config.snapshot_path {
        Some(path) => Arc::new(InMemoryVectorIndex::with_snapshot(path).await?),
        None => Arc::new(InMemoryVectorIndex::new()),
    };
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddingProvider::new(
        &config.api_base,
        &config.api_key,
        &config.embedding_model,
        config.embedding_dimensions,
    )?);
    let index = Arc::new(KnowledgeIndex::new(embedder, store, config.chunk.clone()));
    let completion: Arc<dyn CompletionProvider> = Arc::new(OpenAiCompletionProvider::new(
        &config.api_base,
        &config.api_key,
        &config.chat_model,
    )?);

    match cli.command {
        Command::Serve => {
            let workflow = Arc::new(ChatWorkflow::new(Arc::clone(&index), completion));
            api::serve(AppState {
                workflow,
                index,
                config,
            })
            .await
        }
        Command::Index {
            url,
            depth,
            max_pages,
            rendered,
        } => {
            let crawl = CrawlConfig::new(url)
                .with_max_depth(depth)
                .with_max_pages(max_pages);
            let fetcher = build_fetcher(rendered, &crawl).await?;
            let crawler = SiteCrawler::new(fetcher, crawl)?;
            let pages = crawler.crawl().await?;
            let report = index.rebuild(&pages).await?;
            info!(
                pages = report.pages,
                passages = report.passages,
                degraded_batches = report.degraded_batches,
                "index rebuilt"
            );
            println!(
                "Indexed {} pages into {} passages{}",
                report.pages,
                report.passages,
                if report.degraded_batches > 0 {
                    format!(" ({} degraded embedding batches)", report.degraded_batches)
                } else {
                    String::new()
                }
            );
            Ok(())
        }
        Command::Chat { top_k } => {
            let workflow = ChatWorkflow::new(Arc::clone(&index), completion);
            chat_loop(&workflow, top_k.unwrap_or(config.top_k)).await
        }
        Command::Search { query, top_k } => {
            let result = index.search(&query, top_k.unwrap_or(config.top_k)).await?;
            for (i, m) in result.matches.iter().enumerate() {
                let heading = m
                    .passage
                    .heading
                    .as_deref()
                    .map(|h| format!(" / {h}"))
                    .unwrap_or_default();
                println!(
                    "{}. [{:.3}] {}{}\n   {}\n   {}",
                    i + 1,
                    m.score,
                    m.passage.source_title,
                    heading,
                    m.passage.source_url,
                    snippet(&m.passage.text, 200),
                );
            }
            Ok(())
        }
        Command::Drop => {
            if index.drop_if_exists().await? {
                println!("Index dropped.");
            } else {
                println!("No index to drop.");
            }
            Ok(())
        }
    }
}

async fn build_fetcher(
    rendered: bool,
    crawl: &CrawlConfig,
) -> Result<Arc<dyn PageFetcher>, SiteChatError> {
    if rendered {
        #[cfg(feature = "rendered")]
        {
            let fetcher = sitechat::crawler::RenderedFetcher::launch(crawl.fetch_timeout).await?;
            return Ok(Arc::new(fetcher));
        }
        #[cfg(not(feature = "rendered"))]
        return Err(SiteChatError::Config(
            "this build does not include the rendered fetcher; rebuild with --features rendered"
                .into(),
        ));
    }
    Ok(Arc::new(StaticFetcher::new(crawl.fetch_timeout)?))
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

async fn chat_loop(workflow: &ChatWorkflow, top_k: usize) -> Result<(), SiteChatError> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    println!("Ask questions about the indexed site. Empty line or Ctrl-D exits.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            break;
        }

        match workflow
            .process_query(query, workflow::clamp_history(&history), top_k)
            .await
        {
            Ok(answer) => {
                println!("\n{}\n", answer.text);
                if !answer.citations.is_empty() {
                    println!("Sources:");
                    for (i, citation) in answer.citations.iter().enumerate() {
                        let headings = if citation.headings.is_empty() {
                            String::new()
                        } else {
                            format!(
                                " ({})",
                                citation
                                    .headings
                                    .iter()
                                    .cloned()
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            )
                        };
                        println!("  {}. {}{} - {}", i + 1, citation.title, headings, citation.url);
                    }
                    println!();
                }
                history.push(ChatMessage::user(query));
                history.push(ChatMessage::assistant(&answer.text));
            }
            Err(err) => {
                eprintln!("error: {err}");
            }
        }
    }
    Ok(())
}
