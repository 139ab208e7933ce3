use anyhow::{Context, Result};
use clap::Parser;
use ragchat::config::{ChatProviderKind, RagConfig};
use ragchat::generate::create_chat_model;
use ragchat::repl::Repl;
use ragchat::session::SessionStore;
use ragchat::{TurnConfig, TurnController, build_retriever, load_document};
use ragchat_embed::ProviderKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Chat with a text document. Answers are grounded in the passages most
/// relevant to each question.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Document to answer from (default: someText.txt)
    document: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "RAGCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Session id to start in
    #[arg(short, long)]
    session: Option<String>,

    /// Number of passages retrieved per question
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Maximum chunk length in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by neighbouring chunks
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Embedding backend: gemini, fastembed or hashing
    #[arg(long)]
    embedding_provider: Option<ProviderKind>,

    /// Embedding model id
    #[arg(long)]
    embedding_model: Option<String>,

    /// Chat backend: gemini or echo
    #[arg(long)]
    chat_provider: Option<ChatProviderKind>,

    /// Chat model id
    #[arg(long)]
    chat_model: Option<String>,

    /// Per-turn time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run without network access (hashing embeddings, echo replies)
    #[arg(long)]
    offline: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(self, mut config: RagConfig) -> RagConfig {
        if let Some(document) = self.document {
            config.document = document;
        }
        if let Some(session) = self.session {
            config.session_id = session;
        }
        if let Some(k) = self.top_k {
            config.retrieval_k = k;
        }
        if let Some(size) = self.chunk_size {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.chunking.chunk_overlap = overlap;
        }
        if self.offline {
            config.embedding.provider = ProviderKind::Hashing;
            config.generation.provider = ChatProviderKind::Echo;
        }
        if let Some(provider) = self.embedding_provider {
            config.embedding.provider = provider;
        }
        if let Some(model) = self.embedding_model {
            config.embedding.model = model;
        }
        if let Some(provider) = self.chat_provider {
            config.generation.provider = provider;
        }
        if let Some(model) = self.chat_model {
            config.generation.model = model;
        }
        if let Some(timeout) = self.timeout {
            config.turn_timeout_secs = timeout;
        }
        config
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = RagConfig::load(args.config.as_deref())?;
    let config = args.apply(config).with_env_api_key();
    config.validate()?;
    info!("Starting with {:?}", config);

    let document = load_document(&config.document).await?;
    let retriever = build_retriever(&config, &document)
        .await
        .context("Failed to build the document index")?;
    let model = create_chat_model(&config.generation, config.api_key.as_deref())?;

    let controller = TurnController::new(retriever, model, Arc::new(SessionStore::new()))
        .with_config(TurnConfig::from(&config));

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut stdout = tokio::io::stdout();
    Repl::new(&controller, config.session_id.clone())
        .with_shutdown(shutdown)
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;
    Ok(())
}
