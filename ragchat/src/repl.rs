//! Line-oriented chat loop.
//!
//! Reads one line at a time, answers questions through the
//! [`TurnController`] and handles a few slash commands. Input and output are
//! generic so the loop can run on stdin/stdout or on in-memory buffers.

use crate::session::Role;
use crate::turn::{TurnController, TurnRequest};
use ragchat_context::TextChunk;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const USER_PROMPT: &str = "You: ";
pub const BOT_PREFIX: &str = "Bot: ";
pub const FAREWELL: &str = "Exiting chat.";

const HELP: &str = "\
Commands:
  /history        show this session's messages
  /sources        show the passages used for the last answer
  /session [id]   show or switch the active session
  /stats          show index statistics
  /help           show this help
  exit, quit      leave the chat";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Exit,
    History,
    Sources,
    Session(Option<String>),
    Stats,
    Help,
    Unknown(String),
    Empty,
}

/// Classify one input line.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Command::Exit;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    match name.as_str() {
        "history" => Command::History,
        "sources" => Command::Sources,
        "session" => Command::Session(words.next().map(str::to_string)),
        "stats" => Command::Stats,
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Interactive session bound to one controller
pub struct Repl<'a> {
    controller: &'a TurnController,
    session_id: String,
    last_sources: Vec<TextChunk>,
    shutdown: CancellationToken,
}

impl<'a> Repl<'a> {
    pub fn new(controller: &'a TurnController, session_id: impl Into<String>) -> Self {
        Self {
            controller,
            session_id: session_id.into(),
            last_sources: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling `shutdown` aborts the running turn and ends the loop.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run until `exit`, end of input or shutdown.
    pub async fn run<R, W>(&mut self, mut input: R, output: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            output.write_all(USER_PROMPT.as_bytes()).await?;
            output.flush().await?;

            let mut line = String::new();
            let read = tokio::select! {
                read = input.read_line(&mut line) => read?,
                _ = self.shutdown.cancelled() => 0,
            };
            if read == 0 {
                output.write_all(format!("\n{FAREWELL}\n").as_bytes()).await?;
                break;
            }

            let command = parse_command(&line);
            if command == Command::Exit {
                output.write_all(format!("{FAREWELL}\n").as_bytes()).await?;
                break;
            }

            let reply = self.handle(command).await;
            if !reply.is_empty() {
                output.write_all(reply.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }

            if self.shutdown.is_cancelled() {
                output.write_all(format!("{FAREWELL}\n").as_bytes()).await?;
                break;
            }
        }
        output.flush().await
    }

    async fn handle(&mut self, command: Command) -> String {
        match command {
            Command::Ask(query) => self.ask(query).await,
            Command::History => self.history().await,
            Command::Sources => self.sources(),
            Command::Session(Some(id)) => {
                debug!("Switching session {} -> {}", self.session_id, id);
                self.session_id = id;
                self.last_sources.clear();
                let turns = self.controller.store().get(&self.session_id).await.turns();
                format!("Switched to session {} ({} turns)", self.session_id, turns)
            }
            Command::Session(None) => format!("Current session: {}", self.session_id),
            Command::Stats => self.stats().await,
            Command::Help => HELP.to_string(),
            Command::Unknown(line) => format!("Unknown command: {line} (try /help)"),
            Command::Empty | Command::Exit => String::new(),
        }
    }

    async fn ask(&mut self, query: String) -> String {
        let request = TurnRequest::new(self.session_id.clone(), query)
            .with_cancel(self.shutdown.child_token());
        match self.controller.run_turn(request).await {
            Ok(result) => {
                self.last_sources = result.retrieved_chunks;
                format!("{BOT_PREFIX}{}", result.response)
            }
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn history(&self) -> String {
        let history = self.controller.store().history(&self.session_id).await;
        if history.is_empty() {
            return "(no messages yet)".to_string();
        }
        history
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "You",
                    Role::Assistant => "Bot",
                };
                format!("[{}] {}: {}", m.timestamp.format("%H:%M:%S"), who, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn sources(&self) -> String {
        if self.last_sources.is_empty() {
            return "(no sources yet)".to_string();
        }
        self.last_sources
            .iter()
            .enumerate()
            .map(|(rank, chunk)| {
                format!(
                    "[{}] chunk {} at byte {}:\n{}",
                    rank + 1,
                    chunk.sequence,
                    chunk.source_offset,
                    chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn stats(&self) -> String {
        let stats = self.controller.retriever().index().stats();
        let sessions = self.controller.store().len().await;
        format!(
            "Chunks: {}\nDimension: {}\nEmbeddings: {} ({})\nCorpus hash: {}\nBuilt: {} in {} ms\nSessions: {}",
            stats.chunk_count,
            stats.dimension,
            stats.provider,
            stats.model,
            stats.corpus_hash,
            stats.built_at.to_rfc3339(),
            stats.build_millis,
            sessions
        )
    }
}
