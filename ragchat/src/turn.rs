//! Conversation turn orchestration.
//!
//! A turn takes the session lock, retrieves context for the question, asks
//! the chat model for a reply and only then records the exchange. Both the
//! retrieval and the generation call race the request deadline and its
//! cancellation token; losing that race fails the turn in the phase it was
//! in and leaves the history as it was.

use crate::error::{GenerationError, RetrievalFailure, TurnError};
use crate::generate::ChatModel;
use crate::prompt::{Prompt, SYSTEM_INSTRUCTION};
use crate::session::SessionStore;
use ragchat_context::TextChunk;
use ragchat_retriever::{DEFAULT_K, Retriever};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Retrieving,
    Generating,
    Completed,
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnPhase::Retrieving => "retrieving",
            TurnPhase::Generating => "generating",
            TurnPhase::Completed => "completed",
            TurnPhase::Failed => "failed",
        })
    }
}

impl TurnError {
    /// The phase the turn was in when it failed.
    pub fn phase(&self) -> TurnPhase {
        match self {
            TurnError::Embedding { .. } => TurnPhase::Retrieving,
            TurnError::Generation { .. } => TurnPhase::Generating,
        }
    }
}

/// One user question addressed to a session
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub query: String,
    /// Absolute deadline; the controller's turn timeout applies when unset
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of a successful turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub response: String,
    /// Chunks used as context, most relevant first
    pub retrieved_chunks: Vec<TextChunk>,
}

#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub retrieval_k: usize,
    pub turn_timeout: Duration,
    pub system_instruction: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            retrieval_k: DEFAULT_K,
            turn_timeout: Duration::from_secs(60),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

enum Interrupted {
    TimedOut,
    Cancelled,
}

impl From<Interrupted> for RetrievalFailure {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::TimedOut => RetrievalFailure::TimedOut,
            Interrupted::Cancelled => RetrievalFailure::Cancelled,
        }
    }
}

impl From<Interrupted> for GenerationError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::TimedOut => GenerationError::TimedOut,
            Interrupted::Cancelled => GenerationError::Cancelled,
        }
    }
}

/// Run `future` unless the deadline passes or the token fires first.
async fn bounded<F: Future>(
    future: F,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = tokio::time::timeout_at(deadline, future) => result.map_err(|_| Interrupted::TimedOut),
    }
}

/// Runs retrieval-augmented turns against a shared session store
pub struct TurnController {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    store: Arc<SessionStore>,
    config: TurnConfig,
}

impl TurnController {
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>, store: Arc<SessionStore>) -> Self {
        Self {
            retriever,
            model,
            store,
            config: TurnConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Answer one question and record the exchange.
    ///
    /// # Errors
    ///
    /// [`TurnError::Embedding`] when retrieval fails, times out or is
    /// cancelled, and [`TurnError::Generation`] when the chat model does.
    /// In both cases the session history is unchanged.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResult, TurnError> {
        let started = Instant::now();
        let deadline = request
            .deadline
            .unwrap_or_else(|| started + self.config.turn_timeout);
        let session_id = request.session_id.as_str();

        // waiting for an earlier turn on this session counts against the deadline
        let mut session = bounded(self.store.lock(session_id), deadline, &request.cancel)
            .await
            .map_err(|reason| self.fail(session_id, RetrievalFailure::from(reason).into()))?;

        debug!("Turn on {} entering {}", session_id, TurnPhase::Retrieving);
        let chunks = match bounded(
            self.retriever.retrieve(&request.query, self.config.retrieval_k),
            deadline,
            &request.cancel,
        )
        .await
        {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => return Err(self.fail(session_id, RetrievalFailure::from(e).into())),
            Err(reason) => return Err(self.fail(session_id, RetrievalFailure::from(reason).into())),
        };

        debug!(
            "Turn on {} entering {} with {} chunks",
            session_id,
            TurnPhase::Generating,
            chunks.len()
        );
        let prompt = Prompt::new(
            self.config.system_instruction.clone(),
            &chunks,
            request.query.clone(),
            session.history().to_vec(),
        );
        let response = match bounded(self.model.generate(&prompt), deadline, &request.cancel).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.fail(session_id, e.into())),
            Err(reason) => return Err(self.fail(session_id, GenerationError::from(reason).into())),
        };

        session.commit_exchange(request.query, response.clone());
        drop(session);

        info!(
            "Turn on {} {} in {} ms",
            session_id,
            TurnPhase::Completed,
            started.elapsed().as_millis()
        );
        Ok(TurnResult {
            response,
            retrieved_chunks: chunks,
        })
    }

    fn fail(&self, session_id: &str, error: TurnError) -> TurnError {
        warn!(
            "Turn on {} {} while {}: {}",
            session_id,
            TurnPhase::Failed,
            error.phase(),
            error
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::EchoChatModel;
    use ragchat_embed::{EmbeddingProvider, HashingProvider};
    use ragchat_retriever::Indexer;

    async fn controller() -> TurnController {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(128));
        let chunks = ragchat_context::split_text("X is 1.\n\nY is 2.", 10, 0).unwrap();
        let index = Indexer::new(Arc::clone(&provider)).build(chunks).await.unwrap();
        TurnController::new(
            Retriever::new(Arc::new(index), provider),
            Arc::new(EchoChatModel::new()),
            Arc::new(SessionStore::new()),
        )
    }

    #[tokio::test]
    async fn test_turn_records_exchange() {
        let controller = controller().await;
        let result = controller
            .run_turn(TurnRequest::new("s", "What is X?"))
            .await
            .unwrap();

        assert_eq!(result.retrieved_chunks.len(), 2);
        assert_eq!(result.response, "From the document: X is 1.");
        assert_eq!(controller.store().history("s").await.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_turn_leaves_history() {
        let controller = controller().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = controller
            .run_turn(TurnRequest::new("s", "What is X?").with_cancel(cancel))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.phase(), TurnPhase::Retrieving);
        assert!(controller.store().history("s").await.is_empty());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(TurnPhase::Generating.to_string(), "generating");
    }
}
