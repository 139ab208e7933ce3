//! Turn controller behaviour with scripted chat models

use async_trait::async_trait;
use ragchat::error::GenerationError;
use ragchat::generate::ChatModel;
use ragchat::prompt::Prompt;
use ragchat::session::{Role, SessionStore};
use ragchat::{TurnConfig, TurnController, TurnError, TurnPhase, TurnRequest};
use ragchat_context::split_text;
use ragchat_embed::{EmbedError, EmbeddingProvider, EmbeddingResult, HashingProvider};
use ragchat_retriever::{Indexer, Retriever};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DOCUMENT: &str = "X is 1.\n\nY is 2.";

/// Replies "R1", "R2", ... and keeps every prompt it was given
#[derive(Default)]
struct ScriptedModel {
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.clone());
        Ok(format!("R{}", prompts.len()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Fails every call after the first `succeed` ones
struct FailingModel {
    calls: AtomicUsize,
    succeed: usize,
}

#[async_trait]
impl ChatModel for FailingModel {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.succeed {
            Ok("fine".to_string())
        } else {
            Err(GenerationError::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
        }
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Sleeps before answering and tracks how many calls overlap
#[derive(Default)]
struct SlowModel {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowModel {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatModel for SlowModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("slow answer to {}", prompt.question))
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

/// Serves the index build, then fails every query
struct BuildOnlyProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for BuildOnlyProvider {
    async fn embed_texts(&self, texts: &[String]) -> ragchat_embed::Result<EmbeddingResult> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(EmbedError::embedding_gen(std::io::Error::other("connection reset")));
        }
        self.inner.embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        "build-only"
    }

    fn model_name(&self) -> &str {
        "build-only"
    }
}

async fn retriever_with(provider: Arc<dyn EmbeddingProvider>) -> Retriever {
    let chunks = split_text(DOCUMENT, 10, 0).unwrap();
    let index = Indexer::new(Arc::clone(&provider)).build(chunks).await.unwrap();
    Retriever::new(Arc::new(index), provider)
}

async fn controller(model: Arc<dyn ChatModel>) -> TurnController {
    let retriever = retriever_with(Arc::new(HashingProvider::new(128))).await;
    TurnController::new(retriever, model, Arc::new(SessionStore::new()))
}

#[tokio::test]
async fn two_turns_build_history_in_order() {
    let model = Arc::new(ScriptedModel::default());
    let controller = controller(model.clone()).await;

    let first = controller
        .run_turn(TurnRequest::new("chat-1", "What is X?"))
        .await
        .unwrap();
    assert_eq!(first.response, "R1");
    assert_eq!(first.retrieved_chunks[0].text, "X is 1.");

    let second = controller
        .run_turn(TurnRequest::new("chat-1", "And Y?"))
        .await
        .unwrap();
    assert_eq!(second.response, "R2");
    assert_eq!(second.retrieved_chunks[0].text, "Y is 2.");

    let history = controller.store().history("chat-1").await;
    let transcript: Vec<(Role, &str)> = history
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Role::User, "What is X?"),
            (Role::Assistant, "R1"),
            (Role::User, "And Y?"),
            (Role::Assistant, "R2"),
        ]
    );

    // the second prompt saw the first exchange and the new context
    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].history.is_empty());
    assert_eq!(prompts[1].history.len(), 2);
    assert_eq!(prompts[1].history[1].content, "R1");
    assert!(prompts[1].context.starts_with("Y is 2."));
    assert_eq!(prompts[1].question, "And Y?");
}

#[tokio::test]
async fn history_grows_by_two_per_turn() {
    let controller = controller(Arc::new(ScriptedModel::default())).await;

    for n in 1..=5 {
        controller
            .run_turn(TurnRequest::new("s", format!("question {n}")))
            .await
            .unwrap();
        let history = controller.store().history("s").await;
        assert_eq!(history.len(), 2 * n);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}

#[tokio::test]
async fn oversized_k_uses_every_chunk() {
    let controller = controller(Arc::new(ScriptedModel::default()))
        .await
        .with_config(TurnConfig {
            retrieval_k: 10,
            ..TurnConfig::default()
        });

    let result = controller
        .run_turn(TurnRequest::new("s", "What is X?"))
        .await
        .unwrap();
    assert_eq!(result.retrieved_chunks.len(), 2);
}

#[tokio::test]
async fn failed_generation_leaves_history_unchanged() {
    let controller = controller(Arc::new(FailingModel {
        calls: AtomicUsize::new(0),
        succeed: 1,
    }))
    .await;

    controller
        .run_turn(TurnRequest::new("s", "What is X?"))
        .await
        .unwrap();

    let err = controller
        .run_turn(TurnRequest::new("s", "And Y?"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TurnError::Generation {
            source: GenerationError::Api { status: 503, .. }
        }
    ));
    assert_eq!(err.phase(), TurnPhase::Generating);
    assert_eq!(controller.store().history("s").await.len(), 2);
}

#[tokio::test]
async fn query_embedding_failure_fails_retrieval() {
    let provider = Arc::new(BuildOnlyProvider {
        inner: HashingProvider::new(64),
        calls: AtomicUsize::new(0),
    });
    let retriever = retriever_with(provider).await;
    let controller = TurnController::new(
        retriever,
        Arc::new(ScriptedModel::default()),
        Arc::new(SessionStore::new()),
    );

    let err = controller
        .run_turn(TurnRequest::new("s", "What is X?"))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Embedding { .. }));
    assert_eq!(err.phase(), TurnPhase::Retrieving);
    assert!(controller.store().history("s").await.is_empty());
}

#[tokio::test]
async fn deadline_fails_generation() {
    let controller = controller(Arc::new(SlowModel::new(Duration::from_secs(5)))).await;

    let err = controller
        .run_turn(TurnRequest::new("s", "What is X?").with_timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.phase(), TurnPhase::Generating);
    assert!(controller.store().history("s").await.is_empty());
}

#[tokio::test]
async fn configured_timeout_applies_without_deadline() {
    let controller = controller(Arc::new(SlowModel::new(Duration::from_secs(5))))
        .await
        .with_config(TurnConfig {
            turn_timeout: Duration::from_millis(50),
            ..TurnConfig::default()
        });

    let err = controller
        .run_turn(TurnRequest::new("s", "What is X?"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn cancellation_during_generation() {
    let controller = controller(Arc::new(SlowModel::new(Duration::from_secs(5)))).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = controller
        .run_turn(TurnRequest::new("s", "What is X?").with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.phase(), TurnPhase::Generating);
    assert!(controller.store().history("s").await.is_empty());
}

#[tokio::test]
async fn turns_on_one_session_serialize() {
    let model = Arc::new(SlowModel::new(Duration::from_millis(40)));
    let controller = Arc::new(controller(model.clone()).await);

    let mut turns = JoinSet::new();
    for n in 0..4 {
        let controller = Arc::clone(&controller);
        turns.spawn(async move {
            controller
                .run_turn(TurnRequest::new("shared", format!("question {n}")))
                .await
        });
    }
    while let Some(joined) = turns.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);

    // each exchange is a contiguous user/assistant pair
    let history = controller.store().history("shared").await;
    assert_eq!(history.len(), 8);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].content, format!("slow answer to {}", pair[0].content));
    }
}

#[tokio::test]
async fn turns_on_different_sessions_overlap() {
    let model = Arc::new(SlowModel::new(Duration::from_millis(100)));
    let controller = Arc::new(controller(model.clone()).await);

    let mut turns = JoinSet::new();
    for n in 0..4 {
        let controller = Arc::clone(&controller);
        turns.spawn(async move {
            controller
                .run_turn(TurnRequest::new(format!("session-{n}"), "What is X?"))
                .await
        });
    }
    while let Some(joined) = turns.join_next().await {
        joined.unwrap().unwrap();
    }

    assert!(model.max_in_flight.load(Ordering::SeqCst) >= 2);
    assert_eq!(controller.store().len().await, 4);
    for id in controller.store().session_ids().await {
        assert_eq!(controller.store().history(&id).await.len(), 2);
    }
}
