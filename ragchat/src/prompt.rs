//! Prompt assembly for grounded chat turns

use crate::session::Message;
use ragchat_context::TextChunk;

/// System instruction sent with every turn
pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant. Use the provided context to answer questions accurately.";

/// Separator placed between retrieved chunks in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Everything the chat model sees for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system_instruction: String,
    /// Retrieved chunk texts joined in relevance order
    pub context: String,
    pub question: String,
    /// Prior messages of the session, oldest first
    pub history: Vec<Message>,
}

impl Prompt {
    pub fn new(
        system_instruction: impl Into<String>,
        chunks: &[TextChunk],
        question: impl Into<String>,
        history: Vec<Message>,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            context: context_block(chunks),
            question: question.into(),
            history,
        }
    }

    /// The final user turn: context followed by the question.
    ///
    /// ```
    /// use ragchat::prompt::{Prompt, SYSTEM_INSTRUCTION};
    /// use ragchat_context::TextChunk;
    ///
    /// let chunk = TextChunk { sequence: 0, source_offset: 0, text: "X is a letter.".into() };
    /// let prompt = Prompt::new(SYSTEM_INSTRUCTION, &[chunk], "What is X?", vec![]);
    /// assert_eq!(prompt.human_turn(), "Context:\nX is a letter.\n\nQuestion:\nWhat is X?");
    /// ```
    pub fn human_turn(&self) -> String {
        format!("Context:\n{}\n\nQuestion:\n{}", self.context, self.question)
    }
}

/// Join chunk texts in the given order.
pub fn context_block(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
