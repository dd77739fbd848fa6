//! Prompt assembly for grounded answers.
//!
//! Builds the final prompt from retrieved chunks, conversation history and the
//! current question, keeping it inside the model's input budget.

use serde::Serialize;

use super::index::RetrievedChunk;
use super::memory::ConversationTurn;

const PREAMBLE: &str = "You are AutoMentor, a knowledgeable and precise automotive AI assistant.
Use the following pieces of context to answer the user's question.
If you don't know the answer from the context provided, state that you don't have enough information, don't try to make up an answer.
Always provide step-by-step instructions in a clear, numbered list if the query involves a procedure.
Cite the source document if its metadata is available in the context.";

const NO_CONTEXT: &str = "(no relevant context found)";
const NO_HISTORY: &str = "(none)";

/// Rough token estimate, ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledPrompt {
    pub text: String,
    pub chunks_used: usize,
    pub turns_used: usize,
    pub dropped_turns: usize,
    pub dropped_chunks: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_prompt_tokens: usize,
}

impl PromptAssembler {
    pub fn new(max_prompt_tokens: usize) -> Self {
        Self { max_prompt_tokens }
    }

    pub fn max_prompt_tokens(&self) -> usize {
        self.max_prompt_tokens
    }

    /// Over budget, the oldest turns go first, then the lowest-ranked chunks.
    pub fn assemble(
        &self,
        chunks: &[RetrievedChunk],
        turns: &[ConversationTurn],
        question: &str,
    ) -> AssembledPrompt {
        let mut chunks = chunks;
        let mut turns = turns;
        let mut dropped_turns = 0;
        let mut dropped_chunks = 0;

        loop {
            let text = render(chunks, turns, question);
            let estimated_tokens = estimate_tokens(&text);

            if estimated_tokens <= self.max_prompt_tokens || (turns.is_empty() && chunks.is_empty()) {
                if estimated_tokens > self.max_prompt_tokens {
                    tracing::warn!(
                        estimated_tokens,
                        budget = self.max_prompt_tokens,
                        "prompt exceeds budget even without context or history"
                    );
                }
                if dropped_turns > 0 || dropped_chunks > 0 {
                    tracing::debug!(dropped_turns, dropped_chunks, "prompt truncated to fit budget");
                }
                return AssembledPrompt {
                    text,
                    chunks_used: chunks.len(),
                    turns_used: turns.len(),
                    dropped_turns,
                    dropped_chunks,
                    estimated_tokens,
                };
            }

            if !turns.is_empty() {
                turns = &turns[1..];
                dropped_turns += 1;
            } else {
                chunks = &chunks[..chunks.len() - 1];
                dropped_chunks += 1;
            }
        }
    }
}

fn render(chunks: &[RetrievedChunk], turns: &[ConversationTurn], question: &str) -> String {
    let mut out = String::with_capacity(PREAMBLE.len() + question.len() + 256);
    out.push_str(PREAMBLE);

    out.push_str("\n\nContext:\n");
    if chunks.is_empty() {
        out.push_str(NO_CONTEXT);
        out.push('\n');
    }
    for (i, hit) in chunks.iter().enumerate() {
        out.push_str(&format!(
            "[{}] (Source: {})\n{}\n\n",
            i + 1,
            hit.chunk.citation(),
            hit.chunk.text
        ));
    }

    out.push_str("\nConversation history:\n");
    if turns.is_empty() {
        out.push_str(NO_HISTORY);
        out.push('\n');
    }
    for turn in turns {
        out.push_str(&format!("User: {}\nAutoMentor: {}\n", turn.question, turn.answer));
    }

    out.push_str(&format!("\nCurrent question: {}\nAnswer:", question));
    out
}

/// Asks the model to rewrite a follow-up into a standalone question.
pub fn condense_prompt(turns: &[ConversationTurn], question: &str) -> String {
    let mut out = String::from(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question. Reply with the question only.\n\nChat History:\n",
    );
    for turn in turns {
        out.push_str(&format!("User: {}\nAutoMentor: {}\n", turn.question, turn.answer));
    }
    out.push_str(&format!("\nFollow Up Input: {}\nStandalone question:", question));
    out
}
