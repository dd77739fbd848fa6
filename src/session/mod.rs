//! Query-time pipeline and per-conversation state.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::errors::RagError;
use crate::llm::{Generator, LlmProvider};
use crate::rag::prompt::condense_prompt;
use crate::rag::{ConversationMemory, Embedder, PromptAssembler, RetrievedChunk, Retriever, VectorIndex};

pub use store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingQuestion,
    Retrieving,
    Generating,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    state: SessionState,
    memory: ConversationMemory,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), max_turns)
    }

    pub fn with_id(id: impl Into<String>, max_turns: Option<usize>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Idle,
            memory: ConversationMemory::new(max_turns),
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::AwaitingQuestion;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn clear(&mut self) {
        self.memory.clear();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub page: Option<u32>,
    pub row: Option<u64>,
    pub chunk_index: usize,
    pub distance: f32,
}

impl From<&RetrievedChunk> for SourceRef {
    fn from(hit: &RetrievedChunk) -> Self {
        Self {
            source: hit.chunk.source.clone(),
            page: hit.chunk.page,
            row: hit.chunk.row,
            chunk_index: hit.chunk.chunk_index,
            distance: hit.distance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub turn: u64,
}

/// Retriever → prompt assembler → generator, shared by every session.
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Generator,
    condense_question: bool,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: Generator,
        condense_question: bool,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            condense_question,
        }
    }

    pub fn from_settings(settings: &Settings, provider: Arc<dyn LlmProvider>) -> Self {
        let embedder = Embedder::from_settings(provider.clone(), &settings.models);
        Self::new(
            Retriever::new(embedder, settings.rag.top_k),
            PromptAssembler::new(settings.rag.max_prompt_tokens),
            Generator::new(provider, settings.models.clone()),
            settings.rag.condense_question,
        )
    }

    pub fn embedding_model(&self) -> &str {
        self.retriever.embedder().model()
    }

    /// One conversational turn. A failed turn leaves memory untouched.
    pub async fn ask(
        &self,
        index: &VectorIndex,
        session: &mut ChatSession,
        question: &str,
    ) -> Result<Answer, RagError> {
        match session.state {
            SessionState::Closed => return Err(RagError::SessionClosed),
            SessionState::Idle => session.start(),
            _ => {}
        }

        let result = self.run_turn(index, session, question).await;
        session.state = SessionState::AwaitingQuestion;

        match result {
            Ok((answer, hits)) => {
                let turn = session.memory.append(question, answer.clone()).sequence;
                tracing::info!(session_id = %session.id, turn, sources = hits.len(), "answered question");
                Ok(Answer {
                    answer,
                    sources: hits.iter().map(SourceRef::from).collect(),
                    turn,
                })
            }
            Err(err) => {
                if err.is_recoverable() {
                    tracing::warn!(session_id = %session.id, error = %err, "turn failed, retry possible");
                } else {
                    tracing::error!(session_id = %session.id, error = %err, "turn failed");
                }
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        index: &VectorIndex,
        session: &mut ChatSession,
        question: &str,
    ) -> Result<(String, Vec<RetrievedChunk>), RagError> {
        session.state = SessionState::Retrieving;

        let history = session.memory.recent();
        let search_query = if self.condense_question && !history.is_empty() {
            let standalone = self.generator.generate(&condense_prompt(history, question)).await?;
            tracing::debug!(standalone = %standalone, "condensed follow-up question");
            standalone
        } else {
            question.to_string()
        };

        let hits = self.retriever.retrieve(index, &search_query).await?;
        let prompt = self.assembler.assemble(&hits, history, question);

        session.state = SessionState::Generating;
        let answer = self.generator.generate(&prompt.text).await?;

        let used = hits.into_iter().take(prompt.chunks_used).collect();
        Ok((answer, used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::ModelSettings;
    use crate::core::config::DistanceMetric;
    use crate::llm::ChatRequest;
    use crate::rag::index::tests::entry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds by keyword and answers with a numbered reply, recording prompts.
    struct Scripted {
        prompts: Mutex<Vec<String>>,
        fail_next: Mutex<bool>,
    }

    impl Scripted {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                fail_next: Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool, RagError> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
            let mut fail = self.fail_next.lock().expect("lock");
            if *fail {
                *fail = false;
                return Err(RagError::Generation("model offline".into()));
            }
            let mut prompts = self.prompts.lock().expect("lock");
            prompts.push(request.messages[0].content.clone());
            Ok(format!("reply {}", prompts.len()))
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs
                .iter()
                .map(|s| if s.contains("battery") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn pipeline(provider: Arc<Scripted>, condense: bool) -> RagPipeline {
        RagPipeline::new(
            Retriever::new(Embedder::new(provider.clone(), "m", 8), 1),
            PromptAssembler::new(10_000),
            Generator::new(provider, ModelSettings::default()),
            condense,
        )
    }

    fn index() -> VectorIndex {
        VectorIndex::build(
            vec![entry("battery", vec![1.0, 0.0]), entry("tyres", vec![0.0, 1.0])],
            "m",
            DistanceMetric::Cosine,
        )
        .expect("build")
    }

    #[tokio::test]
    async fn turn_appends_memory_and_returns_sources() {
        let provider = Scripted::new();
        let pipeline = pipeline(provider.clone(), false);
        let mut session = ChatSession::new(None);

        let answer = pipeline
            .ask(&index(), &mut session, "battery size?")
            .await
            .expect("answer");

        assert_eq!(answer.answer, "reply 1");
        assert_eq!(answer.turn, 1);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source, "battery.txt");
        assert_eq!(session.state(), SessionState::AwaitingQuestion);
        assert_eq!(session.memory().len(), 1);
    }

    #[tokio::test]
    async fn failed_turn_keeps_memory_and_session_usable() {
        let provider = Scripted::new();
        let pipeline = pipeline(provider.clone(), false);
        let mut session = ChatSession::new(None);

        *provider.fail_next.lock().expect("lock") = true;
        let err = pipeline
            .ask(&index(), &mut session, "battery size?")
            .await
            .expect_err("offline");

        assert!(err.is_recoverable());
        assert!(session.memory().is_empty());
        assert_eq!(session.state(), SessionState::AwaitingQuestion);

        pipeline
            .ask(&index(), &mut session, "battery size?")
            .await
            .expect("retry");
        assert_eq!(session.memory().len(), 1);
    }

    #[tokio::test]
    async fn closed_session_rejects_questions() {
        let pipeline = pipeline(Scripted::new(), false);
        let mut session = ChatSession::new(None);
        session.close();

        let err = pipeline.ask(&index(), &mut session, "q").await.expect_err("closed");
        assert!(matches!(err, RagError::SessionClosed));
    }

    #[tokio::test]
    async fn condensed_question_drives_retrieval() {
        let provider = Scripted::new();
        let pipeline = pipeline(provider.clone(), true);
        let mut session = ChatSession::new(None);

        pipeline.ask(&index(), &mut session, "tell me about tyres").await.expect("first");
        // The follow-up is condensed to "reply 2", which carries no keyword.
        let answer = pipeline.ask(&index(), &mut session, "and the battery?").await.expect("second");

        let prompts = provider.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Follow Up Input: and the battery?"));
        assert!(prompts[2].contains("Current question: and the battery?"));
        assert_eq!(answer.sources[0].source, "tyres.txt");
    }
}
