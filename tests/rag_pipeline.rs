use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use automentor::core::config::settings::ModelSettings;
use automentor::core::config::DistanceMetric;
use automentor::core::errors::RagError;
use automentor::ingest::chunker::Chunker;
use automentor::ingest::IngestPipeline;
use automentor::llm::{ChatRequest, Generator, LlmProvider};
use automentor::rag::{Embedder, PromptAssembler, Retriever, VectorIndex};
use automentor::session::{ChatSession, RagPipeline};

const VOCABULARY: [&str; 6] = ["battery", "tyre", "oil", "brake", "charge", "wiper"];

/// Bag-of-keywords embeddings and canned answers; every prompt is recorded.
struct Recording {
    prompts: Mutex<Vec<String>>,
}

impl Recording {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmProvider for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
        let mut prompts = self.prompts.lock().expect("lock");
        prompts.push(request.messages[0].content.clone());
        Ok(format!("answer number {}", prompts.len()))
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect();
                vector.push(0.01);
                vector
            })
            .collect())
    }
}

fn ingest_pipeline(provider: Arc<Recording>) -> IngestPipeline {
    IngestPipeline::new(
        Chunker::new(200, 20).expect("chunker"),
        Embedder::new(provider, "keywords", 16),
        DistanceMetric::Cosine,
    )
}

fn rag_pipeline(provider: Arc<Recording>, top_k: usize) -> RagPipeline {
    RagPipeline::new(
        Retriever::new(Embedder::new(provider.clone(), "keywords", 16), top_k),
        PromptAssembler::new(3000),
        Generator::new(provider, ModelSettings::default()),
        false,
    )
}

fn write_corpus(dir: &std::path::Path) {
    fs::create_dir_all(dir.join("maintenance")).expect("mkdir");
    fs::write(
        dir.join("leaf.txt"),
        "The Nissan Leaf 40kWh battery holds 40 kilowatt-hours.",
    )
    .expect("write");
    fs::write(
        dir.join("maintenance/tyres.txt"),
        "Check tyre pressure monthly. Rotate each tyre every 10,000 km.",
    )
    .expect("write");
    fs::write(
        dir.join("maintenance/service.csv"),
        "item,interval\nengine oil,15000 km\nbrake fluid,2 years\n",
    )
    .expect("write");
    fs::write(dir.join("dashboard.jpg"), b"\xff\xd8\xff\xe0").expect("write");
}

#[tokio::test]
async fn leaf_battery_question_is_grounded_in_the_matching_chunk() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let source = tmp.path().join("docs");
    write_corpus(&source);
    let index_path = tmp.path().join("store").join("index.db");
    let provider = Recording::new();

    let (_, report) = ingest_pipeline(provider.clone())
        .run(&source, &index_path)
        .await
        .expect("ingest");
    assert_eq!(report.files_loaded, 3);
    assert_eq!(report.skipped_files.len(), 1);
    assert!(report.failures.is_empty());

    let index = VectorIndex::load(&index_path).await.expect("load");
    assert_eq!(index.len(), report.chunks);

    let pipeline = rag_pipeline(provider.clone(), 1);
    let mut session = ChatSession::new(None);
    let answer = pipeline
        .ask(&index, &mut session, "What is the battery capacity of the Nissan Leaf 40kWh?")
        .await
        .expect("answer");

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source, "leaf.txt");

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The Nissan Leaf 40kWh battery holds 40 kilowatt-hours."));
    assert!(!prompts[0].contains("tyre pressure"));
}

#[tokio::test]
async fn third_prompt_carries_both_earlier_turns() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let source = tmp.path().join("docs");
    write_corpus(&source);
    let index_path = tmp.path().join("index.db");
    let provider = Recording::new();

    let (index, _) = ingest_pipeline(provider.clone())
        .run(&source, &index_path)
        .await
        .expect("ingest");

    let pipeline = rag_pipeline(provider.clone(), 2);
    let mut session = ChatSession::new(None);
    let questions = [
        "How big is the battery?",
        "How often should I check tyre pressure?",
        "When is the brake fluid due?",
    ];
    for question in questions {
        pipeline.ask(&index, &mut session, question).await.expect("answer");
    }

    let prompts = provider.prompts();
    let third = &prompts[2];
    let first_turn = third
        .find("User: How big is the battery?\nAutoMentor: answer number 1")
        .expect("first turn");
    let second_turn = third
        .find("User: How often should I check tyre pressure?\nAutoMentor: answer number 2")
        .expect("second turn");
    let current = third
        .find("Current question: When is the brake fluid due?")
        .expect("current question");

    assert!(first_turn < second_turn && second_turn < current);
    assert_eq!(session.memory().len(), 3);
}

#[tokio::test]
async fn reingesting_an_unchanged_corpus_is_stable() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let source = tmp.path().join("docs");
    write_corpus(&source);
    let index_path = tmp.path().join("index.db");
    let provider = Recording::new();
    let pipeline = ingest_pipeline(provider);

    let (first, _) = pipeline.run(&source, &index_path).await.expect("first");
    let (second, _) = pipeline.run(&source, &index_path).await.expect("second");

    assert_eq!(first.len(), second.len());
    let first_ids: Vec<_> = first.entries().iter().map(|e| e.chunk.chunk_id.clone()).collect();
    let second_ids: Vec<_> = second.entries().iter().map(|e| e.chunk.chunk_id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn querying_before_ingest_points_at_the_ingest_command() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let err = VectorIndex::load(&tmp.path().join("index.db"))
        .await
        .expect_err("missing index");

    assert!(matches!(err, RagError::IndexNotFound(_)));
    assert!(err.to_string().contains("automentor ingest"));
}
