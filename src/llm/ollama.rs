use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::openai_compat::parse_vector;
use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::RagError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }

        let body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
            "options": options,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("{} unreachable: {}", url, e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "ollama chat returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        payload["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RagError::Generation("response carried no message content".to_string()))
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("{} unreachable: {}", url, e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "ollama embed returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        payload["embeddings"]
            .as_array()
            .ok_or_else(|| RagError::Embedding("response carried no `embeddings` array".to_string()))?
            .iter()
            .map(parse_vector)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::spawn_stub;
    use crate::llm::types::ChatMessage;
    use axum::{routing::post, Json, Router};

    fn provider(base_url: String) -> OllamaProvider {
        OllamaProvider::new(base_url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn chat_sends_options_and_reads_message() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let echoed = format!(
                    "{}|{}|{}",
                    body["model"].as_str().unwrap_or_default(),
                    body["options"]["temperature"],
                    body["options"]["num_predict"]
                );
                Json(json!({ "message": { "role": "assistant", "content": echoed }, "done": true }))
            }),
        );
        let base = spawn_stub(app).await;

        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.temperature = Some(0.5);
        request.max_tokens = Some(64);
        let answer = provider(base).chat(request, "llama3:latest").await.expect("chat");

        assert_eq!(answer, "llama3:latest|0.5|64");
    }

    #[tokio::test]
    async fn embed_returns_vectors_in_order() {
        let app = Router::new().route(
            "/api/embed",
            post(|Json(body): Json<Value>| async move {
                let count = body["input"].as_array().map(Vec::len).unwrap_or(0);
                let embeddings: Vec<Vec<f32>> =
                    (0..count).map(|i| vec![i as f32, 1.0, 0.0]).collect();
                Json(json!({ "model": "all-minilm", "embeddings": embeddings }))
            }),
        );
        let base = spawn_stub(app).await;

        let vectors = provider(base)
            .embed(&["a".into(), "b".into(), "c".into()], "all-minilm")
            .await
            .expect("embed");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2], vec![2.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn unreachable_service_is_an_embedding_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let provider = provider(format!("http://{}", addr));
        assert!(!provider.health_check().await.expect("health"));

        let err = provider
            .embed(&["a".into()], "all-minilm")
            .await
            .expect_err("should fail");
        assert!(matches!(err, RagError::Embedding(_)));
    }
}
