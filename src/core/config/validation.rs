use serde_json::{Map, Value};

use super::settings::DistanceMetric;
use crate::core::errors::RagError;

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(paths) = expect_optional_object(root, "paths")? {
        validate_required_string_field(paths, "paths.source_dir", "source_dir")?;
        validate_required_string_field(paths, "paths.index_dir", "index_dir")?;
    }

    if let Some(models) = expect_optional_object(root, "models")? {
        validate_enum_field(models, "models.provider", "provider", &["ollama", "openai_compat"])?;
        validate_required_string_field(models, "models.base_url", "base_url")?;
        if let Some(url) = models.get("base_url").and_then(|v| v.as_str()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RagError::InvalidConfig(format!(
                    "Invalid config at 'models.base_url': expected an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        validate_required_string_field(models, "models.llm_model", "llm_model")?;
        validate_required_string_field(models, "models.embedding_model", "embedding_model")?;
        validate_f64_field(models, "models.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(models, "models.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(
            models,
            "models.embedding_batch_size",
            "embedding_batch_size",
            1,
            4096,
        )?;
        validate_u64_field(
            models,
            "models.request_timeout_secs",
            "request_timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(rag, "rag.max_prompt_tokens", "max_prompt_tokens", 1, 10_000_000)?;
        validate_bool_field(rag, "rag.condense_question", "condense_question")?;

        let metrics: Vec<&str> = [DistanceMetric::Cosine, DistanceMetric::L2]
            .iter()
            .map(|m| m.as_str())
            .collect();
        validate_enum_field(rag, "rag.distance", "distance", &metrics)?;

        let size = rag.get("chunk_size").and_then(|v| v.as_u64());
        let overlap = rag.get("chunk_overlap").and_then(|v| v.as_u64());
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(RagError::InvalidConfig(format!(
                    "Invalid config at 'rag.chunk_overlap': must be smaller than rag.chunk_size ({})",
                    size
                )));
            }
        }
    }

    if let Some(memory) = expect_optional_object(root, "memory")? {
        validate_u64_field(memory, "memory.max_turns", "max_turns", 1, 100_000)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_required_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
        validate_u64_field(
            server,
            "server.session_idle_secs",
            "session_idle_secs",
            1,
            7 * 24 * 3600,
        )?;
        validate_u64_field(server, "server.max_sessions", "max_sessions", 1, 1_000_000)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "non-negative integer"));
    };
    if number < min || number > max {
        return Err(RagError::InvalidConfig(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(RagError::InvalidConfig(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let value = section.get(key).ok_or_else(|| {
        RagError::InvalidConfig(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::InvalidConfig(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(RagError::InvalidConfig(format!(
        "Invalid config at '{}': expected one of {}, got '{}'",
        path,
        allowed.join(", "),
        text
    )))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(RagError::InvalidConfig(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::InvalidConfig(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
