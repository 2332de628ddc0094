use serde_json::{Map, Value};

use super::defaults::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_f64_field(llm, "llm.top_p", "top_p", 0.0, 1.0)?;
        validate_f64_field(
            llm,
            "llm.frequency_penalty",
            "frequency_penalty",
            -2.0,
            2.0,
        )?;
        validate_f64_field(llm, "llm.presence_penalty", "presence_penalty", -2.0, 2.0)?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(chat) = expect_optional_object(root, "chat")? {
        validate_optional_string_field(chat, "chat.system_prompt", "system_prompt")?;
        validate_optional_string_field(chat, "chat.greeting", "greeting")?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 16, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(rag, "rag.max_chunks", "max_chunks", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.retriever_top_k", "retriever_top_k", 1, 10_000)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 1_000)?;
        validate_f64_field(rag, "rag.rrf_k", "rrf_k", 0.0, 10_000.0)?;
        validate_u64_field(
            rag,
            "rag.summarize_concurrency",
            "summarize_concurrency",
            1,
            64,
        )?;
        validate_u64_field(
            rag,
            "rag.max_context_chars",
            "max_context_chars",
            1,
            10_000_000,
        )?;

        // A missing key falls back to the default the server will start with.
        let size = rag
            .get("chunk_size")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_CHUNK_SIZE as u64);
        let overlap = rag
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_CHUNK_OVERLAP as u64);
        if overlap >= size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'rag.chunk_overlap': {} must be smaller than chunk_size ({})",
                overlap, size
            )));
        }
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_string_array_field(server, "server.allowed_origins", "allowed_origins")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
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
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
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
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_complete_config() {
        let config = json!({
            "llm": {"model": "gpt-3.5-turbo", "temperature": 0.7, "max_tokens": 500, "top_p": 1},
            "chat": {"system_prompt": "You are a helpful assistant."},
            "rag": {"chunk_size": 500, "chunk_overlap": 50, "summarize_concurrency": 3},
            "server": {"allowed_origins": ["http://localhost:5173"]}
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = validate_config(&json!({"llm": {"temperature": 3.5}})).unwrap_err();
        assert!(err.to_string().contains("llm.temperature"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let err =
            validate_config(&json!({"rag": {"chunk_size": 100, "chunk_overlap": 100}})).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn overlap_is_checked_against_the_default_chunk_size() {
        let err = validate_config(&json!({"rag": {"chunk_overlap": 600}})).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));

        let err = validate_config(&json!({"rag": {"chunk_size": 40}})).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));

        assert!(validate_config(&json!({"rag": {"chunk_overlap": 100}})).is_ok());
    }

    #[test]
    fn rejects_wrong_section_type() {
        let err = validate_config(&json!({"chat": "hello"})).unwrap_err();
        assert!(err.to_string().contains("expected object"));
    }
}
