//! Typed access to tool call arguments.

use crate::error::TurnstileError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, TurnstileError> {
        self.value.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
            TurnstileError::InvalidArgument(format!("Missing string argument: {key}"))
        })
    }

    /// Deserialize the entire arguments into a typed struct.
    ///
    /// Responders sometimes send arguments as a JSON-encoded string; those are
    /// parsed first.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, TurnstileError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str::<serde_json::Value>(trimmed).map_err(|e| {
                        TurnstileError::InvalidArgument(format!(
                            "Failed to deserialize arguments: {e}"
                        ))
                    })?
                }
            }
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            TurnstileError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
