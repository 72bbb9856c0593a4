//! Execution requests and results.

use std::collections::BTreeMap;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Exit code reported for executions killed by the deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Bytes of stdout and of stderr kept per execution.
pub const OUTPUT_LIMIT_BYTES: usize = 32 * 1024;

/// Code to run inside a session.
///
/// ```
/// use std::time::Duration;
/// use turnstile::sandbox::ExecutionRequest;
///
/// let request = ExecutionRequest::builder()
///     .code("print('hi')")
///     .language("python")
///     .timeout_override(Duration::from_secs(5))
///     .build();
/// assert_eq!(request.language, "python");
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    #[builder(into)]
    pub code: String,
    #[builder(into)]
    pub language: String,
    /// Replaces the session default timeout for this execution only.
    pub timeout_override: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            timeout_override: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Files created or modified in the working directory by this execution.
    #[serde(with = "artifact_encoding", default)]
    pub artifacts: BTreeMap<String, Vec<u8>>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Result for a request the session cannot run at all.
    pub(crate) fn rejected(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }
}

/// Artifact bytes travel as base64 strings in serialized results.
mod artifact_encoding {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        artifacts: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = artifacts
            .iter()
            .map(|(name, bytes)| (name.as_str(), STANDARD.encode(bytes)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(name, data)| {
                STANDARD
                    .decode(data)
                    .map(|bytes| (name, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
