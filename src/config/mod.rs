//! Configuration (layered: TOML file < environment < code overrides).
//!
//! A [`TurnstileConfig`] is an explicit value: load it once before a run and
//! pass it by reference. Nothing in the library reads configuration from
//! globals.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TurnstileError;
use crate::participant::ParticipantKind;
use crate::termination::TerminationCondition;

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "turnstile.toml";

/// Providers served locally that need no credential.
const LOCAL_PROVIDERS: &[&str] = &["ollama", "lmstudio"];

/// API keys and endpoints per provider.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    api_keys: HashMap<String, String>,
    base_urls: HashMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.api_keys.keys().collect();
        providers.sort();
        f.debug_struct("Credentials")
            .field("api_keys", &providers)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl Credentials {
    /// Read well-known provider variables (OPENAI_API_KEY, ANTHROPIC_API_KEY, etc.).
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        credentials.merge_from(|key| std::env::var(key).ok());
        credentials
    }

    fn merge_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key_mappings = [
            ("OPENAI_API_KEY", "openai"),
            ("ANTHROPIC_API_KEY", "anthropic"),
            ("GOOGLE_API_KEY", "google"),
            ("GEMINI_API_KEY", "google"),
            ("GROQ_API_KEY", "groq"),
            ("MISTRAL_API_KEY", "mistral"),
            ("OPENROUTER_API_KEY", "openrouter"),
        ];
        for (var, provider) in key_mappings {
            if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
                self.api_keys.insert(provider.to_string(), key);
            }
        }

        let url_mappings = [
            ("OPENAI_BASE_URL", "openai"),
            ("ANTHROPIC_BASE_URL", "anthropic"),
            ("OLLAMA_HOST", "ollama"),
            ("LMSTUDIO_BASE_URL", "lmstudio"),
        ];
        for (var, provider) in url_mappings {
            if let Some(url) = lookup(var).filter(|u| !u.is_empty()) {
                self.base_urls.insert(provider.to_string(), url);
            }
        }
    }

    pub fn set_api_key(&mut self, provider: &str, key: impl Into<String>) {
        self.api_keys.insert(provider.to_string(), key.into());
    }

    pub fn get_api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }

    pub fn set_base_url(&mut self, provider: &str, url: impl Into<String>) {
        self.base_urls.insert(provider.to_string(), url.into());
    }

    pub fn get_base_url(&self, provider: &str) -> Option<&str> {
        self.base_urls.get(provider).map(String::as_str)
    }

    /// Whether a provider can be used: it has a key, or it runs locally.
    pub fn has_credentials(&self, provider: &str) -> bool {
        LOCAL_PROVIDERS.contains(&provider) || self.api_keys.contains_key(provider)
    }
}

/// Where sandbox sessions run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SandboxBackendKind {
    /// Host child processes in a dedicated working directory.
    Local,
    /// A container per session.
    #[default]
    Docker,
}

/// Sandbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: SandboxBackendKind,
    pub image: String,
    pub work_dir: PathBuf,
    pub timeout_secs: u64,
    /// Keep the working directory (and its artifacts) after the run.
    pub keep_work_dir: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackendKind::default(),
            image: "python:3.11-slim".to_string(),
            work_dir: PathBuf::from("tmp"),
            timeout_secs: 60,
            keep_work_dir: true,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), TurnstileError> {
        if self.timeout_secs == 0 {
            return Err(TurnstileError::Configuration(
                "sandbox timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.backend == SandboxBackendKind::Docker && self.image.trim().is_empty() {
            return Err(TurnstileError::Configuration(
                "the docker sandbox needs an image".to_string(),
            ));
        }
        Ok(())
    }
}

/// One configured participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: ParticipantKind,
    #[serde(default)]
    pub system_message: Option<String>,
    /// Model provider for generative participants (e.g. `openai`, `ollama`).
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ParticipantConfig {
    pub fn new(name: impl Into<String>, kind: ParticipantKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            system_message: None,
            provider: None,
            model: None,
        }
    }

    pub fn generative(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider: Some(provider.into()),
            model: Some(model.into()),
            ..Self::new(name, ParticipantKind::Generative)
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    pub max_turns: usize,
    /// Any of these in the latest message ends the run.
    pub termination_keywords: Vec<String>,
    /// Optional soft deadline per turn.
    pub turn_timeout_secs: Option<u64>,
    pub credentials: Credentials,
    pub participants: Vec<ParticipantConfig>,
    pub sandbox: SandboxConfig,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            max_turns: 15,
            termination_keywords: vec!["STOP".to_string()],
            turn_timeout_secs: None,
            credentials: Credentials::default(),
            participants: Vec::new(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl TurnstileConfig {
    /// `<config_dir>/turnstile.toml` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "turnstile").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, TurnstileError> {
        Ok(toml::from_str(source)?)
    }

    /// Load the file (if any), then apply `.env` and the process environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, TurnstileError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, TurnstileError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            TurnstileError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&source)
    }

    /// Overlay `TURNSTILE_*` variables and provider credentials from the
    /// process environment.
    pub fn apply_env(&mut self) -> Result<(), TurnstileError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup.
    pub fn apply_vars(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), TurnstileError> {
        self.credentials.merge_from(&lookup);

        if let Some(value) = lookup("TURNSTILE_MAX_TURNS") {
            self.max_turns = parse_var("TURNSTILE_MAX_TURNS", &value)?;
        }
        if let Some(value) = lookup("TURNSTILE_SANDBOX_BACKEND") {
            self.sandbox.backend = parse_var("TURNSTILE_SANDBOX_BACKEND", &value)?;
        }
        if let Some(value) = lookup("TURNSTILE_SANDBOX_IMAGE") {
            self.sandbox.image = value;
        }
        if let Some(value) = lookup("TURNSTILE_SANDBOX_TIMEOUT") {
            self.sandbox.timeout_secs = parse_var("TURNSTILE_SANDBOX_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("TURNSTILE_WORK_DIR") {
            self.sandbox.work_dir = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_participant(mut self, participant: ParticipantConfig) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Check the configuration before any turn runs.
    pub fn validate(&self) -> Result<(), TurnstileError> {
        if self.participants.is_empty() {
            return Err(TurnstileError::Configuration(
                "at least one participant must be configured".to_string(),
            ));
        }
        if self.max_turns == 0 {
            return Err(TurnstileError::Configuration(
                "max_turns must be at least 1".to_string(),
            ));
        }
        self.sandbox.validate()?;
        if self.turn_timeout_secs == Some(0) {
            return Err(TurnstileError::Configuration(
                "turn_timeout_secs must be at least 1 when set".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for participant in &self.participants {
            if participant.name.trim().is_empty() {
                return Err(TurnstileError::Configuration(
                    "participant names must not be empty".to_string(),
                ));
            }
            if !seen.insert(participant.name.as_str()) {
                return Err(TurnstileError::Configuration(format!(
                    "duplicate participant name: {}",
                    participant.name
                )));
            }
            if participant.kind == ParticipantKind::Generative {
                let provider = participant.provider.as_deref().ok_or_else(|| {
                    TurnstileError::Configuration(format!(
                        "generative participant {} has no provider",
                        participant.name
                    ))
                })?;
                if !self.credentials.has_credentials(provider) {
                    return Err(TurnstileError::Configuration(format!(
                        "missing credential for provider {provider} (participant {})",
                        participant.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Any configured keyword, or reaching `max_turns`.
    pub fn termination(&self) -> TerminationCondition {
        TerminationCondition::any(
            self.termination_keywords
                .iter()
                .map(TerminationCondition::text_mention)
                .chain(std::iter::once(TerminationCondition::max_turns(self.max_turns))),
        )
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, TurnstileError> {
    value.trim().parse().map_err(|_| {
        TurnstileError::Configuration(format!("{name} has an invalid value: {value:?}"))
    })
}
