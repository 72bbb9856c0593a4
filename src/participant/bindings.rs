//! Building configured participants.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    CodeExecutorAgent, GenerativeAgent, HumanProxy, InputSource, Participant, ParticipantKind,
    Responder,
};
use crate::config::ParticipantConfig;
use crate::error::TurnstileError;

/// Runtime pieces a configuration file cannot describe: the model client of
/// each generative participant and the input read by human participants.
#[derive(Clone, Default)]
pub struct ParticipantBindings {
    responders: HashMap<String, Arc<dyn Responder>>,
    input: Option<Arc<dyn InputSource>>,
}

impl std::fmt::Debug for ParticipantBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut responders: Vec<&String> = self.responders.keys().collect();
        responders.sort();
        f.debug_struct("ParticipantBindings")
            .field("responders", &responders)
            .field("input", &self.input.is_some())
            .finish()
    }
}

impl ParticipantBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model client for the generative participant named `participant`.
    pub fn with_responder(
        mut self,
        participant: impl Into<String>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        self.responders.insert(participant.into(), responder);
        self
    }

    /// Input shared by every human participant.
    pub fn with_input(mut self, input: impl InputSource + 'static) -> Self {
        self.input = Some(Arc::new(input));
        self
    }
}

impl Participant {
    /// Build one configured participant.
    ///
    /// A generative participant without a bound responder, or a human
    /// participant without an input, is a configuration error.
    pub fn from_config(
        config: &ParticipantConfig,
        bindings: &ParticipantBindings,
    ) -> Result<Self, TurnstileError> {
        let participant = match config.kind {
            ParticipantKind::Generative => {
                let responder = bindings.responders.get(&config.name).cloned().ok_or_else(|| {
                    TurnstileError::Configuration(format!(
                        "generative participant {} has no responder",
                        config.name
                    ))
                })?;
                let mut agent = GenerativeAgent::new(&config.name, responder);
                if let Some(description) = &config.description {
                    agent = agent.with_description(description);
                }
                if let Some(system_message) = &config.system_message {
                    agent = agent.with_system_message(system_message);
                }
                Self::Generative(agent)
            }
            ParticipantKind::Executor => {
                let mut agent = CodeExecutorAgent::new(&config.name);
                if let Some(description) = &config.description {
                    agent = agent.with_description(description);
                }
                Self::Executor(agent)
            }
            ParticipantKind::Human => {
                let input = bindings.input.clone().ok_or_else(|| {
                    TurnstileError::Configuration(format!(
                        "human participant {} has no input source",
                        config.name
                    ))
                })?;
                let mut proxy = HumanProxy::new(&config.name, input);
                if let Some(description) = &config.description {
                    proxy = proxy.with_description(description);
                }
                Self::Human(proxy)
            }
        };
        Ok(participant)
    }
}
