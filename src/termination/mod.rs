//! Termination conditions evaluated after every appended message.
//!
//! Conditions compose with `|`:
//!
//! ```
//! use turnstile::termination::TerminationCondition;
//!
//! let condition = TerminationCondition::text_mention("STOP") | TerminationCondition::max_turns(15);
//! assert_eq!(condition.kind(), "composite");
//! ```

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;

/// Predicate deciding whether a run should stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TerminationCondition {
    /// Stop when the latest message contains the keyword (case-sensitive).
    TextMention(String),
    /// Stop once this many turns have completed.
    MaxTurns(usize),
    /// Stop when any child matches; children are checked in declared order.
    Composite(Vec<TerminationCondition>),
}

/// Result of evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationOutcome {
    pub stopped: bool,
    pub reason: String,
}

impl TerminationOutcome {
    fn continue_run() -> Self {
        Self {
            stopped: false,
            reason: String::new(),
        }
    }

    fn stop(reason: impl Into<String>) -> Self {
        Self {
            stopped: true,
            reason: reason.into(),
        }
    }
}

impl TerminationCondition {
    pub fn text_mention(keyword: impl Into<String>) -> Self {
        Self::TextMention(keyword.into())
    }

    pub fn max_turns(n: usize) -> Self {
        Self::MaxTurns(n)
    }

    pub fn any(children: impl IntoIterator<Item = TerminationCondition>) -> Self {
        Self::Composite(children.into_iter().collect())
    }

    /// Short name of the condition variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextMention(_) => "text_mention",
            Self::MaxTurns(_) => "max_turns",
            Self::Composite(_) => "composite",
        }
    }

    /// Evaluate against the conversation and the number of completed turns.
    pub fn evaluate(&self, conversation: &Conversation, turn_count: usize) -> TerminationOutcome {
        match self {
            Self::TextMention(keyword) => match conversation.last() {
                Some(message) if message.content.contains(keyword.as_str()) => {
                    TerminationOutcome::stop(format!("text_mention:{keyword}"))
                }
                _ => TerminationOutcome::continue_run(),
            },
            Self::MaxTurns(n) => {
                if turn_count >= *n {
                    TerminationOutcome::stop("max_turns")
                } else {
                    TerminationOutcome::continue_run()
                }
            }
            Self::Composite(children) => children
                .iter()
                .map(|child| child.evaluate(conversation, turn_count))
                .find(|outcome| outcome.stopped)
                .unwrap_or_else(TerminationOutcome::continue_run),
        }
    }
}

impl BitOr for TerminationCondition {
    type Output = TerminationCondition;

    fn bitor(self, rhs: Self) -> Self::Output {
        let mut children = match self {
            Self::Composite(children) => children,
            other => vec![other],
        };
        match rhs {
            Self::Composite(more) => children.extend(more),
            other => children.push(other),
        }
        Self::Composite(children)
    }
}
