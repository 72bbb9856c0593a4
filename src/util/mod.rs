//! Utility modules: timeouts and output truncation.

pub mod text;
pub mod timeout;
