//! Tool capabilities invoked by generative participants.

pub mod arguments;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use tool::{FnTool, Tool};
pub use types::ToolParameters;
