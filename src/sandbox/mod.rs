//! Sandboxed code execution: session lifecycle, backends, and results.

mod artifacts;
pub mod backend;
#[cfg(feature = "docker")]
pub mod docker;
pub mod executor;
pub mod language;
pub mod local;
mod process;
pub mod request;
pub mod session;

pub use backend::{PreparedProgram, RawOutput, SandboxBackend};
#[cfg(feature = "docker")]
pub use docker::DockerBackend;
pub use executor::SandboxExecutor;
pub use language::Language;
pub use local::LocalProcessBackend;
pub use request::{ExecutionRequest, ExecutionResult, OUTPUT_LIMIT_BYTES, TIMEOUT_EXIT_CODE};
pub use session::{SandboxSession, SessionState};
