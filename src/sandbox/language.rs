//! Supported languages and the code-file naming contract.

use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Prefix of every code file written into a session's working directory.
pub const CODE_FILE_PREFIX: &str = "tmp_code_";

/// Languages a session knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Language {
    #[strum(to_string = "python", serialize = "py", serialize = "python3")]
    Python,
    #[strum(to_string = "sh", serialize = "bash", serialize = "shell")]
    Shell,
}

impl Language {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Shell => "sh",
        }
    }

    /// Interpreter invoked with the code file as its only argument.
    pub fn interpreter(self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::Shell => "sh",
        }
    }

    /// Deterministic file name for `code`: `tmp_code_<sha256>.<ext>`.
    pub fn code_file_name(self, code: &str) -> String {
        let digest = Sha256::digest(code.as_bytes());
        format!("{CODE_FILE_PREFIX}{digest:x}.{}", self.extension())
    }
}
