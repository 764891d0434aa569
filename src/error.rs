use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitfontError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid Unicode range {expression:?}: {reason}")]
    InvalidRange { expression: String, reason: String },

    #[error("Could not load font {path:?}: {reason}")]
    FontLoad { path: PathBuf, reason: String },

    #[error("{tool} command not found. Install with: {hint}")]
    Dependency { tool: String, hint: String },

    #[error("{tool} failed: {stderr}")]
    Conversion {
        tool: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Could not repair BDF encodings in {path:?}: {reason}")]
    EncodingRepair { path: PathBuf, reason: String },

    #[error("IO Error: {0}")]
    IO(#[from] io::Error),

    #[error("Error parsing configuration: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Error serializing manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`BitfontError`], used to decide whether a
/// failure aborts the run or only the current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    FontLoad,
    Dependency,
    Conversion,
    EncodingRepair,
    Io,
}

impl BitfontError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BitfontError::Config(_) | BitfontError::InvalidRange { .. } | BitfontError::Yaml(_) => {
                ErrorKind::Config
            }
            BitfontError::FontLoad { .. } => ErrorKind::FontLoad,
            BitfontError::Dependency { .. } => ErrorKind::Dependency,
            BitfontError::Conversion { .. } | BitfontError::Timeout { .. } => {
                ErrorKind::Conversion
            }
            BitfontError::EncodingRepair { .. } => ErrorKind::EncodingRepair,
            BitfontError::IO(_) | BitfontError::Json(_) => ErrorKind::Io,
        }
    }

    /// Fatal errors stop the run before any size is processed.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Config
    }

    /// Exit code reported by an external tool, if it ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BitfontError::Conversion { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kinds() {
        let range = BitfontError::InvalidRange {
            expression: "U+0043-0041".into(),
            reason: "low > high".into(),
        };
        assert_eq!(range.kind(), ErrorKind::Config);
        assert!(range.is_fatal());

        let timeout = BitfontError::Timeout {
            tool: "otf2bdf".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(timeout.kind(), ErrorKind::Conversion);
        assert!(!timeout.is_fatal());
        assert_eq!(timeout.to_string(), "otf2bdf did not finish within 5s");
    }

    #[test]
    fn test_subsecond_timeout_message() {
        let timeout = BitfontError::Timeout {
            tool: "bdftopcf".into(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(timeout.to_string(), "bdftopcf did not finish within 250ms");
    }

    #[test]
    fn test_conversion_message_is_verbatim_stderr() {
        let err = BitfontError::Conversion {
            tool: "otf2bdf".into(),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "no glyphs generated".into(),
        };
        assert_eq!(err.to_string(), "otf2bdf failed: no glyphs generated");
        assert_eq!(err.exit_code(), Some(1));
    }
}
