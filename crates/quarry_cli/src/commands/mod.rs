//! CLI command implementations.

pub mod compile;
pub mod convert;
pub mod diff;

use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the CLI itself, before any library call.
#[derive(Debug, Error)]
pub enum CliError {
    /// A flag value outside its accepted set.
    #[error("unknown {kind} `{value}` (expected {expected})")]
    UnknownChoice {
        /// What the flag selects.
        kind: &'static str,
        /// The rejected value.
        value: String,
        /// The accepted values.
        expected: &'static str,
    },

    /// Reading or writing a file failed.
    #[error("{path}: {source}")]
    Io {
        /// File involved, `-` for the standard streams.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Input was not valid JSON.
    #[error("{path}: invalid JSON: {source}")]
    Json {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Output format for human-facing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for Format {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            _ => Err(CliError::UnknownChoice {
                kind: "format",
                value: s.to_string(),
                expected: "text, json",
            }),
        }
    }
}

/// Wire encoding for diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// JSON text.
    Json,
    /// CBOR bytes.
    Cbor,
}

impl FromStr for Encoding {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "cbor" => Ok(Encoding::Cbor),
            _ => Err(CliError::UnknownChoice {
                kind: "encoding",
                value: s.to_string(),
                expected: "json, cbor",
            }),
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Reads a file, or stdin for `-`.
pub fn read_input(path: &Path) -> Result<Vec<u8>, CliError> {
    let io = |source| CliError::Io {
        path: path.display().to_string(),
        source,
    };
    if is_stdio(path) {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes).map_err(io)?;
        Ok(bytes)
    } else {
        std::fs::read(path).map_err(io)
    }
}

/// Reads and parses a JSON document, or stdin for `-`.
pub fn read_json(path: &Path) -> Result<serde_json::Value, CliError> {
    let bytes = read_input(path)?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Writes to a file, or stdout for `-`.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    let io = |source| CliError::Io {
        path: path.display().to_string(),
        source,
    };
    if is_stdio(path) {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes).map_err(io)?;
        stdout.flush().map_err(io)
    } else {
        std::fs::write(path, bytes).map_err(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_parse_case_insensitively() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("cbor".parse::<Encoding>().unwrap(), Encoding::Cbor);
        let err = "yaml".parse::<Encoding>().unwrap_err();
        assert_eq!(err.to_string(), "unknown encoding `yaml` (expected json, cbor)");
    }

    #[test]
    fn dash_means_standard_streams() {
        assert!(is_stdio(Path::new("-")));
        assert!(!is_stdio(Path::new("diff.json")));
    }
}
