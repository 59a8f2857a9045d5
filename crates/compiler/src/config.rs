//! Compiler configuration
//!
//! An optional `opal.toml` next to the input file tunes the build:
//!
//! ```toml
//! [build]
//! target-triple = "aarch64-unknown-linux-gnu"
//! emit-comments = true
//! ```
//!
//! Command-line flags win over file configuration; a missing file means
//! defaults (host triple, no comments).

use crate::codegen::default_target_triple;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "opal.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// LLVM target triple for the emitted module; defaults to the host.
    #[serde(rename = "target-triple")]
    pub target_triple: Option<String>,
    /// Annotate the IR with source-line comments.
    #[serde(rename = "emit-comments", default)]
    pub emit_comments: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Malformed(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read {CONFIG_FILE}: {e}"),
            ConfigError::Malformed(e) => write!(f, "malformed {CONFIG_FILE}: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl CompilerConfig {
    pub fn parse(text: &str) -> Result<CompilerConfig, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Malformed)
    }

    /// Load `opal.toml` from the input file's directory, falling back to
    /// defaults when it does not exist.
    pub fn discover(input: &Path) -> Result<CompilerConfig, ConfigError> {
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(CONFIG_FILE);
        if !candidate.exists() {
            return Ok(CompilerConfig::default());
        }
        let text = std::fs::read_to_string(&candidate).map_err(ConfigError::Io)?;
        CompilerConfig::parse(&text)
    }

    /// The effective target triple.
    pub fn target_triple(&self) -> String {
        self.build
            .target_triple
            .clone()
            .unwrap_or_else(|| default_target_triple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.target_triple(), default_target_triple());
        assert!(!config.build.emit_comments);
    }

    #[test]
    fn test_parse() {
        let config = CompilerConfig::parse(
            r#"
            [build]
            target-triple = "aarch64-unknown-linux-gnu"
            emit-comments = true
            "#,
        )
        .unwrap();
        assert_eq!(config.target_triple(), "aarch64-unknown-linux-gnu");
        assert!(config.build.emit_comments);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(CompilerConfig::parse("[build]\noptimize = 3\n").is_err());
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("program.opal");
        let config = CompilerConfig::discover(&input).unwrap();
        assert!(config.build.target_triple.is_none());
    }

    #[test]
    fn test_discover_reads_adjacent_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[build]\nemit-comments = true\n",
        )
        .unwrap();
        let input = dir.path().join("program.opal");
        let config = CompilerConfig::discover(&input).unwrap();
        assert!(config.build.emit_comments);
    }
}
