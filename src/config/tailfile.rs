use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Text encoding used to decode completed lines.
///
/// Only encodings in which `\n` is the single byte 0x0A can be scanned
/// byte-wise, so UTF-16 and friends are not offered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    #[value(name = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "iso-8859-1")]
    #[value(name = "latin-1", alias = "iso-8859-1")]
    Latin1,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => write!(f, "utf-8"),
            Encoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    /// Only `\n` ends a line; a preceding `\r` stays in the text
    Lf,
    /// `\n` ends a line and a `\r` right before it is stripped
    #[default]
    Crlf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedLinePolicy {
    /// Replace malformed sequences with U+FFFD and keep going
    #[default]
    Substitute,
    /// Abort the extraction or follow session
    FailFast,
}

/// Where to resume after the followed file was truncated or replaced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RotationStart {
    /// Emit the new file from its first byte
    #[default]
    Beginning,
    /// Seed the window from the new file and emit only what is appended later
    End,
}

/// Resolved settings shared by extraction and follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    pub window_size_bytes: usize,
    pub poll_interval_ms: u64,
    pub line_terminator: LineTerminator,
    pub malformed_line: MalformedLinePolicy,
    pub encoding: Encoding,
    pub rotation_start: RotationStart,
    /// `None` retries forever
    pub max_rotation_retries: Option<u32>,
}

pub const DEFAULT_WINDOW_SIZE: usize = 8192;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            window_size_bytes: DEFAULT_WINDOW_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            line_terminator: LineTerminator::default(),
            malformed_line: MalformedLinePolicy::default(),
            encoding: Encoding::default(),
            rotation_start: RotationStart::default(),
            max_rotation_retries: None,
        }
    }
}

/// One configuration layer (a TOML file or the command line).
/// Unset fields leave the layer below untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TailConfigLayer {
    pub window_size_bytes: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub line_terminator: Option<LineTerminator>,
    pub malformed_line: Option<MalformedLinePolicy>,
    pub encoding: Option<Encoding>,
    pub rotation_start: Option<RotationStart>,
    pub max_rotation_retries: Option<u32>,
}

impl TailConfigLayer {
    /// Parse a layer from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let layer: TailConfigLayer = toml::from_str(content).context("Failed to parse config")?;
        Ok(layer)
    }

    /// Load a layer from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Apply a layer on top of this config (layer overrides self)
    pub fn merge(&mut self, layer: &TailConfigLayer) {
        if let Some(size) = layer.window_size_bytes {
            self.window_size_bytes = size;
        }
        if let Some(ms) = layer.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(terminator) = layer.line_terminator {
            self.line_terminator = terminator;
        }
        if let Some(policy) = layer.malformed_line {
            self.malformed_line = policy;
        }
        if let Some(encoding) = layer.encoding {
            self.encoding = encoding;
        }
        if let Some(start) = layer.rotation_start {
            self.rotation_start = start;
        }
        if layer.max_rotation_retries.is_some() {
            self.max_rotation_retries = layer.max_rotation_retries;
        }
    }

    /// Resolve the config by merging layers: defaults -> global -> explicit file -> CLI
    pub fn resolve(config_file: Option<&str>, cli_overrides: &TailConfigLayer) -> Result<Self> {
        let mut config = TailConfig::default();

        // Layer 1: Global config
        if let Ok(global_path) = super::global_config_path() {
            if global_path.exists() {
                config.merge(&TailConfigLayer::load(&global_path)?);
            }
        }

        // Layer 2: Explicit config file, which must exist
        if let Some(path) = config_file {
            let path = super::expand_path(path);
            config.merge(&TailConfigLayer::load(&path)?);
        }

        // Layer 3: CLI overrides
        config.merge(cli_overrides);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size_bytes == 0 {
            bail!("window_size_bytes must be greater than zero");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TailConfig::default();
        assert_eq!(config.window_size_bytes, 8192);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.line_terminator, LineTerminator::Crlf);
        assert_eq!(config.malformed_line, MalformedLinePolicy::Substitute);
        assert_eq!(config.encoding, Encoding::Utf8);
        assert_eq!(config.rotation_start, RotationStart::Beginning);
        assert_eq!(config.max_rotation_retries, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_layer() {
        let toml = r#"
window_size_bytes = 4096
poll_interval_ms = 250
line_terminator = "lf"
malformed_line = "fail-fast"
encoding = "latin-1"
rotation_start = "end"
max_rotation_retries = 20
"#;
        let layer = TailConfigLayer::parse(toml).unwrap();
        assert_eq!(layer.window_size_bytes, Some(4096));
        assert_eq!(layer.poll_interval_ms, Some(250));
        assert_eq!(layer.line_terminator, Some(LineTerminator::Lf));
        assert_eq!(layer.malformed_line, Some(MalformedLinePolicy::FailFast));
        assert_eq!(layer.encoding, Some(Encoding::Latin1));
        assert_eq!(layer.rotation_start, Some(RotationStart::End));
        assert_eq!(layer.max_rotation_retries, Some(20));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(TailConfigLayer::parse("chunk = 10").is_err());
        assert!(TailConfigLayer::parse(r#"encoding = "utf-16""#).is_err());
    }

    #[test]
    fn test_encoding_alias() {
        let layer = TailConfigLayer::parse(r#"encoding = "utf8""#).unwrap();
        assert_eq!(layer.encoding, Some(Encoding::Utf8));
    }

    #[test]
    fn test_merge() {
        let mut config = TailConfig::default();

        let file = TailConfigLayer {
            poll_interval_ms: Some(1000),
            encoding: Some(Encoding::Latin1),
            ..Default::default()
        };
        config.merge(&file);

        // CLI setting the default value back still wins
        let cli = TailConfigLayer {
            poll_interval_ms: Some(500),
            max_rotation_retries: Some(3),
            ..Default::default()
        };
        config.merge(&cli);

        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.encoding, Encoding::Latin1);
        assert_eq!(config.max_rotation_retries, Some(3));
        assert_eq!(config.window_size_bytes, DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn test_validate() {
        let mut config = TailConfig::default();
        config.window_size_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = TailConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtail.toml");
        std::fs::write(&path, "window_size_bytes = 64\nrotation_start = \"end\"\n").unwrap();

        let cli = TailConfigLayer {
            window_size_bytes: Some(128),
            ..Default::default()
        };
        let config = TailConfig::resolve(path.to_str(), &cli).unwrap();
        assert_eq!(config.window_size_bytes, 128);
        assert_eq!(config.rotation_start, RotationStart::End);
    }

    #[test]
    fn test_resolve_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(TailConfig::resolve(path.to_str(), &TailConfigLayer::default()).is_err());
    }

    #[test]
    fn test_resolve_rejects_invalid_override() {
        let cli = TailConfigLayer {
            window_size_bytes: Some(0),
            ..Default::default()
        };
        assert!(TailConfig::resolve(None, &cli).is_err());
    }
}
