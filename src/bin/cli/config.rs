use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings read from `cli.toml`; command-line flags take precedence.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        if let Some(divisor) = data.cell.divisor {
            if divisor <= 0 {
                return Err(ConfigError::InvalidDivisor { value: divisor });
            }
        }
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn divisor(&self) -> Option<i32> {
        self.data.cell.divisor
    }

    pub fn log_level(&self) -> Option<&str> {
        self.data.logging.level.as_deref()
    }

    pub fn deny_way_tags(&self) -> &[String] {
        &self.data.decode.deny_way_tags
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    cell: CellSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    decode: DecodeSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CellSection {
    divisor: Option<i32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LoggingSection {
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct DecodeSection {
    #[serde(default)]
    deny_way_tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cell divisor {value} in CLI config must be positive")]
    InvalidDivisor { value: i32 },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("microtile").join("cli.toml"))
}
