use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use redtide_lib::ipc::DEFAULT_ENDPOINT;

pub const DEFAULT_CONFIG_PATH: &str = "redtide.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket path on Unix, pipe name on Windows.
    pub endpoint: String,
    /// Permission bits applied to the socket file.
    pub socket_mode: u32,
    pub log_dir: String,
    pub log_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            socket_mode: 0o600,
            log_dir: "./".to_owned(),
            log_file_name: concat!(env!("CARGO_PKG_NAME"), ".log").to_owned(),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_text = path.display().to_string();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("{} not found, using defaults", path_text);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path_text,
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_text,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = \"/tmp/rt.sock\"\nsocket_mode = 0o660").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "/tmp/rt.sock");
        assert_eq!(config.socket_mode, 0o660);
        assert_eq!(config.log_dir, Config::default().log_dir);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_transfer_size = 65536").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
