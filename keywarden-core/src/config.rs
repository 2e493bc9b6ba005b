use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{CallerId, MultiKeyPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub keyring: KeyringConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `tracing_subscriber::EnvFilter` directive.  `RUST_LOG` takes
    /// precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub multi_key_policy: MultiKeyPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            multi_key_policy: MultiKeyPolicy::default(),
        }
    }
}

/// Location of the keyring file and of the passphrase that unseals it.
///
/// Only the *name* of the environment variable holding the passphrase is
/// stored here, so `Debug` output of the config never contains a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringConfig {
    #[serde(default = "default_keyring_path")]
    pub path: PathBuf,
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            path: default_keyring_path(),
            passphrase_env: default_passphrase_env(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity the local agent socket signs as.
    #[serde(default)]
    pub caller: Option<CallerId>,
    /// Socket path; `$XDG_RUNTIME_DIR/keywarden/agent.sock` when unset.
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load the config at `path`, falling back to defaults if it does not
    /// exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(
                "config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        warn_if_shared(path);

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// `$XDG_CONFIG_HOME/keywarden/config.toml`, or `~/.config/...`.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| {
            tracing::warn!(
                "neither XDG_CONFIG_HOME nor HOME are set; using current directory for config"
            );
            PathBuf::from(".")
        });
    base.join("keywarden").join("config.toml")
}

/// `$XDG_RUNTIME_DIR/keywarden/agent.sock`, if the runtime dir is known.
pub fn default_socket_path() -> Option<PathBuf> {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(|dir| PathBuf::from(dir).join("keywarden").join("agent.sock"))
}

// The keyring passphrase lives in the environment, but the config still names
// which keyring to open, so it should not be readable by other users.
#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::MetadataExt;
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:o}", mode & 0o777),
                    "config file is readable by group or others; recommend: chmod 600 {}",
                    path.display()
                );
            }
        }
        Err(e) => {
            tracing::warn!("could not check config file permissions: {e}");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_shared(_path: &Path) {}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keyring_path() -> PathBuf {
    PathBuf::from("/etc/keywarden/keyring.json")
}

fn default_passphrase_env() -> String {
    "KEYWARDEN_PASSPHRASE".to_string()
}
