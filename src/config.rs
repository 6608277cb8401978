//! Configuration loader: a YAML file merged with `ANTWORT_`-prefixed
//! environment overrides into a full layered config surface for the
//! standalone binary.
//!
//! Precedence, lowest to highest: built-in defaults < YAML file < `ANTWORT_*`
//! environment variables < CLI flags. A `_FILE`-suffixed env var (e.g.
//! `ANTWORT_BACKEND_API_KEY_FILE=/run/secrets/key`) is read as an indirection
//! to a secret file instead of embedding the value in the environment.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::{GatewayError, Result};

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_max_agentic_turns() -> u32 {
    10
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_logging_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_max_agentic_turns")]
    pub max_agentic_turns: u32,
    #[serde(default)]
    pub default_model: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_agentic_turns: default_max_agentic_turns(), default_model: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_logging_level")]
    pub level: String,
    #[serde(default = "default_logging_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: default_logging_level(), format: default_logging_format() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    pub backend: Option<BackendSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Fully resolved configuration the binary runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
}

/// CLI surface: every flag has an `env` fallback under the `ANTWORT_` prefix
/// (clap's `env` feature), so the same settings can come from flags, env, or
/// the YAML file pointed to by `--config`/`ANTWORT_CONFIG`.
#[derive(Debug, Parser)]
#[command(name = "antwort-gateway", about = "Standalone OpenResponses gateway")]
pub struct Cli {
    #[arg(long, env = "ANTWORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ANTWORT_BIND_ADDR")]
    pub bind_addr: Option<String>,

    #[arg(long, env = "ANTWORT_BACKEND_BASE_URL")]
    pub backend_base_url: Option<String>,

    #[arg(long, env = "ANTWORT_BACKEND_API_KEY")]
    pub backend_api_key: Option<String>,

    #[arg(long, env = "ANTWORT_DEFAULT_MODEL")]
    pub default_model: Option<String>,
}

/// Resolves a secret either from `env_var` directly or, if `env_var_FILE` is
/// set, by reading the referenced file (trimming a trailing newline).
fn resolve_secret(env_var: &str) -> Result<Option<String>> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(Some(value));
    }
    let file_var = format!("{env_var}_FILE");
    match std::env::var(&file_var) {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path)
                .map_err(|err| GatewayError::config(format!("reading {file_var}={path}: {err}")))?;
            Ok(Some(contents.trim_end().to_string()))
        }
        Err(_) => Ok(None),
    }
}

impl Settings {
    /// Loads the YAML file (if `--config`/`ANTWORT_CONFIG` is set), then
    /// overlays `ANTWORT_*` environment variables and CLI flags in that
    /// order of increasing precedence.
    pub fn load(cli: Cli) -> Result<Self> {
        let file: FileSettings = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|err| GatewayError::config(format!("reading config file {}: {err}", path.display())))?;
                serde_yaml::from_str(&raw).map_err(|err| GatewayError::config(format!("parsing config file: {err}")))?
            }
            None => FileSettings::default(),
        };

        let mut server = file.server;
        if let Some(bind_addr) = cli.bind_addr {
            server.bind_addr = bind_addr;
        }

        let mut engine = file.engine;
        if let Some(default_model) = cli.default_model {
            engine.default_model = Some(default_model);
        }

        let mut backend = file.backend.unwrap_or_else(|| BackendSettings {
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            api_key: None,
        });
        if let Some(base_url) = cli.backend_base_url {
            backend.base_url = base_url;
        }
        if let Some(api_key) = cli.backend_api_key {
            backend.api_key = Some(api_key);
        } else if backend.api_key.is_none() {
            backend.api_key = resolve_secret("ANTWORT_BACKEND_API_KEY")?;
        }

        Ok(Self { server, engine, backend, logging: file.logging })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli { config: None, bind_addr: None, backend_base_url: None, backend_api_key: None, default_model: None }
    }

    #[test]
    fn defaults_apply_with_no_file_or_env() {
        let settings = Settings::load(cli()).unwrap();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(settings.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.engine.max_agentic_turns, 10);
    }

    #[test]
    fn cli_flag_overrides_default() {
        let mut request = cli();
        request.bind_addr = Some("127.0.0.1:9000".to_string());
        request.backend_base_url = Some("http://backend:8000/v1".to_string());
        let settings = Settings::load(request).unwrap();
        assert_eq!(settings.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.backend.base_url, "http://backend:8000/v1");
    }

    #[test]
    fn yaml_file_is_parsed() {
        let dir = std::env::temp_dir().join(format!("antwort-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  bind_addr: \"0.0.0.0:9999\"\nbackend:\n  base_url: \"http://example:1234/v1\"\n",
        )
        .unwrap();

        let mut request = cli();
        request.config = Some(path.clone());
        let settings = Settings::load(request).unwrap();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:9999");
        assert_eq!(settings.backend.base_url, "http://example:1234/v1");

        std::fs::remove_dir_all(&dir).ok();
    }
}
