//! Configuration for the agent runtime.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (AGENT_RUNTIME_HOME, AGENT_RUNTIME_CHECKPOINT_DIR)
//! 2. Config file (.agent-runtime/config.yaml, or an explicit path)
//! 3. Defaults (~/.agent-runtime)
//!
//! Config file discovery:
//! - Searches current directory and parents for .agent-runtime/config.yaml
//! - Paths in config file are relative to the project root (the directory
//!   holding .agent-runtime/)
//!
//! Secrets never live in the file. The file names the environment variables
//! that hold them.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::collaborators::memory::DEFAULT_MEMORY_CAPACITY;
use crate::core::DEFAULT_CHECKPOINT_KEY;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".agent-runtime";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramSection>,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logic: Option<LogicConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsConfig {
    /// Default log level to debug
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// Bound on the fan-in queue (unbounded when absent)
    pub queue_capacity: Option<usize>,
    /// Exchanges remembered per conversation
    pub memory_capacity: Option<usize>,
    /// Exchanges prepended to each request (0 disables history)
    pub history_exchanges: Option<usize>,
    /// Log every published proof
    #[serde(default)]
    pub log_proofs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    pub backend: BackendKind,
    /// Object key (default: runtime_state.json)
    pub key: Option<String>,
    /// Directory for the file backend (relative to project root)
    pub dir: Option<String>,
    /// Base URL for the http backend
    pub url: Option<String>,
    /// Environment variable holding the http bearer token
    pub token_env: Option<String>,
    #[serde(default = "default_true")]
    pub save_on_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    #[serde(default = "default_telegram_token_env")]
    pub bot_token_env: String,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub stdin: bool,
    #[serde(default)]
    pub telegram: bool,
    pub cron: Option<CronConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronConfig {
    pub interval_seconds: u64,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputsConfig {
    #[serde(default)]
    pub stdout: bool,
    #[serde(default)]
    pub show_proof: bool,
    #[serde(default)]
    pub telegram: bool,
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogicConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_logic_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
fn default_logic_timeout() -> u64 {
    300
} // 5 min

/// Where checkpoints go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointBackend {
    File { dir: PathBuf },
    Http { url: String, token_env: Option<String> },
}

#[derive(Debug, Clone)]
pub struct CheckpointSettings {
    pub backend: CheckpointBackend,
    pub key: String,
    pub save_on_shutdown: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub queue_capacity: Option<usize>,
    pub memory_capacity: usize,
    pub history_exchanges: usize,
    pub log_proofs: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            history_exchanges: 10,
            log_proofs: false,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the runtime home
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Debug logging requested by the file
    pub debug: bool,
    pub runtime: RuntimeSettings,
    pub checkpoint: Option<CheckpointSettings>,
    pub telegram: Option<TelegramSection>,
    pub inputs: InputsConfig,
    pub outputs: OutputsConfig,
    pub logic: Option<LogicConfig>,
}

impl ResolvedConfig {
    /// Timeout for the command logic, if configured
    pub fn logic_timeout(&self) -> Option<Duration> {
        self.logic
            .as_ref()
            .map(|l| Duration::from_secs(l.timeout_seconds))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Project root for a config file: the parent of `.agent-runtime/`
fn project_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf()
}

fn default_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR))
}

/// Turn a parsed file into settings
fn resolve(config: ConfigFile, config_path: Option<PathBuf>, home: PathBuf) -> Result<ResolvedConfig> {
    let base_dir = config_path
        .as_deref()
        .map(project_root)
        .unwrap_or_else(|| home.clone());

    let runtime = RuntimeSettings {
        queue_capacity: config.runtime.queue_capacity,
        memory_capacity: config
            .runtime
            .memory_capacity
            .unwrap_or(DEFAULT_MEMORY_CAPACITY),
        history_exchanges: config.runtime.history_exchanges.unwrap_or(10),
        log_proofs: config.runtime.log_proofs,
    };

    let env_checkpoint_dir = std::env::var("AGENT_RUNTIME_CHECKPOINT_DIR").ok();

    let checkpoint = match (config.checkpoint, env_checkpoint_dir) {
        // Env override always wins and forces the file backend
        (section, Some(dir)) => Some(CheckpointSettings {
            backend: CheckpointBackend::File {
                dir: PathBuf::from(dir),
            },
            key: section
                .as_ref()
                .and_then(|s| s.key.clone())
                .unwrap_or_else(|| DEFAULT_CHECKPOINT_KEY.to_string()),
            save_on_shutdown: section.map(|s| s.save_on_shutdown).unwrap_or(true),
        }),
        (Some(section), None) => {
            let backend = match section.backend {
                BackendKind::File => CheckpointBackend::File {
                    dir: section
                        .dir
                        .as_deref()
                        .map(|d| resolve_path(&base_dir, d))
                        .unwrap_or_else(|| home.join("checkpoints")),
                },
                BackendKind::Http => CheckpointBackend::Http {
                    url: section
                        .url
                        .clone()
                        .context("checkpoint.url is required for the http backend")?,
                    token_env: section.token_env.clone(),
                },
            };
            Some(CheckpointSettings {
                backend,
                key: section
                    .key
                    .unwrap_or_else(|| DEFAULT_CHECKPOINT_KEY.to_string()),
                save_on_shutdown: section.save_on_shutdown,
            })
        }
        (None, None) => None,
    };

    if (config.inputs.telegram || config.outputs.telegram) && config.telegram.is_none() {
        anyhow::bail!("telegram input/output enabled but no telegram section configured");
    }

    Ok(ResolvedConfig {
        home,
        config_file: config_path,
        debug: config.settings.debug,
        runtime,
        checkpoint,
        telegram: config.telegram,
        inputs: config.inputs,
        outputs: config.outputs,
        logic: config.logic,
    })
}

/// Load configuration from all sources, using `explicit` instead of
/// discovery when given
pub fn load_config_from(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let home = match std::env::var("AGENT_RUNTIME_HOME") {
        Ok(env_home) => PathBuf::from(env_home),
        Err(_) => default_home()?,
    };

    let config_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match config_path {
        Some(path) => {
            let file = load_config_file(&path)?;
            resolve(file, Some(path), home)
        }
        None => Ok(ResolvedConfig {
            home,
            config_file: None,
            debug: false,
            runtime: RuntimeSettings::default(),
            checkpoint: std::env::var("AGENT_RUNTIME_CHECKPOINT_DIR")
                .ok()
                .map(|dir| CheckpointSettings {
                    backend: CheckpointBackend::File {
                        dir: PathBuf::from(dir),
                    },
                    key: DEFAULT_CHECKPOINT_KEY.to_string(),
                    save_on_shutdown: true,
                }),
            telegram: None,
            // Without a file, talk over the terminal
            inputs: InputsConfig {
                stdin: true,
                ..Default::default()
            },
            outputs: OutputsConfig {
                stdout: true,
                ..Default::default()
            },
            logic: None,
        }),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config_from(None).map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, body: &str) -> PathBuf {
        let dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
settings:
  debug: true
runtime:
  queue_capacity: 64
  memory_capacity: 5
checkpoint:
  backend: http
  url: https://blobs.example.com/agents
  token_env: BLOB_TOKEN
telegram:
  chat_id: "42"
inputs:
  telegram: true
  cron:
    interval_seconds: 60
outputs:
  stdout: true
  webhook:
    url: https://hooks.example.com/agent
logic:
  command: ./agent.sh
  args: ["-p", "summarize"]
"#,
        );

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.settings.debug);
        assert_eq!(config.runtime.queue_capacity, Some(64));
        assert_eq!(config.inputs.cron.as_ref().unwrap().interval_seconds, 60);
        assert_eq!(
            config.telegram.as_ref().unwrap().bot_token_env,
            "TELEGRAM_BOT_TOKEN"
        );

        let checkpoint = config.checkpoint.as_ref().unwrap();
        assert_eq!(checkpoint.backend, BackendKind::Http);
        assert!(checkpoint.save_on_shutdown);

        let logic = config.logic.as_ref().unwrap();
        assert_eq!(logic.args, vec!["-p", "summarize"]);
        assert_eq!(logic.timeout_seconds, 300);
    }

    #[test]
    fn test_resolve_file_backend_relative_to_project_root() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
checkpoint:
  backend: file
  dir: ./state
  key: agent-7.json
"#,
        );

        let file = load_config_file(&path).unwrap();
        let resolved = resolve(file, Some(path), PathBuf::from("/home/x/.agent-runtime")).unwrap();

        let checkpoint = resolved.checkpoint.unwrap();
        assert_eq!(checkpoint.key, "agent-7.json");
        match checkpoint.backend {
            CheckpointBackend::File { dir } => assert!(dir.ends_with("state")),
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(resolved.runtime.memory_capacity, DEFAULT_MEMORY_CAPACITY);
        assert!(resolved.runtime.queue_capacity.is_none());
    }

    #[test]
    fn test_http_backend_requires_url() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
version: "1.0"
checkpoint:
  backend: http
"#,
        )
        .unwrap();

        assert!(resolve(file, None, PathBuf::from("/tmp/home")).is_err());
    }

    #[test]
    fn test_telegram_ports_require_section() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
version: "1.0"
outputs:
  telegram: true
"#,
        )
        .unwrap();

        let err = resolve(file, None, PathBuf::from("/tmp/home")).unwrap_err();
        assert!(err.to_string().contains("telegram"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
