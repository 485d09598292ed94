//! Board configuration.
//!
//! Settings are read from `.issueboard/board.toml` under the project
//! directory, then overridden by environment variables, then by CLI flags.
//! Every section is optional.
//!
//! ```toml
//! [board]
//! poll_interval_ms = 10000
//! undo_window_ms = 5000
//! polling = true
//!
//! [backend]
//! failure_rate = 0.05
//!
//! [backend.latency]
//! list = 300
//! get = 200
//! move = 500
//! undo = 200
//! update = 300
//!
//! [user]
//! id = "user-1"
//! name = "Alice Johnson"
//! role = "admin"
//!
//! [storage]
//! dir = "~/.issueboard"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3142
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::board::backend::Latency;
use crate::board::models::{Role, User};
use crate::board::polling::PollConfig;
use crate::board::protocol::DEFAULT_UNDO_WINDOW_MS;
use crate::board::seed;

pub const CONFIG_DIR: &str = ".issueboard";
pub const CONFIG_FILE: &str = "board.toml";

pub const ENV_ROLE: &str = "ISSUEBOARD_ROLE";
pub const ENV_FAILURE_RATE: &str = "ISSUEBOARD_FAILURE_RATE";
pub const ENV_POLL_INTERVAL_MS: &str = "ISSUEBOARD_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
    #[serde(default = "default_polling")]
    pub polling: bool,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_undo_window_ms() -> u64 {
    DEFAULT_UNDO_WINDOW_MS as u64
}

fn default_polling() -> bool {
    true
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            undo_window_ms: default_undo_window_ms(),
            polling: default_polling(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSection {
    /// Probability in `[0, 1]` that any backend call fails.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    #[serde(default)]
    pub latency: Latency,
}

fn default_failure_rate() -> f64 {
    0.05
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            failure_rate: default_failure_rate(),
            latency: Latency::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSection {
    #[serde(default = "default_user_id")]
    pub id: String,
    #[serde(default = "default_user_name")]
    pub name: String,
    #[serde(default = "default_user_role")]
    pub role: Role,
}

fn default_user_id() -> String {
    seed::default_user().id
}

fn default_user_name() -> String {
    seed::default_user().name
}

fn default_user_role() -> Role {
    seed::default_user().role
}

impl Default for UserSection {
    fn default() -> Self {
        let user = seed::default_user();
        Self {
            id: user.id,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Where the recently viewed list lives. Relative paths resolve against
    /// the project directory; unset means the config directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3142
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Contents of `board.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardToml {
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub user: UserSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub server: ServerSection,
}

impl BoardToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse board.toml")
    }

    /// Load `<config_dir>/board.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize board.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in the
    /// binary and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(role) = lookup(ENV_ROLE) {
            self.user.role = role
                .parse::<Role>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {}", ENV_ROLE))?;
        }
        if let Some(rate) = lookup(ENV_FAILURE_RATE) {
            self.backend.failure_rate = rate
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid {}: '{}'", ENV_FAILURE_RATE, rate))?;
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS) {
            self.board.poll_interval_ms = interval
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid {}: '{}'", ENV_POLL_INTERVAL_MS, interval))?;
        }
        Ok(())
    }

    /// Human-readable problems with the current values. Not fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let rate = self.backend.failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            warnings.push(format!(
                "failure_rate {} is outside [0, 1] and will be clamped",
                rate
            ));
        }
        if self.board.poll_interval_ms == 0 {
            warnings.push("poll_interval_ms is 0; polling every 1 ms instead".to_string());
        }
        if self.board.undo_window_ms == 0 {
            warnings.push("undo_window_ms is 0; moves can only be undone instantly".to_string());
        }
        if self.user.name.trim().is_empty() {
            warnings.push("user.name is empty".to_string());
        }

        warnings
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: BoardToml,
    pub verbose: bool,
}

impl BoardConfig {
    /// Read `board.toml` under `project_dir` and apply process environment
    /// overrides.
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = BoardToml::load_or_default(&config_dir)?;
        toml.apply_env(|key| std::env::var(key).ok())?;

        Ok(Self {
            project_dir,
            config_dir,
            toml,
            verbose,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Directory holding the recently viewed list. `~/` expands to the
    /// home directory.
    pub fn recent_dir(&self) -> Result<PathBuf> {
        let Some(dir) = &self.toml.storage.dir else {
            return Ok(self.config_dir.clone());
        };
        if let Ok(rest) = dir.strip_prefix("~") {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
            return Ok(home.join(rest));
        }
        if dir.is_absolute() {
            Ok(dir.clone())
        } else {
            Ok(self.project_dir.join(dir))
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.toml.board.poll_interval_ms),
            enabled: self.toml.board.polling,
        }
    }

    pub fn undo_window(&self) -> chrono::Duration {
        let millis = i64::try_from(self.toml.board.undo_window_ms).unwrap_or(i64::MAX);
        chrono::Duration::milliseconds(millis)
    }

    pub fn user(&self) -> User {
        User {
            id: self.toml.user.id.clone(),
            name: self.toml.user.name.clone(),
            role: self.toml.user.role,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
