//! Unified configuration for gitshare
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (~/.config/gitshare/config.toml, config.json or config.json5)
//! 3. Environment variables (GITSHARE_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use crate::error::ConfigError;
use crate::storage::StorageType;
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file names probed in order
pub const CONFIG_FILE_NAMES: &[&str] = &["config.toml", "config.json5", "config.json"];

fn home_dir() -> PathBuf {
	std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// LOCATIONS
	// ========================================================================
	/// Configuration directory (keys, known hosts, scratch space)
	pub config_dir: PathBuf,

	/// Directory holding the synchronized folders
	pub folders_root: PathBuf,

	/// Scratch directory for in-progress fetches (defaults to <configDir>/tmp)
	pub tmp_dir: Option<PathBuf>,

	/// Directories searched before the system ones for external tools
	pub search_paths: Vec<PathBuf>,

	// ========================================================================
	// IDENTITY
	// ========================================================================
	/// Local user, used as commit author
	pub user: User,

	/// Author of conflict-resolution commits; hidden from history views
	pub service_author: User,

	// ========================================================================
	// TIMING
	// ========================================================================
	pub poll: PollConfig,

	/// Minimum interval between published progress updates
	pub progress_interval_ms: u64,

	// ========================================================================
	// SYNC BEHAVIOR
	// ========================================================================
	/// Cap on conflict-exit loop iterations (None = retry until clean)
	pub max_resolve_attempts: Option<usize>,

	pub history: HistoryConfig,

	// ========================================================================
	// FOLDERS
	// ========================================================================
	pub folders: Vec<FolderConfig>,
}

impl Default for Config {
	fn default() -> Self {
		let home = home_dir();
		Config {
			config_dir: home.join(".config").join("gitshare"),
			folders_root: home.join("GitShare"),
			tmp_dir: None,
			search_paths: Vec::new(),
			user: User::new("Unknown", "Unknown"),
			service_author: User::new("SparkleShare", "info@sparkleshare.org"),
			poll: PollConfig::default(),
			progress_interval_ms: 1000,
			max_resolve_attempts: None,
			history: HistoryConfig::default(),
			folders: Vec::new(),
		}
	}
}

// ============================================================================
// SUB-SECTIONS
// ============================================================================

/// Remote polling intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
	/// Poll interval at startup and after a failed sync
	pub short_interval_secs: u64,

	/// Poll interval after a successful push
	pub long_interval_secs: u64,

	/// Tick of the watch loop
	pub timer_interval_secs: u64,
}

impl Default for PollConfig {
	fn default() -> Self {
		PollConfig { short_interval_secs: 5 * 60, long_interval_secs: 15 * 60, timer_interval_secs: 5 }
	}
}

/// History extraction limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
	/// Time window handed to `git log --since`
	pub since: String,

	/// Commit count used when the window is empty
	pub fallback_count: usize,

	/// File entries kept per commit
	pub max_changes_per_commit: usize,
}

impl Default for HistoryConfig {
	fn default() -> Self {
		HistoryConfig { since: "1.month".to_string(), fallback_count: 75, max_changes_per_commit: 256 }
	}
}

/// One synchronized folder
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderConfig {
	pub name: String,
	pub url: String,
	/// Backend name ("git")
	pub backend: String,
	pub identifier: Option<String>,
	pub storage_type: StorageType,
	pub paused: bool,
	/// Announcements channel given at fetch time
	pub announcements_url: Option<String>,
	/// Explicit location; defaults to <foldersRoot>/<name>
	pub path: Option<PathBuf>,
}

// ============================================================================
// LOADING & SAVING
// ============================================================================

impl Config {
	/// Load defaults, then the first config file found in `config_dir`, then environment
	pub fn load(config_dir: Option<&Path>) -> Result<Config, ConfigError> {
		let dir = config_dir
			.map(Path::to_path_buf)
			.or_else(|| std::env::var("GITSHARE_CONFIG_DIR").ok().map(PathBuf::from))
			.unwrap_or_else(|| Config::default().config_dir);

		let mut config = match Self::find_config_file(&dir) {
			Some(path) => Self::from_file(&path)?,
			None => Config::default(),
		};
		config.config_dir = dir;
		config.apply_env();
		Ok(config)
	}

	/// Parse one config file; format chosen by extension
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;

		let parsed = match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&text).map_err(|e| e.to_string()),
			_ => json5::from_str(&text).map_err(|e| e.to_string()),
		};
		parsed.map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })
	}

	fn find_config_file(dir: &Path) -> Option<PathBuf> {
		CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
	}

	/// Override values from GITSHARE_* variables
	pub fn apply_env(&mut self) {
		if let Ok(name) = std::env::var("GITSHARE_USER_NAME") {
			self.user.name = name;
		}
		if let Ok(email) = std::env::var("GITSHARE_USER_EMAIL") {
			self.user.email = email;
		}
		if let Ok(value) = std::env::var("GITSHARE_MAX_RESOLVE_ATTEMPTS") {
			if let Ok(attempts) = value.parse() {
				self.max_resolve_attempts = Some(attempts);
			}
		}
	}

	/// Write the configuration as TOML into `config_dir`
	pub fn save(&self) -> Result<PathBuf, ConfigError> {
		let path = self.config_dir.join("config.toml");
		let text = toml::to_string_pretty(self)
			.map_err(|e| ConfigError::Write { path: path.clone(), message: e.to_string() })?;
		std::fs::create_dir_all(&self.config_dir)
			.and_then(|_| std::fs::write(&path, text))
			.map_err(|e| ConfigError::Write { path: path.clone(), message: e.to_string() })?;
		Ok(path)
	}

	// ========================================================================
	// DERIVED VALUES
	// ========================================================================

	pub fn ssh_dir(&self) -> PathBuf {
		self.config_dir.join("ssh")
	}

	pub fn tmp_dir(&self) -> PathBuf {
		self.tmp_dir.clone().unwrap_or_else(|| self.config_dir.join("tmp"))
	}

	pub fn progress_interval(&self) -> Duration {
		Duration::from_millis(self.progress_interval_ms)
	}

	pub fn folder(&self, name: &str) -> Result<&FolderConfig, ConfigError> {
		self.folders
			.iter()
			.find(|folder| folder.name == name)
			.ok_or_else(|| ConfigError::UnknownFolder { name: name.to_string() })
	}

	pub fn folder_mut(&mut self, name: &str) -> Result<&mut FolderConfig, ConfigError> {
		self.folders
			.iter_mut()
			.find(|folder| folder.name == name)
			.ok_or_else(|| ConfigError::UnknownFolder { name: name.to_string() })
	}

	pub fn folder_path(&self, folder: &FolderConfig) -> PathBuf {
		folder.path.clone().unwrap_or_else(|| self.folders_root.join(&folder.name))
	}
}


// vim: ts=4
