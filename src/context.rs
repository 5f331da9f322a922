//! Process-wide services shared by fetchers, repositories and drivers

use crate::command::{CommandPaths, Git};
use crate::config::Config;
use crate::error::TrustError;
use crate::ssh::SshAuthInfo;
use std::sync::Arc;

/// Configuration, resolved tool paths and the SSH identity
#[derive(Debug, Clone)]
pub struct Context {
	pub config: Arc<Config>,
	pub paths: Arc<CommandPaths>,
	pub auth: Arc<SshAuthInfo>,
}

impl Context {
	/// Resolve tool paths and load (or create) the SSH key pair
	pub async fn initialize(config: Config) -> Result<Context, TrustError> {
		let paths = CommandPaths::locate(&config.search_paths);
		let auth = SshAuthInfo::load_or_create(&config.ssh_dir(), &paths).await?;
		Ok(Context { config: Arc::new(config), paths: Arc::new(paths), auth: Arc::new(auth) })
	}

	/// Assemble a context from parts that are already known
	pub fn from_parts(config: Config, paths: CommandPaths, auth: SshAuthInfo) -> Context {
		Context { config: Arc::new(config), paths: Arc::new(paths), auth: Arc::new(auth) }
	}

	pub fn git(&self) -> Git {
		Git::new(self.paths.clone(), &self.auth)
	}
}

// vim: ts=4
