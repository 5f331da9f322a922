//! Git implementation of [`Fetcher`]

use super::address::{format_name, normalize_address, RemoteUrl};
use super::rules::{self, ENCRYPTION_PASSWORD_FILE, IDENTIFIER_FILE, WELCOME_FILE};
use super::{FetchRequest, Fetcher};
use crate::callbacks::{FetchCallback, FetchEvent};
use crate::command::{Command, CommandPaths, Git, KillHandle, OutputStream};
use crate::config::Config;
use crate::context::Context;
use crate::error::{CommandError, FetchError};
use crate::logging::*;
use crate::progress::{parse_progress, ProgressLine, ProgressThrottle, ProgressUpdate};
use crate::repository::markers::MarkerFiles;
use crate::ssh::{HostKeyScanner, HostTrust, KeyscanScanner};
use crate::storage::{self, available_storage_types, StorageType, StorageTypeInfo};
use crate::util::{derive_password_key, random_identifier, random_salt};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Branch preferred over HEAD when checking out an existing folder
const PREFERRED_BRANCH: &str = "SparkleShare";

#[derive(Debug)]
struct FetchState {
	storage_type: StorageType,
	salt: String,
	warnings: Vec<String>,
	errors: Vec<String>,
}

pub struct GitFetcher {
	request: FetchRequest,
	url: RemoteUrl,
	large_files_available: bool,
	git: Git,
	paths: Arc<CommandPaths>,
	config: Arc<Config>,
	trust: HostTrust,
	known_hosts: PathBuf,
	callback: Arc<dyn FetchCallback>,
	state: Mutex<FetchState>,
	clone_process: Mutex<Option<KillHandle>>,
	active: AtomicBool,
}

impl GitFetcher {
	pub fn new(
		request: FetchRequest,
		context: &Context,
		callback: Arc<dyn FetchCallback>,
	) -> Result<GitFetcher, FetchError> {
		let normalized = normalize_address(&request.address, &request.remote_path)?;
		let scanner = Box::new(KeyscanScanner::new(&context.paths.ssh_keyscan));

		Ok(GitFetcher {
			request,
			url: normalized.url,
			large_files_available: normalized.large_files_available,
			git: context.git(),
			paths: context.paths.clone(),
			config: context.config.clone(),
			trust: HostTrust::new(scanner, &context.auth.known_hosts_path),
			known_hosts: context.auth.known_hosts_path.clone(),
			callback,
			state: Mutex::new(FetchState {
				storage_type: StorageType::Unknown,
				salt: random_salt(),
				warnings: Vec::new(),
				errors: Vec::new(),
			}),
			clone_process: Mutex::new(None),
			active: AtomicBool::new(false),
		})
	}

	/// Registry constructor
	pub fn create(
		request: FetchRequest,
		context: &Context,
		callback: Arc<dyn FetchCallback>,
	) -> Result<Arc<dyn Fetcher>, FetchError> {
		Ok(Arc::new(Self::new(request, context, callback)?))
	}

	/// Replace the host key source
	pub fn with_scanner(mut self, scanner: Box<dyn HostKeyScanner>) -> Self {
		self.trust = HostTrust::new(scanner, &self.known_hosts);
		self
	}

	fn target(&self) -> &Path {
		&self.request.target_folder
	}

	fn state(&self) -> std::sync::MutexGuard<'_, FetchState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn push_error(&self, message: &str) {
		self.state().errors.push(message.to_string());
	}

	fn salt(&self) -> String {
		self.state().salt.clone()
	}

	fn git_in_target(&self, args: &[&str]) -> Command {
		self.git.with_args(self.target(), args)
	}

	// ========================================================================
	// FETCH STEPS
	// ========================================================================

	async fn detect_storage_type(&self) -> Result<StorageType, FetchError> {
		let tmp_dir = self.config.tmp_dir();
		tokio::fs::create_dir_all(&tmp_dir).await?;

		let output = self
			.git
			.with_args(&tmp_dir, &["ls-remote", "--heads"])
			.arg(self.url.to_string())
			.output()
			.await?;

		if !output.success() {
			let reason = output.stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
			error!("Fetcher | Could not list remote branches: {}", reason);
			let err = FetchError::StorageTypeUnavailable;
			self.push_error(&err.to_string());
			return Err(err);
		}

		let detection = storage::detect_storage_type(&output.stdout);
		let mut state = self.state();
		state.storage_type = detection.storage_type;
		if let Some(salt) = detection.salt {
			state.salt = salt;
		}
		info!("Fetcher | Remote storage type: {}", detection.storage_type);
		Ok(detection.storage_type)
	}

	async fn clone_remote(&self, storage_type: StorageType) -> Result<(), FetchError> {
		let target = self.target().to_path_buf();
		let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
		tokio::fs::create_dir_all(&parent).await?;

		let large_files = storage_type == StorageType::LargeFiles;
		let mut cmd = if large_files {
			self.git.with_args(&parent, &["lfs", "clone", "--progress", "--no-checkout"])
		} else {
			self.git.with_args(&parent, &["clone", "--progress", "--no-checkout"])
		};
		if !self.request.fetch_prior_history {
			cmd = cmd.arg("--depth=1");
		}
		cmd = cmd.arg(self.url.to_string()).arg(target.to_string_lossy());

		// git-lfs reports on stdout, git itself on stderr
		let stream = if large_files { OutputStream::Stdout } else { OutputStream::Stderr };
		let mut process = cmd.spawn_streaming(stream)?;
		*self.clone_process.lock().unwrap_or_else(|e| e.into_inner()) = Some(process.kill_handle());

		let mut throttle = ProgressThrottle::new(self.config.progress_interval());
		let mut last_error: Option<String> = None;

		loop {
			let line = match process.next_line().await {
				Ok(Some(line)) => line,
				Ok(None) => break,
				Err(CommandError::Killed) => return Err(FetchError::Cancelled),
				Err(e) => {
					self.push_error(&e.to_string());
					return Err(e.into());
				}
			};

			match parse_progress(&line) {
				ProgressLine::Progress(update) => {
					if let Some(update) = throttle.offer(update) {
						self.callback.on_fetch_event(FetchEvent::ProgressChanged(update));
					}
				}
				ProgressLine::Error(kind) => {
					error!("Fetcher | Clone failed ({}): {}", kind, line);
					self.push_error(&line);
					process.kill_handle().kill();
					let _ = process.wait().await;
					return Err(FetchError::CloneFailed { message: line });
				}
				ProgressLine::Other(text) => {
					debug!("Fetcher | {}", text);
					if text.starts_with("fatal:") || text.starts_with("error:") {
						last_error = Some(text);
					}
				}
				ProgressLine::Ignored => {}
			}
		}

		let exit = match process.wait().await {
			Ok(exit) => exit,
			Err(CommandError::Killed) => return Err(FetchError::Cancelled),
			Err(e) => return Err(e.into()),
		};

		if !exit.success() {
			let message = last_error.unwrap_or_else(|| {
				format!("error: clone exited with code {}", exit.code.unwrap_or(-1))
			});
			self.push_error(&message);
			return Err(FetchError::CloneFailed { message });
		}

		self.callback.on_fetch_event(FetchEvent::ProgressChanged(ProgressUpdate {
			percentage: 100.0,
			speed: 0.0,
			information: String::new(),
		}));
		Ok(())
	}

	// ========================================================================
	// COMPLETION STEPS
	// ========================================================================

	async fn set_config(&self, key: &str, value: &str) -> Result<(), FetchError> {
		self.git_in_target(&["config", key, value]).run().await?;
		Ok(())
	}

	async fn install_configuration(&self, storage_type: StorageType) -> Result<(), FetchError> {
		for (key, value) in rules::config_settings() {
			self.set_config(key, value).await?;
		}
		self.set_config("user.name", &self.config.user.name).await?;
		self.set_config("user.email", &self.config.user.email).await?;

		if storage_type == StorageType::LargeFiles {
			let git_lfs = self.paths.git_lfs.to_string_lossy();
			for (key, value) in rules::lfs_filter_settings(&git_lfs, self.git.ssh_command()) {
				self.set_config(key, &value).await?;
			}
		}
		debug!("Fetcher | Added configuration to '{}'", self.target().display());
		Ok(())
	}

	async fn install_rules(&self, storage_type: StorageType) -> Result<(), FetchError> {
		let info_dir = self.target().join(".git").join("info");
		tokio::fs::create_dir_all(&info_dir).await?;
		tokio::fs::write(info_dir.join("attributes"), rules::attribute_rules(storage_type)).await?;
		tokio::fs::write(info_dir.join("exclude"), rules::exclude_rules()).await?;
		Ok(())
	}

	async fn create_initial_commit(&self, storage_type: StorageType) -> Result<String, FetchError> {
		let identifier = random_identifier();
		tokio::fs::write(self.target().join(IDENTIFIER_FILE), &identifier).await?;
		tokio::fs::write(self.target().join(WELCOME_FILE), rules::welcome_text(&self.url, storage_type))
			.await?;

		self.git_in_target(&["add", IDENTIFIER_FILE, WELCOME_FILE]).run().await?;
		self.git_in_target(&["commit", "--message=Initial commit"]).run().await?;

		// Pushed later together with everything else
		if let Some(branch) = storage::marker_branch(storage_type, &self.salt()) {
			self.git_in_target(&["branch", &branch]).run().await?;
		}
		MarkerFiles::new(self.target()).set_unsynced_changes(true).await?;
		Ok(identifier)
	}

	async fn check_out_existing(&self) -> Result<String, FetchError> {
		let preferred = format!("refs/heads/{}", PREFERRED_BRANCH);
		let has_preferred = self
			.git_in_target(&["show-ref", "--verify", "--quiet", &preferred])
			.output()
			.await?
			.success();
		let branch = if has_preferred { PREFERRED_BRANCH } else { "HEAD" };

		self.git_in_target(&["checkout", "--quiet", "--force", branch]).run().await?;

		match tokio::fs::read_to_string(self.target().join(IDENTIFIER_FILE)).await {
			Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
			_ => {
				warn!("Fetcher | No identifier found in checkout, generating one");
				Ok(random_identifier())
			}
		}
	}

	async fn remove_lfs_scratch(&self) {
		let scratch = self.config.tmp_dir().join("lfs");
		if scratch.exists() {
			if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
				warn!("Fetcher | Could not remove {}: {}", scratch.display(), e);
			}
		}
	}
}

#[async_trait]
impl Fetcher for GitFetcher {
	fn request(&self) -> &FetchRequest {
		&self.request
	}

	fn remote_url(&self) -> &RemoteUrl {
		&self.url
	}

	fn format_name(&self) -> String {
		format_name(&self.url.path)
	}

	fn available_storage_types(&self) -> Vec<StorageTypeInfo> {
		available_storage_types(self.large_files_available)
	}

	fn storage_type(&self) -> StorageType {
		self.state().storage_type
	}

	fn is_active(&self) -> bool {
		self.active.load(Ordering::SeqCst)
	}

	fn warnings(&self) -> Vec<String> {
		self.state().warnings.clone()
	}

	fn errors(&self) -> Vec<String> {
		self.state().errors.clone()
	}

	async fn fetch(&self) -> Result<(), FetchError> {
		self.active.store(true, Ordering::SeqCst);

		match self.trust.establish(&self.url, self.request.fingerprint.as_deref()).await {
			Ok(Some(warning)) => self.state().warnings.push(warning),
			Ok(None) => {}
			Err(e) => {
				self.push_error(&e.to_string());
				return Err(e.into());
			}
		}

		let storage_type = self.detect_storage_type().await?;
		if !self.is_active() {
			return Err(FetchError::Cancelled);
		}
		self.clone_remote(storage_type).await
	}

	async fn stop(&self) {
		self.active.store(false, Ordering::SeqCst);
		let handle = self.clone_process.lock().unwrap_or_else(|e| e.into_inner()).take();
		if let Some(handle) = handle {
			handle.kill();
		}

		let target = self.target();
		if target.exists() {
			match tokio::fs::remove_dir_all(target).await {
				Ok(()) => info!("Fetcher | Deleted '{}'", target.display()),
				Err(e) => warn!("Fetcher | Failed to delete '{}': {}", target.display(), e),
			}
		}
	}

	async fn complete(&self, selected: StorageType) -> Result<String, FetchError> {
		let storage_type = match (selected, self.storage_type()) {
			(StorageType::Unknown, StorageType::Unknown) => StorageType::Plain,
			(StorageType::Unknown, detected) => detected,
			(selected, _) => selected,
		};
		self.state().storage_type = storage_type;

		self.install_configuration(storage_type).await?;
		self.install_rules(storage_type).await?;

		let identifier = if self.is_fetched_repo_empty().await {
			self.create_initial_commit(storage_type).await?
		} else {
			self.check_out_existing().await?
		};

		self.remove_lfs_scratch().await;
		info!("Fetcher | Completed '{}' ({} storage)", self.target().display(), storage_type);
		Ok(identifier)
	}

	async fn is_fetched_repo_empty(&self) -> bool {
		match self.git_in_target(&["rev-parse", "HEAD"]).output().await {
			Ok(output) => !output.success(),
			Err(_) => true,
		}
	}

	async fn is_fetched_repo_password_correct(&self, password: &str) -> bool {
		let check_file = self.target().join(IDENTIFIER_FILE);

		if !check_file.exists() {
			let show = format!("HEAD:{}", IDENTIFIER_FILE);
			match self.git_in_target(&["show", &show]).output().await {
				Ok(output) if output.success() => {
					if tokio::fs::write(&check_file, output.stdout).await.is_err() {
						return false;
					}
				}
				_ => return false,
			}
		}

		let salt = self.salt();
		let key = derive_password_key(password, &salt);
		let result = Command::new(&self.paths.openssl)
			.current_dir(self.target())
			.args(&["enc", "-d", "-aes-256-cbc", "-base64", "-S", &salt, "-pass"])
			.arg(format!("pass:{}", key))
			.arg("-in")
			.arg(check_file.to_string_lossy())
			.output()
			.await;

		let correct = matches!(result, Ok(ref output) if output.success());
		if correct {
			let _ = tokio::fs::remove_file(&check_file).await;
		}
		correct
	}

	async fn enable_fetched_repo_crypto(&self, password: &str) -> Result<(), FetchError> {
		let salt = self.salt();
		let openssl = self.paths.openssl.to_string_lossy().into_owned();
		for (key, value) in rules::encryption_filter_settings(&openssl, &salt) {
			self.set_config(key, &value).await?;
		}

		let password_file = self.target().join(ENCRYPTION_PASSWORD_FILE);
		if let Some(parent) = password_file.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&password_file, derive_password_key(password, &salt)).await?;
		restrict_to_owner(&password_file).await?;
		Ok(())
	}
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
	Ok(())
}

// vim: ts=4
