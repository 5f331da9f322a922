//! Git implementation of [`Repository`]

use super::conflict::{conflict_copy_name, entry_action, numbered_copy_name, ConflictAction};
use super::files;
use super::markers::MarkerFiles;
use super::status::{format_commit_message, parse_status, parse_status_entries};
use super::{Repository, RepositorySettings};
use crate::callbacks::{RepositoryCallback, RepositoryEvent};
use crate::changeset::{log_args, parse_log, LogContext, LogWindow};
use crate::command::{Command, CommandOutput, Git, OutputStream, StreamExit};
use crate::config::Config;
use crate::context::Context;
use crate::error::SyncError;
use crate::fetcher::rules;
use crate::logging::*;
use crate::progress::{clamp_repository_progress, parse_progress, ProgressLine, ProgressThrottle};
use crate::storage::StorageType;
use crate::types::{Change, ChangeSet, ErrorKind};
use crate::util::Memo;
use async_trait::async_trait;
use chrono::Local;
use futures::future::{BoxFuture, FutureExt};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pause before retrying a failed conflict resolution
const RESOLVE_RETRY_DELAY: Duration = Duration::from_millis(250);

const CONFLICT_RESOLUTION_MESSAGE: &str = "Conflict resolution";

/// Run a synchronous file-system walk on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
	F: FnOnce() -> io::Result<T> + Send + 'static,
	T: Send + 'static,
{
	let result = tokio::task::spawn_blocking(f)
		.await
		.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
	Ok(result?)
}

pub struct GitRepository {
	settings: RepositorySettings,
	identifier: String,
	git: Git,
	config: Arc<Config>,
	callback: Arc<dyn RepositoryCallback>,
	markers: MarkerFiles,
	branch: Memo<String>,
	user_is_set: AtomicBool,
	error: Mutex<ErrorKind>,
	status_message: Mutex<String>,
}

impl GitRepository {
	/// Open a checkout and pin its per-repository settings
	pub async fn open(
		settings: RepositorySettings,
		context: &Context,
		callback: Arc<dyn RepositoryCallback>,
	) -> Result<GitRepository, SyncError> {
		let local_path = settings.local_path.clone();
		if !local_path.join(".git").is_dir() {
			return Err(SyncError::InvalidRepository {
				path: local_path,
				message: "not a git checkout".to_string(),
			});
		}
		info!("{} | Initializing...", settings.name);

		let git = context.git();
		git.with_args(&local_path, &["config", "core.ignorecase", "false"]).run().await?;
		if !settings.remote_url.is_empty() {
			git.with_args(&local_path, &["config", "remote.origin.url", &settings.remote_url]).run().await?;
		}
		git.with_args(&local_path, &["config", "core.sshCommand", git.ssh_command()]).run().await?;

		let configured = settings.identifier.clone();
		let root = local_path.clone();
		let identifier = blocking(move || files::resolve_identifier(&root, configured.as_deref())).await?;

		Ok(GitRepository {
			markers: MarkerFiles::new(&local_path),
			settings,
			identifier,
			git,
			config: context.config.clone(),
			callback,
			branch: Memo::new(),
			user_is_set: AtomicBool::new(false),
			error: Mutex::new(ErrorKind::None),
			status_message: Mutex::new(String::new()),
		})
	}

	/// Registry constructor
	pub fn create(
		settings: RepositorySettings,
		context: Context,
		callback: Arc<dyn RepositoryCallback>,
	) -> BoxFuture<'static, Result<Arc<dyn Repository>, SyncError>> {
		async move {
			let repository = Self::open(settings, &context, callback).await?;
			Ok(Arc::new(repository) as Arc<dyn Repository>)
		}
		.boxed()
	}

	fn git_command(&self, args: &[&str]) -> Command {
		self.git.with_args(&self.settings.local_path, args)
	}

	async fn git_config(&self, key: &str, value: &str) -> Result<(), SyncError> {
		self.git_command(&["config", key, value]).run().await?;
		Ok(())
	}

	fn set_error(&self, kind: ErrorKind) {
		*self.error.lock().unwrap_or_else(|e| e.into_inner()) = kind;
		info!("{} | Error status changed to {}", self.name(), kind);
	}

	fn fail(&self, kind: ErrorKind) -> SyncError {
		self.set_error(kind);
		SyncError::Unrecoverable(kind)
	}

	async fn porcelain_status(&self) -> Result<String, SyncError> {
		Ok(self.git_command(&["status", "--porcelain"]).run().await?.stdout)
	}

	async fn pending_changes(&self) -> Result<Vec<Change>, SyncError> {
		Ok(parse_status(&self.porcelain_status().await?))
	}

	async fn update_sizes(&self) {
		let root = self.settings.local_path.clone();
		match blocking(move || Ok(files::calculate_sizes(&root))).await {
			Ok((size, history_size)) => {
				if let Err(e) = self.markers.write_sizes(size, history_size).await {
					warn!("{} | Failed to store sizes: {}", self.name(), e);
				}
			}
			Err(e) => warn!("{} | Failed to calculate sizes: {}", self.name(), e),
		}
	}

	// ========================================================================
	// BRANCH RESOLUTION
	// ========================================================================

	/// Current branch, looked up once; leaves any interrupted merge first
	async fn branch(&self) -> Result<String, SyncError> {
		if let Some(branch) = self.branch.get() {
			return Ok(branch);
		}

		self.finish_interrupted_merge().await?;

		let output = self.git_command(&["rev-parse", "--abbrev-ref", "HEAD"]).run().await?;
		let branch = output.stdout_trimmed().to_string();
		self.branch.set(branch.clone());
		Ok(branch)
	}

	async fn finish_interrupted_merge(&self) -> Result<(), SyncError> {
		if !self.markers.in_merge() {
			return Ok(());
		}
		info!("{} | Found an unfinished merge, resolving it first", self.name());

		self.git_config("core.ignorecase", "true").await?;
		let result = self.resolve_until_clean().await;
		self.git_config("core.ignorecase", "false").await?;
		result
	}

	// ========================================================================
	// STAGING & COMMITTING
	// ========================================================================

	async fn add_all(&self) -> Result<(), SyncError> {
		self.git_command(&["add", "--all"]).run().await?;
		Ok(())
	}

	async fn ensure_user(&self) -> Result<(), SyncError> {
		if self.user_is_set.load(Ordering::SeqCst) {
			return Ok(());
		}
		self.git_config("user.name", &self.config.user.name).await?;
		self.git_config("user.email", &self.config.user.email).await?;
		self.user_is_set.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn commit(&self, message: &str) -> Result<(), SyncError> {
		self.ensure_user().await?;

		let output = self
			.git_command(&["commit", "--all"])
			.arg(format!("--message={}", message))
			.arg(format!("--author={}", self.config.user))
			.output()
			.await?;

		if !output.success() {
			debug!("{} | Nothing committed: {}", self.name(), output.stdout_trimmed());
		}
		Ok(())
	}

	async fn install_pre_push_hook(&self) -> Result<(), SyncError> {
		let hook = self.markers.pre_push_hook_path();
		if let Some(parent) = hook.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let git_lfs = self.git.paths().git_lfs.to_string_lossy().into_owned();
		tokio::fs::write(&hook, rules::lfs_pre_push_hook(&git_lfs, self.git.ssh_command())).await?;
		make_executable(&hook).await?;
		Ok(())
	}

	// ========================================================================
	// TRANSFERS
	// ========================================================================

	/// Run a push or fetch, publishing progress; a recognized error line kills it
	async fn run_transfer(&self, command: Command) -> Result<StreamExit, SyncError> {
		let stream = if self.settings.storage_type == StorageType::LargeFiles {
			OutputStream::Stdout
		} else {
			OutputStream::Stderr
		};

		let mut process = command.spawn_streaming(stream)?;
		let mut throttle = ProgressThrottle::new(self.config.progress_interval());

		while let Some(line) = process.next_line().await? {
			match parse_progress(&line) {
				ProgressLine::Progress(update) => {
					if let Some(update) = clamp_repository_progress(update).and_then(|u| throttle.offer(u)) {
						self.callback.on_repository_event(self.name(), RepositoryEvent::ProgressChanged(update));
					}
				}
				ProgressLine::Error(kind) => {
					info!("{} | {}", self.name(), line);
					process.kill_handle().kill();
					let _ = process.wait().await;
					return Err(self.fail(kind));
				}
				ProgressLine::Other(text) => debug!("{} | {}", self.name(), text),
				ProgressLine::Ignored => {}
			}
		}

		Ok(process.wait().await?)
	}

	// ========================================================================
	// MERGING
	// ========================================================================

	async fn merge(&self) -> Result<(), SyncError> {
		if let Some(message) = format_commit_message(&self.pending_changes().await?) {
			self.add_all().await?;
			self.commit(&message).await?;
		}

		if self.markers.in_merge() {
			warn!("{} | Aborting an interrupted merge", self.name());
			let _ = self.git_command(&["merge", "--abort"]).output().await;
			self.branch.invalidate();
			return Err(SyncError::InvalidRepository {
				path: self.settings.local_path.clone(),
				message: "an interrupted merge was aborted".to_string(),
			});
		}

		self.ensure_user().await?;

		// Case-only renames on the other side must not conflict
		self.git_config("core.ignorecase", "true").await?;
		let result = self.merge_fetched().await;
		self.git_config("core.ignorecase", "false").await?;
		result
	}

	async fn merge_fetched(&self) -> Result<(), SyncError> {
		let output = self.git_command(&["merge", "--no-edit", "FETCH_HEAD"]).output().await?;
		if output.success() {
			return Ok(());
		}

		if is_unreadable_failure(&output) {
			let _ = self.git_command(&["merge", "--abort"]).output().await;
			return Err(self.fail(ErrorKind::UnreadableFiles));
		}

		info!("{} | {}", self.name(), output.stdout_trimmed());
		info!("{} | Conflict detected, trying to get out...", self.name());
		self.resolve_until_clean().await?;
		info!("{} | Conflict resolved", self.name());
		Ok(())
	}

	/// Resolve until no merge is in progress; each failed pass is retried
	async fn resolve_until_clean(&self) -> Result<(), SyncError> {
		let mut attempt = 0;
		while self.markers.in_merge() && self.has_local_changes().await {
			attempt += 1;
			if let Some(max) = self.config.max_resolve_attempts {
				if attempt > max {
					return Err(SyncError::ConflictLoopExceeded { attempts: max });
				}
			}

			if let Err(e) = self.resolve_conflict().await {
				warn!("{} | Failed to resolve conflict (attempt {}), trying again: {}", self.name(), attempt, e);
				tokio::time::sleep(RESOLVE_RETRY_DELAY).await;
			}
		}
		Ok(())
	}

	/// One resolution pass over every entry of `git status`
	async fn resolve_conflict(&self) -> Result<(), SyncError> {
		let output = self.porcelain_status().await?;
		let mut user_visible = false;

		for entry in parse_status_entries(&output) {
			info!("{} | Conflict type: {} {}", self.name(), entry.code, entry.path);
			let action = entry_action(&entry);

			match action {
				ConflictAction::KeepLocalMarker => {
					info!("{} | Ignoring conflict in special file: {}", self.name(), entry.path);
					self.checkout_side("--ours", &entry.path).await;
				}
				ConflictAction::KeepBoth => self.keep_both(&entry.path).await?,
				ConflictAction::StageWorkingCopy => {
					self.git_command(&["add", "--", &entry.path]).run().await?;
				}
				ConflictAction::RestoreLocal => self.checkout_side("--ours", &entry.path).await,
				ConflictAction::Nothing => info!("{} | No need to resolve: {}", self.name(), entry.path),
				ConflictAction::StageNew => {
					info!("{} | Found new file, no need to resolve: {}", self.name(), entry.path)
				}
				ConflictAction::Unrecognized => {
					info!("{} | Don't know what to do with: {} {}", self.name(), entry.code, entry.path)
				}
			}
			user_visible |= action.is_user_visible();
		}

		self.add_all().await?;
		self.ensure_user().await?;
		self.git_command(&["commit"])
			.arg(format!("--message={}", CONFLICT_RESOLUTION_MESSAGE))
			.arg(format!("--author={}", self.config.service_author))
			.run()
			.await?;

		self.markers.set_unsynced_changes(true).await?;

		if user_visible {
			self.callback.on_repository_event(self.name(), RepositoryEvent::ConflictResolved);
		}
		Ok(())
	}

	async fn checkout_side(&self, side: &str, path: &str) {
		match self.git_command(&["checkout", side, "--", path]).output().await {
			Ok(output) if output.success() => {}
			Ok(output) => debug!("{} | checkout {} {}: {}", self.name(), side, path, output.stderr.trim()),
			Err(e) => warn!("{} | checkout {} {}: {}", self.name(), side, path, e),
		}
	}

	/// Local version under a timestamped copy name, remote version in place
	async fn keep_both(&self, path: &str) -> Result<(), SyncError> {
		let absolute = self.settings.local_path.join(path);

		self.checkout_side("--ours", path).await;
		if absolute.exists() {
			let copy = self.free_copy_name(path);
			tokio::fs::rename(&absolute, self.settings.local_path.join(&copy)).await?;
			info!("{} | Saved local version of {} as {}", self.name(), path, copy);
		}

		self.checkout_side("--theirs", path).await;
		Ok(())
	}

	fn free_copy_name(&self, path: &str) -> String {
		let base = conflict_copy_name(path, &self.config.user.name, &Local::now());
		let mut candidate = base.clone();
		let mut number = 2;
		while self.settings.local_path.join(&candidate).exists() {
			candidate = numbered_copy_name(&base, number);
			number += 1;
		}
		candidate
	}

	async fn run_log(&self, window: LogWindow, path: Option<&str>) -> Result<String, SyncError> {
		let mut command =
			self.git.command(&self.settings.local_path).args(log_args(&self.config.history, window));
		if let Some(path) = path {
			command = command.arg("--").arg(path.replace('\\', "/"));
		}
		// An empty repository has no log; that is not an error
		Ok(command.output().await?.stdout)
	}
}

#[async_trait]
impl Repository for GitRepository {
	fn name(&self) -> &str {
		&self.settings.name
	}

	fn local_path(&self) -> &Path {
		&self.settings.local_path
	}

	fn remote_url(&self) -> &str {
		&self.settings.remote_url
	}

	fn identifier(&self) -> &str {
		&self.identifier
	}

	fn storage_type(&self) -> StorageType {
		self.settings.storage_type
	}

	fn error(&self) -> ErrorKind {
		*self.error.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn clear_error(&self) {
		*self.error.lock().unwrap_or_else(|e| e.into_inner()) = ErrorKind::None;
	}

	fn set_status_message(&self, message: &str) {
		*self.status_message.lock().unwrap_or_else(|e| e.into_inner()) = message.to_string();
	}

	async fn sync_up(&self) -> Result<(), SyncError> {
		if let Err(e) = self.add_all().await {
			warn!("{} | Failed to stage changes: {}", self.name(), e);
			return Err(self.fail(ErrorKind::UnreadableFiles));
		}

		let note = self.status_message.lock().unwrap_or_else(|e| e.into_inner()).clone();
		let message = if note.is_empty() {
			format_commit_message(&self.pending_changes().await?)
		} else {
			Some(note)
		};
		if let Some(message) = message {
			self.commit(&message).await?;
		}

		if self.settings.storage_type == StorageType::LargeFiles {
			self.install_pre_push_hook().await?;
		}

		let exit = self.run_transfer(self.git_command(&["push", "--all", "--progress", "origin"])).await?;
		self.update_sizes().await;

		if exit.success() {
			Ok(())
		} else {
			info!("{} | Push failed: {}", self.name(), exit.other_output.trim());
			Err(self.fail(ErrorKind::HostUnreachable))
		}
	}

	async fn sync_down(&self) -> Result<(), SyncError> {
		let large_files = self.settings.storage_type == StorageType::LargeFiles;
		if large_files {
			self.markers.set_lfs_behind(true).await?;
		}

		let branch = self.branch().await?;
		let fetched = self.run_transfer(self.git_command(&["fetch", "--progress", "origin", &branch])).await;
		// The branch is looked up again after a failed fetch
		match fetched {
			Ok(exit) if exit.success() => {}
			Ok(exit) => {
				info!("{} | Fetch failed: {}", self.name(), exit.other_output.trim());
				self.branch.invalidate();
				return Err(self.fail(ErrorKind::HostUnreachable));
			}
			Err(e) => {
				self.branch.invalidate();
				return Err(e);
			}
		}

		self.merge().await?;

		if large_files {
			// Explicit pull lets git-lfs fetch objects concurrently
			let pull = self.git_command(&["lfs", "pull", "origin"]).output().await?;
			if !pull.success() {
				return Err(self.fail(ErrorKind::HostUnreachable));
			}
			self.markers.set_lfs_behind(false).await?;
		}

		self.update_sizes().await;
		Ok(())
	}

	async fn has_local_changes(&self) -> bool {
		let root = self.settings.local_path.clone();
		if let Err(e) = blocking(move || files::prepare_directories(&root)).await {
			warn!("{} | Failed preparing directories: {}", self.name(), e);
		}

		match self.porcelain_status().await {
			Ok(output) => !output.trim().is_empty(),
			Err(e) => {
				warn!("{} | Failed to read status: {}", self.name(), e);
				false
			}
		}
	}

	async fn has_remote_changes(&self) -> bool {
		info!("{} | Checking for remote changes...", self.name());
		let current = self.current_revision().await;

		let branch = match self.branch().await {
			Ok(branch) => branch,
			Err(e) => {
				warn!("{} | Failed to resolve branch: {}", self.name(), e);
				return false;
			}
		};

		let output =
			match self.git_command(&["ls-remote", "--heads", "--exit-code", "origin", &branch]).output().await {
				Ok(output) if output.success() => output,
				_ => return false,
			};
		let remote = match output.stdout.split_whitespace().next() {
			Some(revision) => revision.to_string(),
			None => return false,
		};

		if current.as_deref() == Some(remote.as_str()) {
			info!("{} | No remote changes, local+remote: {}", self.name(), remote);
			return false;
		}

		let known = self
			.git_command(&["merge-base", "--is-ancestor", &remote, "HEAD"])
			.output()
			.await
			.map(|output| output.success())
			.unwrap_or(false);

		if known {
			info!("{} | Remote {} is already in our history", self.name(), remote);
			false
		} else {
			info!(
				"{} | Remote changes found, local: {}, remote: {}",
				self.name(),
				current.as_deref().unwrap_or("none"),
				remote
			);
			self.clear_error();
			true
		}
	}

	async fn has_unsynced_changes(&self) -> bool {
		if self.settings.storage_type == StorageType::LargeFiles && self.markers.lfs_is_behind() {
			return true;
		}
		self.markers.has_unsynced_changes()
	}

	async fn set_has_unsynced_changes(&self, value: bool) -> Result<(), SyncError> {
		Ok(self.markers.set_unsynced_changes(value).await?)
	}

	async fn current_revision(&self) -> Option<String> {
		match self.git_command(&["rev-parse", "HEAD"]).output().await {
			Ok(output) if output.success() => Some(output.stdout_trimmed().to_string()),
			_ => None,
		}
	}

	async fn size(&self) -> u64 {
		self.markers.size().await
	}

	async fn history_size(&self) -> u64 {
		self.markers.history_size().await
	}

	async fn unsynced_changes(&self) -> Result<Vec<Change>, SyncError> {
		self.pending_changes().await
	}

	async fn change_sets(&self, path: Option<&str>) -> Result<Vec<ChangeSet>, SyncError> {
		let mut output = self.run_log(LogWindow::Recent, path).await?;
		if path.is_none() && output.trim().is_empty() {
			output = self.run_log(LogWindow::Newest, None).await?;
		}

		let context = LogContext {
			folder: self.name(),
			remote_url: &self.settings.remote_url,
			service_author: &self.config.service_author.name,
			max_changes_per_commit: self.config.history.max_changes_per_commit,
			path,
		};
		Ok(parse_log(&output, &context))
	}

	async fn restore_file(&self, path: &str, revision: &str, target: &Path) -> Result<(), SyncError> {
		info!("{} | Restoring \"{}\" (revision {})", self.name(), path, revision);
		let path = path.replace('\\', "/");

		self.git_command(&["checkout", revision, "--", &path]).run().await?;

		let restored = self.settings.local_path.join(&path);
		if let Err(e) = move_file(&restored, target).await {
			warn!(
				"{} | Failed to move \"{}\" to \"{}\": {}",
				self.name(),
				restored.display(),
				target.display(),
				e
			);
		}

		// Put index and working copy back to the current revision
		let _ = self.git_command(&["reset", "--quiet", "--", &path]).output().await;
		if let Some(current) = self.current_revision().await {
			let _ = self.git_command(&["checkout", &current, "--", &path]).output().await;
		}
		Ok(())
	}
}

async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
	if let Some(parent) = to.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	if tokio::fs::rename(from, to).await.is_ok() {
		return Ok(());
	}
	tokio::fs::copy(from, to).await?;
	tokio::fs::remove_file(from).await
}

/// A merge that stopped on a file git could not read
/// (`error: cannot stat 'filename': Permission denied`)
fn is_unreadable_failure(output: &CommandOutput) -> bool {
	output.stderr.contains("error: cannot stat") || output.stdout.contains("error: cannot stat")
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> io::Result<()> {
	Ok(())
}


// vim: ts=4
