//! Steady-state synchronization of a fetched folder
//!
//! A [`Repository`] pushes local changes ([`Repository::sync_up`]), pulls and
//! merges remote ones ([`Repository::sync_down`]) and answers questions about
//! the folder's state and history. Failures are classified as an
//! [`ErrorKind`] kept on the repository until the next successful sync.
//!
//! Repositories are opened through a backend registry, see
//! [`open_repository`]. Callers must not run two operations on the same
//! repository concurrently; [`crate::sync::SyncDriver`] enforces this.

pub mod conflict;
pub mod files;
pub mod git;
pub mod markers;
pub mod status;

use crate::callbacks::RepositoryCallback;
use crate::config::{Config, FolderConfig};
use crate::context::Context;
use crate::error::SyncError;
use crate::storage::StorageType;
use crate::types::{Change, ChangeSet, ErrorKind};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything needed to open a folder, taken from its configuration entry
#[derive(Debug, Clone)]
pub struct RepositorySettings {
	pub name: String,
	pub local_path: PathBuf,
	pub remote_url: String,
	pub backend: String,
	pub storage_type: StorageType,
	/// Identifier recorded in the configuration, used when the folder lost its file
	pub identifier: Option<String>,
}

impl RepositorySettings {
	pub fn from_folder(config: &Config, folder: &FolderConfig) -> Self {
		let backend = if folder.backend.is_empty() { "git".to_string() } else { folder.backend.to_lowercase() };
		let storage_type = match folder.storage_type {
			StorageType::Unknown => StorageType::Plain,
			other => other,
		};
		RepositorySettings {
			name: folder.name.clone(),
			local_path: config.folder_path(folder),
			remote_url: folder.url.clone(),
			backend,
			storage_type,
			identifier: folder.identifier.clone(),
		}
	}
}

/// Backend-independent operations on a synchronized folder
#[async_trait]
pub trait Repository: Send + Sync {
	/// Display name, also used as log prefix
	fn name(&self) -> &str;

	fn local_path(&self) -> &Path;

	fn remote_url(&self) -> &str;

	/// Identifier stored in the folder, stable across renames
	fn identifier(&self) -> &str;

	fn storage_type(&self) -> StorageType;

	/// Last classified failure, `ErrorKind::None` after a clean sync
	fn error(&self) -> ErrorKind;

	fn clear_error(&self);

	/// Note used verbatim as the next commit message
	fn set_status_message(&self, message: &str);

	/// Push local changes; on failure `error()` tells why
	async fn sync_up(&self) -> Result<(), SyncError>;

	/// Fetch and merge remote changes
	async fn sync_down(&self) -> Result<(), SyncError>;

	/// Uncommitted local edits exist (prepares empty directories first)
	async fn has_local_changes(&self) -> bool;

	/// The remote branch has commits that are not in local history
	async fn has_remote_changes(&self) -> bool;

	/// Local commits exist that have not been pushed
	async fn has_unsynced_changes(&self) -> bool;

	async fn set_has_unsynced_changes(&self, value: bool) -> Result<(), SyncError>;

	async fn current_revision(&self) -> Option<String>;

	/// Cached working-tree size in bytes
	async fn size(&self) -> u64;

	/// Cached history size in bytes
	async fn history_size(&self) -> u64;

	/// Uncommitted changes as they would appear in the next commit
	async fn unsynced_changes(&self) -> Result<Vec<Change>, SyncError>;

	/// History of the folder, or of a single path, newest first
	async fn change_sets(&self, path: Option<&str>) -> Result<Vec<ChangeSet>, SyncError>;

	/// Write `path` as of `revision` to `target`, leaving the working copy untouched
	async fn restore_file(&self, path: &str, revision: &str, target: &Path) -> Result<(), SyncError>;
}

// ============================================================================
// REGISTRY
// ============================================================================

type RepositoryConstructor = fn(
	RepositorySettings,
	Context,
	Arc<dyn RepositoryCallback>,
) -> BoxFuture<'static, Result<Arc<dyn Repository>, SyncError>>;

const REPOSITORIES: &[(&str, RepositoryConstructor)] = &[("git", git::GitRepository::create)];

/// Backend names with a registered repository implementation
pub fn repository_backends() -> Vec<&'static str> {
	REPOSITORIES.iter().map(|(name, _)| *name).collect()
}

/// Open the folder described by `settings` with its backend
pub async fn open_repository(
	settings: RepositorySettings,
	context: &Context,
	callback: Arc<dyn RepositoryCallback>,
) -> Result<Arc<dyn Repository>, SyncError> {
	let constructor = REPOSITORIES
		.iter()
		.find(|(name, _)| *name == settings.backend)
		.map(|(_, constructor)| *constructor)
		.ok_or_else(|| SyncError::UnknownBackend { name: settings.backend.clone() })?;

	constructor(settings, context.clone(), callback).await
}


// vim: ts=4
