//! First-time retrieval of a shared folder
//!
//! A [`Fetcher`] turns a [`FetchRequest`] into a configured working copy:
//! host trust, storage detection, clone with progress, and (on `complete`)
//! the per-checkout settings, initial commit or checkout.
//!
//! Fetchers are looked up by backend name in a static registry, see
//! [`create_fetcher`].

pub mod address;
pub mod git;
pub mod rules;

use crate::callbacks::{FetchCallback, FetchEvent};
use crate::config::FolderConfig;
use crate::context::Context;
use crate::error::FetchError;
use crate::logging::*;
use crate::storage::{StorageType, StorageTypeInfo};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use address::{backend_from_address, RemoteUrl};

/// What to fetch and where to put it
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
	pub address: String,
	pub remote_path: String,
	/// Expected host key fingerprint (colon-separated hex)
	pub fingerprint: Option<String>,
	/// Scratch directory receiving the checkout
	pub target_folder: PathBuf,
	/// Clone full history instead of only the newest revision
	pub fetch_prior_history: bool,
	/// Explicit backend; derived from the address when absent
	pub backend: Option<String>,
	/// Announcements channel for change notifications, stored with the folder
	pub announcements_url: Option<String>,
}

impl FetchRequest {
	/// Backend named in the request, else the one the address selects
	pub fn backend_name(&self) -> String {
		match &self.backend {
			Some(backend) => backend.to_lowercase(),
			None => backend_from_address(&self.address),
		}
	}

	/// Configuration entry for the folder this request produced
	pub fn folder_entry(
		&self,
		name: &str,
		url: &RemoteUrl,
		storage_type: StorageType,
		identifier: String,
	) -> FolderConfig {
		FolderConfig {
			name: name.to_string(),
			url: url.to_string(),
			backend: self.backend_name(),
			identifier: Some(identifier),
			storage_type,
			announcements_url: self.announcements_url.clone(),
			..Default::default()
		}
	}
}

/// Backend-independent fetch operations
#[async_trait]
pub trait Fetcher: Send + Sync {
	fn request(&self) -> &FetchRequest;

	/// Normalized remote URL
	fn remote_url(&self) -> &RemoteUrl;

	/// Display name derived from the remote path
	fn format_name(&self) -> String;

	/// Storage types the user may choose for an empty remote
	fn available_storage_types(&self) -> Vec<StorageTypeInfo>;

	/// Storage type detected on the remote (`Unknown` for an empty one)
	fn storage_type(&self) -> StorageType;

	fn is_active(&self) -> bool;

	fn warnings(&self) -> Vec<String>;

	fn errors(&self) -> Vec<String>;

	/// Trust the host, detect storage and clone into the target folder
	async fn fetch(&self) -> Result<(), FetchError>;

	/// Kill a running clone and remove the partial target
	async fn stop(&self);

	/// Configure the checkout for `storage_type`; returns the folder identifier
	async fn complete(&self, storage_type: StorageType) -> Result<String, FetchError>;

	async fn is_fetched_repo_empty(&self) -> bool;

	async fn is_fetched_repo_password_correct(&self, password: &str) -> bool;

	async fn enable_fetched_repo_crypto(&self, password: &str) -> Result<(), FetchError>;
}

// ============================================================================
// REGISTRY
// ============================================================================

type FetcherConstructor =
	fn(FetchRequest, &Context, Arc<dyn FetchCallback>) -> Result<Arc<dyn Fetcher>, FetchError>;

const FETCHERS: &[(&str, FetcherConstructor)] = &[("git", git::GitFetcher::create)];

/// Backend names with a registered fetcher
pub fn fetcher_backends() -> Vec<&'static str> {
	FETCHERS.iter().map(|(name, _)| *name).collect()
}

/// Construct the fetcher for the request's backend
pub fn create_fetcher(
	request: FetchRequest,
	context: &Context,
	callback: Arc<dyn FetchCallback>,
) -> Result<Arc<dyn Fetcher>, FetchError> {
	let backend = request.backend_name();

	let constructor = FETCHERS
		.iter()
		.find(|(name, _)| *name == backend)
		.map(|(_, constructor)| *constructor)
		.ok_or(FetchError::UnknownBackend { name: backend })?;

	constructor(request, context, callback)
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Clear the target, fetch, and report the outcome through `callback`.
///
/// Returns true when the fetch finished. A fetch stopped by the caller reports
/// neither `Finished` nor `Failed`.
pub async fn run_fetch(fetcher: &dyn Fetcher, callback: &dyn FetchCallback) -> bool {
	let target = fetcher.request().target_folder.clone();
	info!("Fetcher | {} | Fetching folder: {}", target.display(), fetcher.remote_url());
	callback.on_fetch_event(FetchEvent::Started);

	if target.exists() {
		if let Err(e) = tokio::fs::remove_dir_all(&target).await {
			error!("Fetcher | Failed to clear {}: {}", target.display(), e);
			let err = FetchError::TargetNotWritable { path: target };
			callback.on_fetch_event(FetchEvent::Failed { errors: vec![err.to_string()] });
			return false;
		}
	}

	match fetcher.fetch().await {
		Ok(()) => {
			info!("Fetcher | Finished");
			callback.on_fetch_event(FetchEvent::Finished {
				storage_type: fetcher.storage_type(),
				warnings: fetcher.warnings(),
			});
			true
		}
		Err(FetchError::Cancelled) => {
			info!("Fetcher | Failed: cancelled by user");
			false
		}
		Err(_) if !fetcher.is_active() => {
			info!("Fetcher | Failed: cancelled by user");
			false
		}
		Err(e) => {
			info!("Fetcher | Failed: {}", e);
			let mut errors = fetcher.errors();
			if errors.is_empty() {
				errors.push(e.to_string());
			}
			callback.on_fetch_event(FetchEvent::Failed { errors });
			false
		}
	}
}

/// Run [`run_fetch`] on a background task
pub fn start_fetch(fetcher: Arc<dyn Fetcher>, callback: Arc<dyn FetchCallback>) -> JoinHandle<bool> {
	tokio::spawn(async move { run_fetch(fetcher.as_ref(), callback.as_ref()).await })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_lists_git() {
		assert_eq!(fetcher_backends(), vec!["git"]);
	}

	#[test]
	fn test_folder_entry_carries_request_settings() {
		let request = FetchRequest {
			address: "ssh+git://storage@example.org".to_string(),
			remote_path: "/photos".to_string(),
			announcements_url: Some("tcp://notify.example.org:443".to_string()),
			..Default::default()
		};
		let url = RemoteUrl::parse("ssh://storage@example.org/photos").unwrap();
		let entry = request.folder_entry("Photos", &url, StorageType::Plain, "ab12".to_string());

		assert_eq!(entry.name, "Photos");
		assert_eq!(entry.url, "ssh://storage@example.org/photos");
		assert_eq!(entry.backend, "git");
		assert_eq!(entry.identifier.as_deref(), Some("ab12"));
		assert_eq!(entry.announcements_url.as_deref(), Some("tcp://notify.example.org:443"));
		assert!(!entry.paused);
	}

	#[test]
	fn test_explicit_backend_wins() {
		let request = FetchRequest {
			address: "ssh://example.org/photos".to_string(),
			backend: Some("Git".to_string()),
			..Default::default()
		};
		assert_eq!(request.backend_name(), "git");
		assert_eq!(FetchRequest::default().announcements_url, None);
	}
}

// vim: ts=4
