//! Event callbacks for fetches and synchronized folders
//!
//! Both callback traits have blanket implementations for closures, so callers
//! can pass `|event| ...` wherever a callback is expected.

use crate::progress::ProgressUpdate;
use crate::storage::StorageType;
use crate::types::{ChangeSet, SyncStatus};

/// Events emitted while a folder is being fetched for the first time
#[derive(Debug, Clone)]
pub enum FetchEvent {
	Started,
	ProgressChanged(ProgressUpdate),
	Finished { storage_type: StorageType, warnings: Vec<String> },
	Failed { errors: Vec<String> },
}

/// Events emitted by a synchronized folder
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
	SyncStatusChanged(SyncStatus),
	ProgressChanged(ProgressUpdate),
	/// Local edits were noticed and a sync up is starting
	ChangesDetected,
	/// Someone else's change-set arrived with a sync down
	NewChangeSet(ChangeSet),
	/// A conflicting edit was kept under a new name
	ConflictResolved,
}

pub trait FetchCallback: Send + Sync {
	fn on_fetch_event(&self, _event: FetchEvent) {}
}

impl<T: Fn(FetchEvent) + Send + Sync> FetchCallback for T {
	fn on_fetch_event(&self, event: FetchEvent) {
		self(event);
	}
}

pub trait RepositoryCallback: Send + Sync {
	/// `folder` is the display name of the emitting folder
	fn on_repository_event(&self, _folder: &str, _event: RepositoryEvent) {}
}

impl<T: Fn(&str, RepositoryEvent) + Send + Sync> RepositoryCallback for T {
	fn on_repository_event(&self, folder: &str, event: RepositoryEvent) {
		self(folder, event);
	}
}

/// Callback that ignores every event
pub struct NoCallbacks;

impl FetchCallback for NoCallbacks {}

impl RepositoryCallback for NoCallbacks {}


// vim: ts=4
