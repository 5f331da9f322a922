//! Sync lifecycle of one folder
//!
//! [`SyncDriver`] wraps a [`Repository`] and decides when to push and pull:
//! at startup, on every poll tick, when local changes are reported and when
//! the user retries after an error. Only one sync runs per folder at a time;
//! a trigger that arrives while a sync is in flight is dropped, the next
//! tick picks up whatever it would have done.
//!
//! Status transitions are published as [`RepositoryEvent::SyncStatusChanged`]
//! whenever the status actually changes. An `Error` status sticks until
//! [`SyncDriver::force_retry`] succeeds.

use crate::callbacks::{RepositoryCallback, RepositoryEvent};
use crate::config::Config;
use crate::fetcher::rules::IDENTIFIER_FILE;
use crate::logging::*;
use crate::repository::Repository;
use crate::types::{ChangeSet, SyncStatus};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct DriverState {
	status: SyncStatus,
	poll_interval: Duration,
	last_poll: Instant,
	change_sets: Vec<ChangeSet>,
}

pub struct SyncDriver {
	repo: Arc<dyn Repository>,
	callback: Arc<dyn RepositoryCallback>,
	local_user: String,
	short_interval: Duration,
	long_interval: Duration,
	/// Held for the whole duration of a sync
	gate: tokio::sync::Mutex<()>,
	state: Mutex<DriverState>,
}

impl SyncDriver {
	pub fn new(
		repo: Arc<dyn Repository>,
		config: &Config,
		callback: Arc<dyn RepositoryCallback>,
		paused: bool,
	) -> Self {
		let short_interval = Duration::from_secs(config.poll.short_interval_secs);
		SyncDriver {
			repo,
			callback,
			local_user: config.user.name.clone(),
			short_interval,
			long_interval: Duration::from_secs(config.poll.long_interval_secs),
			gate: tokio::sync::Mutex::new(()),
			state: Mutex::new(DriverState {
				status: if paused { SyncStatus::Paused } else { SyncStatus::Idle },
				poll_interval: short_interval,
				last_poll: Instant::now(),
				change_sets: Vec::new(),
			}),
		}
	}

	pub fn repository(&self) -> &Arc<dyn Repository> {
		&self.repo
	}

	pub fn name(&self) -> &str {
		self.repo.name()
	}

	pub fn status(&self) -> SyncStatus {
		self.state().status
	}

	/// History as of the last sync
	pub fn change_sets(&self) -> Vec<ChangeSet> {
		self.state().change_sets.clone()
	}

	pub fn poll_interval(&self) -> Duration {
		self.state().poll_interval
	}

	fn state(&self) -> std::sync::MutexGuard<'_, DriverState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn set_status(&self, status: SyncStatus) {
		let changed = {
			let mut state = self.state();
			let changed = state.status != status;
			state.status = status;
			changed
		};
		if changed {
			self.callback.on_repository_event(self.name(), RepositoryEvent::SyncStatusChanged(status));
		}
	}

	fn set_poll_interval(&self, interval: Duration) {
		self.state().poll_interval = interval;
	}

	fn emit(&self, event: RepositoryEvent) {
		self.callback.on_repository_event(self.name(), event);
	}

	async fn refresh_change_sets(&self) {
		match self.repo.change_sets(None).await {
			Ok(change_sets) => self.state().change_sets = change_sets,
			Err(e) => warn!("{} | Failed to read history: {}", self.name(), e),
		}
	}

	async fn set_unsynced(&self, value: bool) {
		if let Err(e) = self.repo.set_has_unsynced_changes(value).await {
			warn!("{} | Failed to update unsynced marker: {}", self.name(), e);
		}
	}

	fn failed(&self) -> bool {
		self.status() == SyncStatus::Error || self.repo.error().is_error()
	}

	// ========================================================================
	// TRIGGERS
	// ========================================================================

	/// Catch up with everything that happened while offline
	pub async fn initialize(&self) {
		let _guard = self.gate.lock().await;
		self.refresh_change_sets().await;

		if self.status() == SyncStatus::Paused {
			info!("{} | Paused, skipping initial sync", self.name());
			return;
		}

		if self.repo.has_remote_changes().await {
			self.sync_down_base().await;
		}

		if self.repo.has_unsynced_changes().await || self.repo.has_local_changes().await {
			self.sync_up_until_clean().await;
		}
	}

	/// One tick of the poll timer
	pub async fn poll_tick(&self) {
		self.poll_tick_at(Instant::now()).await
	}

	pub async fn poll_tick_at(&self, now: Instant) {
		let _guard = match self.gate.try_lock() {
			Ok(guard) => guard,
			Err(_) => return,
		};

		match self.status() {
			SyncStatus::Paused | SyncStatus::Error => return,
			_ => {}
		}

		let due = {
			let state = self.state();
			now.saturating_duration_since(state.last_poll) > state.poll_interval
		};

		if due {
			if self.repo.has_unsynced_changes().await {
				self.sync_up_base().await;
			}

			self.state().last_poll = now;

			if !self.failed() && self.repo.has_remote_changes().await {
				self.sync_down_base().await;
			}
		}

		// A push that failed earlier without leaving an error is retried every tick
		if !self.failed() && self.repo.has_unsynced_changes().await {
			self.sync_up_base().await;
		}
	}

	/// Local files changed
	pub async fn on_local_changes(&self) {
		if self.status() == SyncStatus::Paused {
			self.emit(RepositoryEvent::ChangesDetected);
			return;
		}

		let _guard = match self.gate.try_lock() {
			Ok(guard) => guard,
			Err(_) => return,
		};

		if !self.repo.has_local_changes().await {
			return;
		}
		self.emit(RepositoryEvent::ChangesDetected);

		if self.status() == SyncStatus::Idle {
			self.sync_up_until_clean().await;
		}
	}

	/// Retry a folder stuck in the error state
	pub async fn force_retry(&self) {
		let _guard = match self.gate.try_lock() {
			Ok(guard) => guard,
			Err(_) => return,
		};

		if self.failed() {
			info!("{} | Retrying after error", self.name());
			self.sync_up_base().await;
		}
	}

	/// Pause an idle folder; returns whether the status changed
	pub fn pause(&self) -> bool {
		if self.status() != SyncStatus::Idle {
			return false;
		}
		self.set_status(SyncStatus::Paused);
		info!("{} | Paused", self.name());
		true
	}

	/// Resume a paused folder; `message` becomes the next commit message
	pub async fn resume(&self, message: &str) -> bool {
		self.repo.set_status_message(message);

		if self.status() != SyncStatus::Paused {
			return false;
		}
		let _guard = self.gate.lock().await;
		self.set_status(SyncStatus::Idle);
		info!("{} | Resumed", self.name());

		if self.repo.has_unsynced_changes().await || self.repo.has_local_changes().await {
			self.sync_up_until_clean().await;
		}
		true
	}

	// ========================================================================
	// SYNC STEPS
	// ========================================================================

	async fn sync_up_until_clean(&self) {
		let mut first = true;
		loop {
			if !first {
				info!("{} | More changes found", self.name());
			}
			first = false;

			self.sync_up_base().await;

			if self.failed() || !self.repo.has_local_changes().await {
				break;
			}
		}
	}

	/// Push; on failure pull, then push once more
	async fn sync_up_base(&self) {
		info!("{} | SyncUp initiated", self.name());
		self.set_unsynced(true).await;
		self.set_status(SyncStatus::SyncUp);

		match self.repo.sync_up().await {
			Ok(()) => {
				info!("{} | SyncUp done", self.name());
				self.refresh_change_sets().await;
				self.set_unsynced(false).await;
				self.set_poll_interval(self.long_interval);
				self.set_status(SyncStatus::Idle);
			}
			Err(e) => {
				info!("{} | SyncUp error: {}", self.name(), e);
				self.sync_down_base().await;

				// The pull may already have pushed the pending commit
				let retried = !self.failed()
					&& (!self.repo.has_unsynced_changes().await || self.repo.sync_up().await.is_ok());
				if retried {
					self.set_unsynced(false).await;
					self.set_status(SyncStatus::Idle);
				} else {
					self.set_poll_interval(self.short_interval);
					self.set_status(SyncStatus::Error);
				}
			}
		}

		self.repo.set_status_message("");
	}

	async fn sync_down_base(&self) {
		info!("{} | SyncDown initiated", self.name());
		self.set_status(SyncStatus::SyncDown);

		let pre_sync_revision = self.repo.current_revision().await;

		if let Err(e) = self.repo.sync_down().await {
			info!("{} | SyncDown error: {}", self.name(), e);
			self.refresh_change_sets().await;
			self.set_status(SyncStatus::Error);
			return;
		}

		self.repo.clear_error();
		self.refresh_change_sets().await;

		if pre_sync_revision != self.repo.current_revision().await {
			let newest = self.state().change_sets.first().cloned();
			if let Some(change_set) = newest {
				if change_set.user.name != self.local_user && !change_set.touches_suffix(IDENTIFIER_FILE) {
					self.emit(RepositoryEvent::NewChangeSet(change_set));
				}
			}
		}
		info!("{} | SyncDown done", self.name());

		// A resolved conflict leaves a local commit; push it once
		if self.repo.has_unsynced_changes().await {
			self.set_status(SyncStatus::SyncUp);
			match self.repo.sync_up().await {
				Ok(()) => self.set_unsynced(false).await,
				Err(e) => info!("{} | Pushing the merge failed: {}", self.name(), e),
			}
		}

		if self.repo.error().is_error() {
			self.set_poll_interval(self.short_interval);
			self.set_status(SyncStatus::Error);
		} else {
			self.set_status(SyncStatus::Idle);
		}
	}
}

impl std::fmt::Debug for SyncDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncDriver").field("name", &self.name()).field("status", &self.status()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SyncError;
	use crate::storage::StorageType;
	use crate::types::ErrorKind;
	use crate::types::{Change, ChangeType, User};
	use async_trait::async_trait;
	use chrono::Local;
	use std::path::Path;
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

	#[derive(Default)]
	struct FakeRepository {
		local_changes: AtomicBool,
		remote_changes: AtomicBool,
		unsynced: AtomicBool,
		up_failures: AtomicUsize,
		down_fails: AtomicBool,
		/// sync_down leaves a merge commit to push, as after a resolved conflict
		down_leaves_unsynced: AtomicBool,
		revision: Mutex<String>,
		next_revision: Mutex<Option<String>>,
		history: Mutex<Vec<ChangeSet>>,
		error: Mutex<ErrorKind>,
		message: Mutex<String>,
		commit_messages: Mutex<Vec<String>>,
		calls: Mutex<Vec<&'static str>>,
	}

	impl FakeRepository {
		fn calls(&self) -> Vec<&'static str> {
			self.calls.lock().unwrap().clone()
		}

		fn record(&self, call: &'static str) {
			self.calls.lock().unwrap().push(call);
		}
	}

	#[async_trait]
	impl Repository for FakeRepository {
		fn name(&self) -> &str {
			"Docs"
		}
		fn local_path(&self) -> &Path {
			Path::new("/tmp/Docs")
		}
		fn remote_url(&self) -> &str {
			"ssh://storage@example.org/docs"
		}
		fn identifier(&self) -> &str {
			"abc"
		}
		fn storage_type(&self) -> StorageType {
			StorageType::Plain
		}
		fn error(&self) -> ErrorKind {
			*self.error.lock().unwrap()
		}
		fn clear_error(&self) {
			*self.error.lock().unwrap() = ErrorKind::None;
		}
		fn set_status_message(&self, message: &str) {
			*self.message.lock().unwrap() = message.to_string();
		}

		async fn sync_up(&self) -> Result<(), SyncError> {
			self.record("up");
			if self.up_failures.load(Ordering::SeqCst) > 0 {
				self.up_failures.fetch_sub(1, Ordering::SeqCst);
				*self.error.lock().unwrap() = ErrorKind::HostUnreachable;
				return Err(SyncError::Unrecoverable(ErrorKind::HostUnreachable));
			}
			let message = self.message.lock().unwrap().clone();
			self.commit_messages.lock().unwrap().push(message);
			self.local_changes.store(false, Ordering::SeqCst);
			Ok(())
		}

		async fn sync_down(&self) -> Result<(), SyncError> {
			self.record("down");
			if self.down_fails.load(Ordering::SeqCst) {
				*self.error.lock().unwrap() = ErrorKind::HostUnreachable;
				return Err(SyncError::Unrecoverable(ErrorKind::HostUnreachable));
			}
			if let Some(revision) = self.next_revision.lock().unwrap().take() {
				*self.revision.lock().unwrap() = revision;
			}
			self.remote_changes.store(false, Ordering::SeqCst);
			if self.down_leaves_unsynced.load(Ordering::SeqCst) {
				self.unsynced.store(true, Ordering::SeqCst);
			}
			Ok(())
		}

		async fn has_local_changes(&self) -> bool {
			self.local_changes.load(Ordering::SeqCst)
		}
		async fn has_remote_changes(&self) -> bool {
			self.record("remote_check");
			self.remote_changes.load(Ordering::SeqCst)
		}
		async fn has_unsynced_changes(&self) -> bool {
			self.unsynced.load(Ordering::SeqCst)
		}
		async fn set_has_unsynced_changes(&self, value: bool) -> Result<(), SyncError> {
			self.unsynced.store(value, Ordering::SeqCst);
			Ok(())
		}
		async fn current_revision(&self) -> Option<String> {
			Some(self.revision.lock().unwrap().clone())
		}
		async fn size(&self) -> u64 {
			0
		}
		async fn history_size(&self) -> u64 {
			0
		}
		async fn unsynced_changes(&self) -> Result<Vec<Change>, SyncError> {
			Ok(Vec::new())
		}
		async fn change_sets(&self, _path: Option<&str>) -> Result<Vec<ChangeSet>, SyncError> {
			Ok(self.history.lock().unwrap().clone())
		}
		async fn restore_file(&self, _path: &str, _revision: &str, _target: &Path) -> Result<(), SyncError> {
			Ok(())
		}
	}

	fn change_set(author: &str, path: &str) -> ChangeSet {
		ChangeSet {
			revision: "r2".to_string(),
			user: User::new(author, &format!("{}@example.org", author.to_lowercase())),
			timestamp: Local::now(),
			first_timestamp: None,
			folder: "Docs".to_string(),
			remote_url: String::new(),
			changes: vec![Change::new(ChangeType::Added, path)],
		}
	}

	type Events = Arc<Mutex<Vec<RepositoryEvent>>>;

	fn make_driver(repo: Arc<FakeRepository>, paused: bool) -> (SyncDriver, Events) {
		let mut config = Config::default();
		config.user = User::new("Alice", "alice@example.org");
		let events: Events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();
		let callback = move |_folder: &str, event: RepositoryEvent| sink.lock().unwrap().push(event);
		(SyncDriver::new(repo, &config, Arc::new(callback), paused), events)
	}

	fn statuses(events: &Events) -> Vec<SyncStatus> {
		events
			.lock()
			.unwrap()
			.iter()
			.filter_map(|event| match event {
				RepositoryEvent::SyncStatusChanged(status) => Some(*status),
				_ => None,
			})
			.collect()
	}

	fn new_change_sets(events: &Events) -> usize {
		events.lock().unwrap().iter().filter(|e| matches!(e, RepositoryEvent::NewChangeSet(_))).count()
	}

	#[tokio::test]
	async fn test_initialize_pulls_then_pushes() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		repo.local_changes.store(true, Ordering::SeqCst);
		let (driver, events) = make_driver(repo.clone(), false);

		driver.initialize().await;

		assert_eq!(repo.calls(), vec!["remote_check", "down", "up"]);
		assert_eq!(
			statuses(&events),
			vec![SyncStatus::SyncDown, SyncStatus::Idle, SyncStatus::SyncUp, SyncStatus::Idle]
		);
		assert!(!repo.unsynced.load(Ordering::SeqCst));
		assert_eq!(driver.poll_interval(), Duration::from_secs(15 * 60));
	}

	#[tokio::test]
	async fn test_initialize_skipped_while_paused() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), true);

		driver.initialize().await;
		assert!(repo.calls().is_empty());
		assert_eq!(driver.status(), SyncStatus::Paused);
	}

	#[tokio::test]
	async fn test_failed_push_pulls_and_retries_once() {
		let repo = Arc::new(FakeRepository::default());
		repo.local_changes.store(true, Ordering::SeqCst);
		repo.up_failures.store(1, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), false);

		driver.on_local_changes().await;

		assert_eq!(repo.calls(), vec!["up", "down", "up"]);
		assert_eq!(driver.status(), SyncStatus::Idle);
		assert!(!repo.unsynced.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn test_error_sticks_until_retry() {
		let repo = Arc::new(FakeRepository::default());
		repo.local_changes.store(true, Ordering::SeqCst);
		repo.up_failures.store(2, Ordering::SeqCst);
		repo.down_fails.store(true, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), false);

		driver.on_local_changes().await;
		assert_eq!(repo.calls(), vec!["up", "down"]);
		assert_eq!(driver.status(), SyncStatus::Error);
		assert_eq!(driver.poll_interval(), Duration::from_secs(5 * 60));

		driver.poll_tick_at(Instant::now() + Duration::from_secs(3600)).await;
		assert_eq!(repo.calls().len(), 2);

		repo.down_fails.store(false, Ordering::SeqCst);
		driver.force_retry().await;
		assert_eq!(repo.calls(), vec!["up", "down", "up", "down", "up"]);
		assert_eq!(driver.status(), SyncStatus::Idle);
	}

	#[tokio::test]
	async fn test_failed_merge_push_is_an_error() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		repo.down_leaves_unsynced.store(true, Ordering::SeqCst);
		repo.up_failures.store(1, Ordering::SeqCst);
		let (driver, events) = make_driver(repo.clone(), false);

		driver.poll_tick_at(Instant::now() + Duration::from_secs(3600)).await;
		assert_eq!(repo.calls(), vec!["remote_check", "down", "up"]);
		assert_eq!(driver.status(), SyncStatus::Error);
		assert_eq!(statuses(&events).last(), Some(&SyncStatus::Error));
		assert!(repo.unsynced.load(Ordering::SeqCst));

		driver.poll_tick_at(Instant::now() + Duration::from_secs(7200)).await;
		assert_eq!(repo.calls().len(), 3);

		driver.force_retry().await;
		assert_eq!(driver.status(), SyncStatus::Idle);
		assert!(!repo.unsynced.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn test_new_change_set_only_for_other_authors() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		*repo.next_revision.lock().unwrap() = Some("r2".to_string());
		repo.history.lock().unwrap().push(change_set("Bob", "report.txt"));
		let (driver, events) = make_driver(repo.clone(), false);

		driver.initialize().await;
		assert_eq!(new_change_sets(&events), 1);
		assert_eq!(driver.change_sets().len(), 1);

		// Own commit
		repo.remote_changes.store(true, Ordering::SeqCst);
		*repo.next_revision.lock().unwrap() = Some("r3".to_string());
		*repo.history.lock().unwrap() = vec![change_set("Alice", "notes.txt")];
		driver.poll_tick_at(Instant::now() + Duration::from_secs(3600)).await;
		assert_eq!(new_change_sets(&events), 1);

		// Identifier bookkeeping
		repo.remote_changes.store(true, Ordering::SeqCst);
		*repo.next_revision.lock().unwrap() = Some("r4".to_string());
		*repo.history.lock().unwrap() = vec![change_set("Bob", ".sparkleshare")];
		driver.poll_tick_at(Instant::now() + Duration::from_secs(7200)).await;
		assert_eq!(new_change_sets(&events), 1);
	}

	#[tokio::test]
	async fn test_no_new_change_set_without_new_revision() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		repo.history.lock().unwrap().push(change_set("Bob", "report.txt"));
		let (driver, events) = make_driver(repo.clone(), false);

		driver.initialize().await;
		assert_eq!(repo.calls(), vec!["remote_check", "down"]);
		assert_eq!(new_change_sets(&events), 0);
	}

	#[tokio::test]
	async fn test_poll_waits_for_interval() {
		let repo = Arc::new(FakeRepository::default());
		repo.remote_changes.store(true, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), false);

		driver.poll_tick().await;
		assert!(repo.calls().is_empty());

		driver.poll_tick_at(Instant::now() + Duration::from_secs(5 * 60 + 1)).await;
		assert_eq!(repo.calls(), vec!["remote_check", "down"]);
	}

	#[tokio::test]
	async fn test_pushes_left_over_unsynced_commits_every_tick() {
		let repo = Arc::new(FakeRepository::default());
		repo.unsynced.store(true, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), false);

		driver.poll_tick().await;
		assert_eq!(repo.calls(), vec!["up"]);
		assert!(!repo.unsynced.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn test_pause_and_resume_with_note() {
		let repo = Arc::new(FakeRepository::default());
		let (driver, events) = make_driver(repo.clone(), false);

		assert!(driver.pause());
		assert!(!driver.pause());

		repo.local_changes.store(true, Ordering::SeqCst);
		driver.on_local_changes().await;
		assert!(repo.calls().is_empty());
		assert!(events.lock().unwrap().iter().any(|e| matches!(e, RepositoryEvent::ChangesDetected)));

		assert!(driver.resume("Quarterly numbers").await);
		assert_eq!(repo.calls(), vec!["up"]);
		assert_eq!(repo.commit_messages.lock().unwrap().as_slice(), &["Quarterly numbers".to_string()]);
		assert!(repo.message.lock().unwrap().is_empty());
		assert_eq!(driver.status(), SyncStatus::Idle);
	}

	#[tokio::test]
	async fn test_trigger_dropped_while_syncing() {
		let repo = Arc::new(FakeRepository::default());
		repo.local_changes.store(true, Ordering::SeqCst);
		repo.unsynced.store(true, Ordering::SeqCst);
		let (driver, _events) = make_driver(repo.clone(), false);

		let guard = driver.gate.lock().await;
		driver.on_local_changes().await;
		driver.poll_tick().await;
		driver.force_retry().await;
		drop(guard);

		assert!(repo.calls().is_empty());
	}
}

// vim: ts=4
