//! Transfer progress: parsing, throttling and CLI display
//!
//! Transport output is classified line by line by [`parse_progress`];
//! [`ProgressThrottle`] decides which updates reach the callbacks, and
//! [`CliProgress`] renders them for the command-line front-end.

pub mod constants;
pub mod parser;
pub mod throttle;

use crate::callbacks::{FetchCallback, FetchEvent, RepositoryCallback, RepositoryEvent};
use crate::logging::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

pub use constants::*;
pub use parser::{find_error, parse_progress, ProgressLine};
pub use throttle::{clamp_repository_progress, ProgressThrottle};

/// One published progress sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressUpdate {
	/// 0..=100
	pub percentage: f64,
	/// Bytes per second, 0 when unknown
	pub speed: f64,
	pub information: String,
}

/// Renders fetch and repository events on stderr
pub struct CliProgress {
	/// Whether a bar is currently drawn on the last line
	bar_active: Mutex<bool>,
}

impl CliProgress {
	pub fn new() -> Self {
		CliProgress { bar_active: Mutex::new(false) }
	}

	fn draw(&self, label: &str, update: &ProgressUpdate) {
		let filled = ((update.percentage / 100.0) * PROGRESS_BAR_WIDTH as f64) as usize;
		let filled = filled.min(PROGRESS_BAR_WIDTH);
		let bar = format!("{}{}", "=".repeat(filled), " ".repeat(PROGRESS_BAR_WIDTH - filled));
		let speed = if update.speed > 0.0 {
			format!(" {:.1} MB/s", update.speed / BYTES_PER_MB)
		} else {
			String::new()
		};

		let mut stderr = std::io::stderr();
		let _ = write!(
			stderr,
			"\r{} [{}] {:3.0}%{} {}\x1b[K",
			label, bar, update.percentage, speed, update.information
		);
		let _ = stderr.flush();
		*self.bar_active.lock().unwrap_or_else(|e| e.into_inner()) = true;
	}

	fn finish_bar(&self) {
		let mut active = self.bar_active.lock().unwrap_or_else(|e| e.into_inner());
		if *active {
			eprintln!();
			*active = false;
		}
	}
}

impl Default for CliProgress {
	fn default() -> Self {
		Self::new()
	}
}

impl FetchCallback for CliProgress {
	fn on_fetch_event(&self, event: FetchEvent) {
		match event {
			FetchEvent::Started => info!("→ Fetching..."),
			FetchEvent::ProgressChanged(update) => self.draw("fetch", &update),
			FetchEvent::Finished { storage_type, warnings } => {
				self.finish_bar();
				info!("✓ Fetched ({} storage)", storage_type);
				for warning in warnings {
					warn!("{}", warning);
				}
			}
			FetchEvent::Failed { errors } => {
				self.finish_bar();
				for err in errors {
					error!("{}", err);
				}
			}
		}
	}
}

impl RepositoryCallback for CliProgress {
	fn on_repository_event(&self, folder: &str, event: RepositoryEvent) {
		match event {
			RepositoryEvent::ProgressChanged(update) => self.draw(folder, &update),
			RepositoryEvent::SyncStatusChanged(status) => {
				self.finish_bar();
				info!("{} | {}", folder, status);
			}
			RepositoryEvent::ChangesDetected => info!("{} | Local changes detected", folder),
			RepositoryEvent::NewChangeSet(change_set) => {
				self.finish_bar();
				info!(
					"{} | {} made {} change(s)",
					folder,
					change_set.user.name,
					change_set.changes.len()
				);
			}
			RepositoryEvent::ConflictResolved => {
				self.finish_bar();
				warn!("{} | Conflicting edits were saved as separate copies", folder);
			}
		}
	}
}

// vim: ts=4
