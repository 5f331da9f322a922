//! Sentinel and cache files kept inside a checkout's `.git` directory
//!
//! | File | Meaning |
//! |---|---|
//! | `has_unsynced_changes` | local commits not yet pushed (presence) |
//! | `lfs/is_behind` | large objects not yet pulled (presence) |
//! | `info/size` | cached working-tree size in bytes |
//! | `info/history_size` | cached `.git` size in bytes |

use crate::logging::*;
use std::io;
use std::path::{Path, PathBuf};

pub struct MarkerFiles {
	git_dir: PathBuf,
}

impl MarkerFiles {
	pub fn new(local_path: &Path) -> Self {
		MarkerFiles { git_dir: local_path.join(".git") }
	}

	fn unsynced_path(&self) -> PathBuf {
		self.git_dir.join("has_unsynced_changes")
	}

	fn lfs_behind_path(&self) -> PathBuf {
		self.git_dir.join("lfs").join("is_behind")
	}

	fn size_path(&self) -> PathBuf {
		self.git_dir.join("info").join("size")
	}

	fn history_size_path(&self) -> PathBuf {
		self.git_dir.join("info").join("history_size")
	}

	pub fn merge_head_path(&self) -> PathBuf {
		self.git_dir.join("MERGE_HEAD")
	}

	pub fn pre_push_hook_path(&self) -> PathBuf {
		self.git_dir.join("hooks").join("pre-push")
	}

	async fn set_flag(path: &Path, value: bool) -> io::Result<()> {
		if value {
			if let Some(parent) = path.parent() {
				tokio::fs::create_dir_all(parent).await?;
			}
			tokio::fs::write(path, "").await
		} else {
			match tokio::fs::remove_file(path).await {
				Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
				_ => Ok(()),
			}
		}
	}

	pub fn has_unsynced_changes(&self) -> bool {
		self.unsynced_path().exists()
	}

	pub async fn set_unsynced_changes(&self, value: bool) -> io::Result<()> {
		Self::set_flag(&self.unsynced_path(), value).await
	}

	pub fn lfs_is_behind(&self) -> bool {
		self.lfs_behind_path().exists()
	}

	pub async fn set_lfs_behind(&self, value: bool) -> io::Result<()> {
		Self::set_flag(&self.lfs_behind_path(), value).await
	}

	pub fn in_merge(&self) -> bool {
		self.merge_head_path().exists()
	}

	async fn read_number(path: &Path) -> u64 {
		match tokio::fs::read_to_string(path).await {
			Ok(text) => text.trim().parse().unwrap_or_else(|e| {
				debug!("Failed to parse {}: {}", path.display(), e);
				0
			}),
			Err(_) => 0,
		}
	}

	/// Cached working-tree size; 0 before the first sync
	pub async fn size(&self) -> u64 {
		Self::read_number(&self.size_path()).await
	}

	pub async fn history_size(&self) -> u64 {
		Self::read_number(&self.history_size_path()).await
	}

	pub async fn write_sizes(&self, size: u64, history_size: u64) -> io::Result<()> {
		tokio::fs::create_dir_all(self.git_dir.join("info")).await?;
		tokio::fs::write(self.size_path(), size.to_string()).await?;
		tokio::fs::write(self.history_size_path(), history_size.to_string()).await
	}
}


// vim: ts=4
