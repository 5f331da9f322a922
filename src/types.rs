//! Shared data model: error taxonomy, sync status, users and change-sets

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Classification of the last failure seen on a transport or repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
	#[default]
	None,
	Unknown,
	HostUnreachable,
	HostIdentityChanged,
	AuthenticationFailed,
	DiskSpaceExceeded,
	UnreadableFiles,
	NotFound,
	IncompatibleClientServer,
}

impl ErrorKind {
	/// True for every kind except `None`
	pub fn is_error(self) -> bool {
		self != ErrorKind::None
	}
}

impl FromStr for ErrorKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"none" => Ok(Self::None),
			"unknown" => Ok(Self::Unknown),
			"host-unreachable" => Ok(Self::HostUnreachable),
			"host-identity-changed" => Ok(Self::HostIdentityChanged),
			"authentication-failed" => Ok(Self::AuthenticationFailed),
			"disk-space-exceeded" => Ok(Self::DiskSpaceExceeded),
			"unreadable-files" => Ok(Self::UnreadableFiles),
			"not-found" => Ok(Self::NotFound),
			"incompatible-client-server" => Ok(Self::IncompatibleClientServer),
			_ => Err(format!("Unknown error kind: {}", s)),
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::None => "none",
			Self::Unknown => "unknown",
			Self::HostUnreachable => "host-unreachable",
			Self::HostIdentityChanged => "host-identity-changed",
			Self::AuthenticationFailed => "authentication-failed",
			Self::DiskSpaceExceeded => "disk-space-exceeded",
			Self::UnreadableFiles => "unreadable-files",
			Self::NotFound => "not-found",
			Self::IncompatibleClientServer => "incompatible-client-server",
		};
		f.write_str(text)
	}
}

// ============================================================================
// SYNC STATUS
// ============================================================================

/// Lifecycle status of a synchronized folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
	#[default]
	Idle,
	Paused,
	SyncUp,
	SyncDown,
	Error,
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::Idle => "idle",
			Self::Paused => "paused",
			Self::SyncUp => "sync-up",
			Self::SyncDown => "sync-down",
			Self::Error => "error",
		};
		f.write_str(text)
	}
}

// ============================================================================
// CHANGE-SETS
// ============================================================================

/// Commit author or committer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct User {
	pub name: String,
	pub email: String,
}

impl User {
	pub fn new(name: &str, email: &str) -> Self {
		User { name: name.to_string(), email: email.to_string() }
	}
}

impl fmt::Display for User {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} <{}>", self.name, self.email)
	}
}

/// Kind of change recorded for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
	Added,
	Edited,
	Deleted,
	Moved,
}

impl fmt::Display for ChangeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::Added => "added",
			Self::Edited => "edited",
			Self::Deleted => "deleted",
			Self::Moved => "moved",
		};
		f.write_str(text)
	}
}

/// A single path change inside a change-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
	pub change_type: ChangeType,
	pub path: String,
	/// Destination of a move
	pub moved_to_path: Option<String>,
	pub is_folder: bool,
	pub timestamp: Option<DateTime<Local>>,
}

impl Change {
	pub fn new(change_type: ChangeType, path: &str) -> Self {
		Change {
			change_type,
			path: path.to_string(),
			moved_to_path: None,
			is_folder: false,
			timestamp: None,
		}
	}
}

/// One commit (or a same-author same-day group of commits) as shown in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
	pub revision: String,
	pub user: User,
	pub timestamp: DateTime<Local>,
	/// Oldest commit folded into this set, when several were grouped
	pub first_timestamp: Option<DateTime<Local>>,
	pub folder: String,
	pub remote_url: String,
	pub changes: Vec<Change>,
}

impl ChangeSet {
	/// True when any change touches a path ending with `suffix`
	pub fn touches_suffix(&self, suffix: &str) -> bool {
		self.changes.iter().any(|change| {
			change.path.ends_with(suffix)
				|| change.moved_to_path.as_deref().map_or(false, |p| p.ends_with(suffix))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_kind_roundtrip_through_display() {
		for kind in &[
			ErrorKind::None,
			ErrorKind::HostIdentityChanged,
			ErrorKind::DiskSpaceExceeded,
			ErrorKind::IncompatibleClientServer,
		] {
			assert_eq!(ErrorKind::from_str(&kind.to_string()).ok(), Some(*kind));
		}
		assert!(ErrorKind::from_str("bogus").is_err());
	}

	#[test]
	fn test_error_kind_is_error() {
		assert!(!ErrorKind::None.is_error());
		assert!(ErrorKind::Unknown.is_error());
	}

	#[test]
	fn test_touches_suffix_checks_move_target() {
		let mut change = Change::new(ChangeType::Moved, "a.txt");
		change.moved_to_path = Some("dir/.sparkleshare".to_string());
		let set = ChangeSet {
			revision: "abc".to_string(),
			user: User::new("A", "a@example.com"),
			timestamp: Local::now(),
			first_timestamp: None,
			folder: "f".to_string(),
			remote_url: String::new(),
			changes: vec![change],
		};
		assert!(set.touches_suffix(".sparkleshare"));
		assert!(!set.touches_suffix(".empty"));
	}
}

// vim: ts=4
