//! Storage types and their detection from a remote branch listing
//!
//! The storage type of a shared folder is advertised through marker branches:
//! `x-sparkleshare-lfs` for large-file storage and
//! `x-sparkleshare-encrypted-<salt>` for encrypted storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker branch for large-file storage
pub const LFS_BRANCH: &str = "x-sparkleshare-lfs";

/// Marker branch prefix for encrypted storage; the salt follows it
pub const ENCRYPTED_BRANCH_PREFIX: &str = "x-sparkleshare-encrypted-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageType {
	/// Remote empty or not yet probed
	#[default]
	Unknown,
	Plain,
	Encrypted,
	LargeFiles,
}

impl FromStr for StorageType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"unknown" => Ok(Self::Unknown),
			"plain" => Ok(Self::Plain),
			"encrypted" => Ok(Self::Encrypted),
			"large-files" | "lfs" => Ok(Self::LargeFiles),
			_ => Err(format!(
				"Unknown storage type: {}. Valid options: plain, encrypted, large-files",
				s
			)),
		}
	}
}

impl fmt::Display for StorageType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unknown => write!(f, "unknown"),
			Self::Plain => write!(f, "plain"),
			Self::Encrypted => write!(f, "encrypted"),
			Self::LargeFiles => write!(f, "large-files"),
		}
	}
}

/// A storage type offered to the user when setting up a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTypeInfo {
	pub storage_type: StorageType,
	pub name: &'static str,
	pub description: &'static str,
}

impl StorageTypeInfo {
	pub fn new(storage_type: StorageType) -> Self {
		let (name, description) = match storage_type {
			StorageType::Plain => ("Plain Storage", "Nothing fancy;\nmaximum compatibility"),
			StorageType::Encrypted => {
				("Encrypted Storage", "Trade-off: not possible to see\nor restore old revisions")
			}
			StorageType::LargeFiles => {
				("Large File Storage", "Trade-off: only the newest\nrevision is stored")
			}
			StorageType::Unknown => ("Unknown", ""),
		};
		StorageTypeInfo { storage_type, name, description }
	}
}

/// Storage types a new folder on this host may use
pub fn available_storage_types(large_files_available: bool) -> Vec<StorageTypeInfo> {
	let mut types = vec![StorageTypeInfo::new(StorageType::Plain)];
	if large_files_available {
		types.push(StorageTypeInfo::new(StorageType::LargeFiles));
	}
	types.push(StorageTypeInfo::new(StorageType::Encrypted));
	types
}

/// Result of inspecting a remote branch listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDetection {
	pub storage_type: StorageType,
	/// Salt carried by an encrypted marker branch
	pub salt: Option<String>,
}

/// Classify a `git ls-remote --heads` listing.
///
/// Blank output means an empty remote (`Unknown`); otherwise the first marker
/// branch decides, and a listing without markers is `Plain`.
pub fn detect_storage_type(listing: &str) -> StorageDetection {
	if listing.trim().is_empty() {
		return StorageDetection { storage_type: StorageType::Unknown, salt: None };
	}

	for line in listing.lines() {
		let branch = match line.trim().rsplit('/').next() {
			Some(branch) => branch,
			None => continue,
		};

		if branch == LFS_BRANCH {
			return StorageDetection { storage_type: StorageType::LargeFiles, salt: None };
		}
		if let Some(salt) = branch.strip_prefix(ENCRYPTED_BRANCH_PREFIX) {
			return StorageDetection {
				storage_type: StorageType::Encrypted,
				salt: Some(salt.to_string()),
			};
		}
	}

	StorageDetection { storage_type: StorageType::Plain, salt: None }
}

/// Marker branch name for a storage type, if it has one
pub fn marker_branch(storage_type: StorageType, salt: &str) -> Option<String> {
	match storage_type {
		StorageType::LargeFiles => Some(LFS_BRANCH.to_string()),
		StorageType::Encrypted => Some(format!("{}{}", ENCRYPTED_BRANCH_PREFIX, salt)),
		_ => None,
	}
}


// vim: ts=4
