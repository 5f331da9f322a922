//! Conflict resolution policy for unmerged paths
//!
//! Merges run as `git merge FETCH_HEAD`, so "ours" is the local history and
//! "theirs" is the fetched remote. Every policy keeps data: when both sides
//! changed a file the local version survives under a timestamped copy name,
//! and when one side deleted a file the modified side wins.

use super::status::StatusEntry;
use crate::fetcher::rules::{EMPTY_DIR_MARKER, IDENTIFIER_FILE};
use chrono::{DateTime, Local};
use std::path::Path;

/// What to do with one entry of `git status --porcelain` during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
	/// Both sides deleted the path (`DD`)
	Nothing,
	/// Both sides changed the path (`AU`, `UA`, `AA`, `UU`): keep the local
	/// version under a timestamped copy name and the remote one in place
	KeepBoth,
	/// Local side deleted, remote modified (`DU`): the remote version is
	/// already in the working tree and only needs staging
	StageWorkingCopy,
	/// Remote side deleted, local modified (`UD`): restore the local version
	RestoreLocal,
	/// Untracked local file (`??`), staged with everything else
	StageNew,
	/// Identifier file or folder placeholder: the local version always wins
	KeepLocalMarker,
	/// Status code with no policy; logged and left to the final staging
	Unrecognized,
}

impl ConflictAction {
	/// Whether this resolution is a conflict the user should hear about
	pub fn is_user_visible(self) -> bool {
		self == ConflictAction::KeepBoth
	}
}

/// True for the hidden files whose local copy is authoritative
pub fn is_marker_path(path: &str) -> bool {
	path.ends_with(IDENTIFIER_FILE) || path.ends_with(EMPTY_DIR_MARKER)
}

/// Policy for a status code and path
pub fn conflict_action(code: &str, path: &str) -> ConflictAction {
	if is_marker_path(path) {
		return ConflictAction::KeepLocalMarker;
	}

	match code {
		"DD" => ConflictAction::Nothing,
		"AU" | "UA" | "AA" | "UU" => ConflictAction::KeepBoth,
		"DU" => ConflictAction::StageWorkingCopy,
		"UD" => ConflictAction::RestoreLocal,
		"??" => ConflictAction::StageNew,
		_ => ConflictAction::Unrecognized,
	}
}

/// Policy for a parsed status entry
pub fn entry_action(entry: &StatusEntry) -> ConflictAction {
	conflict_action(&entry.code, &entry.path)
}

/// Name for the local copy of a conflicting file: `name (User, Mar 7 9h05).ext`
pub fn conflict_copy_name(path: &str, user_name: &str, when: &DateTime<Local>) -> String {
	let (dir, file_name) = match path.rfind('/') {
		Some(index) => (&path[..=index], &path[index + 1..]),
		None => ("", path),
	};

	let file = Path::new(file_name);
	let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
	let extension = file.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();

	format!("{}{} ({}, {}){}", dir, stem, user_name, when.format("%b %-d %-Hh%M"), extension)
}

/// Variant of a copy name for when that name is already taken
pub fn numbered_copy_name(copy_name: &str, number: usize) -> String {
	let (dir, file_name) = match copy_name.rfind('/') {
		Some(index) => (&copy_name[..=index], &copy_name[index + 1..]),
		None => ("", copy_name),
	};
	match file_name.rfind(')') {
		Some(index) => format!("{}{} {}{}", dir, &file_name[..=index], number, &file_name[index + 1..]),
		None => format!("{}{} {}", dir, file_name, number),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_policy_table() {
		let cases = [
			("DD", ConflictAction::Nothing),
			("AU", ConflictAction::KeepBoth),
			("UA", ConflictAction::KeepBoth),
			("AA", ConflictAction::KeepBoth),
			("UU", ConflictAction::KeepBoth),
			("DU", ConflictAction::StageWorkingCopy),
			("UD", ConflictAction::RestoreLocal),
			("??", ConflictAction::StageNew),
			("T ", ConflictAction::Unrecognized),
		];
		for (code, expected) in cases.iter() {
			assert_eq!(conflict_action(code, "docs/report.txt"), *expected, "code {}", code);
		}
	}

	#[test]
	fn test_markers_keep_local() {
		assert_eq!(conflict_action("UU", ".sparkleshare"), ConflictAction::KeepLocalMarker);
		assert_eq!(conflict_action("AA", "photos/.empty"), ConflictAction::KeepLocalMarker);
	}

	#[test]
	fn test_only_keep_both_is_visible() {
		assert!(ConflictAction::KeepBoth.is_user_visible());
		assert!(!ConflictAction::StageWorkingCopy.is_user_visible());
		assert!(!ConflictAction::KeepLocalMarker.is_user_visible());
	}

	#[test]
	fn test_copy_name() {
		let when = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
		assert_eq!(conflict_copy_name("report.txt", "Alice", &when), "report (Alice, Mar 7 9h05).txt");
		assert_eq!(
			conflict_copy_name("docs/archive.tar.gz", "Bob", &when),
			"docs/archive.tar (Bob, Mar 7 9h05).gz"
		);
		assert_eq!(conflict_copy_name("Makefile", "Alice", &when), "Makefile (Alice, Mar 7 9h05)");
	}

	#[test]
	fn test_numbered_copy_name() {
		assert_eq!(
			numbered_copy_name("docs/report (Alice, Mar 7 9h05).txt", 2),
			"docs/report (Alice, Mar 7 9h05) 2.txt"
		);
	}
}

// vim: ts=4
