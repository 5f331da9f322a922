//! `git status --porcelain` parsing and generated commit messages

use crate::changeset::change::strip_dir_marker;
use crate::changeset::unquote_path;
use crate::types::{Change, ChangeType};

/// Entries listed before the message is cut short
const MAX_MESSAGE_ENTRIES: usize = 10;

/// One porcelain line: two-letter status code and the path it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
	pub code: String,
	pub path: String,
	/// Source of a rename; `path` is the destination
	pub original_path: Option<String>,
}

impl StatusEntry {
	/// Parse `XY path` or `XY from -> to`
	pub fn parse(line: &str) -> Option<StatusEntry> {
		if line.len() < 4 || !line.is_char_boundary(2) || !line.is_char_boundary(3) {
			return None;
		}
		let code = line[..2].to_string();
		let rest = &line[3..];

		let (original_path, path) = match rest.find(" -> ") {
			Some(index) => (Some(unquote_path(&rest[..index])), unquote_path(&rest[index + 4..])),
			None => (None, unquote_path(rest)),
		};

		Some(StatusEntry { code, path, original_path })
	}

	pub fn is_rename(&self) -> bool {
		self.code.contains('R')
	}
}

/// Parse complete porcelain output
pub fn parse_status_entries(output: &str) -> Vec<StatusEntry> {
	output.lines().filter_map(StatusEntry::parse).collect()
}

/// Uncommitted changes as shown to the user
pub fn parse_status(output: &str) -> Vec<Change> {
	parse_status_entries(output).into_iter().map(change_from_entry).collect()
}

fn change_from_entry(entry: StatusEntry) -> Change {
	let (path, is_folder) = strip_dir_marker(&entry.path);

	let mut change = if entry.is_rename() {
		let from = entry.original_path.as_deref().unwrap_or_default();
		let (from, _) = strip_dir_marker(from);
		let mut change = Change::new(ChangeType::Moved, &from);
		change.moved_to_path = Some(path);
		change
	} else if entry.code.contains('A') || entry.code == "??" {
		Change::new(ChangeType::Added, &path)
	} else if entry.code.contains('D') {
		Change::new(ChangeType::Deleted, &path)
	} else if entry.code.contains('M') {
		Change::new(ChangeType::Edited, &path)
	} else {
		Change::new(ChangeType::Added, &path)
	};

	change.is_folder = is_folder;
	change
}

/// Summarize pending changes: `+`, `-`, `/` for added, deleted and edited
/// paths, `<` / `>` pairs for moves. `None` when nothing changed.
pub fn format_commit_message(changes: &[Change]) -> Option<String> {
	if changes.is_empty() {
		return None;
	}

	let mut message = String::new();
	for change in changes.iter().take(MAX_MESSAGE_ENTRIES) {
		match change.change_type {
			ChangeType::Moved => {
				message.push_str(&format!("< ‘{}’\n", change.path));
				message.push_str(&format!("> ‘{}’\n", change.moved_to_path.as_deref().unwrap_or_default()));
			}
			ChangeType::Added => message.push_str(&format!("+ ‘{}’\n", change.path)),
			ChangeType::Deleted => message.push_str(&format!("- ‘{}’\n", change.path)),
			ChangeType::Edited => message.push_str(&format!("/ ‘{}’\n", change.path)),
		}
	}

	if changes.len() > MAX_MESSAGE_ENTRIES {
		message.push_str(&format!("...and {} more\n", changes.len() - MAX_MESSAGE_ENTRIES));
	}
	Some(message)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_entries() {
		let entry = StatusEntry::parse("UU docs/report.txt").expect("entry");
		assert_eq!(entry.code, "UU");
		assert_eq!(entry.path, "docs/report.txt");

		let renamed = StatusEntry::parse("R  old.txt -> \"n\\303\\251w.txt\"").expect("rename");
		assert!(renamed.is_rename());
		assert_eq!(renamed.original_path.as_deref(), Some("old.txt"));
		assert_eq!(renamed.path, "néw.txt");

		assert!(StatusEntry::parse("").is_none());
		assert!(StatusEntry::parse("??").is_none());
	}

	#[test]
	fn test_parse_status_changes() {
		let output = " M edited.txt\n?? added.txt\nAM staged.txt\n D gone.txt\nR  a.txt -> b.txt\n?? photos/.empty\n";
		let changes = parse_status(output);
		let types: Vec<ChangeType> = changes.iter().map(|c| c.change_type).collect();
		assert_eq!(
			types,
			vec![
				ChangeType::Edited,
				ChangeType::Added,
				ChangeType::Added,
				ChangeType::Deleted,
				ChangeType::Moved,
				ChangeType::Added
			]
		);
		assert_eq!(changes[4].path, "a.txt");
		assert_eq!(changes[4].moved_to_path.as_deref(), Some("b.txt"));
		assert!(changes[5].is_folder);
		assert_eq!(changes[5].path, "photos/");
	}

	#[test]
	fn test_commit_message() {
		let mut moved = Change::new(ChangeType::Moved, "a.txt");
		moved.moved_to_path = Some("b.txt".to_string());
		let changes = vec![
			Change::new(ChangeType::Added, "new.txt"),
			Change::new(ChangeType::Deleted, "old.txt"),
			Change::new(ChangeType::Edited, "plan.md"),
			moved,
		];
		assert_eq!(
			format_commit_message(&changes).expect("message"),
			"+ ‘new.txt’\n- ‘old.txt’\n/ ‘plan.md’\n< ‘a.txt’\n> ‘b.txt’\n"
		);
	}

	#[test]
	fn test_commit_message_truncated() {
		let changes: Vec<Change> =
			(0..13).map(|i| Change::new(ChangeType::Added, &format!("f{}.txt", i))).collect();
		let message = format_commit_message(&changes).expect("message");
		assert_eq!(message.lines().count(), 11);
		assert!(message.ends_with("...and 3 more\n"));
	}

	#[test]
	fn test_commit_message_empty() {
		assert!(format_commit_message(&[]).is_none());
	}
}

// vim: ts=4
