//! Single `--name-status` lines and git's quoted path syntax

use crate::fetcher::rules::{EMPTY_DIR_MARKER, IDENTIFIER_FILE};
use crate::types::{Change, ChangeType};

/// Decode a path as printed by git: optional surrounding quotes, C escapes
/// and octal-escaped UTF-8 bytes.
pub fn unquote_path(path: &str) -> String {
	let inner = if path.len() >= 2 && path.starts_with('"') && path.ends_with('"') {
		&path[1..path.len() - 1]
	} else {
		return path.to_string();
	};

	let mut bytes: Vec<u8> = Vec::with_capacity(inner.len());
	let mut chars = inner.chars().peekable();

	while let Some(c) = chars.next() {
		if c != '\\' {
			let mut buf = [0u8; 4];
			bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
			continue;
		}

		match chars.peek().copied() {
			Some(d) if d.is_digit(8) => {
				let mut value: u32 = 0;
				let mut digits = 0;
				while digits < 3 {
					match chars.peek().and_then(|d| d.to_digit(8)) {
						Some(v) => {
							value = value * 8 + v;
							chars.next();
							digits += 1;
						}
						None => break,
					}
				}
				bytes.push(value as u8);
			}
			Some(escaped) => {
				chars.next();
				let decoded = match escaped {
					'n' => '\n',
					't' => '\t',
					'r' => '\r',
					other => other,
				};
				let mut buf = [0u8; 4];
				bytes.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
			}
			None => bytes.push(b'\\'),
		}
	}

	String::from_utf8_lossy(&bytes).into_owned()
}

/// Strip a trailing empty-directory placeholder; returns whether one was found
pub(crate) fn strip_dir_marker(path: &str) -> (String, bool) {
	match path.strip_suffix(EMPTY_DIR_MARKER) {
		Some(dir) => (dir.to_string(), true),
		None => (path.to_string(), false),
	}
}

fn is_rename_status(status: &str) -> bool {
	status.len() > 1 && status.starts_with('R') && status[1..].chars().all(|c| c.is_ascii_digit())
}

/// Parse one `--name-status` line.
///
/// Lines carrying a DEL escape or touching the identifier file are skipped,
/// as is anything that is not an add, modify, delete or rename.
pub fn parse_change(line: &str) -> Option<Change> {
	if line.contains("\\177") || line.contains(IDENTIFIER_FILE) {
		return None;
	}

	let mut fields = line.split('\t');
	let status = fields.next()?;
	let first = fields.next()?;
	let second = fields.next();

	let mut change = match (status, second) {
		("A", None) => Change::new(ChangeType::Added, &unquote_path(first)),
		("M", None) => Change::new(ChangeType::Edited, &unquote_path(first)),
		("D", None) => Change::new(ChangeType::Deleted, &unquote_path(first)),
		(status, Some(to)) if is_rename_status(status) => {
			let mut change = Change::new(ChangeType::Moved, &unquote_path(first));
			change.moved_to_path = Some(unquote_path(to));
			change
		}
		_ => return None,
	};

	let (path, is_folder) = strip_dir_marker(&change.path);
	if is_folder {
		change.path = path;
		change.is_folder = true;
		if let Some(to) = change.moved_to_path.take() {
			change.moved_to_path = Some(strip_dir_marker(&to).0);
		}
	}

	Some(change)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unquote_plain_path() {
		assert_eq!(unquote_path("docs/readme.md"), "docs/readme.md");
	}

	#[test]
	fn test_unquote_octal_utf8() {
		assert_eq!(unquote_path("\"caf\\303\\251.txt\""), "café.txt");
		assert_eq!(unquote_path("\"say \\\"hi\\\".txt\""), "say \"hi\".txt");
		assert_eq!(unquote_path("\"tab\\there\""), "tab\there");
	}

	#[test]
	fn test_parse_basic_types() {
		let added = parse_change("A\tnotes/todo.txt").expect("added");
		assert_eq!(added.change_type, ChangeType::Added);
		assert_eq!(added.path, "notes/todo.txt");

		assert_eq!(parse_change("M\ta.txt").map(|c| c.change_type), Some(ChangeType::Edited));
		assert_eq!(parse_change("D\ta.txt").map(|c| c.change_type), Some(ChangeType::Deleted));
	}

	#[test]
	fn test_parse_rename_is_stable() {
		let line = "R100\told name.txt\tnew name.txt";
		let first = parse_change(line).expect("rename");
		assert_eq!(first.change_type, ChangeType::Moved);
		assert_eq!(first.path, "old name.txt");
		assert_eq!(first.moved_to_path.as_deref(), Some("new name.txt"));
		assert_eq!(parse_change(line), Some(first));
	}

	#[test]
	fn test_parse_partial_rename() {
		let change = parse_change("R087\ta.txt\tb.txt").expect("rename");
		assert_eq!(change.moved_to_path.as_deref(), Some("b.txt"));
	}

	#[test]
	fn test_folder_placeholder() {
		let change = parse_change("A\tphotos/2024/.empty").expect("folder");
		assert!(change.is_folder);
		assert_eq!(change.path, "photos/2024/");

		let moved = parse_change("R100\told/.empty\tnew/.empty").expect("moved folder");
		assert_eq!(moved.path, "old/");
		assert_eq!(moved.moved_to_path.as_deref(), Some("new/"));
	}

	#[test]
	fn test_skipped_lines() {
		assert!(parse_change("A\t.sparkleshare").is_none());
		assert!(parse_change("A\t\"bad\\177name\"").is_none());
		assert!(parse_change("C100\ta\tb").is_none());
		assert!(parse_change("T\tlink").is_none());
		assert!(parse_change("    commit message").is_none());
		assert!(parse_change("").is_none());
	}
}

// vim: ts=4
