//! History extraction: `git log --name-status` output to change-sets
//!
//! Commits are read newest first. For whole-folder views consecutive commits
//! by the same author on the same local calendar day are folded into one
//! [`ChangeSet`]; single-path views keep every commit but hide removals and
//! moves of the path itself.

pub mod change;

use crate::config::HistoryConfig;
use crate::types::{ChangeSet, ChangeType, User};
use chrono::{DateTime, Datelike, Local};
use once_cell::sync::Lazy;
use regex::Regex;

pub use change::{parse_change, unquote_path};

static COMMIT_LINE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^commit ([a-f0-9]{40})").expect("valid regex"));

static AUTHOR_LINE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^Author: (.+?) <(.*)>$").expect("valid regex"));

static DATE_LINE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^Date:\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} [+-]\d{4})$").expect("valid regex")
});

const GIT_ISO_DATE: &str = "%Y-%m-%d %H:%M:%S %z";

/// Which slice of history `git log` is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWindow {
	/// The configured time window (`--since`)
	Recent,
	/// The newest `fallback_count` commits, for folders quiet during the window
	Newest,
}

/// Arguments for the history query; the path filter is appended by the caller
pub fn log_args(history: &HistoryConfig, window: LogWindow) -> Vec<String> {
	let mut args = vec!["--no-pager".to_string(), "log".to_string()];
	match window {
		LogWindow::Recent => args.push(format!("--since={}", history.since)),
		LogWindow::Newest => {
			args.push("-n".to_string());
			args.push(history.fallback_count.to_string());
		}
	}
	args.extend(
		["--name-status", "--date=iso", "--find-renames", "--no-merges", "--no-color"]
			.iter()
			.map(|s| s.to_string()),
	);
	args
}

/// Per-extraction settings
#[derive(Debug, Clone)]
pub struct LogContext<'a> {
	pub folder: &'a str,
	pub remote_url: &'a str,
	/// Commits by this author name are hidden
	pub service_author: &'a str,
	pub max_changes_per_commit: usize,
	/// Single-path view: no grouping, removals/moves of this path hidden
	pub path: Option<&'a str>,
}

/// Parse full `git log` output into change-sets, newest first
pub fn parse_log(output: &str, ctx: &LogContext<'_>) -> Vec<ChangeSet> {
	let mut change_sets: Vec<ChangeSet> = Vec::new();

	for record in split_commits(output) {
		let mut change_set = match parse_header(&record, ctx) {
			Some(change_set) => change_set,
			None => continue,
		};

		let file_lines = record
			.iter()
			.skip(1)
			.filter(|line| !line.is_empty() && !line.starts_with(' ') && !is_header(line))
			.take(ctx.max_changes_per_commit);

		for line in file_lines {
			if let Some(mut change) = parse_change(line) {
				change.timestamp = Some(change_set.timestamp);
				change_set.changes.push(change);
			}
		}

		match ctx.path {
			Some(path) => {
				let path = path.replace('\\', "/");
				change_set.changes.retain(|change| {
					change.path != path
						|| !matches!(change.change_type, ChangeType::Deleted | ChangeType::Moved)
				});
				change_sets.push(change_set);
			}
			None => push_grouped(&mut change_sets, change_set),
		}
	}

	change_sets
}

fn is_header(line: &str) -> bool {
	line.starts_with("Author: ") || line.starts_with("Date: ") || line.starts_with("Merge: ")
}

fn split_commits(output: &str) -> Vec<Vec<&str>> {
	let mut records: Vec<Vec<&str>> = Vec::new();
	for line in output.lines() {
		if COMMIT_LINE.is_match(line) {
			records.push(vec![line]);
		} else if let Some(record) = records.last_mut() {
			record.push(line);
		}
	}
	records
}

fn parse_header(record: &[&str], ctx: &LogContext<'_>) -> Option<ChangeSet> {
	let revision = COMMIT_LINE.captures(record.first()?)?.get(1)?.as_str().to_string();

	let author = record.iter().find_map(|line| AUTHOR_LINE.captures(line))?;
	let name = author.get(1)?.as_str();
	let email = author.get(2)?.as_str();
	if name == ctx.service_author {
		return None;
	}

	let date = record.iter().find_map(|line| DATE_LINE.captures(line))?;
	let timestamp = DateTime::parse_from_str(date.get(1)?.as_str(), GIT_ISO_DATE).ok()?;

	Some(ChangeSet {
		revision,
		user: User::new(name, email),
		timestamp: timestamp.with_timezone(&Local),
		first_timestamp: None,
		folder: ctx.folder.to_string(),
		remote_url: ctx.remote_url.to_string(),
		changes: Vec::new(),
	})
}

fn same_day(a: &DateTime<Local>, b: &DateTime<Local>) -> bool {
	a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Fold `change_set` into the previous set when author and day match
fn push_grouped(change_sets: &mut Vec<ChangeSet>, change_set: ChangeSet) {
	let last = match change_sets.last_mut() {
		Some(last)
			if last.user.name == change_set.user.name
				&& same_day(&last.timestamp, &change_set.timestamp) =>
		{
			last
		}
		_ => {
			change_sets.push(change_set);
			return;
		}
	};

	last.changes.extend(change_set.changes);
	if last.timestamp <= change_set.timestamp {
		last.first_timestamp = Some(last.timestamp);
		last.timestamp = change_set.timestamp;
		last.revision = change_set.revision;
	} else {
		last.first_timestamp = Some(change_set.timestamp);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	const ALICE_1: &str = "1111111111111111111111111111111111111111";
	const ALICE_2: &str = "2222222222222222222222222222222222222222";
	const BOB: &str = "3333333333333333333333333333333333333333";

	fn commit(revision: &str, author: &str, date: &str, files: &[&str]) -> String {
		let mut text = format!(
			"commit {}\nAuthor: {} <{}@example.org>\nDate:   {}\n\n    + ‘something’\n\n",
			revision,
			author,
			author.to_lowercase(),
			date
		);
		for file in files {
			text.push_str(file);
			text.push('\n');
		}
		text.push('\n');
		text
	}

	fn ctx(path: Option<&str>) -> LogContext<'_> {
		LogContext {
			folder: "Docs",
			remote_url: "ssh://storage@example.org/docs",
			service_author: "SparkleShare",
			max_changes_per_commit: 256,
			path,
		}
	}

	fn local_noon() -> String {
		Local.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap().format(GIT_ISO_DATE).to_string()
	}

	fn local_at(hour: u32) -> String {
		Local.with_ymd_and_hms(2024, 3, 7, hour, 0, 0).unwrap().format(GIT_ISO_DATE).to_string()
	}

	#[test]
	fn test_log_args() {
		let history = HistoryConfig::default();
		let recent = log_args(&history, LogWindow::Recent);
		assert_eq!(&recent[..3], &["--no-pager", "log", "--since=1.month"]);
		assert!(recent.contains(&"--find-renames".to_string()));

		let newest = log_args(&history, LogWindow::Newest);
		assert_eq!(&newest[2..4], &["-n", "75"]);
		assert!(!newest.iter().any(|a| a.starts_with("--since")));
	}

	#[test]
	fn test_parse_single_commit() {
		let log = commit(ALICE_1, "Alice", "2024-03-07 09:05:00 +0100", &["A\tnotes.txt", "M\tplan.md"]);
		let sets = parse_log(&log, &ctx(None));
		assert_eq!(sets.len(), 1);
		assert_eq!(sets[0].revision, ALICE_1);
		assert_eq!(sets[0].user, User::new("Alice", "alice@example.org"));
		assert_eq!(sets[0].folder, "Docs");
		assert_eq!(sets[0].changes.len(), 2);
		assert_eq!(sets[0].changes[1].change_type, ChangeType::Edited);
		assert_eq!(sets[0].changes[0].timestamp, Some(sets[0].timestamp));

		let expected = DateTime::parse_from_str("2024-03-07 09:05:00 +0100", GIT_ISO_DATE).unwrap();
		assert_eq!(sets[0].timestamp, expected.with_timezone(&Local));
	}

	#[test]
	fn test_groups_same_author_same_day() {
		let log = format!(
			"{}{}{}",
			commit(ALICE_2, "Alice", &local_at(15), &["M\tb.txt"]),
			commit(ALICE_1, "Alice", &local_at(10), &["A\ta.txt"]),
			commit(BOB, "Bob", &local_noon(), &["A\tc.txt"])
		);
		let sets = parse_log(&log, &ctx(None));

		assert_eq!(sets.len(), 2);
		assert_eq!(sets[0].revision, ALICE_2);
		assert_eq!(sets[0].changes.len(), 2);
		let expected_first = DateTime::parse_from_str(&local_at(10), GIT_ISO_DATE).unwrap();
		assert_eq!(sets[0].first_timestamp, Some(expected_first.with_timezone(&Local)));
		assert_eq!(sets[1].user.name, "Bob");
	}

	#[test]
	fn test_no_grouping_for_single_path() {
		let log = format!(
			"{}{}",
			commit(ALICE_2, "Alice", &local_at(15), &["D\ta.txt"]),
			commit(ALICE_1, "Alice", &local_at(10), &["A\ta.txt", "A\tb.txt"])
		);
		let sets = parse_log(&log, &ctx(Some("a.txt")));
		assert_eq!(sets.len(), 2);
		assert!(sets[0].changes.is_empty());
		assert_eq!(sets[1].changes.len(), 2);
	}

	#[test]
	fn test_service_author_hidden() {
		let log = format!(
			"{}{}",
			commit(ALICE_2, "SparkleShare", &local_at(15), &["M\ta.txt"]),
			commit(ALICE_1, "Alice", &local_at(10), &["A\ta.txt"])
		);
		let sets = parse_log(&log, &ctx(None));
		assert_eq!(sets.len(), 1);
		assert_eq!(sets[0].revision, ALICE_1);
	}

	#[test]
	fn test_change_cap() {
		let files: Vec<String> = (0..10).map(|i| format!("A\tfile{}.txt", i)).collect();
		let refs: Vec<&str> = files.iter().map(String::as_str).collect();
		let log = commit(ALICE_1, "Alice", &local_noon(), &refs);
		let mut context = ctx(None);
		context.max_changes_per_commit = 4;
		assert_eq!(parse_log(&log, &context)[0].changes.len(), 4);
	}

	#[test]
	fn test_identifier_file_skipped() {
		let log = commit(ALICE_1, "Alice", &local_noon(), &["A\t.sparkleshare", "A\tGitShare.txt"]);
		let sets = parse_log(&log, &ctx(None));
		assert_eq!(sets[0].changes.len(), 1);
		assert_eq!(sets[0].changes[0].path, "GitShare.txt");
	}

	#[test]
	fn test_empty_output() {
		assert!(parse_log("", &ctx(None)).is_empty());
		assert!(parse_log("   \n", &ctx(None)).is_empty());
	}
}

// vim: ts=4
