//! Classification of git and git-lfs output lines

use super::constants::{COMPRESSING_WEIGHT, TRANSFER_WEIGHT};
use super::ProgressUpdate;
use crate::types::ErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;

static PERCENTAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)%").expect("valid regex"));

static SPEED: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?) (KiB|MiB)/s").expect("valid regex"));

static LFS_FILES: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"\(([0-9]+) of ([0-9]+) files(?:, ([0-9]+) skipped)?\)").expect("valid regex")
});

/// What a single output line means
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
	Progress(ProgressUpdate),
	Error(ErrorKind),
	/// Meaningful text that is neither progress nor a known failure
	Other(String),
	/// Blank lines and progress that carries no information
	Ignored,
}

/// Map a transport failure message to its error kind
pub fn find_error(line: &str) -> Option<ErrorKind> {
	let line = line.trim();

	if line.contains("WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!")
		|| line.contains("WARNING: POSSIBLE DNS SPOOFING DETECTED!")
	{
		return Some(ErrorKind::HostIdentityChanged);
	}

	if line.starts_with("Permission denied")
		|| line.starts_with("ssh_exchange_identification: Connection closed by remote host")
		|| line.starts_with("The authenticity of host")
	{
		return Some(ErrorKind::AuthenticationFailed);
	}

	if line.ends_with("does not appear to be a git repository") {
		return Some(ErrorKind::NotFound);
	}

	if line.ends_with("expected old/new/ref, got 'shallow") {
		return Some(ErrorKind::IncompatibleClientServer);
	}

	if line.starts_with("error: Disk space exceeded")
		|| line.ends_with("No space left on device")
		|| line.ends_with("file write error (Disk quota exceeded)")
	{
		return Some(ErrorKind::DiskSpaceExceeded);
	}

	None
}

fn parse_speed(line: &str) -> f64 {
	SPEED
		.captures(line)
		.and_then(|caps| {
			let value: f64 = caps[1].parse().ok()?;
			let unit = if &caps[2] == "MiB" { 1024.0 * 1024.0 } else { 1024.0 };
			Some(value * unit)
		})
		.unwrap_or(0.0)
}

fn stage_label(line: &str) -> String {
	line.split(':').next().unwrap_or_default().trim().to_string()
}

fn parse_lfs_line(line: &str) -> Option<ProgressLine> {
	let caps = LFS_FILES.captures(line)?;
	let done: u64 = caps[1].parse().ok()?;
	let total: u64 = caps[2].parse().ok()?;
	let skipped: u64 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);

	let remaining = total.saturating_sub(skipped);
	if done == 0 || remaining == 0 {
		return Some(ProgressLine::Ignored);
	}

	let percentage = (done as f64 / remaining as f64 * 100.0).round();
	Some(ProgressLine::Progress(ProgressUpdate {
		percentage,
		speed: parse_speed(line),
		information: format!("{} of {} files", done, total),
	}))
}

/// Classify one line of transport output.
///
/// Git stages map onto one bar: compression fills the first 20%, the transfer
/// stages the remaining 80%.
pub fn parse_progress(line: &str) -> ProgressLine {
	let line = line.trim();
	if line.is_empty() {
		return ProgressLine::Ignored;
	}

	if let Some(parsed) = parse_lfs_line(line) {
		return parsed;
	}

	if let Some(caps) = PERCENTAGE.captures(line) {
		if let Ok(number) = caps[1].parse::<f64>() {
			let percentage = if line.contains("Compressing") {
				number / 100.0 * COMPRESSING_WEIGHT
			} else {
				number / 100.0 * TRANSFER_WEIGHT + COMPRESSING_WEIGHT
			};
			return ProgressLine::Progress(ProgressUpdate {
				percentage,
				speed: parse_speed(line),
				information: stage_label(line),
			});
		}
	}

	match find_error(line) {
		Some(kind) => ProgressLine::Error(kind),
		None => ProgressLine::Other(line.to_string()),
	}
}


// vim: ts=4
