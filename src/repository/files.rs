//! Working-tree preparation, size accounting and the folder identifier
//!
//! These walks are synchronous; callers run them on the blocking pool.

use crate::fetcher::rules::{EMPTY_DIR_MARKER, EMPTY_DIR_MARKER_TEXT, IDENTIFIER_FILE};
use crate::logging::*;
use crate::util::random_identifier;
use std::fs;
use std::io;
use std::path::Path;

/// Directories never counted towards the working-tree size
const SIZE_EXCLUDED_DIRS: &[&str] = &[".git", "rebase-apply"];

/// Make every directory visible to git.
///
/// Nested repositories have their `HEAD` renamed so they are stored as plain
/// files instead of submodules, and empty directories receive a placeholder.
pub fn prepare_directories(root: &Path) -> io::Result<()> {
	prepare_directory(root, root)
}

fn prepare_directory(root: &Path, dir: &Path) -> io::Result<()> {
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let file_type = entry.file_type()?;
		if !file_type.is_dir() {
			continue;
		}

		let child = entry.path();
		if entry.file_name() == ".git" {
			if dir == root {
				continue;
			}
			let head = child.join("HEAD");
			if head.is_file() {
				let backup = child.join("HEAD.backup");
				fs::rename(&head, &backup)?;
				info!("Renamed {}", head.display());
			}
			continue;
		}

		if let Err(e) = prepare_directory(root, &child) {
			warn!("Failed preparing {}: {}", child.display(), e);
		}
	}

	if dir != root && fs::read_dir(dir)?.next().is_none() {
		let marker = dir.join(EMPTY_DIR_MARKER);
		if let Err(e) = fs::write(&marker, EMPTY_DIR_MARKER_TEXT) {
			warn!("Failed adding empty folder {}: {}", dir.display(), e);
		}
	}
	Ok(())
}

/// Total bytes below `dir`, skipping symlinks, VCS internals and placeholders
pub fn calculate_size(dir: &Path) -> u64 {
	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(e) => {
			debug!("Error calculating size of {}: {}", dir.display(), e);
			return 0;
		}
	};

	let mut size = 0;
	for entry in entries.flatten() {
		let file_type = match entry.file_type() {
			Ok(file_type) => file_type,
			Err(_) => continue,
		};
		let name = entry.file_name();

		if file_type.is_symlink() {
			continue;
		} else if file_type.is_dir() {
			if SIZE_EXCLUDED_DIRS.iter().any(|excluded| name == *excluded) {
				continue;
			}
			size += calculate_size(&entry.path());
		} else if name != EMPTY_DIR_MARKER {
			size += entry.metadata().map(|m| m.len()).unwrap_or(0);
		}
	}
	size
}

/// Working-tree size and history size of a checkout
pub fn calculate_sizes(local_path: &Path) -> (u64, u64) {
	let git_dir = local_path.join(".git");
	(calculate_size(local_path), calculate_size_including_internals(&git_dir))
}

/// Like [`calculate_size`], but descends into every directory
fn calculate_size_including_internals(dir: &Path) -> u64 {
	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(_) => return 0,
	};

	let mut size = 0;
	for entry in entries.flatten() {
		match entry.file_type() {
			Ok(t) if t.is_symlink() => {}
			Ok(t) if t.is_dir() => size += calculate_size_including_internals(&entry.path()),
			Ok(_) => size += entry.metadata().map(|m| m.len()).unwrap_or(0),
			Err(_) => {}
		}
	}
	size
}

/// Folder identifier: the identifier file, else the configured one, else a
/// fresh one. Whatever is chosen is written back to the identifier file.
pub fn resolve_identifier(local_path: &Path, configured: Option<&str>) -> io::Result<String> {
	let path = local_path.join(IDENTIFIER_FILE);

	if let Ok(text) = fs::read_to_string(&path) {
		let identifier = text.trim();
		if !identifier.is_empty() {
			return Ok(identifier.to_string());
		}
	}

	let identifier = match configured {
		Some(identifier) if !identifier.is_empty() => identifier.to_string(),
		_ => random_identifier(),
	};
	fs::write(&path, &identifier)?;
	info!("Assigned identifier {} to {}", identifier, local_path.display());
	Ok(identifier)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_prepare_fills_empty_directories() {
		let dir = TempDir::new().unwrap();
		let root = dir.path();
		fs::create_dir_all(root.join(".git")).unwrap();
		fs::create_dir_all(root.join("a/b")).unwrap();
		fs::create_dir_all(root.join("c")).unwrap();
		fs::write(root.join("c/file.txt"), "x").unwrap();

		prepare_directories(root).unwrap();

		assert_eq!(fs::read_to_string(root.join("a/b/.empty")).unwrap(), "I'm a folder!");
		assert!(!root.join("a/.empty").exists());
		assert!(!root.join("c/.empty").exists());
		assert!(!root.join(".empty").exists());
		assert!(!root.join(".git/.empty").exists());
	}

	#[test]
	fn test_prepare_neutralizes_nested_repositories() {
		let dir = TempDir::new().unwrap();
		let root = dir.path();
		fs::create_dir_all(root.join(".git")).unwrap();
		fs::write(root.join(".git/HEAD"), "ref: refs/heads/master\n").unwrap();
		fs::create_dir_all(root.join("vendor/lib/.git")).unwrap();
		fs::write(root.join("vendor/lib/.git/HEAD"), "ref: refs/heads/main\n").unwrap();

		prepare_directories(root).unwrap();

		assert!(root.join(".git/HEAD").exists());
		assert!(!root.join("vendor/lib/.git/HEAD").exists());
		assert!(root.join("vendor/lib/.git/HEAD.backup").exists());
	}

	#[test]
	fn test_sizes() {
		let dir = TempDir::new().unwrap();
		let root = dir.path();
		fs::create_dir_all(root.join(".git/objects")).unwrap();
		fs::write(root.join(".git/objects/pack"), vec![0u8; 100]).unwrap();
		fs::create_dir_all(root.join("docs")).unwrap();
		fs::write(root.join("docs/a.txt"), vec![0u8; 10]).unwrap();
		fs::write(root.join("b.txt"), vec![0u8; 5]).unwrap();
		fs::create_dir_all(root.join("empty")).unwrap();
		fs::write(root.join("empty/.empty"), EMPTY_DIR_MARKER_TEXT).unwrap();

		let (size, history_size) = calculate_sizes(root);
		assert_eq!(size, 15);
		assert_eq!(history_size, 100);
	}

	#[test]
	fn test_identifier_resolution_order() {
		let dir = TempDir::new().unwrap();
		let root = dir.path();

		let configured = resolve_identifier(root, Some("from-config")).unwrap();
		assert_eq!(configured, "from-config");
		assert_eq!(fs::read_to_string(root.join(IDENTIFIER_FILE)).unwrap(), "from-config");

		fs::write(root.join(IDENTIFIER_FILE), "from-file\n").unwrap();
		assert_eq!(resolve_identifier(root, Some("from-config")).unwrap(), "from-file");

		fs::remove_file(root.join(IDENTIFIER_FILE)).unwrap();
		let fresh = resolve_identifier(root, None).unwrap();
		assert_eq!(fresh.len(), 64);
	}
}

// vim: ts=4
