//! SSH identity and host trust
//!
//! Keys live in `<configDir>/ssh`: the first `*.key` file found there is the
//! identity, otherwise a fresh RSA key pair is generated. The known-hosts file
//! in the same directory is the only one the transports consult.

pub mod trust;

use crate::command::{Command, CommandPaths};
use crate::error::TrustError;
use crate::logging::*;
use chrono::Local;
use std::path::{Path, PathBuf};

pub use trust::{derive_fingerprint, HostKeyScanner, HostTrust, KeyscanScanner};

const KEY_EXTENSION: &str = "key";
const KNOWN_HOSTS: &str = "known_hosts";

/// Key material and known-hosts location handed to every transport command
#[derive(Debug, Clone)]
pub struct SshAuthInfo {
	pub private_key_path: PathBuf,
	pub public_key_path: PathBuf,
	pub known_hosts_path: PathBuf,
	pub public_key: String,
}

impl SshAuthInfo {
	/// Describe an existing key pair without touching the filesystem
	pub fn from_paths(private_key_path: &Path, known_hosts_path: &Path) -> Self {
		SshAuthInfo {
			private_key_path: private_key_path.to_path_buf(),
			public_key_path: public_key_path(private_key_path),
			known_hosts_path: known_hosts_path.to_path_buf(),
			public_key: String::new(),
		}
	}

	/// Import the first key in `ssh_dir`, or generate one
	pub async fn load_or_create(ssh_dir: &Path, paths: &CommandPaths) -> Result<Self, TrustError> {
		tokio::fs::create_dir_all(ssh_dir).await?;
		restrict_permissions(ssh_dir, 0o700).await;

		let private_key_path = match find_key(ssh_dir).await? {
			Some(path) => {
				info!("Auth | Using key pair {}", path.display());
				path
			}
			None => generate_key_pair(ssh_dir, paths).await?,
		};

		let known_hosts_path = ssh_dir.join(KNOWN_HOSTS);
		if !known_hosts_path.exists() {
			tokio::fs::write(&known_hosts_path, "").await?;
		}

		let public_key_path = public_key_path(&private_key_path);
		let public_key = tokio::fs::read_to_string(&public_key_path).await?.trim().to_string();

		Ok(SshAuthInfo { private_key_path, public_key_path, known_hosts_path, public_key })
	}
}

fn public_key_path(private_key_path: &Path) -> PathBuf {
	let mut name = private_key_path.as_os_str().to_owned();
	name.push(".pub");
	PathBuf::from(name)
}

async fn find_key(ssh_dir: &Path) -> Result<Option<PathBuf>, TrustError> {
	let mut keys = Vec::new();
	let mut entries = tokio::fs::read_dir(ssh_dir).await?;
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) == Some(KEY_EXTENSION) && path.is_file() {
			keys.push(path);
		}
	}
	keys.sort();
	Ok(keys.into_iter().next())
}

/// Host name used in the key comment, without `.local`/`.config` suffixes
pub fn key_comment_host(host_name: &str) -> String {
	let mut host = host_name.trim();
	for suffix in &[".local", ".config"] {
		if let Some(stripped) = host.strip_suffix(suffix) {
			host = stripped;
		}
	}
	host.to_string()
}

/// Key file name derived from the creation time: `YYYY-MM-DD_HHhMM.key`
pub fn key_file_name<Tz: chrono::TimeZone>(now: &chrono::DateTime<Tz>) -> String
where
	Tz::Offset: std::fmt::Display,
{
	format!("{}.{}", now.format("%Y-%m-%d_%Hh%M"), KEY_EXTENSION)
}

async fn generate_key_pair(ssh_dir: &Path, paths: &CommandPaths) -> Result<PathBuf, TrustError> {
	let host = key_comment_host(&sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string()));
	let file_name = key_file_name(&Local::now());

	let output = Command::new(&paths.ssh_keygen)
		.current_dir(ssh_dir)
		.args(&["-t", "rsa", "-b", "4096", "-P", ""])
		.arg("-C")
		.arg(format!("{} (gitshare)", host))
		.arg("-f")
		.arg(&file_name)
		.output()
		.await?;

	let path = ssh_dir.join(&file_name);
	if !output.success() || !path.exists() {
		error!("Auth | Could not create key pair: {}", output.stderr.trim());
		return Err(TrustError::KeyGeneration { message: output.stderr.trim().to_string() });
	}

	info!("Auth | Created key pair {}", path.display());
	Ok(path)
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) {
	use std::os::unix::fs::PermissionsExt;
	if let Err(e) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await {
		warn!("Auth | Could not restrict permissions of {}: {}", path.display(), e);
	}
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_key_comment_host_strips_suffixes() {
		assert_eq!(key_comment_host("laptop.local"), "laptop");
		assert_eq!(key_comment_host("box.config"), "box");
		assert_eq!(key_comment_host("server"), "server");
	}

	#[test]
	fn test_key_file_name() {
		let when = chrono::Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
		assert_eq!(key_file_name(&when), "2024-03-07_09h05.key");
	}

	#[test]
	fn test_public_key_path() {
		let info = SshAuthInfo::from_paths(Path::new("/k/a.key"), Path::new("/k/known_hosts"));
		assert_eq!(info.public_key_path, PathBuf::from("/k/a.key.pub"));
	}

	#[tokio::test]
	async fn test_imports_existing_key() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		std::fs::write(dir.path().join("2020-01-01_10h00.key"), "PRIVATE").expect("write");
		std::fs::write(dir.path().join("2020-01-01_10h00.key.pub"), "ssh-rsa AAAA test\n")
			.expect("write");

		let paths = CommandPaths::locate(&[]);
		let auth = SshAuthInfo::load_or_create(dir.path(), &paths).await.expect("load");
		assert!(auth.private_key_path.ends_with("2020-01-01_10h00.key"));
		assert_eq!(auth.public_key, "ssh-rsa AAAA test");
		assert!(auth.known_hosts_path.exists());
	}
}

// vim: ts=4
