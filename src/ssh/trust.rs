//! Host key scanning, fingerprint checks and known-hosts maintenance

use crate::command::Command;
use crate::error::TrustError;
use crate::fetcher::address::RemoteUrl;
use crate::logging::*;
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Source of a host's public key line (`host keytype base64`)
#[async_trait]
pub trait HostKeyScanner: Send + Sync {
	async fn scan(&self, host: &str, port: Option<u16>) -> Option<String>;
}

/// Scans with `ssh-keyscan -t rsa`
pub struct KeyscanScanner {
	program: PathBuf,
}

impl KeyscanScanner {
	pub fn new(program: &Path) -> Self {
		KeyscanScanner { program: program.to_path_buf() }
	}
}

#[async_trait]
impl HostKeyScanner for KeyscanScanner {
	async fn scan(&self, host: &str, port: Option<u16>) -> Option<String> {
		let output = Command::new(&self.program)
			.args(&["-t", "rsa", "-p"])
			.arg(port.unwrap_or(22).to_string())
			.arg(host)
			.output()
			.await
			.map_err(|e| warn!("Auth | Key scan of {} failed: {}", host, e))
			.ok()?;

		if !output.success() {
			return None;
		}
		output
			.stdout
			.lines()
			.map(str::trim)
			.find(|line| !line.is_empty() && !line.starts_with('#'))
			.map(str::to_string)
	}
}

/// SHA-256 fingerprint of a host key line as colon-separated lowercase hex
pub fn derive_fingerprint(host_key: &str) -> Option<String> {
	let encoded = host_key.split_whitespace().nth(2)?;
	let key = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
	let digest = Sha256::digest(&key);
	let pairs: Vec<String> = digest.iter().map(|b| format!("{:02x}", b)).collect();
	Some(pairs.join(":"))
}

fn normalize_fingerprint(fingerprint: &str) -> String {
	fingerprint.trim().to_lowercase()
}

/// Append `host_key` to the known-hosts file unless its host is already listed
pub fn accept_host_key(known_hosts: &Path, host_key: &str) -> std::io::Result<bool> {
	let host = host_key.split_whitespace().next().unwrap_or_default();
	let existing = match std::fs::read_to_string(known_hosts) {
		Ok(text) => text,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
		Err(e) => return Err(e),
	};

	let prefix = format!("{} ", host);
	if existing.lines().any(|line| line.starts_with(&prefix)) {
		return Ok(false);
	}

	let mut text = existing;
	if !text.is_empty() && !text.ends_with('\n') {
		text.push('\n');
	}
	text.push_str(host_key.trim());
	text.push('\n');
	std::fs::write(known_hosts, text)?;
	Ok(true)
}

/// Establishes trust in a remote host before any SSH transport runs
pub struct HostTrust {
	scanner: Box<dyn HostKeyScanner>,
	known_hosts: PathBuf,
}

impl HostTrust {
	pub fn new(scanner: Box<dyn HostKeyScanner>, known_hosts: &Path) -> Self {
		HostTrust { scanner, known_hosts: known_hosts.to_path_buf() }
	}

	/// True when the transport does not go through SSH host verification
	pub fn is_bypassed(url: &RemoteUrl) -> bool {
		let ssh_transport = url.scheme == "ssh" || url.scheme == "git";
		!ssh_transport || url.host.ends_with(".onion")
	}

	/// Scan, verify and record the host key.
	///
	/// Returns a warning when a key was accepted without an expected fingerprint.
	pub async fn establish(
		&self,
		url: &RemoteUrl,
		expected_fingerprint: Option<&str>,
	) -> Result<Option<String>, TrustError> {
		if Self::is_bypassed(url) {
			debug!("Auth | Skipping host key check for {}", url);
			return Ok(None);
		}

		let host_key =
			self.scanner.scan(&url.host, url.port).await.ok_or(TrustError::HostKeyUnavailable)?;
		let fingerprint = derive_fingerprint(&host_key).ok_or(TrustError::HostKeyUnavailable)?;

		let mut warning = None;
		match expected_fingerprint.map(normalize_fingerprint).filter(|f| !f.is_empty()) {
			Some(expected) if expected != fingerprint => {
				error!("Auth | Host fingerprint of {} doesn't match: {}", url.host, fingerprint);
				return Err(TrustError::FingerprintMismatch { expected, actual: fingerprint });
			}
			Some(_) => info!("Auth | Host fingerprint of {} matches", url.host),
			None => {
				warn!("Auth | Accepting unverified host key of {}", url.host);
				warning = Some(format!("The following host key has been accepted:\n{}", fingerprint));
			}
		}

		if accept_host_key(&self.known_hosts, &host_key)? {
			info!("Auth | Added host key of {} to known hosts", url.host);
		}
		Ok(warning)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// "hello world" in base64; sha256 of it is well known
	const HOST_KEY: &str = "example.com ssh-rsa aGVsbG8gd29ybGQ=";
	const FINGERPRINT: &str = "b9:4d:27:b9:93:4d:3e:08:a5:2e:52:d7:da:7d:ab:fa:c4:84:ef:e3:7a:53:80:ee:90:88:f7:ac:e2:ef:cd:e9";

	struct StaticScanner(Option<&'static str>);

	#[async_trait]
	impl HostKeyScanner for StaticScanner {
		async fn scan(&self, _host: &str, _port: Option<u16>) -> Option<String> {
			self.0.map(str::to_string)
		}
	}

	fn trust(scanner: StaticScanner, dir: &Path) -> HostTrust {
		HostTrust::new(Box::new(scanner), &dir.join("known_hosts"))
	}

	#[test]
	fn test_derive_fingerprint() {
		assert_eq!(derive_fingerprint(HOST_KEY).as_deref(), Some(FINGERPRINT));
		assert_eq!(derive_fingerprint("host ssh-rsa"), None);
		assert_eq!(derive_fingerprint("host ssh-rsa !!notbase64!!"), None);
	}

	#[test]
	fn test_accept_host_key_is_idempotent() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		let known_hosts = dir.path().join("known_hosts");
		std::fs::write(&known_hosts, "other.org ssh-rsa AAAA").expect("write");

		assert!(accept_host_key(&known_hosts, HOST_KEY).expect("accept"));
		assert!(!accept_host_key(&known_hosts, HOST_KEY).expect("accept"));

		let text = std::fs::read_to_string(&known_hosts).expect("read");
		assert_eq!(text, format!("other.org ssh-rsa AAAA\n{}\n", HOST_KEY));
	}

	#[tokio::test]
	async fn test_unverified_key_yields_warning() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		let url = RemoteUrl::parse("ssh://storage@example.com/project").expect("url");
		let warning = trust(StaticScanner(Some(HOST_KEY)), dir.path())
			.establish(&url, None)
			.await
			.expect("trust");
		assert_eq!(
			warning,
			Some(format!("The following host key has been accepted:\n{}", FINGERPRINT))
		);
	}

	#[tokio::test]
	async fn test_matching_fingerprint_is_silent() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		let url = RemoteUrl::parse("ssh://storage@example.com/project").expect("url");
		let warning = trust(StaticScanner(Some(HOST_KEY)), dir.path())
			.establish(&url, Some(&FINGERPRINT.to_uppercase()))
			.await
			.expect("trust");
		assert_eq!(warning, None);
	}

	#[tokio::test]
	async fn test_mismatch_and_scan_failure() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		let url = RemoteUrl::parse("ssh://storage@example.com/project").expect("url");

		let err = trust(StaticScanner(Some(HOST_KEY)), dir.path())
			.establish(&url, Some("00:11"))
			.await
			.unwrap_err();
		assert_eq!(err.to_string(), "error: Host fingerprint doesn't match");
		assert!(!dir.path().join("known_hosts").exists());

		let err = trust(StaticScanner(None), dir.path()).establish(&url, None).await.unwrap_err();
		assert_eq!(err.to_string(), "error: Could not fetch host key");
	}

	#[tokio::test]
	async fn test_bypassed_transports() {
		let dir = tempfile::TempDir::new().expect("tempdir");
		for address in &["https://example.com/repo", "ssh://storage@abcdef.onion/repo"] {
			let url = RemoteUrl::parse(address).expect("url");
			let result = trust(StaticScanner(None), dir.path()).establish(&url, None).await;
			assert!(matches!(result, Ok(None)), "{} should bypass", address);
		}
	}
}

// vim: ts=4
