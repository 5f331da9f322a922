//! Remote address parsing and normalization

use crate::error::FetchError;
use std::fmt;

/// Hosts that get the `git` user and `.git` suffix, and offer large-file storage
const HOSTED_SERVICES: &[&str] = &["github.com", "gitlab.com"];

/// Default user for self-hosted SSH remotes
const DEFAULT_SSH_USER: &str = "storage";

/// A remote URL broken into the parts the transports care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
	pub scheme: String,
	pub user: Option<String>,
	pub password: Option<String>,
	pub host: String,
	pub port: Option<u16>,
	pub path: String,
}

impl RemoteUrl {
	/// Parse `scheme://[user[:password]@]host[:port]/path`
	pub fn parse(address: &str) -> Result<RemoteUrl, FetchError> {
		let invalid = || FetchError::InvalidAddress { address: address.to_string() };

		let (scheme, rest) = address.split_once("://").ok_or_else(invalid)?;
		if scheme.is_empty() {
			return Err(invalid());
		}

		let (authority, path) = match rest.find('/') {
			Some(pos) => (&rest[..pos], &rest[pos..]),
			None => (rest, ""),
		};

		let (user_info, host_port) = match authority.rfind('@') {
			Some(pos) => (Some(&authority[..pos]), &authority[pos + 1..]),
			None => (None, authority),
		};

		let (user, password) = match user_info {
			Some(info) => match info.split_once(':') {
				Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
				None => (Some(info.to_string()), None),
			},
			None => (None, None),
		};

		let (host, port) = match host_port.rsplit_once(':') {
			Some((host, port)) if !port.is_empty() => {
				(host.to_string(), Some(port.parse::<u16>().map_err(|_| invalid())?))
			}
			Some((host, _)) => (host.to_string(), None),
			None => (host_port.to_string(), None),
		};

		Ok(RemoteUrl {
			scheme: scheme.to_lowercase(),
			user: user.filter(|u| !u.is_empty()),
			password,
			host,
			port,
			path: path.to_string(),
		})
	}

	/// Same URL with user and password removed
	pub fn without_credentials(&self) -> RemoteUrl {
		RemoteUrl { user: None, password: None, ..self.clone() }
	}

	pub fn is_http(&self) -> bool {
		self.scheme.starts_with("http")
	}
}

impl fmt::Display for RemoteUrl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}://", self.scheme)?;
		if let Some(user) = &self.user {
			write!(f, "{}", user)?;
			if let Some(password) = &self.password {
				write!(f, ":{}", password)?;
			}
			write!(f, "@")?;
		}
		write!(f, "{}", self.host)?;
		if let Some(port) = self.port {
			write!(f, ":{}", port)?;
		}
		write!(f, "{}", self.path)
	}
}

/// A normalized fetch address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
	pub url: RemoteUrl,
	/// Remote is a hosted service that supports large-file storage
	pub large_files_available: bool,
}

/// Join address and remote path, default the scheme and user, apply hosted-service rules
pub fn normalize_address(address: &str, remote_path: &str) -> Result<NormalizedAddress, FetchError> {
	let address = address.trim().trim_end_matches('/');
	let remote_path = remote_path.trim().trim_matches('/');

	let mut joined = address.to_string();
	if !remote_path.is_empty() {
		joined.push('/');
		joined.push_str(remote_path);
	}
	if !joined.contains("://") {
		joined = format!("ssh://{}", joined);
	}

	let mut url = RemoteUrl::parse(&joined)?;
	if url.scheme.starts_with("ssh+") {
		url.scheme = "ssh".to_string();
	}

	let hosted = HOSTED_SERVICES.contains(&url.host.to_lowercase().as_str());
	if hosted {
		url.scheme = "ssh".to_string();
		url.user = Some("git".to_string());
		url.password = None;
		if !url.path.ends_with(".git") {
			url.path.push_str(".git");
		}
	} else if (url.scheme == "ssh" || url.scheme == "git") && url.user.is_none() {
		url.user = Some(DEFAULT_SSH_USER.to_string());
	}

	Ok(NormalizedAddress { url, large_files_available: hosted })
}

/// Backend named by an `ssh+<backend>://` prefix; `git` otherwise
pub fn backend_from_address(address: &str) -> String {
	address
		.split_once("://")
		.and_then(|(scheme, _)| scheme.strip_prefix("ssh+"))
		.filter(|backend| !backend.is_empty())
		.map(str::to_lowercase)
		.unwrap_or_else(|| "git".to_string())
}

/// Display name of a folder: last path segment, `.git` dropped, underscores as spaces
pub fn format_name(remote_path: &str) -> String {
	let segment = remote_path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
	let segment = segment.strip_suffix(".git").unwrap_or(segment);
	segment.replace('_', " ").trim().to_string()
}


// vim: ts=4
