//! Error types for gitshare operations

use crate::types::ErrorKind;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// External command failures
#[derive(Debug)]
pub enum CommandError {
	/// The program could not be started
	SpawnFailed { program: String, source: io::Error },

	/// Reading from or waiting on the process failed
	Io(io::Error),

	/// The process was terminated through its kill handle
	Killed,

	/// A requested stdio pipe was not available
	StdioUnavailable { what: String },

	/// The process exited unsuccessfully
	ExitFailure { program: String, code: Option<i32>, stderr: String },
}

impl fmt::Display for CommandError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CommandError::SpawnFailed { program, source } => {
				write!(f, "Failed to spawn '{}': {}", program, source)
			}
			CommandError::Io(e) => write!(f, "I/O error: {}", e),
			CommandError::Killed => write!(f, "Process was killed"),
			CommandError::StdioUnavailable { what } => write!(f, "Stdio unavailable: {}", what),
			CommandError::ExitFailure { program, code, stderr } => match code {
				Some(code) => write!(f, "'{}' exited with code {}: {}", program, code, stderr.trim()),
				None => write!(f, "'{}' terminated by signal: {}", program, stderr.trim()),
			},
		}
	}
}

impl Error for CommandError {}

impl From<io::Error> for CommandError {
	fn from(e: io::Error) -> Self {
		CommandError::Io(e)
	}
}

/// Host trust and key management failures
#[derive(Debug)]
pub enum TrustError {
	/// Key scanning returned nothing usable
	HostKeyUnavailable,

	/// The scanned key does not match the expected fingerprint
	FingerprintMismatch { expected: String, actual: String },

	/// Local key generation failed
	KeyGeneration { message: String },

	/// I/O error on key or known-hosts files
	Io(io::Error),
}

impl fmt::Display for TrustError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TrustError::HostKeyUnavailable => write!(f, "error: Could not fetch host key"),
			TrustError::FingerprintMismatch { .. } => {
				write!(f, "error: Host fingerprint doesn't match")
			}
			TrustError::KeyGeneration { message } => {
				write!(f, "error: Could not generate key pair: {}", message)
			}
			TrustError::Io(e) => write!(f, "error: {}", e),
		}
	}
}

impl Error for TrustError {}

impl From<io::Error> for TrustError {
	fn from(e: io::Error) -> Self {
		TrustError::Io(e)
	}
}

impl From<CommandError> for TrustError {
	fn from(e: CommandError) -> Self {
		TrustError::KeyGeneration { message: e.to_string() }
	}
}

/// Fetch (first clone) failures
#[derive(Debug)]
pub enum FetchError {
	/// Host could not be trusted
	Trust(TrustError),

	/// The remote could not be listed
	StorageTypeUnavailable,

	/// Clone did not complete
	CloneFailed { message: String },

	/// Stopped by the caller
	Cancelled,

	/// Stale target could not be removed
	TargetNotWritable { path: PathBuf },

	/// No fetcher registered under this backend name
	UnknownBackend { name: String },

	/// The address could not be parsed
	InvalidAddress { address: String },

	/// A git command failed during completion
	Command(CommandError),

	/// I/O error while preparing the checkout
	Io(io::Error),
}

impl fmt::Display for FetchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FetchError::Trust(e) => write!(f, "{}", e),
			FetchError::StorageTypeUnavailable => {
				write!(f, "error: Could not determine the storage type of the remote")
			}
			FetchError::CloneFailed { message } => write!(f, "{}", message),
			FetchError::Cancelled => write!(f, "Fetch cancelled"),
			FetchError::TargetNotWritable { path } => {
				write!(f, "\"{}\" is read-only.", path.display())
			}
			FetchError::UnknownBackend { name } => write!(f, "Unknown backend: {}", name),
			FetchError::InvalidAddress { address } => write!(f, "Invalid address: {}", address),
			FetchError::Command(e) => write!(f, "{}", e),
			FetchError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for FetchError {}

impl From<TrustError> for FetchError {
	fn from(e: TrustError) -> Self {
		FetchError::Trust(e)
	}
}

impl From<CommandError> for FetchError {
	fn from(e: CommandError) -> Self {
		FetchError::Command(e)
	}
}

impl From<io::Error> for FetchError {
	fn from(e: io::Error) -> Self {
		FetchError::Io(e)
	}
}

/// Repository synchronization failures
#[derive(Debug)]
pub enum SyncError {
	/// A git command could not be run
	Command(CommandError),

	/// I/O error in the working tree
	Io(io::Error),

	/// The transport reported a classified failure
	Unrecoverable(ErrorKind),

	/// Conflict-exit loop hit its configured cap
	ConflictLoopExceeded { attempts: usize },

	/// The folder is not a usable repository
	InvalidRepository { path: PathBuf, message: String },

	/// No repository registered under this backend name
	UnknownBackend { name: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Command(e) => write!(f, "Command failed: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Unrecoverable(kind) => write!(f, "Sync failed: {}", kind),
			SyncError::ConflictLoopExceeded { attempts } => {
				write!(f, "Gave up resolving conflicts after {} attempts", attempts)
			}
			SyncError::InvalidRepository { path, message } => {
				write!(f, "Invalid repository {}: {}", path.display(), message)
			}
			SyncError::UnknownBackend { name } => write!(f, "Unknown backend: {}", name),
		}
	}
}

impl Error for SyncError {}

impl From<CommandError> for SyncError {
	fn from(e: CommandError) -> Self {
		SyncError::Command(e)
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

/// Configuration loading and saving failures
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: PathBuf, source: io::Error },

	/// Config file could not be parsed
	Parse { path: PathBuf, message: String },

	/// Config file could not be written
	Write { path: PathBuf, message: String },

	/// No folder with this name is configured
	UnknownFolder { name: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "Cannot read {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Cannot parse {}: {}", path.display(), message)
			}
			ConfigError::Write { path, message } => {
				write!(f, "Cannot write {}: {}", path.display(), message)
			}
			ConfigError::UnknownFolder { name } => write!(f, "No such folder: {}", name),
		}
	}
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trust_error_messages() {
		assert_eq!(TrustError::HostKeyUnavailable.to_string(), "error: Could not fetch host key");
		let mismatch =
			TrustError::FingerprintMismatch { expected: "aa".to_string(), actual: "bb".to_string() };
		assert_eq!(mismatch.to_string(), "error: Host fingerprint doesn't match");
	}

	#[test]
	fn test_fetch_error_read_only_target() {
		let err = FetchError::TargetNotWritable { path: PathBuf::from("/tmp/x") };
		assert_eq!(err.to_string(), "\"/tmp/x\" is read-only.");
	}

	#[test]
	fn test_exit_failure_display() {
		let err = CommandError::ExitFailure {
			program: "git".to_string(),
			code: Some(128),
			stderr: "fatal: nope\n".to_string(),
		};
		assert_eq!(err.to_string(), "'git' exited with code 128: fatal: nope");
	}
}

// vim: ts=4
