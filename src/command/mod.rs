//! External process execution
//!
//! Every tool gitshare drives (git, git-lfs, ssh, ssh-keyscan, ssh-keygen,
//! openssl) is run through [`Command`]. Short commands are collected with
//! [`Command::output`]; long-running transfers are read line by line through
//! [`StreamingCommand`] and can be terminated from another task with a
//! [`KillHandle`].

pub mod git;
pub mod lines;

use crate::error::CommandError;
use crate::logging::*;
use lines::LineReader;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use git::Git;

// ============================================================================
// TOOL LOCATION
// ============================================================================

/// System directories searched after the configured ones
const SYSTEM_SEARCH_PATHS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/local/bin"];

/// Locate a tool by name; falls back to the bare name for a PATH lookup
pub fn locate_command(name: &str, extra: &[PathBuf]) -> PathBuf {
	let mut candidates: Vec<PathBuf> = extra.to_vec();
	if let Ok(home) = std::env::var("HOME") {
		candidates.push(PathBuf::from(home).join("bin"));
	}
	candidates.extend(SYSTEM_SEARCH_PATHS.iter().map(PathBuf::from));

	candidates
		.into_iter()
		.map(|dir| dir.join(name))
		.find(|path| path.is_file())
		.unwrap_or_else(|| PathBuf::from(name))
}

/// Absolute paths of the external tools, resolved once at startup
#[derive(Debug, Clone)]
pub struct CommandPaths {
	pub git: PathBuf,
	pub git_lfs: PathBuf,
	pub ssh: PathBuf,
	pub ssh_keyscan: PathBuf,
	pub ssh_keygen: PathBuf,
	pub openssl: PathBuf,
}

impl CommandPaths {
	pub fn locate(search_paths: &[PathBuf]) -> Self {
		CommandPaths {
			git: locate_command("git", search_paths),
			git_lfs: locate_command("git-lfs", search_paths),
			ssh: locate_command("ssh", search_paths),
			ssh_keyscan: locate_command("ssh-keyscan", search_paths),
			ssh_keygen: locate_command("ssh-keygen", search_paths),
			openssl: locate_command("openssl", search_paths),
		}
	}
}

// ============================================================================
// COMMAND BUILDER
// ============================================================================

/// Collected result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
	pub code: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl CommandOutput {
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}

	pub fn stdout_trimmed(&self) -> &str {
		self.stdout.trim()
	}
}

/// Which pipe a streaming command is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
	Stdout,
	Stderr,
}

#[derive(Debug, Clone)]
pub struct Command {
	program: PathBuf,
	args: Vec<String>,
	cwd: Option<PathBuf>,
	env: Vec<(String, String)>,
}

impl Command {
	pub fn new<P: AsRef<Path>>(program: P) -> Self {
		Command { program: program.as_ref().to_path_buf(), args: Vec::new(), cwd: None, env: Vec::new() }
	}

	pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
		self.args.push(arg.as_ref().to_string());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
		self
	}

	pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
		self.cwd = Some(dir.as_ref().to_path_buf());
		self
	}

	pub fn env<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
		self.env.push((key.as_ref().to_string(), value.as_ref().to_string()));
		self
	}

	pub fn program_name(&self) -> String {
		self.program
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| self.program.display().to_string())
	}

	/// Arguments as logged, with inline passwords masked
	pub fn describe(&self) -> String {
		let args: Vec<String> = self
			.args
			.iter()
			.map(|arg| if arg.starts_with("pass:") { "pass:***".to_string() } else { arg.clone() })
			.collect();
		format!("{} {}", self.program_name(), args.join(" "))
	}

	fn cwd_name(&self) -> String {
		self.cwd
			.as_ref()
			.and_then(|dir| dir.file_name())
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| ".".to_string())
	}

	fn build(&self) -> tokio::process::Command {
		let mut cmd = tokio::process::Command::new(&self.program);
		cmd.args(&self.args).stdin(Stdio::null());
		if let Some(dir) = &self.cwd {
			cmd.current_dir(dir);
		}
		for (key, value) in &self.env {
			cmd.env(key, value);
		}
		cmd
	}

	fn spawn_error(&self, e: std::io::Error) -> CommandError {
		CommandError::SpawnFailed { program: self.program_name(), source: e }
	}

	/// Run to completion and collect both pipes
	pub async fn output(&self) -> Result<CommandOutput, CommandError> {
		debug!("Cmd | {} | {}", self.cwd_name(), self.describe());
		let output = self.build().output().await.map_err(|e| self.spawn_error(e))?;
		Ok(CommandOutput {
			code: output.status.code(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}

	/// Run to completion, failing on a non-zero exit
	pub async fn run(&self) -> Result<CommandOutput, CommandError> {
		let output = self.output().await?;
		if output.success() {
			Ok(output)
		} else {
			Err(CommandError::ExitFailure {
				program: self.program_name(),
				code: output.code,
				stderr: output.stderr,
			})
		}
	}

	/// Start the command and read `stream` line by line; the other pipe is drained
	pub fn spawn_streaming(&self, stream: OutputStream) -> Result<StreamingCommand, CommandError> {
		debug!("Cmd | {} | {}", self.cwd_name(), self.describe());
		let mut child = self
			.build()
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|e| self.spawn_error(e))?;

		let stdout = child
			.stdout
			.take()
			.ok_or(CommandError::StdioUnavailable { what: "stdout".to_string() })?;
		let stderr = child
			.stderr
			.take()
			.ok_or(CommandError::StdioUnavailable { what: "stderr".to_string() })?;

		let (primary, mut secondary): (BoxedReader, BoxedReader) = match stream {
			OutputStream::Stdout => (Box::new(stdout), Box::new(stderr)),
			OutputStream::Stderr => (Box::new(stderr), Box::new(stdout)),
		};

		let drain = tokio::spawn(async move {
			let mut buf = Vec::new();
			let _ = secondary.read_to_end(&mut buf).await;
			String::from_utf8_lossy(&buf).into_owned()
		});

		let (kill_tx, kill_rx) = oneshot::channel::<()>();
		let waiter = tokio::spawn(async move {
			tokio::select! {
				status = child.wait() => status,
				_ = kill_rx => {
					let _ = child.kill().await;
					child.wait().await
				}
			}
		});

		Ok(StreamingCommand {
			program: self.program_name(),
			lines: LineReader::new(primary),
			drain,
			waiter,
			kill: KillHandle {
				sender: Arc::new(Mutex::new(Some(kill_tx))),
				killed: Arc::new(AtomicBool::new(false)),
			},
		})
	}
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

// ============================================================================
// STREAMING
// ============================================================================

/// Terminates a streaming command from any task
#[derive(Debug, Clone)]
pub struct KillHandle {
	sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
	killed: Arc<AtomicBool>,
}

impl KillHandle {
	/// Request termination; returns false if already requested
	pub fn kill(&self) -> bool {
		self.killed.store(true, Ordering::SeqCst);
		let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
		match sender {
			Some(sender) => {
				let _ = sender.send(());
				true
			}
			None => false,
		}
	}

	pub fn is_killed(&self) -> bool {
		self.killed.load(Ordering::SeqCst)
	}
}

/// Exit information of a streaming command
#[derive(Debug)]
pub struct StreamExit {
	pub code: Option<i32>,
	/// Everything written to the pipe that was not streamed
	pub other_output: String,
}

impl StreamExit {
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}
}

/// A running command whose output is consumed line by line.
///
/// `next_line` distinguishes a clean end of stream (`Ok(None)`), a kill
/// (`Err(CommandError::Killed)`) and a read failure (`Err(CommandError::Io)`).
pub struct StreamingCommand {
	program: String,
	lines: LineReader<BoxedReader>,
	drain: JoinHandle<String>,
	waiter: JoinHandle<std::io::Result<ExitStatus>>,
	kill: KillHandle,
}

impl StreamingCommand {
	pub fn kill_handle(&self) -> KillHandle {
		self.kill.clone()
	}

	pub fn program(&self) -> &str {
		&self.program
	}

	pub async fn next_line(&mut self) -> Result<Option<String>, CommandError> {
		match self.lines.next_line().await {
			Ok(Some(line)) => Ok(Some(line)),
			Ok(None) if self.kill.is_killed() => Err(CommandError::Killed),
			Ok(None) => Ok(None),
			Err(_) if self.kill.is_killed() => Err(CommandError::Killed),
			Err(e) => Err(CommandError::Io(e)),
		}
	}

	/// Wait for exit; the stream should have been read to its end first
	pub async fn wait(self) -> Result<StreamExit, CommandError> {
		let status = self
			.waiter
			.await
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))??;
		let other_output = self.drain.await.unwrap_or_default();

		if self.kill.is_killed() {
			return Err(CommandError::Killed);
		}
		Ok(StreamExit { code: status.code(), other_output })
	}
}


// vim: ts=4
