//! Git invocations with the per-command environment installed

use super::{Command, CommandPaths};
use crate::ssh::SshAuthInfo;
use std::path::Path;
use std::sync::Arc;

/// `GIT_SSH_COMMAND` value pinning identity and known hosts and ignoring user SSH config
pub fn ssh_command(ssh: &Path, auth: &SshAuthInfo) -> String {
	format!(
		"{} -i \"{}\" -o UserKnownHostsFile=\"{}\" -o IdentitiesOnly=yes -o PasswordAuthentication=no -F /dev/null",
		ssh.display(),
		auth.private_key_path.display(),
		auth.known_hosts_path.display()
	)
}

/// Factory for git commands sharing tool paths and SSH settings
#[derive(Debug, Clone)]
pub struct Git {
	paths: Arc<CommandPaths>,
	ssh_command: String,
}

impl Git {
	pub fn new(paths: Arc<CommandPaths>, auth: &SshAuthInfo) -> Self {
		let ssh_command = ssh_command(&paths.ssh, auth);
		Git { paths, ssh_command }
	}

	pub fn paths(&self) -> &CommandPaths {
		&self.paths
	}

	pub fn ssh_command(&self) -> &str {
		&self.ssh_command
	}

	/// `git` in `cwd` with non-interactive transport settings
	pub fn command(&self, cwd: &Path) -> Command {
		Command::new(&self.paths.git)
			.current_dir(cwd)
			.env("GIT_SSH_COMMAND", &self.ssh_command)
			.env("GIT_TERMINAL_PROMPT", "0")
			.env("LANG", "en_US")
	}

	/// Shorthand for `command(cwd).args(args)`
	pub fn with_args(&self, cwd: &Path, args: &[&str]) -> Command {
		self.command(cwd).args(args)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	#[test]
	fn test_ssh_command_pins_identity() {
		let auth = SshAuthInfo::from_paths(
			Path::new("/cfg/ssh/a.key"),
			Path::new("/cfg/ssh/known_hosts"),
		);
		let cmd = ssh_command(&PathBuf::from("/usr/bin/ssh"), &auth);
		assert_eq!(
			cmd,
			"/usr/bin/ssh -i \"/cfg/ssh/a.key\" -o UserKnownHostsFile=\"/cfg/ssh/known_hosts\" \
			 -o IdentitiesOnly=yes -o PasswordAuthentication=no -F /dev/null"
		);
	}

	#[test]
	fn test_command_carries_environment() {
		let auth = SshAuthInfo::from_paths(Path::new("/k.key"), Path::new("/kh"));
		let git = Git::new(Arc::new(CommandPaths::locate(&[])), &auth);
		let description = git.with_args(Path::new("/tmp"), &["status", "--porcelain"]).describe();
		assert!(description.starts_with("git status --porcelain"));
	}
}

// vim: ts=4
