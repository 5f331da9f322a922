//! Termination signals for long-running commands

use tracing::{debug, warn};

/// Exit status for a process stopped by SIGTERM (128 + 15)
pub const SIGTERM_EXIT: i32 = 143;

/// Exit status for a process stopped by SIGINT (128 + 2)
pub const SIGINT_EXIT: i32 = 130;

/// Wait for SIGTERM or SIGINT and return the matching exit status.
///
/// If the handlers cannot be installed this never returns, the process then
/// falls back to the default signal disposition.
pub async fn wait_for_shutdown() -> i32 {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}", e);
			return futures::future::pending().await;
		}
	};

	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}", e);
			return futures::future::pending().await;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => {
			debug!("Received SIGTERM, shutting down...");
			SIGTERM_EXIT
		}
		_ = sigint.recv() => {
			debug!("Received SIGINT, shutting down...");
			SIGINT_EXIT
		}
	}
}

// vim: ts=4
