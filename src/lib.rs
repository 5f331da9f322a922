//! # GitShare - Folder synchronization on top of git
//!
//! GitShare keeps a local folder in sync with a shared git remote. A folder
//! is first retrieved by a [`fetcher::Fetcher`] (host trust, storage
//! detection, clone, initial commit) and afterwards kept in sync by a
//! [`repository::Repository`] driven by a [`sync::SyncDriver`].
//!
//! ## Fetching a folder
//!
//! ```rust,ignore
//! use gitshare::{callbacks::NoCallbacks, config::Config, context::Context};
//! use gitshare::fetcher::{create_fetcher, run_fetch, FetchRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = Context::initialize(Config::load(None)?).await?;
//!     let request = FetchRequest {
//!         address: "ssh://storage@example.org".to_string(),
//!         remote_path: "/photos".to_string(),
//!         target_folder: context.config.tmp_dir().join("Photos"),
//!         ..Default::default()
//!     };
//!     let fetcher = create_fetcher(request, &context, Arc::new(NoCallbacks))?;
//!     if run_fetch(fetcher.as_ref(), &NoCallbacks).await {
//!         let identifier = fetcher.complete(Default::default()).await?;
//!         println!("Fetched folder {}", identifier);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Keeping it in sync
//!
//! ```rust,ignore
//! use gitshare::repository::{open_repository, RepositorySettings};
//! use gitshare::sync::SyncDriver;
//!
//! let folder = context.config.folder("Photos")?;
//! let settings = RepositorySettings::from_folder(&context.config, folder);
//! let repo = open_repository(settings, &context, callback.clone()).await?;
//! let driver = SyncDriver::new(repo, &context.config, callback, folder.paused);
//! driver.initialize().await;
//! loop {
//!     driver.poll_tick().await;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! }
//! ```

pub mod callbacks;
pub mod changeset;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod progress;
pub mod repository;
pub mod ssh;
pub mod storage;
pub mod sync;
pub mod types;
pub mod util;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{Config, FolderConfig};
pub use context::Context;
pub use error::{CommandError, ConfigError, FetchError, SyncError, TrustError};
pub use storage::StorageType;
pub use types::{Change, ChangeSet, ChangeType, ErrorKind, SyncStatus, User};

// vim: ts=4
