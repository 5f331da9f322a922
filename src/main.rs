use clap::{Arg, ArgAction, ArgMatches, Command};
use futures::future::join_all;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gitshare::callbacks::RepositoryCallback;
use gitshare::config::Config;
use gitshare::context::Context;
use gitshare::fetcher::address::format_name;
use gitshare::fetcher::{create_fetcher, run_fetch, FetchRequest};
use gitshare::logging::*;
use gitshare::progress::CliProgress;
use gitshare::repository::{open_repository, Repository, RepositorySettings};
use gitshare::storage::StorageType;
use gitshare::sync::SyncDriver;
use gitshare::types::SyncStatus;
use gitshare::utils::wait_for_shutdown;

type CliResult<T> = Result<T, Box<dyn Error>>;

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> CliResult<Config> {
	let mut config = Config::load(matches.get_one::<String>("config-dir").map(Path::new))?;
	if let Some(name) = matches.get_one::<String>("user-name") {
		config.user.name = name.clone();
	}
	if let Some(email) = matches.get_one::<String>("user-email") {
		config.user.email = email.clone();
	}
	Ok(config)
}

/// Folders named on the command line, or all configured ones
fn selected_folders(config: &Config, matches: &ArgMatches) -> CliResult<Vec<String>> {
	match matches.get_many::<String>("folder") {
		Some(names) => {
			let names: Vec<String> = names.cloned().collect();
			for name in &names {
				config.folder(name)?;
			}
			Ok(names)
		}
		None => Ok(config.folders.iter().map(|folder| folder.name.clone()).collect()),
	}
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> CliResult<&'a String> {
	matches.get_one::<String>(name).ok_or_else(|| format!("argument <{}> is required", name).into())
}

async fn open_repo(
	context: &Context,
	name: &str,
	callback: Arc<dyn RepositoryCallback>,
) -> CliResult<Arc<dyn Repository>> {
	let folder = context.config.folder(name)?;
	let settings = RepositorySettings::from_folder(&context.config, folder);
	Ok(open_repository(settings, context, callback).await?)
}

async fn open_driver(
	context: &Context,
	name: &str,
	callback: Arc<dyn RepositoryCallback>,
) -> CliResult<SyncDriver> {
	let paused = context.config.folder(name)?.paused;
	let repo = open_repo(context, name, callback.clone()).await?;
	Ok(SyncDriver::new(repo, &context.config, callback, paused))
}

fn short_revision(revision: &str) -> &str {
	&revision[..revision.len().min(8)]
}

//////////////
// Commands //
//////////////

async fn fetch(mut config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let address = required(matches, "address")?.clone();
	let remote_path = matches.get_one::<String>("path").cloned().unwrap_or_default();
	let selected = match matches.get_one::<String>("storage") {
		Some(storage) => storage.parse::<StorageType>()?,
		None => StorageType::Unknown,
	};

	let name = match matches.get_one::<String>("name") {
		Some(name) => name.clone(),
		None if remote_path.is_empty() => format_name(&address),
		None => format_name(&remote_path),
	};
	if name.is_empty() {
		return Err("cannot derive a folder name, use --name".into());
	}
	if config.folder(&name).is_ok() {
		return Err(format!("folder '{}' already exists", name).into());
	}
	let destination = config.folders_root.join(&name);
	if destination.exists() {
		return Err(format!("{} already exists", destination.display()).into());
	}

	let context = Context::initialize(config.clone()).await?;
	let progress = Arc::new(CliProgress::new());
	let request = FetchRequest {
		address,
		remote_path,
		fingerprint: matches.get_one::<String>("fingerprint").cloned(),
		target_folder: config.tmp_dir().join(&name),
		fetch_prior_history: matches.get_flag("full-history"),
		backend: matches.get_one::<String>("backend").cloned(),
		announcements_url: matches.get_one::<String>("announcements").cloned(),
	};
	let fetcher = create_fetcher(request, &context, progress.clone())?;

	let fetched = tokio::select! {
		fetched = run_fetch(fetcher.as_ref(), progress.as_ref()) => fetched,
		code = wait_for_shutdown() => {
			fetcher.stop().await;
			return Ok(code);
		}
	};
	if !fetched {
		return Ok(1);
	}

	let empty = fetcher.is_fetched_repo_empty().await;
	let storage_type = match (empty, selected) {
		(true, StorageType::Unknown) => StorageType::Plain,
		(true, selected) => selected,
		(false, _) => fetcher.storage_type(),
	};

	if storage_type == StorageType::Encrypted {
		let password = match matches.get_one::<String>("password") {
			Some(password) => password,
			None => {
				fetcher.stop().await;
				return Err("this folder is encrypted, use --password".into());
			}
		};
		if !empty && !fetcher.is_fetched_repo_password_correct(password).await {
			fetcher.stop().await;
			return Err("wrong password".into());
		}
		fetcher.enable_fetched_repo_crypto(password).await?;
	}

	let identifier = fetcher.complete(storage_type).await?;

	tokio::fs::create_dir_all(&config.folders_root).await?;
	tokio::fs::rename(&fetcher.request().target_folder, &destination).await?;

	let entry = fetcher.request().folder_entry(&name, fetcher.remote_url(), storage_type, identifier);
	config.folders.push(entry);
	let saved = config.save()?;
	info!("{} | Added to {} ({})", name, saved.display(), destination.display());
	Ok(0)
}

async fn sync(config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let names = selected_folders(&config, matches)?;
	let context = Context::initialize(config).await?;
	let progress = Arc::new(CliProgress::new());

	let mut failed = false;
	for name in names {
		let driver = open_driver(&context, &name, progress.clone()).await?;
		if driver.status() == SyncStatus::Paused {
			info!("{} | Paused, skipping", name);
			continue;
		}

		driver.initialize().await;

		let error = driver.repository().error();
		if driver.status() == SyncStatus::Error || error.is_error() {
			error!("{} | Sync failed: {}", name, error);
			failed = true;
		}
	}
	Ok(if failed { 1 } else { 0 })
}

async fn watch_loop(drivers: &[SyncDriver], tick: Duration) {
	join_all(drivers.iter().map(|driver| driver.initialize())).await;

	let mut interval = tokio::time::interval(tick);
	loop {
		interval.tick().await;
		join_all(drivers.iter().map(|driver| async move {
			driver.on_local_changes().await;
			driver.poll_tick().await;
		}))
		.await;
	}
}

async fn watch(config: Config) -> CliResult<i32> {
	let context = Context::initialize(config).await?;
	let progress: Arc<dyn RepositoryCallback> = Arc::new(CliProgress::new());

	let mut drivers = Vec::new();
	for folder in &context.config.folders {
		match open_driver(&context, &folder.name, progress.clone()).await {
			Ok(driver) => drivers.push(driver),
			Err(e) => error!("{} | Cannot open: {}", folder.name, e),
		}
	}
	if drivers.is_empty() {
		return Err("no folders to watch".into());
	}

	let tick = Duration::from_secs(context.config.poll.timer_interval_secs.max(1));
	info!("Watching {} folder(s)", drivers.len());

	tokio::select! {
		_ = watch_loop(&drivers, tick) => Ok(0),
		code = wait_for_shutdown() => {
			info!("Shutting down");
			Ok(code)
		}
	}
}

async fn status(config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let names = selected_folders(&config, matches)?;
	let context = Context::initialize(config).await?;
	let progress = Arc::new(CliProgress::new());

	for name in names {
		let driver = open_driver(&context, &name, progress.clone()).await?;
		let repo = driver.repository();

		println!("{}", name);
		println!("  path:       {}", repo.local_path().display());
		println!("  remote:     {}", repo.remote_url());
		println!("  identifier: {}", repo.identifier());
		println!("  storage:    {}", repo.storage_type());
		println!("  status:     {}", driver.status());
		println!("  size:       {} bytes ({} bytes history)", repo.size().await, repo.history_size().await);
		if repo.has_unsynced_changes().await {
			println!("  unsynced commits waiting to be pushed");
		}
		for change in repo.unsynced_changes().await? {
			match &change.moved_to_path {
				Some(to) => println!("    {} {} -> {}", change.change_type, change.path, to),
				None => println!("    {} {}", change.change_type, change.path),
			}
		}
	}
	Ok(0)
}

async fn log(config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let name = required(matches, "folder")?;
	let limit = *matches.get_one::<usize>("limit").unwrap_or(&20);
	let context = Context::initialize(config).await?;
	let repo = open_repo(&context, name, Arc::new(CliProgress::new())).await?;

	let path = matches.get_one::<String>("path").map(String::as_str);
	for change_set in repo.change_sets(path).await?.iter().take(limit) {
		println!(
			"{}  {}  {}",
			short_revision(&change_set.revision),
			change_set.timestamp.format("%Y-%m-%d %H:%M"),
			change_set.user
		);
		for change in &change_set.changes {
			let kind = if change.is_folder {
				format!("{} folder", change.change_type)
			} else {
				change.change_type.to_string()
			};
			match &change.moved_to_path {
				Some(to) => println!("    {} {} -> {}", kind, change.path, to),
				None => println!("    {} {}", kind, change.path),
			}
		}
	}
	Ok(0)
}

async fn keys(config: Config) -> CliResult<i32> {
	let context = Context::initialize(config).await?;
	println!("{}", context.auth.public_key);
	eprintln!("private key: {}", context.auth.private_key_path.display());
	eprintln!("known hosts: {}", context.auth.known_hosts_path.display());
	Ok(0)
}

fn pause(mut config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let name = required(matches, "folder")?;
	config.folder_mut(name)?.paused = true;
	config.save()?;
	info!("{} | Paused", name);
	Ok(0)
}

async fn resume(mut config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let name = required(matches, "folder")?.clone();
	let message = matches.get_one::<String>("message").cloned().unwrap_or_default();

	if !config.folder(&name)?.paused {
		info!("{} | Not paused", name);
		return Ok(0);
	}
	config.folder_mut(&name)?.paused = false;
	config.save()?;

	let context = Context::initialize(config).await?;
	let callback: Arc<dyn RepositoryCallback> = Arc::new(CliProgress::new());
	let repo = open_repo(&context, &name, callback.clone()).await?;
	let driver = SyncDriver::new(repo, &context.config, callback, true);

	driver.resume(&message).await;
	Ok(if driver.status() == SyncStatus::Error { 1 } else { 0 })
}

async fn restore(config: Config, matches: &ArgMatches) -> CliResult<i32> {
	let name = required(matches, "folder")?;
	let path = required(matches, "path")?;
	let revision = required(matches, "revision")?;
	let target = match matches.get_one::<String>("target") {
		Some(target) => PathBuf::from(target),
		None => {
			let file_name = Path::new(path).file_name().ok_or("path names no file")?;
			std::env::current_dir()?.join(file_name)
		}
	};

	let context = Context::initialize(config).await?;
	let repo = open_repo(&context, name, Arc::new(CliProgress::new())).await?;
	repo.restore_file(path, revision, &target).await?;
	info!("{} | Restored {} ({}) to {}", name, path, short_revision(revision), target.display());
	Ok(0)
}

fn folder_arg(is_required: bool) -> Arg {
	Arg::new("folder").required(is_required).help("Folder name")
}

fn cli() -> Command {
	Command::new("GitShare")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Folder synchronization on top of git")
		.subcommand_required(true)
		.arg(
			Arg::new("config-dir")
				.short('c')
				.long("config-dir")
				.value_name("DIR")
				.global(true)
				.help("Configuration directory"),
		)
		.arg(
			Arg::new("user-name")
				.long("user-name")
				.value_name("NAME")
				.global(true)
				.help("Commit author name"),
		)
		.arg(
			Arg::new("user-email")
				.long("user-email")
				.value_name("EMAIL")
				.global(true)
				.help("Commit author email"),
		)
		.subcommand(
			Command::new("fetch")
				.about("Retrieve a shared folder and add it to the configuration")
				.arg(Arg::new("address").required(true).help("Remote address, e.g. ssh://user@host"))
				.arg(Arg::new("path").short('p').long("path").value_name("PATH").help("Path on the remote"))
				.arg(Arg::new("name").short('n').long("name").value_name("NAME").help("Local folder name"))
				.arg(
					Arg::new("fingerprint")
						.long("fingerprint")
						.value_name("FP")
						.help("Expected host key fingerprint"),
				)
				.arg(
					Arg::new("backend")
						.long("backend")
						.value_name("BACKEND")
						.help("Backend (default: from address)"),
				)
				.arg(
					Arg::new("storage")
						.short('s')
						.long("storage")
						.value_name("TYPE")
						.help("Storage type for an empty remote: plain, encrypted, large-files"),
				)
				.arg(
					Arg::new("announcements")
						.long("announcements")
						.value_name("URL")
						.help("Announcements channel for change notifications"),
				)
				.arg(Arg::new("password").long("password").value_name("PASSWORD").help("Encryption password"))
				.arg(
					Arg::new("full-history")
						.long("full-history")
						.action(ArgAction::SetTrue)
						.help("Fetch the complete history"),
				),
		)
		.subcommand(
			Command::new("sync")
				.about("Pull and push pending changes once")
				.arg(folder_arg(false).action(ArgAction::Append).num_args(0..)),
		)
		.subcommand(Command::new("watch").about("Keep all folders in sync until interrupted"))
		.subcommand(
			Command::new("status")
				.about("Show folder state and unsynced changes")
				.arg(folder_arg(false).action(ArgAction::Append).num_args(0..)),
		)
		.subcommand(
			Command::new("log")
				.about("Show folder history")
				.arg(folder_arg(true))
				.arg(Arg::new("path").short('p').long("path").value_name("PATH").help("Only this file"))
				.arg(
					Arg::new("limit")
						.short('l')
						.long("limit")
						.value_name("N")
						.value_parser(clap::value_parser!(usize))
						.help("Number of change-sets (default: 20)"),
				),
		)
		.subcommand(Command::new("keys").about("Print the public key, creating a key pair if needed"))
		.subcommand(Command::new("pause").about("Stop syncing a folder").arg(folder_arg(true)))
		.subcommand(
			Command::new("resume")
				.about("Resume a paused folder and push its changes")
				.arg(folder_arg(true))
				.arg(
					Arg::new("message")
						.short('m')
						.long("message")
						.value_name("MSG")
						.help("Commit message"),
				),
		)
		.subcommand(
			Command::new("restore")
				.about("Save an older version of a file")
				.arg(folder_arg(true))
				.arg(Arg::new("path").required(true).help("File path inside the folder"))
				.arg(Arg::new("revision").required(true).help("Revision to restore"))
				.arg(
					Arg::new("target")
						.short('o')
						.long("target")
						.value_name("FILE")
						.help("Where to save it"),
				),
		)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = cli().get_matches();
	let config = load_config(&matches)?;

	let code = match matches.subcommand() {
		Some(("fetch", sub)) => fetch(config, sub).await?,
		Some(("sync", sub)) => sync(config, sub).await?,
		Some(("watch", _)) => watch(config).await?,
		Some(("status", sub)) => status(config, sub).await?,
		Some(("log", sub)) => log(config, sub).await?,
		Some(("keys", _)) => keys(config).await?,
		Some(("pause", sub)) => pause(config, sub)?,
		Some(("resume", sub)) => resume(config, sub).await?,
		Some(("restore", sub)) => restore(config, sub).await?,
		_ => 0,
	};

	if code != 0 {
		std::process::exit(code);
	}
	Ok(())
}

// vim: ts=4
