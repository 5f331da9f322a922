/// Integration tests for configuration files
///
/// Tests verify:
/// 1. TOML and JSON5 files are both accepted, with defaults for missing keys
/// 2. config.toml wins when several config files exist
/// 3. A saved configuration loads back with its folders intact
/// 4. Parse errors name the offending file
use std::fs;

use gitshare::{Config, ConfigError, FolderConfig, StorageType};
use tempfile::TempDir;

#[test]
fn test_load_toml() {
	let tmp = TempDir::new().unwrap();
	fs::write(
		tmp.path().join("config.toml"),
		r#"
foldersRoot = "/srv/shared"
maxResolveAttempts = 5

[user]
name = "Alice"
email = "alice@example.org"

[poll]
shortIntervalSecs = 60

[[folders]]
name = "Photos"
url = "ssh://storage@example.org/photos"
storageType = "large-files"
"#,
	)
	.unwrap();

	let config = Config::load(Some(tmp.path())).unwrap();
	assert_eq!(config.config_dir, tmp.path());
	assert_eq!(config.folders_root.to_str(), Some("/srv/shared"));
	assert_eq!(config.user.name, "Alice");
	assert_eq!(config.max_resolve_attempts, Some(5));
	assert_eq!(config.poll.short_interval_secs, 60);
	assert_eq!(config.poll.long_interval_secs, 900);

	let folder = config.folder("Photos").unwrap();
	assert_eq!(folder.storage_type, StorageType::LargeFiles);
	assert!(!folder.paused);
	assert_eq!(config.folder_path(folder).to_str(), Some("/srv/shared/Photos"));
}

#[test]
fn test_load_json5() {
	let tmp = TempDir::new().unwrap();
	fs::write(
		tmp.path().join("config.json5"),
		r#"{
	// comments are allowed
	user: { name: "Bob", email: "bob@example.org" },
	history: { since: "2.weeks" },
	folders: [
		{ name: "Docs", url: "ssh://example.org/docs", paused: true, },
	],
}"#,
	)
	.unwrap();

	let config = Config::load(Some(tmp.path())).unwrap();
	assert_eq!(config.user.name, "Bob");
	assert_eq!(config.history.since, "2.weeks");
	assert_eq!(config.history.fallback_count, 75);
	assert!(config.folder("Docs").unwrap().paused);
	assert!(config.folder("Photos").is_err());
}

#[test]
fn test_toml_takes_precedence() {
	let tmp = TempDir::new().unwrap();
	fs::write(tmp.path().join("config.json"), r#"{"user": {"name": "Json"}}"#).unwrap();
	fs::write(tmp.path().join("config.toml"), "[user]\nname = \"Toml\"\n").unwrap();

	let config = Config::load(Some(tmp.path())).unwrap();
	assert_eq!(config.user.name, "Toml");
}

#[test]
fn test_save_and_reload() {
	let tmp = TempDir::new().unwrap();
	let mut config = Config::default();
	config.config_dir = tmp.path().join("nested");
	config.folders.push(FolderConfig {
		name: "Music".to_string(),
		url: "ssh://example.org/music".to_string(),
		identifier: Some("ab".repeat(32)),
		storage_type: StorageType::Encrypted,
		..Default::default()
	});
	config.folder_mut("Music").unwrap().paused = true;

	let path = config.save().unwrap();
	assert!(path.ends_with("config.toml"));

	let loaded = Config::load(Some(&config.config_dir)).unwrap();
	let folder = loaded.folder("Music").unwrap();
	assert_eq!(folder.identifier.as_deref(), Some("ab".repeat(32).as_str()));
	assert_eq!(folder.storage_type, StorageType::Encrypted);
	assert!(folder.paused);
}

#[test]
fn test_parse_error_names_file() {
	let tmp = TempDir::new().unwrap();
	let path = tmp.path().join("config.toml");
	fs::write(&path, "user = [not toml").unwrap();

	match Config::load(Some(tmp.path())) {
		Err(ConfigError::Parse { path: failed, .. }) => assert_eq!(failed, path),
		other => panic!("expected parse error, got {:?}", other),
	}
}

// vim: ts=4
