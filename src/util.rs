//! Hashing, identifiers and small shared helpers

use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Lowercase hex SHA-256 of a string
pub fn sha256_hex(text: &str) -> String {
	hex::encode(Sha256::digest(text.as_bytes()))
}

/// Fresh random folder identifier (64 hex chars)
pub fn random_identifier() -> String {
	let seed = uuid::Uuid::new_v4();
	blake3::hash(seed.as_bytes()).to_hex().to_string()
}

/// Fresh random salt for encrypted storage (16 hex chars)
pub fn random_salt() -> String {
	let mut salt = sha256_hex(&uuid::Uuid::new_v4().to_string());
	salt.truncate(16);
	salt
}

/// Key material handed to the cipher tool: SHA-256 of password and salt
pub fn derive_password_key(password: &str, salt: &str) -> String {
	sha256_hex(&format!("{}{}", password, salt))
}

/// Lazily computed value with explicit invalidation.
///
/// Used for per-repository facts that are expensive to recompute but can go
/// stale (current branch, encryption salt).
#[derive(Debug)]
pub struct Memo<T: Clone> {
	value: Mutex<Option<T>>,
}

impl<T: Clone> Memo<T> {
	pub fn new() -> Self {
		Memo { value: Mutex::new(None) }
	}

	pub fn get(&self) -> Option<T> {
		self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn set(&self, value: T) {
		*self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
	}

	pub fn invalidate(&self) {
		*self.value.lock().unwrap_or_else(|e| e.into_inner()) = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sha256_hex_known_value() {
		assert_eq!(
			sha256_hex("abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn test_identifier_and_salt_shapes() {
		let id = random_identifier();
		assert_eq!(id.len(), 64);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(id, random_identifier());

		let salt = random_salt();
		assert_eq!(salt.len(), 16);
	}

	#[test]
	fn test_derive_password_key_is_salted() {
		assert_ne!(derive_password_key("secret", "aa"), derive_password_key("secret", "bb"));
		assert_eq!(derive_password_key("secret", "aa"), sha256_hex("secretaa"));
	}

	#[test]
	fn test_memo_invalidate() {
		let memo: Memo<String> = Memo::new();
		assert_eq!(memo.get(), None);
		memo.set("master".to_string());
		assert_eq!(memo.get().as_deref(), Some("master"));
		memo.invalidate();
		assert_eq!(memo.get(), None);
	}
}

// vim: ts=4
