//! Storage contracts and built-in token store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenKind, TokenSecret},
};

/// Synchronous key-value storage for the access/refresh credential pair.
///
/// Reads happen on every outbound request and every renewal attempt, so implementations
/// should keep lookups cheap. Writes are last-writer-wins.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the secret stored under `kind`, if present.
	fn get(&self, kind: TokenKind) -> Result<Option<TokenSecret>, StoreError>;

	/// Persists or replaces the secret stored under `kind`.
	fn set(&self, kind: TokenKind, value: &str) -> Result<(), StoreError>;

	/// Removes the secret stored under `kind`; missing entries are not an error.
	fn remove(&self, kind: TokenKind) -> Result<(), StoreError>;

	/// Removes both halves of the credential pair.
	fn clear(&self) -> Result<(), StoreError> {
		for kind in TokenKind::ALL {
			self.remove(kind)?;
		}

		Ok(())
	}

	/// Persists both halves of a freshly issued credential pair.
	fn save_pair(&self, pair: &CredentialPair) -> Result<(), StoreError> {
		for kind in TokenKind::ALL {
			self.set(kind, pair.get(kind).expose())?;
		}

		Ok(())
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
