//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenSecret},
	store::{StoreError, TokenStore},
};

/// Thread-safe storage backend that keeps credentials in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<TokenKind, TokenSecret>>>);
impl MemoryStore {
	/// Number of stored secrets.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when neither half of the pair is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn get(&self, kind: TokenKind) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.0.read().get(&kind).cloned())
	}

	fn set(&self, kind: TokenKind, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(kind, TokenSecret::new(value));

		Ok(())
	}

	fn remove(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.0.write().remove(&kind);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().clear();

		Ok(())
	}
}
