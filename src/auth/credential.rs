//! Access/refresh credential pair and the fixed names each half is stored under.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Which half of the credential pair a stored value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Short-lived bearer credential attached to every API request.
	Access,
	/// Longer-lived credential used only against the renewal endpoint.
	Refresh,
}
impl TokenKind {
	/// Both kinds, in the order they are cleared.
	pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

	/// Fixed storage key for this kind.
	pub const fn storage_key(self) -> &'static str {
		match self {
			TokenKind::Access => "access",
			TokenKind::Refresh => "refresh",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.storage_key())
	}
}

/// Credential pair issued by the login endpoint.
///
/// The wire shape is `{ "access": .., "refresh": .. }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Access token.
	pub access: TokenSecret,
	/// Refresh token.
	pub refresh: TokenSecret,
}
impl CredentialPair {
	/// Builds a pair from raw token strings.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self { access: TokenSecret::new(access), refresh: TokenSecret::new(refresh) }
	}

	/// Returns the secret stored under `kind`.
	pub fn get(&self, kind: TokenKind) -> &TokenSecret {
		match kind {
			TokenKind::Access => &self.access,
			TokenKind::Refresh => &self.refresh,
		}
	}
}
