//! Gateway configuration: base endpoint, well-known API paths, and transport knobs.

// std
use std::{env, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError};

/// Environment variable naming the API base endpoint.
pub const BASE_URL_ENV: &str = "CHECKLIST_API_URL";
/// Base endpoint baked in at build time, falling back to the local development server.
pub const DEFAULT_BASE_URL: &str = match option_env!("CHECKLIST_API_URL") {
	Some(url) => url,
	None => "http://127.0.0.1:8000",
};
/// Renewal endpoint path.
pub const DEFAULT_RENEWAL_PATH: &str = "/api/token/refresh/";
/// Login (token pair issuance) endpoint path.
pub const DEFAULT_LOGIN_PATH: &str = "/api/token/";
/// Account registration endpoint path.
pub const DEFAULT_REGISTER_PATH: &str = "/api/user/register/";
/// Location the navigator is sent to once no credential remains valid.
pub const DEFAULT_LOGIN_REDIRECT: &str = "/login";

/// Immutable gateway configuration; build one with [`GatewayConfig::builder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
	/// Base endpoint every relative request path is joined onto.
	pub base_url: Url,
	/// Path of the access-token renewal endpoint.
	pub renewal_path: String,
	/// Path of the login endpoint that issues a credential pair.
	pub login_path: String,
	/// Path of the registration endpoint.
	pub register_path: String,
	/// Navigation target used after an unrecoverable renewal failure.
	pub login_redirect: String,
	/// Optional per-request timeout applied by the built-in transport.
	pub timeout: Option<StdDuration>,
}
impl GatewayConfig {
	/// Returns a builder seeded with the default paths and base endpoint.
	pub fn builder() -> GatewayConfigBuilder {
		GatewayConfigBuilder::default()
	}

	/// Builds a config whose base endpoint honours [`BASE_URL_ENV`] at runtime, falling back to
	/// [`DEFAULT_BASE_URL`].
	pub fn from_env() -> Result<Self, ConfigError> {
		let mut builder = Self::builder();

		if let Ok(raw) = env::var(BASE_URL_ENV) {
			let trimmed = raw.trim();

			if !trimmed.is_empty() {
				builder = builder.base_url(parse_url(trimmed)?);
			}
		}

		builder.build()
	}

	/// Resolves a request path (or absolute URL) against the base endpoint.
	///
	/// Paths are appended to the base path, so a base of `https://host/backend` maps
	/// `/api/notes/` to `https://host/backend/api/notes/`.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		if path.starts_with("http://") || path.starts_with("https://") {
			return parse_url(path);
		}

		let (path, query) = match path.split_once('?') {
			Some((path, query)) => (path, Some(query)),
			None => (path, None),
		};
		let mut url = self.base_url.clone();
		let joined =
			format!("{}/{}", url.path().trim_end_matches('/'), path.trim_start_matches('/'));

		url.set_path(&joined);
		url.set_query(query);

		Ok(url)
	}

	/// Absolute URL of the renewal endpoint.
	pub fn renewal_url(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.renewal_path)
	}

	/// Returns `true` when `url` targets the renewal endpoint, ignoring query and fragment.
	pub fn is_renewal_url(&self, url: &Url) -> bool {
		match self.renewal_url() {
			Ok(renewal) =>
				url.scheme() == renewal.scheme()
					&& url.host_str() == renewal.host_str()
					&& url.port_or_known_default() == renewal.port_or_known_default()
					&& url.path().trim_end_matches('/') == renewal.path().trim_end_matches('/'),
			Err(_) => false,
		}
	}
}
/// Builder for [`GatewayConfig`] that validates the base endpoint.
#[derive(Clone, Debug)]
pub struct GatewayConfigBuilder {
	base_url: Option<Url>,
	renewal_path: String,
	login_path: String,
	register_path: String,
	login_redirect: String,
	timeout: Option<StdDuration>,
}
impl GatewayConfigBuilder {
	/// Overrides the base endpoint (defaults to [`DEFAULT_BASE_URL`]).
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Overrides the renewal endpoint path.
	pub fn renewal_path(mut self, path: impl Into<String>) -> Self {
		self.renewal_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the registration endpoint path.
	pub fn register_path(mut self, path: impl Into<String>) -> Self {
		self.register_path = path.into();

		self
	}

	/// Overrides the redirect target used when the session cannot be recovered.
	pub fn login_redirect(mut self, location: impl Into<String>) -> Self {
		self.login_redirect = location.into();

		self
	}

	/// Sets a per-request timeout for the built-in transport.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		let base_url = match self.base_url {
			Some(url) => url,
			None => parse_url(DEFAULT_BASE_URL)?,
		};

		if !matches!(base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { scheme: base_url.scheme().into() });
		}
		if base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase { value: base_url.to_string() });
		}

		let config = GatewayConfig {
			base_url,
			renewal_path: self.renewal_path,
			login_path: self.login_path,
			register_path: self.register_path,
			login_redirect: self.login_redirect,
			timeout: self.timeout,
		};

		config.renewal_url()?;

		Ok(config)
	}
}
impl Default for GatewayConfigBuilder {
	fn default() -> Self {
		Self {
			base_url: None,
			renewal_path: DEFAULT_RENEWAL_PATH.into(),
			login_path: DEFAULT_LOGIN_PATH.into(),
			register_path: DEFAULT_REGISTER_PATH.into(),
			login_redirect: DEFAULT_LOGIN_REDIRECT.into(),
			timeout: None,
		}
	}
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUrl { value: value.into(), source })
}
