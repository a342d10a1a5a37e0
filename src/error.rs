//! Gateway-level error types shared across the transport, store, and renewal layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) on a regular request.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream answered with a non-success status.
	///
	/// A 401 surfaces here only when recovery is not allowed: the request was already resent
	/// once, or it targeted the renewal endpoint itself.
	#[error(transparent)]
	Status(#[from] StatusError),
	/// Access-token renewal failed; every request queued on the same renewal sees this value.
	#[error(transparent)]
	Renewal(#[from] RenewalError),
	/// Response body could not be decoded into the requested type.
	#[error("Response body from {url} could not be decoded.")]
	Decode {
		/// Request URL whose response failed to decode.
		url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request body could not be encoded as JSON.
	#[error("Request body could not be encoded as JSON.")]
	Encode(#[source] serde_json::Error),
}
impl Error {
	/// Returns the HTTP status code carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status(err) => Some(err.status),
			Self::Renewal(RenewalError::Rejected { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when the error is an authorization failure (HTTP 401).
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Status(err) if err.is_unauthorized())
	}
}

/// Configuration and validation failures raised while building a gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL or request path cannot be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than `http` or `https`.
	#[error("Base URL scheme `{scheme}` is not supported.")]
	UnsupportedScheme {
		/// Rejected scheme.
		scheme: String,
	},
	/// Base URL cannot have paths joined onto it (e.g. `mailto:`).
	#[error("Base URL `{value}` cannot be used as a base.")]
	CannotBeABase {
		/// Offending base URL.
		value: String,
	},
	/// Header name or value is malformed.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name as supplied by the caller.
		name: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Request URL.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}
}

/// Non-success HTTP response, passed back to the caller unchanged.
#[derive(Clone, Debug, ThisError)]
#[error("{method} {url} returned HTTP {status}.")]
pub struct StatusError {
	/// HTTP method of the failed request.
	pub method: String,
	/// Request URL.
	pub url: String,
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl StatusError {
	/// Returns `true` for HTTP 401.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Lossy UTF-8 view of the response body.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Renewal failures broadcast to the initiating request and every queued waiter.
///
/// Values are cloned once per waiter, so sources are flattened into messages.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RenewalError {
	/// No refresh token is stored; the renewal endpoint was never contacted.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// Renewal endpoint rejected the refresh token.
	#[error("Renewal endpoint rejected the refresh token with HTTP {status}.")]
	Rejected {
		/// HTTP status returned by the renewal endpoint.
		status: u16,
		/// Lossy UTF-8 response body.
		body: String,
	},
	/// Renewal request never produced a response.
	#[error("Renewal request failed: {message}.")]
	Transport {
		/// Flattened transport error.
		message: String,
	},
	/// Renewal endpoint answered 2xx without a usable `access` token.
	#[error("Renewal response is malformed: {message}.")]
	MalformedResponse {
		/// Flattened decoding error, including the offending field path.
		message: String,
	},
	/// Token store could not be read or written during renewal.
	#[error("Token store failed during renewal: {message}.")]
	Storage {
		/// Flattened store error.
		message: String,
	},
	/// The request driving the renewal was dropped before the renewal settled.
	#[error("Renewal was abandoned before it settled.")]
	Abandoned,
}
impl RenewalError {
	/// Returns `true` when no credential can be trusted anymore and the session must end.
	pub fn invalidates_session(&self) -> bool {
		!matches!(self, Self::MissingRefreshToken | Self::Abandoned)
	}
}
