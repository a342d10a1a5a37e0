//! Transport primitives: buffered request/response values and the [`Transport`] seam.
//!
//! The gateway owns the interception logic (signing, renewal, resend) and relies on a
//! [`Transport`] only to move one request over the wire. That keeps the renewal state
//! machine testable with scripted transports and lets downstream crates bring their own
//! HTTP stack. [`ReqwestTransport`] is the built-in implementation.

// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, StatusError, TransportError},
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a single buffered request.
///
/// Implementations must not follow authorization logic of their own: any status code,
/// including 401, is reported back as a successful [`ApiResponse`] so the gateway can
/// classify it. Only failures that produce no response at all map to [`TransportError`].
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the full response body.
	fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

/// Outbound request with a buffered body.
///
/// The retry marker is owned by the gateway: once set, a second authorization failure on the
/// same request is returned to the caller instead of triggering another renewal.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	retry: bool,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None, retry: false }
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Absolute request URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Request headers, including the bearer credential once signed.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Buffered request body, if any.
	pub fn payload(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Returns `true` once the request has been resent after a renewal.
	pub fn is_retry(&self) -> bool {
		self.retry
	}

	/// Returns the `Authorization` header value, if one is attached.
	pub fn authorization(&self) -> Option<&str> {
		self.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
		let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
		let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

		self.headers.insert(header_name, header_value);

		Ok(self)
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let encoded = serde_json::to_vec(body).map_err(Error::Encode)?;

		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(encoded);

		Ok(self)
	}

	pub(crate) fn set_bearer(&mut self, token: &TokenSecret) -> Result<(), ConfigError> {
		let mut value = HeaderValue::from_str(&token.bearer())
			.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

		value.set_sensitive(true);
		self.headers.insert(AUTHORIZATION, value);

		Ok(())
	}

	pub(crate) fn mark_retry(&mut self) {
		self.retry = true;
	}
}

/// Fully buffered response returned by a [`Transport`].
#[derive(Clone, Debug)]
pub struct ApiResponse {
	url: Url,
	status: StatusCode,
	headers: HeaderMap,
	body: Vec<u8>,
}
impl ApiResponse {
	/// Assembles a response from its parts.
	pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
		Self { url, status, headers, body: body.into() }
	}

	/// URL the response was received from.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// HTTP status code.
	pub fn status(&self) -> StatusCode {
		self.status
	}

	/// Response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Raw body bytes.
	pub fn bytes(&self) -> &[u8] {
		&self.body
	}

	/// Lossy UTF-8 body.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing field path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { url: self.url.to_string(), source })
	}

	/// Returns `true` for statuses the gateway hands back as successes (1xx-3xx).
	pub fn is_success(&self) -> bool {
		!(self.status.is_client_error() || self.status.is_server_error())
	}

	pub(crate) fn into_status_error(self, method: &Method) -> StatusError {
		StatusError {
			method: method.to_string(),
			url: self.url.to_string(),
			status: self.status.as_u16(),
			body: self.body,
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client honouring the configured request timeout.
	pub fn from_config(config: &crate::config::GatewayConfig) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder();

		if let Some(timeout) = config.timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self(builder.build()?))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let url = request.url();
			let mut builder = self
				.0
				.request(request.method().clone(), url.clone())
				.headers(request.headers().clone());

			if let Some(body) = request.payload() {
				builder = builder.body(body.to_vec());
			}

			let response =
				builder.send().await.map_err(|e| TransportError::network(url, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| TransportError::network(url, e))?;

			Ok(ApiResponse::new(url.clone(), status, headers, body.to_vec()))
		})
	}
}
