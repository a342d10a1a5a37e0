//! The authenticated request gateway.
//!
//! Every request is signed with the stored access token. When the API answers 401 the
//! gateway renews the access token once (single-flight) and resends each affected request
//! exactly once with the new token, so callers only see the failure when renewal is
//! impossible. If the renewal endpoint rejects the refresh token the stored credentials are
//! wiped and the [`Navigator`] is sent to the login entry point.

mod metrics;
pub mod renewal;

pub use metrics::*;
pub use renewal::*;

// crates.io
use http::Method;
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenKind, TokenSecret},
	config::GatewayConfig,
	error::{RenewalError, StatusError},
	navigate::{Navigator, NullNavigator},
	obs::{self, GatewaySpan, OperationKind, OperationOutcome, event},
	store::TokenStore,
	transport::{ApiRequest, ApiResponse, Transport},
};
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestTransport>;

#[derive(Serialize)]
struct RenewalRequest<'a> {
	refresh: &'a str,
}

#[derive(Deserialize)]
struct RenewalGrant {
	access: TokenSecret,
	#[serde(default)]
	refresh: Option<TokenSecret>,
}

#[derive(Serialize)]
struct AccountForm<'a> {
	username: &'a str,
	password: &'a str,
}

/// Signs outbound API requests and recovers from expired access tokens.
///
/// Clones share the token store, the renewal coordinator, and the metrics, so one session is
/// one gateway plus however many clones the application hands out.
pub struct Gateway<T>
where
	T: ?Sized + Transport,
{
	/// Transport used for every outbound request, including renewal.
	pub transport: Arc<T>,
	/// Persistent credential storage.
	pub store: Arc<dyn TokenStore>,
	/// Collaborator that performs the redirect once the session is unrecoverable.
	pub navigator: Arc<dyn Navigator>,
	/// Endpoint configuration.
	pub config: GatewayConfig,
	/// Shared counters for renewal cycles.
	pub renewal_metrics: Arc<RenewalMetrics>,
	renewal: Arc<RenewalCoordinator>,
}
impl<T> Gateway<T>
where
	T: ?Sized + Transport,
{
	/// Creates a gateway around a caller-provided transport.
	pub fn with_transport(
		config: GatewayConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			navigator: Arc::new(NullNavigator),
			config,
			renewal_metrics: Default::default(),
			renewal: Default::default(),
		}
	}

	/// Sets or replaces the navigator used after an unrecoverable renewal failure.
	pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = navigator;

		self
	}

	/// Returns the current renewal state.
	pub fn renewal_state(&self) -> RenewalSnapshot {
		self.renewal.snapshot()
	}

	/// Builds a request for `path`, resolved against the base endpoint.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.config.endpoint(path)?))
	}

	/// Sends a signed `GET`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.execute(self.request(Method::GET, path)?).await
	}

	/// Sends a signed `DELETE`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.execute(self.request(Method::DELETE, path)?).await
	}

	/// Sends a signed `POST` with a JSON body.
	pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize + Sync,
	{
		self.execute(self.request(Method::POST, path)?.json(body)?).await
	}

	/// Sends a signed `PUT` with a JSON body.
	pub async fn put_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize + Sync,
	{
		self.execute(self.request(Method::PUT, path)?.json(body)?).await
	}

	/// Sends a signed `PATCH` with a JSON body.
	pub async fn patch_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize + Sync,
	{
		self.execute(self.request(Method::PATCH, path)?.json(body)?).await
	}

	/// Signs and sends `request`, renewing the access token and resending once on HTTP 401.
	///
	/// Non-401 failures are returned unchanged. A 401 is also returned unchanged when the
	/// request was already resent or targets the renewal endpoint.
	pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Request;

		let span = GatewaySpan::new(KIND, "execute");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut request = request;

				if let Some(token) = self.store.get(TokenKind::Access)? {
					request.set_bearer(&token)?;
				}

				match self.dispatch(&request).await {
					Err(Error::Status(failure)) if failure.is_unauthorized() =>
						self.recover(request, failure).await,
					other => other,
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	/// Exchanges account credentials for a credential pair and stores it.
	///
	/// The login call bypasses signing and renewal; a rejected login is returned as-is.
	pub async fn login(&self, username: &str, password: &str) -> Result<CredentialPair> {
		const KIND: OperationKind = OperationKind::Login;

		let span = GatewaySpan::new(KIND, "login");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = self
					.request(Method::POST, &self.config.login_path)?
					.json(&AccountForm { username, password })?;
				let pair: CredentialPair = self.dispatch(&request).await?.json()?;

				self.store.save_pair(&pair)?;

				event!(info, "Stored credential pair after login.");

				Ok(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	/// Creates an account. Any stored credential pair is cleared first and nothing is stored
	/// afterwards; call [`Gateway::login`] to start a session.
	pub async fn register(&self, username: &str, password: &str) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Register;

		let span = GatewaySpan::new(KIND, "register");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.store.clear()?;

				let request = self
					.request(Method::POST, &self.config.register_path)?
					.json(&AccountForm { username, password })?;

				self.dispatch(&request).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	/// Destroys the credential pair.
	pub fn logout(&self) -> Result<()> {
		self.store.clear()?;

		event!(info, "Cleared credential pair on logout.");

		Ok(())
	}

	/// Returns `true` when an access token is stored.
	pub fn is_authenticated(&self) -> Result<bool> {
		Ok(self.store.get(TokenKind::Access)?.is_some())
	}

	/// Sends a request as-is; non-success statuses become [`Error::Status`].
	async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
		event!(
			debug,
			method = %request.method(),
			url = %request.url(),
			retry = request.is_retry(),
			"Dispatching request."
		);

		let response = self.transport.send(request).await?;

		if response.is_success() {
			return Ok(response);
		}

		event!(
			debug,
			method = %request.method(),
			url = %request.url(),
			status = response.status().as_u16(),
			"Request failed."
		);

		Err(response.into_status_error(request.method()).into())
	}

	async fn recover(&self, mut request: ApiRequest, failure: StatusError) -> Result<ApiResponse> {
		if request.is_retry() || self.config.is_renewal_url(request.url()) {
			return Err(failure.into());
		}

		let token = match self.renewal.enter() {
			RenewalTicket::Wait(waiter) => {
				event!(debug, url = %request.url(), "Renewal in flight; queueing request.");

				waiter.wait().await?
			},
			RenewalTicket::Lead(lease) => {
				request.mark_retry();

				self.renew(lease).await?
			},
		};

		request.mark_retry();
		request.set_bearer(&token)?;

		self.dispatch(&request).await
	}

	async fn renew(&self, mut lease: RenewalLease<'_>) -> Result<TokenSecret, RenewalError> {
		const KIND: OperationKind = OperationKind::Renewal;

		let span = GatewaySpan::new(KIND, "renew");

		obs::record_outcome(KIND, OperationOutcome::Attempt);
		self.renewal_metrics.record_attempt();

		let outcome = span.instrument(self.request_new_access_token()).await;

		lease.settling();

		let invalidated = matches!(&outcome, Err(err) if err.invalidates_session());

		if invalidated {
			self.wipe_credentials();
		}

		let waiters = lease.settle(&outcome);

		self.renewal_metrics.record_queued(waiters);
		obs::record_renewal_waiters(waiters);

		match &outcome {
			Ok(_) => {
				event!(debug, waiters, "Access token renewed.");

				self.renewal_metrics.record_success();
				obs::record_outcome(KIND, OperationOutcome::Success);
			},
			Err(_err) => {
				event!(warn, waiters, error = %_err, "Access token renewal failed.");

				self.renewal_metrics.record_failure();
				obs::record_outcome(KIND, OperationOutcome::Failure);
			},
		}

		if invalidated {
			self.navigator.redirect(&self.config.login_redirect);
		}

		outcome
	}

	/// Performs the renewal round-trip directly on the transport, bypassing interception.
	async fn request_new_access_token(&self) -> Result<TokenSecret, RenewalError> {
		let refresh = self
			.store
			.get(TokenKind::Refresh)
			.map_err(|e| RenewalError::Storage { message: e.to_string() })?
			.ok_or(RenewalError::MissingRefreshToken)?;
		let url = self
			.config
			.renewal_url()
			.map_err(|e| RenewalError::Transport { message: e.to_string() })?;
		let request = ApiRequest::new(Method::POST, url)
			.json(&RenewalRequest { refresh: refresh.expose() })
			.map_err(|e| RenewalError::Transport { message: e.to_string() })?;

		self.renewal_metrics.record_network_call();

		let response = self
			.transport
			.send(&request)
			.await
			.map_err(|e| RenewalError::Transport { message: e.to_string() })?;

		if !response.status().is_success() {
			return Err(RenewalError::Rejected {
				status: response.status().as_u16(),
				body: response.text(),
			});
		}

		let mut de = serde_json::Deserializer::from_slice(response.bytes());
		let grant: RenewalGrant = serde_path_to_error::deserialize(&mut de)
			.map_err(|e| RenewalError::MalformedResponse { message: e.to_string() })?;
		let persist = |kind: TokenKind, secret: &TokenSecret| {
			self.store
				.set(kind, secret.expose())
				.map_err(|e| RenewalError::Storage { message: e.to_string() })
		};

		persist(TokenKind::Access, &grant.access)?;

		if let Some(refresh) = &grant.refresh {
			persist(TokenKind::Refresh, refresh)?;
		}

		Ok(grant.access)
	}

	fn wipe_credentials(&self) {
		if let Err(_err) = self.store.clear() {
			event!(error, error = %_err, "Failed to clear credentials after renewal failure.");
		}
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestTransport> {
	/// Creates a gateway backed by a reqwest client built from `config`.
	pub fn new(config: GatewayConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let transport = ReqwestTransport::from_config(&config)?;

		Ok(Self::with_transport(config, store, transport))
	}
}
impl<T> Clone for Gateway<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			navigator: self.navigator.clone(),
			config: self.config.clone(),
			renewal_metrics: self.renewal_metrics.clone(),
			renewal: self.renewal.clone(),
		}
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("renewal", &self.renewal.snapshot())
			.finish()
	}
}
