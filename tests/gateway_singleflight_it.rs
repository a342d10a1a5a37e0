#![cfg(feature = "reqwest")]

// std
use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		mpsc,
	},
	task::Poll,
};
// crates.io
use checklist_gateway::http::{HeaderMap, StatusCode};
use tokio::sync::{Semaphore, oneshot};
// self
use checklist_gateway::{
	_preludet::*,
	auth::{TokenKind, TokenSecret},
	config::GatewayConfig,
	error::{RenewalError, TransportError},
	gateway::{Gateway, RenewalPhase},
	store::{MemoryStore, StoreError, TokenStore},
	transport::{ApiRequest, ApiResponse, Transport, TransportFuture},
};

const REFRESH: &str = "/api/token/refresh/";

#[derive(Clone, Debug)]
enum RenewalScript {
	Grant(&'static str),
	/// Issues a token the protected routes keep refusing.
	GrantUnaccepted(&'static str),
	Reject(u16),
}

/// In-process API: protected routes accept exactly one access token, and the renewal route
/// blocks on `gate` so tests decide when the renewal settles.
struct ScriptedTransport {
	valid_access: Mutex<String>,
	renewal: Mutex<RenewalScript>,
	gate: Semaphore,
	renewal_calls: AtomicUsize,
	protected_calls: Mutex<Vec<(String, Option<String>)>>,
}
impl ScriptedTransport {
	fn new(valid_access: &str, renewal: RenewalScript, permits: usize) -> Arc<Self> {
		Arc::new(Self {
			valid_access: Mutex::new(valid_access.to_owned()),
			renewal: Mutex::new(renewal),
			gate: Semaphore::new(permits),
			renewal_calls: AtomicUsize::new(0),
			protected_calls: Default::default(),
		})
	}

	fn renewal_calls(&self) -> usize {
		self.renewal_calls.load(Ordering::SeqCst)
	}

	fn respond(request: &ApiRequest, status: StatusCode, body: String) -> ApiResponse {
		ApiResponse::new(request.url().clone(), status, HeaderMap::new(), body.into_bytes())
	}
}
impl Transport for ScriptedTransport {
	fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let path = request.url().path().to_owned();

			if path == REFRESH {
				self.renewal_calls.fetch_add(1, Ordering::SeqCst);

				let _permit = self.gate.acquire().await.map_err(|_| {
					TransportError::Io(std::io::Error::other("Renewal gate closed."))
				})?;
				let script = self.renewal.lock().clone();

				return Ok(match script {
					RenewalScript::Grant(token) => {
						*self.valid_access.lock() = token.to_owned();

						let body = format!("{{\"access\":\"{token}\"}}");

						Self::respond(request, StatusCode::OK, body)
					},
					RenewalScript::GrantUnaccepted(token) => Self::respond(
						request,
						StatusCode::OK,
						format!("{{\"access\":\"{token}\"}}"),
					),
					RenewalScript::Reject(status) => Self::respond(
						request,
						StatusCode::from_u16(status).expect("Scripted status should be valid."),
						"{\"detail\":\"Token is invalid or expired\"}".into(),
					),
				});
			}

			let authorization = request.authorization().map(str::to_owned);

			self.protected_calls.lock().push((path.clone(), authorization.clone()));

			let expected = format!("Bearer {}", self.valid_access.lock());

			if authorization.as_deref() == Some(expected.as_str()) {
				Ok(Self::respond(request, StatusCode::OK, format!("{{\"path\":\"{path}\"}}")))
			} else {
				Ok(Self::respond(request, StatusCode::UNAUTHORIZED, String::new()))
			}
		})
	}
}

/// Memory store whose writes always fail; removals still work so a wipe can succeed.
struct ReadOnlyStore(Arc<MemoryStore>);
impl TokenStore for ReadOnlyStore {
	fn get(&self, kind: TokenKind) -> Result<Option<TokenSecret>, StoreError> {
		self.0.get(kind)
	}

	fn set(&self, _kind: TokenKind, _value: &str) -> Result<(), StoreError> {
		Err(StoreError::Backend { message: "disk full".into() })
	}

	fn remove(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.0.remove(kind)
	}
}

/// Memory store that parks the first refresh-token read until the test releases it.
struct ParkedRefreshStore {
	inner: Arc<MemoryStore>,
	entered: Mutex<Option<oneshot::Sender<()>>>,
	release: Mutex<mpsc::Receiver<()>>,
}
impl TokenStore for ParkedRefreshStore {
	fn get(&self, kind: TokenKind) -> Result<Option<TokenSecret>, StoreError> {
		if kind == TokenKind::Refresh {
			let entered = self.entered.lock().take();

			if let Some(entered) = entered {
				let _ = entered.send(());
				let _ = self.release.lock().recv();
			}
		}

		self.inner.get(kind)
	}

	fn set(&self, kind: TokenKind, value: &str) -> Result<(), StoreError> {
		self.inner.set(kind, value)
	}

	fn remove(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.inner.remove(kind)
	}
}

fn build_gateway_with_store(
	transport: &Arc<ScriptedTransport>,
	store: Arc<dyn TokenStore>,
) -> (Gateway<ScriptedTransport>, RedirectLog) {
	let config = GatewayConfig::builder()
		.base_url(Url::parse("http://checklist.test").expect("Static URL should parse."))
		.build()
		.expect("Gateway config should build.");
	let (navigator, redirects) = recording_navigator();
	let gateway = Gateway::<ScriptedTransport>::with_transport(config, store, transport.clone())
		.with_navigator(navigator);

	(gateway, redirects)
}

fn build_gateway(
	transport: &Arc<ScriptedTransport>,
	access: Option<&str>,
	refresh: Option<&str>,
) -> (Gateway<ScriptedTransport>, Arc<MemoryStore>, RedirectLog) {
	let store = seeded_store(access, refresh);
	let (gateway, redirects) = build_gateway_with_store(transport, store.clone());

	(gateway, store, redirects)
}

async fn release_when_queued(
	gateway: &Gateway<ScriptedTransport>,
	transport: &ScriptedTransport,
	waiters: usize,
) {
	while gateway.renewal_state().waiters < waiters {
		tokio::task::yield_now().await;
	}

	transport.gate.add_permits(1);
}

fn path_of(response: &ApiResponse) -> String {
	let body: serde_json::Value = response.json().expect("Scripted body should decode.");

	body["path"].as_str().expect("Scripted body should carry the path.").to_owned()
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_renewal() {
	let transport =
		ScriptedTransport::new("access-fresh", RenewalScript::Grant("access-fresh"), 0);
	let (gateway, store, redirects) =
		build_gateway(&transport, Some("access-stale"), Some("refresh-1"));
	let (a, b, c, ()) = tokio::join!(
		gateway.get("/api/notes/"),
		gateway.get("/api/categories/"),
		gateway.get("/api/user/"),
		release_when_queued(&gateway, &transport, 2),
	);

	assert_eq!(path_of(&a.expect("Leader request should succeed.")), "/api/notes/");
	assert_eq!(path_of(&b.expect("First waiter should succeed.")), "/api/categories/");
	assert_eq!(path_of(&c.expect("Second waiter should succeed.")), "/api/user/");
	assert_eq!(transport.renewal_calls(), 1);

	let calls = transport.protected_calls.lock().clone();
	let resent: Vec<_> = calls
		.iter()
		.filter(|(_, auth)| auth.as_deref() == Some("Bearer access-fresh"))
		.map(|(path, _)| path.as_str())
		.collect();

	assert_eq!(calls.len(), 6);
	assert_eq!(resent.len(), 3);

	let state = gateway.renewal_state();

	assert_eq!(state.phase, RenewalPhase::Idle);
	assert_eq!(state.waiters, 0);
	assert_eq!(state.cycles, 1);
	assert_eq!(gateway.renewal_metrics.queued(), 2);
	assert_eq!(gateway.renewal_metrics.network_calls(), 1);

	let access = store.get(TokenKind::Access).expect("Memory store reads never fail.");

	assert_eq!(access.as_ref().map(|secret| secret.expose()), Some("access-fresh"));
	assert!(redirects.lock().is_empty());
}

#[tokio::test]
async fn waiters_receive_the_renewal_failure() {
	let transport = ScriptedTransport::new("access-fresh", RenewalScript::Reject(401), 0);
	let (gateway, store, redirects) =
		build_gateway(&transport, Some("access-stale"), Some("refresh-expired"));
	let (a, b, ()) = tokio::join!(
		gateway.get("/api/notes/"),
		gateway.get("/api/categories/"),
		release_when_queued(&gateway, &transport, 1),
	);

	for result in [a, b] {
		let err = result.expect_err("Every request should observe the renewal failure.");

		assert!(matches!(err, Error::Renewal(RenewalError::Rejected { status: 401, .. })));
	}

	assert_eq!(transport.renewal_calls(), 1);
	assert!(store.is_empty());
	assert_eq!(*redirects.lock(), vec!["/login".to_owned()]);
	assert!(!gateway.renewal_state().renewing());
}

#[tokio::test]
async fn missing_refresh_token_never_contacts_the_renewal_endpoint() {
	let transport =
		ScriptedTransport::new("access-fresh", RenewalScript::Grant("access-fresh"), 8);
	let (gateway, _store, redirects) = build_gateway(&transport, Some("access-stale"), None);
	let (a, b) = tokio::join!(gateway.get("/api/notes/"), gateway.get("/api/categories/"));

	for result in [a, b] {
		let err = result.expect_err("Renewal without a refresh token must fail.");

		assert!(matches!(err, Error::Renewal(RenewalError::MissingRefreshToken)));
	}

	assert_eq!(transport.renewal_calls(), 0);
	assert_eq!(gateway.renewal_metrics.network_calls(), 0);
	assert!(redirects.lock().is_empty());
	assert_eq!(gateway.renewal_state().phase, RenewalPhase::Idle);
}

#[tokio::test]
async fn failures_after_settlement_start_a_new_cycle() {
	let transport = ScriptedTransport::new("access-1", RenewalScript::Grant("access-1"), 8);
	let (gateway, _store, _redirects) =
		build_gateway(&transport, Some("access-0"), Some("refresh-1"));

	gateway.get("/api/notes/").await.expect("First renewal should succeed.");

	*transport.renewal.lock() = RenewalScript::Grant("access-2");
	*transport.valid_access.lock() = "access-2".to_owned();

	gateway.get("/api/notes/").await.expect("Second renewal should succeed.");

	assert_eq!(transport.renewal_calls(), 2);
	assert_eq!(gateway.renewal_state().cycles, 2);
	assert_eq!(gateway.renewal_metrics.successes(), 2);
}

#[tokio::test]
async fn dropping_the_leader_releases_waiters() {
	let transport =
		ScriptedTransport::new("access-fresh", RenewalScript::Grant("access-fresh"), 0);
	let (gateway, _store, redirects) =
		build_gateway(&transport, Some("access-stale"), Some("refresh-1"));
	let mut leader = Box::pin(gateway.get("/api/notes/"));

	assert!(matches!(futures::poll!(leader.as_mut()), Poll::Pending));
	assert_eq!(gateway.renewal_state().phase, RenewalPhase::Renewing);

	let mut waiter = Box::pin(gateway.get("/api/categories/"));

	assert!(matches!(futures::poll!(waiter.as_mut()), Poll::Pending));
	assert_eq!(gateway.renewal_state().waiters, 1);

	drop(leader);

	let err = waiter.await.expect_err("Waiters should be released when the leader is dropped.");

	assert!(matches!(err, Error::Renewal(RenewalError::Abandoned)));
	assert!(!gateway.renewal_state().renewing());
	assert!(redirects.lock().is_empty());
}

#[tokio::test]
async fn waiter_resend_rejected_again_is_terminal() {
	let transport =
		ScriptedTransport::new("access-accepted", RenewalScript::GrantUnaccepted("access-new"), 0);
	let (gateway, store, redirects) =
		build_gateway(&transport, Some("access-stale"), Some("refresh-1"));
	let (a, b, ()) = tokio::join!(
		gateway.get("/api/notes/"),
		gateway.get("/api/categories/"),
		release_when_queued(&gateway, &transport, 1),
	);

	for result in [a, b] {
		let err = result.expect_err("A 401 on the resend should reach the caller.");

		assert!(err.is_unauthorized());
	}

	let calls = transport.protected_calls.lock().clone();
	let resent = calls
		.iter()
		.filter(|(_, auth)| auth.as_deref() == Some("Bearer access-new"))
		.count();

	assert_eq!(calls.len(), 4);
	assert_eq!(resent, 2);
	assert_eq!(transport.renewal_calls(), 1);
	assert_eq!(gateway.renewal_state().cycles, 1);
	assert_eq!(gateway.renewal_metrics.queued(), 1);

	let access = store.get(TokenKind::Access).expect("Memory store reads never fail.");

	assert_eq!(access.as_ref().map(|secret| secret.expose()), Some("access-new"));
	assert!(redirects.lock().is_empty());
}

#[tokio::test]
async fn store_failure_during_renewal_fails_closed() {
	let transport = ScriptedTransport::new("access-fresh", RenewalScript::Grant("access-fresh"), 8);
	let backend = seeded_store(Some("access-stale"), Some("refresh-1"));
	let (gateway, redirects) =
		build_gateway_with_store(&transport, Arc::new(ReadOnlyStore(backend.clone())));
	let err = gateway.get("/api/notes/").await.expect_err("Unpersisted renewal should fail.");

	match &err {
		Error::Renewal(RenewalError::Storage { message }) =>
			assert!(message.contains("disk full"), "Unexpected message: {message}"),
		other => panic!("Unexpected error: {other:?}"),
	}

	assert_eq!(transport.renewal_calls(), 1);
	assert!(backend.is_empty());
	assert_eq!(*redirects.lock(), vec!["/login".to_owned()]);
	assert_eq!(gateway.renewal_metrics.failures(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_waiter_observes_missing_refresh_token() {
	let transport = ScriptedTransport::new("access-fresh", RenewalScript::Grant("access-fresh"), 8);
	let (entered_tx, entered_rx) = oneshot::channel();
	let (release_tx, release_rx) = mpsc::channel();
	let backend = seeded_store(Some("access-stale"), None);
	let store = ParkedRefreshStore {
		inner: backend.clone(),
		entered: Mutex::new(Some(entered_tx)),
		release: Mutex::new(release_rx),
	};
	let (gateway, redirects) = build_gateway_with_store(&transport, Arc::new(store));
	let leader = tokio::spawn({
		let gateway = gateway.clone();

		async move { gateway.get("/api/notes/").await }
	});

	entered_rx.await.expect("Leader should reach the refresh-token read.");

	assert_eq!(gateway.renewal_state().phase, RenewalPhase::Renewing);

	let (waiter, ()) = tokio::join!(gateway.get("/api/categories/"), async {
		while gateway.renewal_state().waiters < 1 {
			tokio::task::yield_now().await;
		}

		release_tx.send(()).expect("Parked store should still be listening.");
	});
	let leader = leader.await.expect("Leader task should not panic.");

	for result in [leader, waiter] {
		let err = result.expect_err("Every request should observe the missing refresh token.");

		assert!(matches!(err, Error::Renewal(RenewalError::MissingRefreshToken)));
	}

	assert_eq!(transport.renewal_calls(), 0);
	assert_eq!(gateway.renewal_metrics.queued(), 1);
	assert_eq!(backend.len(), 1);
	assert!(redirects.lock().is_empty());
	assert!(!gateway.renewal_state().renewing());
}
