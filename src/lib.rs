//! Authenticated request gateway for the checklist API: bearer signing, single-flight access
//! token renewal, and queued retries for every request that trips over an expired token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod navigate;
pub mod obs;
pub mod store;
pub mod transport;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenKind,
		config::GatewayConfig,
		gateway::ReqwestGateway,
		navigate::Navigator,
		store::{MemoryStore, TokenStore},
		transport::ReqwestTransport,
	};

	/// Redirect locations captured by [`recording_navigator`].
	pub type RedirectLog = Arc<Mutex<Vec<String>>>;

	/// Builds a navigator that records every redirect it is asked to perform.
	pub fn recording_navigator() -> (Arc<dyn Navigator>, RedirectLog) {
		let log = RedirectLog::default();
		let sink = log.clone();
		let navigator: Arc<dyn Navigator> =
			Arc::new(move |location: &str| sink.lock().push(location.to_owned()));

		(navigator, log)
	}

	/// Seeds a memory store with the provided credential pair.
	pub fn seeded_store(access: Option<&str>, refresh: Option<&str>) -> Arc<MemoryStore> {
		let store = Arc::new(MemoryStore::default());

		if let Some(access) = access {
			store.set(TokenKind::Access, access).expect("Memory store writes never fail.");
		}
		if let Some(refresh) = refresh {
			store.set(TokenKind::Refresh, refresh).expect("Memory store writes never fail.");
		}

		store
	}

	/// Constructs a reqwest-backed [`ReqwestGateway`] pointed at `base_url`, returning the store
	/// and redirect log so tests can inspect side effects.
	pub fn build_reqwest_test_gateway(
		base_url: &str,
		access: Option<&str>,
		refresh: Option<&str>,
	) -> (ReqwestGateway, Arc<MemoryStore>, RedirectLog) {
		let config = GatewayConfig::builder()
			.base_url(Url::parse(base_url).expect("Mock server URL should parse."))
			.build()
			.expect("Gateway config should build for the mock server.");
		let store_backend = seeded_store(access, refresh);
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let (navigator, redirects) = recording_navigator();
		let gateway = ReqwestGateway::with_transport(config, store, ReqwestTransport::default())
			.with_navigator(navigator);

		(gateway, store_backend, redirects)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {checklist_gateway as _, httpmock as _, tokio as _};
