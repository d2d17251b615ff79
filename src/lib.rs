//! Signed request dispatch engine: OAuth 1.0 and MAC-token signing, transparent redirect
//! following, `Retry-After` backoff, and one-shot token refresh behind a single completion
//! callback.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod callback;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod request;
pub mod session;
pub mod sign;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
	// self
	use crate::{
		auth::{OAuthScheme, TokenBundle},
		callback::{Callback, DispatchResult, RedirectObserver, RetryBudget, RetryFuture},
		dispatch::Dispatcher,
		error::TransportError,
		http::{HeaderList, HttpTransport, RawResponse, ReqwestTransport, TransportFuture},
		session::{Session, SessionConfig},
		sign::SignedRequest,
	};

	/// Terminal delivery captured by [`ChannelCallback`].
	#[derive(Debug)]
	pub enum Delivery {
		/// `Callback::done` fired.
		Done(DispatchResult),
		/// `Callback::unsent` fired.
		Unsent(Error),
	}
	impl Delivery {
		/// Unwraps a `done` delivery, panicking on `unsent`.
		pub fn expect_done(self) -> DispatchResult {
			match self {
				Self::Done(result) => result,
				Self::Unsent(err) => panic!("Expected a done delivery but got unsent: {err}."),
			}
		}

		/// Unwraps an `unsent` delivery, panicking on `done`.
		pub fn expect_unsent(self) -> Error {
			match self {
				Self::Unsent(err) => err,
				Self::Done(result) =>
					panic!("Expected an unsent delivery but got status {}.", result.status),
			}
		}
	}

	/// Callback that forwards every terminal delivery into an unbounded channel and accepts
	/// (or rejects) retries without sleeping.
	pub struct ChannelCallback {
		tx: UnboundedSender<Delivery>,
		budget: RetryBudget,
		accept_retries: bool,
		requested_delays: Mutex<Vec<Duration>>,
	}
	impl ChannelCallback {
		/// Creates a callback that accepts retries with the provided budget.
		pub fn new(retries: u32) -> (Arc<Self>, UnboundedReceiver<Delivery>) {
			Self::build(retries, true)
		}

		/// Creates a callback whose retry hook always declines.
		pub fn declining(retries: u32) -> (Arc<Self>, UnboundedReceiver<Delivery>) {
			Self::build(retries, false)
		}

		fn build(retries: u32, accept_retries: bool) -> (Arc<Self>, UnboundedReceiver<Delivery>) {
			let (tx, rx) = mpsc::unbounded_channel();
			let callback = Self {
				tx,
				budget: RetryBudget::new(retries),
				accept_retries,
				requested_delays: Mutex::new(Vec::new()),
			};

			(Arc::new(callback), rx)
		}

		/// Delays proposed to the retry hook so far.
		pub fn requested_delays(&self) -> Vec<Duration> {
			self.requested_delays.lock().clone()
		}
	}
	impl Callback for ChannelCallback {
		fn done(&self, result: DispatchResult) {
			let _ = self.tx.send(Delivery::Done(result));
		}

		fn unsent(&self, error: Error) {
			let _ = self.tx.send(Delivery::Unsent(error));
		}

		fn retry(&self, delay: Duration) -> RetryFuture<'_> {
			self.requested_delays.lock().push(delay);

			let accept = self.accept_retries;

			Box::pin(async move { accept })
		}

		fn retry_budget(&self) -> &RetryBudget {
			&self.budget
		}
	}

	/// Waits for the next delivery, failing the test after ten seconds.
	pub async fn next_delivery(rx: &mut UnboundedReceiver<Delivery>) -> Delivery {
		tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
			.await
			.expect("Timed out waiting for a terminal delivery.")
			.expect("Delivery channel closed before a terminal delivery.")
	}

	/// Redirect observer that records `(old_url, new_url)` pairs.
	#[derive(Debug, Default)]
	pub struct RecordingObserver {
		events: Mutex<Vec<(Url, Url)>>,
	}
	impl RecordingObserver {
		/// Recorded redirect hops in order.
		pub fn events(&self) -> Vec<(Url, Url)> {
			self.events.lock().clone()
		}
	}
	impl RedirectObserver for RecordingObserver {
		fn redirected(&self, old_url: &Url, _headers: &[(String, String)], _body: &str, new_url: &Url) {
			self.events.lock().push((old_url.clone(), new_url.clone()));
		}
	}

	type Script = dyn Fn(&SignedRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync;

	/// In-process transport that answers every request from a closure and records what it saw.
	pub struct ScriptedTransport {
		script: Box<Script>,
		calls: AtomicUsize,
		seen: Mutex<Vec<SignedRequest>>,
	}
	impl ScriptedTransport {
		/// Wraps a closure receiving the signed request and the zero-based call index.
		pub fn new(
			script: impl Fn(&SignedRequest, usize) -> Result<RawResponse, TransportError>
			+ 'static
			+ Send
			+ Sync,
		) -> Arc<Self> {
			Arc::new(Self {
				script: Box::new(script),
				calls: AtomicUsize::new(0),
				seen: Mutex::new(Vec::new()),
			})
		}

		/// Every request executed so far, in order.
		pub fn requests(&self) -> Vec<SignedRequest> {
			self.seen.lock().clone()
		}

		/// Number of executed requests whose path equals `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.seen.lock().iter().filter(|request| request.url.path() == path).count()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a> {
			let index = self.calls.fetch_add(1, Ordering::SeqCst);

			self.seen.lock().push(request.clone());

			let outcome = (self.script)(request, index);

			Box::pin(async move { outcome })
		}
	}

	/// Builds a response with the provided status, headers, and UTF-8 body.
	pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> RawResponse {
		let headers: HeaderList =
			headers.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect();

		RawResponse { status, headers, body: body.as_bytes().to_vec() }
	}

	/// Session fixture for the requested scheme.
	pub fn test_session(scheme: OAuthScheme) -> Session {
		let config = SessionConfig {
			api_key: "test-key".into(),
			api_secret: "test-secret".into(),
			app_name: Some("dispatch-tests".into()),
			user_object_name: "user".into(),
			api_version: 0,
			scheme,
			https_override: None,
			user_agent: None,
		};

		Session::new(config).expect("Session fixture should be valid.")
	}

	/// Token bundle fixture whose access token expires `expires_in` from now.
	pub fn test_tokens(access: &str, refresh: Option<&str>, expires_in: Duration) -> TokenBundle {
		let mut builder = TokenBundle::builder()
			.access_token(access)
			.mac_key(format!("{access}-mac"))
			.issued_now()
			.expires_in(expires_in);

		if let Some(refresh) = refresh {
			builder = builder.refresh_token(refresh);
		}

		builder.build().expect("Token bundle fixture should build.")
	}

	/// Builds a dispatcher over the reqwest transport pointed at `host`.
	pub fn build_test_dispatcher(session: Arc<Session>, host: &str) -> Dispatcher {
		let transport =
			ReqwestTransport::new().expect("Failed to build reqwest transport for tests.");

		Dispatcher::builder(session)
			.transport(Arc::new(transport))
			.default_host(host)
			.build()
			.expect("Dispatcher should build inside a tokio runtime.")
	}

	/// Builds a dispatcher over an arbitrary transport with the provided observer.
	pub fn build_scripted_dispatcher(
		session: Arc<Session>,
		transport: Arc<dyn HttpTransport>,
		observer: Arc<dyn RedirectObserver>,
	) -> Dispatcher {
		Dispatcher::builder(session)
			.transport(transport)
			.redirect_observer(observer)
			.default_host("api.test.local")
			.build()
			.expect("Dispatcher should build inside a tokio runtime.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
