//! Dispatcher: runs chains on a tokio runtime and drives the redirect, retry, and refresh
//! state machine until exactly one terminal delivery happens.
//!
//! Each chain is a loop over [`State`](chain::State). After every exchange the dispatcher
//! evaluates, in order: transport failure, server clock sync (V1), redirect, cookie
//! persistence, `503` + `Retry-After`, `401` refresh (V2), and finally delivery.

mod chain;
mod metrics;
mod refresh;

pub use metrics::*;

// std
use std::panic::AssertUnwindSafe;
// crates.io
use futures::FutureExt;
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	callback::{Callback, DEFAULT_RETRIES, DispatchResult, NoopRedirectObserver, RedirectObserver},
	dispatch::chain::{Chain, OneshotCallback, RefreshMode, State, Target},
	error::{ConfigError, RefreshError, TransportError},
	http::{self, HttpTransport, RawResponse, SERVICE_UNAVAILABLE, UNAUTHORIZED},
	obs::{self, Transition},
	request::{DEFAULT_API_HOST, RequestDescriptor},
	session::Session,
	sign::{SignedRequest, Signer},
};

/// Refresh endpoint name under the user object schema.
pub const REFRESH_ENDPOINT: &str = "refreshToken";

/// Boxed chain future; boxing breaks the refresh → chain → refresh recursion.
type ChainFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Sends signed requests and recovers from redirects, rate limits, and expired tokens.
///
/// Cloning is cheap; clones share the session, transport, observer, and metrics.
#[derive(Clone)]
pub struct Dispatcher {
	session: Arc<Session>,
	transport: Arc<dyn HttpTransport>,
	redirect_observer: Arc<dyn RedirectObserver>,
	metrics: Arc<DispatchMetrics>,
	default_host: String,
	refresh_path: String,
	runtime: Handle,
}
impl Dispatcher {
	/// Starts building a dispatcher around `session`.
	pub fn builder(session: Arc<Session>) -> DispatcherBuilder {
		DispatcherBuilder::new(session)
	}

	/// Session shared by every chain.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Counters shared by every clone of this dispatcher.
	pub fn metrics(&self) -> &DispatchMetrics {
		&self.metrics
	}

	/// Host used by descriptors that do not name one.
	pub fn default_host(&self) -> &str {
		&self.default_host
	}

	/// Path of the refresh-token endpoint.
	pub fn refresh_path(&self) -> &str {
		&self.refresh_path
	}

	/// Schedules a chain for `descriptor` and returns immediately.
	///
	/// `callback` receives exactly one of `done` or `unsent`, on a runtime worker.
	pub fn dispatch(&self, descriptor: RequestDescriptor, callback: Arc<dyn Callback>) {
		let chain = Chain::new(descriptor, callback, RefreshMode::Allowed);
		let dispatcher = self.clone();

		self.runtime.spawn(async move { dispatcher.drive(chain).await });
	}

	/// Runs a chain to completion on the current task with the default retry policy.
	///
	/// Transport failures still resolve to `Ok` with a `-1` status; `Err` carries the errors
	/// that would have reached `Callback::unsent`.
	pub async fn send(&self, descriptor: RequestDescriptor) -> Result<DispatchResult> {
		let callback = Arc::new(OneshotCallback::new(DEFAULT_RETRIES));

		self.drive(Chain::new(descriptor, callback.clone(), RefreshMode::Allowed)).await;

		callback.take()
	}

	fn drive(&self, chain: Chain) -> ChainFuture<'_> {
		let span = chain.span.clone();

		Box::pin(span.instrument(self.run(chain)))
	}

	async fn run(&self, mut chain: Chain) {
		self.metrics.record_chain();
		obs::record_transition(Transition::Created);

		let mut state = State::Sending(Target::Original);

		loop {
			state = match state {
				State::Sending(target) => self.send_attempt(&mut chain, target).await,
				State::Redirected(target) => {
					self.metrics.record_redirect();
					obs::record_transition(Transition::Redirected);

					State::Sending(target)
				},
				State::RetryScheduled { delay, result } => {
					let accepted = AssertUnwindSafe(async { chain.callback.retry(delay).await })
						.catch_unwind()
						.await
						.unwrap_or_else(|_| {
							obs::log_callback_panic("retry");

							false
						});

					if accepted && chain.callback.retry_budget().consume() {
						self.metrics.record_retry();
						obs::record_transition(Transition::RetryScheduled);

						State::Sending(Target::Original)
					} else {
						State::Delivered(result)
					}
				},
				State::RefreshPending => {
					chain.refresh_attempted = true;

					self.metrics.record_refresh();
					obs::record_transition(Transition::RefreshPending);

					let outcome =
						match AssertUnwindSafe(self.refresh_at(chain.descriptor.host()))
							.catch_unwind()
							.await
						{
							Ok(outcome) => outcome,
							Err(_) => Err(RefreshError::Panicked.into()),
						};

					// The original request is resent whether or not the refresh succeeded.
					obs::log_refresh_outcome(outcome.as_ref().err());

					State::Sending(Target::Original)
				},
				State::Delivered(result) => {
					self.metrics.record_delivery(result.is_failure());
					obs::record_transition(Transition::Delivered);
					chain.deliver_done(result);

					return;
				},
				State::Unsent(error) => {
					self.metrics.record_unsent();
					obs::record_transition(Transition::Unsent);
					chain.deliver_unsent(error);

					return;
				},
			};
		}
	}

	async fn send_attempt(&self, chain: &mut Chain, target: Target) -> State {
		let signer = Signer::new(&self.session);
		let request = match target {
			Target::Original => {
				if self.can_refresh(chain) && !self.session.is_token_valid() {
					return State::RefreshPending;
				}

				match signer.sign_descriptor(&chain.descriptor, &self.default_host) {
					Ok(request) => request,
					Err(e) => return State::Unsent(e.into()),
				}
			},
			Target::Redirect { verb, url, body } => signer.sign(&chain.descriptor, verb, url, body),
		};

		obs::log_request(&request);
		obs::record_transition(Transition::Sent);

		let exchange =
			AssertUnwindSafe(async { self.transport.execute(&request).await }).catch_unwind().await;

		match exchange {
			Ok(Ok(response)) => {
				obs::log_response(&request, &response);

				self.inspect(chain, request, response)
			},
			Ok(Err(e)) => State::Delivered(DispatchResult::failure(&request, &e)),
			Err(_) =>
				State::Delivered(DispatchResult::failure(&request, &TransportError::Panicked)),
		}
	}

	fn inspect(&self, chain: &Chain, request: SignedRequest, response: RawResponse) -> State {
		if !self.session.is_oauth2() {
			if let Some(date) = response.header("date") {
				self.session.record_server_time_diff(date);
			}
		}
		if http::is_redirect(response.status) {
			return match redirect_target(&request, &response) {
				Ok(url) => {
					self.redirect_observer.redirected(
						&request.url,
						&response.headers,
						&response.body_text(),
						&url,
					);

					let body = if request.verb.carries_body() { request.body } else { None };

					State::Redirected(Target::Redirect { verb: request.verb, url, body })
				},
				Err(e) => State::Delivered(DispatchResult::failure(&request, &e)),
			};
		}
		if http::is_success(response.status) {
			let cookies = response.header_values("set-cookie").collect::<Vec<_>>();

			if !cookies.is_empty() {
				self.session.cookie_store().store_cookies(&cookies);
			}
		}

		let retry_after = if response.status == SERVICE_UNAVAILABLE {
			http::parse_retry_after(response.header_values("retry-after"))
		} else {
			None
		};
		let status = response.status;
		let result = DispatchResult::exchange(&request, response);

		if let Some(delay) = retry_after {
			if chain.callback.retry_budget().remaining() > 0 {
				return State::RetryScheduled { delay, result };
			}
		}
		if status == UNAUTHORIZED && self.can_refresh(chain) {
			return State::RefreshPending;
		}

		State::Delivered(result)
	}

	fn can_refresh(&self, chain: &Chain) -> bool {
		chain.refresh_mode == RefreshMode::Allowed
			&& !chain.refresh_attempted
			&& self.session.is_oauth2()
			&& self.session.is_refresh_token_valid()
	}
}
impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("session", &self.session)
			.field("default_host", &self.default_host)
			.field("refresh_path", &self.refresh_path)
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
	session: Arc<Session>,
	transport: Option<Arc<dyn HttpTransport>>,
	redirect_observer: Option<Arc<dyn RedirectObserver>>,
	runtime: Option<Handle>,
	default_host: Option<String>,
	refresh_path: Option<String>,
}
impl DispatcherBuilder {
	fn new(session: Arc<Session>) -> Self {
		Self {
			session,
			transport: None,
			redirect_observer: None,
			runtime: None,
			default_host: None,
			refresh_path: None,
		}
	}

	/// Uses `transport` instead of the default reqwest transport.
	pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Notifies `observer` after every redirect hop.
	pub fn redirect_observer(mut self, observer: Arc<dyn RedirectObserver>) -> Self {
		self.redirect_observer = Some(observer);

		self
	}

	/// Runs chains on `runtime` instead of the ambient runtime.
	pub fn runtime(mut self, runtime: Handle) -> Self {
		self.runtime = Some(runtime);

		self
	}

	/// Host used by descriptors that do not name one.
	pub fn default_host(mut self, host: impl Into<String>) -> Self {
		self.default_host = Some(host.into());

		self
	}

	/// Overrides the refresh-token endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = Some(path.into());

		self
	}

	/// Builds the dispatcher, capturing the ambient tokio runtime when none was supplied.
	pub fn build(self) -> Result<Dispatcher, ConfigError> {
		let transport = match self.transport {
			Some(transport) => transport,
			None => default_transport()?,
		};
		let runtime = match self.runtime {
			Some(runtime) => runtime,
			None => Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?,
		};
		let refresh_path = self.refresh_path.unwrap_or_else(|| {
			format!("{}/{REFRESH_ENDPOINT}", self.session.user_object_name())
		});

		Ok(Dispatcher {
			session: self.session,
			transport,
			redirect_observer: self
				.redirect_observer
				.unwrap_or_else(|| Arc::new(NoopRedirectObserver)),
			metrics: Arc::new(DispatchMetrics::default()),
			default_host: self.default_host.unwrap_or_else(|| DEFAULT_API_HOST.into()),
			refresh_path,
			runtime,
		})
	}
}
impl Debug for DispatcherBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DispatcherBuilder")
			.field("session", &self.session)
			.field("has_transport", &self.transport.is_some())
			.field("default_host", &self.default_host)
			.field("refresh_path", &self.refresh_path)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConfigError> {
	Ok(Arc::new(http::ReqwestTransport::new()?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConfigError> {
	Err(ConfigError::MissingTransport)
}

/// Resolves the `Location` header against the URL that produced the redirect.
fn redirect_target(request: &SignedRequest, response: &RawResponse) -> Result<Url, TransportError> {
	let location = response
		.header("location")
		.ok_or(TransportError::MissingLocation { status: response.status })?
		.trim();

	request
		.url
		.join(location)
		.map_err(|source| TransportError::InvalidLocation { location: location.to_owned(), source })
}
