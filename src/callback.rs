//! Caller-facing completion contract, retry budget, and redirect notifications.

// std
use std::sync::atomic::{AtomicU32, Ordering};
// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{self, ContentRangeTotal, HeaderList, RawResponse},
	obs,
	request::HttpVerb,
	sign::SignedRequest,
};

/// Retries granted to a callback unless it configures its own budget.
pub const DEFAULT_RETRIES: u32 = 3;
/// Status reported when an exchange failed before producing an HTTP response.
pub const FAILURE_STATUS: i32 = -1;

/// Boxed future returned by [`Callback::retry`].
pub type RetryFuture<'a> = Pin<Box<dyn Future<Output = bool> + 'a + Send>>;

/// Mutable per-callback budget of rate-limit retries.
#[derive(Debug)]
pub struct RetryBudget(AtomicU32);
impl RetryBudget {
	/// Creates a budget of `retries`.
	pub fn new(retries: u32) -> Self {
		Self(AtomicU32::new(retries))
	}

	/// Retries left.
	pub fn remaining(&self) -> u32 {
		self.0.load(Ordering::Acquire)
	}

	/// Overwrites the number of retries left.
	pub fn set_remaining(&self, retries: u32) {
		self.0.store(retries, Ordering::Release);
	}

	/// Takes one retry; returns `false` when the budget is already spent.
	pub(crate) fn consume(&self) -> bool {
		self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1)).is_ok()
	}
}
impl Default for RetryBudget {
	fn default() -> Self {
		Self::new(DEFAULT_RETRIES)
	}
}

/// Terminal outcome of a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchResult {
	/// Verb of the final attempt.
	pub verb: HttpVerb,
	/// URL of the final attempt.
	pub url: String,
	/// Headers sent with the final attempt.
	pub request_headers: HeaderList,
	/// Body sent with the final attempt.
	pub request_body: Option<String>,
	/// HTTP status, or [`FAILURE_STATUS`] when no response was produced.
	pub status: i32,
	/// Response headers; empty for synthetic failures.
	pub response_headers: HeaderList,
	/// Response body; the error message for synthetic failures.
	pub response_body: Vec<u8>,
}
impl DispatchResult {
	pub(crate) fn exchange(request: &SignedRequest, response: RawResponse) -> Self {
		Self {
			verb: request.verb,
			url: request.url.to_string(),
			request_headers: request.headers.clone(),
			request_body: request.body.clone(),
			status: i32::from(response.status),
			response_headers: response.headers,
			response_body: response.body,
		}
	}

	pub(crate) fn failure(request: &SignedRequest, error: &TransportError) -> Self {
		Self {
			verb: request.verb,
			url: request.url.to_string(),
			request_headers: request.headers.clone(),
			request_body: request.body.clone(),
			status: FAILURE_STATUS,
			response_headers: HeaderList::new(),
			response_body: error.to_string().into_bytes(),
		}
	}

	/// Returns `true` for synthetic transport failures.
	pub fn is_failure(&self) -> bool {
		self.status == FAILURE_STATUS
	}

	/// Returns `true` for `2xx` responses.
	pub fn is_success(&self) -> bool {
		u16::try_from(self.status).is_ok_and(http::is_success)
	}

	/// First response header named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		http::find_header(&self.response_headers, name)
	}

	/// Response body decoded lossily as UTF-8.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.response_body).into_owned()
	}

	/// Pagination total from the `Content-Range` response header.
	pub fn total_object_count(&self) -> ContentRangeTotal {
		http::content_range_total(&self.response_headers)
	}
}

/// Completion sink for one chain.
///
/// Exactly one of [`done`](Callback::done) or [`unsent`](Callback::unsent) fires per chain.
/// [`retry`](Callback::retry) may fire several times before that, once per `503` response
/// that carries a usable `Retry-After` while the budget lasts.
pub trait Callback
where
	Self: Send + Sync,
{
	/// Terminal delivery of a response or a synthetic `-1` failure.
	fn done(&self, result: DispatchResult);

	/// Terminal delivery for requests that could not be built.
	fn unsent(&self, error: Error);

	/// Decides whether to resend after `delay`; the returned future performs the wait.
	///
	/// The default sleeps on the tokio timer and accepts.
	fn retry(&self, delay: Duration) -> RetryFuture<'_> {
		Box::pin(async move {
			tokio::time::sleep(delay.unsigned_abs()).await;

			true
		})
	}

	/// Rate-limit retries left for this callback.
	fn retry_budget(&self) -> &RetryBudget;
}

type DoneFn = dyn Fn(DispatchResult) + Send + Sync;
type UnsentFn = dyn Fn(Error) + Send + Sync;

/// Closure-backed [`Callback`] with the default retry policy.
pub struct FnCallback {
	on_done: Box<DoneFn>,
	on_unsent: Option<Box<UnsentFn>>,
	budget: RetryBudget,
}
impl FnCallback {
	/// Wraps a `done` closure; `unsent` errors are logged and dropped.
	pub fn new(on_done: impl Fn(DispatchResult) + 'static + Send + Sync) -> Self {
		Self { on_done: Box::new(on_done), on_unsent: None, budget: RetryBudget::default() }
	}

	/// Handles `unsent` errors with `on_unsent`.
	pub fn with_unsent(mut self, on_unsent: impl Fn(Error) + 'static + Send + Sync) -> Self {
		self.on_unsent = Some(Box::new(on_unsent));

		self
	}

	/// Overrides the retry budget.
	pub fn with_retries(self, retries: u32) -> Self {
		self.budget.set_remaining(retries);

		self
	}
}
impl Callback for FnCallback {
	fn done(&self, result: DispatchResult) {
		(self.on_done)(result);
	}

	fn unsent(&self, error: Error) {
		match &self.on_unsent {
			Some(on_unsent) => on_unsent(error),
			None => obs::log_unsent_dropped(&error),
		}
	}

	fn retry_budget(&self) -> &RetryBudget {
		&self.budget
	}
}
impl Debug for FnCallback {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FnCallback")
			.field("handles_unsent", &self.on_unsent.is_some())
			.field("budget", &self.budget)
			.finish()
	}
}

/// Notified after every redirect hop; it cannot veto the hop.
pub trait RedirectObserver
where
	Self: Send + Sync,
{
	/// `headers` and `body` belong to the redirect response.
	fn redirected(&self, old_url: &Url, headers: &[(String, String)], body: &str, new_url: &Url);
}

/// Observer that ignores every redirect.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRedirectObserver;
impl RedirectObserver for NoopRedirectObserver {
	fn redirected(&self, _: &Url, _: &[(String, String)], _: &str, _: &Url) {}
}
