//! Optional observability helpers for dispatch chains.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `mob_dispatch.chain` with the `verb` and
//!   `path` fields, plus debug events for every exchange.
//! - Enable `metrics` to increment the `mob_dispatch_transition_total` counter for every
//!   state transition, labeled by `transition`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, http::RawResponse, sign::SignedRequest};

/// Longest response body excerpt written to logs, in characters.
pub const LOGGED_BODY_LIMIT: usize = 1_000;

/// State transitions of a dispatch chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
	/// A chain was accepted by the dispatcher.
	Created,
	/// An attempt was handed to the transport.
	Sent,
	/// A redirect hop was followed.
	Redirected,
	/// A rate-limit retry was accepted.
	RetryScheduled,
	/// A token refresh was started.
	RefreshPending,
	/// The chain delivered a result through `done`.
	Delivered,
	/// The chain delivered an error through `unsent`.
	Unsent,
}
impl Transition {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Transition::Created => "created",
			Transition::Sent => "sent",
			Transition::Redirected => "redirected",
			Transition::RetryScheduled => "retry_scheduled",
			Transition::RefreshPending => "refresh_pending",
			Transition::Delivered => "delivered",
			Transition::Unsent => "unsent",
		}
	}
}
impl Display for Transition {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Cuts `body` down to [`LOGGED_BODY_LIMIT`] characters.
pub fn truncate_body(body: &str) -> &str {
	match body.char_indices().nth(LOGGED_BODY_LIMIT) {
		Some((idx, _)) => &body[..idx],
		None => body,
	}
}

/// Logs an outgoing attempt.
pub fn log_request(request: &SignedRequest) {
	#[cfg(feature = "tracing")]
	{
		::tracing::debug!(
			verb = request.verb.as_str(),
			url = request.url.as_str(),
			"Sending request."
		);
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = request;
	}
}

/// Logs a completed exchange with a truncated body excerpt.
pub fn log_response(request: &SignedRequest, response: &RawResponse) {
	#[cfg(feature = "tracing")]
	{
		let body = response.body_text();

		::tracing::debug!(
			verb = request.verb.as_str(),
			url = request.url.as_str(),
			status = response.status,
			body = truncate_body(&body),
			"Received response."
		);
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (request, response);
	}
}

/// Logs a panic raised by a caller callback.
pub fn log_callback_panic(hook: &'static str) {
	#[cfg(feature = "tracing")]
	{
		::tracing::error!(hook, "Callback hook panicked; the panic was contained.");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = hook;
	}
}

/// Logs the outcome of a refresh round trip triggered by a chain.
pub fn log_refresh_outcome(error: Option<&Error>) {
	#[cfg(feature = "tracing")]
	{
		match error {
			None => ::tracing::info!("Access token refreshed."),
			Some(error) => ::tracing::warn!(%error, "Token refresh failed; resending once."),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

/// Logs an `unsent` error that nobody handles.
pub fn log_unsent_dropped(error: &Error) {
	#[cfg(feature = "tracing")]
	{
		::tracing::warn!(%error, "Request could not be sent.");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn body_excerpt_is_bounded_by_characters() {
		let long = "é".repeat(LOGGED_BODY_LIMIT + 10);

		assert_eq!(truncate_body(&long).chars().count(), LOGGED_BODY_LIMIT);
		assert_eq!(truncate_body("short"), "short");
	}

	#[test]
	fn transition_labels_are_stable() {
		assert_eq!(Transition::RetryScheduled.to_string(), "retry_scheduled");
		assert_eq!(Transition::RefreshPending.as_str(), "refresh_pending");
	}
}
