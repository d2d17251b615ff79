//! Per-chain state: the descriptor, its callback, the refresh guard, and the delivery latch.

// std
use std::panic::{self, AssertUnwindSafe};
// self
use crate::{
	_prelude::*,
	callback::{Callback, DispatchResult, RetryBudget},
	error::TransportError,
	obs::{self, DispatchSpan},
	request::{HttpVerb, RequestDescriptor},
};

/// Whether a chain may trigger a token refresh; refresh chains never do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefreshMode {
	Allowed,
	Disabled,
}

/// What the next attempt targets.
#[derive(Debug)]
pub(crate) enum Target {
	/// The caller's descriptor, re-signed against the current session.
	Original,
	/// A redirect hop; verb preserved, body only for bodied verbs.
	Redirect { verb: HttpVerb, url: Url, body: Option<String> },
}

#[derive(Debug)]
pub(crate) enum State {
	Sending(Target),
	Redirected(Target),
	RetryScheduled { delay: Duration, result: DispatchResult },
	RefreshPending,
	Delivered(DispatchResult),
	Unsent(Error),
}

pub(crate) struct Chain {
	pub(crate) descriptor: RequestDescriptor,
	pub(crate) callback: Arc<dyn Callback>,
	pub(crate) refresh_mode: RefreshMode,
	/// Set at most once and never reset.
	pub(crate) refresh_attempted: bool,
	pub(crate) span: DispatchSpan,
	delivered: bool,
}
impl Chain {
	pub(crate) fn new(
		descriptor: RequestDescriptor,
		callback: Arc<dyn Callback>,
		refresh_mode: RefreshMode,
	) -> Self {
		let span = DispatchSpan::new(&descriptor);

		Self { descriptor, callback, refresh_mode, refresh_attempted: false, span, delivered: false }
	}

	pub(crate) fn deliver_done(&mut self, result: DispatchResult) {
		if std::mem::replace(&mut self.delivered, true) {
			return;
		}

		let callback = &self.callback;

		if panic::catch_unwind(AssertUnwindSafe(|| callback.done(result))).is_err() {
			obs::log_callback_panic("done");
		}
	}

	pub(crate) fn deliver_unsent(&mut self, error: Error) {
		if std::mem::replace(&mut self.delivered, true) {
			return;
		}

		let callback = &self.callback;

		if panic::catch_unwind(AssertUnwindSafe(|| callback.unsent(error))).is_err() {
			obs::log_callback_panic("unsent");
		}
	}
}
impl Drop for Chain {
	fn drop(&mut self) {
		// A chain dropped mid-flight by runtime shutdown still owes its callback one delivery.
		// Exchange and hook panics are contained before they can unwind through here.
		if !self.delivered && !std::thread::panicking() {
			self.deliver_unsent(TransportError::Interrupted.into());
		}
	}
}

/// Callback that parks the terminal delivery for an awaiting caller.
pub(crate) struct OneshotCallback {
	slot: Mutex<Option<Result<DispatchResult>>>,
	budget: RetryBudget,
}
impl OneshotCallback {
	pub(crate) fn new(retries: u32) -> Self {
		Self { slot: Mutex::new(None), budget: RetryBudget::new(retries) }
	}

	pub(crate) fn take(&self) -> Result<DispatchResult> {
		self.slot.lock().take().unwrap_or_else(|| Err(TransportError::Interrupted.into()))
	}
}
impl Callback for OneshotCallback {
	fn done(&self, result: DispatchResult) {
		*self.slot.lock() = Some(Ok(result));
	}

	fn unsent(&self, error: Error) {
		*self.slot.lock() = Some(Err(error));
	}

	fn retry_budget(&self) -> &RetryBudget {
		&self.budget
	}
}
