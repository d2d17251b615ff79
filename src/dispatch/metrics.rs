// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for dispatch chains.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	chains: AtomicU64,
	redirects: AtomicU64,
	retries: AtomicU64,
	refreshes: AtomicU64,
	deliveries: AtomicU64,
	failures: AtomicU64,
	unsent: AtomicU64,
}
impl DispatchMetrics {
	/// Returns the number of chains started (refresh chains included).
	pub fn chains(&self) -> u64 {
		self.chains.load(Ordering::Relaxed)
	}

	/// Returns the number of redirect hops followed.
	pub fn redirects(&self) -> u64 {
		self.redirects.load(Ordering::Relaxed)
	}

	/// Returns the number of accepted rate-limit retries.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes triggered by chains.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Returns the number of `done` deliveries (synthetic failures included).
	pub fn deliveries(&self) -> u64 {
		self.deliveries.load(Ordering::Relaxed)
	}

	/// Returns the number of synthetic `-1` deliveries.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of `unsent` deliveries.
	pub fn unsent(&self) -> u64 {
		self.unsent.load(Ordering::Relaxed)
	}

	pub(crate) fn record_chain(&self) {
		self.chains.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_redirect(&self) {
		self.redirects.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_delivery(&self, failure: bool) {
		self.deliveries.fetch_add(1, Ordering::Relaxed);

		if failure {
			self.failures.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_unsent(&self) {
		self.unsent.fetch_add(1, Ordering::Relaxed);
	}
}
