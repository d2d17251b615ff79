// self
use crate::obs::Transition;

/// Records a chain transition via the global metrics recorder (when enabled).
pub fn record_transition(transition: Transition) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("mob_dispatch_transition_total", "transition" => transition.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = transition;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_transition_noop_without_recorder() {
		record_transition(Transition::Delivered);
	}
}
