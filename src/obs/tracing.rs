// self
use crate::{_prelude::*, request::RequestDescriptor};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedChain<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedChain<F> = F;

/// Span covering every attempt of one chain.
#[derive(Clone, Debug)]
pub struct DispatchSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl DispatchSpan {
	/// Creates a span tagged with the descriptor's verb and path.
	pub fn new(descriptor: &RequestDescriptor) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"mob_dispatch.chain",
				verb = descriptor.method(),
				path = descriptor.path()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = descriptor;

			Self {}
		}
	}

	/// Instruments a chain future without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedChain<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
