// self
use crate::{_prelude::*, model::ObjectKind, obs::Stage};

/// Span handle for one unit of engine work, tagged with inventory-domain
/// fields: the transport surface and endpoint, the extractor kind, the cache
/// kind, or the assembly step.
///
/// Async sections go through [`WorkSpan::wrap`] and synchronous ones through
/// [`WorkSpan::scope`], so no span guard is ever held across an `.await`.
/// Without the `tracing` feature every handle is an empty struct and both
/// combinators pass their work straight through.
#[derive(Clone, Debug)]
pub struct WorkSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl WorkSpan {
	/// Span for one transport request against a platform surface.
	pub fn request(surface: Stage, endpoint: &str) -> Self {
		#[cfg(feature = "tracing")]
		return Self {
			span: tracing::info_span!("platform_call", surface = surface.as_str(), endpoint),
		};
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (surface, endpoint);

			Self {}
		}
	}

	/// Span for one credential exchange, tagged with what triggered it
	/// (a stale cache, a 401 replay, an expired-token fault).
	pub fn credential_exchange(trigger: &str) -> Self {
		#[cfg(feature = "tracing")]
		return Self { span: tracing::info_span!("token_exchange", trigger) };
		#[cfg(not(feature = "tracing"))]
		{
			let _ = trigger;

			Self {}
		}
	}

	/// Span for one extractor pipeline run.
	pub fn extractor(kind: ObjectKind) -> Self {
		#[cfg(feature = "tracing")]
		return Self { span: tracing::info_span!("extract", kind = kind.as_str()) };
		#[cfg(not(feature = "tracing"))]
		{
			let _ = kind;

			Self {}
		}
	}

	/// Span for one reference-table population.
	pub fn cache_load(kind: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		return Self { span: tracing::info_span!("cache_load", kind) };
		#[cfg(not(feature = "tracing"))]
		{
			let _ = kind;

			Self {}
		}
	}

	/// Span for a post-run assembly step (graph fold, snapshot publish).
	pub fn assembly(step: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		return Self { span: tracing::info_span!("assembly", step) };
		#[cfg(not(feature = "tracing"))]
		{
			let _ = step;

			Self {}
		}
	}

	/// Notes a backoff retry inside the span.
	pub fn note_retry(&self, attempt: u32, wait: StdDuration) {
		#[cfg(feature = "tracing")]
		self.span.in_scope(|| {
			tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "backing off before retry");
		});
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (attempt, wait);
		}
	}

	/// Runs an async section inside the span.
	pub async fn wrap<F>(&self, work: F) -> F::Output
	where
		F: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			work.instrument(self.span.clone()).await
		}
		#[cfg(not(feature = "tracing"))]
		{
			work.await
		}
	}

	/// Runs a synchronous section inside the span.
	pub fn scope<T>(&self, work: impl FnOnce() -> T) -> T {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(work)
		}
		#[cfg(not(feature = "tracing"))]
		{
			work()
		}
	}
}
