// self
use crate::{
	model::{ExtractorStatus, ObjectKind},
	obs::{Outcome, Stage},
};

/// One countable engine event; everything funnels through [`emit`] so the
/// `metrics` gating lives in exactly one place.
#[derive(Clone, Copy, Debug)]
pub enum ObsEvent {
	/// A transport or auth call was attempted, retried, or resolved.
	Call {
		/// Engine layer the call belongs to.
		stage: Stage,
		/// What happened to it.
		outcome: Outcome,
	},
	/// A server-directed throttle wait (`Retry-After`) was honored.
	ThrottleWait {
		/// Engine layer that was throttled.
		stage: Stage,
		/// Honored wait in milliseconds.
		wait_ms: u64,
	},
	/// An extractor entered its pipeline.
	ExtractorStarted {
		/// Extractor kind.
		kind: ObjectKind,
	},
	/// An extractor left its pipeline with a terminal status.
	ExtractorFinished {
		/// Extractor kind.
		kind: ObjectKind,
		/// Terminal status.
		status: ExtractorStatus,
	},
	/// A reference table was populated and published.
	CachePublished {
		/// Stable cache kind label.
		kind: &'static str,
		/// Entries in the published table.
		entries: usize,
	},
}

/// Records one event against the global metrics recorder; a no-op unless the
/// `metrics` feature is enabled.
pub fn emit(event: ObsEvent) {
	#[cfg(feature = "metrics")]
	match event {
		ObsEvent::Call { stage, outcome } => metrics::counter!(
			"sfmc_inventory_calls_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1),
		ObsEvent::ThrottleWait { stage, wait_ms } => {
			metrics::counter!(
				"sfmc_inventory_throttle_waits_total",
				"stage" => stage.as_str()
			)
			.increment(1);
			metrics::histogram!(
				"sfmc_inventory_throttle_wait_ms",
				"stage" => stage.as_str()
			)
			.record(wait_ms as f64);
		},
		ObsEvent::ExtractorStarted { kind } => metrics::counter!(
			"sfmc_inventory_extractors_total",
			"kind" => kind.as_str(),
			"status" => "started"
		)
		.increment(1),
		ObsEvent::ExtractorFinished { kind, status } => metrics::counter!(
			"sfmc_inventory_extractors_total",
			"kind" => kind.as_str(),
			"status" => status.as_str()
		)
		.increment(1),
		ObsEvent::CachePublished { kind, entries } => {
			metrics::counter!("sfmc_inventory_cache_loads_total", "kind" => kind).increment(1);
			metrics::gauge!("sfmc_inventory_cache_entries", "kind" => kind).set(entries as f64);
		},
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn every_event_shape_emits_without_a_recorder() {
		emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Retry });
		emit(ObsEvent::ThrottleWait { stage: Stage::Soap, wait_ms: 1_000 });
		emit(ObsEvent::ExtractorStarted { kind: ObjectKind::Query });
		emit(ObsEvent::ExtractorFinished {
			kind: ObjectKind::Query,
			status: ExtractorStatus::Partial,
		});
		emit(ObsEvent::CachePublished { kind: "query_folders", entries: 12 });
	}
}
