//! Optional observability helpers for engine work units.
//!
//! # Feature Flags
//!
//! - Enable `tracing` for per-work-unit spans carrying domain fields:
//!   `platform_call` (surface + endpoint), `token_exchange` (trigger),
//!   `cache_load` (cache kind), `extract` (object kind), and `assembly`
//!   (graph fold / snapshot publish), built through [`WorkSpan`].
//! - Enable `metrics` to count [`ObsEvent`]s through [`emit`]:
//!   `sfmc_inventory_calls_total`, `sfmc_inventory_throttle_waits_total`
//!   (plus a wait-length histogram), `sfmc_inventory_extractors_total`
//!   keyed by terminal status, and `sfmc_inventory_cache_loads_total` with a
//!   per-kind entry gauge.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Call surfaces the engine talks to; extractor and assembly work is labeled
/// by object kind and step instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Credential exchanges against the auth surface.
	Auth,
	/// JSON calls against the REST surface.
	Rest,
	/// Envelope posts against the SOAP surface.
	Soap,
	/// Reference-table loads (whichever surface backs the kind).
	Cache,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Auth => "auth",
			Stage::Rest => "rest",
			Stage::Soap => "soap",
			Stage::Cache => "cache",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// What happened to one platform call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// The call was dispatched.
	Attempt,
	/// The call resolved cleanly.
	Success,
	/// The call failed for good.
	Failure,
	/// The call failed but another attempt follows.
	Retry,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
			Outcome::Retry => "retry",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
