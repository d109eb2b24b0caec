//! Transport layer shared by the REST and SOAP clients: bounded retries,
//! exponential backoff with jitter, `Retry-After` handling, and page ceilings.

pub mod rest;
pub mod soap;
pub mod xml;

pub use rest::{RestClient, RestCollection, RestPage};
pub use soap::{SoapClient, SoapFilter, SoapRetrieval};

// crates.io
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Hard ceiling on REST pagination for a single collection endpoint.
pub const REST_PAGE_CEILING: u32 = 10_000;
/// Hard ceiling on SOAP continue-request pagination for a single retrieve.
pub const SOAP_PAGE_CEILING: u32 = 100;

/// Bounded retry policy applied to every transport request.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
	/// Maximum attempts per request, including the first.
	pub attempts: u32,
	/// Base delay for exponential backoff between retries.
	pub backoff_base: StdDuration,
	/// Symmetric jitter fraction applied to each backoff delay.
	pub jitter: f64,
	/// Separate budget for 429 responses that carry a `Retry-After` hint: the
	/// server named a comeback time, so honoring it does not consume a retry
	/// attempt, up to this many waits per request.
	pub throttle_waits: u32,
}
impl RetryPolicy {
	/// Returns `true` for statuses worth another attempt.
	pub const fn is_retryable_status(status: u16) -> bool {
		matches!(status, 429 | 500 | 502 | 503 | 504)
	}

	/// Computes the jittered backoff delay before the given 1-based attempt.
	pub fn backoff(&self, attempt: u32) -> StdDuration {
		let exponent = attempt.saturating_sub(1).min(16);
		let base = self.backoff_base.as_millis() as f64 * f64::from(1_u32 << exponent);
		let spread = rand::rng().random_range(-self.jitter..=self.jitter);
		let delayed = (base * (1.0 + spread)).max(0.0);

		StdDuration::from_millis(delayed as u64)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			attempts: 3,
			backoff_base: StdDuration::from_secs(1),
			jitter: 0.2,
			throttle_waits: 10,
		}
	}
}

/// Parses a `Retry-After` header carrying either integer seconds or an HTTP-date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<StdDuration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(StdDuration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(StdDuration::from_secs_f64(delta.as_seconds_f64()));
		}
	}

	None
}

/// Truncates a response body for inclusion in error details.
pub(crate) fn truncate_detail(body: &str) -> String {
	body.chars().take(200).collect()
}
