//! Adaptive per-kind rate limiter with a process-wide stress multiplier.
//!
//! The limiter is advisory: it never rejects a call, it only paces callers.
//! Each extractor kind keeps its own delay and in-flight bound; the delay
//! halves after a streak of successes and doubles on any failure. A global
//! stress multiplier in `[1.0, 16.0]` scales every delay when the caller
//! observes platform-wide pressure.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
// self
use crate::{_prelude::*, model::ObjectKind};

const STRESS_FLOOR: f64 = 1.0;
const STRESS_CEILING: f64 = 16.0;
const STRESS_WINDOW_FAILURES: u32 = 3;
const CALM_WINDOW_SUCCESSES: u32 = 64;

/// Outcome reported when releasing a permit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
	/// The paced call completed normally.
	Success,
	/// The paced call failed (throttle, server error, network).
	Failure,
}

/// Tunable limiter parameters.
#[derive(Clone, Copy, Debug)]
pub struct LimiterParams {
	/// Lower bound on the per-kind delay.
	pub min_delay: StdDuration,
	/// Upper bound on the per-kind delay.
	pub max_delay: StdDuration,
	/// Delay assigned to a kind on first use.
	pub initial_delay: StdDuration,
	/// In-flight bound per kind.
	pub max_in_flight: usize,
	/// Consecutive successes required before the delay halves.
	pub success_threshold: u32,
}
impl Default for LimiterParams {
	fn default() -> Self {
		Self {
			min_delay: StdDuration::from_millis(50),
			max_delay: StdDuration::from_secs(30),
			initial_delay: StdDuration::from_millis(100),
			max_in_flight: 8,
			success_threshold: 3,
		}
	}
}

/// Permit returned by [`RateLimiter::acquire`]; hand it back through
/// [`RateLimiter::release`] with the observed outcome.
#[derive(Debug)]
pub struct RatePermit {
	kind: ObjectKind,
	_permit: OwnedSemaphorePermit,
}

/// Serializable per-kind counters for `statistics.json`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct KindStats {
	/// Current adaptive delay in milliseconds.
	pub delay_ms: u64,
	/// Total successful releases.
	pub successes: u64,
	/// Total failed releases.
	pub failures: u64,
}

/// Serializable limiter snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimiterStats {
	/// Current global stress multiplier.
	pub stress_multiplier: f64,
	/// Per-kind counters keyed by the kind's wire label.
	pub kinds: BTreeMap<String, KindStats>,
}

struct KindState {
	semaphore: Arc<Semaphore>,
	delay: StdDuration,
	consecutive_successes: u32,
	successes: u64,
	failures: u64,
}
impl KindState {
	fn new(params: &LimiterParams) -> Self {
		Self {
			semaphore: Arc::new(Semaphore::new(params.max_in_flight)),
			delay: params.initial_delay,
			consecutive_successes: 0,
			successes: 0,
			failures: 0,
		}
	}
}

/// Per-extractor-kind adaptive gate with a global stress multiplier.
pub struct RateLimiter {
	params: LimiterParams,
	kinds: Mutex<HashMap<ObjectKind, KindState>>,
	stress_bits: AtomicU64,
	window_failures: AtomicU64,
	window_successes: AtomicU64,
}
impl RateLimiter {
	/// Creates a limiter with the provided parameters.
	pub fn new(params: LimiterParams) -> Self {
		Self {
			params,
			kinds: Mutex::new(HashMap::new()),
			stress_bits: AtomicU64::new(STRESS_FLOOR.to_bits()),
			window_failures: AtomicU64::new(0),
			window_successes: AtomicU64::new(0),
		}
	}

	/// Waits for an in-flight slot, then sleeps the kind's paced delay.
	pub async fn acquire(&self, kind: ObjectKind) -> RatePermit {
		let (semaphore, delay) = {
			let mut kinds = self.kinds.lock();
			let state = kinds.entry(kind).or_insert_with(|| KindState::new(&self.params));

			(state.semaphore.clone(), state.delay)
		};
		let permit = semaphore
			.acquire_owned()
			.await
			.expect("Limiter semaphores are never closed.");
		let paced = delay.mul_f64(self.stress_multiplier());

		if !paced.is_zero() {
			tokio::time::sleep(paced).await;
		}

		RatePermit { kind, _permit: permit }
	}

	/// Returns a permit and applies the adaptive delay rules.
	pub fn release(&self, permit: RatePermit, outcome: RequestOutcome) {
		let mut kinds = self.kinds.lock();
		let state = kinds.entry(permit.kind).or_insert_with(|| KindState::new(&self.params));

		match outcome {
			RequestOutcome::Success => {
				state.successes += 1;
				state.consecutive_successes += 1;

				if state.consecutive_successes >= self.params.success_threshold {
					state.delay = (state.delay / 2).max(self.params.min_delay);
					state.consecutive_successes = 0;
				}
			},
			RequestOutcome::Failure => {
				state.failures += 1;
				state.consecutive_successes = 0;
				state.delay = state
					.delay
					.checked_mul(2)
					.unwrap_or(self.params.max_delay)
					.min(self.params.max_delay);
			},
		}
	}

	/// Feeds the cross-kind stress window: a burst of failures raises the
	/// stress multiplier, a long clean streak lowers it again.
	pub fn observe_global(&self, outcome: RequestOutcome) {
		match outcome {
			RequestOutcome::Failure => {
				self.window_successes.store(0, Ordering::Relaxed);

				let failures = self.window_failures.fetch_add(1, Ordering::Relaxed) + 1;

				if failures >= u64::from(STRESS_WINDOW_FAILURES) {
					self.window_failures.store(0, Ordering::Relaxed);
					self.signal_stress();
				}
			},
			RequestOutcome::Success => {
				let successes = self.window_successes.fetch_add(1, Ordering::Relaxed) + 1;

				if successes >= u64::from(CALM_WINDOW_SUCCESSES) {
					self.window_successes.store(0, Ordering::Relaxed);
					self.window_failures.store(0, Ordering::Relaxed);
					self.signal_calm();
				}
			},
		}
	}

	/// Doubles the global stress multiplier (capped at 16).
	pub fn signal_stress(&self) {
		self.update_stress(|current| (current * 2.0).min(STRESS_CEILING));
	}

	/// Halves the global stress multiplier (floored at 1).
	pub fn signal_calm(&self) {
		self.update_stress(|current| (current / 2.0).max(STRESS_FLOOR));
	}

	/// Current global stress multiplier.
	pub fn stress_multiplier(&self) -> f64 {
		f64::from_bits(self.stress_bits.load(Ordering::Acquire))
	}

	/// Current delay for a kind (its initial value when the kind is untouched).
	pub fn current_delay(&self, kind: ObjectKind) -> StdDuration {
		self.kinds.lock().get(&kind).map_or(self.params.initial_delay, |state| state.delay)
	}

	/// Serializable snapshot for `statistics.json`.
	pub fn stats(&self) -> LimiterStats {
		let kinds = self
			.kinds
			.lock()
			.iter()
			.map(|(kind, state)| {
				(kind.as_str().to_owned(), KindStats {
					delay_ms: state.delay.as_millis() as u64,
					successes: state.successes,
					failures: state.failures,
				})
			})
			.collect();

		LimiterStats { stress_multiplier: self.stress_multiplier(), kinds }
	}

	fn update_stress(&self, apply: impl Fn(f64) -> f64) {
		let _ = self.stress_bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
			Some(apply(f64::from_bits(bits)).to_bits())
		});
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self::new(LimiterParams::default())
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("stress_multiplier", &self.stress_multiplier())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn fast_params() -> LimiterParams {
		LimiterParams {
			min_delay: StdDuration::from_millis(1),
			max_delay: StdDuration::from_millis(400),
			initial_delay: StdDuration::from_millis(4),
			max_in_flight: 2,
			success_threshold: 3,
		}
	}

	#[tokio::test]
	async fn three_successes_halve_the_delay() {
		let limiter = RateLimiter::new(fast_params());

		for _ in 0..3 {
			let permit = limiter.acquire(ObjectKind::Query).await;

			limiter.release(permit, RequestOutcome::Success);
		}

		assert_eq!(limiter.current_delay(ObjectKind::Query), StdDuration::from_millis(2));
	}

	#[tokio::test]
	async fn a_failure_doubles_the_delay_and_resets_the_streak() {
		let limiter = RateLimiter::new(fast_params());

		for _ in 0..2 {
			let permit = limiter.acquire(ObjectKind::Query).await;

			limiter.release(permit, RequestOutcome::Success);
		}

		let permit = limiter.acquire(ObjectKind::Query).await;

		limiter.release(permit, RequestOutcome::Failure);

		assert_eq!(limiter.current_delay(ObjectKind::Query), StdDuration::from_millis(8));

		// The streak restarted: two successes are not enough to halve again.
		for _ in 0..2 {
			let permit = limiter.acquire(ObjectKind::Query).await;

			limiter.release(permit, RequestOutcome::Success);
		}

		assert_eq!(limiter.current_delay(ObjectKind::Query), StdDuration::from_millis(8));
	}

	#[tokio::test]
	async fn delay_saturates_at_the_bounds() {
		let limiter = RateLimiter::new(fast_params());

		for _ in 0..12 {
			let permit = limiter.acquire(ObjectKind::Asset).await;

			limiter.release(permit, RequestOutcome::Failure);
		}

		assert_eq!(limiter.current_delay(ObjectKind::Asset), StdDuration::from_millis(400));
	}

	#[test]
	fn stress_window_reacts_to_failure_bursts_and_calm_streaks() {
		let limiter = RateLimiter::new(fast_params());

		for _ in 0..3 {
			limiter.observe_global(RequestOutcome::Failure);
		}

		assert_eq!(limiter.stress_multiplier(), 2.0);

		for _ in 0..64 {
			limiter.observe_global(RequestOutcome::Success);
		}

		assert_eq!(limiter.stress_multiplier(), 1.0);
	}

	#[test]
	fn stress_multiplier_clamps_to_its_range() {
		let limiter = RateLimiter::new(fast_params());

		for _ in 0..8 {
			limiter.signal_stress();
		}

		assert_eq!(limiter.stress_multiplier(), 16.0);

		for _ in 0..10 {
			limiter.signal_calm();
		}

		assert_eq!(limiter.stress_multiplier(), 1.0);
	}

	#[tokio::test]
	async fn in_flight_is_bounded_per_kind() {
		let limiter = Arc::new(RateLimiter::new(fast_params()));
		let first = limiter.acquire(ObjectKind::Journey).await;
		let second = limiter.acquire(ObjectKind::Journey).await;
		let blocked = tokio::time::timeout(
			StdDuration::from_millis(50),
			limiter.acquire(ObjectKind::Journey),
		)
		.await;

		assert!(blocked.is_err(), "third acquire should wait for a release");

		limiter.release(first, RequestOutcome::Success);

		let third = tokio::time::timeout(
			StdDuration::from_millis(200),
			limiter.acquire(ObjectKind::Journey),
		)
		.await;

		assert!(third.is_ok(), "released slot should admit the next caller");

		limiter.release(second, RequestOutcome::Success);
	}
}
