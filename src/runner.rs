//! Bounded-parallel orchestration of selected extractors.

pub use crate::extract::{NoopProgress, ProgressSink};

// std
use std::time::Instant;
// crates.io
use tokio::{sync::Semaphore, task::JoinSet};
// self
use crate::{
	_prelude::*,
	auth::TokenManager,
	cache::{CacheKind, CacheManager, CacheStats},
	config::ExtractorOptions,
	extract::{
		Extractor, ExtractorContext, asset::AssetExtractor, automation::AutomationExtractor,
		classic::ClassicExtractor, data_extension::DataExtensionExtractor,
		event_definition::EventDefinitionExtractor, journey::JourneyExtractor,
		query::QueryExtractor, run_extractor, studio::StudioExtractor,
		triggered_send::TriggeredSendExtractor,
	},
	limit::{LimiterStats, RateLimiter},
	model::{ExtractorResult, ExtractorStatus, ObjectKind},
	transport::{RestClient, SoapClient},
};

/// Aggregated outcome of one run across all selected extractors.
#[derive(Clone, Debug, Serialize)]
pub struct RunnerResult {
	/// Run start instant.
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	/// Run end instant.
	#[serde(with = "time::serde::rfc3339")]
	pub finished_at: OffsetDateTime,
	/// Wall-clock duration of the whole run.
	pub duration_ms: u64,
	/// Per-extractor results, in requested-kind order.
	pub results: Vec<ExtractorResult>,
	/// Emitted object counts keyed by kind label.
	pub counts: BTreeMap<String, u64>,
	/// Cache load statistics.
	pub cache_stats: BTreeMap<String, CacheStats>,
	/// Rate limiter statistics.
	pub limiter_stats: LimiterStats,
	/// Credential exchanges performed during the run.
	pub token_refreshes: u64,
}
impl RunnerResult {
	/// `true` when any extractor ended partial or failed.
	pub fn has_partial(&self) -> bool {
		self.results.iter().any(|result| {
			matches!(result.status, ExtractorStatus::Partial | ExtractorStatus::Failed)
		})
	}

	/// `true` when any extractor was aborted by cancellation.
	pub fn has_aborted(&self) -> bool {
		self.results.iter().any(|result| result.status == ExtractorStatus::Aborted)
	}
}

/// Orchestrates selected extractors with bounded parallelism.
pub struct ExtractorRunner {
	rest: Arc<RestClient>,
	soap: Arc<SoapClient>,
	caches: Arc<CacheManager>,
	limiter: Arc<RateLimiter>,
	tokens: Arc<TokenManager>,
	options: ExtractorOptions,
	progress: Arc<dyn ProgressSink>,
	cancel: CancellationToken,
	max_concurrency: usize,
	deadline: StdDuration,
}
impl ExtractorRunner {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		rest: Arc<RestClient>,
		soap: Arc<SoapClient>,
		caches: Arc<CacheManager>,
		limiter: Arc<RateLimiter>,
		tokens: Arc<TokenManager>,
		options: ExtractorOptions,
		progress: Arc<dyn ProgressSink>,
		cancel: CancellationToken,
		max_concurrency: usize,
		deadline: StdDuration,
	) -> Self {
		Self {
			rest,
			soap,
			caches,
			limiter,
			tokens,
			options,
			progress,
			cancel,
			max_concurrency: max_concurrency.max(1),
			deadline,
		}
	}

	/// Runs the requested kinds in parallel under the global semaphore.
	pub async fn run(&self, kinds: &[ObjectKind]) -> RunnerResult {
		let started_at = OffsetDateTime::now_utc();
		let started = Instant::now();
		let kinds = dedupe_kinds(kinds);

		self.warm_required(&kinds).await;

		let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
		let deadline = self.deadline;
		let mut join_set: JoinSet<(usize, ExtractorResult)> = JoinSet::new();

		for (position, kind) in kinds.iter().copied().enumerate() {
			let extractor = build_extractor(kind);
			let context = self.new_context();
			let semaphore = semaphore.clone();

			join_set.spawn(async move {
				let _permit =
					semaphore.acquire_owned().await.expect("Runner semaphore is never closed.");
				let result = run_extractor(extractor.as_ref(), &context, deadline).await;

				(position, result)
			});
		}

		let mut slots: Vec<Option<ExtractorResult>> = (0..kinds.len()).map(|_| None).collect();

		while let Some(joined) = join_set.join_next().await {
			if let Ok((position, result)) = joined {
				slots[position] = Some(result);
			}
		}

		let results: Vec<ExtractorResult> = slots.into_iter().flatten().collect();

		self.assemble(started_at, started, results)
	}

	/// Runs the requested kinds one at a time; used under heavy rate-limit
	/// stress or when explicitly requested.
	pub async fn run_sequential(&self, kinds: &[ObjectKind]) -> RunnerResult {
		let started_at = OffsetDateTime::now_utc();
		let started = Instant::now();
		let kinds = dedupe_kinds(kinds);

		self.warm_required(&kinds).await;

		let mut results = Vec::with_capacity(kinds.len());

		for kind in kinds {
			let extractor = build_extractor(kind);
			let context = self.new_context();

			results.push(run_extractor(extractor.as_ref(), &context, self.deadline).await);
		}

		self.assemble(started_at, started, results)
	}

	/// Signals cancellation to every outstanding task.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	async fn warm_required(&self, kinds: &[ObjectKind]) {
		let required: Vec<CacheKind> = kinds
			.iter()
			.flat_map(|kind| build_extractor(*kind).required_caches().to_vec())
			.collect();

		if !required.is_empty() {
			self.caches.warm(&required, self.max_concurrency).await;
		}
	}

	fn new_context(&self) -> ExtractorContext {
		ExtractorContext::new(
			self.rest.clone(),
			self.soap.clone(),
			self.caches.clone(),
			self.limiter.clone(),
			self.options,
			self.progress.clone(),
			self.cancel.clone(),
		)
	}

	fn assemble(
		&self,
		started_at: OffsetDateTime,
		started: Instant,
		results: Vec<ExtractorResult>,
	) -> RunnerResult {
		let counts = results
			.iter()
			.map(|result| (result.kind.as_str().to_owned(), result.counters.emitted))
			.collect();

		RunnerResult {
			started_at,
			finished_at: OffsetDateTime::now_utc(),
			duration_ms: started.elapsed().as_millis() as u64,
			results,
			counts,
			cache_stats: self.caches.stats(),
			limiter_stats: self.limiter.stats(),
			token_refreshes: self.tokens.refresh_count(),
		}
	}
}
impl Debug for ExtractorRunner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExtractorRunner")
			.field("max_concurrency", &self.max_concurrency)
			.field("options", &self.options)
			.finish()
	}
}

fn build_extractor(kind: ObjectKind) -> Box<dyn Extractor> {
	match kind {
		ObjectKind::Automation => Box::new(AutomationExtractor),
		ObjectKind::Query => Box::new(QueryExtractor),
		ObjectKind::Script => Box::new(StudioExtractor::script()),
		ObjectKind::Import => Box::new(StudioExtractor::import()),
		ObjectKind::DataExtract => Box::new(StudioExtractor::data_extract()),
		ObjectKind::FileTransfer => Box::new(StudioExtractor::file_transfer()),
		ObjectKind::Filter => Box::new(StudioExtractor::filter()),
		ObjectKind::DataExtension => Box::new(DataExtensionExtractor),
		ObjectKind::Email => Box::new(ClassicExtractor::email()),
		ObjectKind::Journey => Box::new(JourneyExtractor),
		ObjectKind::EventDefinition => Box::new(EventDefinitionExtractor),
		ObjectKind::TriggeredSend => Box::new(TriggeredSendExtractor),
		ObjectKind::List => Box::new(ClassicExtractor::list()),
		ObjectKind::Asset => Box::new(AssetExtractor),
		ObjectKind::Folder => Box::new(ClassicExtractor::folders()),
		ObjectKind::SenderProfile => Box::new(ClassicExtractor::sender_profile()),
		ObjectKind::DeliveryProfile => Box::new(ClassicExtractor::delivery_profile()),
		ObjectKind::SendClassification => Box::new(ClassicExtractor::send_classification()),
	}
}

fn dedupe_kinds(kinds: &[ObjectKind]) -> Vec<ObjectKind> {
	let mut seen = HashSet::new();

	kinds.iter().copied().filter(|kind| seen.insert(*kind)).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn every_kind_builds_an_extractor_of_its_own_kind() {
		for kind in ObjectKind::ALL {
			assert_eq!(build_extractor(*kind).kind(), *kind);
		}
	}

	#[test]
	fn kind_lists_dedupe_preserving_order() {
		let kinds = dedupe_kinds(&[
			ObjectKind::Query,
			ObjectKind::Automation,
			ObjectKind::Query,
			ObjectKind::DataExtension,
		]);

		assert_eq!(kinds, vec![ObjectKind::Query, ObjectKind::Automation, ObjectKind::DataExtension]);
	}
}
