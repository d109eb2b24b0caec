//! Extractor contract and pipeline driver.
//!
//! Every domain extractor implements the same template: `fetch` pulls raw
//! records from the platform, `enrich` attaches breadcrumbs and per-item
//! details under bounded parallelism, and `transform` normalizes records and
//! emits typed relationship edges. Per-item failures are collected without
//! aborting the extractor; a failed pagination call surfaces whatever was
//! already accumulated as a partial result.

pub mod activity;
pub mod asset;
pub mod automation;
pub mod classic;
pub mod data_extension;
pub mod event_definition;
pub mod journey;
pub mod query;
pub mod studio;
pub mod triggered_send;

// std
use std::{
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
	time::Instant,
};
// crates.io
use tokio::task::JoinSet;
// self
use crate::{
	_prelude::*,
	cache::{CacheKind, CacheManager},
	config::ExtractorOptions,
	error::ConsistencyError,
	limit::{RateLimiter, RequestOutcome},
	model::{
		ExtractionError, ExtractorCounters, ExtractorResult, ExtractorStatus, ObjectKind,
		ObjectRecord, RelationshipEdge,
	},
	obs::{self, ObsEvent, WorkSpan},
	transport::{REST_PAGE_CEILING, RestClient, SoapClient, SoapFilter},
};

/// Boxed future returned by extractor stages.
pub type ExtractFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Progress sink consumed by the CLI/TUI collaborators.
pub trait ProgressSink
where
	Self: Send + Sync,
{
	/// An extractor entered its pipeline.
	fn started(&self, kind: ObjectKind);

	/// Monotonic progress tick; `total` is 0 while unknown.
	fn progress(&self, kind: ObjectKind, done: usize, total: usize, label: &str);

	/// An extractor left its pipeline with the given status.
	fn finished(&self, kind: ObjectKind, status: ExtractorStatus);

	/// A collected (non-fatal) extraction error.
	fn error(&self, kind: ObjectKind, error: &ExtractionError);
}

/// Sink that swallows every event; used by headless runs and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;
impl ProgressSink for NoopProgress {
	fn started(&self, _kind: ObjectKind) {}

	fn progress(&self, _kind: ObjectKind, _done: usize, _total: usize, _label: &str) {}

	fn finished(&self, _kind: ObjectKind, _status: ExtractorStatus) {}

	fn error(&self, _kind: ObjectKind, _error: &ExtractionError) {}
}

/// Shared handles and per-run collection state passed to every extractor.
pub struct ExtractorContext {
	/// REST transport handle.
	pub rest: Arc<RestClient>,
	/// SOAP transport handle.
	pub soap: Arc<SoapClient>,
	/// Shared reference-table registry.
	pub caches: Arc<CacheManager>,
	/// Shared adaptive limiter.
	pub limiter: Arc<RateLimiter>,
	/// Run options.
	pub options: ExtractorOptions,
	/// Progress sink.
	pub progress: Arc<dyn ProgressSink>,
	/// Cooperative cancellation token.
	pub cancel: CancellationToken,
	errors: Mutex<Vec<ExtractionError>>,
	partial: AtomicBool,
	fetched: AtomicU64,
	detail_calls: AtomicU64,
	unresolved: AtomicU64,
}
impl ExtractorContext {
	/// Creates a context over the shared engine handles.
	pub fn new(
		rest: Arc<RestClient>,
		soap: Arc<SoapClient>,
		caches: Arc<CacheManager>,
		limiter: Arc<RateLimiter>,
		options: ExtractorOptions,
		progress: Arc<dyn ProgressSink>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			rest,
			soap,
			caches,
			limiter,
			options,
			progress,
			cancel,
			errors: Mutex::new(Vec::new()),
			partial: AtomicBool::new(false),
			fetched: AtomicU64::new(0),
			detail_calls: AtomicU64::new(0),
			unresolved: AtomicU64::new(0),
		}
	}

	/// Collects a non-fatal error and forwards it to the progress sink.
	pub fn record_error(&self, kind: ObjectKind, error: ExtractionError) {
		self.progress.error(kind, &error);
		self.errors.lock().push(error);
	}

	/// Marks the run partial (a page or detail batch was lost).
	pub fn mark_partial(&self) {
		self.partial.store(true, Ordering::Release);
	}

	/// Bumps the unresolved-reference counter.
	pub fn add_unresolved(&self, count: u64) {
		self.unresolved.fetch_add(count, Ordering::Relaxed);
	}

	/// Paces one REST GET through the limiter and feeds the stress window.
	pub async fn paced_rest_get(
		&self,
		kind: ObjectKind,
		path: &str,
		query: &[(&str, String)],
	) -> Result<Value> {
		let permit = self.limiter.acquire(kind).await;
		let outcome = self.rest.get(path, query).await;

		self.limiter.release(permit, request_outcome(&outcome));
		self.limiter.observe_global(request_outcome(&outcome));

		outcome
	}

	/// Paginates a REST collection with per-page pacing and progress ticks.
	///
	/// A transport failure after the first page is recorded and whatever was
	/// accumulated is returned with the partial flag set.
	pub async fn paced_pages(
		&self,
		kind: ObjectKind,
		path: &str,
		base_query: &[(&str, String)],
	) -> Result<Vec<Value>> {
		let page_size = self.options.page_size;
		let mut accumulated: Vec<Value> = Vec::new();
		let mut expected_total = 0_usize;

		for page in 1..=REST_PAGE_CEILING {
			if self.cancel.is_cancelled() {
				return Err(Error::Canceled);
			}

			let mut query: Vec<(&str, String)> = base_query.to_vec();

			query.push(("$page", page.to_string()));
			query.push(("$pageSize", page_size.to_string()));

			let body = match self.paced_rest_get(kind, path, &query).await {
				Ok(body) => body,
				Err(failure) if failure.is_canceled() => return Err(failure),
				Err(failure) => {
					self.record_error(kind, ExtractionError::from_error(&failure, None));
					self.mark_partial();

					return Ok(accumulated);
				},
			};

			if expected_total == 0 {
				expected_total =
					body.get("count").and_then(Value::as_u64).unwrap_or_default() as usize;
			}

			let items = body
				.get("items")
				.and_then(Value::as_array)
				.map(|array| array.to_vec())
				.unwrap_or_default();
			let fetched = items.len();

			accumulated.extend(items);
			self.progress.progress(kind, accumulated.len(), expected_total, "pages");

			if fetched == 0 || fetched < page_size as usize {
				return Ok(accumulated);
			}
			if page == REST_PAGE_CEILING {
				let ceiling: Error = ConsistencyError::PageCeiling {
					endpoint: path.to_owned(),
					ceiling: REST_PAGE_CEILING,
				}
				.into();

				self.record_error(kind, ExtractionError::from_error(&ceiling, None));
			}
		}

		Ok(accumulated)
	}

	/// Runs one paced SOAP retrieve-all; a transport failure is recorded and
	/// surfaces an empty partial batch instead of aborting the extractor.
	pub async fn paced_retrieve(
		&self,
		kind: ObjectKind,
		object_type: &str,
		properties: &[&str],
		filter: Option<&SoapFilter>,
	) -> Result<Vec<Value>> {
		let permit = self.limiter.acquire(kind).await;
		let outcome = self.soap.retrieve_all(object_type, properties, filter).await;

		self.limiter.release(permit, request_outcome(&outcome));
		self.limiter.observe_global(request_outcome(&outcome));

		match outcome {
			Ok(retrieval) => {
				if retrieval.truncated {
					let ceiling: Error = ConsistencyError::PageCeiling {
						endpoint: object_type.to_owned(),
						ceiling: crate::transport::SOAP_PAGE_CEILING,
					}
					.into();

					self.record_error(kind, ExtractionError::from_error(&ceiling, None));
				}

				self.progress.progress(kind, retrieval.records.len(), 0, "records");

				Ok(retrieval.records)
			},
			Err(failure) if failure.is_canceled() => Err(failure),
			Err(failure @ Error::Auth(_)) | Err(failure @ Error::Cache(_)) => Err(failure),
			Err(failure) => {
				self.record_error(kind, ExtractionError::from_error(&failure, None));
				self.mark_partial();

				Ok(Vec::new())
			},
		}
	}

	/// Attaches a resolved breadcrumb under `_folderPath` when the item carries
	/// a folder id in `folder_field`; missing parents count as unresolved.
	pub async fn attach_breadcrumb(
		&self,
		cache_kind: CacheKind,
		item: &mut Value,
		folder_field: &str,
	) -> Result<()> {
		let Some(folder_id) = crate::cache::string_field(item, folder_field) else {
			return Ok(());
		};
		let crumb = self.caches.breadcrumb(cache_kind, &folder_id).await?;

		if !crumb.missing.is_empty() {
			self.add_unresolved(crumb.missing.len() as u64);
		}
		if let Value::Object(map) = item {
			map.insert("_folderPath".into(), Value::String(crumb.path.clone()));

			if crumb.cyclic {
				map.insert("_folderPathCyclic".into(), Value::Bool(true));
			}
		}

		Ok(())
	}

	fn take_errors(&self) -> Vec<ExtractionError> {
		std::mem::take(&mut self.errors.lock())
	}

	fn is_partial(&self) -> bool {
		self.partial.load(Ordering::Acquire)
	}
}
impl Debug for ExtractorContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExtractorContext").field("options", &self.options).finish()
	}
}

/// Extraction pipeline template implemented by every domain extractor.
pub trait Extractor
where
	Self: Send + Sync,
{
	/// Object kind this extractor produces.
	fn kind(&self) -> ObjectKind;

	/// Caches the Runner must warm before invoking this extractor.
	fn required_caches(&self) -> &'static [CacheKind];

	/// Paginated pull of raw records.
	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>>;

	/// Attaches breadcrumbs, resolves referenced names, and fetches per-item
	/// details. The default passes raw records through untouched.
	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		let _ = cx;

		Box::pin(async move { Ok(raw) })
	}

	/// Normalizes raw records and emits typed relationship edges.
	fn transform(
		&self,
		cx: &ExtractorContext,
		raw: Vec<Value>,
	) -> Result<(Vec<ObjectRecord>, Vec<RelationshipEdge>)>;
}

/// Drives one extractor through fetch → enrich → transform under the soft
/// deadline, classifying the outcome into an [`ExtractorResult`].
pub async fn run_extractor(
	extractor: &dyn Extractor,
	cx: &ExtractorContext,
	deadline: StdDuration,
) -> ExtractorResult {
	let kind = extractor.kind();
	let span = WorkSpan::extractor(kind);
	let started = Instant::now();

	cx.progress.started(kind);
	obs::emit(ObsEvent::ExtractorStarted { kind });

	let driven = tokio::time::timeout(deadline, span.wrap(drive(extractor, cx))).await;
	let mut result = ExtractorResult::new(kind);

	match driven {
		Ok(Ok((items, edges))) => {
			result.items = items;
			result.edges = edges;
			result.status =
				if cx.is_partial() { ExtractorStatus::Partial } else { ExtractorStatus::Ok };
		},
		Ok(Err(failure)) if failure.is_canceled() => {
			result.status = ExtractorStatus::Aborted;

			cx.record_error(kind, ExtractionError::from_error(&Error::Canceled, None));
		},
		Ok(Err(failure)) => {
			result.status = ExtractorStatus::Failed;

			cx.record_error(kind, ExtractionError::from_error(&failure, None));
		},
		Err(_elapsed) => {
			let timeout: Error = Error::ExtractorTimeout {
				kind,
				elapsed_ms: started.elapsed().as_millis() as u64,
			};

			result.status = ExtractorStatus::Partial;

			cx.record_error(kind, ExtractionError::from_error(&timeout, None));
		},
	}

	result.errors = cx.take_errors();

	if result.status == ExtractorStatus::Ok && !result.errors.is_empty() {
		result.status = ExtractorStatus::Partial;
	}

	result.counters = ExtractorCounters {
		fetched: cx.fetched.load(Ordering::Relaxed),
		emitted: result.items.len() as u64,
		detail_calls: cx.detail_calls.load(Ordering::Relaxed),
		unresolved_references: cx.unresolved.load(Ordering::Relaxed),
		duration_ms: started.elapsed().as_millis() as u64,
	};

	obs::emit(ObsEvent::ExtractorFinished { kind, status: result.status });
	cx.progress.finished(kind, result.status);

	result
}

async fn drive(
	extractor: &dyn Extractor,
	cx: &ExtractorContext,
) -> Result<(Vec<ObjectRecord>, Vec<RelationshipEdge>)> {
	let raw = extractor.fetch(cx).await?;

	cx.fetched.store(raw.len() as u64, Ordering::Relaxed);

	let enriched = extractor.enrich(cx, raw).await?;

	extractor.transform(cx, enriched)
}

/// Semaphore-bounded per-item detail fan-out.
///
/// `make` receives each raw item and builds a `'static` future producing the
/// enriched replacement; items whose detail future fails keep their raw form
/// and the failure is recorded against the item.
pub async fn detail_fan_out<F, Fut>(
	cx: &ExtractorContext,
	kind: ObjectKind,
	items: Vec<Value>,
	make: F,
) -> Result<Vec<Value>>
where
	F: Fn(&Value) -> Fut,
	Fut: Future<Output = Result<Value>> + Send + 'static,
{
	let semaphore = Arc::new(tokio::sync::Semaphore::new(cx.options.detail_concurrency));
	let total = items.len();
	let mut join_set: JoinSet<(usize, Result<Value>)> = JoinSet::new();

	for (index, item) in items.iter().enumerate() {
		let future = make(item);
		let semaphore = semaphore.clone();

		cx.detail_calls.fetch_add(1, Ordering::Relaxed);
		join_set.spawn(async move {
			let _permit =
				semaphore.acquire_owned().await.expect("Detail semaphore is never closed.");

			(index, future.await)
		});
	}

	let mut enriched = items;
	let mut done = 0_usize;

	while let Some(joined) = join_set.join_next().await {
		if cx.cancel.is_cancelled() {
			return Err(Error::Canceled);
		}

		let Ok((index, outcome)) = joined else {
			continue;
		};

		match outcome {
			Ok(detail) => enriched[index] = detail,
			Err(failure) if failure.is_canceled() => return Err(failure),
			Err(failure) => {
				let item_id = item_identity(&enriched[index]);

				cx.record_error(kind, ExtractionError::from_error(&failure, item_id));
			},
		}

		done += 1;

		cx.progress.progress(kind, done, total, "details");
	}

	Ok(enriched)
}

/// Paced single-item REST GET used inside `'static` detail fan-out futures.
pub(crate) async fn paced_detail_get(
	rest: Arc<RestClient>,
	limiter: Arc<RateLimiter>,
	kind: ObjectKind,
	path: String,
) -> Result<Value> {
	let permit = limiter.acquire(kind).await;
	let outcome = rest.get(&path, &[]).await;

	limiter.release(permit, request_outcome(&outcome));
	limiter.observe_global(request_outcome(&outcome));

	outcome
}

/// Walks a nested object path and reads the leaf as a string.
pub(crate) fn nested_string(value: &Value, path: &[&str]) -> Option<String> {
	let (leaf, parents) = path.split_last()?;
	let mut cursor = value;

	for segment in parents {
		cursor = cursor.get(segment)?;
	}

	crate::cache::string_field(cursor, leaf)
}

/// Best-effort identifier for error records, across REST and SOAP spellings.
pub(crate) fn item_identity(item: &Value) -> Option<String> {
	["id", "Id", "ID", "ObjectID", "definitionId", "key", "customerKey", "CustomerKey", "name"]
		.iter()
		.find_map(|field| crate::cache::string_field(item, field))
}

fn request_outcome<T>(outcome: &Result<T>) -> RequestOutcome {
	match outcome {
		Ok(_) => RequestOutcome::Success,
		Err(_) => RequestOutcome::Failure,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn item_identity_prefers_ids_over_names() {
		let item = serde_json::json!({"name": "fallback", "id": "primary"});

		assert_eq!(item_identity(&item), Some("primary".into()));
		assert_eq!(
			item_identity(&serde_json::json!({"name": "only-name"})),
			Some("only-name".into()),
		);
		assert_eq!(item_identity(&serde_json::json!({})), None);
	}
}
