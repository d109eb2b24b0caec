//! Engine facade owning the shared handles: token cache, transports, limiter,
//! caches, and cancellation.
//!
//! There are no process-wide singletons; tests construct a fresh engine per
//! scenario and every handle is reachable from it.

// std
use std::path::PathBuf;
// crates.io
use reqwest::Client as ReqwestClient;
// self
use crate::{
	_prelude::*,
	auth::TokenManager,
	cache::CacheManager,
	config::EngineConfig,
	error::ConfigError,
	extract::ProgressSink,
	graph::{RelationshipBuilder, RelationshipGraph},
	limit::{LimiterParams, RateLimiter},
	model::ObjectKind,
	runner::{ExtractorRunner, RunnerResult},
	snapshot::{Manifest, SnapshotWriter, Statistics},
	transport::{RestClient, SoapClient},
};

/// Everything a finished snapshot run produced.
#[derive(Debug)]
pub struct SnapshotOutcome {
	/// Directory the snapshot was written into.
	pub directory: PathBuf,
	/// Aggregated extractor results and statistics.
	pub run: RunnerResult,
	/// The assembled relationship graph.
	pub graph: RelationshipGraph,
}

/// Batch extraction engine for one business unit.
pub struct Engine {
	config: EngineConfig,
	tokens: Arc<TokenManager>,
	rest: Arc<RestClient>,
	soap: Arc<SoapClient>,
	limiter: Arc<RateLimiter>,
	caches: Arc<CacheManager>,
	cancel: CancellationToken,
}
impl Engine {
	/// Builds the engine and its shared handles from a validated config.
	pub fn new(config: EngineConfig) -> Result<Self> {
		let http = ReqwestClient::builder()
			.timeout(config.request_timeout)
			.build()
			.map_err(ConfigError::from)?;
		let cancel = CancellationToken::new();
		let tokens = Arc::new(TokenManager::new(&config, http.clone(), cancel.child_token())?);
		let rest =
			Arc::new(RestClient::new(&config, http.clone(), tokens.clone(), cancel.child_token()));
		let soap = Arc::new(SoapClient::new(&config, http, tokens.clone(), cancel.child_token()));
		let limiter = Arc::new(RateLimiter::new(LimiterParams::default()));
		let caches =
			Arc::new(CacheManager::new(rest.clone(), soap.clone(), config.options.page_size));

		Ok(Self { config, tokens, rest, soap, limiter, caches, cancel })
	}

	/// The validated configuration the engine runs with.
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Shared cache registry handle.
	pub fn caches(&self) -> Arc<CacheManager> {
		self.caches.clone()
	}

	/// Shared rate limiter handle.
	pub fn limiter(&self) -> Arc<RateLimiter> {
		self.limiter.clone()
	}

	/// Signals cancellation to every outstanding task.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Builds a runner wired to the engine's handles.
	pub fn runner(&self, progress: Arc<dyn ProgressSink>) -> ExtractorRunner {
		ExtractorRunner::new(
			self.rest.clone(),
			self.soap.clone(),
			self.caches.clone(),
			self.limiter.clone(),
			self.tokens.clone(),
			self.config.options,
			progress,
			self.cancel.clone(),
			self.config.max_concurrency,
			self.config.extractor_deadline,
		)
	}

	/// Convenience entry: run the kinds, assemble the graph, and write a full
	/// snapshot directory.
	pub async fn snapshot(
		&self,
		kinds: Vec<ObjectKind>,
		progress: Arc<dyn ProgressSink>,
	) -> Result<SnapshotOutcome> {
		let generated_at = OffsetDateTime::now_utc();
		let snapshot = SnapshotWriter::new(&self.config.output_root).create(generated_at)?;
		let runner = self.runner(progress);
		let run = runner.run(&kinds).await;

		for result in &run.results {
			snapshot.append_objects(result.kind, &result.items)?;
		}

		let graph = RelationshipBuilder::build(&run.results);

		snapshot.write_graph(&graph)?;
		snapshot.write_orphans(&graph)?;
		snapshot.write_statistics(&Statistics::from_run(&run, &graph))?;
		snapshot.write_manifest(&Manifest::from_run(
			&run,
			self.config.options,
			&kinds,
			generated_at,
		))?;

		let directory = snapshot.finalize()?;

		Ok(SnapshotOutcome { directory, run, graph })
	}
}
impl Debug for Engine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Engine")
			.field("rest_base", &self.config.rest_base.as_str())
			.field("soap_base", &self.config.soap_base.as_str())
			.field("account_id", &self.config.account_id)
			.field("client_secret_set", &true)
			.finish()
	}
}
