//! Paginated JSON client with bounded retries and single-replay 401 recovery.

// crates.io
use reqwest::{Client as ReqwestClient, Method};
// self
use crate::{
	_prelude::*,
	auth::TokenManager,
	config::EngineConfig,
	error::{AuthError, ParseError, TransportError},
	obs::{self, ObsEvent, Outcome, Stage, WorkSpan},
	transport::{self, REST_PAGE_CEILING, RetryPolicy},
};

/// Progress information handed to pagination observers after each page.
#[derive(Clone, Copy, Debug)]
pub struct RestPage {
	/// 1-based page number just fetched.
	pub number: u32,
	/// Items on this page.
	pub page_items: usize,
	/// Items accumulated so far, this page included.
	pub total_items: usize,
}

/// Accumulated result of a paginated collection pull.
#[derive(Clone, Debug, Default)]
pub struct RestCollection {
	/// Raw items across all fetched pages, in request order.
	pub items: Vec<Value>,
	/// Pages fetched.
	pub pages: u32,
	/// `true` when the hard page ceiling cut the iteration short.
	pub truncated: bool,
}

/// REST transport for the platform's JSON surface.
#[derive(Clone, Debug)]
pub struct RestClient {
	http: ReqwestClient,
	base: Url,
	tokens: Arc<TokenManager>,
	policy: RetryPolicy,
	cancel: CancellationToken,
}
impl RestClient {
	/// Creates a client for the configured REST base URL.
	pub fn new(
		config: &EngineConfig,
		http: ReqwestClient,
		tokens: Arc<TokenManager>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			http,
			base: config.rest_base.clone(),
			tokens,
			policy: RetryPolicy::default(),
			cancel,
		}
	}

	/// Overrides the retry policy (tests shrink the backoff base).
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Performs a GET against a collection or detail path.
	pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
		self.request(Method::GET, path, query, None).await
	}

	/// Performs a request with full retry/backoff/401 semantics and decodes the
	/// JSON body (empty bodies decode to `Value::Null`).
	pub async fn request(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, String)],
		body: Option<&Value>,
	) -> Result<Value> {
		let span = WorkSpan::request(Stage::Rest, path);

		span.wrap(self.dispatch(method, path, query, body)).await
	}

	async fn dispatch(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, String)],
		body: Option<&Value>,
	) -> Result<Value> {
		let url = self.base.join(path.trim_start_matches('/')).map_err(|e| {
			crate::error::ConfigError::InvalidValue { field: "rest_base", detail: e.to_string() }
		})?;
		let mut attempt: u32 = 1;
		let mut throttle_waits: u32 = 0;
		let mut replayed_after_refresh = false;

		loop {
			if self.cancel.is_cancelled() {
				return Err(Error::Canceled);
			}

			obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Attempt });

			let bearer = self.tokens.bearer().await?;
			let mut request = self
				.http
				.request(method.clone(), url.clone())
				.bearer_auth(&bearer)
				.query(query);

			if let Some(payload) = body {
				request = request.json(payload);
			}

			let outcome = tokio::select! {
				outcome = request.send() => outcome,
				_ = self.cancel.cancelled() => return Err(Error::Canceled),
			};
			let response = match outcome {
				Ok(response) => response,
				Err(network) => {
					if attempt >= self.policy.attempts {
						obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Failure });

						return Err(TransportError::NetworkExhausted {
							endpoint: path.to_owned(),
							attempts: attempt,
							source: Box::new(network),
						}
						.into());
					}

					obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Retry });
					self.sleep(self.policy.backoff(attempt)).await?;

					attempt += 1;

					continue;
				},
			};
			let status = response.status();

			if status.as_u16() == 401 {
				// One forced refresh + replay per request; it does not consume
				// a retry attempt. A second 401 is fatal.
				if replayed_after_refresh {
					obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Failure });

					return Err(AuthError::StillUnauthorized.into());
				}

				replayed_after_refresh = true;

				self.tokens.force_refresh("rest_401").await?;

				continue;
			}

			if status.is_success() {
				let bytes = tokio::select! {
					outcome = response.bytes() => outcome,
					_ = self.cancel.cancelled() => return Err(Error::Canceled),
				}
				.map_err(|network| TransportError::NetworkExhausted {
					endpoint: path.to_owned(),
					attempts: attempt,
					source: Box::new(network),
				})?;

				obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Success });

				if bytes.is_empty() {
					return Ok(Value::Null);
				}

				let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);

				return serde_path_to_error::deserialize(deserializer).map_err(|source| {
					ParseError::Json { source, status: Some(status.as_u16()) }.into()
				});
			}

			if RetryPolicy::is_retryable_status(status.as_u16()) {
				// A 429 carrying an explicit Retry-After names its own comeback
				// time; honoring it draws on a separate wait budget instead of
				// the attempt counter.
				if status.as_u16() == 429
					&& let Some(hinted) = transport::parse_retry_after(response.headers())
					&& throttle_waits < self.policy.throttle_waits
				{
					throttle_waits += 1;

					obs::emit(ObsEvent::ThrottleWait {
						stage: Stage::Rest,
						wait_ms: hinted.as_millis() as u64,
					});
					self.sleep(hinted).await?;

					continue;
				}
				if attempt >= self.policy.attempts {
					obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Failure });

					return Err(TransportError::RetryableExhausted {
						endpoint: path.to_owned(),
						status: status.as_u16(),
						attempts: attempt,
					}
					.into());
				}

				obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Retry });
				self.sleep(self.policy.backoff(attempt)).await?;

				attempt += 1;

				continue;
			}

			let detail = response.text().await.unwrap_or_default();

			obs::emit(ObsEvent::Call { stage: Stage::Rest, outcome: Outcome::Failure });

			return Err(TransportError::NonRetryable {
				endpoint: path.to_owned(),
				status: status.as_u16(),
				detail: transport::truncate_detail(&detail),
			}
			.into());
		}
	}

	/// Iterates a collection endpoint with `$page`/`$pageSize` parameters.
	///
	/// Stops on a short or empty page, or at the hard page ceiling (the
	/// accumulated items survive; `truncated` reports the cut).
	pub async fn fetch_all_pages(
		&self,
		path: &str,
		base_query: &[(&str, String)],
		page_size: u32,
		mut on_page: impl FnMut(RestPage),
	) -> Result<RestCollection> {
		let mut collection = RestCollection::default();

		for page in 1..=REST_PAGE_CEILING {
			let mut query: Vec<(&str, String)> = base_query.to_vec();

			query.push(("$page", page.to_string()));
			query.push(("$pageSize", page_size.to_string()));

			let body = self.get(path, &query).await?;
			let items = body
				.get("items")
				.and_then(Value::as_array)
				.map(|array| array.to_vec())
				.unwrap_or_default();
			let fetched = items.len();

			collection.pages = page;
			collection.items.extend(items);

			on_page(RestPage {
				number: page,
				page_items: fetched,
				total_items: collection.items.len(),
			});

			if fetched == 0 || fetched < page_size as usize {
				return Ok(collection);
			}
			if page == REST_PAGE_CEILING {
				collection.truncated = true;
			}
		}

		Ok(collection)
	}

	async fn sleep(&self, wait: StdDuration) -> Result<()> {
		tokio::select! {
			_ = tokio::time::sleep(wait) => Ok(()),
			_ = self.cancel.cancelled() => Err(Error::Canceled),
		}
	}
}
