//! Single-flight OAuth2 client-credentials token cache.
//!
//! The manager holds at most one valid access token per run. Concurrent callers
//! that observe a stale token collapse onto one credential exchange: the first
//! caller through the refresh guard performs the network call while the rest
//! wait and receive the published token (or the same error). The cached token
//! is never replaced by an invalid value.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use reqwest::Client as ReqwestClient;
// self
use crate::{
	_prelude::*,
	config::{EngineConfig, Secret},
	error::{AuthError, ParseError},
	obs::{self, ObsEvent, Outcome, Stage, WorkSpan},
};

const EXPIRY_SKEW: Duration = Duration::seconds(60);
const REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BACKOFF_BASE_MS: u64 = 1_000;

/// Cached access token with its absolute expiry.
#[derive(Clone, Debug)]
pub struct AccessToken {
	secret: Secret,
	expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Builds a token from the exchange response fields.
	pub fn new(secret: impl Into<String>, issued_at: OffsetDateTime, expires_in: i64) -> Self {
		Self { secret: Secret::new(secret), expires_at: issued_at + Duration::seconds(expires_in) }
	}

	/// Returns the raw bearer value. Callers must avoid logging this string.
	pub fn bearer(&self) -> &str {
		self.secret.expose()
	}

	/// Returns `true` when the token is within the skew buffer of its expiry.
	pub fn is_stale_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at - EXPIRY_SKEW
	}

	/// Staleness check against the current clock.
	pub fn is_stale(&self) -> bool {
		self.is_stale_at(OffsetDateTime::now_utc())
	}
}

#[derive(Serialize)]
struct TokenRequest<'a> {
	grant_type: &'static str,
	client_id: &'a str,
	client_secret: &'a str,
	account_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: i64,
}

type BoxedFailure = Box<dyn std::error::Error + Send + Sync>;

/// Split between failures worth another attempt and failures that end the
/// exchange immediately (rejections, parse errors, cancellation).
enum ExchangeFailure {
	Transient(BoxedFailure),
	Fatal(Error),
}

/// Single-flight OAuth2 credential-grant cache.
#[derive(Debug)]
pub struct TokenManager {
	http: ReqwestClient,
	token_endpoint: Url,
	client_id: String,
	client_secret: Secret,
	account_id: String,
	current: RwLock<Option<AccessToken>>,
	refresh_guard: AsyncMutex<()>,
	epoch: AtomicU64,
	refreshes: AtomicU64,
	cancel: CancellationToken,
}
impl TokenManager {
	/// Creates a manager for the configured business unit.
	pub fn new(config: &EngineConfig, http: ReqwestClient, cancel: CancellationToken) -> Result<Self> {
		let token_endpoint = config.auth_base.join("v2/token").map_err(|e| {
			crate::error::ConfigError::InvalidValue { field: "auth_base", detail: e.to_string() }
		})?;

		Ok(Self {
			http,
			token_endpoint,
			client_id: config.client_id.clone(),
			client_secret: config.client_secret.clone(),
			account_id: config.account_id.clone(),
			current: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			epoch: AtomicU64::new(0),
			refreshes: AtomicU64::new(0),
			cancel,
		})
	}

	/// Returns a valid bearer token, refreshing it when stale.
	pub async fn bearer(&self) -> Result<String> {
		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		let _guard = self.refresh_guard.lock().await;

		// Double-check: the caller that held the guard before us may have
		// published a fresh token already.
		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		self.exchange_locked("stale_token").await
	}

	/// Invalidates the cached token and obtains a new one.
	///
	/// Concurrent calls collapse: whoever enters the guard after a refresh
	/// already happened (epoch moved) receives the published token without a
	/// second network exchange.
	pub async fn force_refresh(&self, reason: &str) -> Result<String> {
		let observed_epoch = self.epoch.load(Ordering::Acquire);
		let _guard = self.refresh_guard.lock().await;

		if self.epoch.load(Ordering::Acquire) != observed_epoch
			&& let Some(token) = self.fresh_token()
		{
			return Ok(token);
		}

		*self.current.write() = None;

		self.exchange_locked(reason).await
	}

	/// Number of credential exchanges performed so far.
	pub fn refresh_count(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	fn fresh_token(&self) -> Option<String> {
		self.current
			.read()
			.as_ref()
			.filter(|token| !token.is_stale())
			.map(|token| token.bearer().to_owned())
	}

	/// Performs the credential exchange with bounded retries. Must only be
	/// called while holding `refresh_guard`.
	async fn exchange_locked(&self, trigger: &str) -> Result<String> {
		let span = WorkSpan::credential_exchange(trigger);
		let mut last_transient: Option<BoxedFailure> = None;

		for attempt in 1..=REFRESH_ATTEMPTS {
			obs::emit(ObsEvent::Call { stage: Stage::Auth, outcome: Outcome::Attempt });

			match span.wrap(self.exchange_once()).await {
				Ok(token) => {
					let bearer = token.bearer().to_owned();

					*self.current.write() = Some(token);

					self.epoch.fetch_add(1, Ordering::AcqRel);
					self.refreshes.fetch_add(1, Ordering::Relaxed);
					obs::emit(ObsEvent::Call { stage: Stage::Auth, outcome: Outcome::Success });

					return Ok(bearer);
				},
				Err(ExchangeFailure::Fatal(failure)) => {
					obs::emit(ObsEvent::Call { stage: Stage::Auth, outcome: Outcome::Failure });

					return Err(failure);
				},
				Err(ExchangeFailure::Transient(failure)) => {
					obs::emit(ObsEvent::Call { stage: Stage::Auth, outcome: Outcome::Retry });

					last_transient = Some(failure);

					if attempt < REFRESH_ATTEMPTS {
						let backoff =
							StdDuration::from_millis(REFRESH_BACKOFF_BASE_MS << (attempt - 1));

						span.note_retry(attempt, backoff);

						tokio::select! {
							_ = tokio::time::sleep(backoff) => {},
							_ = self.cancel.cancelled() => return Err(Error::Canceled),
						}
					}
				},
			}
		}

		obs::emit(ObsEvent::Call { stage: Stage::Auth, outcome: Outcome::Failure });

		let source = last_transient.unwrap_or_else(|| "credential exchange never started".into());

		Err(AuthError::Exhausted { attempts: REFRESH_ATTEMPTS, source }.into())
	}

	async fn exchange_once(&self) -> Result<AccessToken, ExchangeFailure> {
		let request = TokenRequest {
			grant_type: "client_credentials",
			client_id: &self.client_id,
			client_secret: self.client_secret.expose(),
			account_id: &self.account_id,
		};
		let send = self.http.post(self.token_endpoint.clone()).json(&request).send();
		let response = tokio::select! {
			outcome = send => outcome,
			_ = self.cancel.cancelled() => return Err(ExchangeFailure::Fatal(Error::Canceled)),
		}
		.map_err(|e| ExchangeFailure::Transient(Box::new(e)))?;
		let status = response.status();
		let body = tokio::select! {
			outcome = response.bytes() => outcome,
			_ = self.cancel.cancelled() => return Err(ExchangeFailure::Fatal(Error::Canceled)),
		}
		.map_err(|e| ExchangeFailure::Transient(Box::new(e)))?;

		if !status.is_success() {
			let reason = String::from_utf8_lossy(&body).chars().take(200).collect::<String>();

			if status.as_u16() == 429 || status.is_server_error() {
				return Err(ExchangeFailure::Transient(
					format!("token endpoint answered HTTP {status}: {reason}").into(),
				));
			}

			return Err(ExchangeFailure::Fatal(
				AuthError::Rejected { reason, status: Some(status.as_u16()) }.into(),
			));
		}

		let issued_at = OffsetDateTime::now_utc();
		let deserializer = &mut serde_json::Deserializer::from_slice(&body);
		let parsed: TokenResponse =
			serde_path_to_error::deserialize(deserializer).map_err(|source| {
				ExchangeFailure::Fatal(
					ParseError::Json { source, status: Some(status.as_u16()) }.into(),
				)
			})?;

		if parsed.expires_in <= 0 {
			return Err(ExchangeFailure::Fatal(AuthError::InvalidExpiry.into()));
		}

		Ok(AccessToken::new(parsed.access_token, issued_at, parsed.expires_in))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn staleness_applies_the_skew_buffer() {
		let issued = macros::datetime!(2026-01-01 00:00 UTC);
		let token = AccessToken::new("bearer-value", issued, 3_600);

		assert!(!token.is_stale_at(macros::datetime!(2026-01-01 00:30 UTC)));
		// 59 minutes in: inside the 60-second skew window.
		assert!(token.is_stale_at(macros::datetime!(2026-01-01 00:59:30 UTC)));
		assert!(token.is_stale_at(macros::datetime!(2026-01-01 01:30 UTC)));
	}

	#[test]
	fn bearer_exposes_the_raw_secret_once() {
		let token = AccessToken::new("bearer-value", OffsetDateTime::now_utc(), 600);

		assert_eq!(token.bearer(), "bearer-value");
		assert!(format!("{token:?}").contains("<redacted>"));
	}
}
