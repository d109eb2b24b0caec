//! Engine-level error types shared across transports, caches, extractors, and writers.

// self
use crate::{_prelude::*, model::ObjectKind};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential exchange or bearer-token failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Reference-table population failure.
	#[error(transparent)]
	Cache(#[from] CacheError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Non-fatal data problem observed in platform responses.
	#[error(transparent)]
	Consistency(#[from] ConsistencyError),
	/// Malformed JSON or XML payload.
	#[error(transparent)]
	Parse(#[from] ParseError),
	/// Transport failure (network, retry exhaustion, fatal status, SOAP fault).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Snapshot persistence failure.
	#[error(transparent)]
	Write(#[from] WriteError),

	/// An extractor exceeded its soft deadline; siblings keep running.
	#[error("Extractor `{kind}` exceeded its soft deadline after {elapsed_ms} ms.")]
	ExtractorTimeout {
		/// Extractor kind that timed out.
		kind: ObjectKind,
		/// Elapsed wall-clock time when the deadline fired.
		elapsed_ms: u64,
	},
	/// The run was canceled; in-flight work aborted cooperatively.
	#[error("Operation was canceled.")]
	Canceled,
}
impl Error {
	/// Stable wire code recorded in statistics documents and extraction error records.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Auth(_) => ErrorCode::AuthFailed,
			Self::Cache(_) => ErrorCode::CacheLoadFailed,
			Self::Config(_) => ErrorCode::ConfigInvalid,
			Self::Consistency(_) => ErrorCode::DataConsistency,
			Self::Parse(_) => ErrorCode::ParseError,
			Self::Transport(transport) => transport.code(),
			Self::Write(_) => ErrorCode::WriteFailed,
			Self::ExtractorTimeout { .. } => ErrorCode::ExtractorTimeout,
			Self::Canceled => ErrorCode::Canceled,
		}
	}

	/// Returns `true` when the error came from a cancellation signal.
	pub fn is_canceled(&self) -> bool {
		matches!(self, Self::Canceled)
	}
}

/// Stable error codes surfaced in `statistics.json` and per-item error records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Credential exchange failed or a request stayed unauthorized.
	AuthFailed,
	/// A retryable HTTP failure persisted through every attempt.
	HttpRetryableExhausted,
	/// The platform answered with a status that is never retried.
	HttpNonRetryable,
	/// A JSON or XML payload could not be decoded.
	ParseError,
	/// A required reference table could not be populated.
	CacheLoadFailed,
	/// An extractor exceeded its soft deadline.
	ExtractorTimeout,
	/// The run was canceled.
	Canceled,
	/// Platform data violated an expected invariant (cycles, runaway pages).
	DataConsistency,
	/// A snapshot file could not be written.
	WriteFailed,
	/// The engine configuration was rejected before any network call.
	ConfigInvalid,
}
impl ErrorCode {
	/// Returns the stable label used in serialized documents.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AuthFailed => "AUTH_FAILED",
			Self::HttpRetryableExhausted => "HTTP_RETRYABLE_EXHAUSTED",
			Self::HttpNonRetryable => "HTTP_NON_RETRYABLE",
			Self::ParseError => "PARSE_ERROR",
			Self::CacheLoadFailed => "CACHE_LOAD_FAILED",
			Self::ExtractorTimeout => "EXTRACTOR_TIMEOUT",
			Self::Canceled => "CANCELED",
			Self::DataConsistency => "DATA_CONSISTENCY",
			Self::WriteFailed => "WRITE_FAILED",
			Self::ConfigInvalid => "CONFIG_INVALID",
		}
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised before any network call.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required builder option was never provided.
	#[error("Missing required option `{field}`.")]
	MissingField {
		/// Option name as exposed on the builder.
		field: &'static str,
	},
	/// An option value failed validation.
	#[error("Option `{field}` is invalid: {detail}.")]
	InvalidValue {
		/// Option name as exposed on the builder.
		field: &'static str,
		/// Human-readable validation failure.
		detail: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Credential-exchange and bearer-token failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint rejected the credential exchange outright.
	#[error("Token endpoint rejected the credential exchange: {reason}.")]
	Rejected {
		/// Platform-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Credential exchange kept failing through the bounded retry budget.
	#[error("Credential exchange failed after {attempts} attempts.")]
	Exhausted {
		/// Attempts performed before giving up.
		attempts: u32,
		/// Last failure observed.
		#[source]
		source: BoxError,
	},
	/// Token endpoint returned a missing or non-positive expiry.
	#[error("Token endpoint response carried an unusable expiry.")]
	InvalidExpiry,
	/// A request was answered with HTTP 401 even after a forced token refresh.
	#[error("Request stayed unauthorized after a forced token refresh.")]
	StillUnauthorized,
}

/// Transport-level failures (network, retry exhaustion, fatal statuses).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Network-level failure that persisted through every retry attempt.
	#[error("Network error persisted after {attempts} attempts on {endpoint}.")]
	NetworkExhausted {
		/// Endpoint path the request targeted.
		endpoint: String,
		/// Attempts performed before giving up.
		attempts: u32,
		/// Last transport failure observed.
		#[source]
		source: BoxError,
	},
	/// Retryable HTTP status that persisted through every retry attempt.
	#[error("HTTP {status} persisted after {attempts} attempts on {endpoint}.")]
	RetryableExhausted {
		/// Endpoint path the request targeted.
		endpoint: String,
		/// Final HTTP status observed.
		status: u16,
		/// Attempts performed before giving up.
		attempts: u32,
	},
	/// HTTP status that is never retried.
	#[error("HTTP {status} returned by {endpoint}: {detail}.")]
	NonRetryable {
		/// Endpoint path the request targeted.
		endpoint: String,
		/// HTTP status observed.
		status: u16,
		/// Truncated response body for audit.
		detail: String,
	},
	/// The platform processed the envelope but reported a SOAP fault.
	#[error("SOAP fault returned by {endpoint}: {fault}.")]
	SoapFault {
		/// Endpoint path the request targeted.
		endpoint: String,
		/// Fault string extracted from the envelope.
		fault: String,
	},
}
impl TransportError {
	fn code(&self) -> ErrorCode {
		match self {
			Self::NetworkExhausted { .. } | Self::RetryableExhausted { .. } =>
				ErrorCode::HttpRetryableExhausted,
			Self::NonRetryable { .. } | Self::SoapFault { .. } => ErrorCode::HttpNonRetryable,
		}
	}
}

/// Payload decoding failures.
#[derive(Debug, ThisError)]
pub enum ParseError {
	/// Response JSON could not be decoded into the expected shape.
	#[error("Response JSON could not be decoded.")]
	Json {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Response XML could not be decoded.
	#[error("Response XML could not be decoded: {detail}.")]
	Xml {
		/// Human-readable parser failure.
		detail: String,
	},
	/// A field the engine depends on was absent from the payload.
	#[error("Expected field `{field}` was missing from a {context} payload.")]
	MissingField {
		/// Missing field name.
		field: &'static str,
		/// Payload family the field belongs to.
		context: &'static str,
	},
}

/// Reference-table population failures.
#[derive(Debug, ThisError)]
pub enum CacheError {
	/// A cache kind could not be populated; extractors requiring it fail.
	#[error("Cache `{kind}` failed to load.")]
	LoadFailed {
		/// Stable cache kind label.
		kind: &'static str,
		/// Underlying transport or parse failure.
		#[source]
		source: Box<Error>,
	},
	/// The kind already failed to load earlier in this run; loads are not
	/// retried beyond the transport's own retries.
	#[error("Cache `{kind}` is unavailable after an earlier load failure: {detail}.")]
	Unavailable {
		/// Stable cache kind label.
		kind: &'static str,
		/// Summary of the original failure.
		detail: String,
	},
}

/// Non-fatal data problems observed in platform responses; counted, not fatal.
#[derive(Debug, ThisError)]
pub enum ConsistencyError {
	/// A folder map contains a parent cycle.
	#[error("Folder `{folder_id}` participates in a parent cycle.")]
	FolderCycle {
		/// Folder identifier where the revisit was detected.
		folder_id: String,
	},
	/// Pagination ran into the hard page ceiling.
	#[error("Pagination on {endpoint} hit the {ceiling}-page ceiling.")]
	PageCeiling {
		/// Endpoint path being paginated.
		endpoint: String,
		/// Ceiling that was hit.
		ceiling: u32,
	},
}

/// Snapshot persistence failures.
#[derive(Debug, ThisError)]
pub enum WriteError {
	/// Filesystem operation failed.
	#[error("Failed to write `{path}`.")]
	Io {
		/// Path being written.
		path: String,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// A document could not be serialized.
	#[error("Failed to serialize the `{what}` document.")]
	Serialize {
		/// Document name.
		what: &'static str,
		/// Underlying serializer failure.
		#[source]
		source: serde_json::Error,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn codes_serialize_as_screaming_snake_labels() {
		let payload = serde_json::to_string(&ErrorCode::HttpRetryableExhausted)
			.expect("Error code should serialize to JSON.");

		assert_eq!(payload, "\"HTTP_RETRYABLE_EXHAUSTED\"");
		assert_eq!(ErrorCode::AuthFailed.as_str(), "AUTH_FAILED");
	}

	#[test]
	fn transport_variants_split_retryable_from_fatal() {
		let exhausted: Error = TransportError::RetryableExhausted {
			endpoint: "/automation/v1/automations".into(),
			status: 503,
			attempts: 3,
		}
		.into();
		let fatal: Error = TransportError::NonRetryable {
			endpoint: "/automation/v1/automations".into(),
			status: 404,
			detail: "not found".into(),
		}
		.into();

		assert_eq!(exhausted.code(), ErrorCode::HttpRetryableExhausted);
		assert_eq!(fatal.code(), ErrorCode::HttpNonRetryable);
	}

	#[test]
	fn cancellation_is_its_own_code() {
		assert_eq!(Error::Canceled.code(), ErrorCode::Canceled);
		assert!(Error::Canceled.is_canceled());
	}
}
