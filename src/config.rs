//! Immutable engine configuration, credential redaction, and run presets.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, error::ConfigError, model::ObjectKind};

/// Redacted credential wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Named extractor-kind sets selectable instead of an explicit kind list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
	/// Automation surface plus the objects it references most.
	Quick,
	/// Every extractor kind.
	Full,
	/// Content surfaces (emails, assets, folders).
	Content,
	/// Journey Builder surface and its reference targets.
	Journey,
}
impl Preset {
	/// Expands the preset into its extractor kinds.
	pub fn kinds(self) -> Vec<ObjectKind> {
		match self {
			Self::Quick => vec![ObjectKind::Automation, ObjectKind::Query, ObjectKind::DataExtension],
			Self::Full => ObjectKind::ALL.to_vec(),
			Self::Content => vec![ObjectKind::Email, ObjectKind::Asset, ObjectKind::Folder],
			Self::Journey => vec![
				ObjectKind::Journey,
				ObjectKind::EventDefinition,
				ObjectKind::TriggeredSend,
				ObjectKind::Email,
				ObjectKind::DataExtension,
			],
		}
	}
}

/// Per-run knobs consumed by extractors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ExtractorOptions {
	/// Fetch per-object detail payloads during enrichment.
	pub include_details: bool,
	/// Carry heavyweight content (query text, script bodies, asset content).
	pub include_content: bool,
	/// Default REST page size; per-extractor overrides permitted.
	pub page_size: u32,
	/// Bound on concurrent per-item detail fetches inside one extractor.
	pub detail_concurrency: usize,
}
impl Default for ExtractorOptions {
	fn default() -> Self {
		Self { include_details: true, include_content: false, page_size: 50, detail_concurrency: 8 }
	}
}

/// Immutable record of endpoints, credentials, and concurrency knobs.
///
/// Construct through [`EngineConfig::builder`]; there is no mutation after
/// `build` succeeds. Tests build a fresh config per scenario.
#[derive(Clone, Debug)]
pub struct EngineConfig {
	/// REST API base URL for the business unit.
	pub rest_base: Url,
	/// SOAP API endpoint URL (`Service.asmx`).
	pub soap_base: Url,
	/// Auth base URL hosting `v2/token`.
	pub auth_base: Url,
	/// OAuth2 client identifier.
	pub client_id: String,
	/// OAuth2 client secret.
	pub client_secret: Secret,
	/// Business-unit identifier (`MID`) sent as `account_id`.
	pub account_id: String,
	/// Directory under which `inventory_*` snapshot directories are created.
	pub output_root: PathBuf,
	/// Extractor kinds a run covers when the caller passes no explicit list.
	pub kinds: Vec<ObjectKind>,
	/// Extractor knobs.
	pub options: ExtractorOptions,
	/// Global bound on concurrently running extractor kinds.
	pub max_concurrency: usize,
	/// Connect+read timeout applied to every HTTP request.
	pub request_timeout: StdDuration,
	/// Soft per-extractor deadline; crossing it surfaces a timeout error
	/// without aborting sibling extractors.
	pub extractor_deadline: StdDuration,
}
impl EngineConfig {
	/// Returns a builder with every knob at its default.
	pub fn builder() -> EngineConfigBuilder {
		EngineConfigBuilder::default()
	}
}

/// Builder for [`EngineConfig`] with build-time validation.
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
	rest_base: Option<Url>,
	soap_base: Option<Url>,
	auth_base: Option<Url>,
	client_id: Option<String>,
	client_secret: Option<Secret>,
	account_id: Option<String>,
	output_root: Option<PathBuf>,
	kinds: Option<Vec<ObjectKind>>,
	options: ExtractorOptions,
	max_concurrency: Option<usize>,
	request_timeout: Option<StdDuration>,
	extractor_deadline: Option<StdDuration>,
}
impl EngineConfigBuilder {
	/// Sets the REST base URL.
	pub fn rest_base(mut self, url: Url) -> Self {
		self.rest_base = Some(url);

		self
	}

	/// Sets the SOAP endpoint URL.
	pub fn soap_base(mut self, url: Url) -> Self {
		self.soap_base = Some(url);

		self
	}

	/// Sets the auth base URL.
	pub fn auth_base(mut self, url: Url) -> Self {
		self.auth_base = Some(url);

		self
	}

	/// Sets the OAuth2 client identifier.
	pub fn client_id(mut self, value: impl Into<String>) -> Self {
		self.client_id = Some(value.into());

		self
	}

	/// Sets the OAuth2 client secret.
	pub fn client_secret(mut self, value: impl Into<String>) -> Self {
		self.client_secret = Some(Secret::new(value));

		self
	}

	/// Sets the business-unit identifier (`MID`).
	pub fn account_id(mut self, value: impl Into<String>) -> Self {
		self.account_id = Some(value.into());

		self
	}

	/// Sets the snapshot output root directory.
	pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
		self.output_root = Some(path.into());

		self
	}

	/// Sets an explicit extractor kind list.
	pub fn kinds(mut self, kinds: impl IntoIterator<Item = ObjectKind>) -> Self {
		self.kinds = Some(kinds.into_iter().collect());

		self
	}

	/// Expands a preset into the extractor kind list.
	pub fn preset(self, preset: Preset) -> Self {
		self.kinds(preset.kinds())
	}

	/// Overrides the extractor knobs wholesale.
	pub fn options(mut self, options: ExtractorOptions) -> Self {
		self.options = options;

		self
	}

	/// Toggles per-object detail fetches.
	pub fn include_details(mut self, value: bool) -> Self {
		self.options.include_details = value;

		self
	}

	/// Toggles heavyweight content capture.
	pub fn include_content(mut self, value: bool) -> Self {
		self.options.include_content = value;

		self
	}

	/// Overrides the default REST page size.
	pub fn page_size(mut self, value: u32) -> Self {
		self.options.page_size = value;

		self
	}

	/// Overrides the per-extractor detail fan-out bound.
	pub fn detail_concurrency(mut self, value: usize) -> Self {
		self.options.detail_concurrency = value;

		self
	}

	/// Overrides the global extractor concurrency bound.
	pub fn max_concurrency(mut self, value: usize) -> Self {
		self.max_concurrency = Some(value);

		self
	}

	/// Overrides the per-request timeout.
	pub fn request_timeout(mut self, value: StdDuration) -> Self {
		self.request_timeout = Some(value);

		self
	}

	/// Overrides the soft per-extractor deadline.
	pub fn extractor_deadline(mut self, value: StdDuration) -> Self {
		self.extractor_deadline = Some(value);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<EngineConfig, ConfigError> {
		let config = EngineConfig {
			rest_base: self.rest_base.ok_or(ConfigError::MissingField { field: "rest_base" })?,
			soap_base: self.soap_base.ok_or(ConfigError::MissingField { field: "soap_base" })?,
			auth_base: self.auth_base.ok_or(ConfigError::MissingField { field: "auth_base" })?,
			client_id: self.client_id.ok_or(ConfigError::MissingField { field: "client_id" })?,
			client_secret: self
				.client_secret
				.ok_or(ConfigError::MissingField { field: "client_secret" })?,
			account_id: self.account_id.ok_or(ConfigError::MissingField { field: "account_id" })?,
			output_root: self
				.output_root
				.ok_or(ConfigError::MissingField { field: "output_root" })?,
			kinds: self.kinds.unwrap_or_else(|| Preset::Full.kinds()),
			options: self.options,
			max_concurrency: self.max_concurrency.unwrap_or(4),
			request_timeout: self.request_timeout.unwrap_or(StdDuration::from_secs(60)),
			extractor_deadline: self.extractor_deadline.unwrap_or(StdDuration::from_secs(30 * 60)),
		};

		validate(&config)?;

		Ok(config)
	}
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
	if config.client_id.is_empty() {
		return Err(ConfigError::InvalidValue {
			field: "client_id",
			detail: "must not be empty".into(),
		});
	}
	if config.account_id.is_empty() || !config.account_id.bytes().all(|b| b.is_ascii_digit()) {
		return Err(ConfigError::InvalidValue {
			field: "account_id",
			detail: "must be a numeric business-unit id".into(),
		});
	}
	if config.options.page_size == 0 {
		return Err(ConfigError::InvalidValue {
			field: "page_size",
			detail: "must be at least 1".into(),
		});
	}
	if config.options.detail_concurrency == 0 {
		return Err(ConfigError::InvalidValue {
			field: "detail_concurrency",
			detail: "must be at least 1".into(),
		});
	}
	if config.max_concurrency == 0 {
		return Err(ConfigError::InvalidValue {
			field: "max_concurrency",
			detail: "must be at least 1".into(),
		});
	}
	if config.kinds.is_empty() {
		return Err(ConfigError::InvalidValue {
			field: "kinds",
			detail: "must select at least one extractor".into(),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn minimal_builder() -> EngineConfigBuilder {
		EngineConfig::builder()
			.rest_base("https://mc.rest.example.com".parse().expect("URL fixture should parse."))
			.soap_base(
				"https://mc.soap.example.com/Service.asmx"
					.parse()
					.expect("URL fixture should parse."),
			)
			.auth_base("https://mc.auth.example.com".parse().expect("URL fixture should parse."))
			.client_id("client-id")
			.client_secret("client-secret")
			.account_id("510001234")
			.output_root("./out")
	}

	#[test]
	fn builder_applies_defaults() {
		let config = minimal_builder().build().expect("Minimal config should validate.");

		assert_eq!(config.kinds, Preset::Full.kinds());
		assert_eq!(config.max_concurrency, 4);
		assert_eq!(config.options.page_size, 50);
		assert!(config.options.include_details);
		assert!(!config.options.include_content);
	}

	#[test]
	fn builder_rejects_missing_credentials() {
		let err = EngineConfig::builder()
			.rest_base("https://mc.rest.example.com".parse().expect("URL fixture should parse."))
			.build()
			.expect_err("Config without credentials should be rejected.");

		assert!(matches!(err, ConfigError::MissingField { .. }));
	}

	#[test]
	fn builder_rejects_non_numeric_account_id() {
		let err = minimal_builder()
			.account_id("not-a-mid")
			.build()
			.expect_err("Alphabetic MID should be rejected.");

		assert!(matches!(err, ConfigError::InvalidValue { field: "account_id", .. }));
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn presets_expand_to_expected_kinds() {
		assert_eq!(Preset::Full.kinds().len(), ObjectKind::ALL.len());
		assert!(Preset::Quick.kinds().contains(&ObjectKind::Automation));
		assert!(Preset::Journey.kinds().contains(&ObjectKind::EventDefinition));
		assert!(!Preset::Content.kinds().contains(&ObjectKind::Query));
	}
}
