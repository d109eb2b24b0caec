//! Canonical data model emitted by extractors: object kinds, normalized records, folders,
//! and per-extractor result envelopes.

pub mod relationship;

pub use relationship::*;

// self
use crate::{_prelude::*, error::ErrorCode};

/// Object categories the engine extracts from the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
	/// Automation Studio automation container.
	Automation,
	/// SQL query activity.
	Query,
	/// Server-side JavaScript activity.
	Script,
	/// File import activity.
	Import,
	/// Data extract activity.
	DataExtract,
	/// File transfer activity.
	FileTransfer,
	/// Data filter activity.
	Filter,
	/// Data extension (tabular storage).
	DataExtension,
	/// Classic email definition.
	Email,
	/// Journey Builder interaction.
	Journey,
	/// Journey entry event definition.
	EventDefinition,
	/// Triggered send definition.
	TriggeredSend,
	/// Subscriber list.
	List,
	/// Content Builder asset.
	Asset,
	/// Folder node from any folder surface.
	Folder,
	/// Sender profile.
	SenderProfile,
	/// Delivery profile.
	DeliveryProfile,
	/// Send classification.
	SendClassification,
}
impl ObjectKind {
	/// Every kind, in stable order; drives `full` runs and snapshot layout.
	pub const ALL: &'static [Self] = &[
		Self::Automation,
		Self::Query,
		Self::Script,
		Self::Import,
		Self::DataExtract,
		Self::FileTransfer,
		Self::Filter,
		Self::DataExtension,
		Self::Email,
		Self::Journey,
		Self::EventDefinition,
		Self::TriggeredSend,
		Self::List,
		Self::Asset,
		Self::Folder,
		Self::SenderProfile,
		Self::DeliveryProfile,
		Self::SendClassification,
	];

	/// Returns the stable snake_case label used on the wire and in file names.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Automation => "automation",
			Self::Query => "query",
			Self::Script => "script",
			Self::Import => "import",
			Self::DataExtract => "data_extract",
			Self::FileTransfer => "file_transfer",
			Self::Filter => "filter",
			Self::DataExtension => "data_extension",
			Self::Email => "email",
			Self::Journey => "journey",
			Self::EventDefinition => "event_definition",
			Self::TriggeredSend => "triggered_send",
			Self::List => "list",
			Self::Asset => "asset",
			Self::Folder => "folder",
			Self::SenderProfile => "sender_profile",
			Self::DeliveryProfile => "delivery_profile",
			Self::SendClassification => "send_classification",
		}
	}
}
impl Display for ObjectKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle status attached to extracted objects.
///
/// Known platform vocabulary is enumerated; anything else is carried verbatim in
/// [`ObjectStatus::Other`] so evolving server values never fail a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectStatus {
	/// Object is live.
	Active,
	/// Object is disabled but retained.
	Inactive,
	/// Object was soft-deleted on the platform.
	Deleted,
	/// Object was canceled before activation.
	Canceled,
	/// Object was created but never activated.
	New,
	/// Object is paused.
	Paused,
	/// Object is currently running.
	Running,
	/// Object is scheduled for a future run.
	Scheduled,
	/// Object is an unsaved or unpublished draft.
	Draft,
	/// Vocabulary the engine does not normalize; kept verbatim.
	Other(String),
}
impl ObjectStatus {
	/// Returns the canonical label (or the verbatim value for unknown vocabulary).
	pub fn as_str(&self) -> &str {
		match self {
			Self::Active => "Active",
			Self::Inactive => "Inactive",
			Self::Deleted => "Deleted",
			Self::Canceled => "Canceled",
			Self::New => "New",
			Self::Paused => "Paused",
			Self::Running => "Running",
			Self::Scheduled => "Scheduled",
			Self::Draft => "Draft",
			Self::Other(value) => value,
		}
	}
}
impl From<String> for ObjectStatus {
	fn from(value: String) -> Self {
		match value.to_ascii_lowercase().as_str() {
			"active" => Self::Active,
			"inactive" => Self::Inactive,
			"deleted" => Self::Deleted,
			"canceled" | "cancelled" => Self::Canceled,
			"new" => Self::New,
			"paused" => Self::Paused,
			"running" => Self::Running,
			"scheduled" => Self::Scheduled,
			"draft" => Self::Draft,
			_ => Self::Other(value),
		}
	}
}
impl From<ObjectStatus> for String {
	fn from(status: ObjectStatus) -> Self {
		status.as_str().to_owned()
	}
}
impl Display for ObjectStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Normalized object emitted by exactly one extractor.
///
/// Records are immutable after emission; enrichment happens on the raw payloads
/// before transformation, never on an emitted record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectRecord {
	/// Object category.
	pub kind: ObjectKind,
	/// Opaque identifier, unique within the kind.
	pub id: String,
	/// External (customer) key, when the platform exposes one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub customer_key: Option<String>,
	/// Display name.
	pub name: String,
	/// Owning folder identifier, when the object lives in a folder surface.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub folder_id: Option<String>,
	/// Resolved breadcrumb path for the owning folder.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub folder_path: Option<String>,
	/// Creation timestamp as reported by the platform.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_date: Option<String>,
	/// Last-modification timestamp as reported by the platform.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub modified_date: Option<String>,
	/// Type-specific lifecycle status.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<ObjectStatus>,
	/// Open map for type-specific fields (query text, target DE, activities, ...).
	#[serde(default, skip_serializing_if = "JsonMap::is_empty")]
	pub attributes: JsonMap<String, Value>,
}
impl ObjectRecord {
	/// Creates a minimal record; optional fields start empty.
	pub fn new(kind: ObjectKind, id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			kind,
			id: id.into(),
			customer_key: None,
			name: name.into(),
			folder_id: None,
			folder_path: None,
			created_date: None,
			modified_date: None,
			status: None,
			attributes: JsonMap::new(),
		}
	}

	/// Attaches the external key.
	pub fn with_customer_key(mut self, key: impl Into<String>) -> Self {
		self.customer_key = Some(key.into());

		self
	}

	/// Attaches the owning folder id.
	pub fn with_folder_id(mut self, folder_id: impl Into<String>) -> Self {
		self.folder_id = Some(folder_id.into());

		self
	}

	/// Attaches the resolved breadcrumb path.
	pub fn with_folder_path(mut self, path: impl Into<String>) -> Self {
		self.folder_path = Some(path.into());

		self
	}

	/// Attaches creation/modification timestamps.
	pub fn with_dates(mut self, created: Option<String>, modified: Option<String>) -> Self {
		self.created_date = created;
		self.modified_date = modified;

		self
	}

	/// Attaches a lifecycle status.
	pub fn with_status(mut self, status: ObjectStatus) -> Self {
		self.status = Some(status);

		self
	}

	/// Inserts a type-specific attribute.
	pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
		self.attributes.insert(key.into(), value);

		self
	}
}

/// Folder node from one of the platform's folder forests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
	/// Folder identifier, unique within its content type.
	pub id: String,
	/// Parent folder identifier; `None` at a forest root.
	pub parent_id: Option<String>,
	/// Display name.
	pub name: String,
	/// Content type the folder forest is keyed by.
	pub content_type: String,
}

/// Lightweight definition lookup entry kept in definition caches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSummary {
	/// Definition identifier.
	pub id: String,
	/// Display name.
	pub name: String,
	/// External key, when exposed.
	pub customer_key: Option<String>,
}

/// Terminal status of one extractor run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorStatus {
	/// Every page and item was processed.
	Ok,
	/// Some items or pages failed; accumulated output is still valid.
	Partial,
	/// Cancellation interrupted the extractor; accumulated output is surfaced.
	Aborted,
	/// A fatal transport/auth/cache failure prevented meaningful output.
	Failed,
}
impl ExtractorStatus {
	/// Returns the stable label used in statistics documents.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Partial => "partial",
			Self::Aborted => "aborted",
			Self::Failed => "failed",
		}
	}
}
impl Display for ExtractorStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Per-item failure collected during extraction without aborting the run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionError {
	/// Stable wire code for the failure class.
	pub code: ErrorCode,
	/// Identifier of the item the failure belongs to, when item-scoped.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub item_id: Option<String>,
	/// Human-readable failure summary.
	pub message: String,
}
impl ExtractionError {
	/// Builds a record from an engine error, optionally scoped to an item.
	pub fn from_error(error: &crate::error::Error, item_id: Option<String>) -> Self {
		Self { code: error.code(), item_id, message: error.to_string() }
	}
}

/// Counters stamped on every extractor result.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ExtractorCounters {
	/// Raw records fetched from list endpoints.
	pub fetched: u64,
	/// Normalized objects emitted.
	pub emitted: u64,
	/// Per-item detail requests performed during enrichment.
	pub detail_calls: u64,
	/// References that could not be resolved against caches or static scans.
	pub unresolved_references: u64,
	/// Wall-clock duration of the extractor run.
	pub duration_ms: u64,
}

/// Everything one extractor produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorResult {
	/// Extractor kind.
	pub kind: ObjectKind,
	/// Terminal status.
	pub status: ExtractorStatus,
	/// Normalized objects, in no particular order.
	pub items: Vec<ObjectRecord>,
	/// Per-item failures collected along the way.
	pub errors: Vec<ExtractionError>,
	/// Relationship edges emitted after their owning items.
	pub edges: Vec<RelationshipEdge>,
	/// Run counters.
	pub counters: ExtractorCounters,
}
impl ExtractorResult {
	/// Creates an empty result shell for the provided kind.
	pub fn new(kind: ObjectKind) -> Self {
		Self {
			kind,
			status: ExtractorStatus::Ok,
			items: Vec::new(),
			errors: Vec::new(),
			edges: Vec::new(),
			counters: ExtractorCounters::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn kind_labels_round_trip_through_serde() {
		for kind in ObjectKind::ALL {
			let json = serde_json::to_string(kind).expect("Kind should serialize.");

			assert_eq!(json, format!("\"{kind}\""));

			let parsed: ObjectKind = serde_json::from_str(&json).expect("Kind should parse back.");

			assert_eq!(parsed, *kind);
		}
	}

	#[test]
	fn status_normalizes_known_vocabulary_case_insensitively() {
		assert_eq!(ObjectStatus::from("DELETED".to_owned()), ObjectStatus::Deleted);
		assert_eq!(ObjectStatus::from("cancelled".to_owned()), ObjectStatus::Canceled);
		assert_eq!(
			ObjectStatus::from("SuperseededByPlatform".to_owned()),
			ObjectStatus::Other("SuperseededByPlatform".into()),
		);
	}

	#[test]
	fn record_serialization_skips_empty_optionals() {
		let record = ObjectRecord::new(ObjectKind::Query, "q-1", "Nightly dedupe");
		let json = serde_json::to_string(&record).expect("Record should serialize.");

		assert!(!json.contains("folder_id"));
		assert!(!json.contains("attributes"));

		let parsed: ObjectRecord = serde_json::from_str(&json).expect("Record should parse back.");

		assert_eq!(parsed.id, "q-1");
		assert_eq!(parsed.kind, ObjectKind::Query);
	}
}
