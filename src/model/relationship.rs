//! Typed relationship edges connecting extracted objects.

// self
use crate::{_prelude::*, model::ObjectKind};

/// Enumerated edge vocabulary; snake_case labels are the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum RelationshipKind {
	AutomationContainsQuery,
	AutomationContainsScript,
	AutomationContainsImport,
	AutomationContainsDataExtract,
	AutomationContainsFileTransfer,
	AutomationContainsFilter,
	AutomationContainsEmail,
	AutomationContainsAutomation,
	AutomationContainsVerification,
	QueryReadsDe,
	QueryWritesDe,
	JourneyUsesEmail,
	JourneyUsesDe,
	JourneyUsesAutomation,
	JourneyUsesFilter,
	JourneyUsesEvent,
	JourneyUsesTriggeredSend,
	TriggeredSendUsesEmail,
	TriggeredSendUsesList,
	TriggeredSendUsesSenderProfile,
	TriggeredSendUsesDeliveryProfile,
	TriggeredSendUsesSendClassification,
	TriggeredSendUsesDe,
	EventDefinitionUsesDe,
	ImportWritesDe,
	FilterUsesDe,
	DataExtractReadsDe,
	SendClassificationUsesSenderProfile,
	SendClassificationUsesDeliveryProfile,
}
impl RelationshipKind {
	/// Returns the stable snake_case label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AutomationContainsQuery => "automation_contains_query",
			Self::AutomationContainsScript => "automation_contains_script",
			Self::AutomationContainsImport => "automation_contains_import",
			Self::AutomationContainsDataExtract => "automation_contains_data_extract",
			Self::AutomationContainsFileTransfer => "automation_contains_file_transfer",
			Self::AutomationContainsFilter => "automation_contains_filter",
			Self::AutomationContainsEmail => "automation_contains_email",
			Self::AutomationContainsAutomation => "automation_contains_automation",
			Self::AutomationContainsVerification => "automation_contains_verification",
			Self::QueryReadsDe => "query_reads_de",
			Self::QueryWritesDe => "query_writes_de",
			Self::JourneyUsesEmail => "journey_uses_email",
			Self::JourneyUsesDe => "journey_uses_de",
			Self::JourneyUsesAutomation => "journey_uses_automation",
			Self::JourneyUsesFilter => "journey_uses_filter",
			Self::JourneyUsesEvent => "journey_uses_event",
			Self::JourneyUsesTriggeredSend => "journey_uses_triggered_send",
			Self::TriggeredSendUsesEmail => "triggered_send_uses_email",
			Self::TriggeredSendUsesList => "triggered_send_uses_list",
			Self::TriggeredSendUsesSenderProfile => "triggered_send_uses_sender_profile",
			Self::TriggeredSendUsesDeliveryProfile => "triggered_send_uses_delivery_profile",
			Self::TriggeredSendUsesSendClassification => "triggered_send_uses_send_classification",
			Self::TriggeredSendUsesDe => "triggered_send_uses_de",
			Self::EventDefinitionUsesDe => "event_definition_uses_de",
			Self::ImportWritesDe => "import_writes_de",
			Self::FilterUsesDe => "filter_uses_de",
			Self::DataExtractReadsDe => "data_extract_reads_de",
			Self::SendClassificationUsesSenderProfile => "send_classification_uses_sender_profile",
			Self::SendClassificationUsesDeliveryProfile =>
				"send_classification_uses_delivery_profile",
		}
	}
}
impl Display for RelationshipKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One endpoint of a relationship edge; the name is carried for audit output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoint {
	/// Endpoint object kind.
	pub kind: ObjectKind,
	/// Endpoint identifier; empty when only a name is known (resolved later).
	pub id: String,
	/// Display name at extraction time.
	pub name: String,
}
impl EdgeEndpoint {
	/// Creates an endpoint with a known identifier.
	pub fn new(kind: ObjectKind, id: impl Into<String>, name: impl Into<String>) -> Self {
		Self { kind, id: id.into(), name: name.into() }
	}

	/// Creates an endpoint known only by name; the Relationship Builder resolves
	/// it against the per-kind name index or synthesizes an external id.
	pub fn by_name(kind: ObjectKind, name: impl Into<String>) -> Self {
		Self { kind, id: String::new(), name: name.into() }
	}

	/// Returns `true` when the endpoint still lacks an identifier.
	pub fn is_name_only(&self) -> bool {
		self.id.is_empty()
	}
}

/// Directed labeled edge between two extracted (or external) objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
	/// Owning object the reference was found on.
	pub source: EdgeEndpoint,
	/// Edge label.
	pub kind: RelationshipKind,
	/// Referenced object.
	pub target: EdgeEndpoint,
	/// `true` when the target was not extracted in this run.
	#[serde(default)]
	pub dangling: bool,
}
impl RelationshipEdge {
	/// Creates a non-dangling edge; the Relationship Builder recomputes the flag.
	pub fn new(source: EdgeEndpoint, kind: RelationshipKind, target: EdgeEndpoint) -> Self {
		Self { source, kind, target, dangling: false }
	}

	/// 5-tuple identity used for deduplication.
	pub fn dedupe_key(&self) -> EdgeKey {
		EdgeKey {
			source_kind: self.source.kind,
			source_id: self.source.id.clone(),
			kind: self.kind,
			target_kind: self.target.kind,
			target_id: self.target.id.clone(),
		}
	}
}

/// Owned 5-tuple identity of an edge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
	/// Source kind component.
	pub source_kind: ObjectKind,
	/// Source id component.
	pub source_id: String,
	/// Edge label component.
	pub kind: RelationshipKind,
	/// Target kind component.
	pub target_kind: ObjectKind,
	/// Target id component.
	pub target_id: String,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_match_serde_wire_format() {
		let json = serde_json::to_string(&RelationshipKind::QueryReadsDe)
			.expect("Edge kind should serialize.");

		assert_eq!(json, "\"query_reads_de\"");
		assert_eq!(RelationshipKind::QueryReadsDe.to_string(), "query_reads_de");
		assert_eq!(
			serde_json::to_string(&RelationshipKind::AutomationContainsDataExtract).unwrap(),
			format!("\"{}\"", RelationshipKind::AutomationContainsDataExtract),
		);
	}

	#[test]
	fn dedupe_key_ignores_names_and_dangling_flag() {
		let a = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Query, "q-1", "Nightly dedupe"),
			RelationshipKind::QueryReadsDe,
			EdgeEndpoint::new(ObjectKind::DataExtension, "de-1", "Subscribers"),
		);
		let mut b = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Query, "q-1", "renamed"),
			RelationshipKind::QueryReadsDe,
			EdgeEndpoint::new(ObjectKind::DataExtension, "de-1", "renamed too"),
		);

		b.dangling = true;

		assert_eq!(a.dedupe_key(), b.dedupe_key());
	}

	#[test]
	fn name_only_endpoints_report_missing_ids() {
		let endpoint = EdgeEndpoint::by_name(ObjectKind::DataExtension, "de_a");

		assert!(endpoint.is_name_only());
		assert!(!EdgeEndpoint::new(ObjectKind::DataExtension, "de-1", "de_a").is_name_only());
	}
}
