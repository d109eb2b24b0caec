//! Versioned lookup table classifying automation step activities.
//!
//! The platform's activity vocabulary evolves server-side, so classification
//! is data, not code: each entry maps an `objectTypeId` and key to the object
//! kind it references and the edge emitted for that reference. Unknown codes
//! are counted as unresolved, never treated as errors.

// self
use crate::model::{ObjectKind, RelationshipKind};

/// One classified activity code.
#[derive(Clone, Copy, Debug)]
pub struct ActivityType {
	/// Numeric `objectTypeId` carried on automation step activities.
	pub object_type_id: u64,
	/// Platform key for the activity family.
	pub key: &'static str,
	/// Object kind the activity's `activityObjectId` references, when any.
	pub target_kind: Option<ObjectKind>,
	/// Edge emitted for the reference, when any.
	pub edge: Option<RelationshipKind>,
}

/// Versioned activity classification table.
#[derive(Clone, Copy, Debug)]
pub struct ActivityCatalog {
	version: &'static str,
	entries: &'static [ActivityType],
}
impl ActivityCatalog {
	/// Returns the catalog bundled with this build.
	pub const fn current() -> &'static Self {
		&CURRENT
	}

	/// Vocabulary version stamp recorded in statistics.
	pub const fn version(&self) -> &'static str {
		self.version
	}

	/// Looks an activity up by its numeric `objectTypeId`.
	pub fn by_object_type_id(&self, id: u64) -> Option<&'static ActivityType> {
		self.entries.iter().find(|entry| entry.object_type_id == id)
	}

	/// Looks an activity up by its platform key, case-insensitively.
	pub fn by_key(&self, key: &str) -> Option<&'static ActivityType> {
		self.entries.iter().find(|entry| entry.key.eq_ignore_ascii_case(key))
	}

	/// Number of classified codes.
	pub const fn len(&self) -> usize {
		self.entries.len()
	}

	/// `true` when the catalog carries no entries (never, for bundled tables).
	pub const fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

const CURRENT: ActivityCatalog = ActivityCatalog {
	version: "2026-07",
	entries: &[
		ActivityType {
			object_type_id: 300,
			key: "QueryActivity",
			target_kind: Some(ObjectKind::Query),
			edge: Some(RelationshipKind::AutomationContainsQuery),
		},
		ActivityType {
			object_type_id: 423,
			key: "ImportActivity",
			target_kind: Some(ObjectKind::Import),
			edge: Some(RelationshipKind::AutomationContainsImport),
		},
		ActivityType {
			object_type_id: 425,
			key: "ScriptActivity",
			target_kind: Some(ObjectKind::Script),
			edge: Some(RelationshipKind::AutomationContainsScript),
		},
		ActivityType {
			object_type_id: 73,
			key: "DataExtractActivity",
			target_kind: Some(ObjectKind::DataExtract),
			edge: Some(RelationshipKind::AutomationContainsDataExtract),
		},
		ActivityType {
			object_type_id: 303,
			key: "FileTransferActivity",
			target_kind: Some(ObjectKind::FileTransfer),
			edge: Some(RelationshipKind::AutomationContainsFileTransfer),
		},
		ActivityType {
			object_type_id: 296,
			key: "FilterActivity",
			target_kind: Some(ObjectKind::Filter),
			edge: Some(RelationshipKind::AutomationContainsFilter),
		},
		ActivityType {
			object_type_id: 42,
			key: "EMAILV2",
			target_kind: Some(ObjectKind::Email),
			edge: Some(RelationshipKind::AutomationContainsEmail),
		},
		ActivityType {
			object_type_id: 726,
			key: "FireAutomation",
			target_kind: Some(ObjectKind::Automation),
			edge: Some(RelationshipKind::AutomationContainsAutomation),
		},
		ActivityType {
			object_type_id: 772,
			key: "Verification",
			target_kind: Some(ObjectKind::DataExtension),
			edge: Some(RelationshipKind::AutomationContainsVerification),
		},
		ActivityType {
			object_type_id: 53,
			key: "DataFactoryUtility",
			target_kind: None,
			edge: None,
		},
		ActivityType { object_type_id: 467, key: "Wait", target_kind: None, edge: None },
		ActivityType { object_type_id: 725, key: "RefreshGroup", target_kind: None, edge: None },
		ActivityType {
			object_type_id: 733,
			key: "RefreshMobileFilteredList",
			target_kind: None,
			edge: None,
		},
		ActivityType { object_type_id: 84, key: "ReportDefinition", target_kind: None, edge: None },
		ActivityType {
			object_type_id: 736,
			key: "InteractionStudioData",
			target_kind: None,
			edge: None,
		},
		ActivityType { object_type_id: 756, key: "SalesforceEmailSend", target_kind: None, edge: None },
		ActivityType { object_type_id: 771, key: "SalesforceSend", target_kind: None, edge: None },
		ActivityType { object_type_id: 749, key: "InteractionEntry", target_kind: None, edge: None },
		ActivityType { object_type_id: 952, key: "PushMessageSend", target_kind: None, edge: None },
		ActivityType { object_type_id: 1010, key: "GroupRefresh", target_kind: None, edge: None },
		ActivityType { object_type_id: 1101, key: "JourneyEntryAudience", target_kind: None, edge: None },
		ActivityType { object_type_id: 724, key: "SmsSend", target_kind: None, edge: None },
	],
};

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn catalog_carries_a_version_and_twenty_plus_codes() {
		let catalog = ActivityCatalog::current();

		assert!(!catalog.version().is_empty());
		assert!(catalog.len() > 20);
	}

	#[test]
	fn lookups_work_by_id_and_case_insensitive_key() {
		let catalog = ActivityCatalog::current();
		let query = catalog.by_object_type_id(300).expect("Query activity should be classified.");

		assert_eq!(query.edge, Some(RelationshipKind::AutomationContainsQuery));
		assert_eq!(query.target_kind, Some(ObjectKind::Query));

		let email = catalog.by_key("emailv2").expect("EMAILV2 should be classified.");

		assert_eq!(email.target_kind, Some(ObjectKind::Email));
		assert!(catalog.by_object_type_id(999_999).is_none());
	}

	#[test]
	fn pass_through_activities_emit_no_edges() {
		let wait = ActivityCatalog::current()
			.by_key("Wait")
			.expect("Wait should be classified.");

		assert_eq!(wait.edge, None);
		assert_eq!(wait.target_kind, None);
	}
}
