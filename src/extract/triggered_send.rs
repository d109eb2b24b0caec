//! Triggered send extractor: SOAP retrieve with reference edges to emails,
//! lists, profiles, and send classifications.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{ExtractFuture, Extractor, ExtractorContext, item_identity, nested_string},
	model::{
		EdgeEndpoint, ExtractionError, ObjectKind, ObjectRecord, ObjectStatus, RelationshipEdge,
		RelationshipKind,
	},
};

const PROPERTIES: &[&str] = &[
	"ObjectID",
	"CustomerKey",
	"Name",
	"CategoryID",
	"CreatedDate",
	"ModifiedDate",
	"TriggeredSendStatus",
	"Email.ID",
	"List.ID",
	"SenderProfile.ObjectID",
	"DeliveryProfile.ObjectID",
	"SendClassification.ObjectID",
];

/// Extracts triggered send definitions.
///
/// Status is normalized to the platform's five-value vocabulary
/// (Active/Inactive/Deleted/Canceled/New); folder path and name survive into
/// the record so the graph can apply the journey-builder orphan rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriggeredSendExtractor;
impl Extractor for TriggeredSendExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::TriggeredSend
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::TriggeredSendFolders, CacheKind::EmailDefinitions]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_retrieve(
			ObjectKind::TriggeredSend,
			"TriggeredSendDefinition",
			PROPERTIES,
			None,
		))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = raw;

			for item in &mut enriched {
				cx.attach_breadcrumb(CacheKind::TriggeredSendFolders, item, "CategoryID").await?;
			}

			Ok(enriched)
		})
	}

	fn transform(
		&self,
		cx: &ExtractorContext,
		raw: Vec<Value>,
	) -> Result<(Vec<ObjectRecord>, Vec<RelationshipEdge>)> {
		let mut items = Vec::with_capacity(raw.len());
		let mut edges = Vec::new();

		for record_raw in &raw {
			let Some(id) = string_field(record_raw, "ObjectID") else {
				let failure: Error =
					ParseError::MissingField { field: "ObjectID", context: "triggered send" }
						.into();

				cx.record_error(
					ObjectKind::TriggeredSend,
					ExtractionError::from_error(&failure, item_identity(record_raw)),
				);

				continue;
			};
			let name = string_field(record_raw, "Name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::TriggeredSend, id.clone(), name.clone())
				.with_dates(
					string_field(record_raw, "CreatedDate"),
					string_field(record_raw, "ModifiedDate"),
				);

			if let Some(key) = string_field(record_raw, "CustomerKey") {
				record = record.with_customer_key(key);
			}
			if let Some(folder_id) = string_field(record_raw, "CategoryID") {
				record = record.with_folder_id(folder_id);
			}
			if let Some(path) = string_field(record_raw, "_folderPath") {
				record = record.with_folder_path(path);
			}
			if let Some(status) = string_field(record_raw, "TriggeredSendStatus") {
				record = record.with_status(ObjectStatus::from(status));
			}

			let source = EdgeEndpoint::new(ObjectKind::TriggeredSend, id, name);

			for (path, edge_kind, target_kind) in REFERENCE_TABLE {
				let Some(target_id) = nested_string(record_raw, path) else {
					continue;
				};
				let target_name = resolve_email_name(cx, *target_kind, &target_id);

				edges.push(RelationshipEdge::new(
					source.clone(),
					*edge_kind,
					EdgeEndpoint::new(*target_kind, target_id, target_name),
				));
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}

const REFERENCE_TABLE: &[(&[&str], RelationshipKind, ObjectKind)] = &[
	(&["Email", "ID"], RelationshipKind::TriggeredSendUsesEmail, ObjectKind::Email),
	(&["List", "ID"], RelationshipKind::TriggeredSendUsesList, ObjectKind::List),
	(
		&["SenderProfile", "ObjectID"],
		RelationshipKind::TriggeredSendUsesSenderProfile,
		ObjectKind::SenderProfile,
	),
	(
		&["DeliveryProfile", "ObjectID"],
		RelationshipKind::TriggeredSendUsesDeliveryProfile,
		ObjectKind::DeliveryProfile,
	),
	(
		&["SendClassification", "ObjectID"],
		RelationshipKind::TriggeredSendUsesSendClassification,
		ObjectKind::SendClassification,
	),
];

fn resolve_email_name(cx: &ExtractorContext, target_kind: ObjectKind, target_id: &str) -> String {
	if target_kind != ObjectKind::Email {
		return String::new();
	}

	cx.caches
		.peek(CacheKind::EmailDefinitions)
		.and_then(|table| table.definition(target_id).map(|definition| definition.name.clone()))
		.unwrap_or_default()
}
