//! Event definition extractor: REST list with DE reference edges.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{ExtractFuture, Extractor, ExtractorContext, item_identity},
	model::{
		EdgeEndpoint, ExtractionError, ObjectKind, ObjectRecord, RelationshipEdge,
		RelationshipKind,
	},
};

/// Extracts journey entry event definitions.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventDefinitionExtractor;
impl Extractor for EventDefinitionExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::EventDefinition
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(ObjectKind::EventDefinition, "/interaction/v1/eventDefinitions", &[]))
	}

	fn transform(
		&self,
		cx: &ExtractorContext,
		raw: Vec<Value>,
	) -> Result<(Vec<ObjectRecord>, Vec<RelationshipEdge>)> {
		let mut items = Vec::with_capacity(raw.len());
		let mut edges = Vec::new();

		for item in &raw {
			let Some(id) = string_field(item, "id") else {
				let failure: Error =
					ParseError::MissingField { field: "id", context: "event definition" }.into();

				cx.record_error(
					ObjectKind::EventDefinition,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record =
				ObjectRecord::new(ObjectKind::EventDefinition, id.clone(), name.clone())
					.with_dates(
						string_field(item, "createdDate"),
						string_field(item, "modifiedDate"),
					);

			if let Some(key) = string_field(item, "eventDefinitionKey") {
				record = record.with_customer_key(key);
			}
			if let Some(event_type) = string_field(item, "type") {
				record = record.with_attribute("eventType", Value::String(event_type));
			}

			if let Some(de_id) = string_field(item, "dataExtensionId") {
				let de_name = string_field(item, "dataExtensionName").unwrap_or_default();

				edges.push(RelationshipEdge::new(
					EdgeEndpoint::new(ObjectKind::EventDefinition, id, name),
					RelationshipKind::EventDefinitionUsesDe,
					EdgeEndpoint::new(ObjectKind::DataExtension, de_id, de_name),
				));
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}
