//! Journey extractor: REST list + detail, walking activities and entry
//! triggers for references to emails, data extensions, automations, filters,
//! and event definitions.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{
		ExtractFuture, Extractor, ExtractorContext, detail_fan_out, item_identity, nested_string,
		paced_detail_get,
	},
	model::{
		EdgeEndpoint, ExtractionError, ObjectKind, ObjectRecord, ObjectStatus, RelationshipEdge,
		RelationshipKind,
	},
};

/// Extracts Journey Builder interactions and their outbound references.
#[derive(Clone, Copy, Debug, Default)]
pub struct JourneyExtractor;
impl Extractor for JourneyExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::Journey
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::JourneyFolders]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(ObjectKind::Journey, "/interaction/v1/interactions", &[]))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = if cx.options.include_details {
				detail_fan_out(cx, ObjectKind::Journey, raw, |item| {
					let rest = cx.rest.clone();
					let limiter = cx.limiter.clone();
					let id = string_field(item, "id");
					let fallback = item.clone();

					async move {
						match id {
							Some(id) => {
								paced_detail_get(
									rest,
									limiter,
									ObjectKind::Journey,
									format!("/interaction/v1/interactions/{id}"),
								)
								.await
							},
							None => Ok(fallback),
						}
					}
				})
				.await?
			} else {
				raw
			};

			for item in &mut enriched {
				cx.attach_breadcrumb(CacheKind::JourneyFolders, item, "categoryId").await?;
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

		for item in &raw {
			let Some(id) = string_field(item, "id") else {
				let failure: Error =
					ParseError::MissingField { field: "id", context: "journey" }.into();

				cx.record_error(
					ObjectKind::Journey,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::Journey, id.clone(), name.clone())
				.with_dates(
					string_field(item, "createdDate"),
					string_field(item, "modifiedDate"),
				);

			if let Some(key) = string_field(item, "key") {
				record = record.with_customer_key(key);
			}
			if let Some(status) = string_field(item, "status") {
				record = record.with_status(ObjectStatus::from(status));
			}
			if let Some(folder_id) = string_field(item, "categoryId") {
				record = record.with_folder_id(folder_id);
			}
			if let Some(path) = string_field(item, "_folderPath") {
				record = record.with_folder_path(path);
			}
			if let Some(version) = item.get("version").and_then(Value::as_u64) {
				record = record.with_attribute("version", Value::Number(version.into()));
			}

			let source = EdgeEndpoint::new(ObjectKind::Journey, id, name);
			let activities =
				item.get("activities").and_then(Value::as_array).cloned().unwrap_or_default();

			record = record
				.with_attribute("activityCount", Value::Number(activities.len().into()));

			let mut unresolved = 0;

			for activity in &activities {
				unresolved += classify_activity(&source, activity, &mut edges);
			}

			if unresolved > 0 {
				cx.add_unresolved(unresolved);
			}

			for trigger in
				item.get("triggers").and_then(Value::as_array).cloned().unwrap_or_default()
			{
				classify_trigger(&source, &trigger, &mut edges);
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}

/// Classifies one activity; returns the number of unresolved references.
fn classify_activity(
	source: &EdgeEndpoint,
	activity: &Value,
	edges: &mut Vec<RelationshipEdge>,
) -> u64 {
	let kind = string_field(activity, "type").unwrap_or_default().to_ascii_uppercase();
	let config = activity.get("configurationArguments").cloned().unwrap_or(Value::Null);
	let label = string_field(activity, "name").unwrap_or_default();
	let mut unresolved = 0;

	match kind.as_str() {
		"EMAILV2" => {
			if let Some(email_id) = nested_string(&config, &["triggeredSend", "emailId"])
				.or_else(|| string_field(&config, "emailId"))
			{
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::JourneyUsesEmail,
					EdgeEndpoint::new(ObjectKind::Email, email_id, label.clone()),
				));
			}
			if let Some(ts_id) =
				nested_string(&config, &["triggeredSend", "triggeredSendDefinitionId"])
					.or_else(|| string_field(&config, "triggeredSendDefinitionId"))
			{
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::JourneyUsesTriggeredSend,
					EdgeEndpoint::new(ObjectKind::TriggeredSend, ts_id, label),
				));
			}
		},
		"FIREAUTOMATION" => {
			if let Some(automation_id) = string_field(&config, "automationId") {
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::JourneyUsesAutomation,
					EdgeEndpoint::new(ObjectKind::Automation, automation_id, label),
				));
			} else {
				unresolved += 1;
			}
		},
		_ => {
			// Contact-update, CRM, and split activities reference DEs and
			// filters through their configuration payloads.
			if let Some(de_id) = string_field(&config, "dataExtensionId")
				.or_else(|| nested_string(&config, &["dataExtension", "id"]))
			{
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::JourneyUsesDe,
					EdgeEndpoint::new(ObjectKind::DataExtension, de_id, label.clone()),
				));
			}
			if let Some(filter_id) = string_field(&config, "filterDefinitionId") {
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::JourneyUsesFilter,
					EdgeEndpoint::new(ObjectKind::Filter, filter_id, label),
				));
			}
		},
	}

	unresolved
}

fn classify_trigger(source: &EdgeEndpoint, trigger: &Value, edges: &mut Vec<RelationshipEdge>) {
	let meta = trigger.get("metaData").cloned().unwrap_or(Value::Null);

	if let Some(event_id) = string_field(&meta, "eventDefinitionId") {
		let event_name = string_field(&meta, "eventDefinitionKey").unwrap_or_default();

		edges.push(RelationshipEdge::new(
			source.clone(),
			RelationshipKind::JourneyUsesEvent,
			EdgeEndpoint::new(ObjectKind::EventDefinition, event_id, event_name),
		));
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn email_activities_emit_email_and_triggered_send_edges() {
		let source = EdgeEndpoint::new(ObjectKind::Journey, "j-1", "Welcome");
		let activity = serde_json::json!({
			"type": "EMAILV2",
			"name": "Welcome email",
			"configurationArguments": {
				"triggeredSend": {
					"emailId": "e-9",
					"triggeredSendDefinitionId": "ts-4",
				},
			},
		});
		let mut edges = Vec::new();
		let unresolved = classify_activity(&source, &activity, &mut edges);

		assert_eq!(unresolved, 0);
		assert_eq!(edges.len(), 2);
		assert_eq!(edges[0].kind, RelationshipKind::JourneyUsesEmail);
		assert_eq!(edges[0].target.id, "e-9");
		assert_eq!(edges[1].kind, RelationshipKind::JourneyUsesTriggeredSend);
	}

	#[test]
	fn contact_update_activities_emit_de_edges() {
		let source = EdgeEndpoint::new(ObjectKind::Journey, "j-1", "Welcome");
		let activity = serde_json::json!({
			"type": "UPDATECONTACTDATA",
			"name": "Stamp contact",
			"configurationArguments": {"dataExtensionId": "de-3"},
		});
		let mut edges = Vec::new();

		classify_activity(&source, &activity, &mut edges);

		assert_eq!(edges.len(), 1);
		assert_eq!(edges[0].kind, RelationshipKind::JourneyUsesDe);
		assert_eq!(edges[0].target.id, "de-3");
	}

	#[test]
	fn fire_automation_without_an_id_counts_unresolved() {
		let source = EdgeEndpoint::new(ObjectKind::Journey, "j-1", "Welcome");
		let activity = serde_json::json!({
			"type": "FIREAUTOMATION",
			"name": "Kick nightly load",
			"configurationArguments": {},
		});
		let mut edges = Vec::new();
		let unresolved = classify_activity(&source, &activity, &mut edges);

		assert_eq!(unresolved, 1);
		assert!(edges.is_empty());
	}

	#[test]
	fn triggers_emit_event_edges() {
		let source = EdgeEndpoint::new(ObjectKind::Journey, "j-1", "Welcome");
		let trigger = serde_json::json!({
			"metaData": {
				"eventDefinitionId": "ev-7",
				"eventDefinitionKey": "APIEvent-abc",
			},
		});
		let mut edges = Vec::new();

		classify_trigger(&source, &trigger, &mut edges);

		assert_eq!(edges.len(), 1);
		assert_eq!(edges[0].kind, RelationshipKind::JourneyUsesEvent);
		assert_eq!(edges[0].target.name, "APIEvent-abc");
	}

	#[test]
	fn nested_string_walks_paths_and_tolerates_missing_segments() {
		let value = serde_json::json!({"a": {"b": {"c": "leaf"}}});

		assert_eq!(nested_string(&value, &["a", "b", "c"]), Some("leaf".into()));
		assert_eq!(nested_string(&value, &["a", "nope", "c"]), None);
	}
}
