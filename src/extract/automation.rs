//! Automation extractor: REST list, per-item detail, and activity
//! classification through the versioned catalog.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{
		ExtractFuture, Extractor, ExtractorContext, activity::ActivityCatalog, detail_fan_out,
		item_identity, paced_detail_get,
	},
	model::{
		EdgeEndpoint, ExtractionError, ObjectKind, ObjectRecord, ObjectStatus, RelationshipEdge,
	},
};

/// Extracts Automation Studio automations and their contained activities.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutomationExtractor;
impl Extractor for AutomationExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::Automation
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::AutomationFolders, CacheKind::QueryDefinitions, CacheKind::ScriptDefinitions]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(ObjectKind::Automation, "/automation/v1/automations", &[]))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = if cx.options.include_details {
				detail_fan_out(cx, ObjectKind::Automation, raw, |item| {
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
									ObjectKind::Automation,
									format!("/automation/v1/automations/{id}"),
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
				cx.attach_breadcrumb(CacheKind::AutomationFolders, item, "categoryId").await?;
			}

			Ok(enriched)
		})
	}

	fn transform(
		&self,
		cx: &ExtractorContext,
		raw: Vec<Value>,
	) -> Result<(Vec<ObjectRecord>, Vec<RelationshipEdge>)> {
		let catalog = ActivityCatalog::current();
		let mut items = Vec::with_capacity(raw.len());
		let mut edges = Vec::new();

		for item in &raw {
			let Some(id) = string_field(item, "id") else {
				let failure: Error =
					ParseError::MissingField { field: "id", context: "automation" }.into();

				cx.record_error(
					ObjectKind::Automation,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::Automation, id.clone(), name.clone())
				.with_dates(
					string_field(item, "createdDate"),
					string_field(item, "modifiedDate"),
				);

			if let Some(key) = string_field(item, "key") {
				record = record.with_customer_key(key);
			}
			if let Some(folder_id) = string_field(item, "categoryId") {
				record = record.with_folder_id(folder_id);
			}
			if let Some(path) = string_field(item, "_folderPath") {
				record = record.with_folder_path(path);
			}
			if let Some(status) = string_field(item, "status") {
				record = record.with_status(ObjectStatus::from(status));
			}

			let steps = item.get("steps").and_then(Value::as_array).cloned().unwrap_or_default();

			record =
				record.with_attribute("stepCount", Value::Number(steps.len().into()));

			if let Some(description) = string_field(item, "description") {
				record = record.with_attribute("description", Value::String(description));
			}

			let source = EdgeEndpoint::new(ObjectKind::Automation, id, name);

			for step in &steps {
				let activities =
					step.get("activities").and_then(Value::as_array).cloned().unwrap_or_default();

				for activity in &activities {
					self.classify_activity(cx, catalog, &source, activity, &mut edges);
				}
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}
impl AutomationExtractor {
	fn classify_activity(
		&self,
		cx: &ExtractorContext,
		catalog: &'static ActivityCatalog,
		source: &EdgeEndpoint,
		activity: &Value,
		edges: &mut Vec<RelationshipEdge>,
	) {
		let entry = activity
			.get("objectTypeId")
			.and_then(Value::as_u64)
			.and_then(|id| catalog.by_object_type_id(id))
			.or_else(|| {
				string_field(activity, "objectTypeKey")
					.and_then(|key| catalog.by_key(&key))
			});
		let Some(entry) = entry else {
			// Unknown vocabulary: counted, never fatal.
			cx.add_unresolved(1);

			return;
		};
		let (Some(target_kind), Some(edge_kind)) = (entry.target_kind, entry.edge) else {
			return;
		};
		let Some(target_id) = string_field(activity, "activityObjectId") else {
			cx.add_unresolved(1);

			return;
		};
		let target_name = self
			.resolve_definition_name(cx, target_kind, &target_id)
			.or_else(|| string_field(activity, "name"))
			.unwrap_or_else(|| target_id.clone());

		edges.push(RelationshipEdge::new(
			source.clone(),
			edge_kind,
			EdgeEndpoint::new(target_kind, target_id, target_name),
		));
	}

	fn resolve_definition_name(
		&self,
		cx: &ExtractorContext,
		target_kind: ObjectKind,
		target_id: &str,
	) -> Option<String> {
		let cache_kind = match target_kind {
			ObjectKind::Query => CacheKind::QueryDefinitions,
			ObjectKind::Script => CacheKind::ScriptDefinitions,
			_ => return None,
		};

		cx.caches
			.peek(cache_kind)?
			.definition(target_id)
			.map(|definition| definition.name.clone())
	}
}
