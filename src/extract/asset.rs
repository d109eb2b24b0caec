//! Content Builder asset extractor.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{ExtractFuture, Extractor, ExtractorContext, item_identity},
	model::{ExtractionError, ObjectKind, ObjectRecord, ObjectStatus, RelationshipEdge},
};

/// Extracts Content Builder assets; content bytes ride along only when the
/// run opts into heavyweight content.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssetExtractor;
impl Extractor for AssetExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::Asset
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::AssetCategories]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(ObjectKind::Asset, "/asset/v1/content/assets", &[]))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = raw;

			for item in &mut enriched {
				// The asset payload nests its folder id under `category.id`.
				let category_id =
					item.get("category").and_then(|category| string_field(category, "id"));

				if let (Some(category_id), Value::Object(map)) = (category_id, &mut *item) {
					map.insert("_categoryId".into(), Value::String(category_id));
				}

				cx.attach_breadcrumb(CacheKind::AssetCategories, item, "_categoryId").await?;
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

		for item in &raw {
			let Some(id) = string_field(item, "id") else {
				let failure: Error =
					ParseError::MissingField { field: "id", context: "asset" }.into();

				cx.record_error(
					ObjectKind::Asset,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::Asset, id, name).with_dates(
				string_field(item, "createdDate"),
				string_field(item, "modifiedDate"),
			);

			if let Some(key) = string_field(item, "customerKey") {
				record = record.with_customer_key(key);
			}
			if let Some(folder_id) = string_field(item, "_categoryId") {
				record = record.with_folder_id(folder_id);
			}
			if let Some(path) = string_field(item, "_folderPath") {
				record = record.with_folder_path(path);
			}
			if let Some(status) = item.get("status").and_then(|status| string_field(status, "name"))
			{
				record = record.with_status(ObjectStatus::from(status));
			}
			if let Some(asset_type) =
				item.get("assetType").and_then(|asset_type| string_field(asset_type, "name"))
			{
				record = record.with_attribute("assetType", Value::String(asset_type));
			}
			if cx.options.include_content
				&& let Some(content) = item
					.get("views")
					.and_then(|views| views.get("html"))
					.and_then(|html| html.get("content"))
					.and_then(Value::as_str)
			{
				record = record.with_attribute("content", Value::String(content.to_owned()));
			}

			items.push(record);
		}

		Ok((items, Vec::new()))
	}
}
