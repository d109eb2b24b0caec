//! Data extension extractor: SOAP retrieve with a bounded per-DE field
//! fan-out.

// self
use crate::{
	_prelude::*,
	cache::{CacheKind, string_field},
	error::ParseError,
	extract::{ExtractFuture, Extractor, ExtractorContext, detail_fan_out, item_identity},
	limit::{RateLimiter, RequestOutcome},
	model::{ExtractionError, ObjectKind, ObjectRecord, RelationshipEdge},
	transport::{SoapClient, SoapFilter},
};

const PROPERTIES: &[&str] = &[
	"ObjectID",
	"CustomerKey",
	"Name",
	"CategoryID",
	"CreatedDate",
	"ModifiedDate",
	"IsSendable",
];

/// Extracts data extensions; an endpoint in most edges, it emits none itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataExtensionExtractor;
impl Extractor for DataExtensionExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::DataExtension
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::DataExtensionFolders]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_retrieve(ObjectKind::DataExtension, "DataExtension", PROPERTIES, None))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = if cx.options.include_details {
				detail_fan_out(cx, ObjectKind::DataExtension, raw, |item| {
					let soap = cx.soap.clone();
					let limiter = cx.limiter.clone();
					let customer_key = string_field(item, "CustomerKey");
					let original = item.clone();

					async move {
						match customer_key {
							Some(key) => fetch_fields(soap, limiter, key, original).await,
							None => Ok(original),
						}
					}
				})
				.await?
			} else {
				raw
			};

			for item in &mut enriched {
				cx.attach_breadcrumb(CacheKind::DataExtensionFolders, item, "CategoryID").await?;
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

		for record_raw in &raw {
			let Some(id) = string_field(record_raw, "ObjectID") else {
				let failure: Error =
					ParseError::MissingField { field: "ObjectID", context: "data extension" }
						.into();

				cx.record_error(
					ObjectKind::DataExtension,
					ExtractionError::from_error(&failure, item_identity(record_raw)),
				);

				continue;
			};
			let name = string_field(record_raw, "Name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::DataExtension, id, name).with_dates(
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
			if let Some(sendable) = string_field(record_raw, "IsSendable") {
				record = record.with_attribute(
					"isSendable",
					Value::Bool(sendable.eq_ignore_ascii_case("true")),
				);
			}
			if let Some(fields) = record_raw.get("_fields") {
				record = record.with_attribute("fields", fields.clone());
			}

			items.push(record);
		}

		Ok((items, Vec::new()))
	}
}

async fn fetch_fields(
	soap: Arc<SoapClient>,
	limiter: Arc<RateLimiter>,
	customer_key: String,
	mut original: Value,
) -> Result<Value> {
	let filter = SoapFilter::equals("DataExtension.CustomerKey", customer_key);
	let permit = limiter.acquire(ObjectKind::DataExtension).await;
	let outcome = soap
		.retrieve_all(
			"DataExtensionField",
			&["Name", "FieldType", "MaxLength", "IsPrimaryKey"],
			Some(&filter),
		)
		.await;

	limiter.release(
		permit,
		if outcome.is_ok() { RequestOutcome::Success } else { RequestOutcome::Failure },
	);

	let retrieval = outcome?;
	let fields: Vec<Value> = retrieval
		.records
		.iter()
		.map(|field| {
			let mut summary = JsonMap::new();

			if let Some(name) = string_field(field, "Name") {
				summary.insert("name".into(), Value::String(name));
			}
			if let Some(field_type) = string_field(field, "FieldType") {
				summary.insert("type".into(), Value::String(field_type));
			}
			if let Some(primary) = string_field(field, "IsPrimaryKey") {
				summary
					.insert("primaryKey".into(), Value::Bool(primary.eq_ignore_ascii_case("true")));
			}

			Value::Object(summary)
		})
		.collect();

	if let Value::Object(map) = &mut original {
		map.insert("_fields".into(), Value::Array(fields));
	}

	Ok(original)
}
