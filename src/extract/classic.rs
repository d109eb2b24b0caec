//! Classic SOAP object extractors (emails, lists, sender/delivery profiles,
//! send classifications, folders) sharing one retrieve shape.

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

/// Wiring for one classic SOAP surface.
#[derive(Clone, Copy, Debug)]
struct ClassicSpec {
	kind: ObjectKind,
	object_type: &'static str,
	id_field: &'static str,
	name_field: &'static str,
	properties: &'static [&'static str],
	folder_cache: Option<CacheKind>,
	category_field: Option<&'static str>,
	status_field: Option<&'static str>,
	attribute_fields: &'static [(&'static str, &'static str)],
	edges: &'static [(&'static [&'static str], RelationshipKind, ObjectKind)],
}

/// Shared extractor over the classic SOAP retrieve surfaces.
#[derive(Clone, Copy, Debug)]
pub struct ClassicExtractor {
	spec: ClassicSpec,
	caches: &'static [CacheKind],
}
impl ClassicExtractor {
	/// Classic email definitions.
	pub fn email() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::Email,
				object_type: "Email",
				id_field: "ID",
				name_field: "Name",
				properties: &[
					"ID",
					"Name",
					"Subject",
					"CategoryID",
					"CreatedDate",
					"ModifiedDate",
					"Status",
				],
				folder_cache: Some(CacheKind::EmailFolders),
				category_field: Some("CategoryID"),
				status_field: Some("Status"),
				attribute_fields: &[("Subject", "subject")],
				edges: &[],
			},
			caches: &[CacheKind::EmailFolders],
		}
	}

	/// Subscriber lists.
	pub fn list() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::List,
				object_type: "List",
				id_field: "ID",
				name_field: "ListName",
				properties: &["ID", "ListName", "Category", "CreatedDate", "ModifiedDate", "Type"],
				folder_cache: Some(CacheKind::ListFolders),
				category_field: Some("Category"),
				status_field: None,
				attribute_fields: &[("Type", "listType")],
				edges: &[],
			},
			caches: &[CacheKind::ListFolders],
		}
	}

	/// Sender profiles.
	pub fn sender_profile() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::SenderProfile,
				object_type: "SenderProfile",
				id_field: "ObjectID",
				name_field: "Name",
				properties: &[
					"ObjectID",
					"CustomerKey",
					"Name",
					"FromName",
					"FromAddress",
					"CreatedDate",
					"ModifiedDate",
				],
				folder_cache: None,
				category_field: None,
				status_field: None,
				attribute_fields: &[("FromName", "fromName"), ("FromAddress", "fromAddress")],
				edges: &[],
			},
			caches: &[],
		}
	}

	/// Delivery profiles.
	pub fn delivery_profile() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::DeliveryProfile,
				object_type: "DeliveryProfile",
				id_field: "ObjectID",
				name_field: "Name",
				properties: &["ObjectID", "CustomerKey", "Name", "CreatedDate", "ModifiedDate"],
				folder_cache: None,
				category_field: None,
				status_field: None,
				attribute_fields: &[],
				edges: &[],
			},
			caches: &[],
		}
	}

	/// Send classifications; their profile references feed the orphan rules.
	pub fn send_classification() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::SendClassification,
				object_type: "SendClassification",
				id_field: "ObjectID",
				name_field: "Name",
				properties: &[
					"ObjectID",
					"CustomerKey",
					"Name",
					"SenderProfile.ObjectID",
					"DeliveryProfile.ObjectID",
					"CreatedDate",
					"ModifiedDate",
				],
				folder_cache: None,
				category_field: None,
				status_field: None,
				attribute_fields: &[],
				edges: &[
					(
						&["SenderProfile", "ObjectID"],
						RelationshipKind::SendClassificationUsesSenderProfile,
						ObjectKind::SenderProfile,
					),
					(
						&["DeliveryProfile", "ObjectID"],
						RelationshipKind::SendClassificationUsesDeliveryProfile,
						ObjectKind::DeliveryProfile,
					),
				],
			},
			caches: &[],
		}
	}

	/// The folder forests themselves, emitted as inventory objects.
	pub fn folders() -> Self {
		Self {
			spec: ClassicSpec {
				kind: ObjectKind::Folder,
				object_type: "DataFolder",
				id_field: "ID",
				name_field: "Name",
				properties: &[
					"ID",
					"Name",
					"ContentType",
					"ParentFolder.ID",
					"CreatedDate",
					"ModifiedDate",
				],
				folder_cache: None,
				category_field: None,
				status_field: None,
				attribute_fields: &[("ContentType", "contentType")],
				edges: &[],
			},
			caches: &[],
		}
	}
}
impl Extractor for ClassicExtractor {
	fn kind(&self) -> ObjectKind {
		self.spec.kind
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		self.caches
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_retrieve(self.spec.kind, self.spec.object_type, self.spec.properties, None))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = raw;

			if let (Some(cache), Some(field)) = (self.spec.folder_cache, self.spec.category_field)
			{
				for item in &mut enriched {
					cx.attach_breadcrumb(cache, item, field).await?;
				}
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
			let Some(id) = string_field(record_raw, self.spec.id_field) else {
				let failure: Error = ParseError::MissingField {
					field: self.spec.id_field,
					context: "classic object",
				}
				.into();

				cx.record_error(
					self.spec.kind,
					ExtractionError::from_error(&failure, item_identity(record_raw)),
				);

				continue;
			};
			let name =
				string_field(record_raw, self.spec.name_field).unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(self.spec.kind, id.clone(), name.clone())
				.with_dates(
					string_field(record_raw, "CreatedDate"),
					string_field(record_raw, "ModifiedDate"),
				);

			if let Some(key) = string_field(record_raw, "CustomerKey") {
				record = record.with_customer_key(key);
			}
			if let Some(category_field) = self.spec.category_field
				&& let Some(folder_id) = string_field(record_raw, category_field)
			{
				record = record.with_folder_id(folder_id);
			}
			if let Some(path) = string_field(record_raw, "_folderPath") {
				record = record.with_folder_path(path);
			}
			if let Some(status_field) = self.spec.status_field
				&& let Some(status) = string_field(record_raw, status_field)
			{
				record = record.with_status(ObjectStatus::from(status));
			}

			for (source_field, attribute) in self.spec.attribute_fields {
				if let Some(value) = string_field(record_raw, source_field) {
					record = record.with_attribute(*attribute, Value::String(value));
				}
			}

			// Folder records point at their parent through the regular
			// folder_id slot, keeping the snapshot shape uniform.
			if self.spec.kind == ObjectKind::Folder
				&& let Some(parent_id) = nested_string(record_raw, &["ParentFolder", "ID"])
				&& parent_id != "0"
			{
				record = record.with_folder_id(parent_id);
			}

			let source = EdgeEndpoint::new(self.spec.kind, id, name);

			for (path, edge_kind, target_kind) in self.spec.edges {
				let Some(target_id) = nested_string(record_raw, path) else {
					continue;
				};

				edges.push(RelationshipEdge::new(
					source.clone(),
					*edge_kind,
					EdgeEndpoint::new(*target_kind, target_id, String::new()),
				));
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn send_classifications_emit_profile_edges() {
		let extractor = ClassicExtractor::send_classification();

		assert_eq!(extractor.spec.edges.len(), 2);
		assert_eq!(extractor.kind(), ObjectKind::SendClassification);
	}

	#[test]
	fn lists_use_their_own_name_property() {
		let extractor = ClassicExtractor::list();

		assert_eq!(extractor.spec.name_field, "ListName");
		assert!(extractor.spec.properties.contains(&"ListName"));
	}

	#[test]
	fn folder_surface_reads_the_whole_forest() {
		let extractor = ClassicExtractor::folders();

		assert_eq!(extractor.spec.object_type, "DataFolder");
		assert!(extractor.required_caches().is_empty());
	}
}
