//! Automation Studio activity extractors (scripts, imports, data extracts,
//! file transfers, filters) sharing one REST list shape.

// std
use std::sync::LazyLock;
// crates.io
use regex::Regex;
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

static SCRIPT_DE_INIT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"DataExtension\.Init\s*\(\s*(?:"([^"]+)"|'([^']+)'|([^)\s]))"#)
		.expect("Script-reference pattern is statically valid.")
});

/// Wiring for one Automation Studio surface.
#[derive(Clone, Copy, Debug)]
struct StudioSpec {
	kind: ObjectKind,
	path: &'static str,
	id_field: &'static str,
	folder_cache: CacheKind,
	content_field: Option<&'static str>,
	de_reference: Option<(&'static str, RelationshipKind)>,
}

/// Shared extractor over the Automation Studio list endpoints.
#[derive(Clone, Copy, Debug)]
pub struct StudioExtractor {
	spec: StudioSpec,
	caches: &'static [CacheKind],
}
impl StudioExtractor {
	/// Server-side JavaScript activities.
	pub fn script() -> Self {
		Self {
			spec: StudioSpec {
				kind: ObjectKind::Script,
				path: "/automation/v1/scripts",
				id_field: "ssjsActivityId",
				folder_cache: CacheKind::ScriptFolders,
				content_field: Some("script"),
				de_reference: None,
			},
			caches: &[CacheKind::ScriptFolders],
		}
	}

	/// File import activities.
	pub fn import() -> Self {
		Self {
			spec: StudioSpec {
				kind: ObjectKind::Import,
				path: "/automation/v1/imports",
				id_field: "importDefinitionId",
				folder_cache: CacheKind::ImportFolders,
				content_field: None,
				de_reference: Some(("destinationObjectId", RelationshipKind::ImportWritesDe)),
			},
			caches: &[CacheKind::ImportFolders],
		}
	}

	/// Data extract activities.
	pub fn data_extract() -> Self {
		Self {
			spec: StudioSpec {
				kind: ObjectKind::DataExtract,
				path: "/automation/v1/dataextracts",
				id_field: "dataExtractDefinitionId",
				folder_cache: CacheKind::DataExtractFolders,
				content_field: None,
				de_reference: Some(("dataExtensionId", RelationshipKind::DataExtractReadsDe)),
			},
			caches: &[CacheKind::DataExtractFolders],
		}
	}

	/// File transfer activities.
	pub fn file_transfer() -> Self {
		Self {
			spec: StudioSpec {
				kind: ObjectKind::FileTransfer,
				path: "/automation/v1/filetransfers",
				id_field: "fileTransferActivityId",
				folder_cache: CacheKind::FileTransferFolders,
				content_field: None,
				de_reference: None,
			},
			caches: &[CacheKind::FileTransferFolders],
		}
	}

	/// Data filter activities.
	pub fn filter() -> Self {
		Self {
			spec: StudioSpec {
				kind: ObjectKind::Filter,
				path: "/automation/v1/filters",
				id_field: "filterActivityId",
				folder_cache: CacheKind::FilterFolders,
				content_field: None,
				de_reference: Some(("sourceObjectId", RelationshipKind::FilterUsesDe)),
			},
			caches: &[CacheKind::FilterFolders],
		}
	}
}
impl Extractor for StudioExtractor {
	fn kind(&self) -> ObjectKind {
		self.spec.kind
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		self.caches
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(self.spec.kind, self.spec.path, &[]))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = raw;

			for item in &mut enriched {
				cx.attach_breadcrumb(self.spec.folder_cache, item, "categoryId").await?;
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
			let Some(id) =
				string_field(item, self.spec.id_field).or_else(|| string_field(item, "id"))
			else {
				let failure: Error = ParseError::MissingField {
					field: self.spec.id_field,
					context: "automation studio activity",
				}
				.into();

				cx.record_error(
					self.spec.kind,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(self.spec.kind, id.clone(), name.clone())
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

			if let Some(content_field) = self.spec.content_field {
				let content = string_field(item, content_field);

				if let Some(content) = content {
					if self.spec.kind == ObjectKind::Script {
						let (referenced, unresolved) = script_de_references(&content);

						if !referenced.is_empty() {
							record = record.with_attribute(
								"referencedDataExtensions",
								Value::Array(
									referenced.into_iter().map(Value::String).collect(),
								),
							);
						}
						if unresolved > 0 {
							cx.add_unresolved(unresolved);
						}
					}
					if cx.options.include_content {
						record = record.with_attribute(content_field, Value::String(content));
					}
				}
			}

			if let Some((field, edge_kind)) = self.spec.de_reference
				&& let Some(target_id) = string_field(item, field)
			{
				edges.push(RelationshipEdge::new(
					EdgeEndpoint::new(self.spec.kind, id, name),
					edge_kind,
					EdgeEndpoint::new(
						ObjectKind::DataExtension,
						target_id,
						string_field(item, "destinationName").unwrap_or_default(),
					),
				));
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}

/// Static scan for `DataExtension.Init` references in SSJS bodies.
///
/// Literal arguments are collected; anything computed at runtime is counted as
/// unresolved. The scan is knowingly incomplete and is never extended to guess
/// dynamic references.
pub fn script_de_references(script: &str) -> (Vec<String>, u64) {
	let mut referenced = Vec::new();
	let mut seen: HashSet<String> = HashSet::new();
	let mut unresolved = 0;

	for capture in SCRIPT_DE_INIT.captures_iter(script) {
		let literal = capture.get(1).or_else(|| capture.get(2)).map(|m| m.as_str());

		match literal {
			Some(name) if !name.is_empty() => {
				if seen.insert(name.to_ascii_lowercase()) {
					referenced.push(name.to_owned());
				}
			},
			_ => unresolved += 1,
		}
	}

	(referenced, unresolved)
}
