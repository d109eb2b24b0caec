//! Query extractor: REST list plus a best-effort regex scan of the SQL text
//! for data-extension references.

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

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?i)\b(?:from|join)\s+(\[[^\]]+\]|"[^"]+"|[A-Za-z0-9_][A-Za-z0-9_.\-]*)"#)
		.expect("Table-reference pattern is statically valid.")
});

/// Extracts SQL query activities and their read/write DE references.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryExtractor;
impl Extractor for QueryExtractor {
	fn kind(&self) -> ObjectKind {
		ObjectKind::Query
	}

	fn required_caches(&self) -> &'static [CacheKind] {
		&[CacheKind::QueryFolders]
	}

	fn fetch<'a>(&'a self, cx: &'a ExtractorContext) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(cx.paced_pages(ObjectKind::Query, "/automation/v1/queries", &[]))
	}

	fn enrich<'a>(&'a self, cx: &'a ExtractorContext, raw: Vec<Value>) -> ExtractFuture<'a, Vec<Value>> {
		Box::pin(async move {
			let mut enriched = raw;

			for item in &mut enriched {
				cx.attach_breadcrumb(CacheKind::QueryFolders, item, "categoryId").await?;
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
			let Some(id) = string_field(item, "queryDefinitionId") else {
				let failure: Error =
					ParseError::MissingField { field: "queryDefinitionId", context: "query" }
						.into();

				cx.record_error(
					ObjectKind::Query,
					ExtractionError::from_error(&failure, item_identity(item)),
				);

				continue;
			};
			let name = string_field(item, "name").unwrap_or_else(|| id.clone());
			let mut record = ObjectRecord::new(ObjectKind::Query, id.clone(), name.clone())
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
			if let Some(target_name) = string_field(item, "targetName") {
				record = record.with_attribute("targetName", Value::String(target_name));
			}
			if let Some(target_id) = string_field(item, "targetId") {
				record = record.with_attribute("targetId", Value::String(target_id));
			}
			if let Some(update_type) = string_field(item, "targetUpdateTypeName") {
				record = record.with_attribute("targetUpdateType", Value::String(update_type));
			}

			let query_text = string_field(item, "queryText").unwrap_or_default();

			if cx.options.include_content && !query_text.is_empty() {
				record =
					record.with_attribute("queryText", Value::String(query_text.clone()));
			}

			let source = EdgeEndpoint::new(ObjectKind::Query, id, name);

			for referenced in sql_references(&query_text) {
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::QueryReadsDe,
					EdgeEndpoint::by_name(ObjectKind::DataExtension, referenced),
				));
			}

			let target = match (string_field(item, "targetId"), string_field(item, "targetName")) {
				(Some(target_id), target_name) => Some(EdgeEndpoint::new(
					ObjectKind::DataExtension,
					target_id,
					target_name.unwrap_or_default(),
				)),
				(None, Some(target_name)) =>
					Some(EdgeEndpoint::by_name(ObjectKind::DataExtension, target_name)),
				(None, None) => None,
			};

			if let Some(target) = target {
				edges.push(RelationshipEdge::new(
					source.clone(),
					RelationshipKind::QueryWritesDe,
					target,
				));
			}

			items.push(record);
		}

		Ok((items, edges))
	}
}

/// Scans SQL text for `FROM`/`JOIN` table references.
///
/// Intentionally regex-based and best-effort: brackets and quotes are
/// stripped, multi-part names keep their last segment, and system names
/// (leading `_`, `dual`, `sys*`) are filtered. Duplicates collapse
/// case-insensitively, keeping the first spelling.
pub fn sql_references(sql: &str) -> Vec<String> {
	let mut seen: HashSet<String> = HashSet::new();
	let mut references = Vec::new();

	for capture in TABLE_REFERENCE.captures_iter(sql) {
		let raw = capture[1].trim();
		let unwrapped = raw
			.strip_prefix('[')
			.and_then(|rest| rest.strip_suffix(']'))
			.or_else(|| raw.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))
			.unwrap_or(raw)
			.trim();
		let name = unwrapped.rsplit('.').next().unwrap_or(unwrapped).trim();

		if name.is_empty() || is_system_name(name) {
			continue;
		}
		if seen.insert(name.to_ascii_lowercase()) {
			references.push(name.to_owned());
		}
	}

	references
}

fn is_system_name(name: &str) -> bool {
	name.starts_with('_')
		|| name.eq_ignore_ascii_case("dual")
		|| name.to_ascii_lowercase().starts_with("sys")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scan_finds_from_and_join_references() {
		let sql = "SELECT a.x, b.y FROM de_a a JOIN de_b b ON a.k = b.k";

		assert_eq!(sql_references(sql), vec!["de_a".to_owned(), "de_b".to_owned()]);
	}

	#[test]
	fn scan_strips_brackets_quotes_and_schema_prefixes() {
		let sql = r#"SELECT * FROM [Master Subscribers] JOIN "quoted de" q ON 1=1
			LEFT JOIN ENT.shared_de s ON 1=1"#;

		assert_eq!(sql_references(sql), vec![
			"Master Subscribers".to_owned(),
			"quoted de".to_owned(),
			"shared_de".to_owned(),
		]);
	}

	#[test]
	fn scan_filters_system_names() {
		let sql = "SELECT * FROM _Sent s JOIN dual d ON 1=1 JOIN sysinfo i ON 1=1 JOIN de_ok o ON 1=1";

		assert_eq!(sql_references(sql), vec!["de_ok".to_owned()]);
	}

	#[test]
	fn scan_dedupes_case_insensitively_keeping_first_spelling() {
		let sql = "SELECT * FROM De_A JOIN de_a x ON 1=1 JOIN DE_A y ON 1=1";

		assert_eq!(sql_references(sql), vec!["De_A".to_owned()]);
	}

	#[test]
	fn scan_handles_empty_and_commentary_sql() {
		assert!(sql_references("").is_empty());
		assert!(sql_references("SELECT 1").is_empty());
	}
}
