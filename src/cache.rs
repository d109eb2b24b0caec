//! Lazy, thread-safe registry of reference tables (folder forests and
//! definition lookups) keyed by [`CacheKind`].
//!
//! Population is idempotent under a per-kind guard with a double-check inside
//! the critical section; published tables are `Arc` snapshots and all reads
//! after publication are lock-free. A kind that fails to load stays failed for
//! the rest of the run.

pub mod breadcrumb;

pub use breadcrumb::{Breadcrumb, BreadcrumbBuilder};

// std
use std::time::Instant;
// crates.io
use tokio::task::JoinSet;
// self
use crate::{
	_prelude::*,
	error::CacheError,
	model::{DefinitionSummary, Folder},
	obs::{self, ObsEvent, Outcome, Stage, WorkSpan},
	transport::{RestClient, SoapClient, SoapFilter},
};

/// Reference tables the engine can populate, one per remote surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
	/// REST Automation Studio folder forest.
	AutomationFolders,
	/// REST Content Builder category forest.
	AssetCategories,
	/// REST legacy email/journey category forest.
	JourneyFolders,
	/// SOAP `DataFolder` forest for data extensions.
	DataExtensionFolders,
	/// SOAP `DataFolder` forest for query activities.
	QueryFolders,
	/// SOAP `DataFolder` forest for triggered sends.
	TriggeredSendFolders,
	/// SOAP `DataFolder` forest for classic emails.
	EmailFolders,
	/// SOAP `DataFolder` forest for subscriber lists.
	ListFolders,
	/// SOAP `DataFolder` forest for filter activities.
	FilterFolders,
	/// SOAP `DataFolder` forest for script activities.
	ScriptFolders,
	/// SOAP `DataFolder` forest for import definitions.
	ImportFolders,
	/// SOAP `DataFolder` forest for data extracts.
	DataExtractFolders,
	/// SOAP `DataFolder` forest for file transfers.
	FileTransferFolders,
	/// Query definition lookup by id.
	QueryDefinitions,
	/// Script definition lookup by id.
	ScriptDefinitions,
	/// Classic email lookup by id.
	EmailDefinitions,
	/// Triggered send definition lookup by object id.
	TriggeredSendDefinitions,
}
impl CacheKind {
	/// Returns the stable label used in statistics and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AutomationFolders => "automation_folders",
			Self::AssetCategories => "asset_categories",
			Self::JourneyFolders => "journey_folders",
			Self::DataExtensionFolders => "data_extension_folders",
			Self::QueryFolders => "query_folders",
			Self::TriggeredSendFolders => "triggered_send_folders",
			Self::EmailFolders => "email_folders",
			Self::ListFolders => "list_folders",
			Self::FilterFolders => "filter_folders",
			Self::ScriptFolders => "script_folders",
			Self::ImportFolders => "import_folders",
			Self::DataExtractFolders => "data_extract_folders",
			Self::FileTransferFolders => "file_transfer_folders",
			Self::QueryDefinitions => "query_definitions",
			Self::ScriptDefinitions => "script_definitions",
			Self::EmailDefinitions => "email_definitions",
			Self::TriggeredSendDefinitions => "triggered_send_definitions",
		}
	}

	/// SOAP `DataFolder` content type, for kinds backed by that surface.
	const fn data_folder_content_type(self) -> Option<&'static str> {
		match self {
			Self::DataExtensionFolders => Some("dataextension"),
			Self::QueryFolders => Some("queryactivity"),
			Self::TriggeredSendFolders => Some("triggered_send"),
			Self::EmailFolders => Some("email"),
			Self::ListFolders => Some("list"),
			Self::FilterFolders => Some("filteractivity"),
			Self::ScriptFolders => Some("ssjsactivity"),
			Self::ImportFolders => Some("importdefinition"),
			Self::DataExtractFolders => Some("dataextract"),
			Self::FileTransferFolders => Some("filetransfer"),
			_ => None,
		}
	}
}
impl Display for CacheKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Published reference table.
#[derive(Clone, Debug)]
pub enum CacheTable {
	/// Folder forest keyed by folder id.
	Folders(HashMap<String, Folder>),
	/// Definition lookup keyed by definition id.
	Definitions(HashMap<String, DefinitionSummary>),
}
impl CacheTable {
	/// Entry count.
	pub fn len(&self) -> usize {
		match self {
			Self::Folders(map) => map.len(),
			Self::Definitions(map) => map.len(),
		}
	}

	/// Returns `true` when the table holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Folder lookup; `None` for definition tables.
	pub fn folder(&self, id: &str) -> Option<&Folder> {
		match self {
			Self::Folders(map) => map.get(id),
			Self::Definitions(_) => None,
		}
	}

	/// Definition lookup; `None` for folder tables.
	pub fn definition(&self, id: &str) -> Option<&DefinitionSummary> {
		match self {
			Self::Definitions(map) => map.get(id),
			Self::Folders(_) => None,
		}
	}
}

/// Serializable per-kind load statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheStats {
	/// Load duration in milliseconds.
	pub load_ms: u64,
	/// Entries in the published table.
	pub entries: usize,
	/// Unresolved references observed while the table was consumed.
	pub unresolved: u64,
}

/// Lazy, thread-safe cache registry shared by every extractor.
pub struct CacheManager {
	rest: Arc<RestClient>,
	soap: Arc<SoapClient>,
	page_size: u32,
	tables: RwLock<HashMap<CacheKind, Arc<CacheTable>>>,
	breadcrumbs: RwLock<HashMap<CacheKind, Arc<BreadcrumbBuilder>>>,
	guards: Mutex<HashMap<CacheKind, Arc<AsyncMutex<()>>>>,
	failures: Mutex<HashMap<CacheKind, String>>,
	stats: Mutex<HashMap<CacheKind, CacheStats>>,
}
impl CacheManager {
	/// Creates an empty registry over the two transports.
	pub fn new(rest: Arc<RestClient>, soap: Arc<SoapClient>, page_size: u32) -> Self {
		Self {
			rest,
			soap,
			page_size,
			tables: RwLock::new(HashMap::new()),
			breadcrumbs: RwLock::new(HashMap::new()),
			guards: Mutex::new(HashMap::new()),
			failures: Mutex::new(HashMap::new()),
			stats: Mutex::new(HashMap::new()),
		}
	}

	/// Returns the table for a kind, populating it on first access.
	pub async fn get(&self, kind: CacheKind) -> Result<Arc<CacheTable>> {
		if let Some(table) = self.tables.read().get(&kind) {
			return Ok(table.clone());
		}
		if let Some(detail) = self.failures.lock().get(&kind) {
			return Err(
				CacheError::Unavailable { kind: kind.as_str(), detail: detail.clone() }.into()
			);
		}

		let guard = self.population_guard(kind);
		let _locked = guard.lock().await;

		// Double-check inside the critical section: the guard holder before us
		// may have published the table or recorded a failure.
		if let Some(table) = self.tables.read().get(&kind) {
			return Ok(table.clone());
		}
		if let Some(detail) = self.failures.lock().get(&kind) {
			return Err(
				CacheError::Unavailable { kind: kind.as_str(), detail: detail.clone() }.into()
			);
		}

		let span = WorkSpan::cache_load(kind.as_str());
		let started = Instant::now();

		obs::emit(ObsEvent::Call { stage: Stage::Cache, outcome: Outcome::Attempt });

		match span.wrap(self.load(kind)).await {
			Ok(table) => {
				let table = Arc::new(table);

				self.stats.lock().insert(kind, CacheStats {
					load_ms: started.elapsed().as_millis() as u64,
					entries: table.len(),
					unresolved: 0,
				});
				self.tables.write().insert(kind, table.clone());
				obs::emit(ObsEvent::CachePublished { kind: kind.as_str(), entries: table.len() });

				Ok(table)
			},
			Err(failure) => {
				self.failures.lock().insert(kind, failure.to_string());
				obs::emit(ObsEvent::Call { stage: Stage::Cache, outcome: Outcome::Failure });

				Err(CacheError::LoadFailed { kind: kind.as_str(), source: Box::new(failure) }
					.into())
			},
		}
	}

	/// Lock-free read of an already-published table; `None` until the kind has
	/// been populated. Synchronous callers (transform stages) rely on the
	/// Runner having warmed their required kinds.
	pub fn peek(&self, kind: CacheKind) -> Option<Arc<CacheTable>> {
		self.tables.read().get(&kind).cloned()
	}

	/// Resolves a folder breadcrumb through the kind's memoized builder.
	pub async fn breadcrumb(&self, kind: CacheKind, folder_id: &str) -> Result<Arc<Breadcrumb>> {
		let builder = self.breadcrumbs.read().get(&kind).cloned();
		let builder = match builder {
			Some(builder) => builder,
			None => {
				let table = self.get(kind).await?;
				let builder = Arc::new(BreadcrumbBuilder::new(table));

				self.breadcrumbs.write().entry(kind).or_insert_with(|| builder.clone()).clone()
			},
		};
		let crumb = builder.resolve(folder_id);

		if !crumb.missing.is_empty() {
			let mut stats = self.stats.lock();

			if let Some(entry) = stats.get_mut(&kind) {
				entry.unresolved += crumb.missing.len() as u64;
			}
		}

		Ok(crumb)
	}

	/// Preloads a set of kinds with bounded parallelism; failures stay recorded
	/// per kind and only resurface for extractors that require them.
	pub async fn warm(self: &Arc<Self>, kinds: &[CacheKind], parallelism: usize) {
		let semaphore = Arc::new(tokio::sync::Semaphore::new(parallelism.max(1)));
		let mut join_set = JoinSet::new();

		for kind in kinds.iter().copied().collect::<std::collections::BTreeSet<_>>() {
			let manager = self.clone();
			let semaphore = semaphore.clone();

			join_set.spawn(async move {
				let _permit =
					semaphore.acquire_owned().await.expect("Warm semaphore is never closed.");
				let _ = manager.get(kind).await;
			});
		}

		while join_set.join_next().await.is_some() {}
	}

	/// Serializable snapshot of per-kind load statistics.
	pub fn stats(&self) -> BTreeMap<String, CacheStats> {
		self.stats
			.lock()
			.iter()
			.map(|(kind, stats)| (kind.as_str().to_owned(), stats.clone()))
			.collect()
	}

	fn population_guard(&self, kind: CacheKind) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(kind).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn load(&self, kind: CacheKind) -> Result<CacheTable> {
		if let Some(content_type) = kind.data_folder_content_type() {
			return self.load_data_folders(content_type).await;
		}

		match kind {
			CacheKind::AutomationFolders =>
				self.load_rest_folders("/automation/v1/folders", "automation").await,
			CacheKind::AssetCategories =>
				self.load_rest_folders("/asset/v1/content/categories", "asset").await,
			CacheKind::JourneyFolders =>
				self.load_rest_folders("/email/v1/categories", "journey").await,
			CacheKind::QueryDefinitions =>
				self.load_rest_definitions("/automation/v1/queries", "queryDefinitionId").await,
			CacheKind::ScriptDefinitions =>
				self.load_rest_definitions("/automation/v1/scripts", "ssjsActivityId").await,
			CacheKind::EmailDefinitions => self.load_soap_definitions("Email", "ID").await,
			CacheKind::TriggeredSendDefinitions =>
				self.load_soap_definitions("TriggeredSendDefinition", "ObjectID").await,
			_ => unreachable!("data-folder kinds are handled above"),
		}
	}

	async fn load_rest_folders(&self, path: &str, content_type: &str) -> Result<CacheTable> {
		let collection =
			self.rest.fetch_all_pages(path, &[], self.page_size, |_| {}).await?;
		let mut folders = HashMap::with_capacity(collection.items.len());

		for item in &collection.items {
			if let Some(folder) = folder_from_rest(item, content_type) {
				folders.insert(folder.id.clone(), folder);
			}
		}

		Ok(CacheTable::Folders(folders))
	}

	async fn load_data_folders(&self, content_type: &str) -> Result<CacheTable> {
		let filter = SoapFilter::equals("ContentType", content_type);
		let retrieval = self
			.soap
			.retrieve_all(
				"DataFolder",
				&["ID", "Name", "ContentType", "ParentFolder.ID"],
				Some(&filter),
			)
			.await?;
		let mut folders = HashMap::with_capacity(retrieval.records.len());

		for record in &retrieval.records {
			if let Some(folder) = folder_from_soap(record, content_type) {
				folders.insert(folder.id.clone(), folder);
			}
		}

		Ok(CacheTable::Folders(folders))
	}

	async fn load_rest_definitions(&self, path: &str, id_field: &str) -> Result<CacheTable> {
		let collection =
			self.rest.fetch_all_pages(path, &[], self.page_size, |_| {}).await?;
		let mut definitions = HashMap::with_capacity(collection.items.len());

		for item in &collection.items {
			let Some(id) = string_field(item, id_field) else {
				continue;
			};
			let name = string_field(item, "name").unwrap_or_default();
			let customer_key = string_field(item, "key");

			definitions.insert(id.clone(), DefinitionSummary { id, name, customer_key });
		}

		Ok(CacheTable::Definitions(definitions))
	}

	async fn load_soap_definitions(&self, object_type: &str, id_field: &str) -> Result<CacheTable> {
		let retrieval =
			self.soap.retrieve_all(object_type, &[id_field, "Name", "CustomerKey"], None).await?;
		let mut definitions = HashMap::with_capacity(retrieval.records.len());

		for record in &retrieval.records {
			let Some(id) = string_field(record, id_field) else {
				continue;
			};
			let name = string_field(record, "Name").unwrap_or_default();
			let customer_key = string_field(record, "CustomerKey");

			definitions.insert(id.clone(), DefinitionSummary { id, name, customer_key });
		}

		Ok(CacheTable::Definitions(definitions))
	}
}
impl Debug for CacheManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheManager").field("loaded", &self.tables.read().len()).finish()
	}
}

/// Reads a field as a string, tolerating numeric ids.
pub(crate) fn string_field(value: &Value, field: &str) -> Option<String> {
	match value.get(field) {
		Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
		Some(Value::Number(number)) => Some(number.to_string()),
		_ => None,
	}
}

fn folder_from_rest(item: &Value, content_type: &str) -> Option<Folder> {
	let id = string_field(item, "id")?;
	let parent_id = string_field(item, "parentId").filter(|parent| parent.as_str() != "0");
	let name = string_field(item, "name").unwrap_or_default();

	Some(Folder { id, parent_id, name, content_type: content_type.to_owned() })
}

fn folder_from_soap(record: &Value, content_type: &str) -> Option<Folder> {
	let id = string_field(record, "ID")?;
	let parent_id = record
		.get("ParentFolder")
		.and_then(|parent| string_field(parent, "ID"))
		.filter(|parent| parent.as_str() != "0");
	let name = string_field(record, "Name").unwrap_or_default();

	Some(Folder { id, parent_id, name, content_type: content_type.to_owned() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rest_folders_tolerate_numeric_ids_and_root_parents() {
		let item = serde_json::json!({"id": 42, "parentId": 0, "name": "Automations"});
		let folder = folder_from_rest(&item, "automation").expect("Folder should parse.");

		assert_eq!(folder.id, "42");
		assert_eq!(folder.parent_id, None);
		assert_eq!(folder.content_type, "automation");
	}

	#[test]
	fn soap_folders_read_the_nested_parent_id() {
		let record = serde_json::json!({
			"ID": "310",
			"Name": "triggered_send_journeybuilder",
			"ContentType": "triggered_send",
			"ParentFolder": {"ID": "300"},
		});
		let folder = folder_from_soap(&record, "triggered_send").expect("Folder should parse.");

		assert_eq!(folder.id, "310");
		assert_eq!(folder.parent_id.as_deref(), Some("300"));
	}

	#[test]
	fn every_kind_has_a_distinct_label() {
		let kinds = [
			CacheKind::AutomationFolders,
			CacheKind::AssetCategories,
			CacheKind::JourneyFolders,
			CacheKind::DataExtensionFolders,
			CacheKind::QueryFolders,
			CacheKind::TriggeredSendFolders,
			CacheKind::EmailFolders,
			CacheKind::ListFolders,
			CacheKind::FilterFolders,
			CacheKind::ScriptFolders,
			CacheKind::ImportFolders,
			CacheKind::DataExtractFolders,
			CacheKind::FileTransferFolders,
			CacheKind::QueryDefinitions,
			CacheKind::ScriptDefinitions,
			CacheKind::EmailDefinitions,
			CacheKind::TriggeredSendDefinitions,
		];
		let labels: HashSet<&str> = kinds.iter().map(|kind| kind.as_str()).collect();

		assert_eq!(labels.len(), kinds.len());
	}
}
