//! Memoized folder-path resolver over a published folder table.

// self
use crate::{_prelude::*, cache::CacheTable};

const DEFAULT_SEPARATOR: &str = " > ";

/// Resolved "root > child > leaf" path for one folder id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breadcrumb {
	/// Joined path from the forest root down to the requested folder.
	pub path: String,
	/// `true` when the parent chain revisited a folder id.
	pub cyclic: bool,
	/// Parent ids that were absent from the folder table.
	pub missing: Vec<String>,
}

/// Iterative breadcrumb resolver with per-id memoization and cycle safety.
pub struct BreadcrumbBuilder {
	table: Arc<CacheTable>,
	separator: String,
	memo: Mutex<HashMap<String, Arc<Breadcrumb>>>,
}
impl BreadcrumbBuilder {
	/// Creates a builder over a published folder table with the default separator.
	pub fn new(table: Arc<CacheTable>) -> Self {
		Self::with_separator(table, DEFAULT_SEPARATOR)
	}

	/// Creates a builder with a custom path separator.
	pub fn with_separator(table: Arc<CacheTable>, separator: impl Into<String>) -> Self {
		Self { table, separator: separator.into(), memo: Mutex::new(HashMap::new()) }
	}

	/// Resolves the path for a folder id. Terminates for every input: missing
	/// parents close the path with an `(unknown:<id>)` segment and a revisited
	/// id stops the walk with `cyclic` set.
	pub fn resolve(&self, folder_id: &str) -> Arc<Breadcrumb> {
		if let Some(hit) = self.memo.lock().get(folder_id) {
			return hit.clone();
		}

		let crumb = Arc::new(self.walk(folder_id));

		self.memo.lock().insert(folder_id.to_owned(), crumb.clone());

		crumb
	}

	fn walk(&self, folder_id: &str) -> Breadcrumb {
		let mut segments: Vec<String> = Vec::new();
		let mut missing: Vec<String> = Vec::new();
		let mut visited: HashSet<String> = HashSet::new();
		let mut cyclic = false;
		let mut cursor = Some(folder_id.to_owned());

		while let Some(id) = cursor.take() {
			if !visited.insert(id.clone()) {
				cyclic = true;

				break;
			}

			match self.table.folder(&id) {
				Some(folder) => {
					segments.push(folder.name.clone());

					cursor = folder.parent_id.clone();
				},
				None => {
					segments.push(format!("(unknown:{id})"));
					missing.push(id);

					break;
				},
			}
		}

		segments.reverse();

		Breadcrumb { path: segments.join(&self.separator), cyclic, missing }
	}
}
impl Debug for BreadcrumbBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BreadcrumbBuilder")
			.field("memoized", &self.memo.lock().len())
			.field("separator", &self.separator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::model::Folder;

	fn table(folders: &[(&str, Option<&str>, &str)]) -> Arc<CacheTable> {
		let map = folders
			.iter()
			.map(|(id, parent, name)| {
				((*id).to_owned(), Folder {
					id: (*id).to_owned(),
					parent_id: parent.map(str::to_owned),
					name: (*name).to_owned(),
					content_type: "test".into(),
				})
			})
			.collect();

		Arc::new(CacheTable::Folders(map))
	}

	#[test]
	fn resolves_root_to_leaf_paths() {
		let builder = BreadcrumbBuilder::new(table(&[
			("1", None, "root"),
			("2", Some("1"), "campaigns"),
			("3", Some("2"), "spring"),
		]));
		let crumb = builder.resolve("3");

		assert_eq!(crumb.path, "root > campaigns > spring");
		assert!(!crumb.cyclic);
		assert!(crumb.missing.is_empty());
	}

	#[test]
	fn missing_parents_close_the_path_with_a_marker() {
		let builder = BreadcrumbBuilder::new(table(&[("5", Some("404"), "orphaned")]));
		let crumb = builder.resolve("5");

		assert_eq!(crumb.path, "(unknown:404) > orphaned");
		assert_eq!(crumb.missing, vec!["404".to_owned()]);
	}

	#[test]
	fn cycles_terminate_and_are_flagged() {
		let builder =
			BreadcrumbBuilder::new(table(&[("a", Some("b"), "alpha"), ("b", Some("a"), "beta")]));
		let crumb = builder.resolve("a");

		assert!(crumb.cyclic);
		assert_eq!(crumb.path, "beta > alpha");
	}

	#[test]
	fn unknown_start_ids_still_terminate() {
		let builder = BreadcrumbBuilder::new(table(&[]));
		let crumb = builder.resolve("nope");

		assert_eq!(crumb.path, "(unknown:nope)");
		assert_eq!(crumb.missing, vec!["nope".to_owned()]);
	}

	#[test]
	fn memoization_returns_the_same_arc() {
		let builder = BreadcrumbBuilder::new(table(&[("1", None, "root")]));
		let first = builder.resolve("1");
		let second = builder.resolve("1");

		assert!(Arc::ptr_eq(&first, &second));
	}

	#[test]
	fn separator_is_configurable() {
		let builder = BreadcrumbBuilder::with_separator(
			table(&[("1", None, "root"), ("2", Some("1"), "leaf")]),
			" / ",
		);

		assert_eq!(builder.resolve("2").path, "root / leaf");
	}
}
