//! Relationship graph assembly: object indexing, edge folding with
//! deduplication and dangling detection, and orphan computation.

// std
use std::sync::LazyLock;
// crates.io
use regex::Regex;
// self
use crate::{
	_prelude::*,
	model::{
		ExtractorResult, ObjectKind, ObjectRecord, ObjectStatus, RelationshipEdge,
	},
	obs::WorkSpan,
};

static JB_ORPHAN_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r".*-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
		.expect("Journey-builder suffix pattern is statically valid.")
});

/// Index entry kept for every edge endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectSummary {
	/// Object kind.
	pub kind: ObjectKind,
	/// Object id.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Resolved breadcrumb, when the object lives in a folder surface.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub folder_path: Option<String>,
	/// `true` for endpoints referenced by an edge but not extracted this run.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub external: bool,
}

/// Why an object landed in the orphan set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
	/// No object of the kinds in the rule table references it.
	Unreferenced,
	/// Triggered send left behind by a deleted journey.
	JbOrphan,
}

/// One orphaned object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrphanEntry {
	/// Orphaned object id.
	pub id: String,
	/// Rule that flagged it.
	pub reason: OrphanReason,
}

/// Aggregate graph statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphStats {
	/// Deduplicated edge count.
	pub edges: u64,
	/// Edges whose target was not extracted this run.
	pub dangling_edges: u64,
	/// Indexed (extracted) objects.
	pub objects: u64,
	/// Orphan counts per kind label.
	pub orphans: BTreeMap<String, u64>,
}

/// Read-only relationship graph produced after all extractors complete.
#[derive(Clone, Debug, Serialize)]
pub struct RelationshipGraph {
	/// Deduplicated edges in stable order.
	pub edges: Vec<RelationshipEdge>,
	/// Object index keyed `kind:id`.
	pub index: BTreeMap<String, ObjectSummary>,
	/// Orphan sets per kind.
	pub orphans: BTreeMap<ObjectKind, Vec<OrphanEntry>>,
	/// Aggregate statistics.
	pub stats: GraphStats,
}
impl RelationshipGraph {
	/// Orphan ids per kind label, the `orphans.json` shape.
	pub fn orphan_ids(&self) -> BTreeMap<String, Vec<String>> {
		self.orphans
			.iter()
			.map(|(kind, entries)| {
				(
					kind.as_str().to_owned(),
					entries.iter().map(|entry| entry.id.clone()).collect(),
				)
			})
			.collect()
	}

	/// Looks up an orphan entry for a specific object.
	pub fn orphan_of(&self, kind: ObjectKind, id: &str) -> Option<&OrphanEntry> {
		self.orphans.get(&kind)?.iter().find(|entry| entry.id == id)
	}
}

/// Folds extractor results into a [`RelationshipGraph`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RelationshipBuilder;
impl RelationshipBuilder {
	/// Builds the graph: index, fold, dedupe, dangling marks, orphan rules.
	pub fn build(results: &[ExtractorResult]) -> RelationshipGraph {
		WorkSpan::assembly("graph_fold").scope(|| Self::assemble(results))
	}

	fn assemble(results: &[ExtractorResult]) -> RelationshipGraph {
		let mut index: BTreeMap<String, ObjectSummary> = BTreeMap::new();
		let mut name_index: HashMap<(ObjectKind, String), String> = HashMap::new();

		for result in results {
			for item in &result.items {
				index.insert(index_key(item.kind, &item.id), ObjectSummary {
					kind: item.kind,
					id: item.id.clone(),
					name: item.name.clone(),
					folder_path: item.folder_path.clone(),
					external: false,
				});
				name_index
					.entry((item.kind, item.name.to_ascii_lowercase()))
					.or_insert_with(|| item.id.clone());
			}
		}

		let extracted: HashSet<String> = index.keys().cloned().collect();
		let mut seen = HashSet::new();
		let mut edges: Vec<RelationshipEdge> = Vec::new();

		for result in results {
			for edge in &result.edges {
				let mut edge = edge.clone();

				if edge.target.is_name_only() {
					let lookup = (edge.target.kind, edge.target.name.to_ascii_lowercase());

					edge.target.id = match name_index.get(&lookup) {
						Some(id) => id.clone(),
						None => format!("name:{}", edge.target.name.to_ascii_lowercase()),
					};
				}
				if !seen.insert(edge.dedupe_key()) {
					continue;
				}

				let source_key = index_key(edge.source.kind, &edge.source.id);
				let target_key = index_key(edge.target.kind, &edge.target.id);

				edge.dangling =
					!extracted.contains(&source_key) || !extracted.contains(&target_key);

				for (key, endpoint) in
					[(source_key, &edge.source), (target_key, &edge.target)]
				{
					index.entry(key).or_insert_with(|| ObjectSummary {
						kind: endpoint.kind,
						id: endpoint.id.clone(),
						name: endpoint.name.clone(),
						folder_path: None,
						external: true,
					});
				}

				edges.push(edge);
			}
		}

		edges.sort_by(|a, b| a.dedupe_key().cmp(&b.dedupe_key()));

		let dangling_edges = edges.iter().filter(|edge| edge.dangling).count() as u64;
		let orphans = compute_orphans(results, &edges);
		let stats = GraphStats {
			edges: edges.len() as u64,
			dangling_edges,
			objects: extracted.len() as u64,
			orphans: orphans
				.iter()
				.map(|(kind, entries)| (kind.as_str().to_owned(), entries.len() as u64))
				.collect(),
		};

		RelationshipGraph { edges, index, orphans, stats }
	}
}

/// The rule table: an object of the row kind counts as used iff an object of
/// one of the listed kinds references it.
fn used_by(kind: ObjectKind) -> &'static [ObjectKind] {
	match kind {
		ObjectKind::Query
		| ObjectKind::Script
		| ObjectKind::Import
		| ObjectKind::DataExtract
		| ObjectKind::FileTransfer => &[ObjectKind::Automation],
		ObjectKind::Filter => &[ObjectKind::Automation, ObjectKind::Journey],
		ObjectKind::EventDefinition => &[ObjectKind::Journey],
		ObjectKind::DataExtension => &[
			ObjectKind::Query,
			ObjectKind::Journey,
			ObjectKind::Import,
			ObjectKind::Filter,
			ObjectKind::EventDefinition,
			ObjectKind::TriggeredSend,
			ObjectKind::DataExtract,
		],
		ObjectKind::Email =>
			&[ObjectKind::Automation, ObjectKind::Journey, ObjectKind::TriggeredSend],
		ObjectKind::List => &[ObjectKind::TriggeredSend, ObjectKind::Journey],
		ObjectKind::SenderProfile | ObjectKind::DeliveryProfile =>
			&[ObjectKind::SendClassification, ObjectKind::TriggeredSend],
		ObjectKind::SendClassification => &[ObjectKind::TriggeredSend],
		_ => &[],
	}
}

fn compute_orphans(
	results: &[ExtractorResult],
	edges: &[RelationshipEdge],
) -> BTreeMap<ObjectKind, Vec<OrphanEntry>> {
	let mut used: HashSet<(ObjectKind, String)> = HashSet::new();

	for edge in edges {
		if used_by(edge.target.kind).contains(&edge.source.kind) {
			used.insert((edge.target.kind, edge.target.id.clone()));
		}
	}

	let mut orphans: BTreeMap<ObjectKind, Vec<OrphanEntry>> = BTreeMap::new();

	for result in results {
		for item in &result.items {
			let entry = if item.kind == ObjectKind::TriggeredSend {
				jb_orphan(item)
			} else if !used_by(item.kind).is_empty()
				&& !used.contains(&(item.kind, item.id.clone()))
			{
				Some(OrphanEntry { id: item.id.clone(), reason: OrphanReason::Unreferenced })
			} else {
				None
			};

			if let Some(entry) = entry {
				orphans.entry(item.kind).or_default().push(entry);
			}
		}
	}

	for entries in orphans.values_mut() {
		entries.sort_by(|a, b| a.id.cmp(&b.id));
	}

	orphans
}

/// The journey-builder orphan rule: a triggered send auto-created by a journey
/// and left behind after the journey was deleted.
fn jb_orphan(item: &ObjectRecord) -> Option<OrphanEntry> {
	let in_jb_folder = item
		.folder_path
		.as_deref()
		.is_some_and(|path| path.to_ascii_lowercase().contains("journeybuilder"));
	let deleted = item.status == Some(ObjectStatus::Deleted);
	let uuid_suffix = JB_ORPHAN_SUFFIX.is_match(&item.name);

	(in_jb_folder && deleted && uuid_suffix)
		.then(|| OrphanEntry { id: item.id.clone(), reason: OrphanReason::JbOrphan })
}

fn index_key(kind: ObjectKind, id: &str) -> String {
	format!("{}:{id}", kind.as_str())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::model::{EdgeEndpoint, ExtractorStatus, RelationshipKind};

	fn result_with(
		kind: ObjectKind,
		items: Vec<ObjectRecord>,
		edges: Vec<RelationshipEdge>,
	) -> ExtractorResult {
		let mut result = ExtractorResult::new(kind);

		result.status = ExtractorStatus::Ok;
		result.items = items;
		result.edges = edges;

		result
	}

	#[test]
	fn unreferenced_queries_are_orphans() {
		let q1 = ObjectRecord::new(ObjectKind::Query, "q-1", "lonely");
		let q2 = ObjectRecord::new(ObjectKind::Query, "q-2", "contained");
		let automation = ObjectRecord::new(ObjectKind::Automation, "a-1", "nightly");
		let edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Automation, "a-1", "nightly"),
			RelationshipKind::AutomationContainsQuery,
			EdgeEndpoint::new(ObjectKind::Query, "q-2", "contained"),
		);
		let graph = RelationshipBuilder::build(&[
			result_with(ObjectKind::Query, vec![q1, q2], Vec::new()),
			result_with(ObjectKind::Automation, vec![automation], vec![edge]),
		]);
		let orphans = graph.orphan_ids();

		assert_eq!(orphans.get("query"), Some(&vec!["q-1".to_owned()]));
		assert_eq!(
			graph.orphan_of(ObjectKind::Query, "q-1").map(|entry| entry.reason),
			Some(OrphanReason::Unreferenced),
		);
		assert!(graph.orphan_of(ObjectKind::Query, "q-2").is_none());
	}

	#[test]
	fn name_only_targets_resolve_through_the_name_index() {
		let de = ObjectRecord::new(ObjectKind::DataExtension, "de-77", "Subscribers");
		let query = ObjectRecord::new(ObjectKind::Query, "q-1", "reader");
		let edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Query, "q-1", "reader"),
			RelationshipKind::QueryReadsDe,
			EdgeEndpoint::by_name(ObjectKind::DataExtension, "subscribers"),
		);
		let graph = RelationshipBuilder::build(&[
			result_with(ObjectKind::DataExtension, vec![de], Vec::new()),
			result_with(ObjectKind::Query, vec![query], vec![edge]),
		]);

		assert_eq!(graph.edges.len(), 1);
		assert_eq!(graph.edges[0].target.id, "de-77");
		assert!(!graph.edges[0].dangling);
		// The DE is referenced by a query, so it is not an orphan.
		assert!(graph.orphan_of(ObjectKind::DataExtension, "de-77").is_none());
	}

	#[test]
	fn unresolved_name_targets_stay_dangling_and_external() {
		let query = ObjectRecord::new(ObjectKind::Query, "q-1", "reader");
		let edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Query, "q-1", "reader"),
			RelationshipKind::QueryReadsDe,
			EdgeEndpoint::by_name(ObjectKind::DataExtension, "Gone_DE"),
		);
		let graph =
			RelationshipBuilder::build(&[result_with(ObjectKind::Query, vec![query], vec![edge])]);

		assert!(graph.edges[0].dangling);
		assert_eq!(graph.edges[0].target.id, "name:gone_de");

		let external = graph
			.index
			.get("data_extension:name:gone_de")
			.expect("External endpoint should be indexed.");

		assert!(external.external);
		assert_eq!(graph.stats.dangling_edges, 1);
	}

	#[test]
	fn duplicate_edges_collapse_on_the_five_tuple() {
		let automation = ObjectRecord::new(ObjectKind::Automation, "a-1", "nightly");
		let query = ObjectRecord::new(ObjectKind::Query, "q-1", "contained");
		let edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Automation, "a-1", "nightly"),
			RelationshipKind::AutomationContainsQuery,
			EdgeEndpoint::new(ObjectKind::Query, "q-1", "contained"),
		);
		let graph = RelationshipBuilder::build(&[
			result_with(ObjectKind::Automation, vec![automation], vec![
				edge.clone(),
				edge.clone(),
				edge,
			]),
			result_with(ObjectKind::Query, vec![query], Vec::new()),
		]);

		assert_eq!(graph.edges.len(), 1);
		assert_eq!(graph.stats.edges, 1);
	}

	#[test]
	fn jb_orphan_rule_requires_all_three_conditions() {
		let hit = ObjectRecord::new(
			ObjectKind::TriggeredSend,
			"ts-beta",
			"promo-emailv2-1b2e3f4a-5b6c-7d8e-9f01-23456789abcd",
		)
		.with_folder_path("root > triggered_send_journeybuilder")
		.with_status(ObjectStatus::Deleted);
		let wrong_folder = ObjectRecord::new(
			ObjectKind::TriggeredSend,
			"ts-alpha",
			"promo-emailv2-1b2e3f4a-5b6c-7d8e-9f01-23456789abcd",
		)
		.with_folder_path("root > triggered_send")
		.with_status(ObjectStatus::Deleted);
		let active = ObjectRecord::new(
			ObjectKind::TriggeredSend,
			"ts-gamma",
			"promo-emailv2-1b2e3f4a-5b6c-7d8e-9f01-23456789abcd",
		)
		.with_folder_path("root > triggered_send_journeybuilder")
		.with_status(ObjectStatus::Active);
		let plain_name = ObjectRecord::new(ObjectKind::TriggeredSend, "ts-delta", "welcome-send")
			.with_folder_path("root > triggered_send_journeybuilder")
			.with_status(ObjectStatus::Deleted);
		let graph = RelationshipBuilder::build(&[result_with(
			ObjectKind::TriggeredSend,
			vec![hit, wrong_folder, active, plain_name],
			Vec::new(),
		)]);

		assert_eq!(
			graph.orphan_of(ObjectKind::TriggeredSend, "ts-beta").map(|entry| entry.reason),
			Some(OrphanReason::JbOrphan),
		);
		assert!(graph.orphan_of(ObjectKind::TriggeredSend, "ts-alpha").is_none());
		assert!(graph.orphan_of(ObjectKind::TriggeredSend, "ts-gamma").is_none());
		assert!(graph.orphan_of(ObjectKind::TriggeredSend, "ts-delta").is_none());
	}

	#[test]
	fn data_extensions_count_usage_from_the_full_rule_row() {
		let de_used = ObjectRecord::new(ObjectKind::DataExtension, "de-1", "entry_source");
		let de_orphan = ObjectRecord::new(ObjectKind::DataExtension, "de-2", "forgotten");
		let event = ObjectRecord::new(ObjectKind::EventDefinition, "ev-1", "entry");
		let journey = ObjectRecord::new(ObjectKind::Journey, "j-1", "welcome");
		let event_edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::EventDefinition, "ev-1", "entry"),
			RelationshipKind::EventDefinitionUsesDe,
			EdgeEndpoint::new(ObjectKind::DataExtension, "de-1", "entry_source"),
		);
		let journey_event_edge = RelationshipEdge::new(
			EdgeEndpoint::new(ObjectKind::Journey, "j-1", "welcome"),
			RelationshipKind::JourneyUsesEvent,
			EdgeEndpoint::new(ObjectKind::EventDefinition, "ev-1", "entry"),
		);
		let graph = RelationshipBuilder::build(&[
			result_with(ObjectKind::DataExtension, vec![de_used, de_orphan], Vec::new()),
			result_with(ObjectKind::EventDefinition, vec![event], vec![event_edge]),
			result_with(ObjectKind::Journey, vec![journey], vec![journey_event_edge]),
		]);
		let orphans = graph.orphan_ids();

		assert_eq!(orphans.get("data_extension"), Some(&vec!["de-2".to_owned()]));
		// The event definition is referenced by the journey.
		assert!(orphans.get("event_definition").is_none());
	}
}
