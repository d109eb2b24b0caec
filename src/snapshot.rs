//! Snapshot writer: timestamped output directory with atomically written
//! documents and per-type NDJSON streams.
//!
//! Every file lands as `<name>.tmp` first and is renamed into place, so a
//! produced file is either absent or complete. Object streams append one
//! UTF-8 JSON line per record while extraction is still running; appended
//! records become durable when the stream is finalized.

// std
use std::{
	fs::{self, File},
	io::{BufWriter, Write},
	path::{Path, PathBuf},
};
// crates.io
use time::macros::format_description;
// self
use crate::{
	_prelude::*,
	config::ExtractorOptions,
	error::WriteError,
	graph::{GraphStats, RelationshipGraph},
	limit::LimiterStats,
	model::{ExtractionError, ExtractorCounters, ExtractorStatus, ObjectKind, ObjectRecord},
	obs::WorkSpan,
	runner::RunnerResult,
};

/// `manifest.json` document.
#[derive(Clone, Debug, Serialize)]
pub struct Manifest {
	/// Engine crate version that produced the snapshot.
	pub version: String,
	/// Snapshot creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub generated_at: OffsetDateTime,
	/// Options the run used.
	pub options: ExtractorOptions,
	/// Extractor kinds the run covered.
	pub extractor_kinds: Vec<ObjectKind>,
	/// Emitted object counts per kind label.
	pub counts: BTreeMap<String, u64>,
	/// Run duration.
	pub duration_ms: u64,
}
impl Manifest {
	/// Builds the manifest for a finished run.
	pub fn from_run(
		run: &RunnerResult,
		options: ExtractorOptions,
		kinds: &[ObjectKind],
		generated_at: OffsetDateTime,
	) -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION").to_owned(),
			generated_at,
			options,
			extractor_kinds: kinds.to_vec(),
			counts: run.counts.clone(),
			duration_ms: run.duration_ms,
		}
	}
}

/// Per-extractor block inside `statistics.json`.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractorStatistics {
	/// Terminal status.
	pub status: ExtractorStatus,
	/// Run counters.
	pub counters: ExtractorCounters,
	/// Collected non-fatal errors.
	pub errors: Vec<ExtractionError>,
}

/// `statistics.json` document.
#[derive(Clone, Debug, Serialize)]
pub struct Statistics {
	/// Per-extractor counters and errors, keyed by kind label.
	pub extractors: BTreeMap<String, ExtractorStatistics>,
	/// Cache load statistics.
	pub caches: BTreeMap<String, crate::cache::CacheStats>,
	/// Rate limiter statistics.
	pub limiter: LimiterStats,
	/// Credential exchanges performed.
	pub token_refreshes: u64,
	/// Graph statistics.
	pub graph: GraphStats,
	/// Error counts per stable wire code.
	pub error_counts: BTreeMap<String, u64>,
}
impl Statistics {
	/// Builds the statistics document for a finished run.
	pub fn from_run(run: &RunnerResult, graph: &RelationshipGraph) -> Self {
		let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();
		let extractors = run
			.results
			.iter()
			.map(|result| {
				for error in &result.errors {
					*error_counts.entry(error.code.as_str().to_owned()).or_default() += 1;
				}

				(result.kind.as_str().to_owned(), ExtractorStatistics {
					status: result.status,
					counters: result.counters,
					errors: result.errors.clone(),
				})
			})
			.collect();

		Self {
			extractors,
			caches: run.cache_stats.clone(),
			limiter: run.limiter_stats.clone(),
			token_refreshes: run.token_refreshes,
			graph: graph.stats.clone(),
			error_counts,
		}
	}
}

#[derive(Serialize)]
struct GraphDocument<'a> {
	edges: &'a [crate::model::RelationshipEdge],
	index: &'a BTreeMap<String, crate::graph::ObjectSummary>,
}

/// Creates timestamped snapshot directories under an output root.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
	root: PathBuf,
}
impl SnapshotWriter {
	/// Creates a writer rooted at the configured output directory.
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Creates `inventory_<YYYYMMDD>_<HHMMSS>/` with its subdirectories.
	pub fn create(&self, at: OffsetDateTime) -> Result<Snapshot, WriteError> {
		let date_format = format_description!("[year][month][day]");
		let time_format = format_description!("[hour][minute][second]");
		let date = at.format(&date_format).unwrap_or_else(|_| "00000000".into());
		let time = at.format(&time_format).unwrap_or_else(|_| "000000".into());
		let directory = self.root.join(format!("inventory_{date}_{time}"));

		for subdirectory in [directory.clone(), directory.join("objects"), directory.join("relationships")]
		{
			fs::create_dir_all(&subdirectory).map_err(|source| WriteError::Io {
				path: subdirectory.display().to_string(),
				source,
			})?;
		}

		Ok(Snapshot { directory, streams: Mutex::new(HashMap::new()) })
	}
}

/// One open snapshot directory.
pub struct Snapshot {
	directory: PathBuf,
	streams: Mutex<HashMap<ObjectKind, BufWriter<File>>>,
}
impl Snapshot {
	/// Directory this snapshot writes into.
	pub fn directory(&self) -> &Path {
		&self.directory
	}

	/// Appends records to the kind's NDJSON stream (opened on first use).
	///
	/// Lines are UTF-8, `\n`-terminated, one record each; already-emitted
	/// lines are never mutated.
	pub fn append_objects(
		&self,
		kind: ObjectKind,
		records: &[ObjectRecord],
	) -> Result<(), WriteError> {
		let mut streams = self.streams.lock();
		let stream = match streams.entry(kind) {
			std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
			std::collections::hash_map::Entry::Vacant(entry) => {
				let path = self.stream_tmp_path(kind);
				let file = File::create(&path).map_err(|source| WriteError::Io {
					path: path.display().to_string(),
					source,
				})?;

				entry.insert(BufWriter::new(file))
			},
		};

		for record in records {
			let line = serde_json::to_vec(record)
				.map_err(|source| WriteError::Serialize { what: "object", source })?;

			stream
				.write_all(&line)
				.and_then(|()| stream.write_all(b"\n"))
				.map_err(|source| WriteError::Io {
					path: self.stream_tmp_path(kind).display().to_string(),
					source,
				})?;
		}

		Ok(())
	}

	/// Writes `manifest.json` atomically.
	pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), WriteError> {
		self.write_document("manifest.json", "manifest", manifest)
	}

	/// Writes `statistics.json` atomically.
	pub fn write_statistics(&self, statistics: &Statistics) -> Result<(), WriteError> {
		self.write_document("statistics.json", "statistics", statistics)
	}

	/// Writes `relationships/graph.json` atomically.
	pub fn write_graph(&self, graph: &RelationshipGraph) -> Result<(), WriteError> {
		self.write_document(
			"relationships/graph.json",
			"graph",
			&GraphDocument { edges: &graph.edges, index: &graph.index },
		)
	}

	/// Writes `relationships/orphans.json` atomically.
	pub fn write_orphans(&self, graph: &RelationshipGraph) -> Result<(), WriteError> {
		self.write_document("relationships/orphans.json", "orphans", &graph.orphan_ids())
	}

	/// Flushes and publishes every NDJSON stream, then returns the directory.
	pub fn finalize(self) -> Result<PathBuf, WriteError> {
		WorkSpan::assembly("snapshot_publish").scope(|| {
			let mut streams = self.streams.lock();

			for (kind, stream) in streams.drain() {
				let tmp = self.stream_tmp_path(kind);
				let target = self.stream_path(kind);
				let file = stream.into_inner().map_err(|source| WriteError::Io {
					path: tmp.display().to_string(),
					source: source.into_error(),
				})?;

				file.sync_all().map_err(|source| WriteError::Io {
					path: tmp.display().to_string(),
					source,
				})?;
				fs::rename(&tmp, &target).map_err(|source| WriteError::Io {
					path: target.display().to_string(),
					source,
				})?;
			}

			drop(streams);

			Ok(self.directory.clone())
		})
	}

	fn write_document<T>(
		&self,
		relative: &str,
		what: &'static str,
		document: &T,
	) -> Result<(), WriteError>
	where
		T: Serialize,
	{
		let serialized = serde_json::to_vec_pretty(document)
			.map_err(|source| WriteError::Serialize { what, source })?;

		write_atomic(&self.directory.join(relative), &serialized)
	}

	fn stream_tmp_path(&self, kind: ObjectKind) -> PathBuf {
		self.directory.join("objects").join(format!("{}.ndjson.tmp", kind.as_str()))
	}

	fn stream_path(&self, kind: ObjectKind) -> PathBuf {
		self.directory.join("objects").join(format!("{}.ndjson", kind.as_str()))
	}
}
impl Debug for Snapshot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Snapshot").field("directory", &self.directory).finish()
	}
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension("tmp");

	{
		let mut file = File::create(&tmp_path).map_err(|source| WriteError::Io {
			path: tmp_path.display().to_string(),
			source,
		})?;

		file.write_all(bytes).map_err(|source| WriteError::Io {
			path: tmp_path.display().to_string(),
			source,
		})?;
		file.sync_all().map_err(|source| WriteError::Io {
			path: tmp_path.display().to_string(),
			source,
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|source| WriteError::Io {
		path: path.display().to_string(),
		source,
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::model::ObjectRecord;

	#[test]
	fn snapshot_directory_uses_the_timestamp_layout() {
		let root = tempfile::tempdir().expect("Temp directory should be creatable.");
		let writer = SnapshotWriter::new(root.path());
		let snapshot = writer
			.create(macros::datetime!(2026-03-04 05:06:07 UTC))
			.expect("Snapshot directory should be created.");

		assert!(snapshot.directory().ends_with("inventory_20260304_050607"));
		assert!(snapshot.directory().join("objects").is_dir());
		assert!(snapshot.directory().join("relationships").is_dir());
	}

	#[test]
	fn object_streams_round_trip_line_by_line() {
		let root = tempfile::tempdir().expect("Temp directory should be creatable.");
		let writer = SnapshotWriter::new(root.path());
		let snapshot = writer
			.create(macros::datetime!(2026-03-04 05:06:07 UTC))
			.expect("Snapshot directory should be created.");
		let records = vec![
			ObjectRecord::new(ObjectKind::Query, "q-1", "first"),
			ObjectRecord::new(ObjectKind::Query, "q-2", "second"),
		];

		snapshot
			.append_objects(ObjectKind::Query, &records[..1])
			.expect("First append should succeed.");
		snapshot
			.append_objects(ObjectKind::Query, &records[1..])
			.expect("Second append should succeed.");

		let directory =
			snapshot.finalize().expect("Finalize should publish the NDJSON streams.");
		let contents = fs::read_to_string(directory.join("objects/query.ndjson"))
			.expect("Published stream should be readable.");
		let parsed: Vec<ObjectRecord> = contents
			.lines()
			.map(|line| serde_json::from_str(line).expect("Each line should be a full record."))
			.collect();

		assert!(contents.ends_with('\n'));
		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0].id, "q-1");
		assert_eq!(parsed[1].id, "q-2");
		assert!(!directory.join("objects/query.ndjson.tmp").exists());
	}

	#[test]
	fn documents_never_leave_tmp_files_behind() {
		let root = tempfile::tempdir().expect("Temp directory should be creatable.");
		let writer = SnapshotWriter::new(root.path());
		let snapshot = writer
			.create(macros::datetime!(2026-03-04 05:06:07 UTC))
			.expect("Snapshot directory should be created.");
		let manifest = Manifest {
			version: "0.1.0".into(),
			generated_at: macros::datetime!(2026-03-04 05:06:07 UTC),
			options: ExtractorOptions::default(),
			extractor_kinds: vec![ObjectKind::Query],
			counts: BTreeMap::new(),
			duration_ms: 42,
		};

		snapshot.write_manifest(&manifest).expect("Manifest should be written.");

		let path = snapshot.directory().join("manifest.json");
		let body = fs::read_to_string(&path).expect("Manifest should be readable.");
		let parsed: Value = serde_json::from_str(&body).expect("Manifest should be valid JSON.");

		assert_eq!(parsed["version"], "0.1.0");
		assert_eq!(parsed["duration_ms"], 42);
		assert!(!snapshot.directory().join("manifest.tmp").exists());
	}
}
