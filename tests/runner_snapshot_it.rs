// std
use std::{fs, sync::Arc};
// crates.io
use httpmock::prelude::*;
// self
use sfmc_inventory::{
	config::EngineConfig,
	engine::Engine,
	error::ErrorCode,
	model::{ExtractorStatus, ObjectKind, RelationshipKind},
	runner::NoopProgress,
};

fn build_engine(server: &MockServer, output_root: &std::path::Path) -> Engine {
	let config = EngineConfig::builder()
		.rest_base(server.url("").parse().expect("Mock REST base should parse."))
		.soap_base(server.url("/Service.asmx").parse().expect("Mock SOAP base should parse."))
		.auth_base(server.url("").parse().expect("Mock auth base should parse."))
		.client_id("client-id")
		.client_secret("client-secret")
		.account_id("510000001")
		.output_root(output_root)
		.build()
		.expect("Mock-backed config should validate.");

	Engine::new(config).expect("Engine should build from a valid config.")
}

async fn mock_token(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok-1\",\"expires_in\":1800}");
		})
		.await;
}

async fn mock_empty_soap(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/Service.asmx");
			then.status(200).header("content-type", "text/xml").body(
				"<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\">\
				 <soap:Body><RetrieveResponseMsg xmlns=\"http://exacttarget.com/wsdl/partnerAPI\">\
				 <OverallStatus>OK</OverallStatus>\
				 <RequestID>req-0</RequestID>\
				 </RetrieveResponseMsg></soap:Body></soap:Envelope>",
			);
		})
		.await;
}

#[tokio::test]
async fn query_snapshot_emits_the_expected_edge_set() {
	let server = MockServer::start_async().await;

	mock_token(&server).await;
	mock_empty_soap(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/automation/v1/queries");
			then.status(200).header("content-type", "application/json").body(
				"{\"count\":3,\"items\":[\
				 {\"queryDefinitionId\":\"q-1\",\"name\":\"Q1\",\"key\":\"q1-key\",\
				  \"queryText\":\"SELECT a.x FROM de_a a JOIN de_b b ON a.k = b.k\",\
				  \"targetId\":\"de-out-id\",\"targetName\":\"de_out\"},\
				 {\"queryDefinitionId\":\"q-2\",\"name\":\"Q2\",\
				  \"queryText\":\"SELECT x FROM _sys_x\"},\
				 {\"queryDefinitionId\":\"q-3\",\"name\":\"Q3\",\
				  \"queryText\":\"SELECT y FROM de_a\",\
				  \"targetId\":\"de-out-id\",\"targetName\":\"de_out\"}\
				 ]}",
			);
		})
		.await;

	let output = tempfile::tempdir().expect("Temp output root should be creatable.");
	let engine = build_engine(&server, output.path());
	let outcome = engine
		.snapshot(vec![ObjectKind::Query], Arc::new(NoopProgress))
		.await
		.expect("Snapshot run should succeed.");

	assert_eq!(outcome.run.results.len(), 1);
	assert_eq!(outcome.run.results[0].status, ExtractorStatus::Ok);
	assert_eq!(outcome.run.results[0].items.len(), 3);

	let edges = &outcome.graph.edges;

	assert_eq!(edges.len(), 5);

	let has_edge = |source: &str, kind: RelationshipKind, target: &str| {
		edges
			.iter()
			.any(|edge| edge.source.id == source && edge.kind == kind && edge.target.id == target)
	};

	assert!(has_edge("q-1", RelationshipKind::QueryReadsDe, "name:de_a"));
	assert!(has_edge("q-1", RelationshipKind::QueryReadsDe, "name:de_b"));
	assert!(has_edge("q-1", RelationshipKind::QueryWritesDe, "de-out-id"));
	assert!(has_edge("q-3", RelationshipKind::QueryReadsDe, "name:de_a"));
	assert!(has_edge("q-3", RelationshipKind::QueryWritesDe, "de-out-id"));
	// The system data view never becomes an edge.
	assert!(!edges.iter().any(|edge| edge.target.id.contains("_sys_x")));

	// No automation references them: all three queries are orphans.
	let orphans = outcome.graph.orphan_ids();

	assert_eq!(
		orphans.get("query"),
		Some(&vec!["q-1".to_owned(), "q-2".to_owned(), "q-3".to_owned()]),
	);

	// Snapshot layout: streamed objects plus complete, valid documents.
	let ndjson = fs::read_to_string(outcome.directory.join("objects/query.ndjson"))
		.expect("Query stream should be published.");

	assert_eq!(ndjson.lines().count(), 3);

	for file in ["manifest.json", "statistics.json", "relationships/graph.json", "relationships/orphans.json"] {
		let body = fs::read_to_string(outcome.directory.join(file))
			.unwrap_or_else(|e| panic!("{file} should be readable: {e}"));
		let _: serde_json::Value = serde_json::from_str(&body)
			.unwrap_or_else(|e| panic!("{file} should be valid JSON: {e}"));
	}

	let manifest: serde_json::Value =
		serde_json::from_str(&fs::read_to_string(outcome.directory.join("manifest.json")).unwrap())
			.unwrap();

	assert_eq!(manifest["counts"]["query"], 3);
	assert_eq!(manifest["extractor_kinds"][0], "query");
}

#[tokio::test]
async fn empty_collections_finish_clean() {
	let server = MockServer::start_async().await;

	mock_token(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/interaction/v1/eventDefinitions");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"count\":0,\"items\":[]}");
		})
		.await;

	let output = tempfile::tempdir().expect("Temp output root should be creatable.");
	let engine = build_engine(&server, output.path());
	let runner = engine.runner(Arc::new(NoopProgress));
	let run = runner.run(&[ObjectKind::EventDefinition]).await;

	assert_eq!(run.results.len(), 1);
	assert_eq!(run.results[0].status, ExtractorStatus::Ok);
	assert!(run.results[0].items.is_empty());
	assert!(run.results[0].errors.is_empty());
	assert!(!run.has_partial());
}

#[tokio::test]
async fn failed_pagination_surfaces_partial_results() {
	let server = MockServer::start_async().await;

	mock_token(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/interaction/v1/eventDefinitions");
			then.status(500).body("broken backend");
		})
		.await;

	let output = tempfile::tempdir().expect("Temp output root should be creatable.");
	let engine = build_engine(&server, output.path());
	let runner = engine.runner(Arc::new(NoopProgress));
	let run = runner.run(&[ObjectKind::EventDefinition]).await;

	assert_eq!(run.results[0].status, ExtractorStatus::Partial);
	assert!(run.results[0].items.is_empty());
	assert_eq!(run.results[0].errors[0].code, ErrorCode::HttpRetryableExhausted);
	assert!(run.has_partial());
}

#[tokio::test]
async fn cancellation_aborts_extractors_with_partial_results() {
	let server = MockServer::start_async().await;

	mock_token(&server).await;
	mock_empty_soap(&server).await;

	let output = tempfile::tempdir().expect("Temp output root should be creatable.");
	let engine = build_engine(&server, output.path());

	engine.cancel();

	let runner = engine.runner(Arc::new(NoopProgress));
	let run = runner.run(&[ObjectKind::Query]).await;

	assert_eq!(run.results.len(), 1);
	assert_eq!(run.results[0].status, ExtractorStatus::Aborted);
	assert!(run.has_aborted());
}

#[tokio::test]
async fn sequential_runs_cover_multiple_kinds() {
	let server = MockServer::start_async().await;

	mock_token(&server).await;
	mock_empty_soap(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/automation/v1/queries");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"count\":0,\"items\":[]}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/interaction/v1/eventDefinitions");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"count\":0,\"items\":[]}");
		})
		.await;

	let output = tempfile::tempdir().expect("Temp output root should be creatable.");
	let engine = build_engine(&server, output.path());
	let runner = engine.runner(Arc::new(NoopProgress));
	let run = runner.run_sequential(&[ObjectKind::Query, ObjectKind::EventDefinition]).await;

	assert_eq!(run.results.len(), 2);
	assert_eq!(run.results[0].kind, ObjectKind::Query);
	assert_eq!(run.results[1].kind, ObjectKind::EventDefinition);
	assert!(run.results.iter().all(|result| result.status == ExtractorStatus::Ok));
}
