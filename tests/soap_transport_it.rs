// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;
// self
use sfmc_inventory::{
	auth::TokenManager,
	config::EngineConfig,
	error::ErrorCode,
	transport::{SoapClient, SoapFilter},
};

fn build_config(server: &MockServer) -> EngineConfig {
	EngineConfig::builder()
		.rest_base(server.url("").parse().expect("Mock REST base should parse."))
		.soap_base(server.url("/Service.asmx").parse().expect("Mock SOAP base should parse."))
		.auth_base(server.url("").parse().expect("Mock auth base should parse."))
		.client_id("client-id")
		.client_secret("client-secret")
		.account_id("510000001")
		.output_root("./out")
		.build()
		.expect("Mock-backed config should validate.")
}

fn build_client(server: &MockServer) -> SoapClient {
	let config = build_config(server);
	let http = reqwest::Client::new();
	let cancel = CancellationToken::new();
	let tokens = Arc::new(
		TokenManager::new(&config, http.clone(), cancel.clone())
			.expect("Token manager should build from a valid config."),
	);

	SoapClient::new(&config, http, tokens, cancel)
}

async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok-1\",\"expires_in\":1800}");
		})
		.await
}

fn retrieve_response(status: &str, request_id: &str, names: &[&str]) -> String {
	let results: String = names
		.iter()
		.map(|name| {
			format!(
				"<Results><ObjectID>{name}-id</ObjectID><Name>{name}</Name></Results>"
			)
		})
		.collect();

	format!(
		"<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\">\
		 <soap:Body><RetrieveResponseMsg xmlns=\"http://exacttarget.com/wsdl/partnerAPI\">\
		 <OverallStatus>{status}</OverallStatus>\
		 <RequestID>{request_id}</RequestID>\
		 {results}\
		 </RetrieveResponseMsg></soap:Body></soap:Envelope>"
	)
}

#[tokio::test]
async fn retrieve_all_follows_continuation_tokens() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let first_page = server
		.mock_async(|when, then| {
			when.method(POST).path("/Service.asmx").body_includes("<Properties>");
			then.status(200)
				.header("content-type", "text/xml")
				.body(retrieve_response("MoreDataAvailable", "req-cont-1", &["alpha"]));
		})
		.await;
	let second_page = server
		.mock_async(|when, then| {
			when.method(POST).path("/Service.asmx").body_includes("<ContinueRequest>req-cont-1<");
			then.status(200)
				.header("content-type", "text/xml")
				.body(retrieve_response("OK", "req-cont-1", &["beta"]));
		})
		.await;
	let client = build_client(&server);
	let retrieval = client
		.retrieve_all("TriggeredSendDefinition", &["ObjectID", "Name"], None)
		.await
		.expect("Continuation pagination should succeed.");

	assert_eq!(retrieval.records.len(), 2);
	assert_eq!(retrieval.pages, 2);
	assert!(!retrieval.truncated);
	assert_eq!(retrieval.records[0]["Name"], "alpha");
	assert_eq!(retrieval.records[1]["Name"], "beta");

	first_page.assert_async().await;
	second_page.assert_async().await;
}

#[tokio::test]
async fn envelopes_carry_the_fueloauth_token_and_filter() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/Service.asmx")
				.body_includes(">tok-1</fueloauth>")
				.body_includes("<Property>ContentType</Property>")
				.body_includes("<Value>dataextension</Value>");
			then.status(200)
				.header("content-type", "text/xml")
				.body(retrieve_response("OK", "req-1", &["folder"]));
		})
		.await;
	let client = build_client(&server);
	let filter = SoapFilter::equals("ContentType", "dataextension");
	let retrieval = client
		.retrieve_all("DataFolder", &["ID", "Name"], Some(&filter))
		.await
		.expect("Filtered retrieve should succeed.");

	assert_eq!(retrieval.records.len(), 1);

	mock.assert_async().await;
}

#[tokio::test]
async fn soap_faults_surface_without_retries() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/Service.asmx");
			then.status(500).header("content-type", "text/xml").body(
				"<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\">\
				 <soap:Body><soap:Fault>\
				 <faultcode>soap:Client</faultcode>\
				 <faultstring>Unable to process request</faultstring>\
				 </soap:Fault></soap:Body></soap:Envelope>",
			);
		})
		.await;
	let client = build_client(&server);
	let err = client
		.retrieve_all("List", &["ID"], None)
		.await
		.expect_err("A SOAP fault should surface as an error.");

	assert_eq!(err.code(), ErrorCode::HttpNonRetryable);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn error_overall_statuses_surface_as_faults() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/Service.asmx");
			then.status(200)
				.header("content-type", "text/xml")
				.body(retrieve_response("Error: malformed retrieve", "req-1", &[]));
		})
		.await;

	let client = build_client(&server);
	let err = client
		.retrieve_all("Email", &["ID"], None)
		.await
		.expect_err("An error status should surface as a fault.");

	assert_eq!(err.code(), ErrorCode::HttpNonRetryable);
}
