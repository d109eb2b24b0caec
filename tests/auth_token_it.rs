// crates.io
use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;
// self
use sfmc_inventory::{
	auth::TokenManager,
	config::EngineConfig,
	error::{AuthError, Error, ErrorCode},
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

fn build_manager(server: &MockServer) -> TokenManager {
	TokenManager::new(&build_config(server), reqwest::Client::new(), CancellationToken::new())
		.expect("Token manager should build from a valid config.")
}

#[tokio::test]
async fn concurrent_stale_callers_collapse_to_one_exchange() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok-1\",\"expires_in\":1800}");
		})
		.await;
	let manager = build_manager(&server);
	let (first, second) = tokio::join!(manager.bearer(), manager.bearer());

	assert_eq!(first.expect("First concurrent bearer should succeed."), "tok-1");
	assert_eq!(second.expect("Second concurrent bearer should succeed."), "tok-1");

	mock.assert_calls_async(1).await;

	assert_eq!(manager.refresh_count(), 1);
}

#[tokio::test]
async fn concurrent_force_refreshes_collapse_to_one_exchange() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok-1\",\"expires_in\":1800}");
		})
		.await;
	let manager = build_manager(&server);

	manager.bearer().await.expect("Initial bearer should succeed.");

	let (first, second) =
		tokio::join!(manager.force_refresh("test"), manager.force_refresh("test"));

	first.expect("First force refresh should succeed.");
	second.expect("Second force refresh should piggy-back on the first.");

	// One initial exchange plus exactly one for the collapsed refresh pair.
	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_credentials_fail_without_retries() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\"}");
		})
		.await;
	let manager = build_manager(&server);
	let err = manager.bearer().await.expect_err("Rejected credentials should surface an error.");

	assert!(matches!(err, Error::Auth(AuthError::Rejected { .. })));
	assert_eq!(err.code(), ErrorCode::AuthFailed);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn transient_exchange_failures_exhaust_after_three_attempts() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(503).body("upstream unavailable");
		})
		.await;
	let manager = build_manager(&server);
	let err = manager.bearer().await.expect_err("Persistent 503 should exhaust the exchange.");

	assert!(matches!(err, Error::Auth(AuthError::Exhausted { attempts: 3, .. })));
	assert_eq!(err.code(), ErrorCode::AuthFailed);

	mock.assert_calls_async(3).await;
}

#[tokio::test]
async fn invalid_expiry_is_rejected_and_never_cached() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok-1\",\"expires_in\":0}");
		})
		.await;

	let manager = build_manager(&server);
	let err = manager.bearer().await.expect_err("Zero expiry should be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::InvalidExpiry)));
	assert_eq!(manager.refresh_count(), 0);
}
