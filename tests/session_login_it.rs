#![cfg(feature = "reqwest")]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use bearer_pipeline::{
	client::ReqwestApiClient,
	config::PipelineConfig,
	error::Error,
	session::SessionState,
	store::{CredentialStore, MemoryStore},
	url::Url,
};

const LOGIN_PATH: &str = "/api/auth/login";

fn build_client(server: &MockServer) -> (ReqwestApiClient, Arc<MemoryStore>) {
	let base = Url::parse(&server.base_url()).expect("Mock server URL should parse.");
	let config = PipelineConfig::builder(base).build().expect("Test configuration should validate.");
	let store = Arc::new(MemoryStore::default());
	let client = ReqwestApiClient::new(config, store.clone())
		.expect("Reqwest-backed client should build successfully.");

	(client, store)
}

#[tokio::test]
async fn login_stores_pair_and_marks_session_authenticated() {
	let server = MockServer::start_async().await;
	let (client, store) = build_client(&server);
	let user = json!({ "employee_code": "E-1001", "name": "Priya", "role": "buyer" });
	let login = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(LOGIN_PATH)
				.json_body(json!({ "employee_code": "E-1001", "password": "hunter2" }));
			then.status(200).json_body(json!({ "access": "A1", "refresh": "R1", "user": user }));
		})
		.await;

	assert_eq!(client.restore(), SessionState { authenticated: false, checked: true, user: None });

	let state = client.login("E-1001", "hunter2").await.expect("Login should succeed.");

	login.assert_async().await;

	assert_eq!(state, SessionState { authenticated: true, checked: true, user: Some(user) });

	let stored = store.get().expect("Login should store the credential pair.");

	assert_eq!(stored.access_token.expose(), "A1");
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("R1"));
}

#[tokio::test]
async fn refused_login_surfaces_backend_detail() {
	let server = MockServer::start_async().await;
	let (client, store) = build_client(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN_PATH);
			then.status(401).json_body(json!({ "detail": "No active account found" }));
		})
		.await;

	let err = client.login("E-1001", "wrong").await.expect_err("Refused login should fail.");

	assert!(matches!(err, Error::Login { ref reason } if reason == "No active account found"));
	assert!(store.get().is_none());
	assert!(!client.session().snapshot().authenticated);
	assert_eq!(client.session().invalidation_count(), 0);
}

#[tokio::test]
async fn refused_login_without_detail_uses_fallback_reason() {
	let server = MockServer::start_async().await;
	let (client, _store) = build_client(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN_PATH);
			then.status(500).body("<html>Server Error</html>");
		})
		.await;

	let err = client.login("E-1001", "hunter2").await.expect_err("Failed login should fail.");

	assert!(matches!(err, Error::Login { ref reason } if reason == "Invalid credentials"));
}

#[tokio::test]
async fn logout_clears_store_without_firing_listeners() {
	let server = MockServer::start_async().await;
	let (client, store) = build_client(&server);
	let fired = Arc::new(AtomicUsize::new(0));
	let counter = fired.clone();

	server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN_PATH);
			then.status(200).json_body(json!({ "access": "A1", "refresh": "R1", "user": null }));
		})
		.await;
	client.on_session_invalidated(move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	client.login("E-1001", "hunter2").await.expect("Login should succeed.");
	client.logout().expect("Logout should succeed.");

	assert!(store.get().is_none());
	assert!(store.refresh_token().is_none());
	assert!(!client.session().snapshot().authenticated);
	assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn requests_after_login_carry_the_issued_bearer() {
	let server = MockServer::start_async().await;
	let (client, _store) = build_client(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN_PATH);
			then.status(200).json_body(json!({ "access": "A1", "refresh": "R1" }));
		})
		.await;

	let products = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/products")
				.query_param("search", "relay")
				.header("authorization", "Bearer A1");
			then.status(200).json_body(json!([{ "id": 1, "name": "Relay" }]));
		})
		.await;

	client.login("E-1001", "hunter2").await.expect("Login should succeed.");

	let page = client
		.fetch_page::<serde_json::Value>(
			bearer_pipeline::http::ApiRequest::get("/api/products")
				.with_query("search", "relay")
				.with_query("unit", ""),
		)
		.await
		.expect("Product list should decode.");

	products.assert_async().await;

	assert_eq!(page.count, 1);
	assert!(page.next.is_none());
}
