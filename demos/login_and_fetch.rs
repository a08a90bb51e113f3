//! Signs in against a mocked backend, lets the access credential expire, and shows the pipeline
//! refreshing once and replaying the call.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use bearer_pipeline::{
	client::ReqwestApiClient,
	config::PipelineConfig,
	session::SessionEvent,
	store::{CredentialStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(json!({
				"access": "demo-access-1",
				"refresh": "demo-refresh-1",
				"user": { "employee_code": "E-1001", "name": "Demo Buyer" }
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/products").header("authorization", "Bearer demo-access-1");
			then.status(401).json_body(json!({ "detail": "Given token not valid for any token type" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "access": "demo-access-2", "refresh": "demo-refresh-2" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/products").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(json!([{ "id": 1, "name": "Relay", "unit": "pcs" }]));
		})
		.await;

	let store = Arc::new(MemoryStore::default());
	let config = PipelineConfig::builder(Url::parse(&server.base_url())?).build()?;
	let client = ReqwestApiClient::new(config, store.clone())?;

	client.on_session_invalidated(|SessionEvent::Invalidated { redirect_to }| {
		println!("Session ended; redirecting to {redirect_to}.");
	});

	let session = client.login("E-1001", "demo-password").await?;

	println!("Signed in: {:?}", session.user);

	let page = client
		.fetch_page::<serde_json::Value>(bearer_pipeline::http::ApiRequest::get("/api/products"))
		.await?;

	println!("Fetched {} product(s): {:?}", page.count, page.results);
	println!("Refresh cycles: {}", client.coordinator().metrics().attempts());
	println!("Stored access credential: {:?}", store.get().map(|credentials| credentials.access_token));

	client.logout()?;

	Ok(())
}
