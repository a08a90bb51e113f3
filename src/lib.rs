//! Bearer-authenticated request pipeline for REST consoles: credential attachment, single-flight
//! refresh with ordered replay, and process-wide session teardown when refresh fails.
//!
//! The crate is organized leaves first:
//!
//! - [`store`] owns the persisted access and refresh credentials.
//! - [`http`] describes outbound calls and the transport seam.
//! - [`pipeline`] hosts the [`RequestDispatcher`](pipeline::RequestDispatcher) and the
//!   [`RefreshCoordinator`](pipeline::RefreshCoordinator) state machine.
//! - [`session`] broadcasts forced logouts to the rest of the application.
//! - [`client`] wires everything behind a single `request` entry point.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		io,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use ::http::{Response, StatusCode, header::AUTHORIZATION};
	use futures::channel::oneshot;
	// self
	use crate::{
		auth::Credentials,
		client::ApiClient,
		config::PipelineConfig,
		error::TransportError,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
		store::{CredentialStore, MemoryStore},
	};

	/// Base URL used by in-process test backends.
	pub const TEST_BASE_URL: &str = "http://backend.test";
	/// Path that always answers `401`, even after a refresh.
	pub const ALWAYS_UNAUTHORIZED_PATH: &str = "/api/always-401";
	/// Path that always answers `403`.
	pub const FORBIDDEN_PATH: &str = "/api/forbidden";

	/// Behavior of the scripted refresh endpoint.
	#[derive(Clone, Debug)]
	pub enum RefreshReply {
		/// Issue a new pair; the backend starts accepting `access` immediately.
		Rotate {
			/// New access credential.
			access: String,
			/// New refresh credential, if the backend rotates it.
			refresh: Option<String>,
		},
		/// Answer with the given non-success status.
		Reject(u16),
		/// Fail at the transport layer.
		Unreachable,
	}

	/// A request observed by [`MockBackend`].
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct SeenRequest {
		/// Request path.
		pub path: String,
		/// Raw `Authorization` header, if any.
		pub authorization: Option<String>,
		/// Raw request body.
		pub body: Vec<u8>,
	}

	/// In-process backend that honors a single valid access credential and scripts the refresh
	/// endpoint.
	///
	/// Every path other than the refresh endpoint answers `200` when the bearer matches the
	/// currently valid access credential and `401` otherwise.
	#[derive(Debug)]
	pub struct MockBackend {
		valid_access: Mutex<String>,
		refresh_reply: Mutex<RefreshReply>,
		gate: Mutex<Option<oneshot::Receiver<()>>>,
		refresh_calls: AtomicUsize,
		seen: Mutex<Vec<SeenRequest>>,
	}
	impl MockBackend {
		/// Creates a backend that accepts `valid_access` and rotates to `A2`/`R2` on refresh.
		pub fn new(valid_access: &str) -> Self {
			Self {
				valid_access: Mutex::new(valid_access.into()),
				refresh_reply: Mutex::new(RefreshReply::Rotate {
					access: "A2".into(),
					refresh: Some("R2".into()),
				}),
				gate: Mutex::new(None),
				refresh_calls: AtomicUsize::new(0),
				seen: Mutex::new(Vec::new()),
			}
		}

		/// Overrides the refresh endpoint behavior.
		pub fn with_refresh_reply(self, reply: RefreshReply) -> Self {
			*self.refresh_reply.lock() = reply;

			self
		}

		/// Holds the next refresh call until the returned sender fires (or is dropped).
		pub fn gate_refresh(&self) -> oneshot::Sender<()> {
			let (tx, rx) = oneshot::channel();

			*self.gate.lock() = Some(rx);

			tx
		}

		/// Number of refresh calls received so far.
		pub fn refresh_calls(&self) -> usize {
			self.refresh_calls.load(Ordering::SeqCst)
		}

		/// Requests received so far, in arrival order.
		pub fn seen(&self) -> Vec<SeenRequest> {
			self.seen.lock().clone()
		}

		/// Requests received for `path`, in arrival order.
		pub fn seen_for(&self, path: &str) -> Vec<SeenRequest> {
			self.seen.lock().iter().filter(|seen| seen.path == path).cloned().collect()
		}

		async fn refresh(&self) -> Result<HttpResponse, TransportError> {
			self.refresh_calls.fetch_add(1, Ordering::SeqCst);

			let gate = self.gate.lock().take();

			if let Some(gate) = gate {
				let _ = gate.await;
			}

			let reply = self.refresh_reply.lock().clone();

			match reply {
				RefreshReply::Rotate { access, refresh } => {
					*self.valid_access.lock() = access.clone();

					let body = match refresh {
						Some(refresh) => serde_json::json!({ "access": access, "refresh": refresh }),
						None => serde_json::json!({ "access": access }),
					};

					Ok(json_response(StatusCode::OK, &body))
				},
				RefreshReply::Reject(status) => Ok(json_response(
					StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED),
					&serde_json::json!({ "detail": "Token is invalid or expired" }),
				)),
				RefreshReply::Unreachable => Err(TransportError::Io(io::Error::new(
					io::ErrorKind::ConnectionRefused,
					"refresh endpoint unreachable",
				))),
			}
		}
	}
	impl HttpTransport for MockBackend {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let path = request.uri().path().to_owned();
				let authorization = request
					.headers()
					.get(AUTHORIZATION)
					.and_then(|value| value.to_str().ok())
					.map(str::to_owned);

				self.seen.lock().push(SeenRequest {
					path: path.clone(),
					authorization: authorization.clone(),
					body: request.body().clone(),
				});

				if path == "/api/auth/refresh" {
					return self.refresh().await;
				}
				if path == FORBIDDEN_PATH {
					return Ok(json_response(
						StatusCode::FORBIDDEN,
						&serde_json::json!({ "detail": "Not allowed" }),
					));
				}

				let expected = format!("Bearer {}", self.valid_access.lock());

				if path != ALWAYS_UNAUTHORIZED_PATH && authorization.as_deref() == Some(&expected) {
					Ok(json_response(StatusCode::OK, &serde_json::json!({ "path": path })))
				} else {
					Ok(json_response(
						StatusCode::UNAUTHORIZED,
						&serde_json::json!({ "detail": "Given token not valid" }),
					))
				}
			})
		}
	}

	fn json_response(status: StatusCode, body: &serde_json::Value) -> HttpResponse {
		let mut response = Response::new(serde_json::to_vec(body).unwrap_or_default());

		*response.status_mut() = status;

		response
	}

	/// Configuration pointing at [`TEST_BASE_URL`] with default paths.
	pub fn test_config() -> PipelineConfig {
		PipelineConfig::builder(Url::parse(TEST_BASE_URL).expect("Test base URL should parse."))
			.build()
			.expect("Default test configuration should validate.")
	}

	/// Memory store seeded with the provided credential pair.
	pub fn seeded_store(access: &str, refresh: Option<&str>) -> Arc<MemoryStore> {
		let store = Arc::new(MemoryStore::default());

		store
			.set(Credentials::new(access, refresh))
			.expect("Seeding the memory store should succeed.");

		store
	}

	/// Builds an [`ApiClient`] over `backend` and a memory store seeded with `access`/`refresh`.
	pub fn build_test_client(
		backend: Arc<MockBackend>,
		access: &str,
		refresh: Option<&str>,
	) -> (ApiClient<MockBackend>, Arc<MemoryStore>) {
		let store = seeded_store(access, refresh);
		let client = ApiClient::with_transport(test_config(), store.clone(), backend);

		(client, store)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
