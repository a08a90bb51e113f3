// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::PipelineConfig,
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pipeline::RefreshCoordinator,
	store::CredentialStore,
};

const KIND: FlowKind = FlowKind::Dispatch;

/// An outbound call plus the flag that keeps it from entering the refresh path twice.
#[derive(Clone, Debug)]
pub struct RequestRecord {
	/// The call being dispatched.
	pub request: ApiRequest,
	/// Set once the call has been replayed after a refresh.
	pub attempted: bool,
}
impl RequestRecord {
	/// Wraps a fresh request.
	pub fn new(request: ApiRequest) -> Self {
		Self { request, attempted: false }
	}
}

/// Attaches the stored access credential to every call and routes `401` responses through the
/// [`RefreshCoordinator`].
///
/// Any non-`401` response, success or not, is returned untouched. A `401` on a record that was
/// already replayed surfaces as [`Error::Unauthorized`] instead of starting another refresh.
pub struct RequestDispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<PipelineConfig>,
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	coordinator: Arc<RefreshCoordinator<T>>,
}
impl<T> RequestDispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a dispatcher sharing `coordinator` with any other dispatcher over the same store.
	pub fn new(
		config: Arc<PipelineConfig>,
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
		coordinator: Arc<RefreshCoordinator<T>>,
	) -> Self {
		Self { config, transport, store, coordinator }
	}

	/// Refresh coordinator used by this dispatcher.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<T>> {
		&self.coordinator
	}

	/// Sends `request`, recovering once from an expired access credential.
	pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
		let span = FlowSpan::new(KIND, "dispatch");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch_record(RequestRecord::new(request))).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Sends an existing record. Records already marked as attempted never trigger a refresh.
	///
	/// When the store already holds a different access credential than the one the rejected call
	/// carried, another cycle finished while the call was in flight and the record is replayed
	/// with that credential without refreshing.
	pub async fn dispatch_record(&self, mut record: RequestRecord) -> Result<ApiResponse> {
		let mut credential = None;

		loop {
			let (response, sent) = self.send(&record.request, credential.take()).await?;

			if !response.is_unauthorized() {
				return Ok(response);
			}
			if record.attempted {
				obs::debug_event(KIND, "replay_rejected");

				return Err(Error::Unauthorized {
					target: record.request.target,
					body: response.preview(),
				});
			}

			record.attempted = true;
			// The replay carries the credential this cycle produced, not whatever the store
			// holds by the time it is sent.
			credential = Some(match self.newer_credential(sent.as_ref()) {
				Some(current) => {
					obs::debug_event(KIND, "stale_credential_replayed");

					current
				},
				None => self.coordinator.recover().await?,
			});
			self.coordinator.metrics().record_replay();
		}
	}

	fn newer_credential(&self, sent: Option<&TokenSecret>) -> Option<TokenSecret> {
		self.store
			.get()
			.map(|credentials| credentials.access_token)
			.filter(|current| Some(current) != sent)
	}

	async fn send(
		&self,
		request: &ApiRequest,
		credential: Option<TokenSecret>,
	) -> Result<(ApiResponse, Option<TokenSecret>)> {
		let credential =
			credential.or_else(|| self.store.get().map(|credentials| credentials.access_token));
		let wire = request.to_http(&self.config, credential.as_ref())?;
		let response = self.transport.execute(wire).await?;

		Ok((ApiResponse::from(response), credential))
	}
}
impl<T> Clone for RequestDispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			store: self.store.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<T> Debug for RequestDispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDispatcher")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use ::http::StatusCode;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::Credentials,
		error::RefreshError,
		http::{HttpRequest, TransportFuture},
		session::SessionBroadcaster,
		store::MemoryStore,
	};

	/// Completes another caller's refresh cycle while the first request is in flight.
	struct RotatesMidFlight {
		backend: Arc<MockBackend>,
		store: Arc<MemoryStore>,
	}
	impl HttpTransport for RotatesMidFlight {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let response = self.backend.execute(request).await;

				if self.store.get().is_some_and(|credentials| credentials.access_token.expose() == "A1")
				{
					self.store
						.set(Credentials::new("A2", Some("R2")))
						.expect("Rotating the memory store should succeed.");
				}

				response
			})
		}
	}

	fn dispatcher<T>(backend: &Arc<T>, store: &Arc<MemoryStore>) -> RequestDispatcher<T>
	where
		T: HttpTransport,
	{
		let config = Arc::new(test_config());
		let coordinator = Arc::new(RefreshCoordinator::new(
			config.clone(),
			backend.clone(),
			store.clone(),
			Arc::new(SessionBroadcaster::new("/login")),
		));

		RequestDispatcher::new(config, backend.clone(), store.clone(), coordinator)
	}

	#[tokio::test]
	async fn valid_credential_passes_straight_through() {
		let backend = Arc::new(MockBackend::new("A1"));
		let store = seeded_store("A1", Some("R1"));
		let response = dispatcher(&backend, &store)
			.dispatch(ApiRequest::get("/api/products"))
			.await
			.expect("Authorized call should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(backend.refresh_calls(), 0);
		assert_eq!(backend.seen()[0].authorization.as_deref(), Some("Bearer A1"));
	}

	#[tokio::test]
	async fn non_401_failures_are_returned_untouched() {
		let backend = Arc::new(MockBackend::new("A1"));
		let store = seeded_store("A1", Some("R1"));
		let response = dispatcher(&backend, &store)
			.dispatch(ApiRequest::get(FORBIDDEN_PATH))
			.await
			.expect("403 should pass through as a response.");

		assert_eq!(response.status, StatusCode::FORBIDDEN);
		assert_eq!(backend.refresh_calls(), 0);
	}

	#[tokio::test]
	async fn expired_credential_is_refreshed_and_replayed_with_the_new_one() {
		let backend = Arc::new(MockBackend::new("A2"));
		let store = seeded_store("A1", Some("R1"));
		let dispatcher = dispatcher(&backend, &store);
		let response = dispatcher
			.dispatch(ApiRequest::get("/api/orders"))
			.await
			.expect("Replay after refresh should succeed.");
		let orders = backend.seen_for("/api/orders");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(backend.refresh_calls(), 1);
		assert_eq!(orders.len(), 2);
		assert_eq!(orders[0].authorization.as_deref(), Some("Bearer A1"));
		assert_eq!(orders[1].authorization.as_deref(), Some("Bearer A2"));
		assert_eq!(store.get().map(|c| c.access_token.expose().to_owned()).as_deref(), Some("A2"));
		assert_eq!(store.refresh_token().as_ref().map(TokenSecret::expose), Some("R2"));
		assert_eq!(dispatcher.coordinator().metrics().replays(), 1);
	}

	#[tokio::test]
	async fn stale_401_replays_with_the_stored_credential_without_refreshing() {
		let backend = Arc::new(MockBackend::new("A2"));
		let store = seeded_store("A1", Some("R1"));
		let transport = Arc::new(RotatesMidFlight { backend: backend.clone(), store: store.clone() });
		let dispatcher = dispatcher(&transport, &store);
		let response = dispatcher
			.dispatch(ApiRequest::get("/api/orders"))
			.await
			.expect("Replay with the newer stored credential should succeed.");
		let orders = backend.seen_for("/api/orders");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(backend.refresh_calls(), 0);
		assert_eq!(orders.len(), 2);
		assert_eq!(orders[0].authorization.as_deref(), Some("Bearer A1"));
		assert_eq!(orders[1].authorization.as_deref(), Some("Bearer A2"));
		assert_eq!(dispatcher.coordinator().metrics().attempts(), 0);
		assert_eq!(dispatcher.coordinator().metrics().replays(), 1);
		assert_eq!(store.refresh_token().as_ref().map(TokenSecret::expose), Some("R2"));
	}

	#[tokio::test]
	async fn replayed_401_does_not_refresh_again() {
		let backend = Arc::new(MockBackend::new("A1"));
		let store = seeded_store("A1", Some("R1"));
		let dispatcher = dispatcher(&backend, &store);
		let err = dispatcher
			.dispatch(ApiRequest::get(ALWAYS_UNAUTHORIZED_PATH))
			.await
			.expect_err("A 401 after replay should surface.");

		assert!(
			matches!(err, Error::Unauthorized { ref target, .. } if target == ALWAYS_UNAUTHORIZED_PATH)
		);
		assert_eq!(backend.refresh_calls(), 1);
		assert_eq!(backend.seen_for(ALWAYS_UNAUTHORIZED_PATH).len(), 2);
		assert_eq!(dispatcher.coordinator().session().invalidation_count(), 0);
		assert_eq!(store.refresh_token().as_ref().map(TokenSecret::expose), Some("R2"));
	}

	#[tokio::test]
	async fn attempted_records_skip_the_refresh_path() {
		let backend = Arc::new(MockBackend::new("A2"));
		let store = seeded_store("A1", Some("R1"));
		let mut record = RequestRecord::new(ApiRequest::get("/api/orders"));

		record.attempted = true;

		let err = dispatcher(&backend, &store)
			.dispatch_record(record)
			.await
			.expect_err("Attempted records should not refresh.");

		assert!(matches!(err, Error::Unauthorized { .. }));
		assert_eq!(backend.refresh_calls(), 0);
	}

	#[tokio::test]
	async fn failed_refresh_surfaces_as_session_end() {
		let backend = Arc::new(MockBackend::new("A2").with_refresh_reply(RefreshReply::Reject(401)));
		let store = seeded_store("A1", Some("R1"));
		let dispatcher = dispatcher(&backend, &store);
		let err = dispatcher
			.dispatch(ApiRequest::get("/api/orders"))
			.await
			.expect_err("Refresh rejection should fail the call.");

		assert!(err.is_session_ended());
		assert!(matches!(err.as_refresh(), Some(RefreshError::Rejected { status: 401, .. })));
		assert_eq!(backend.seen_for("/api/orders").len(), 1);
		assert!(store.get().is_none());
		assert_eq!(dispatcher.coordinator().session().invalidation_count(), 1);
	}
}
