//! High-level client facade wiring the store, dispatcher, coordinator, and session together.

// crates.io
use ::http::{Method, Request};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{ErrorDetail, LoginRequest, LoginResponse},
	config::PipelineConfig,
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pipeline::{RefreshCoordinator, RequestDispatcher},
	session::{ListenerId, SessionBroadcaster, SessionEvent, SessionState},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

const LOGIN_FALLBACK_REASON: &str = "Invalid credentials";

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// One page of a list endpoint.
///
/// Some endpoints answer with a bare JSON array, others with a paginated envelope; both decode
/// into this shape. An envelope without `count` counts its own `results`. `next`/`previous` are
/// absolute URLs that can be passed straight back to [`ApiClient::fetch_page`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PageShape<T>")]
pub struct Page<T> {
	/// Items on this page.
	pub results: Vec<T>,
	/// Total number of items across all pages.
	pub count: u64,
	/// Link to the next page.
	pub next: Option<String>,
	/// Link to the previous page.
	pub previous: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageShape<T> {
	Paged {
		results: Vec<T>,
		#[serde(default)]
		count: Option<u64>,
		#[serde(default)]
		next: Option<String>,
		#[serde(default)]
		previous: Option<String>,
	},
	Bare(Vec<T>),
}
impl<T> From<PageShape<T>> for Page<T> {
	fn from(shape: PageShape<T>) -> Self {
		match shape {
			PageShape::Paged { results, count, next, previous } => Self {
				count: count.unwrap_or(results.len() as u64),
				results,
				next,
				previous,
			},
			PageShape::Bare(results) =>
				Self { count: results.len() as u64, results, next: None, previous: None },
		}
	}
}

/// Authenticated REST client.
///
/// Every call goes through a [`RequestDispatcher`]; all dispatchers cloned from one client share
/// a single [`RefreshCoordinator`] so a burst of expired calls triggers exactly one refresh.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<PipelineConfig>,
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	session: Arc<SessionBroadcaster>,
	dispatcher: RequestDispatcher<T>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-provided transport.
	pub fn with_transport(
		config: PipelineConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let config = Arc::new(config);
		let transport = transport.into();
		let session = Arc::new(SessionBroadcaster::new(config.login_redirect.clone()));
		let coordinator = Arc::new(RefreshCoordinator::new(
			config.clone(),
			transport.clone(),
			store.clone(),
			session.clone(),
		));
		let dispatcher =
			RequestDispatcher::new(config.clone(), transport.clone(), store.clone(), coordinator);

		Self { config, transport, store, session, dispatcher }
	}

	/// Validated configuration.
	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	/// Credential store backing this client.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Session broadcaster owning the signed-in flags.
	pub fn session(&self) -> &Arc<SessionBroadcaster> {
		&self.session
	}

	/// Shared refresh coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<T>> {
		self.dispatcher.coordinator()
	}

	/// A dispatcher sharing this client's coordinator.
	pub fn dispatcher(&self) -> RequestDispatcher<T> {
		self.dispatcher.clone()
	}

	/// Sends `request` through the pipeline.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.dispatcher.dispatch(request).await
	}

	/// `GET target`.
	pub async fn get(&self, target: impl Into<String>) -> Result<ApiResponse> {
		self.request(ApiRequest::get(target)).await
	}

	/// `POST target` with a JSON body.
	pub async fn post_json<B>(&self, target: impl Into<String>, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.request(ApiRequest::post_json(target, body)?).await
	}

	/// `PUT target` with a JSON body.
	pub async fn put_json<B>(&self, target: impl Into<String>, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.request(ApiRequest::put_json(target, body)?).await
	}

	/// `DELETE target`.
	pub async fn delete(&self, target: impl Into<String>) -> Result<ApiResponse> {
		self.request(ApiRequest::delete(target)).await
	}

	/// Sends `request` and decodes a 2xx JSON body; other statuses become [`Error::Status`].
	pub async fn fetch_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(request).await?.error_for_status()?.json()
	}

	/// Fetches one page of a list endpoint, normalizing bare arrays into a [`Page`].
	pub async fn fetch_page<R>(&self, request: ApiRequest) -> Result<Page<R>>
	where
		R: DeserializeOwned,
	{
		self.fetch_json(request).await
	}

	/// Initial authentication check: the session counts as signed in iff an access credential is
	/// stored. No network call is made.
	pub fn restore(&self) -> SessionState {
		self.session.mark_checked(self.store.get().is_some());

		self.session.snapshot()
	}

	/// Signs in with an employee code and password.
	///
	/// The login call bypasses the dispatcher: it carries no bearer and a refused login never
	/// enters the refresh path.
	pub async fn login(&self, employee_code: &str, password: &str) -> Result<SessionState> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let body = serde_json::to_vec(&LoginRequest { employee_code, password })?;
				let mut request = Request::builder()
					.method(Method::POST)
					.uri(self.config.login_url.as_str())
					.body(body)?;

				request.headers_mut().extend(self.config.default_headers.clone());

				let response = ApiResponse::from(self.transport.execute(request).await?);

				if !response.is_success() {
					let reason = response
						.json::<ErrorDetail>()
						.ok()
						.and_then(|detail| detail.detail)
						.unwrap_or_else(|| LOGIN_FALLBACK_REASON.into());

					obs::warn_event(KIND, "login_refused", &reason);

					return Err(Error::Login { reason });
				}

				let LoginResponse { tokens, user } = response.json()?;

				self.store.set(tokens.into_credentials(None))?;
				self.session.mark_authenticated(user);

				Ok(self.session.snapshot())
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Voluntary sign-out: clears stored credentials and the session flags without notifying
	/// invalidation listeners.
	pub fn logout(&self) -> Result<()> {
		self.store.clear()?;
		self.session.sign_out();

		Ok(())
	}

	/// Registers `callback` for forced-logout events.
	pub fn on_session_invalidated<F>(&self, callback: F) -> ListenerId
	where
		F: 'static + Fn(&SessionEvent) + Send + Sync,
	{
		self.session.on_session_invalidated(callback)
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client backed by a redirect-free reqwest transport.
	pub fn new(config: PipelineConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
		Ok(Self::with_transport(config, store, ReqwestTransport::new()?))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			store: self.store.clone(),
			session: self.session.clone(),
			dispatcher: self.dispatcher.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("session", &self.session)
			.field("coordinator", self.coordinator())
			.finish()
	}
}
