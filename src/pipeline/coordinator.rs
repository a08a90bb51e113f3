//! Single-flight refresh state machine and its waiter queue.

// std
use std::mem;
// crates.io
use ::http::{Method, Request};
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{RefreshRequest, TokenPair, TokenSecret},
	config::PipelineConfig,
	error::RefreshError,
	http::{HttpTransport, body_preview, decode_json},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pipeline::RefreshMetrics,
	session::SessionBroadcaster,
	store::CredentialStore,
};

const KIND: FlowKind = FlowKind::Refresh;

/// Outcome delivered to every caller of one refresh cycle.
type CycleOutcome = std::result::Result<TokenSecret, Arc<RefreshError>>;

/// Observable phase of the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshState {
	/// No refresh in flight.
	Idle,
	/// A driver is performing the refresh call; new failures queue behind it.
	Refreshing,
}

#[derive(Debug, Default)]
enum CycleState {
	#[default]
	Idle,
	Refreshing {
		waiters: Vec<oneshot::Sender<CycleOutcome>>,
	},
}

enum Admission<'a> {
	Driver(CycleGuard<'a>),
	Waiter(oneshot::Receiver<CycleOutcome>),
}

/// Ends a cycle exactly once.
///
/// Dropping an unsettled guard (the driving future was cancelled mid-refresh) releases every
/// waiter with [`RefreshError::Abandoned`] and returns the state to idle.
struct CycleGuard<'a> {
	cycle: &'a Mutex<CycleState>,
	settled: bool,
}
impl CycleGuard<'_> {
	fn settle(mut self, outcome: CycleOutcome) -> usize {
		self.settled = true;

		drain(self.cycle, outcome)
	}
}
impl Drop for CycleGuard<'_> {
	fn drop(&mut self) {
		if !self.settled {
			drain(self.cycle, Err(Arc::new(RefreshError::Abandoned)));
		}
	}
}

/// Moves the state back to idle and resolves the drained waiters in arrival order.
fn drain(cycle: &Mutex<CycleState>, outcome: CycleOutcome) -> usize {
	let waiters = match mem::take(&mut *cycle.lock()) {
		CycleState::Refreshing { waiters } => waiters,
		CycleState::Idle => Vec::new(),
	};
	let released = waiters.len();

	for waiter in waiters {
		// A waiter whose caller went away has nothing left to resume.
		let _ = waiter.send(outcome.clone());
	}

	released
}

/// Owns the single-flight refresh cycle for one credential store.
///
/// The first caller to report an authorization failure while the coordinator is idle becomes the
/// driver: it calls the refresh endpoint directly on the transport, persists the rotated pair,
/// and releases the queue. Callers arriving while a refresh is in flight only enqueue a
/// completion handle. On failure the store is cleared and the [`SessionBroadcaster`] is told the
/// session ended; the refresh is never retried.
pub struct RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<PipelineConfig>,
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	session: Arc<SessionBroadcaster>,
	cycle: Mutex<CycleState>,
	metrics: RefreshMetrics,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an idle coordinator.
	pub fn new(
		config: Arc<PipelineConfig>,
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
		session: Arc<SessionBroadcaster>,
	) -> Self {
		Self {
			config,
			transport,
			store,
			session,
			cycle: Mutex::new(CycleState::Idle),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Current phase.
	pub fn state(&self) -> RefreshState {
		match *self.cycle.lock() {
			CycleState::Idle => RefreshState::Idle,
			CycleState::Refreshing { .. } => RefreshState::Refreshing,
		}
	}

	/// Number of callers queued behind the in-flight refresh.
	pub fn waiter_count(&self) -> usize {
		match &*self.cycle.lock() {
			CycleState::Idle => 0,
			CycleState::Refreshing { waiters } => waiters.len(),
		}
	}

	/// Counters for refresh cycles and replays.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Broadcaster invoked when a cycle ends the session.
	pub fn session(&self) -> &Arc<SessionBroadcaster> {
		&self.session
	}

	/// Obtains a fresh access credential after an authorization failure.
	///
	/// Either drives a new refresh cycle or joins the one in flight. Without a stored refresh
	/// credential the session is torn down immediately and no network call is made.
	pub async fn recover(&self) -> Result<TokenSecret> {
		let Some(refresh) = self.store.refresh_token() else {
			return Err(self.end_without_refresh());
		};

		match self.admit() {
			Admission::Driver(guard) => self.drive(guard, refresh).await,
			Admission::Waiter(receiver) => {
				obs::debug_event(KIND, "waiter_queued");

				match receiver.await {
					Ok(outcome) => outcome.map_err(Error::Refresh),
					Err(_) => Err(RefreshError::Abandoned.into()),
				}
			},
		}
	}

	fn admit(&self) -> Admission<'_> {
		let mut state = self.cycle.lock();

		match &mut *state {
			CycleState::Refreshing { waiters } => {
				let (sender, receiver) = oneshot::channel();

				waiters.push(sender);
				self.metrics.record_queued();

				Admission::Waiter(receiver)
			},
			CycleState::Idle => {
				*state = CycleState::Refreshing { waiters: Vec::new() };

				Admission::Driver(CycleGuard { cycle: &self.cycle, settled: false })
			},
		}
	}

	async fn drive(&self, guard: CycleGuard<'_>, refresh: TokenSecret) -> Result<TokenSecret> {
		let span = FlowSpan::new(KIND, "drive_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async move {
				let pair = match self.exchange(&refresh).await {
					Ok(pair) => pair,
					Err(err) => return Err(self.fail(guard, err)),
				};

				if !pair.is_rotated() {
					obs::warn_event(
						KIND,
						"refresh_credential_retained",
						&"refresh response carried no rotated refresh credential",
					);
				}

				let credentials = pair.into_credentials(Some(refresh));
				let access = credentials.access_token.clone();

				if let Err(err) = self.store.set(credentials) {
					return Err(self.fail(guard, RefreshError::Storage(err)));
				}

				self.metrics.record_success();
				guard.settle(Ok(access.clone()));
				obs::debug_event(KIND, "cycle_succeeded");

				Ok(access)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn exchange(&self, refresh: &TokenSecret) -> Result<TokenPair, RefreshError> {
		let body = serde_json::to_vec(&RefreshRequest { refresh: refresh.expose() })?;
		let mut request = Request::builder()
			.method(Method::POST)
			.uri(self.config.refresh_url.as_str())
			.body(body)?;

		request.headers_mut().extend(self.config.default_headers.clone());

		let response = self.transport.execute(request).await?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			return Err(RefreshError::Rejected { status, body: body_preview(response.body()) });
		}

		decode_json(response.body()).map_err(|source| RefreshError::Decode { source, status })
	}

	fn fail(&self, guard: CycleGuard<'_>, err: RefreshError) -> Error {
		let err = Arc::new(err);

		self.metrics.record_failure();
		obs::warn_event(KIND, "cycle_failed", &err);
		// The cycle must not go idle while the rejected pair is still stored.
		self.clear_store();
		guard.settle(Err(err.clone()));
		self.session.invalidate();

		Error::Refresh(err)
	}

	fn end_without_refresh(&self) -> Error {
		self.metrics.record_failure();
		obs::debug_event(KIND, "refresh_credential_missing");
		self.clear_store();
		self.session.invalidate();

		RefreshError::MissingRefreshToken.into()
	}

	fn clear_store(&self) {
		if let Err(err) = self.store.clear() {
			obs::warn_event(KIND, "store_clear_failed", &err);
		}
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("state", &self.state())
			.field("waiters", &self.waiter_count())
			.field("metrics", &self.metrics)
			.finish()
	}
}
