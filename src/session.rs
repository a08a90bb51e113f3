//! Process-wide session state and the forced-logout broadcast.
//!
//! [`SessionBroadcaster`] is the only place that flips the application's view of "signed in".
//! The refresh coordinator calls [`SessionBroadcaster::invalidate`] when a cycle ends the session;
//! UI layers register with [`SessionBroadcaster::on_session_invalidated`] to navigate back to the
//! unauthenticated entry point.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind},
};

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Flags the rest of the application observes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
	/// A usable access credential is believed to exist.
	pub authenticated: bool,
	/// The initial authentication check has completed.
	pub checked: bool,
	/// Profile returned by the login endpoint, when known.
	pub user: Option<Value>,
}

/// Notifications delivered to registered listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// The session ended involuntarily; navigate to `redirect_to`.
	Invalidated {
		/// Unauthenticated entry point.
		redirect_to: String,
	},
}

/// Handle returned by [`SessionBroadcaster::on_session_invalidated`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Owns [`SessionState`] and fans out invalidation events.
///
/// Invalidation is idempotent: concurrent or repeated calls converge on the same signed-out state
/// and listeners fire once until the session is marked authenticated again.
pub struct SessionBroadcaster {
	redirect_to: String,
	state: RwLock<SessionState>,
	armed: AtomicBool,
	listeners: Mutex<Vec<(ListenerId, Listener)>>,
	next_id: AtomicU64,
	invalidations: AtomicUsize,
}
impl SessionBroadcaster {
	/// Creates a broadcaster that announces `redirect_to` on invalidation.
	pub fn new(redirect_to: impl Into<String>) -> Self {
		Self {
			redirect_to: redirect_to.into(),
			state: RwLock::new(SessionState::default()),
			armed: AtomicBool::new(true),
			listeners: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(0),
			invalidations: AtomicUsize::new(0),
		}
	}

	/// Unauthenticated entry point carried by [`SessionEvent::Invalidated`].
	pub fn redirect_to(&self) -> &str {
		&self.redirect_to
	}

	/// Copy of the current flags.
	pub fn snapshot(&self) -> SessionState {
		self.state.read().clone()
	}

	/// Number of invalidations that actually fired listeners.
	pub fn invalidation_count(&self) -> usize {
		self.invalidations.load(Ordering::Relaxed)
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}

	/// Records a successful sign-in and re-arms invalidation.
	pub fn mark_authenticated(&self, user: Option<Value>) {
		{
			let mut state = self.state.write();

			state.authenticated = true;
			state.checked = true;

			if user.is_some() {
				state.user = user;
			}
		}

		self.armed.store(true, Ordering::SeqCst);
	}

	/// Records the outcome of the initial authentication check. A positive check re-arms
	/// invalidation.
	pub fn mark_checked(&self, authenticated: bool) {
		{
			let mut state = self.state.write();

			state.authenticated = authenticated;
			state.checked = true;

			if !authenticated {
				state.user = None;
			}
		}

		if authenticated {
			self.armed.store(true, Ordering::SeqCst);
		}
	}

	/// Voluntary sign-out: clears the flags without notifying listeners.
	pub fn sign_out(&self) {
		let mut state = self.state.write();

		state.authenticated = false;
		state.user = None;
	}

	/// Forces the session to the signed-out state.
	///
	/// Returns `true` when this call fired the listeners.
	pub fn invalidate(&self) -> bool {
		self.sign_out();

		if !self.armed.swap(false, Ordering::SeqCst) {
			obs::debug_event(FlowKind::Invalidate, "already_invalidated");

			return false;
		}

		self.invalidations.fetch_add(1, Ordering::Relaxed);
		obs::debug_event(FlowKind::Invalidate, "session_invalidated");

		let event = SessionEvent::Invalidated { redirect_to: self.redirect_to.clone() };
		// Listeners run outside the lock so they may register or remove listeners themselves.
		let listeners =
			self.listeners.lock().iter().map(|(_, listener)| listener.clone()).collect::<Vec<_>>();

		for listener in listeners {
			listener(&event);
		}

		true
	}

	/// Registers `callback` for forced-logout events.
	pub fn on_session_invalidated<F>(&self, callback: F) -> ListenerId
	where
		F: 'static + Fn(&SessionEvent) + Send + Sync,
	{
		let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.listeners.lock().push((id, Arc::new(callback)));

		id
	}

	/// Unregisters a listener. Returns `false` when `id` was unknown.
	pub fn remove_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.listeners.lock();
		let before = listeners.len();

		listeners.retain(|(existing, _)| *existing != id);

		listeners.len() != before
	}
}
impl Debug for SessionBroadcaster {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroadcaster")
			.field("redirect_to", &self.redirect_to)
			.field("state", &*self.state.read())
			.field("armed", &self.armed.load(Ordering::Relaxed))
			.field("listeners", &self.listener_count())
			.finish()
	}
}
