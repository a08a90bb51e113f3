//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
	store::{CredentialStore, SessionSlots, StoreError},
};

/// Thread-safe storage backend that keeps credentials in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<SessionSlots>>);
impl MemoryStore {
	/// Returns a copy of both slots as last written.
	pub fn snapshot(&self) -> SessionSlots {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> Option<Credentials> {
		self.0.read().credentials()
	}

	fn refresh_token(&self) -> Option<TokenSecret> {
		self.0.read().refresh.clone()
	}

	fn set(&self, credentials: Credentials) -> Result<(), StoreError> {
		*self.0.write() = credentials.into();

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		*self.0.write() = SessionSlots::default();

		Ok(())
	}
}
