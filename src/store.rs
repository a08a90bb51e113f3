//! Credential storage contract and the built-in store implementations.
//!
//! A [`CredentialStore`] is the only component allowed to mutate persisted session data. The
//! access credential and the refresh credential live in separately scoped slots
//! ([`SessionSlots`]) because they have different exposure and lifetime characteristics, but a
//! reader always observes both slots from the same write.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
};

/// Storage backend contract implemented by credential stores.
///
/// Reads are synchronous and infallible so the dispatcher can attach a credential without an
/// extra suspension point. Writes replace both slots at once.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current pair, or `None` when no access credential is stored
	/// (unauthenticated).
	fn get(&self) -> Option<Credentials>;

	/// Returns the refresh credential, even while the access slot is empty.
	fn refresh_token(&self) -> Option<TokenSecret> {
		self.get().and_then(|credentials| credentials.refresh_token)
	}

	/// Replaces both slots with `credentials`.
	fn set(&self, credentials: Credentials) -> Result<(), StoreError>;

	/// Removes both credentials. Clearing an empty store succeeds.
	fn clear(&self) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage medium.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Stored state of a session: one slot per credential.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSlots {
	/// Short-lived slot read on every request.
	pub access: Option<AccessSlot>,
	/// Longer-lived slot read only by the refresh coordinator.
	pub refresh: Option<TokenSecret>,
}
impl SessionSlots {
	/// Projects the slots into a credential pair.
	pub fn credentials(&self) -> Option<Credentials> {
		self.access.as_ref().map(|access| Credentials {
			access_token: access.token.clone(),
			refresh_token: self.refresh.clone(),
			issued_at: access.issued_at,
		})
	}

	/// Returns `true` when neither slot holds a value.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh.is_none()
	}
}
impl From<Credentials> for SessionSlots {
	fn from(credentials: Credentials) -> Self {
		Self {
			access: Some(AccessSlot {
				token: credentials.access_token,
				issued_at: credentials.issued_at,
			}),
			refresh: credentials.refresh_token,
		}
	}
}

/// Access credential and the instant it was stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSlot {
	/// Access credential.
	pub token: TokenSecret,
	/// Instant the credential was stored.
	pub issued_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn slots_project_to_credentials() {
		let slots = SessionSlots::from(Credentials::new("A1", Some("R1")));
		let credentials = slots.credentials().expect("Access slot should produce credentials.");

		assert_eq!(credentials.access_token.expose(), "A1");
		assert_eq!(credentials.refresh_token.as_ref().map(TokenSecret::expose), Some("R1"));
	}

	#[test]
	fn refresh_only_slots_are_unauthenticated() {
		let slots = SessionSlots { access: None, refresh: Some(TokenSecret::new("R1")) };

		assert!(slots.credentials().is_none());
		assert!(!slots.is_empty());
	}
}
