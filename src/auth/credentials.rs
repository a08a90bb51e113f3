//! The access/refresh credential pair handed between the store and the pipeline.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access credential plus the refresh credential used to mint its successor.
///
/// The access credential is short-lived and attached to every request. The refresh credential is
/// only ever sent to the refresh endpoint; a missing refresh credential makes the session
/// unrecoverable once the access credential expires.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Access credential; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh credential, when the backend issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the pair was stored.
	pub issued_at: OffsetDateTime,
}
impl Credentials {
	/// Creates a pair stamped with the current UTC instant.
	pub fn new(access: impl Into<TokenSecret>, refresh: Option<impl Into<TokenSecret>>) -> Self {
		Self {
			access_token: access.into(),
			refresh_token: refresh.map(Into::into),
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Overrides the issued-at instant.
	pub fn with_issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = instant;

		self
	}

	/// Returns `true` when a refresh credential is present.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("access_token", &self.access_token)
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("issued_at", &self.issued_at)
			.finish()
	}
}
