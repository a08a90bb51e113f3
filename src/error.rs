//! Pipeline-level error types shared across the dispatcher, coordinator, stores, and client.

// crates.io
use ::http::header::InvalidHeaderValue;
// self
use crate::_prelude::*;

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// JSON decoding failure annotated with the path of the offending field.
pub type DecodeError = serde_path_to_error::Error<serde_json::Error>;

/// Canonical pipeline error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] crate::config::PipelineConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The session could not be recovered; every caller of the same refresh cycle observes the
	/// same shared error.
	#[error("Session refresh failed: {0}")]
	Refresh(#[source] Arc<RefreshError>),

	/// The request was still rejected as unauthenticated after one credential refresh.
	#[error("Request to {target} was rejected as unauthenticated.")]
	Unauthorized {
		/// Request target as supplied by the caller.
		target: String,
		/// Body preview returned by the backend.
		body: String,
	},
	/// Backend answered with a non-success status (raised by
	/// [`ApiResponse::error_for_status`](crate::http::ApiResponse::error_for_status)).
	#[error("Backend returned HTTP {status}: {body}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Body preview returned by the backend.
		body: String,
	},
	/// Login was refused by the backend.
	#[error("Login failed: {reason}.")]
	Login {
		/// Backend-supplied `detail` or a generic reason.
		reason: String,
	},
	/// Response body could not be decoded.
	#[error("Response body with HTTP {status} could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: DecodeError,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Request body could not be encoded as JSON.
	#[error("Request body could not be encoded as JSON.")]
	Encode(#[from] serde_json::Error),
	/// HTTP request construction failed.
	#[error(transparent)]
	Request(#[from] ::http::Error),
	/// Credential contains characters that cannot be placed in a header.
	#[error("Credential cannot be used as an HTTP header value.")]
	InvalidHeader(#[from] InvalidHeaderValue),
}
impl Error {
	/// Returns the shared refresh failure, when this error ended a session.
	pub fn as_refresh(&self) -> Option<&RefreshError> {
		match self {
			Self::Refresh(err) => Some(err.as_ref()),
			_ => None,
		}
	}

	/// Returns `true` when the error means the session is gone and the user must sign in again.
	pub fn is_session_ended(&self) -> bool {
		matches!(self, Self::Refresh(_) | Self::Unauthorized { .. })
	}
}
impl From<RefreshError> for Error {
	fn from(e: RefreshError) -> Self {
		Self::Refresh(Arc::new(e))
	}
}

/// Reasons a refresh cycle can end without a new access credential.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// No refresh credential was stored; no network call was made.
	#[error("No refresh credential is available.")]
	MissingRefreshToken,
	/// Refresh endpoint rejected the refresh credential.
	#[error("Refresh endpoint answered HTTP {status}: {body}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Body preview returned by the backend.
		body: String,
	},
	/// Refresh endpoint was unreachable.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Refresh endpoint answered with a body that is not a credential pair.
	#[error("Refresh endpoint returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: DecodeError,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Refresh request body could not be encoded.
	#[error("Refresh request could not be encoded.")]
	Encode(#[from] serde_json::Error),
	/// Refresh request could not be constructed.
	#[error(transparent)]
	Request(#[from] ::http::Error),
	/// Rotated credentials could not be persisted.
	#[error("Rotated credentials could not be stored: {0}")]
	Storage(#[source] crate::store::StoreError),
	/// The driving call was dropped before the refresh settled.
	#[error("Refresh was abandoned before it settled.")]
	Abandoned,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
