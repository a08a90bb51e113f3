//! JSON payloads exchanged with the authentication endpoints.
//!
//! The backend spells the pair `access`/`refresh`; the camel-cased `accessToken`/`refreshToken`
//! variants are accepted on decode so either backend flavor works unchanged.

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
};

/// Body of `POST <refresh-endpoint>`.
#[derive(Clone, Debug, Serialize)]
pub struct RefreshRequest<'a> {
	/// Current refresh credential.
	pub refresh: &'a str,
}

/// Credential pair minted by the refresh endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenPair {
	/// New access credential.
	#[serde(alias = "accessToken", alias = "access_token")]
	pub access: TokenSecret,
	/// Rotated refresh credential, when the backend issued one.
	#[serde(default, alias = "refreshToken", alias = "refresh_token")]
	pub refresh: Option<TokenSecret>,
}
impl TokenPair {
	/// Converts the pair into stored credentials, retaining `previous_refresh` when the backend
	/// did not rotate it.
	pub fn into_credentials(self, previous_refresh: Option<TokenSecret>) -> Credentials {
		Credentials {
			access_token: self.access,
			refresh_token: self.refresh.or(previous_refresh),
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns `true` when the backend issued a new refresh credential.
	pub fn is_rotated(&self) -> bool {
		self.refresh.is_some()
	}
}

/// Body of `POST <login-endpoint>`.
#[derive(Clone, Serialize)]
pub struct LoginRequest<'a> {
	/// Employee code identifying the operator.
	pub employee_code: &'a str,
	/// Plain-text password; only ever serialized into the request body.
	pub password: &'a str,
}
impl Debug for LoginRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("employee_code", &self.employee_code)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Successful login payload.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
	/// Access/refresh pair issued for the session.
	#[serde(flatten)]
	pub tokens: TokenPair,
	/// Opaque profile of the signed-in user.
	#[serde(default)]
	pub user: Option<serde_json::Value>,
}

/// Error payload returned by the backend on refused requests.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorDetail {
	/// Human-readable reason.
	#[serde(default)]
	pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_pair_accepts_both_spellings() {
		let short: TokenPair = serde_json::from_str(r#"{"access":"A2","refresh":"R2"}"#)
			.expect("Short field names should decode.");
		let camel: TokenPair = serde_json::from_str(r#"{"accessToken":"A2","refreshToken":"R2"}"#)
			.expect("Camel-cased field names should decode.");

		assert_eq!(short.access.expose(), camel.access.expose());
		assert_eq!(
			short.refresh.as_ref().map(TokenSecret::expose),
			camel.refresh.as_ref().map(TokenSecret::expose),
		);
	}

	#[test]
	fn unrotated_pair_keeps_previous_refresh() {
		let pair: TokenPair =
			serde_json::from_str(r#"{"access":"A2"}"#).expect("Access-only pair should decode.");

		assert!(!pair.is_rotated());

		let credentials = pair.into_credentials(Some(TokenSecret::new("R1")));

		assert_eq!(credentials.access_token.expose(), "A2");
		assert_eq!(credentials.refresh_token.as_ref().map(TokenSecret::expose), Some("R1"));
	}

	#[test]
	fn login_response_flattens_pair_and_user() {
		let response: LoginResponse = serde_json::from_str(
			r#"{"access":"A1","refresh":"R1","user":{"employee_code":"E-100","name":"Rafi"}}"#,
		)
		.expect("Login response should decode.");

		assert_eq!(response.tokens.access.expose(), "A1");
		assert_eq!(
			response.user.as_ref().and_then(|user| user.get("employee_code")),
			Some(&serde_json::json!("E-100")),
		);
	}

	#[test]
	fn login_request_redacts_password() {
		let request = LoginRequest { employee_code: "E-100", password: "hunter2" };

		assert!(!format!("{request:?}").contains("hunter2"));
	}
}
