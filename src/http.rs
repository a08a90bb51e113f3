//! Request/response models and the transport seam used by the pipeline.
//!
//! Callers describe a call with [`ApiRequest`] (no credential attached). The dispatcher resolves
//! it against the [`PipelineConfig`], attaches the bearer header, and hands the resulting
//! [`HttpRequest`] to an [`HttpTransport`]. The refresh coordinator talks to the same transport
//! directly so refresh calls never pass back through the dispatcher.

// crates.io
use ::http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::PipelineConfig,
	error::{DecodeError, TransportError},
};

/// Wire-level request handed to an [`HttpTransport`].
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Wire-level response returned by an [`HttpTransport`].
pub type HttpResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Abstraction over HTTP stacks capable of executing a single call.
///
/// Implementations must not follow redirects or interpret status codes; classification happens
/// in the pipeline.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the raw response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Description of an outbound call before any credential is attached.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Service-relative path or absolute URL.
	pub target: String,
	/// Query parameters appended to the resolved URL.
	pub query: Vec<(String, String)>,
	/// Request-specific headers layered over the configured defaults.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request without body or extra headers.
	pub fn new(method: Method, target: impl Into<String>) -> Self {
		Self {
			method,
			target: target.into(),
			query: Vec::new(),
			headers: HeaderMap::new(),
			body: None,
		}
	}

	/// `GET target`.
	pub fn get(target: impl Into<String>) -> Self {
		Self::new(Method::GET, target)
	}

	/// `DELETE target`.
	pub fn delete(target: impl Into<String>) -> Self {
		Self::new(Method::DELETE, target)
	}

	/// `POST target` with a JSON body.
	pub fn post_json<T>(target: impl Into<String>, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Self::new(Method::POST, target).with_json(body)
	}

	/// `PUT target` with a JSON body.
	pub fn put_json<T>(target: impl Into<String>, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Self::new(Method::PUT, target).with_json(body)
	}

	/// Serializes `body` as JSON and sets the content type.
	pub fn with_json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Replaces the raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Appends a query parameter; empty values are skipped.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		let value = value.into();

		if !value.is_empty() {
			self.query.push((key.into(), value));
		}

		self
	}

	/// Sets a request-specific header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Builds the wire request, attaching `credential` as a bearer header when present.
	pub fn to_http(
		&self,
		config: &PipelineConfig,
		credential: Option<&TokenSecret>,
	) -> Result<HttpRequest> {
		let mut url = config.endpoint(&self.target)?;

		if !self.query.is_empty() {
			url.query_pairs_mut()
				.extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
		}

		let mut request = ::http::Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.body(self.body.clone().unwrap_or_default())?;
		let headers = request.headers_mut();

		headers.extend(config.default_headers.clone());
		headers.extend(self.headers.clone());

		if let Some(credential) = credential {
			let mut value = HeaderValue::try_from(credential.bearer())?;

			value.set_sensitive(true);
			headers.insert(AUTHORIZATION, value);
		}

		Ok(request)
	}
}

/// Response returned to callers; non-success statuses other than `401` are passed through
/// untouched.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// `true` for `401 Unauthorized`, the only status that triggers the refresh path.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// `true` for any 2xx status.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Decodes the body as JSON.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		decode_json(&self.body)
			.map_err(|source| Error::Decode { source, status: self.status.as_u16() })
	}

	/// Returns the body as (lossy) UTF-8 text.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Converts non-2xx responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status { status: self.status.as_u16(), body: self.preview() })
		}
	}

	/// Short, log-safe preview of the body.
	pub fn preview(&self) -> String {
		body_preview(&self.body)
	}
}
impl From<HttpResponse> for ApiResponse {
	fn from(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status, headers: parts.headers, body }
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The pipeline classifies every status itself, so the wrapped client must not follow
/// redirects; [`ReqwestTransport::new`] configures that for you.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, TransportError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client.execute(reqwest::Request::try_from(request)?).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Decodes JSON while keeping the path of the offending field.
pub(crate) fn decode_json<T>(body: &[u8]) -> Result<T, DecodeError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
}

/// Truncated, lossy UTF-8 rendering of a response body.
pub(crate) fn body_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	match text.char_indices().nth(BODY_PREVIEW_LIMIT) {
		Some((cut, _)) => format!("{}…", &text[..cut]),
		None => text.into_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::test_config;

	#[test]
	fn to_http_layers_defaults_request_headers_and_bearer() {
		let config = test_config();
		let request = ApiRequest::get("/api/products")
			.with_query("search", "transformer")
			.with_query("unit", "")
			.with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller-supplied"));
		let http = request
			.to_http(&config, Some(&TokenSecret::new("A1")))
			.expect("Request should convert to wire form.");

		assert_eq!(http.uri().to_string(), "http://backend.test/api/products?search=transformer");
		assert_eq!(
			http.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
			Some("Bearer A1"),
		);
		assert!(http.headers().get(AUTHORIZATION).is_some_and(HeaderValue::is_sensitive));
		assert_eq!(
			http.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
			Some("application/json"),
		);
	}

	#[test]
	fn to_http_without_credential_sends_no_authorization() {
		let http = ApiRequest::delete("/api/vendors/7")
			.to_http(&test_config(), None)
			.expect("Request should convert to wire form.");

		assert_eq!(http.method(), &Method::DELETE);
		assert!(http.headers().get(AUTHORIZATION).is_none());
	}

	#[test]
	fn json_bodies_are_encoded() {
		let request = ApiRequest::post_json("/api/vendors", &serde_json::json!({ "name": "Acme" }))
			.expect("JSON body should encode.");

		assert_eq!(request.method, Method::POST);
		assert_eq!(request.body.as_deref(), Some(br#"{"name":"Acme"}"#.as_slice()));
	}

	#[test]
	fn error_for_status_keeps_business_errors_readable() {
		let response = ApiResponse {
			status: StatusCode::BAD_REQUEST,
			headers: HeaderMap::new(),
			body: br#"{"name":["This field is required."]}"#.to_vec(),
		};
		let err = response.error_for_status().expect_err("400 should become an error.");

		assert!(matches!(err, Error::Status { status: 400, ref body } if body.contains("required")));
	}

	#[test]
	fn json_decode_errors_report_the_field_path() {
		#[derive(Debug, Deserialize)]
		struct Page {
			#[allow(dead_code)]
			count: u32,
		}

		let response = ApiResponse {
			status: StatusCode::OK,
			headers: HeaderMap::new(),
			body: br#"{"count":"many"}"#.to_vec(),
		};
		let err = response.json::<Page>().expect_err("Mistyped field should fail to decode.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "count");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn previews_are_truncated() {
		let body = "x".repeat(BODY_PREVIEW_LIMIT + 10);
		let preview = body_preview(body.as_bytes());

		assert_eq!(preview.chars().count(), BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
