//! Pipeline configuration: backend base URL, authentication endpoints, and default headers.
//!
//! [`PipelineConfig`] is assembled through [`PipelineConfigBuilder`], which validates every URL
//! up front so the dispatcher and refresh coordinator never have to handle a malformed endpoint
//! mid-flight.

// std
use std::env;
// crates.io
use ::http::{
	HeaderMap, HeaderName, HeaderValue,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::_prelude::*;

/// Errors raised while constructing or validating a [`PipelineConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum PipelineConfigError {
	/// A URL could not be parsed.
	#[error("The {name} URL `{value}` is invalid.")]
	InvalidUrl {
		/// Which URL failed validation.
		name: &'static str,
		/// Raw value that failed to parse.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Only `http` and `https` backends are supported.
	#[error("The {name} URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which URL failed validation.
		name: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// The base URL cannot carry a path (e.g. `mailto:`).
	#[error("The base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be absolute.
	#[error("The {name} path must start with `/`: {path}.")]
	RelativePath {
		/// Which path failed validation.
		name: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// A default header value is not a valid header.
	#[error("Default header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
}

/// Immutable pipeline configuration shared by the dispatcher, coordinator, and client.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
	/// Base URL every relative request target is appended to.
	pub base_url: Url,
	/// Fully resolved refresh endpoint.
	pub refresh_url: Url,
	/// Fully resolved login endpoint.
	pub login_url: Url,
	/// Unauthenticated entry point announced when the session ends.
	pub login_redirect: String,
	/// Headers attached to every outbound call before request-specific headers.
	pub default_headers: HeaderMap,
}
impl PipelineConfig {
	/// Environment variable consulted by [`PipelineConfig::from_env`].
	pub const BASE_URL_ENV: &'static str = "API_BASE_URL";
	/// Base URL used when none is configured.
	pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8000";
	/// Default login endpoint path.
	pub const DEFAULT_LOGIN_PATH: &'static str = "/api/auth/login";
	/// Default unauthenticated entry point.
	pub const DEFAULT_LOGIN_REDIRECT: &'static str = "/login";
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "/api/auth/refresh";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> PipelineConfigBuilder {
		PipelineConfigBuilder::new(base_url)
	}

	/// Builds a default configuration from [`Self::BASE_URL_ENV`], falling back to
	/// [`Self::DEFAULT_BASE_URL`] when the variable is unset or empty.
	pub fn from_env() -> Result<Self, PipelineConfigError> {
		let raw = env::var(Self::BASE_URL_ENV)
			.ok()
			.filter(|value| !value.trim().is_empty())
			.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_owned());

		Self::builder(parse_url("base", raw.trim())?).build()
	}

	/// Resolves a request target against the base URL.
	///
	/// Absolute `http(s)` targets (such as pagination links returned by the backend) pass
	/// through unchanged; anything else is appended to the base URL path.
	pub fn endpoint(&self, target: &str) -> Result<Url, PipelineConfigError> {
		match Url::parse(target) {
			Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => Ok(absolute),
			_ => combine(&self.base_url, target),
		}
	}
}

/// Builder for [`PipelineConfig`] values.
#[derive(Debug)]
pub struct PipelineConfigBuilder {
	/// Base URL of the backend.
	pub base_url: Url,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Login endpoint path.
	pub login_path: String,
	/// Unauthenticated entry point.
	pub login_redirect: String,
	/// Extra default headers as raw name/value pairs.
	pub headers: Vec<(String, String)>,
}
impl PipelineConfigBuilder {
	/// Creates a new builder seeded with the default paths.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: PipelineConfig::DEFAULT_REFRESH_PATH.into(),
			login_path: PipelineConfig::DEFAULT_LOGIN_PATH.into(),
			login_redirect: PipelineConfig::DEFAULT_LOGIN_REDIRECT.into(),
			headers: Vec::new(),
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the unauthenticated entry point.
	pub fn login_redirect(mut self, path: impl Into<String>) -> Self {
		self.login_redirect = path.into();

		self
	}

	/// Adds a default header sent with every call.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<PipelineConfig, PipelineConfigError> {
		validate_base(&self.base_url)?;
		validate_path("refresh", &self.refresh_path)?;
		validate_path("login", &self.login_path)?;
		validate_path("login redirect", &self.login_redirect)?;

		let mut default_headers = HeaderMap::new();

		default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		for (name, value) in self.headers {
			let invalid = || PipelineConfigError::InvalidHeader { name: name.clone() };
			let header_name = HeaderName::try_from(name.as_str()).map_err(|_| invalid())?;
			let header_value = HeaderValue::try_from(value.as_str()).map_err(|_| invalid())?;

			default_headers.insert(header_name, header_value);
		}

		Ok(PipelineConfig {
			refresh_url: combine(&self.base_url, &self.refresh_path)?,
			login_url: combine(&self.base_url, &self.login_path)?,
			base_url: self.base_url,
			login_redirect: self.login_redirect,
			default_headers,
		})
	}
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, PipelineConfigError> {
	Url::parse(value).map_err(|source| PipelineConfigError::InvalidUrl {
		name,
		value: value.to_owned(),
		source,
	})
}

fn validate_base(url: &Url) -> Result<(), PipelineConfigError> {
	if url.cannot_be_a_base() {
		return Err(PipelineConfigError::CannotBeABase { url: url.to_string() });
	}
	if !matches!(url.scheme(), "http" | "https") {
		return Err(PipelineConfigError::UnsupportedScheme { name: "base", url: url.to_string() });
	}

	Ok(())
}

fn validate_path(name: &'static str, path: &str) -> Result<(), PipelineConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(PipelineConfigError::RelativePath { name, path: path.to_owned() })
	}
}

/// Appends `target` to `base` the way browser HTTP clients combine a base URL with a path.
fn combine(base: &Url, target: &str) -> Result<Url, PipelineConfigError> {
	let joined = if target.is_empty() {
		base.as_str().to_owned()
	} else {
		format!("{}/{}", base.as_str().trim_end_matches('/'), target.trim_start_matches('/'))
	};

	parse_url("request", &joined)
}
