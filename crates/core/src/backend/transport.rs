//! HTTP capability used by every backend call.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

/// Whether ambient credentials (cookies) accompany the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
	#[default]
	Include,
	Omit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
	pub method: Method,
	pub url: String,
	pub bearer: Option<String>,
	pub credentials: CredentialsMode,
	pub body: Option<Value>,
}

impl HttpRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			bearer: None,
			credentials: CredentialsMode::Include,
			body: None,
		}
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::POST, url)
	}

	pub fn bearer(mut self, token: Option<impl Into<String>>) -> Self {
		self.bearer = token.map(Into::into);
		self
	}

	pub fn credentials(mut self, mode: CredentialsMode) -> Self {
		self.credentials = mode;
		self
	}

	pub fn json(mut self, body: Option<Value>) -> Self {
		self.body = body;
		self
	}
}

/// Status plus the decoded JSON body; non-JSON bodies decode to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
	pub status: u16,
	pub body: Option<Value>,
}

impl HttpReply {
	pub fn new(status: u16, body: Option<Value>) -> Self {
		Self { status, body }
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
	#[error("request timed out")]
	Timeout,

	#[error("connection failed: {0}")]
	Connect(String),

	#[error("{0}")]
	Other(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
	async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;
}
