//! Typed calls to the identity backend.

use std::sync::Arc;

use knugget_protocol::UserPayload;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::RefreshError;

mod http;
mod transport;

pub use http::ReqwestTransport;
pub use transport::{CredentialsMode, HttpReply, HttpRequest, HttpTransport, TransportError};

/// Paths relative to the API base.
pub mod endpoints {
	pub const SIGN_IN: &str = "/auth/signin";
	pub const SIGN_UP: &str = "/auth/signup";
	pub const REFRESH: &str = "/auth/refresh";
	pub const ME: &str = "/auth/me";
	pub const SUMMARY_GENERATE: &str = "/summary/generate";
	pub const SUMMARY_SAVE: &str = "/summary/save";
	pub const SUMMARIES: &str = "/summary";

	pub fn summary(id: &str) -> String {
		format!("{SUMMARIES}/{id}")
	}

	pub fn summaries_page(page: u32, limit: u32) -> String {
		format!("{SUMMARIES}?page={page}&limit={limit}")
	}
}

/// How a "who am I" call authenticates.
#[derive(Debug, Clone, Copy)]
pub enum WhoAmI<'a> {
	/// Bearer header plus ambient cookies.
	Bearer(&'a str),
	/// Ambient cookies only.
	Credentialed,
	/// Legacy API origin, no credentials.
	Legacy,
}

impl WhoAmI<'_> {
	fn label(&self) -> &'static str {
		match self {
			WhoAmI::Bearer(_) => "bearer",
			WhoAmI::Credentialed => "credentialed",
			WhoAmI::Legacy => "legacy",
		}
	}
}

#[derive(Clone)]
pub struct BackendClient {
	transport: Arc<dyn HttpTransport>,
	api_base: String,
	legacy_base: String,
}

impl BackendClient {
	pub fn new(transport: Arc<dyn HttpTransport>, config: &SyncConfig) -> Self {
		Self {
			transport,
			api_base: config.api_base_url().to_string(),
			legacy_base: config.legacy_api_base_url().to_string(),
		}
	}

	/// Absolute URL for `endpoint`; absolute endpoints pass through.
	pub fn url(&self, endpoint: &str) -> String {
		if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
			return endpoint.to_string();
		}
		format!("{}{}", self.api_base, endpoint)
	}

	pub async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
		self.transport.send(request).await
	}

	/// Exchanges `credential` for fresh user info.
	pub async fn refresh(&self, credential: &str) -> Result<UserPayload, RefreshError> {
		let request = HttpRequest::post(self.url(endpoints::REFRESH))
			.bearer(Some(credential))
			.json(Some(json!({ "refreshToken": credential })));
		let reply = self.send(request).await.map_err(|e| RefreshError::Network(e.to_string()))?;
		if !reply.is_success() {
			return Err(RefreshError::Rejected { status: reply.status });
		}
		let body = reply
			.body
			.ok_or_else(|| RefreshError::InvalidResponse("empty body".to_string()))?;
		decode_user(body).map_err(|e| RefreshError::InvalidResponse(e.to_string()))
	}

	/// Runs an identity check; `Ok(None)` when the backend does not recognize
	/// the caller.
	pub async fn who_am_i(&self, who: WhoAmI<'_>) -> Result<Option<UserPayload>, TransportError> {
		let request = match who {
			WhoAmI::Bearer(token) => HttpRequest::get(self.url(endpoints::ME)).bearer(Some(token)),
			WhoAmI::Credentialed => HttpRequest::get(self.url(endpoints::ME)),
			WhoAmI::Legacy => HttpRequest::get(format!("{}{}", self.legacy_base, endpoints::ME)).credentials(CredentialsMode::Omit),
		};
		let reply = self.send(request).await?;
		if !reply.is_success() {
			debug!(target = "knugget.backend", via = who.label(), status = reply.status, "identity check rejected");
			return Ok(None);
		}
		Ok(reply.body.and_then(|body| decode_user(body).ok()))
	}
}

/// Strips a `{success, data}` envelope if the backend used one.
pub fn unwrap_envelope(body: Value) -> Value {
	match body {
		Value::Object(mut map) if map.contains_key("success") && map.get("data").is_some_and(Value::is_object) => {
			map.remove("data").unwrap_or(Value::Null)
		}
		other => other,
	}
}

/// Decodes a user payload and flattens a nested `user` object.
pub fn decode_user(body: Value) -> Result<UserPayload, serde_json::Error> {
	serde_json::from_value::<UserPayload>(unwrap_envelope(body)).map(UserPayload::flattened)
}

/// Error message carried by a non-2xx body (`error` or `message`).
pub fn server_message(status: u16, body: Option<&Value>) -> String {
	let message = body.and_then(|b| {
		["error", "message"]
			.iter()
			.find_map(|key| b.get(*key).and_then(Value::as_str).map(str::to_string))
	});
	match message {
		Some(message) => friendly_error(&message),
		None => format!("Request failed with status {status}"),
	}
}

/// Maps known backend messages to text shown to the user.
pub fn friendly_error(message: &str) -> String {
	let mapped = match message {
		"Authentication required" => "Please log in to continue",
		"Invalid credentials" => "Incorrect email or password",
		"Email already exists" => "An account with this email already exists",
		"Invalid token" => "Your session has expired. Please log in again",
		"Rate limit exceeded" => "You've reached the request limit. Please try again later",
		"Failed to generate summary" => "Unable to generate summary. The video might be too long or content unclear",
		"Database error finding user" => "Server error. Please try again later or contact support.",
		"" => "An unknown error occurred",
		other => other,
	};
	mapped.to_string()
}
