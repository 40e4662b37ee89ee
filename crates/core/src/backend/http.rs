//! [`HttpTransport`] over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::trace;
use url::Url;

use super::transport::{CredentialsMode, HttpReply, HttpRequest, HttpTransport, TransportError};
use crate::cookies::Cookie;

/// Two clients: one with a cookie store for credentialed requests, one
/// without for anonymous requests.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
	credentialed: reqwest::Client,
	anonymous: reqwest::Client,
	jar: Arc<Jar>,
}

impl ReqwestTransport {
	pub fn new(timeout: Duration) -> Result<Self, TransportError> {
		let jar = Arc::new(Jar::default());
		let credentialed = reqwest::Client::builder()
			.timeout(timeout)
			.cookie_provider(jar.clone())
			.build()
			.map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {e}")))?;
		let anonymous = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {e}")))?;
		Ok(Self { credentialed, anonymous, jar })
	}

	/// Makes `cookies` ambient for credentialed requests to `origin`.
	pub fn seed_cookies(&self, origin: &str, cookies: &[Cookie]) {
		let Ok(url) = Url::parse(origin) else {
			return;
		};
		for cookie in cookies {
			self.jar.add_cookie_str(&format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path), &url);
		}
	}

	fn client(&self, mode: CredentialsMode) -> &reqwest::Client {
		match mode {
			CredentialsMode::Include => &self.credentialed,
			CredentialsMode::Omit => &self.anonymous,
		}
	}
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
	async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
		trace!(
			target = "knugget.http",
			method = %request.method,
			url = %request.url,
			has_bearer = request.bearer.is_some(),
			"sending request"
		);
		let mut builder = self
			.client(request.credentials)
			.request(request.method, &request.url)
			.header(ACCEPT, "application/json");
		if let Some(token) = &request.bearer {
			builder = builder.bearer_auth(token);
		}
		if let Some(body) = &request.body {
			builder = builder.header(CONTENT_TYPE, "application/json").json(body);
		}

		let response = builder.send().await.map_err(map_reqwest_error)?;
		let status = response.status().as_u16();
		let bytes = response.bytes().await.map_err(map_reqwest_error)?;
		let body = serde_json::from_slice::<Value>(&bytes).ok();
		Ok(HttpReply { status, body })
	}
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
	if err.is_timeout() {
		TransportError::Timeout
	} else if err.is_connect() {
		TransportError::Connect(err.to_string())
	} else {
		TransportError::Other(err.to_string())
	}
}
