//! Authenticated requests: token attachment, 401 recovery, bounded retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use knugget_protocol::SessionRecord;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{BackendClient, HttpRequest, server_message, unwrap_envelope};
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::{ApiError, RefreshError};

/// The context that owns the session: the background process itself, or a
/// proxy to it from a page agent.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
	async fn current(&self) -> Result<Option<SessionRecord>, ApiError>;
	/// Single-flight refresh of `current`.
	async fn refresh(&self, current: &SessionRecord) -> Result<SessionRecord, RefreshError>;
	/// Runs a reconciliation pass; true when a session exists afterwards.
	async fn reconcile(&self, rejected_token: Option<String>) -> Result<bool, ApiError>;
	/// Persists a session obtained by login or signup.
	async fn establish(&self, record: SessionRecord) -> Result<(), ApiError>;
	async fn logout(&self) -> Result<(), ApiError>;
}

/// What a request can authenticate with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
	Bearer(String),
	/// Session proven by cookies; no header is sent.
	Ambient,
	None,
}

impl Credential {
	fn bearer(&self) -> Option<String> {
		match self {
			Credential::Bearer(token) => Some(token.clone()),
			_ => None,
		}
	}
}

/// Read-side session helpers used by every caller of the backend.
#[derive(Clone)]
pub struct SessionAccess {
	authority: Arc<dyn SessionAuthority>,
	clock: SharedClock,
	margin_ms: i64,
	forced_wait: Duration,
}

impl SessionAccess {
	pub fn new(authority: Arc<dyn SessionAuthority>, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			authority,
			clock,
			margin_ms: config.refresh_margin_ms(),
			forced_wait: config.forced_wait(),
		}
	}

	pub fn authority(&self) -> &Arc<dyn SessionAuthority> {
		&self.authority
	}

	/// The stored record if it is outside the refresh margin, otherwise the
	/// refreshed one. `None` when logged out or the refresh failed.
	pub async fn valid_record(&self) -> Result<Option<SessionRecord>, ApiError> {
		let Some(record) = self.authority.current().await? else {
			return Ok(None);
		};
		if !record.expires_within(self.clock.now_ms(), self.margin_ms) {
			return Ok(Some(record));
		}
		if record.is_cookie_session() {
			return Ok(None);
		}
		match self.authority.refresh(&record).await {
			Ok(record) => Ok(Some(record)),
			Err(err) => {
				debug!(target = "knugget.request", error = %err, "token refresh failed");
				Ok(None)
			}
		}
	}

	/// Bearer token to send, refreshing first when near expiry.
	pub async fn get_valid_token(&self) -> Result<Option<String>, ApiError> {
		Ok(self.valid_record().await?.and_then(|r| r.bearer_token().map(str::to_string)))
	}

	pub async fn is_authenticated(&self) -> bool {
		matches!(self.valid_record().await, Ok(Some(_)))
	}

	pub async fn credential(&self) -> Result<Credential, ApiError> {
		Ok(match self.valid_record().await? {
			Some(record) => match record.bearer_token() {
				Some(token) => Credential::Bearer(token.to_string()),
				None => Credential::Ambient,
			},
			None => Credential::None,
		})
	}

	/// Reconciliation bounded by the forced wait. The pass keeps running in
	/// the background when the wait expires.
	pub async fn forced_reconcile(&self, rejected_token: Option<String>) -> bool {
		let authority = self.authority.clone();
		let pass = tokio::spawn(async move { authority.reconcile(rejected_token).await });
		match tokio::time::timeout(self.forced_wait, pass).await {
			Ok(Ok(Ok(found))) => found,
			Ok(Ok(Err(err))) => {
				warn!(target = "knugget.request", error = %err, "forced reconciliation failed");
				false
			}
			Ok(Err(err)) => {
				warn!(target = "knugget.request", error = %err, "forced reconciliation task failed");
				false
			}
			Err(_) => {
				debug!(target = "knugget.request", wait_ms = self.forced_wait.as_millis() as u64, "stopped waiting for reconciliation");
				false
			}
		}
	}
}

/// A 2xx response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
	pub status: u16,
	pub data: Value,
}

impl ApiResponse {
	/// Decodes `data`, stripping a `{success, data}` envelope.
	pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
		serde_json::from_value(unwrap_envelope(self.data)).map_err(|e| ApiError::Decode(e.to_string()))
	}
}

/// Default retries after a 401.
pub const DEFAULT_RETRIES: u32 = 1;

#[derive(Clone)]
pub struct AuthenticatedClient {
	backend: BackendClient,
	access: SessionAccess,
}

impl AuthenticatedClient {
	pub fn new(backend: BackendClient, access: SessionAccess) -> Self {
		Self { backend, access }
	}

	pub fn access(&self) -> &SessionAccess {
		&self.access
	}

	pub fn backend(&self) -> &BackendClient {
		&self.backend
	}

	/// Sends `method endpoint` with the session's credential.
	///
	/// With `requires_auth` and no credential, a bounded reconciliation runs
	/// first and nothing is sent if it finds no session. A 401 is answered by
	/// a refresh, then a reconciliation, and the request is retried while
	/// `retries_left` lasts.
	pub async fn authenticated_request(
		&self,
		endpoint: &str,
		method: Method,
		body: Option<Value>,
		requires_auth: bool,
		retries_left: u32,
	) -> Result<ApiResponse, ApiError> {
		let mut retries_left = retries_left;
		loop {
			let credential = if requires_auth { self.require_credential().await? } else { Credential::None };
			let bearer = credential.bearer();

			let request = HttpRequest::new(method.clone(), self.backend.url(endpoint))
				.bearer(bearer.clone())
				.json(body.clone());
			let reply = match self.backend.send(request).await {
				Ok(reply) => reply,
				Err(err) => {
					warn!(target = "knugget.request", %endpoint, error = %err, "request failed");
					return Err(ApiError::Network(err.to_string()));
				}
			};
			debug!(target = "knugget.request", %endpoint, %method, status = reply.status, has_bearer = bearer.is_some(), "response");

			if reply.is_success() {
				return Ok(ApiResponse {
					status: reply.status,
					data: reply.body.unwrap_or(Value::Null),
				});
			}

			if reply.status == 401 && requires_auth {
				if retries_left == 0 {
					return Err(ApiError::SessionExpired);
				}
				retries_left -= 1;
				if self.recover(bearer).await {
					info!(target = "knugget.request", %endpoint, retries_left, "retrying after 401");
					continue;
				}
				return Err(ApiError::SessionExpired);
			}

			return Err(ApiError::Server {
				status: reply.status,
				message: server_message(reply.status, reply.body.as_ref()),
			});
		}
	}

	pub async fn get(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
		self.authenticated_request(endpoint, Method::GET, None, true, DEFAULT_RETRIES).await
	}

	pub async fn post(&self, endpoint: &str, body: Value) -> Result<ApiResponse, ApiError> {
		self.authenticated_request(endpoint, Method::POST, Some(body), true, DEFAULT_RETRIES).await
	}

	pub async fn delete(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
		self.authenticated_request(endpoint, Method::DELETE, None, true, DEFAULT_RETRIES).await
	}

	async fn require_credential(&self) -> Result<Credential, ApiError> {
		match self.access.credential().await? {
			Credential::None => {}
			credential => return Ok(credential),
		}
		debug!(target = "knugget.request", "no credential; forcing reconciliation");
		if !self.access.forced_reconcile(None).await {
			return Err(ApiError::Unauthorized);
		}
		match self.access.credential().await? {
			Credential::None => Err(ApiError::Unauthorized),
			credential => Ok(credential),
		}
	}

	/// Refresh, else reconcile; true when a credential is available again.
	async fn recover(&self, rejected: Option<String>) -> bool {
		let authority = self.access.authority();
		if let Ok(Some(current)) = authority.current().await {
			if current.bearer_token().is_some() {
				match authority.refresh(&current).await {
					Ok(_) => return true,
					Err(err) => debug!(target = "knugget.request", error = %err, "refresh after 401 failed"),
				}
			}
		}
		let rejected = rejected.or_else(|| Some(knugget_protocol::PLACEHOLDER_TOKEN.to_string()));
		if !self.access.forced_reconcile(rejected).await {
			return false;
		}
		!matches!(self.access.credential().await, Ok(Credential::None) | Err(_))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use parking_lot::Mutex;
	use serde_json::json;

	use super::*;
	use crate::testing::{FakeTransport, ManualClock, Route, bearer_session};

	const NOW: i64 = 1_700_000_000_000;

	/// Authority with a scripted refresh and reconciliation.
	#[derive(Default)]
	struct StubAuthority {
		record: Mutex<Option<SessionRecord>>,
		refreshed: Mutex<Option<SessionRecord>>,
		reconciled: Mutex<Option<SessionRecord>>,
		reconcile_delay: Option<Duration>,
		refreshes: AtomicUsize,
		reconciles: AtomicUsize,
	}

	#[async_trait]
	impl SessionAuthority for StubAuthority {
		async fn current(&self) -> Result<Option<SessionRecord>, ApiError> {
			Ok(self.record.lock().clone())
		}

		async fn refresh(&self, _current: &SessionRecord) -> Result<SessionRecord, RefreshError> {
			self.refreshes.fetch_add(1, Ordering::SeqCst);
			let refreshed = self.refreshed.lock().clone().ok_or(RefreshError::Rejected { status: 401 })?;
			*self.record.lock() = Some(refreshed.clone());
			Ok(refreshed)
		}

		async fn reconcile(&self, _rejected_token: Option<String>) -> Result<bool, ApiError> {
			self.reconciles.fetch_add(1, Ordering::SeqCst);
			if let Some(delay) = self.reconcile_delay {
				tokio::time::sleep(delay).await;
			}
			let found = self.reconciled.lock().clone();
			*self.record.lock() = found.clone();
			Ok(found.is_some())
		}

		async fn establish(&self, record: SessionRecord) -> Result<(), ApiError> {
			*self.record.lock() = Some(record);
			Ok(())
		}

		async fn logout(&self) -> Result<(), ApiError> {
			*self.record.lock() = None;
			Ok(())
		}
	}

	fn client(transport: Arc<FakeTransport>, authority: Arc<StubAuthority>) -> AuthenticatedClient {
		let config = SyncConfig::default().with_forced_wait(Duration::from_millis(200));
		let backend = BackendClient::new(transport, &config);
		AuthenticatedClient::new(backend, SessionAccess::new(authority, ManualClock::shared(NOW), &config))
	}

	#[tokio::test]
	async fn missing_session_sends_nothing() {
		let transport = FakeTransport::new();
		let authority = Arc::new(StubAuthority::default());
		let err = client(transport.clone(), authority.clone()).get("/profile").await.unwrap_err();

		assert_eq!(err, ApiError::Unauthorized);
		assert_eq!(authority.reconciles.load(Ordering::SeqCst), 1);
		assert!(transport.requests().is_empty());
	}

	#[tokio::test]
	async fn forced_wait_is_bounded() {
		let transport = FakeTransport::new();
		let authority = Arc::new(StubAuthority {
			reconcile_delay: Some(Duration::from_secs(30)),
			..Default::default()
		});
		let started = tokio::time::Instant::now();
		let err = client(transport, authority).get("/profile").await.unwrap_err();

		assert_eq!(err, ApiError::Unauthorized);
		assert!(started.elapsed() < Duration::from_secs(5));
	}

	#[tokio::test]
	async fn reconciliation_supplies_missing_credential() {
		let transport = FakeTransport::new();
		transport.route(Route::get("/profile").when_bearer("found").json(200, json!({ "ok": true })));
		let authority = Arc::new(StubAuthority::default());
		*authority.reconciled.lock() = Some(bearer_session("found", NOW + 3_600_000));

		let response = client(transport, authority).get("/profile").await.unwrap();
		assert_eq!(response.data, json!({ "ok": true }));
	}

	#[tokio::test]
	async fn unauthenticated_requests_skip_bearer() {
		let transport = FakeTransport::new();
		transport.route(Route::post("/auth/signin").json(401, json!({ "error": "Invalid credentials" })));
		let authority = Arc::new(StubAuthority::default());
		*authority.record.lock() = Some(bearer_session("tok", NOW + 3_600_000));

		let err = client(transport.clone(), authority.clone())
			.authenticated_request("/auth/signin", Method::POST, Some(json!({})), false, DEFAULT_RETRIES)
			.await
			.unwrap_err();

		assert_eq!(
			err,
			ApiError::Server {
				status: 401,
				message: "Incorrect email or password".into()
			}
		);
		assert_eq!(transport.requests()[0].bearer, None);
		assert_eq!(authority.refreshes.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn unauthorized_response_refreshes_and_retries() {
		let transport = FakeTransport::new();
		transport.route(Route::get("/profile").when_bearer("old").status(401));
		transport.route(Route::get("/profile").when_bearer("new").json(200, json!({ "name": "Ada" })));
		let authority = Arc::new(StubAuthority::default());
		*authority.record.lock() = Some(bearer_session("old", NOW + 3_600_000));
		*authority.refreshed.lock() = Some(bearer_session("new", NOW + 7_200_000));

		let response = client(transport.clone(), authority.clone()).get("/profile").await.unwrap();
		assert_eq!(response.data["name"], "Ada");
		assert_eq!(transport.hits("/profile"), 2);
		assert_eq!(authority.refreshes.load(Ordering::SeqCst), 1);
		assert_eq!(authority.reconciles.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn retries_are_bounded() {
		let transport = FakeTransport::new();
		transport.route(Route::get("/profile").status(401));
		let authority = Arc::new(StubAuthority::default());
		*authority.record.lock() = Some(bearer_session("old", NOW + 3_600_000));
		*authority.refreshed.lock() = Some(bearer_session("new", NOW + 7_200_000));

		let err = client(transport.clone(), authority).get("/profile").await.unwrap_err();
		assert_eq!(err, ApiError::SessionExpired);
		assert_eq!(transport.hits("/profile"), 2);
	}

	#[tokio::test]
	async fn server_errors_are_mapped() {
		let transport = FakeTransport::new();
		transport.route(Route::post("/summary/generate").json(500, json!({ "message": "Failed to generate summary" })));
		let authority = Arc::new(StubAuthority::default());
		*authority.record.lock() = Some(bearer_session("tok", NOW + 3_600_000));

		let err = client(transport, authority).post("/summary/generate", json!({})).await.unwrap_err();
		assert_eq!(err.status(), Some(500));
		assert_eq!(err.to_string(), "Unable to generate summary. The video might be too long or content unclear");
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn transport_failure_is_not_retried() {
		let transport = FakeTransport::new();
		transport.route(Route::get("/profile").fail(crate::backend::TransportError::Timeout));
		let authority = Arc::new(StubAuthority::default());
		*authority.record.lock() = Some(bearer_session("tok", NOW + 3_600_000));

		let err = client(transport.clone(), authority).get("/profile").await.unwrap_err();
		assert!(matches!(err, ApiError::Network(_)));
		assert_eq!(transport.hits("/profile"), 1);
	}

	#[tokio::test]
	async fn cookie_sessions_send_no_bearer() {
		let transport = FakeTransport::new();
		transport.route(Route::get("/profile").json(200, json!({})));
		let authority = Arc::new(StubAuthority::default());
		let mut record = bearer_session(knugget_protocol::PLACEHOLDER_TOKEN, NOW + 3_600_000);
		record.kind = knugget_protocol::SessionKind::Cookie;
		*authority.record.lock() = Some(record);

		client(transport.clone(), authority).get("/profile").await.unwrap();
		assert_eq!(transport.requests()[0].bearer, None);
	}
}
