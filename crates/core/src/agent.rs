//! The tab-side context.
//!
//! A page agent never refreshes or reconciles on its own: both are proxied to
//! the background process so the single-flight guarantee holds across tabs.

use std::sync::Arc;

use async_trait::async_trait;
use knugget_protocol::{AuthState, ForceCheck, Message, MessageSender, PageRef, Reply, SessionRecord};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::KnuggetApi;
use crate::background::Background;
use crate::backend::{BackendClient, HttpTransport};
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::{ApiError, LinkError, RefreshError};
use crate::request::{ApiResponse, AuthenticatedClient, SessionAccess, SessionAuthority};

/// Request/reply channel from a page agent to the background process.
#[async_trait]
pub trait BackgroundLink: Send + Sync {
	async fn request(&self, message: Message) -> Result<Reply, LinkError>;
}

/// Link to a background process in the same address space.
pub struct LocalLink {
	background: Arc<Background>,
	sender: MessageSender,
}

impl LocalLink {
	pub fn new(background: Arc<Background>, sender: MessageSender) -> Self {
		Self { background, sender }
	}
}

#[async_trait]
impl BackgroundLink for LocalLink {
	async fn request(&self, message: Message) -> Result<Reply, LinkError> {
		Ok(self.background.handle_message(message, &self.sender).await)
	}
}

/// [`SessionAuthority`] that forwards to the background process.
struct LinkedAuthority {
	link: Arc<dyn BackgroundLink>,
}

impl LinkedAuthority {
	async fn expect_success(&self, message: Message) -> Result<Reply, ApiError> {
		let reply = self.link.request(message).await?;
		if reply.success {
			Ok(reply)
		} else {
			Err(ApiError::Storage(reply.error.unwrap_or_default()))
		}
	}
}

#[async_trait]
impl SessionAuthority for LinkedAuthority {
	async fn current(&self) -> Result<Option<SessionRecord>, ApiError> {
		Ok(self.expect_success(Message::GetSession).await?.session)
	}

	async fn refresh(&self, _current: &SessionRecord) -> Result<SessionRecord, RefreshError> {
		let reply = self.link.request(Message::RefreshSession).await?;
		match (reply.success, reply.session) {
			(true, Some(record)) => Ok(record),
			_ => Err(RefreshError::Remote(reply.error.unwrap_or_else(|| "refresh failed".to_string()))),
		}
	}

	async fn reconcile(&self, rejected_token: Option<String>) -> Result<bool, ApiError> {
		let reply = self
			.link
			.request(Message::ForceCheckWebsiteLogin(Some(ForceCheck { rejected_token })))
			.await?;
		Ok(reply.is_logged_in.unwrap_or(false))
	}

	async fn establish(&self, record: SessionRecord) -> Result<(), ApiError> {
		self.expect_success(Message::StoreSession(record)).await.map(|_| ())
	}

	async fn logout(&self) -> Result<(), ApiError> {
		self.expect_success(Message::Logout).await.map(|_| ())
	}
}

pub struct PageAgent {
	link: Arc<dyn BackgroundLink>,
	api: KnuggetApi,
	state: watch::Sender<bool>,
}

impl PageAgent {
	pub fn new(link: Arc<dyn BackgroundLink>, transport: Arc<dyn HttpTransport>, clock: SharedClock, config: &SyncConfig) -> Self {
		let authority = Arc::new(LinkedAuthority { link: link.clone() });
		let access = SessionAccess::new(authority, clock.clone(), config);
		let client = AuthenticatedClient::new(BackendClient::new(transport, config), access);
		let (state, _) = watch::channel(false);
		Self {
			link,
			api: KnuggetApi::new(client, clock, config),
			state,
		}
	}

	/// Registers with the background and asks it to check the website login.
	pub async fn page_loaded(&self) -> Result<bool, LinkError> {
		self.link.request(Message::PageLoaded).await?;
		let reply = self.link.request(Message::ForceCheckWebsiteLogin(None)).await?;
		let logged_in = reply.is_logged_in.unwrap_or(false);
		self.state.send_replace(logged_in);
		debug!(target = "knugget.agent", logged_in, "page agent ready");
		Ok(logged_in)
	}

	/// Handles a push from the background process.
	pub async fn on_message(&self, message: Message) {
		match message {
			Message::SessionChanged(state) | Message::AuthStateChanged(state) => {
				self.state.send_replace(state.is_logged_in);
			}
			Message::ForceRefreshUi => {
				let logged_in = self.is_authenticated().await;
				self.state.send_replace(logged_in);
			}
			Message::RefreshAuthState(refresh) => {
				if refresh.is_some_and(|r| r.force_check) {
					self.api.client().access().forced_reconcile(None).await;
				}
				let logged_in = self.is_authenticated().await;
				debug!(target = "knugget.agent", logged_in, "auth state refreshed");
				self.state.send_replace(logged_in);
			}
			other => debug!(target = "knugget.agent", kind = other.kind(), "ignored push"),
		}
	}

	/// Last known auth state; changes on every push.
	pub fn subscribe(&self) -> watch::Receiver<bool> {
		self.state.subscribe()
	}

	pub fn is_logged_in(&self) -> bool {
		*self.state.borrow()
	}

	pub async fn is_authenticated(&self) -> bool {
		self.api.client().access().is_authenticated().await
	}

	pub async fn get_valid_token(&self) -> Result<Option<String>, ApiError> {
		self.api.client().access().get_valid_token().await
	}

	pub async fn authenticated_request(
		&self,
		endpoint: &str,
		method: Method,
		body: Option<Value>,
		requires_auth: bool,
		retries_left: u32,
	) -> Result<ApiResponse, ApiError> {
		self.api
			.client()
			.authenticated_request(endpoint, method, body, requires_auth, retries_left)
			.await
	}

	pub fn api(&self) -> &KnuggetApi {
		&self.api
	}

	/// Tells every other agent about a local auth change.
	pub async fn announce(&self, is_logged_in: bool) {
		self.state.send_replace(is_logged_in);
		if let Err(err) = self.link.request(Message::AuthStateChanged(AuthState { is_logged_in })).await {
			warn!(target = "knugget.agent", error = %err, "failed to announce auth state");
		}
	}

	pub async fn open_login_page(&self) -> Result<Reply, LinkError> {
		self.link.request(Message::OpenLoginPage).await
	}

	pub async fn open_signup_page(&self, current_url: Option<String>) -> Result<Reply, LinkError> {
		self.link.request(Message::OpenSignupPage(Some(PageRef { url: current_url }))).await
	}
}
