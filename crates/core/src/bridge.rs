//! Session messages sent by the website itself.

use knugget_protocol::{Message, MessageSender, Reply, SessionRecord, UserPayload};
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::{SyncConfig, origin_of};
use crate::error::ApiError;
use crate::record::{RecordDefaults, bearer_record};
use crate::store::SessionStore;

pub const EMPTY_PAYLOAD: &str = "Empty payload";
pub const NO_TOKEN: &str = "No token provided";
pub const NO_USER_ID: &str = "No user ID provided";
pub const UNHANDLED: &str = "Unhandled message type";
pub const UNTRUSTED_ORIGIN: &str = "Untrusted origin";

/// Accepts logins, auth checks and logouts from trusted web origins.
pub struct LoginBridge {
	store: SessionStore,
	clock: SharedClock,
	lifetime_ms: i64,
	trusted: Vec<String>,
}

impl LoginBridge {
	pub fn new(store: SessionStore, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			store,
			clock,
			lifetime_ms: config.session_lifetime_ms(),
			trusted: config.trusted_origins(),
		}
	}

	pub fn is_trusted(&self, sender: &MessageSender) -> bool {
		sender
			.url
			.as_deref()
			.and_then(origin_of)
			.is_some_and(|origin| self.trusted.iter().any(|t| t.trim_end_matches('/') == origin))
	}

	pub async fn handle(&self, message: Message, sender: &MessageSender) -> Reply {
		if !self.is_trusted(sender) {
			warn!(target = "knugget.bridge", url = ?sender.url, kind = message.kind(), "rejected message from untrusted origin");
			return Reply::failure(UNTRUSTED_ORIGIN);
		}
		match message {
			Message::KnuggetAuthSuccess(payload) => match self.accept(payload).await {
				Ok(_) => Reply::ok(),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::KnuggetCheckAuth => match self.store.get().await {
				Ok(record) => Reply::logged_in(record.is_some()).with_user(record.map(|r| r.public_user())),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::KnuggetLogout => match self.store.clear().await {
				Ok(()) => {
					info!(target = "knugget.bridge", "website logged out");
					Reply::ok()
				}
				Err(err) => Reply::failure(err.to_string()),
			},
			other => {
				warn!(target = "knugget.bridge", kind = other.kind(), "unhandled external message");
				Reply::failure(UNHANDLED)
			}
		}
	}

	/// Validates and stores a login pushed by the website.
	pub async fn accept(&self, payload: Option<UserPayload>) -> Result<SessionRecord, ApiError> {
		let payload = payload.ok_or_else(|| ApiError::Validation(EMPTY_PAYLOAD.to_string()))?.flattened();
		if payload.token.as_deref().is_none_or(str::is_empty) {
			return Err(ApiError::Validation(NO_TOKEN.to_string()));
		}
		if payload.id.as_deref().is_none_or(str::is_empty) {
			return Err(ApiError::Validation(NO_USER_ID.to_string()));
		}
		let defaults = RecordDefaults {
			now_ms: self.clock.now_ms(),
			lifetime_ms: self.lifetime_ms,
		};
		let record = bearer_record(payload, defaults).ok_or_else(|| ApiError::Validation(NO_USER_ID.to_string()))?;
		self.store.set(&record).await?;
		info!(
			target = "knugget.bridge",
			user_id = %record.user_id,
			token_len = record.access_token.len(),
			expires_at = record.expires_at,
			"website login stored"
		);
		Ok(record)
	}
}
