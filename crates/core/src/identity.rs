//! Sources of session truth consulted by the reconciler, in order.

use std::sync::Arc;

use async_trait::async_trait;
use knugget_protocol::{SessionRecord, UserPayload};
use tracing::{debug, warn};

use crate::backend::{BackendClient, WhoAmI};
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::cookies::{Cookie, CookieJar, CookieMatcher};
use crate::record::{RecordDefaults, bearer_record, cookie_record};
use crate::refresh::RefreshCoordinator;
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
	LocalStore,
	CookieProbe,
	CredentialedProbe,
	LegacyProbe,
}

impl SourceKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			SourceKind::LocalStore => "local_store",
			SourceKind::CookieProbe => "cookie_probe",
			SourceKind::CredentialedProbe => "credentialed_probe",
			SourceKind::LegacyProbe => "legacy_probe",
		}
	}
}

/// Inputs shared by every probe in one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeContext {
	/// Token the backend just answered 401 for.
	pub rejected_token: Option<String>,
}

impl ProbeContext {
	pub fn rejecting(token: Option<String>) -> Self {
		Self { rejected_token: token }
	}

	fn is_rejected(&self, token: &str) -> bool {
		self.rejected_token.as_deref() == Some(token)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
	/// The stored session is already good.
	Valid,
	/// A new session was found and should be persisted.
	Established(SessionRecord),
	Miss,
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
	fn kind(&self) -> SourceKind;
	async fn probe(&self, ctx: &ProbeContext) -> Probe;
}

/// Trusts the stored record until it is within the refresh margin, then
/// tries a refresh.
pub struct LocalStoreSource {
	store: SessionStore,
	coordinator: RefreshCoordinator,
	clock: SharedClock,
	margin_ms: i64,
}

impl LocalStoreSource {
	pub fn new(store: SessionStore, coordinator: RefreshCoordinator, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			store,
			coordinator,
			clock,
			margin_ms: config.refresh_margin_ms(),
		}
	}
}

#[async_trait]
impl IdentitySource for LocalStoreSource {
	fn kind(&self) -> SourceKind {
		SourceKind::LocalStore
	}

	async fn probe(&self, ctx: &ProbeContext) -> Probe {
		let record = match self.store.get().await {
			Ok(Some(record)) => record,
			Ok(None) => return Probe::Miss,
			Err(err) => {
				warn!(target = "knugget.reconcile", error = %err, "failed to read stored session");
				return Probe::Miss;
			}
		};
		if ctx.is_rejected(&record.access_token) {
			debug!(target = "knugget.reconcile", user_id = %record.user_id, "stored token was rejected by the backend");
			return Probe::Miss;
		}
		if !record.expires_within(self.clock.now_ms(), self.margin_ms) {
			return Probe::Valid;
		}
		if record.is_cookie_session() {
			return Probe::Miss;
		}
		match self.coordinator.refresh(&record).await {
			Ok(_) => Probe::Valid,
			Err(err) => {
				debug!(target = "knugget.reconcile", error = %err, "refresh during reconciliation failed");
				Probe::Miss
			}
		}
	}
}

/// Looks for an auth cookie and verifies it with "who am I".
pub struct CookieProbeSource {
	jar: Arc<dyn CookieJar>,
	matcher: CookieMatcher,
	backend: BackendClient,
	origins: Vec<String>,
	clock: SharedClock,
	lifetime_ms: i64,
}

impl CookieProbeSource {
	pub fn new(jar: Arc<dyn CookieJar>, backend: BackendClient, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			jar,
			matcher: CookieMatcher::default(),
			backend,
			origins: config.cookie_origins(),
			clock,
			lifetime_ms: config.session_lifetime_ms(),
		}
	}

	pub fn with_matcher(mut self, matcher: CookieMatcher) -> Self {
		self.matcher = matcher;
		self
	}

	async fn collect(&self) -> Vec<Cookie> {
		let mut all: Vec<Cookie> = Vec::new();
		for origin in &self.origins {
			match self.jar.cookies_for(origin).await {
				Ok(cookies) => {
					for cookie in cookies {
						if !all.iter().any(|c| c.name == cookie.name && c.value == cookie.value) {
							all.push(cookie);
						}
					}
				}
				Err(err) => warn!(target = "knugget.reconcile", %origin, error = %err, "failed to read cookies"),
			}
		}
		all
	}
}

#[async_trait]
impl IdentitySource for CookieProbeSource {
	fn kind(&self) -> SourceKind {
		SourceKind::CookieProbe
	}

	async fn probe(&self, ctx: &ProbeContext) -> Probe {
		let found = self.matcher.classify(self.collect().await);
		for candidate in found.bearer {
			if ctx.is_rejected(&candidate.value) {
				continue;
			}
			let user = match self.backend.who_am_i(WhoAmI::Bearer(&candidate.value)).await {
				Ok(Some(user)) => user,
				Ok(None) => continue,
				Err(err) => {
					warn!(target = "knugget.reconcile", cookie = %candidate.name, error = %err, "cookie verification failed");
					continue;
				}
			};
			let payload = UserPayload {
				token: Some(candidate.value.clone()),
				refresh_token: found.refresh.as_ref().map(|c| c.value.clone()).or(user.refresh_token.clone()),
				expires_at: None,
				..user
			};
			let defaults = RecordDefaults {
				now_ms: self.clock.now_ms(),
				lifetime_ms: self.lifetime_ms,
			};
			if let Some(record) = bearer_record(payload, defaults) {
				debug!(target = "knugget.reconcile", cookie = %candidate.name, user_id = %record.user_id, "session found in cookie");
				return Probe::Established(record);
			}
		}
		Probe::Miss
	}
}

/// "Who am I" on the main API with ambient credentials, or on the legacy
/// origin without any.
pub struct RemoteProbeSource {
	kind: SourceKind,
	backend: BackendClient,
	clock: SharedClock,
	lifetime_ms: i64,
}

impl RemoteProbeSource {
	pub fn credentialed(backend: BackendClient, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			kind: SourceKind::CredentialedProbe,
			backend,
			clock,
			lifetime_ms: config.session_lifetime_ms(),
		}
	}

	pub fn legacy(backend: BackendClient, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			kind: SourceKind::LegacyProbe,
			..Self::credentialed(backend, clock, config)
		}
	}
}

#[async_trait]
impl IdentitySource for RemoteProbeSource {
	fn kind(&self) -> SourceKind {
		self.kind
	}

	async fn probe(&self, _ctx: &ProbeContext) -> Probe {
		let who = match self.kind {
			SourceKind::LegacyProbe => WhoAmI::Legacy,
			_ => WhoAmI::Credentialed,
		};
		let user = match self.backend.who_am_i(who).await {
			Ok(Some(user)) => user,
			Ok(None) => return Probe::Miss,
			Err(err) => {
				debug!(target = "knugget.reconcile", source = self.kind.as_str(), error = %err, "identity check unreachable");
				return Probe::Miss;
			}
		};
		let defaults = RecordDefaults {
			now_ms: self.clock.now_ms(),
			lifetime_ms: self.lifetime_ms,
		};
		match cookie_record(user, defaults) {
			Some(record) => Probe::Established(record),
			None => {
				warn!(target = "knugget.reconcile", source = self.kind.as_str(), "identity response has no user id");
				Probe::Miss
			}
		}
	}
}
