//! The background process: owns the session and routes inter-context
//! messages.

use std::sync::Arc;

use async_trait::async_trait;
use knugget_protocol::{ExtensionSettings, Message, MessageSender, PageRef, Reply, SessionRecord, TabId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::KnuggetApi;
use crate::backend::{BackendClient, HttpTransport};
use crate::bridge::{LoginBridge, UNHANDLED};
use crate::broadcast::{Broadcaster, TabMessenger};
use crate::clock::{SharedClock, system_clock};
use crate::config::SyncConfig;
use crate::cookies::CookieJar;
use crate::error::{ApiError, RefreshError, StoreError};
use crate::identity::ProbeContext;
use crate::install::{self, InstallNotice};
use crate::reconcile::Reconciler;
use crate::refresh::RefreshCoordinator;
use crate::request::{AuthenticatedClient, SessionAccess, SessionAuthority};
use crate::store::{SessionStorage, SessionStore};

/// Capabilities the background process runs on.
pub struct BackgroundDeps {
	pub config: SyncConfig,
	pub storage: Arc<dyn SessionStorage>,
	pub transport: Arc<dyn HttpTransport>,
	pub cookies: Arc<dyn CookieJar>,
	pub messenger: Arc<dyn TabMessenger>,
	pub clock: SharedClock,
}

impl BackgroundDeps {
	pub fn new(
		config: SyncConfig,
		storage: Arc<dyn SessionStorage>,
		transport: Arc<dyn HttpTransport>,
		cookies: Arc<dyn CookieJar>,
		messenger: Arc<dyn TabMessenger>,
	) -> Self {
		Self {
			config,
			storage,
			transport,
			cookies,
			messenger,
			clock: system_clock(),
		}
	}

	pub fn with_clock(mut self, clock: SharedClock) -> Self {
		self.clock = clock;
		self
	}
}

pub struct Background {
	config: SyncConfig,
	clock: SharedClock,
	store: SessionStore,
	backend: BackendClient,
	coordinator: RefreshCoordinator,
	reconciler: Reconciler,
	broadcaster: Arc<Broadcaster>,
	bridge: LoginBridge,
}

impl Background {
	pub fn new(deps: BackgroundDeps) -> Arc<Self> {
		let BackgroundDeps {
			config,
			storage,
			transport,
			cookies,
			messenger,
			clock,
		} = deps;

		let broadcaster = Arc::new(Broadcaster::new(messenger, config.target_tab_pattern()));
		let store = SessionStore::new(storage).with_notifier(broadcaster.clone());
		let backend = BackendClient::new(transport, &config);
		let coordinator = RefreshCoordinator::new(backend.clone(), store.clone(), clock.clone(), &config);
		let reconciler = Reconciler::standard(store.clone(), coordinator.clone(), cookies, backend.clone(), clock.clone(), &config);
		let bridge = LoginBridge::new(store.clone(), clock.clone(), &config);

		Arc::new(Self {
			config,
			clock,
			store,
			backend,
			coordinator,
			reconciler,
			broadcaster,
			bridge,
		})
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	pub fn store(&self) -> &SessionStore {
		&self.store
	}

	pub fn broadcaster(&self) -> &Arc<Broadcaster> {
		&self.broadcaster
	}

	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	pub fn reconciler(&self) -> &Reconciler {
		&self.reconciler
	}

	/// Wrapper whose session authority is this process.
	pub fn client(self: &Arc<Self>) -> AuthenticatedClient {
		let access = SessionAccess::new(self.clone(), self.clock.clone(), &self.config);
		AuthenticatedClient::new(self.backend.clone(), access)
	}

	pub fn api(self: &Arc<Self>) -> KnuggetApi {
		KnuggetApi::new(self.client(), self.clock.clone(), &self.config)
	}

	/// First reconciliation after start.
	pub async fn startup(&self) -> bool {
		let found = self.reconciler.reconcile().await;
		info!(target = "knugget.background", logged_in = found, "startup reconciliation finished");
		found
	}

	/// Reconciles every interval until `shutdown` flips to true. Ticks that
	/// land while a pass is running are skipped.
	pub fn spawn_reconcile_loop(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
		let this = self.clone();
		let period = self.config.reconcile_interval();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				tokio::select! {
					_ = ticker.tick() => {
						let pass = this.clone();
						tokio::spawn(async move {
							if let Some(found) = pass.reconciler.reconcile_if_idle().await {
								debug!(target = "knugget.background", logged_in = found, "periodic reconciliation finished");
							}
						});
					}
					changed = shutdown.changed() => {
						if changed.is_err() || *shutdown.borrow() {
							debug!(target = "knugget.background", "reconcile loop stopped");
							break;
						}
					}
				}
			}
		})
	}

	/// Handles a message from a page agent (or a local operator).
	pub async fn handle_message(&self, message: Message, sender: &MessageSender) -> Reply {
		debug!(target = "knugget.background", kind = message.kind(), tab = ?sender.tab_id, "message");
		match message {
			Message::PageLoaded => match sender.tab_id {
				Some(tab) => {
					self.broadcaster.track(tab);
					Reply::ok()
				}
				None => Reply::failure("PAGE_LOADED must come from a tab"),
			},
			Message::TabClosed { tab_id } => {
				self.tab_removed(tab_id);
				Reply::ok()
			}
			Message::ForceCheckWebsiteLogin(check) => {
				let ctx = ProbeContext::rejecting(check.and_then(|c| c.rejected_token));
				Reply::logged_in(self.reconciler.reconcile_with(&ctx).await)
			}
			Message::RefreshSession => match self.coordinator.refresh_stored().await {
				Ok(record) => Reply::ok().with_session(Some(record)),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::GetSession => match self.store.get().await {
				Ok(record) => Reply::ok().with_session(record),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::StoreSession(record) => match self.store.set(&record).await {
				Ok(()) => Reply::ok(),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::Logout => match self.store.clear().await {
				Ok(()) => Reply::ok(),
				Err(err) => Reply::failure(err.to_string()),
			},
			Message::AuthStateChanged(state) => {
				self.broadcaster.relay(state).await;
				Reply::ok()
			}
			Message::OpenLoginPage => self.open_page("/auth/login", &[("extensionId", self.config.extension_id())]).await,
			Message::OpenSignupPage(page) => {
				let referrer = page_url(page);
				self.open_page("/auth/signup", &[("extensionId", self.config.extension_id()), ("referrer", referrer.as_str())]).await
			}
			Message::OpenSavedSummariesPage => self.open_page("/summaries", &[]).await,
			Message::OpenSettings => self.open_page("/settings", &[]).await,
			Message::OpenFeedback(page) => {
				let url = page_url(page);
				self.open_page("/feedback", &[("url", url.as_str())]).await
			}
			other => {
				warn!(target = "knugget.background", kind = other.kind(), "unexpected message from agent");
				Reply::failure(UNHANDLED)
			}
		}
	}

	/// Handles a message sent by a web page.
	pub async fn handle_external(&self, message: Message, sender: &MessageSender) -> Reply {
		self.bridge.handle(message, sender).await
	}

	pub fn tab_removed(&self, tab: TabId) {
		self.broadcaster.untrack(tab);
	}

	/// `{website}{path}?source=extension&...`.
	pub fn website_page(&self, path: &str, params: &[(&str, &str)]) -> Option<String> {
		let mut tagged = vec![("source", "extension")];
		tagged.extend_from_slice(params);
		self.website_url(path, &tagged)
	}

	fn website_url(&self, path: &str, params: &[(&str, &str)]) -> Option<String> {
		let mut url = Url::parse(&format!("{}{}", self.config.website_url(), path)).ok()?;
		if !params.is_empty() {
			let mut query = url.query_pairs_mut();
			for (key, value) in params {
				query.append_pair(key, value);
			}
		}
		Some(url.into())
	}

	pub async fn settings(&self) -> Result<Option<ExtensionSettings>, StoreError> {
		install::load_settings(self.store.storage().as_ref()).await
	}

	/// Runs [`Self::installed`] when the stored settings carry a different
	/// version than the running one. Missing settings count as a fresh install.
	pub async fn check_installation(&self) -> Result<InstallNotice, StoreError> {
		let previous = self.settings().await?.map(|s| s.version);
		if previous.as_deref() == Some(self.config.extension_version()) {
			return Ok(InstallNotice::Quiet);
		}
		self.installed(previous.as_deref()).await
	}

	/// Install or upgrade hook. `previous_version` is `None` on a fresh
	/// install: default settings are written and the welcome page opens.
	/// On upgrade the stored settings (if any) take the current version.
	pub async fn installed(&self, previous_version: Option<&str>) -> Result<InstallNotice, StoreError> {
		let current = self.config.extension_version();
		let storage = self.store.storage().as_ref();

		let Some(previous) = previous_version else {
			install::save_settings(storage, &ExtensionSettings::defaults(current)).await?;
			let Some(url) = self.website_page("/welcome", &[]) else {
				return Ok(InstallNotice::Quiet);
			};
			if let Err(err) = self.broadcaster.messenger().open_tab(&url).await {
				warn!(target = "knugget.background", error = %err, "failed to open welcome page");
			}
			info!(target = "knugget.background", version = current, "installed");
			return Ok(InstallNotice::Welcome { url });
		};

		if let Some(mut settings) = install::load_settings(storage).await? {
			settings.version = current.to_string();
			install::save_settings(storage, &settings).await?;
		}
		info!(target = "knugget.background", from = previous, to = current, "updated");

		if !install::is_notable_update(current, previous) {
			return Ok(InstallNotice::Quiet);
		}
		Ok(match self.website_url("/whats-new", &[("version", current)]) {
			Some(url) => InstallNotice::WhatsNew {
				version: current.to_string(),
				url,
			},
			None => InstallNotice::Quiet,
		})
	}

	async fn open_page(&self, path: &str, params: &[(&str, &str)]) -> Reply {
		let Some(url) = self.website_page(path, params) else {
			return Reply::failure(format!("invalid website URL for {path}"));
		};
		match self.broadcaster.messenger().open_tab(&url).await {
			Ok(()) => Reply::ok(),
			Err(err) => Reply::failure(err.to_string()),
		}
	}
}

fn page_url(page: Option<PageRef>) -> String {
	page.and_then(|p| p.url).unwrap_or_default()
}

#[async_trait]
impl SessionAuthority for Background {
	async fn current(&self) -> Result<Option<SessionRecord>, ApiError> {
		Ok(self.store.get().await?)
	}

	async fn refresh(&self, current: &SessionRecord) -> Result<SessionRecord, RefreshError> {
		self.coordinator.refresh(current).await
	}

	async fn reconcile(&self, rejected_token: Option<String>) -> Result<bool, ApiError> {
		Ok(self.reconciler.reconcile_with(&ProbeContext::rejecting(rejected_token)).await)
	}

	async fn establish(&self, record: SessionRecord) -> Result<(), ApiError> {
		Ok(self.store.set(&record).await?)
	}

	async fn logout(&self) -> Result<(), ApiError> {
		Ok(self.store.clear().await?)
	}
}
