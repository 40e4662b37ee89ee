//! Session-change fan-out from the background process to page agents.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use knugget_protocol::{AuthState, Message, TabId};
use parking_lot::Mutex;
use regex_lite::Regex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use crate::error::LinkError;
use crate::store::SessionNotifier;

const EVENT_CAPACITY: usize = 64;

/// An open tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
	pub id: TabId,
	pub url: String,
}

impl TabInfo {
	pub fn new(id: TabId, url: impl Into<String>) -> Self {
		Self { id, url: url.into() }
	}
}

/// Delivery of messages to tabs.
#[async_trait]
pub trait TabMessenger: Send + Sync {
	async fn send(&self, tab: TabId, message: Message) -> Result<(), LinkError>;
	/// Every open tab, tracked or not.
	async fn tabs(&self) -> Vec<TabInfo>;
	async fn open_tab(&self, url: &str) -> Result<(), LinkError>;
}

/// Browser match pattern such as `*://*.youtube.com/*`, compiled once.
#[derive(Debug, Clone)]
pub struct UrlPattern {
	source: String,
	regex: Regex,
}

impl PartialEq for UrlPattern {
	fn eq(&self, other: &Self) -> bool {
		self.source == other.source
	}
}

impl Eq for UrlPattern {}

impl UrlPattern {
	/// `None` when `pattern` is not `<scheme>://<host><path>`.
	pub fn parse(pattern: &str) -> Option<Self> {
		let (scheme, rest) = pattern.split_once("://")?;
		let (host, path) = match rest.find('/') {
			Some(idx) => rest.split_at(idx),
			None => (rest, "/*"),
		};
		if scheme.is_empty() || host.is_empty() {
			return None;
		}

		let scheme = match scheme.to_ascii_lowercase().as_str() {
			"*" => "https?".to_string(),
			scheme => regex_lite::escape(scheme),
		};
		let host = host.to_ascii_lowercase();
		let host = match host.as_str() {
			"*" => "[^/]*".to_string(),
			host => match host.strip_prefix("*.") {
				Some(domain) => format!(r"(?:[^/]*\.)?{}", regex_lite::escape(domain)),
				None => regex_lite::escape(host),
			},
		};
		let path = path.split('*').map(regex_lite::escape).collect::<Vec<_>>().join(".*");

		let regex = Regex::new(&format!("^{scheme}://{host}{path}$")).ok()?;
		Some(Self {
			source: pattern.to_string(),
			regex,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}

	/// Ports are ignored, as browsers do for match patterns.
	pub fn matches(&self, url: &str) -> bool {
		let Ok(url) = Url::parse(url) else {
			return false;
		};
		let Some(host) = url.host_str() else {
			return false;
		};
		let mut normalized = format!("{}://{}{}", url.scheme(), host.to_ascii_lowercase(), url.path());
		if let Some(query) = url.query() {
			normalized.push('?');
			normalized.push_str(query);
		}
		self.regex.is_match(&normalized)
	}
}

/// Tracks page agents and pushes `SESSION_CHANGED` to them.
pub struct Broadcaster {
	messenger: Arc<dyn TabMessenger>,
	tracked: Mutex<BTreeSet<TabId>>,
	target: Option<UrlPattern>,
	last_state: Mutex<Option<bool>>,
	events: broadcast::Sender<AuthState>,
}

impl Broadcaster {
	pub fn new(messenger: Arc<dyn TabMessenger>, target_pattern: &str) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			messenger,
			tracked: Mutex::new(BTreeSet::new()),
			target: UrlPattern::parse(target_pattern),
			last_state: Mutex::new(None),
			events,
		}
	}

	pub fn messenger(&self) -> &Arc<dyn TabMessenger> {
		&self.messenger
	}

	/// In-process observers of every broadcast.
	pub fn subscribe(&self) -> broadcast::Receiver<AuthState> {
		self.events.subscribe()
	}

	pub fn track(&self, tab: TabId) {
		if self.tracked.lock().insert(tab) {
			debug!(target = "knugget.broadcast", tab, "tracking tab");
		}
	}

	pub fn untrack(&self, tab: TabId) {
		if self.tracked.lock().remove(&tab) {
			debug!(target = "knugget.broadcast", tab, "untracked tab");
		}
	}

	pub fn tracked(&self) -> Vec<TabId> {
		self.tracked.lock().iter().copied().collect()
	}

	/// Pushes `SESSION_CHANGED` to every tracked agent, plus
	/// `FORCE_REFRESH_UI` to target-site tabs on transition to logged in.
	pub async fn broadcast(&self, is_logged_in: bool) {
		let state = AuthState { is_logged_in };
		let _ = self.events.send(state);

		let delivered = self.send_to_tracked(Message::SessionChanged(state)).await;

		let became_logged_in = {
			let mut last = self.last_state.lock();
			let previous = last.replace(is_logged_in);
			is_logged_in && previous != Some(true)
		};
		let refreshed = if became_logged_in { self.refresh_target_tabs().await } else { 0 };

		info!(target = "knugget.broadcast", is_logged_in, delivered, refreshed, "session change broadcast");
	}

	/// Forwards an agent's `AUTH_STATE_CHANGED` to every tracked agent.
	pub async fn relay(&self, state: AuthState) -> usize {
		self.send_to_tracked(Message::AuthStateChanged(state)).await
	}

	async fn send_to_tracked(&self, message: Message) -> usize {
		let tabs = self.tracked();
		let results = join_all(tabs.iter().map(|tab| self.messenger.send(*tab, message.clone()))).await;

		let mut delivered = 0;
		for (tab, result) in tabs.into_iter().zip(results) {
			match result {
				Ok(()) => delivered += 1,
				Err(err) => {
					debug!(target = "knugget.broadcast", tab, error = %err, "delivery failed; untracking");
					self.tracked.lock().remove(&tab);
				}
			}
		}
		delivered
	}

	async fn refresh_target_tabs(&self) -> usize {
		let Some(pattern) = &self.target else {
			return 0;
		};
		let targets: Vec<TabInfo> = self.messenger.tabs().await.into_iter().filter(|t| pattern.matches(&t.url)).collect();
		let results = join_all(targets.iter().map(|t| self.messenger.send(t.id, Message::ForceRefreshUi))).await;
		results.into_iter().filter(Result::is_ok).count()
	}
}

#[async_trait]
impl SessionNotifier for Broadcaster {
	async fn session_changed(&self, is_logged_in: bool) {
		self.broadcast(is_logged_in).await;
	}
}
