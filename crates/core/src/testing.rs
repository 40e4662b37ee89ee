//! In-memory fakes for the capability traits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use knugget_protocol::{Message, SessionKind, SessionRecord, TabId};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

use crate::backend::{HttpReply, HttpRequest, HttpTransport, TransportError};
use crate::broadcast::{TabInfo, TabMessenger};
use crate::clock::{Clock, SharedClock};
use crate::config::DEFAULT_API_BASE_URL;
use crate::cookies::{Cookie, CookieJar};
use crate::error::{LinkError, StoreError};

/// A bearer session for user `u1`.
pub fn bearer_session(token: &str, expires_at: i64) -> SessionRecord {
	SessionRecord {
		user_id: "u1".into(),
		email: "ada@knugget.test".into(),
		name: "Ada".into(),
		access_token: token.into(),
		refresh_token: None,
		expires_at,
		plan: "free".into(),
		credits: 3,
		kind: SessionKind::Bearer,
	}
}

#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
	pub fn new(now_ms: i64) -> Arc<Self> {
		Arc::new(Self(AtomicI64::new(now_ms)))
	}

	pub fn shared(now_ms: i64) -> SharedClock {
		Self::new(now_ms)
	}

	pub fn advance(&self, by: Duration) {
		self.0.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> i64 {
		self.0.load(Ordering::SeqCst)
	}
}

/// Scripted responses for one method and URL.
///
/// Replies are served in order; the last one repeats.
#[derive(Debug, Clone)]
pub struct Route {
	method: Method,
	url: String,
	bearer: Option<String>,
	replies: Vec<Result<HttpReply, TransportError>>,
	delay: Option<Duration>,
}

impl Route {
	/// `url` is absolute or relative to the default API base.
	pub fn new(method: Method, url: &str) -> Self {
		Self {
			method,
			url: resolve(url),
			bearer: None,
			replies: Vec::new(),
			delay: None,
		}
	}

	pub fn get(url: &str) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: &str) -> Self {
		Self::new(Method::POST, url)
	}

	pub fn delete(url: &str) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Matches only requests carrying this bearer token.
	pub fn when_bearer(mut self, token: &str) -> Self {
		self.bearer = Some(token.to_string());
		self
	}

	pub fn status(mut self, status: u16) -> Self {
		self.replies.push(Ok(HttpReply::new(status, None)));
		self
	}

	pub fn json(mut self, status: u16, body: Value) -> Self {
		self.replies.push(Ok(HttpReply::new(status, Some(body))));
		self
	}

	pub fn fail(mut self, err: TransportError) -> Self {
		self.replies.push(Err(err));
		self
	}

	pub fn delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	fn matches(&self, request: &HttpRequest) -> bool {
		self.method == request.method
			&& self.url == request.url
			&& self.bearer.as_ref().is_none_or(|b| request.bearer.as_ref() == Some(b))
	}
}

fn resolve(url: &str) -> String {
	if url.starts_with("http://") || url.starts_with("https://") {
		url.to_string()
	} else {
		format!("{DEFAULT_API_BASE_URL}{url}")
	}
}

struct RouteState {
	route: Route,
	served: usize,
}

/// Records every request and answers from scripted [`Route`]s; anything
/// unscripted gets a bodiless 404.
#[derive(Default)]
pub struct FakeTransport {
	routes: Mutex<Vec<RouteState>>,
	requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn route(&self, route: Route) {
		self.routes.lock().push(RouteState { route, served: 0 });
	}

	pub fn requests(&self) -> Vec<HttpRequest> {
		self.requests.lock().clone()
	}

	/// Requests sent to `url`, any method.
	pub fn hits(&self, url: &str) -> usize {
		let url = resolve(url);
		self.requests.lock().iter().filter(|r| r.url == url).count()
	}
}

#[async_trait]
impl HttpTransport for FakeTransport {
	async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
		self.requests.lock().push(request.clone());
		let scripted = {
			let mut routes = self.routes.lock();
			routes.iter_mut().find(|s| s.route.matches(&request)).map(|state| {
				let idx = state.served.min(state.route.replies.len().saturating_sub(1));
				state.served += 1;
				let reply = state
					.route
					.replies
					.get(idx)
					.cloned()
					.unwrap_or_else(|| Ok(HttpReply::new(200, None)));
				(reply, state.route.delay)
			})
		};
		let Some((reply, delay)) = scripted else {
			return Ok(HttpReply::new(404, None));
		};
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		reply
	}
}

/// Fixed cookies per origin.
#[derive(Debug, Clone, Default)]
pub struct StaticCookieJar {
	cookies: HashMap<String, Vec<Cookie>>,
}

impl StaticCookieJar {
	pub fn with(mut self, origin: &str, name: &str, value: &str) -> Self {
		let domain = url::Url::parse(origin)
			.ok()
			.and_then(|u| u.host_str().map(str::to_string))
			.unwrap_or_default();
		self.cookies
			.entry(origin.to_string())
			.or_default()
			.push(Cookie::new(name, value, domain));
		self
	}
}

#[async_trait]
impl CookieJar for StaticCookieJar {
	async fn cookies_for(&self, origin: &str) -> Result<Vec<Cookie>, StoreError> {
		Ok(self.cookies.get(origin).cloned().unwrap_or_default())
	}
}

/// Records messages per tab; tabs marked failing reject delivery.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
	sent: Mutex<Vec<(TabId, Message)>>,
	open: Mutex<Vec<TabInfo>>,
	failing: Mutex<HashSet<TabId>>,
	opened_urls: Mutex<Vec<String>>,
}

impl RecordingMessenger {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn open(&self, id: TabId, url: &str) {
		self.open.lock().push(TabInfo::new(id, url));
	}

	pub fn fail_tab(&self, id: TabId) {
		self.failing.lock().insert(id);
	}

	pub fn sent_to(&self, id: TabId) -> Vec<Message> {
		self.sent
			.lock()
			.iter()
			.filter(|(tab, _)| *tab == id)
			.map(|(_, m)| m.clone())
			.collect()
	}

	pub fn opened_urls(&self) -> Vec<String> {
		self.opened_urls.lock().clone()
	}
}

#[async_trait]
impl TabMessenger for RecordingMessenger {
	async fn send(&self, tab: TabId, message: Message) -> Result<(), LinkError> {
		if self.failing.lock().contains(&tab) {
			return Err(LinkError::Disconnected);
		}
		self.sent.lock().push((tab, message));
		Ok(())
	}

	async fn tabs(&self) -> Vec<TabInfo> {
		self.open.lock().clone()
	}

	async fn open_tab(&self, url: &str) -> Result<(), LinkError> {
		self.opened_urls.lock().push(url.to_string());
		Ok(())
	}
}
