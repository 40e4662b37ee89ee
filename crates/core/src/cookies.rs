//! Read-only cookie enumeration and auth-cookie heuristics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clock::{SharedClock, system_clock};
use crate::error::StoreError;

/// One cookie as recorded in a storage-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: String,
	#[serde(default = "default_path")]
	pub path: String,
	#[serde(default = "default_expires")]
	pub expires: f64,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
}

fn default_path() -> String {
	"/".to_string()
}

fn default_expires() -> f64 {
	-1.0
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: domain.into(),
			path: default_path(),
			expires: default_expires(),
			http_only: false,
			secure: false,
		}
	}

	/// Whether the cookie would be sent to `host`.
	pub fn applies_to(&self, host: &str) -> bool {
		let domain = self.domain.trim_start_matches('.');
		if domain.is_empty() {
			return false;
		}
		host.eq_ignore_ascii_case(domain) || host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase()))
	}

	fn is_expired(&self, now_secs: f64) -> bool {
		self.expires >= 0.0 && self.expires < now_secs
	}
}

/// Cookie enumeration for one origin.
#[async_trait]
pub trait CookieJar: Send + Sync {
	async fn cookies_for(&self, origin: &str) -> Result<Vec<Cookie>, StoreError>;
}

#[derive(Debug, Default, Deserialize)]
struct StorageStateFile {
	#[serde(default)]
	cookies: Vec<Cookie>,
}

/// Jar backed by a browser storage-state JSON file (`{"cookies": [...]}`).
///
/// A missing file is an empty jar. Expired cookies are dropped against the
/// jar's clock.
#[derive(Clone)]
pub struct StorageStateJar {
	path: PathBuf,
	clock: SharedClock,
}

impl StorageStateJar {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			clock: system_clock(),
		}
	}

	pub fn with_clock(mut self, clock: SharedClock) -> Self {
		self.clock = clock;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn load(&self) -> Result<Vec<Cookie>, StoreError> {
		let raw = match tokio::fs::read_to_string(&self.path).await {
			Ok(raw) => raw,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(source) => {
				return Err(StoreError::Io {
					path: self.path.clone(),
					source,
				});
			}
		};
		let state: StorageStateFile = serde_json::from_str(&raw)?;
		Ok(state.cookies)
	}
}

#[async_trait]
impl CookieJar for StorageStateJar {
	async fn cookies_for(&self, origin: &str) -> Result<Vec<Cookie>, StoreError> {
		let Some(host) = Url::parse(origin).ok().and_then(|u| u.host_str().map(str::to_string)) else {
			return Ok(Vec::new());
		};
		let now_secs = self.clock.now_ms() as f64 / 1000.0;
		Ok(self
			.load()
			.await?
			.into_iter()
			.filter(|c| c.applies_to(&host) && !c.is_expired(now_secs))
			.collect())
	}
}

/// Names accepted regardless of the substring rules.
pub const KNOWN_AUTH_COOKIES: &[&str] = &[
	"session-token",
	"next-auth.session-token",
	"__Secure-next-auth.session-token",
	"sb-access-token",
	"access_token",
	"auth_token",
	"knugget_token",
	"jwt",
	"token",
];

const AUTH_SUBSTRINGS: &[&str] = &["auth", "token", "session"];

/// Decides which cookies may carry a credential.
#[derive(Debug, Clone)]
pub struct CookieMatcher {
	substrings: Vec<String>,
	exact: Vec<String>,
}

impl Default for CookieMatcher {
	fn default() -> Self {
		Self {
			substrings: AUTH_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
			exact: KNOWN_AUTH_COOKIES.iter().map(|s| s.to_string()).collect(),
		}
	}
}

/// Auth cookies split into bearer and refresh candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthCookies {
	pub bearer: Vec<Cookie>,
	pub refresh: Option<Cookie>,
}

impl CookieMatcher {
	pub fn new(substrings: Vec<String>, exact: Vec<String>) -> Self {
		Self { substrings, exact }
	}

	pub fn is_auth_cookie(&self, name: &str) -> bool {
		if self.exact.iter().any(|e| e == name) {
			return true;
		}
		let lower = name.to_ascii_lowercase();
		self.substrings.iter().any(|s| lower.contains(s.as_str()))
	}

	/// Bearer candidates keep allow-list names first, then jar order.
	pub fn classify(&self, cookies: Vec<Cookie>) -> AuthCookies {
		let mut found = AuthCookies::default();
		for cookie in cookies {
			if cookie.value.is_empty() || !self.is_auth_cookie(&cookie.name) {
				continue;
			}
			if cookie.name.to_ascii_lowercase().contains("refresh") {
				found.refresh.get_or_insert(cookie);
			} else {
				found.bearer.push(cookie);
			}
		}
		found.bearer.sort_by_key(|c| !self.exact.iter().any(|e| *e == c.name));
		found
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ManualClock;

	#[test]
	fn matches_substrings_case_insensitively() {
		let matcher = CookieMatcher::default();
		assert!(matcher.is_auth_cookie("MyAUTHCookie"));
		assert!(matcher.is_auth_cookie("SESSION_ID"));
		assert!(matcher.is_auth_cookie("jwt"));
		assert!(!matcher.is_auth_cookie("theme"));
		assert!(!matcher.is_auth_cookie("JWT2"));
	}

	#[test]
	fn classify_separates_refresh_candidates() {
		let found = CookieMatcher::default().classify(vec![
			Cookie::new("csrf_session_hint", "h", "localhost"),
			Cookie::new("refresh_token", "r", "localhost"),
			Cookie::new("theme", "dark", "localhost"),
			Cookie::new("session-token", "s", "localhost"),
			Cookie::new("auth_token", "", "localhost"),
		]);

		let names: Vec<_> = found.bearer.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["session-token", "csrf_session_hint"]);
		assert_eq!(found.refresh.map(|c| c.value), Some("r".to_string()));
	}

	#[test]
	fn domain_matching_includes_subdomains() {
		let cookie = Cookie::new("token", "t", ".knugget.com");
		assert!(cookie.applies_to("knugget.com"));
		assert!(cookie.applies_to("app.knugget.com"));
		assert!(!cookie.applies_to("notknugget.com"));
	}

	#[tokio::test]
	async fn expiry_follows_the_jar_clock() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cookies.json");
		std::fs::write(
			&path,
			r#"{ "cookies": [ { "name": "session-token", "value": "s", "domain": "localhost", "expires": 1700000100 } ] }"#,
		)
		.unwrap();

		let before = StorageStateJar::new(&path).with_clock(ManualClock::shared(1_700_000_000_000));
		assert_eq!(before.cookies_for("http://localhost:8000").await.unwrap().len(), 1);

		let clock = ManualClock::new(1_700_000_000_000);
		let jar = StorageStateJar::new(&path).with_clock(clock.clone());
		clock.advance(std::time::Duration::from_secs(101));
		assert!(jar.cookies_for("http://localhost:8000").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn storage_state_jar_filters_by_origin() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cookies.json");
		std::fs::write(
			&path,
			r#"{
  "cookies": [
    { "name": "session-token", "value": "s", "domain": "localhost", "path": "/", "expires": -1 },
    { "name": "token", "value": "old", "domain": "localhost", "path": "/", "expires": 1 },
    { "name": "other", "value": "x", "domain": ".example.com" }
  ],
  "origins": []
}"#,
		)
		.unwrap();

		let jar = StorageStateJar::new(&path);
		let cookies = jar.cookies_for("http://localhost:8000").await.unwrap();
		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].name, "session-token");

		let missing = StorageStateJar::new(dir.path().join("missing.json"));
		assert!(missing.cookies_for("http://localhost:8000").await.unwrap().is_empty());
	}
}
