//! Runtime configuration for the session layer.
//!
//! Values come from defaults, then `$XDG_CONFIG_HOME/knugget/config.json`
//! (or an explicit path), then the `KNUGGET_API_URL` and
//! `KNUGGET_WEBSITE_URL` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_LEGACY_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WEBSITE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TARGET_TAB_PATTERN: &str = "*://*.youtube.com/*";
pub const DEFAULT_EXTENSION_ID: &str = "knugget-extension";
pub const DEFAULT_HOST_ADDR: &str = "127.0.0.1:7420";
pub const DEFAULT_EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_API_URL: &str = "KNUGGET_API_URL";
pub const ENV_WEBSITE_URL: &str = "KNUGGET_WEBSITE_URL";

const CONFIG_DIR: &str = "knugget";
const CONFIG_FILE: &str = "config.json";
const STORAGE_FILE: &str = "storage.json";
const COOKIE_FILE: &str = "cookies.json";

const DEFAULT_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;
const DEFAULT_SESSION_LIFETIME_MS: i64 = 24 * 60 * 60 * 1000;
const DEFAULT_RECONCILE_INTERVAL_MS: u64 = 60_000;
const DEFAULT_FORCED_WAIT_MS: u64 = 3_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Settings shared by every context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
	api_base_url: String,
	legacy_api_base_url: String,
	website_url: String,
	/// Origins whose cookies are probed; empty means website + API base.
	cookie_origins: Vec<String>,
	target_tab_pattern: String,
	extension_id: String,
	/// Version recorded in the settings and compared on upgrade.
	extension_version: String,
	/// Origins allowed to use the external login bridge; empty means the website.
	trusted_origins: Vec<String>,
	refresh_margin_ms: i64,
	session_lifetime_ms: i64,
	reconcile_interval_ms: u64,
	forced_wait_ms: u64,
	request_timeout_ms: u64,
	storage_path: Option<PathBuf>,
	cookie_file: Option<PathBuf>,
	host_addr: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			api_base_url: DEFAULT_API_BASE_URL.to_string(),
			legacy_api_base_url: DEFAULT_LEGACY_API_BASE_URL.to_string(),
			website_url: DEFAULT_WEBSITE_URL.to_string(),
			cookie_origins: Vec::new(),
			target_tab_pattern: DEFAULT_TARGET_TAB_PATTERN.to_string(),
			extension_id: DEFAULT_EXTENSION_ID.to_string(),
			extension_version: DEFAULT_EXTENSION_VERSION.to_string(),
			trusted_origins: Vec::new(),
			refresh_margin_ms: DEFAULT_REFRESH_MARGIN_MS,
			session_lifetime_ms: DEFAULT_SESSION_LIFETIME_MS,
			reconcile_interval_ms: DEFAULT_RECONCILE_INTERVAL_MS,
			forced_wait_ms: DEFAULT_FORCED_WAIT_MS,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
			storage_path: None,
			cookie_file: None,
			host_addr: DEFAULT_HOST_ADDR.to_string(),
		}
	}
}

impl SyncConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads the config file (if present) and applies environment overrides.
	///
	/// A missing file at the default location yields the defaults; a missing
	/// file at an explicit path is an error.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let config = match path {
			Some(path) => Self::from_file(path)?,
			None => match default_config_path() {
				Some(path) if path.exists() => Self::from_file(&path)?,
				_ => Self::default(),
			},
		};
		config.with_env(|key| std::env::var(key).ok()).validated()
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Applies `KNUGGET_API_URL` / `KNUGGET_WEBSITE_URL` from `lookup`.
	pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
		if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
			self.api_base_url = url;
		}
		if let Some(url) = lookup(ENV_WEBSITE_URL).filter(|v| !v.trim().is_empty()) {
			self.website_url = url;
		}
		self
	}

	/// Checks that every base URL parses.
	pub fn validated(self) -> Result<Self, ConfigError> {
		for (field, value) in [
			("apiBaseUrl", &self.api_base_url),
			("legacyApiBaseUrl", &self.legacy_api_base_url),
			("websiteUrl", &self.website_url),
		] {
			if Url::parse(value).is_err() {
				return Err(ConfigError::InvalidUrl { field, value: value.clone() });
			}
		}
		Ok(self)
	}

	pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
		self.api_base_url = url.into();
		self
	}

	pub fn with_legacy_api_base_url(mut self, url: impl Into<String>) -> Self {
		self.legacy_api_base_url = url.into();
		self
	}

	pub fn with_website_url(mut self, url: impl Into<String>) -> Self {
		self.website_url = url.into();
		self
	}

	pub fn with_cookie_origins(mut self, origins: Vec<String>) -> Self {
		self.cookie_origins = origins;
		self
	}

	pub fn with_target_tab_pattern(mut self, pattern: impl Into<String>) -> Self {
		self.target_tab_pattern = pattern.into();
		self
	}

	pub fn with_extension_id(mut self, id: impl Into<String>) -> Self {
		self.extension_id = id.into();
		self
	}

	pub fn with_extension_version(mut self, version: impl Into<String>) -> Self {
		self.extension_version = version.into();
		self
	}

	pub fn with_trusted_origins(mut self, origins: Vec<String>) -> Self {
		self.trusted_origins = origins;
		self
	}

	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin_ms = margin.as_millis() as i64;
		self
	}

	pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
		self.session_lifetime_ms = lifetime.as_millis() as i64;
		self
	}

	pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
		self.reconcile_interval_ms = interval.as_millis() as u64;
		self
	}

	pub fn with_forced_wait(mut self, wait: Duration) -> Self {
		self.forced_wait_ms = wait.as_millis() as u64;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout_ms = timeout.as_millis() as u64;
		self
	}

	pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.storage_path = Some(path.into());
		self
	}

	pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.cookie_file = Some(path.into());
		self
	}

	pub fn with_host_addr(mut self, addr: impl Into<String>) -> Self {
		self.host_addr = addr.into();
		self
	}

	/// API base without a trailing slash.
	pub fn api_base_url(&self) -> &str {
		self.api_base_url.trim_end_matches('/')
	}

	pub fn legacy_api_base_url(&self) -> &str {
		self.legacy_api_base_url.trim_end_matches('/')
	}

	pub fn website_url(&self) -> &str {
		self.website_url.trim_end_matches('/')
	}

	pub fn cookie_origins(&self) -> Vec<String> {
		if !self.cookie_origins.is_empty() {
			return self.cookie_origins.clone();
		}
		let mut origins = vec![self.website_url().to_string()];
		if let Some(api) = origin_of(self.api_base_url()) {
			if !origins.contains(&api) {
				origins.push(api);
			}
		}
		origins
	}

	pub fn target_tab_pattern(&self) -> &str {
		&self.target_tab_pattern
	}

	pub fn extension_id(&self) -> &str {
		&self.extension_id
	}

	pub fn extension_version(&self) -> &str {
		&self.extension_version
	}

	pub fn trusted_origins(&self) -> Vec<String> {
		if !self.trusted_origins.is_empty() {
			return self.trusted_origins.clone();
		}
		origin_of(self.website_url()).into_iter().collect()
	}

	pub fn refresh_margin_ms(&self) -> i64 {
		self.refresh_margin_ms
	}

	pub fn session_lifetime_ms(&self) -> i64 {
		self.session_lifetime_ms
	}

	pub fn reconcile_interval(&self) -> Duration {
		Duration::from_millis(self.reconcile_interval_ms)
	}

	pub fn forced_wait(&self) -> Duration {
		Duration::from_millis(self.forced_wait_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Session storage file; defaults next to the config file.
	pub fn storage_path(&self) -> Option<PathBuf> {
		self.storage_path
			.clone()
			.or_else(|| config_dir().map(|dir| dir.join(STORAGE_FILE)))
	}

	/// Storage-state file the cookie probe reads.
	pub fn cookie_file(&self) -> Option<PathBuf> {
		self.cookie_file
			.clone()
			.or_else(|| config_dir().map(|dir| dir.join(COOKIE_FILE)))
	}

	pub fn host_addr(&self) -> &str {
		&self.host_addr
	}
}

/// `scheme://host[:port]` of `url`, if it parses.
pub fn origin_of(url: &str) -> Option<String> {
	let parsed = Url::parse(url).ok()?;
	let origin = parsed.origin();
	origin.is_tuple().then(|| origin.ascii_serialization())
}

fn config_dir() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join(CONFIG_DIR))
}

/// `$XDG_CONFIG_HOME/knugget/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
	config_dir().map(|dir| dir.join(CONFIG_FILE))
}
