//! First-install and upgrade handling.

use knugget_protocol::{ExtensionSettings, SETTINGS_STORAGE_KEY};
use tracing::warn;

use crate::error::StoreError;
use crate::store::SessionStorage;

/// What to show the user after [`crate::Background::installed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallNotice {
	/// Fresh install; the welcome page was opened.
	Welcome { url: String },
	/// Upgrade across a major or minor version.
	WhatsNew { version: String, url: String },
	/// Patch upgrade or reinstall of the same version.
	Quiet,
}

/// `major.minor.patch`, each part read up to its first non-digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
	pub major: u64,
	pub minor: u64,
	pub patch: u64,
}

impl Version {
	pub fn parse(version: &str) -> Self {
		let mut parts = version.split('.').map(|part| {
			let digits: String = part.trim().chars().take_while(char::is_ascii_digit).collect();
			digits.parse().unwrap_or(0)
		});
		Self {
			major: parts.next().unwrap_or(0),
			minor: parts.next().unwrap_or(0),
			patch: parts.next().unwrap_or(0),
		}
	}
}

/// Major and minor bumps get a notice; patches do not.
pub fn is_notable_update(current: &str, previous: &str) -> bool {
	if previous.trim().is_empty() {
		return false;
	}
	let (current, previous) = (Version::parse(current), Version::parse(previous));
	(current.major, current.minor) > (previous.major, previous.minor)
}

/// Stored settings; unreadable settings read as absent.
pub async fn load_settings(storage: &dyn SessionStorage) -> Result<Option<ExtensionSettings>, StoreError> {
	let Some(value) = storage.get(SETTINGS_STORAGE_KEY).await? else {
		return Ok(None);
	};
	match serde_json::from_value(value) {
		Ok(settings) => Ok(Some(settings)),
		Err(err) => {
			warn!(target = "knugget.install", error = %err, "stored settings are unreadable");
			Ok(None)
		}
	}
}

pub async fn save_settings(storage: &dyn SessionStorage, settings: &ExtensionSettings) -> Result<(), StoreError> {
	storage.set(SETTINGS_STORAGE_KEY, serde_json::to_value(settings)?).await
}
