//! User-facing extension settings persisted next to the session record.

use serde::{Deserialize, Serialize};

/// Storage key the settings live under.
pub const SETTINGS_STORAGE_KEY: &str = "knuggetSettings";

/// Settings written on first install.
///
/// Unknown keys written by other contexts are kept on rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSettings {
	#[serde(default = "enabled")]
	pub auto_show_transcript: bool,
	#[serde(default = "enabled")]
	pub dark_mode: bool,
	#[serde(default = "enabled")]
	pub analytics_enabled: bool,
	#[serde(default)]
	pub version: String,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

fn enabled() -> bool {
	true
}

impl ExtensionSettings {
	pub fn defaults(version: impl Into<String>) -> Self {
		Self {
			auto_show_transcript: true,
			dark_mode: true,
			analytics_enabled: true,
			version: version.into(),
			extra: serde_json::Map::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn keeps_unknown_keys() {
		let settings: ExtensionSettings = serde_json::from_value(json!({ "darkMode": false, "language": "de" })).unwrap();
		assert!(!settings.dark_mode);
		assert!(settings.auto_show_transcript);
		assert_eq!(settings.version, "");
		assert_eq!(serde_json::to_value(&settings).unwrap()["language"], "de");
	}
}
