//! Request and response bodies of the backend's domain endpoints.

use serde::{Deserialize, Serialize};

/// Credentials posted to the sign-in endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
	pub email: String,
	pub password: String,
}

/// Fields posted to the sign-up endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
	pub email: String,
	pub password: String,
	pub name: String,
}

/// A generated or saved summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub title: String,
	#[serde(default)]
	pub key_points: Vec<String>,
	#[serde(default)]
	pub full_summary: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub video_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<String>,
}

/// Metadata of the video a transcript belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
	pub video_id: String,
	pub title: String,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel_name: Option<String>,
	/// Always `youtube` when sent by the panel.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
}

/// Body of the summary generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
	pub content: String,
	pub metadata: VideoMetadata,
}

/// One page of saved summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryPage {
	#[serde(default)]
	pub summaries: Vec<Summary>,
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub page: u32,
	#[serde(default)]
	pub limit: u32,
}

/// Response of the save endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSummary {
	pub id: String,
}
