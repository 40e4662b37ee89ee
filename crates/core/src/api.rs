//! Domain calls on top of the authenticated request wrapper.

use knugget_protocol::{SavedSummary, SessionRecord, SignInRequest, SignUpRequest, Summary, SummaryPage, SummaryRequest, UserPayload, VideoMetadata};
use reqwest::Method;
use serde_json::json;
use tracing::info;

use crate::backend::{decode_user, endpoints};
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::record::{RecordDefaults, bearer_record};
use crate::request::{AuthenticatedClient, DEFAULT_RETRIES};

const SUMMARY_SOURCE: &str = "youtube";
const EMPTY_SUMMARY: &str = "No summary available.";

#[derive(Clone)]
pub struct KnuggetApi {
	client: AuthenticatedClient,
	clock: SharedClock,
	lifetime_ms: i64,
}

impl KnuggetApi {
	pub fn new(client: AuthenticatedClient, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			client,
			clock,
			lifetime_ms: config.session_lifetime_ms(),
		}
	}

	pub fn client(&self) -> &AuthenticatedClient {
		&self.client
	}

	pub async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, ApiError> {
		let body = SignInRequest {
			email: email.to_string(),
			password: password.to_string(),
		};
		self.sign_in_with(endpoints::SIGN_IN, json!(body)).await
	}

	pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<SessionRecord, ApiError> {
		let body = SignUpRequest {
			email: email.to_string(),
			password: password.to_string(),
			name: name.to_string(),
		};
		self.sign_in_with(endpoints::SIGN_UP, json!(body)).await
	}

	async fn sign_in_with(&self, endpoint: &str, body: serde_json::Value) -> Result<SessionRecord, ApiError> {
		let response = self
			.client
			.authenticated_request(endpoint, Method::POST, Some(body), false, DEFAULT_RETRIES)
			.await?;
		let payload = decode_user(response.data).map_err(|e| ApiError::Decode(e.to_string()))?;
		let defaults = RecordDefaults {
			now_ms: self.clock.now_ms(),
			lifetime_ms: self.lifetime_ms,
		};
		let record = bearer_record(payload, defaults).ok_or_else(|| ApiError::Decode("response carries no user id or token".to_string()))?;
		self.client.access().authority().establish(record.clone()).await?;
		info!(target = "knugget.api", user_id = %record.user_id, %endpoint, "signed in");
		Ok(record)
	}

	pub async fn logout(&self) -> Result<(), ApiError> {
		self.client.access().authority().logout().await
	}

	pub async fn profile(&self) -> Result<UserPayload, ApiError> {
		let response = self.client.get(endpoints::ME).await?;
		decode_user(response.data).map_err(|e| ApiError::Decode(e.to_string()))
	}

	/// Summarizes a transcript. Missing fields fall back to the video title
	/// and a placeholder text.
	pub async fn generate_summary(&self, content: &str, metadata: VideoMetadata) -> Result<Summary, ApiError> {
		let video_title = metadata.title.clone();
		let request = SummaryRequest {
			content: content.to_string(),
			metadata: VideoMetadata {
				source: Some(SUMMARY_SOURCE.to_string()),
				..metadata
			},
		};
		let mut summary: Summary = self.client.post(endpoints::SUMMARY_GENERATE, json!(request)).await?.decode()?;
		if summary.title.is_empty() {
			summary.title = video_title;
		}
		if summary.full_summary.is_empty() {
			summary.full_summary = EMPTY_SUMMARY.to_string();
		}
		Ok(summary)
	}

	pub async fn save_summary(&self, summary: &Summary) -> Result<SavedSummary, ApiError> {
		self.client.post(endpoints::SUMMARY_SAVE, json!(summary)).await?.decode()
	}

	pub async fn list_summaries(&self, page: u32, limit: u32) -> Result<SummaryPage, ApiError> {
		self.client.get(&endpoints::summaries_page(page, limit)).await?.decode()
	}

	pub async fn get_summary(&self, id: &str) -> Result<Summary, ApiError> {
		self.client.get(&endpoints::summary(id)).await?.decode()
	}

	pub async fn delete_summary(&self, id: &str) -> Result<(), ApiError> {
		self.client.delete(&endpoints::summary(id)).await?;
		Ok(())
	}
}
