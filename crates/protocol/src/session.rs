//! Persisted session record and the backend's user payload shape.

use serde::{Deserialize, Serialize};

/// Storage key the session record lives under.
pub const SESSION_STORAGE_KEY: &str = "knuggetUserInfo";

/// Token stored for sessions established through ambient cookies.
///
/// Never sent as a bearer credential.
pub const PLACEHOLDER_TOKEN: &str = "cookie-session";

/// Entitlement tier assumed when the backend does not report one.
pub const DEFAULT_PLAN: &str = "free";

/// How the stored session proves its identity to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
	/// `accessToken` is a real bearer credential.
	#[default]
	Bearer,
	/// Authenticated through cookies the extension cannot read directly.
	Cookie,
}

/// The single persisted session entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
	#[serde(alias = "id")]
	pub user_id: String,
	#[serde(default)]
	pub email: String,
	#[serde(default)]
	pub name: String,
	#[serde(alias = "token")]
	pub access_token: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	/// Absolute expiry of `access_token` in epoch milliseconds.
	pub expires_at: i64,
	#[serde(default = "default_plan")]
	pub plan: String,
	#[serde(default)]
	pub credits: i64,
	#[serde(default)]
	pub kind: SessionKind,
}

fn default_plan() -> String {
	DEFAULT_PLAN.to_string()
}

impl SessionRecord {
	/// Returns true when the token expires at or before `now_ms + margin_ms`.
	pub fn expires_within(&self, now_ms: i64, margin_ms: i64) -> bool {
		self.expires_at <= now_ms.saturating_add(margin_ms)
	}

	pub fn is_cookie_session(&self) -> bool {
		self.kind == SessionKind::Cookie
	}

	/// Bearer credential to attach to requests, if this session has one.
	pub fn bearer_token(&self) -> Option<&str> {
		match self.kind {
			SessionKind::Bearer if !self.access_token.is_empty() => Some(&self.access_token),
			_ => None,
		}
	}

	/// Display-safe view handed to the website.
	pub fn public_user(&self) -> PublicUser {
		PublicUser {
			id: self.user_id.clone(),
			email: self.email.clone(),
			name: self.name.clone(),
			plan: self.plan.clone(),
			credits: self.credits,
		}
	}
}

/// User fields safe to expose outside the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
	pub id: String,
	pub email: String,
	pub name: String,
	pub plan: String,
	pub credits: i64,
}

/// Loose user/token payload returned by sign-in, sign-up, refresh and
/// "who am I", and pushed by the website through the login bridge.
///
/// Every field is optional; payloads may nest the user under `user`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
	#[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, alias = "accessToken", skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub plan: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credits: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<Box<UserPayload>>,
}

impl UserPayload {
	/// Merges a nested `user` object into the top level. Top-level fields win.
	pub fn flattened(mut self) -> Self {
		let Some(nested) = self.user.take() else {
			return self;
		};
		let nested = nested.flattened();
		Self {
			id: non_empty(self.id).or(non_empty(nested.id)),
			email: self.email.or(nested.email),
			name: self.name.or(nested.name),
			token: non_empty(self.token).or(non_empty(nested.token)),
			refresh_token: self.refresh_token.or(nested.refresh_token),
			expires_at: self.expires_at.or(nested.expires_at),
			plan: self.plan.or(nested.plan),
			credits: self.credits.or(nested.credits),
			user: None,
		}
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn record_accepts_legacy_field_names() {
		let record: SessionRecord = serde_json::from_value(json!({
			"id": "u1",
			"email": "a@example.com",
			"name": "Ada",
			"token": "t",
			"expiresAt": 1_700_000_000_000_i64,
			"plan": "pro",
			"credits": 3
		}))
		.unwrap();

		assert_eq!(record.user_id, "u1");
		assert_eq!(record.access_token, "t");
		assert_eq!(record.kind, SessionKind::Bearer);
		assert_eq!(record.refresh_token, None);
	}

	#[test]
	fn record_defaults_plan_and_credits() {
		let record: SessionRecord = serde_json::from_value(json!({
			"userId": "u1",
			"accessToken": "t",
			"expiresAt": 5
		}))
		.unwrap();

		assert_eq!(record.plan, DEFAULT_PLAN);
		assert_eq!(record.credits, 0);
		assert!(record.email.is_empty());
	}

	#[test]
	fn record_serializes_camel_case() {
		let record = SessionRecord {
			user_id: "u1".into(),
			email: String::new(),
			name: String::new(),
			access_token: "t".into(),
			refresh_token: Some("r".into()),
			expires_at: 10,
			plan: "free".into(),
			credits: 0,
			kind: SessionKind::Cookie,
		};
		let value = serde_json::to_value(&record).unwrap();
		assert_eq!(value["userId"], "u1");
		assert_eq!(value["refreshToken"], "r");
		assert_eq!(value["kind"], "cookie");
	}

	#[test]
	fn expiry_margin_is_inclusive() {
		let record: SessionRecord = serde_json::from_value(json!({
			"userId": "u1",
			"accessToken": "t",
			"expiresAt": 1_000
		}))
		.unwrap();

		assert!(record.expires_within(700, 300));
		assert!(!record.expires_within(699, 300));
	}

	#[test]
	fn cookie_sessions_have_no_bearer() {
		let mut record: SessionRecord = serde_json::from_value(json!({
			"userId": "u1",
			"accessToken": PLACEHOLDER_TOKEN,
			"expiresAt": 1
		}))
		.unwrap();
		assert_eq!(record.bearer_token(), Some(PLACEHOLDER_TOKEN));

		record.kind = SessionKind::Cookie;
		assert_eq!(record.bearer_token(), None);
	}

	#[test]
	fn flattened_prefers_top_level_fields() {
		let payload: UserPayload = serde_json::from_value(json!({
			"token": "t",
			"name": "Top",
			"user": { "id": "u1", "name": "Nested", "email": "n@example.com", "credits": 7 }
		}))
		.unwrap();

		let flat = payload.flattened();
		assert_eq!(flat.id.as_deref(), Some("u1"));
		assert_eq!(flat.name.as_deref(), Some("Top"));
		assert_eq!(flat.email.as_deref(), Some("n@example.com"));
		assert_eq!(flat.credits, Some(7));
		assert_eq!(flat.token.as_deref(), Some("t"));
		assert!(flat.user.is_none());
	}

	#[test]
	fn flattened_ignores_empty_top_level_id() {
		let payload: UserPayload = serde_json::from_value(json!({
			"id": "",
			"user": { "id": "u2" }
		}))
		.unwrap();
		assert_eq!(payload.flattened().id.as_deref(), Some("u2"));
	}
}
