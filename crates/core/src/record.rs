//! Building and merging session records from backend payloads.

use knugget_protocol::{DEFAULT_PLAN, PLACEHOLDER_TOKEN, SessionKind, SessionRecord, UserPayload};

/// Defaults applied to fields a payload leaves out.
#[derive(Debug, Clone, Copy)]
pub struct RecordDefaults {
	pub now_ms: i64,
	pub lifetime_ms: i64,
}

impl RecordDefaults {
	fn expires_at(&self) -> i64 {
		self.now_ms.saturating_add(self.lifetime_ms)
	}
}

/// Builds a bearer record. Requires a user id and a token.
pub fn bearer_record(payload: UserPayload, defaults: RecordDefaults) -> Option<SessionRecord> {
	let payload = payload.flattened();
	let user_id = payload.id.filter(|id| !id.is_empty())?;
	let access_token = payload.token.filter(|t| !t.is_empty())?;
	Some(SessionRecord {
		user_id,
		email: payload.email.unwrap_or_default(),
		name: payload.name.unwrap_or_default(),
		access_token,
		refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
		expires_at: payload.expires_at.unwrap_or_else(|| defaults.expires_at()),
		plan: payload.plan.unwrap_or_else(|| DEFAULT_PLAN.to_string()),
		credits: payload.credits.unwrap_or(0),
		kind: SessionKind::Bearer,
	})
}

/// Builds a record for a session proven only through ambient cookies.
///
/// Any token in the payload is ignored; the placeholder is stored instead.
pub fn cookie_record(payload: UserPayload, defaults: RecordDefaults) -> Option<SessionRecord> {
	let payload = payload.flattened();
	let user_id = payload.id.filter(|id| !id.is_empty())?;
	Some(SessionRecord {
		user_id,
		email: payload.email.unwrap_or_default(),
		name: payload.name.unwrap_or_default(),
		access_token: PLACEHOLDER_TOKEN.to_string(),
		refresh_token: None,
		expires_at: defaults.expires_at(),
		plan: payload.plan.unwrap_or_else(|| DEFAULT_PLAN.to_string()),
		credits: payload.credits.unwrap_or(0),
		kind: SessionKind::Cookie,
	})
}

/// Applies a refresh response to `current`. Fields absent from the response
/// keep their current values. The expiry becomes the response's or
/// `now + lifetime`, but never moves backwards.
pub fn merge_refresh(current: &SessionRecord, payload: UserPayload, defaults: RecordDefaults) -> Option<SessionRecord> {
	let payload = payload.flattened();
	let access_token = payload.token.filter(|t| !t.is_empty())?;
	Some(SessionRecord {
		user_id: payload.id.filter(|id| !id.is_empty()).unwrap_or_else(|| current.user_id.clone()),
		email: payload.email.unwrap_or_else(|| current.email.clone()),
		name: payload.name.unwrap_or_else(|| current.name.clone()),
		access_token,
		refresh_token: payload.refresh_token.or_else(|| current.refresh_token.clone()),
		expires_at: payload.expires_at.unwrap_or_else(|| defaults.expires_at()).max(current.expires_at),
		plan: payload.plan.unwrap_or_else(|| current.plan.clone()),
		credits: payload.credits.unwrap_or(current.credits),
		kind: SessionKind::Bearer,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	const DEFAULTS: RecordDefaults = RecordDefaults {
		now_ms: 1_000,
		lifetime_ms: 86_400_000,
	};

	fn payload(value: serde_json::Value) -> UserPayload {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn bearer_record_fills_defaults() {
		let record = bearer_record(payload(json!({ "token": "t", "user": { "id": "u1" } })), DEFAULTS).unwrap();
		assert_eq!(record.user_id, "u1");
		assert_eq!(record.access_token, "t");
		assert_eq!(record.expires_at, 86_401_000);
		assert_eq!(record.plan, "free");
		assert_eq!(record.credits, 0);
		assert_eq!(record.name, "");
	}

	#[test]
	fn bearer_record_requires_id_and_token() {
		assert!(bearer_record(payload(json!({ "token": "t" })), DEFAULTS).is_none());
		assert!(bearer_record(payload(json!({ "id": "u1", "token": "" })), DEFAULTS).is_none());
	}

	#[test]
	fn cookie_record_uses_placeholder() {
		let record = cookie_record(payload(json!({ "id": "u1", "token": "leaked", "plan": "pro" })), DEFAULTS).unwrap();
		assert_eq!(record.access_token, PLACEHOLDER_TOKEN);
		assert_eq!(record.kind, SessionKind::Cookie);
		assert_eq!(record.plan, "pro");
		assert!(record.bearer_token().is_none());
	}

	#[test]
	fn merge_preserves_absent_fields() {
		let current = bearer_record(
			payload(json!({ "id": "u1", "email": "a@b.c", "name": "Ada", "token": "old", "refreshToken": "r", "credits": 5, "plan": "pro", "expiresAt": 10 })),
			DEFAULTS,
		)
		.unwrap();

		let merged = merge_refresh(&current, payload(json!({ "token": "new" })), DEFAULTS).unwrap();
		assert_eq!(merged.access_token, "new");
		assert_eq!(merged.email, "a@b.c");
		assert_eq!(merged.refresh_token.as_deref(), Some("r"));
		assert_eq!(merged.credits, 5);
		assert_eq!(merged.plan, "pro");
		assert_eq!(merged.expires_at, 86_401_000);

		assert!(merge_refresh(&current, payload(json!({ "email": "x" })), DEFAULTS).is_none());
	}

	#[test]
	fn merge_never_moves_expiry_backwards() {
		let current = bearer_record(payload(json!({ "id": "u1", "token": "old", "expiresAt": 5_000_000 })), DEFAULTS).unwrap();

		let earlier = merge_refresh(&current, payload(json!({ "token": "new", "expiresAt": 4_000_000 })), DEFAULTS).unwrap();
		assert_eq!(earlier.expires_at, 5_000_000);

		let later = merge_refresh(&current, payload(json!({ "token": "new", "expiresAt": 9_000_000 })), DEFAULTS).unwrap();
		assert_eq!(later.expires_at, 9_000_000);
	}
}
