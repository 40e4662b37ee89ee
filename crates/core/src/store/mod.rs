//! Durable session record storage.
//!
//! [`SessionStorage`] is the shared key-value medium every context can read
//! and write. [`SessionStore`] keeps the single [`SessionRecord`] under
//! [`SESSION_STORAGE_KEY`] and notifies after each committed write.

use std::sync::Arc;

use async_trait::async_trait;
use knugget_protocol::{SESSION_STORAGE_KEY, SessionRecord};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Key-value medium shared by all contexts.
#[async_trait]
pub trait SessionStorage: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
	async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
	async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Receives a call after every committed `set` or `clear`.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
	async fn session_changed(&self, is_logged_in: bool);
}

/// The session record on top of a [`SessionStorage`].
#[derive(Clone)]
pub struct SessionStore {
	storage: Arc<dyn SessionStorage>,
	notifier: Option<Arc<dyn SessionNotifier>>,
}

impl SessionStore {
	pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
		Self { storage, notifier: None }
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
		self.notifier = Some(notifier);
		self
	}

	pub fn storage(&self) -> &Arc<dyn SessionStorage> {
		&self.storage
	}

	/// Current record, or `None` when logged out.
	///
	/// A record that fails to decode or lacks a user id or token reads as
	/// logged out.
	pub async fn get(&self) -> Result<Option<SessionRecord>, StoreError> {
		let Some(value) = self.storage.get(SESSION_STORAGE_KEY).await? else {
			return Ok(None);
		};
		match serde_json::from_value::<SessionRecord>(value) {
			Ok(record) if record.user_id.is_empty() || record.access_token.is_empty() => {
				warn!(target = "knugget.store", "stored session is missing user id or token");
				Ok(None)
			}
			Ok(record) => Ok(Some(record)),
			Err(err) => {
				warn!(target = "knugget.store", error = %err, "stored session is unreadable");
				Ok(None)
			}
		}
	}

	/// Overwrites the record, then notifies.
	pub async fn set(&self, record: &SessionRecord) -> Result<(), StoreError> {
		let value = serde_json::to_value(record)?;
		self.storage.set(SESSION_STORAGE_KEY, value).await?;
		debug!(
			target = "knugget.store",
			user_id = %record.user_id,
			kind = ?record.kind,
			expires_at = record.expires_at,
			token_len = record.access_token.len(),
			"session stored"
		);
		self.notify(true).await;
		Ok(())
	}

	/// Removes the record, then notifies.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.storage.remove(SESSION_STORAGE_KEY).await?;
		debug!(target = "knugget.store", "session cleared");
		self.notify(false).await;
		Ok(())
	}

	async fn notify(&self, is_logged_in: bool) {
		if let Some(notifier) = &self.notifier {
			notifier.session_changed(is_logged_in).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use knugget_protocol::SessionKind;
	use parking_lot::Mutex;
	use serde_json::json;

	use super::*;

	fn record() -> SessionRecord {
		SessionRecord {
			user_id: "u1".into(),
			email: "ada@example.com".into(),
			name: "Ada".into(),
			access_token: "tok".into(),
			refresh_token: Some("ref".into()),
			expires_at: 1_000,
			plan: "free".into(),
			credits: 2,
			kind: SessionKind::Bearer,
		}
	}

	#[derive(Default)]
	struct Recorder(Mutex<Vec<bool>>);

	#[async_trait]
	impl SessionNotifier for Recorder {
		async fn session_changed(&self, is_logged_in: bool) {
			self.0.lock().push(is_logged_in);
		}
	}

	#[tokio::test]
	async fn set_then_get_round_trips() {
		let store = SessionStore::new(Arc::new(MemoryStorage::new()));
		store.set(&record()).await.unwrap();
		assert_eq!(store.get().await.unwrap(), Some(record()));
	}

	#[tokio::test]
	async fn writes_notify_after_commit() {
		let recorder = Arc::new(Recorder::default());
		let store = SessionStore::new(Arc::new(MemoryStorage::new())).with_notifier(recorder.clone());

		store.set(&record()).await.unwrap();
		store.clear().await.unwrap();

		assert_eq!(*recorder.0.lock(), vec![true, false]);
		assert_eq!(store.get().await.unwrap(), None);
	}

	#[tokio::test]
	async fn corrupt_record_reads_as_logged_out() {
		let storage = Arc::new(MemoryStorage::new());
		storage.set(SESSION_STORAGE_KEY, json!({ "unexpected": true })).await.unwrap();
		let store = SessionStore::new(storage.clone());
		assert_eq!(store.get().await.unwrap(), None);

		storage
			.set(SESSION_STORAGE_KEY, json!({ "userId": "u1", "accessToken": "", "expiresAt": 1 }))
			.await
			.unwrap();
		assert_eq!(store.get().await.unwrap(), None);
	}
}
