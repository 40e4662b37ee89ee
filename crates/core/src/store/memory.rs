use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::SessionStorage;
use crate::error::StoreError;

/// Process-local storage; contexts sharing one instance see each other's writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl SessionStorage for MemoryStorage {
	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
		Ok(self.entries.lock().get(key).cloned())
	}

	async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
		self.entries.lock().insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.entries.lock().remove(key);
		Ok(())
	}
}
