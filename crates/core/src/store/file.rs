//! JSON document storage shared by every process on the machine.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::SessionStorage;
use crate::error::StoreError;

/// Storage backed by one JSON object on disk.
///
/// Writes go to a sibling temp file and are renamed into place, so readers
/// in other processes never observe a partial document.
#[derive(Debug)]
pub struct FileStorage {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
		let raw = match tokio::fs::read_to_string(&self.path).await {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
			Err(source) => return Err(self.io_error(source)),
		};
		if raw.trim().is_empty() {
			return Ok(Map::new());
		}
		match serde_json::from_str::<Value>(&raw)? {
			Value::Object(map) => Ok(map),
			other => Err(StoreError::Backend(format!(
				"expected a JSON object in {}, found {}",
				self.path.display(),
				type_name(&other)
			))),
		}
	}

	async fn write_document(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
		}
		let tmp = self.path.with_extension("json.tmp");
		let body = serde_json::to_vec_pretty(document)?;
		tokio::fs::write(&tmp, body).await.map_err(|e| self.io_error(e))?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_error(e))?;
		Ok(())
	}

	fn io_error(&self, source: std::io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[async_trait]
impl SessionStorage for FileStorage {
	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
		Ok(self.read_document().await?.remove(key))
	}

	async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.read_document().await?;
		document.insert(key.to_string(), value);
		self.write_document(&document).await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.read_document().await?;
		if document.remove(key).is_none() {
			return Ok(());
		}
		self.write_document(&document).await
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn missing_file_reads_empty() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().join("nested").join("storage.json"));
		assert_eq!(storage.get("knuggetUserInfo").await.unwrap(), None);
		storage.remove("knuggetUserInfo").await.unwrap();
		assert!(!storage.path().exists());
	}

	#[tokio::test]
	async fn keys_survive_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("storage.json");

		let storage = FileStorage::new(&path);
		storage.set("a", json!({ "x": 1 })).await.unwrap();
		storage.set("b", json!("two")).await.unwrap();
		storage.remove("a").await.unwrap();

		let reopened = FileStorage::new(&path);
		assert_eq!(reopened.get("a").await.unwrap(), None);
		assert_eq!(reopened.get("b").await.unwrap(), Some(json!("two")));
		assert!(!path.with_extension("json.tmp").exists());
	}

	#[tokio::test]
	async fn non_object_document_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("storage.json");
		std::fs::write(&path, "[1,2]").unwrap();

		let err = FileStorage::new(&path).get("a").await.unwrap_err();
		assert!(matches!(err, StoreError::Backend(_)));
	}
}
