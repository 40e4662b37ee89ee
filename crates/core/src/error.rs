//! Error taxonomy for the session layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the durable session medium.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("storage serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Why a token refresh did not produce a new record.
///
/// Always recovered locally by falling back to reconciliation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
	#[error("no session to refresh")]
	NoSession,

	#[error("session has no refreshable credential")]
	NotRefreshable,

	#[error("refresh rejected with status {status}")]
	Rejected { status: u16 },

	#[error("refresh network error: {0}")]
	Network(String),

	#[error("refresh response invalid: {0}")]
	InvalidResponse(String),

	#[error("failed to persist refreshed session: {0}")]
	Storage(String),

	#[error("refresh task aborted")]
	Aborted,

	#[error("{0}")]
	Remote(String),
}

/// Outcome of an API call that did not produce a 2xx response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
	#[error("Authentication required. Please log in.")]
	Unauthorized,

	#[error("Your session has expired. Please log in again")]
	SessionExpired,

	#[error("{message}")]
	Server { status: u16, message: String },

	#[error("Network error: {0}")]
	Network(String),

	#[error("{0}")]
	Validation(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("invalid response body: {0}")]
	Decode(String),
}

impl ApiError {
	/// HTTP status associated with the failure, when one exists.
	pub fn status(&self) -> Option<u16> {
		match self {
			ApiError::Unauthorized | ApiError::SessionExpired => Some(401),
			ApiError::Server { status, .. } => Some(*status),
			ApiError::Validation(_) => Some(400),
			_ => None,
		}
	}

	/// The caller must prompt the user to log in again.
	pub fn requires_login(&self) -> bool {
		matches!(self, ApiError::Unauthorized | ApiError::SessionExpired)
	}

	pub fn is_retryable(&self) -> bool {
		match self {
			ApiError::Network(_) => true,
			ApiError::Server { status, .. } => *status >= 500 || *status == 429,
			_ => false,
		}
	}
}

impl From<StoreError> for ApiError {
	fn from(err: StoreError) -> Self {
		ApiError::Storage(err.to_string())
	}
}

impl From<StoreError> for RefreshError {
	fn from(err: StoreError) -> Self {
		RefreshError::Storage(err.to_string())
	}
}

impl From<LinkError> for ApiError {
	fn from(err: LinkError) -> Self {
		ApiError::Network(err.to_string())
	}
}

impl From<LinkError> for RefreshError {
	fn from(err: LinkError) -> Self {
		RefreshError::Network(err.to_string())
	}
}

/// Failure delivering a message across contexts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
	#[error("receiving context is gone")]
	Disconnected,

	#[error("no reply within {0:?}")]
	Timeout(std::time::Duration),

	#[error("unexpected reply: {0}")]
	Unexpected(String),

	#[error("{0}")]
	Transport(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("invalid config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid URL for {field}: {value}")]
	InvalidUrl { field: &'static str, value: String },
}
