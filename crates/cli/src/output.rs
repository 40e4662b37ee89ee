//! Result envelope printed by every command.

use std::io::{self, Write};
use std::time::Instant;

use clap::ValueEnum;
use knugget::{ApiError, ConfigError, LinkError, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// JSON output
	#[default]
	Json,
	/// Human-readable text
	Text,
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	Unauthorized,
	SessionExpired,
	NetworkError,
	ValidationError,
	ServerError,
	StorageError,
	ConfigError,
	HostUnavailable,
	InvalidInput,
	InternalError,
}

impl ErrorCode {
	/// Picks the code for the innermost known error in the chain.
	pub fn classify(err: &anyhow::Error) -> Self {
		for cause in err.chain() {
			if let Some(api) = cause.downcast_ref::<ApiError>() {
				return match api {
					ApiError::Unauthorized => ErrorCode::Unauthorized,
					ApiError::SessionExpired => ErrorCode::SessionExpired,
					ApiError::Network(_) => ErrorCode::NetworkError,
					ApiError::Validation(_) => ErrorCode::ValidationError,
					ApiError::Server { .. } => ErrorCode::ServerError,
					ApiError::Storage(_) => ErrorCode::StorageError,
					ApiError::Decode(_) => ErrorCode::InternalError,
				};
			}
			if cause.is::<StoreError>() {
				return ErrorCode::StorageError;
			}
			if cause.is::<ConfigError>() {
				return ErrorCode::ConfigError;
			}
			if cause.is::<LinkError>() {
				return ErrorCode::HostUnavailable;
			}
			if cause.is::<serde_json::Error>() {
				return ErrorCode::InvalidInput;
			}
		}
		ErrorCode::InternalError
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::Unauthorized => write!(f, "UNAUTHORIZED"),
			ErrorCode::SessionExpired => write!(f, "SESSION_EXPIRED"),
			ErrorCode::NetworkError => write!(f, "NETWORK_ERROR"),
			ErrorCode::ValidationError => write!(f, "VALIDATION_ERROR"),
			ErrorCode::ServerError => write!(f, "SERVER_ERROR"),
			ErrorCode::StorageError => write!(f, "STORAGE_ERROR"),
			ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
			ErrorCode::HostUnavailable => write!(f, "HOST_UNAVAILABLE"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// Builder for constructing command results.
pub struct ResultBuilder {
	command: String,
	data: Option<Value>,
	start_time: Instant,
}

impl ResultBuilder {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			start_time: Instant::now(),
		}
	}

	pub fn data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}

	pub fn build(self) -> CommandResult {
		CommandResult {
			ok: true,
			command: self.command,
			data: self.data,
			error: None,
			duration_ms: Some(self.start_time.elapsed().as_millis() as u64),
		}
	}
}

pub fn print_result(result: &CommandResult, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	let rendered = match format {
		OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
		OutputFormat::Text => render_text(result),
	};
	let _ = writeln!(stdout, "{rendered}");
}

pub fn print_failure(command: &str, err: &anyhow::Error, format: OutputFormat) {
	let result = CommandResult {
		ok: false,
		command: command.to_string(),
		data: None,
		error: Some(CommandError {
			code: ErrorCode::classify(err),
			message: format!("{err:#}"),
		}),
		duration_ms: None,
	};
	print_result(&result, format);
}

fn render_text(result: &CommandResult) -> String {
	let mut out = String::new();
	if let Some(error) = &result.error {
		out.push_str(&format!("{}: {}: {}", result.command, error.code, error.message));
		return out;
	}
	out.push_str(&format!("{}: ok", result.command));
	match &result.data {
		Some(Value::Object(map)) => {
			for (key, value) in map {
				match value {
					Value::String(s) => out.push_str(&format!("\n  {key}: {s}")),
					other => out.push_str(&format!("\n  {key}: {other}")),
				}
			}
		}
		Some(other) => out.push_str(&format!("\n  {other}")),
		None => {}
	}
	out
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn classifies_wrapped_api_errors() {
		let err = anyhow::Error::new(ApiError::SessionExpired).context("request /profile");
		assert_eq!(ErrorCode::classify(&err), ErrorCode::SessionExpired);

		let err = anyhow::Error::new(LinkError::Disconnected);
		assert_eq!(ErrorCode::classify(&err), ErrorCode::HostUnavailable);

		assert_eq!(ErrorCode::classify(&anyhow::anyhow!("boom")), ErrorCode::InternalError);
	}

	#[test]
	fn text_lists_top_level_fields() {
		let result = ResultBuilder::new("status")
			.data(json!({ "loggedIn": true, "userId": "u1" }))
			.build();
		let text = render_text(&result);
		assert!(text.starts_with("status: ok"));
		assert!(text.contains("loggedIn: true"));
		assert!(text.contains("userId: u1"));
	}

	#[test]
	fn text_failure_names_the_code() {
		let result = CommandResult {
			ok: false,
			command: "request".into(),
			data: None,
			error: Some(CommandError {
				code: ErrorCode::HostUnavailable,
				message: "host went away".into(),
			}),
			duration_ms: None,
		};
		assert_eq!(render_text(&result), "request: HOST_UNAVAILABLE: host went away");
		assert_eq!(ErrorCode::SessionExpired.to_string(), "SESSION_EXPIRED");
	}

	#[test]
	fn failure_envelope_shape() {
		let result = CommandResult {
			ok: false,
			command: "login".into(),
			data: None,
			error: Some(CommandError {
				code: ErrorCode::ValidationError,
				message: "Incorrect email or password".into(),
			}),
			duration_ms: None,
		};
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["error"]["code"], "VALIDATION_ERROR");
		assert!(value.get("data").is_none());
	}
}
