use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use serde_json::{Value, json};
use tempfile::TempDir;

struct Workspace {
	dir: TempDir,
	config: PathBuf,
}

impl Workspace {
	fn new(host_addr: &str) -> Self {
		let dir = tempfile::tempdir().unwrap();
		let config = dir.path().join("config.json");
		let body = json!({
			"apiBaseUrl": "http://127.0.0.1:9/api",
			"legacyApiBaseUrl": "http://127.0.0.1:9/legacy",
			"websiteUrl": "http://localhost:8000",
			"storagePath": dir.path().join("storage.json"),
			"cookieFile": dir.path().join("cookies.json"),
			"hostAddr": host_addr,
			"requestTimeoutMs": 2000
		});
		std::fs::write(&config, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
		Self { dir, config }
	}

	fn storage(&self) -> PathBuf {
		self.dir.path().join("storage.json")
	}

	fn command(&self, args: &[&str]) -> Command {
		let mut cmd = Command::new(env!("CARGO_BIN_EXE_knugget"));
		cmd.arg("--config")
			.arg(&self.config)
			.args(args)
			.env_remove("RUST_LOG")
			.env_remove("KNUGGET_API_URL")
			.env_remove("KNUGGET_WEBSITE_URL");
		cmd
	}

	fn run(&self, args: &[&str]) -> (Output, Value) {
		let output = self.command(args).output().unwrap();
		let value = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
			panic!(
				"stdout is not JSON ({e}): {}\nstderr: {}",
				String::from_utf8_lossy(&output.stdout),
				String::from_utf8_lossy(&output.stderr)
			)
		});
		(output, value)
	}

	fn write_session(&self, expires_at: i64) {
		let document = json!({
			"knuggetUserInfo": {
				"userId": "u1",
				"email": "ada@knugget.test",
				"name": "Ada",
				"accessToken": "secret-token",
				"expiresAt": expires_at,
				"plan": "pro",
				"credits": 5
			}
		});
		std::fs::write(self.storage(), serde_json::to_vec(&document).unwrap()).unwrap();
	}
}

fn stored(path: &Path) -> Value {
	std::fs::read(path)
		.ok()
		.and_then(|raw| serde_json::from_slice::<Value>(&raw).ok())
		.and_then(|doc| doc.get("knuggetUserInfo").cloned())
		.unwrap_or(Value::Null)
}

fn unreachable_host() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap().to_string();
	drop(listener);
	addr
}

const FAR_FUTURE: i64 = 4_102_444_800_000;

const LOGIN: &str = r#"{"type":"KNUGGET_AUTH_SUCCESS","payload":{"token":"t","user":{"id":"u1","email":"a@b.c"}}}"#;

#[test]
fn status_without_host_reads_local_storage() {
	let ws = Workspace::new(&unreachable_host());

	let (output, value) = ws.run(&["status"]);
	assert!(output.status.success());
	assert_eq!(value["ok"], true);
	assert_eq!(value["data"]["mode"], "local");
	assert_eq!(value["data"]["loggedIn"], false);
}

#[test]
fn corrupt_cookie_file_does_not_block_startup() {
	let ws = Workspace::new(&unreachable_host());
	ws.write_session(FAR_FUTURE);
	std::fs::write(ws.dir.path().join("cookies.json"), b"{ not json").unwrap();

	let (output, value) = ws.run(&["status"]);
	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(value["data"]["loggedIn"], true);
}

#[test]
fn status_never_prints_token() {
	let ws = Workspace::new(&unreachable_host());
	ws.write_session(FAR_FUTURE);

	let (output, value) = ws.run(&["status"]);
	assert!(output.status.success());
	assert_eq!(value["data"]["loggedIn"], true);
	assert_eq!(value["data"]["user"]["id"], "u1");
	assert_eq!(value["data"]["tokenLength"], 12);
	assert!(!String::from_utf8_lossy(&output.stdout).contains("secret-token"));
}

#[test]
fn bridge_login_persists_session() {
	let ws = Workspace::new(&unreachable_host());

	let (output, value) = ws.run(&["bridge", LOGIN]);
	assert!(output.status.success(), "{value}");
	assert_eq!(value["data"]["success"], true);

	let record = stored(&ws.storage());
	assert_eq!(record["userId"], "u1");
	assert_eq!(record["accessToken"], "t");
	assert_eq!(record["plan"], "free");
}

#[test]
fn bridge_rejects_untrusted_origin() {
	let ws = Workspace::new(&unreachable_host());

	let (output, value) = ws.run(&["bridge", LOGIN, "--origin", "https://evil.test"]);
	assert!(!output.status.success());
	assert_eq!(value["ok"], false);
	assert_eq!(value["error"]["code"], "VALIDATION_ERROR");
	assert_eq!(value["error"]["message"], "Untrusted origin");
	assert_eq!(stored(&ws.storage()), Value::Null);
}

#[test]
fn logout_clears_storage() {
	let ws = Workspace::new(&unreachable_host());
	ws.write_session(FAR_FUTURE);

	let (output, value) = ws.run(&["logout"]);
	assert!(output.status.success(), "{value}");
	assert_eq!(stored(&ws.storage()), Value::Null);
}

#[test]
fn request_without_any_session_is_unauthorized() {
	let ws = Workspace::new(&unreachable_host());

	let (output, value) = ws.run(&["request", "/summary?page=1&limit=10"]);
	assert!(!output.status.success());
	assert_eq!(value["error"]["code"], "UNAUTHORIZED");
}

#[test]
fn text_format_is_line_oriented() {
	let ws = Workspace::new(&unreachable_host());

	let output = ws.command(&["status", "--format", "text"]).output().unwrap();
	let stdout = String::from_utf8_lossy(&output.stdout);
	assert!(stdout.starts_with("status: ok"), "{stdout}");
	assert!(stdout.contains("loggedIn: false"));
}

struct Host(Child);

impl Drop for Host {
	fn drop(&mut self) {
		let _ = self.0.kill();
		let _ = self.0.wait();
	}
}

#[test]
fn commands_use_running_host() {
	let addr = unreachable_host();
	let ws = Workspace::new(&addr);
	let mut child = ws.command(&["serve"]).stdout(Stdio::piped()).stderr(Stdio::null()).spawn().unwrap();
	let stdout = child.stdout.take().unwrap();
	let host = Host(child);

	let mut banner = String::new();
	for line in BufReader::new(stdout).lines() {
		let line = line.unwrap();
		banner.push_str(&line);
		if line.starts_with('}') {
			break;
		}
	}
	let banner: Value = serde_json::from_str(&banner).unwrap();
	assert_eq!(banner["command"], "serve");
	assert_eq!(banner["data"]["listening"], addr);
	assert_eq!(banner["data"]["notice"], "http://localhost:8000/welcome?source=extension");
	let document: Value = serde_json::from_slice(&std::fs::read(ws.storage()).unwrap()).unwrap();
	assert_eq!(document["knuggetSettings"]["autoShowTranscript"], true);

	let (_, value) = ws.run(&["status"]);
	assert_eq!(value["data"]["mode"], "host");
	assert_eq!(value["data"]["loggedIn"], false);

	let (output, _) = ws.run(&["bridge", LOGIN]);
	assert!(output.status.success());

	let (_, value) = ws.run(&["status"]);
	assert_eq!(value["data"]["mode"], "host");
	assert_eq!(value["data"]["user"]["id"], "u1");
	assert_eq!(stored(&ws.storage())["userId"], "u1");

	drop(host);
}
