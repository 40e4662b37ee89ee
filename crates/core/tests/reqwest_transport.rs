use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use knugget::backend::{CredentialsMode, HttpRequest, HttpTransport, ReqwestTransport, TransportError};
use knugget::cookies::Cookie;
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn whoami(headers: HeaderMap) -> impl IntoResponse {
	let bearer = headers
		.get("authorization")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::to_string);
	let cookie = headers.get("cookie").and_then(|v| v.to_str().ok()).map(str::to_string);
	match (bearer, cookie) {
		(Some(token), _) => (StatusCode::OK, axum::Json(json!({ "via": "bearer", "token": token }))).into_response(),
		(None, Some(cookie)) => (StatusCode::OK, axum::Json(json!({ "via": "cookie", "cookie": cookie }))).into_response(),
		(None, None) => (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": "no credential" }))).into_response(),
	}
}

async fn echo(axum::Json(body): axum::Json<Value>) -> impl IntoResponse {
	(StatusCode::CREATED, axum::Json(json!({ "success": true, "data": body })))
}

async fn plain() -> impl IntoResponse {
	(StatusCode::BAD_GATEWAY, "upstream down")
}

async fn slow() -> impl IntoResponse {
	tokio::time::sleep(Duration::from_millis(500)).await;
	"late"
}

async fn serve() -> String {
	let app = Router::new()
		.route("/api/auth/me", get(whoami))
		.route("/api/echo", post(echo))
		.route("/api/plain", get(plain))
		.route("/api/slow", get(slow));
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	format!("http://{addr}")
}

#[tokio::test]
async fn sends_bearer_header() {
	let origin = serve().await;
	let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

	let reply = transport
		.send(HttpRequest::get(format!("{origin}/api/auth/me")).bearer(Some("tok-1")))
		.await
		.unwrap();

	assert_eq!(reply.status, 200);
	assert_eq!(reply.body, Some(json!({ "via": "bearer", "token": "tok-1" })));
}

#[tokio::test]
async fn posts_json_body() {
	let origin = serve().await;
	let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

	let reply = transport
		.send(HttpRequest::post(format!("{origin}/api/echo")).json(Some(json!({ "refreshToken": "r" }))))
		.await
		.unwrap();

	assert!(reply.is_success());
	assert_eq!(reply.body.unwrap()["data"]["refreshToken"], "r");
}

#[tokio::test]
async fn non_json_body_is_none() {
	let origin = serve().await;
	let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

	let reply = transport.send(HttpRequest::get(format!("{origin}/api/plain"))).await.unwrap();

	assert_eq!(reply.status, 502);
	assert_eq!(reply.body, None);
}

#[tokio::test]
async fn seeded_cookies_only_ride_credentialed_requests() {
	let origin = serve().await;
	let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
	transport.seed_cookies(&origin, &[Cookie::new("knugget_session", "abc", "127.0.0.1")]);

	let credentialed = transport.send(HttpRequest::get(format!("{origin}/api/auth/me"))).await.unwrap();
	assert_eq!(credentialed.status, 200);
	assert_eq!(credentialed.body.unwrap()["cookie"], "knugget_session=abc");

	let anonymous = transport
		.send(HttpRequest::get(format!("{origin}/api/auth/me")).credentials(CredentialsMode::Omit))
		.await
		.unwrap();
	assert_eq!(anonymous.status, 401);
}

#[tokio::test]
async fn times_out() {
	let origin = serve().await;
	let transport = ReqwestTransport::new(Duration::from_millis(50)).unwrap();

	let err = transport.send(HttpRequest::get(format!("{origin}/api/slow"))).await.unwrap_err();
	assert!(matches!(err, TransportError::Timeout));
}
