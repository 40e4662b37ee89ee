mod auth;
mod bridge;
mod request;
mod serve;
mod status;

use anyhow::Result;
use knugget_protocol::SessionRecord;
use serde_json::{Value, json};

use crate::cli::{Cli, Commands};
use crate::context::CommandContext;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::from_cli(&cli)?;
	match cli.command {
		Commands::Serve { cookies } => serve::execute(ctx, cookies).await,
		Commands::Status => status::execute(&ctx).await,
		Commands::Login { email, password } => auth::login(&ctx, &email, &password).await,
		Commands::Signup { email, password, name } => auth::signup(&ctx, &email, &password, &name).await,
		Commands::Logout => auth::logout(&ctx).await,
		Commands::Reconcile => auth::reconcile(&ctx).await,
		Commands::Request {
			endpoint,
			method,
			body,
			no_auth,
		} => request::execute(&ctx, &endpoint, &method, body.as_deref(), !no_auth).await,
		Commands::Bridge { message, origin } => bridge::execute(&ctx, &message, origin).await,
	}
}

/// Display view of a session; the token itself is never printed.
fn session_view(record: Option<&SessionRecord>) -> Value {
	match record {
		Some(record) => json!({
			"loggedIn": true,
			"user": record.public_user(),
			"kind": record.kind,
			"expiresAt": record.expires_at,
			"tokenLength": record.access_token.len(),
			"refreshable": record.refresh_token.is_some(),
		}),
		None => json!({ "loggedIn": false }),
	}
}
