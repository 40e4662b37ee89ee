use anyhow::{Context, Result};
use knugget::request::DEFAULT_RETRIES;
use knugget::{PageAgent, system_clock};
use reqwest::Method;
use serde_json::{Value, json};

use crate::context::CommandContext;
use crate::output::{ResultBuilder, print_result};

pub async fn execute(ctx: &CommandContext, endpoint: &str, method: &str, body: Option<&str>, requires_auth: bool) -> Result<()> {
	let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).with_context(|| format!("invalid HTTP method {method}"))?;
	let body = body
		.map(serde_json::from_str::<Value>)
		.transpose()
		.context("request body is not valid JSON")?;

	let transport = ctx.transport()?;
	let session = ctx.connect(transport.clone()).await?;
	let agent = PageAgent::new(session.link(), transport, system_clock(), &ctx.config);
	let response = agent
		.authenticated_request(endpoint, method.clone(), body, requires_auth, DEFAULT_RETRIES)
		.await
		.with_context(|| format!("{method} {endpoint} failed"))?;

	let data = json!({ "status": response.status, "data": response.data });
	print_result(&ResultBuilder::new("request").data(data).build(), ctx.format);
	Ok(())
}
