use anyhow::{Context, Result};
use knugget::ApiError;
use knugget_protocol::{Message, MessageSender};

use crate::context::CommandContext;
use crate::output::{ResultBuilder, print_result};

pub async fn execute(ctx: &CommandContext, raw: &str, origin: Option<String>) -> Result<()> {
	let message: Message = serde_json::from_str(raw).context("message is not a {type, payload} envelope")?;
	let origin = origin.unwrap_or_else(|| ctx.config.website_url().to_string());

	let session = ctx.connect(ctx.transport()?).await?;
	let reply = session.external(message, MessageSender::page(origin)).await?;
	if !reply.success {
		let reason = reply.error.unwrap_or_else(|| "message rejected".to_string());
		return Err(ApiError::Validation(reason).into());
	}

	let data = serde_json::to_value(&reply)?;
	print_result(&ResultBuilder::new("bridge").data(data).build(), ctx.format);
	Ok(())
}
