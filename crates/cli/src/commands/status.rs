use anyhow::{Result, anyhow};
use knugget_protocol::Message;

use super::session_view;
use crate::context::CommandContext;
use crate::output::{ResultBuilder, print_result};

pub async fn execute(ctx: &CommandContext) -> Result<()> {
	let session = ctx.connect(ctx.transport()?).await?;
	let reply = session.request(Message::GetSession).await?;
	if !reply.success {
		return Err(anyhow!(reply.error.unwrap_or_else(|| "failed to read session".to_string())));
	}

	let mut data = session_view(reply.session.as_ref());
	data["mode"] = session.mode().into();
	print_result(&ResultBuilder::new("status").data(data).build(), ctx.format);
	Ok(())
}
