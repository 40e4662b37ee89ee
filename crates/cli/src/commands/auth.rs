use anyhow::{Context, Result};
use knugget::{PageAgent, system_clock};
use knugget_protocol::{ForceCheck, Message};
use serde_json::json;

use super::session_view;
use crate::context::{CommandContext, Session};
use crate::output::{ResultBuilder, print_result};

async fn agent(ctx: &CommandContext) -> Result<(Session, PageAgent)> {
	let transport = ctx.transport()?;
	let session = ctx.connect(transport.clone()).await?;
	let agent = PageAgent::new(session.link(), transport, system_clock(), &ctx.config);
	Ok((session, agent))
}

pub async fn login(ctx: &CommandContext, email: &str, password: &str) -> Result<()> {
	let (session, agent) = agent(ctx).await?;
	let record = agent.api().login(email, password).await.context("login failed")?;
	let data = json!({ "mode": session.mode(), "user": record.public_user() });
	print_result(&ResultBuilder::new("login").data(data).build(), ctx.format);
	Ok(())
}

pub async fn signup(ctx: &CommandContext, email: &str, password: &str, name: &str) -> Result<()> {
	let (session, agent) = agent(ctx).await?;
	let record = agent.api().register(email, password, name).await.context("signup failed")?;
	let data = json!({ "mode": session.mode(), "user": record.public_user() });
	print_result(&ResultBuilder::new("signup").data(data).build(), ctx.format);
	Ok(())
}

pub async fn logout(ctx: &CommandContext) -> Result<()> {
	let (session, agent) = agent(ctx).await?;
	agent.api().logout().await.context("logout failed")?;
	let data = json!({ "mode": session.mode(), "loggedIn": false });
	print_result(&ResultBuilder::new("logout").data(data).build(), ctx.format);
	Ok(())
}

pub async fn reconcile(ctx: &CommandContext) -> Result<()> {
	let session = ctx.connect(ctx.transport()?).await?;
	let reply = session
		.request(Message::ForceCheckWebsiteLogin(Some(ForceCheck::default())))
		.await?;
	let current = session.request(Message::GetSession).await?;

	let mut data = session_view(current.session.as_ref());
	data["loggedIn"] = reply.is_logged_in.unwrap_or(false).into();
	data["mode"] = session.mode().into();
	print_result(&ResultBuilder::new("reconcile").data(data).build(), ctx.format);
	Ok(())
}
