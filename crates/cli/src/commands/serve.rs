use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use knugget::InstallNotice;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::context::CommandContext;
use crate::host::{HostMessenger, HostServer};
use crate::output::{ResultBuilder, print_result};

pub async fn execute(mut ctx: CommandContext, cookies: Option<PathBuf>) -> Result<()> {
	if let Some(path) = cookies {
		ctx.config = ctx.config.with_cookie_file(path);
	}

	let messenger = Arc::new(HostMessenger::new());
	let background = ctx.background(ctx.transport()?, messenger.clone()).await?;
	let server = HostServer::bind(ctx.config.host_addr(), background.clone(), messenger)
		.await
		.with_context(|| format!("failed to bind {}", ctx.config.host_addr()))?;
	let addr = server.local_addr()?;

	let notice = match background.check_installation().await.context("failed to update settings")? {
		InstallNotice::Welcome { url } | InstallNotice::WhatsNew { url, .. } => Some(url),
		InstallNotice::Quiet => None,
	};

	let (stop, shutdown) = watch::channel(false);
	let mut serving = tokio::spawn(server.run(shutdown.clone()));
	let logged_in = background.startup().await;
	let reconcile_loop = background.spawn_reconcile_loop(shutdown);

	let mut data = json!({ "listening": addr.to_string(), "loggedIn": logged_in });
	if let Some(url) = notice {
		data["notice"] = url.into();
	}
	print_result(&ResultBuilder::new("serve").data(data).build(), ctx.format);

	let finished = tokio::select! {
		signal = tokio::signal::ctrl_c() => {
			signal.context("failed to listen for ctrl-c")?;
			None
		}
		served = &mut serving => Some(served),
	};
	info!(target = "knugget.host", "shutting down");
	let _ = stop.send(true);
	let _ = reconcile_loop.await;
	let served = match finished {
		Some(served) => served,
		None => serving.await,
	};
	served.context("host task panicked")??;
	Ok(())
}
