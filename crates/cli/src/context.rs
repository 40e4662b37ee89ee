//! Config resolution and the connection every command works through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use knugget::agent::{BackgroundLink, LocalLink};
use knugget::cookies::CookieJar;
use knugget::error::LinkError;
use knugget::{Background, BackgroundDeps, FileStorage, ReqwestTransport, StorageStateJar, SyncConfig};
use knugget_protocol::{Message, MessageSender, Reply};
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::host::{HostClient, HostMessenger, is_not_running};
use crate::output::OutputFormat;

/// Replies to a forced check may wait on several backend round trips.
const REPLY_TIMEOUT_FACTOR: u32 = 4;

pub struct CommandContext {
	pub config: SyncConfig,
	pub format: OutputFormat,
}

impl CommandContext {
	pub fn from_cli(cli: &Cli) -> Result<Self> {
		let mut config = SyncConfig::load(cli.config.as_deref()).context("failed to load config")?;
		if let Some(path) = &cli.storage {
			config = config.with_storage_path(path);
		}
		if let Some(addr) = &cli.host {
			config = config.with_host_addr(addr);
		}
		Ok(Self { config, format: cli.format })
	}

	pub fn storage_path(&self) -> Result<PathBuf> {
		self.config
			.storage_path()
			.context("no storage path configured and no user config directory found")
	}

	pub fn transport(&self) -> Result<Arc<ReqwestTransport>> {
		Ok(Arc::new(ReqwestTransport::new(self.config.request_timeout())?))
	}

	fn reply_timeout(&self) -> Duration {
		self.config.request_timeout() * REPLY_TIMEOUT_FACTOR + self.config.forced_wait()
	}

	/// Builds the background process on file storage and the cookie file.
	///
	/// Cookies for the configured origins are also seeded into the transport
	/// so credentialed probes carry them.
	pub async fn background(&self, transport: Arc<ReqwestTransport>, messenger: Arc<HostMessenger>) -> Result<Arc<Background>> {
		let storage = Arc::new(FileStorage::new(self.storage_path()?));
		let cookies: Arc<dyn CookieJar> = match self.config.cookie_file() {
			Some(path) => Arc::new(StorageStateJar::new(path)),
			None => Arc::new(StorageStateJar::new(self.storage_path()?.with_file_name("cookies.json"))),
		};
		for origin in self.config.cookie_origins() {
			match cookies.cookies_for(&origin).await {
				Ok(found) if !found.is_empty() => {
					debug!(target = "knugget.host", %origin, count = found.len(), "seeding cookies");
					transport.seed_cookies(&origin, &found);
				}
				Ok(_) => {}
				Err(err) => warn!(target = "knugget.host", %origin, error = %err, "cookie file unreadable; starting without cookies"),
			}
		}
		let deps = BackgroundDeps::new(self.config.clone(), storage, transport, cookies, messenger);
		Ok(Background::new(deps))
	}

	/// Connects to the running host, or starts an in-process background
	/// when none is listening.
	pub async fn connect(&self, transport: Arc<ReqwestTransport>) -> Result<Session> {
		let sender = MessageSender::default();
		match HostClient::connect(self.config.host_addr(), sender.clone(), self.reply_timeout()).await {
			Ok((client, _pushes)) => {
				debug!(target = "knugget.host", addr = self.config.host_addr(), "using running host");
				Ok(Session::Host(Arc::new(client)))
			}
			Err(err) if is_not_running(&err) => {
				info!(target = "knugget.host", addr = self.config.host_addr(), "no host running; using local session");
				let background = self.background(transport, Arc::new(HostMessenger::new())).await?;
				Ok(Session::Local { background, sender })
			}
			Err(err) => Err(err).with_context(|| format!("failed to reach host at {}", self.config.host_addr())),
		}
	}
}

/// Where session operations run.
pub enum Session {
	Host(Arc<HostClient>),
	Local {
		background: Arc<Background>,
		sender: MessageSender,
	},
}

impl Session {
	pub fn mode(&self) -> &'static str {
		match self {
			Session::Host(_) => "host",
			Session::Local { .. } => "local",
		}
	}

	pub fn link(&self) -> Arc<dyn BackgroundLink> {
		match self {
			Session::Host(client) => client.clone(),
			Session::Local { background, sender } => Arc::new(LocalLink::new(background.clone(), sender.clone())),
		}
	}

	pub async fn request(&self, message: Message) -> Result<Reply, LinkError> {
		self.link().request(message).await
	}

	/// Delivers a website message through the login bridge.
	pub async fn external(&self, message: Message, sender: MessageSender) -> Result<Reply, LinkError> {
		match self {
			Session::Host(client) => client.call_external(message, sender).await,
			Session::Local { background, .. } => Ok(background.handle_external(message, &sender).await),
		}
	}
}
