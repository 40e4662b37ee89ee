use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use knugget::Background;
use knugget_protocol::HostFrame;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::HostMessenger;

/// Accepts page agents, operator commands and website messages.
pub struct HostServer {
	background: Arc<Background>,
	messenger: Arc<HostMessenger>,
	listener: TcpListener,
}

impl HostServer {
	pub async fn bind(addr: &str, background: Arc<Background>, messenger: Arc<HostMessenger>) -> io::Result<Self> {
		let listener = TcpListener::bind(addr).await?;
		Ok(Self {
			background,
			messenger,
			listener,
		})
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	/// Serves connections until `shutdown` flips to true.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
		info!(target = "knugget.host", addr = %self.local_addr()?, "host listening");
		loop {
			tokio::select! {
				accepted = self.listener.accept() => {
					let (stream, peer) = accepted?;
					let background = self.background.clone();
					let messenger = self.messenger.clone();
					tokio::spawn(serve_connection(stream, peer, background, messenger));
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						info!(target = "knugget.host", "host stopped");
						return Ok(());
					}
				}
			}
		}
	}
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, background: Arc<Background>, messenger: Arc<HostMessenger>) {
	debug!(target = "knugget.host", %peer, "client connected");
	let (read, mut write) = stream.into_split();
	let (frames, mut outgoing) = mpsc::unbounded_channel::<HostFrame>();

	let writer = tokio::spawn(async move {
		while let Some(frame) = outgoing.recv().await {
			let line = match serde_json::to_string(&frame) {
				Ok(line) => line,
				Err(err) => {
					warn!(target = "knugget.host", error = %err, "failed to encode frame");
					continue;
				}
			};
			if write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
				break;
			}
		}
	});

	let connection = messenger.connection_id();
	let mut tabs = BTreeSet::new();
	let mut lines = BufReader::new(read).lines();
	loop {
		let line = match lines.next_line().await {
			Ok(Some(line)) => line,
			Ok(None) => break,
			Err(err) => {
				debug!(target = "knugget.host", %peer, error = %err, "read failed");
				break;
			}
		};
		if line.trim().is_empty() {
			continue;
		}
		let frame = match serde_json::from_str::<HostFrame>(&line) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(target = "knugget.host", %peer, error = %err, "malformed frame");
				continue;
			}
		};
		let HostFrame::Request {
			id,
			sender,
			external,
			message,
		} = frame
		else {
			warn!(target = "knugget.host", %peer, "clients may only send requests");
			continue;
		};

		if let (false, Some(tab)) = (external, sender.tab_id) {
			if tabs.insert(tab) {
				messenger.register(connection, tab, sender.url.clone().unwrap_or_default(), frames.clone());
			}
		}

		let background = background.clone();
		let frames = frames.clone();
		tokio::spawn(async move {
			let reply = if external {
				background.handle_external(message, &sender).await
			} else {
				background.handle_message(message, &sender).await
			};
			let _ = frames.send(HostFrame::Reply { id, reply });
		});
	}

	for tab in tabs {
		if messenger.unregister(connection, tab) {
			background.tab_removed(tab);
		}
	}
	drop(frames);
	let _ = writer.await;
	debug!(target = "knugget.host", %peer, "client disconnected");
}
