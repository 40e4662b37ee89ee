use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use knugget::agent::BackgroundLink;
use knugget::error::LinkError;
use knugget_protocol::{HostFrame, Message, MessageSender, Reply};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Connection to a running host, usable as a page agent's [`BackgroundLink`].
pub struct HostClient {
	writer: tokio::sync::Mutex<OwnedWriteHalf>,
	pending: Pending,
	next_id: AtomicU64,
	sender: MessageSender,
	reply_timeout: Duration,
	reader: JoinHandle<()>,
}

impl HostClient {
	/// Connects as `sender`. Pushes addressed to the sender's tab arrive on
	/// the returned receiver.
	pub async fn connect(addr: &str, sender: MessageSender, reply_timeout: Duration) -> io::Result<(Self, mpsc::UnboundedReceiver<Message>)> {
		let stream = TcpStream::connect(addr).await?;
		let (read, write) = stream.into_split();
		let pending: Pending = Arc::default();
		let (pushes, push_rx) = mpsc::unbounded_channel();
		let reader = tokio::spawn(read_frames(read, pending.clone(), pushes));
		Ok((
			Self {
				writer: tokio::sync::Mutex::new(write),
				pending,
				next_id: AtomicU64::new(1),
				sender,
				reply_timeout,
				reader,
			},
			push_rx,
		))
	}

	/// Sends `message` as this client's tab.
	pub async fn call(&self, message: Message) -> Result<Reply, LinkError> {
		self.send(message, self.sender.clone(), false).await
	}

	/// Sends `message` as a web page at `sender`.
	pub async fn call_external(&self, message: Message, sender: MessageSender) -> Result<Reply, LinkError> {
		self.send(message, sender, true).await
	}

	async fn send(&self, message: Message, sender: MessageSender, external: bool) -> Result<Reply, LinkError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let kind = message.kind();
		let frame = HostFrame::Request {
			id,
			sender,
			external,
			message,
		};
		let line = serde_json::to_string(&frame).map_err(|e| LinkError::Unexpected(e.to_string()))?;

		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);
		let written = {
			let mut writer = self.writer.lock().await;
			match writer.write_all(format!("{line}\n").as_bytes()).await {
				Ok(()) => writer.flush().await,
				Err(err) => Err(err),
			}
		};
		if let Err(err) = written {
			self.pending.lock().remove(&id);
			return Err(LinkError::Transport(err.to_string()));
		}
		debug!(target = "knugget.host", id, kind, external, "request sent");

		match tokio::time::timeout(self.reply_timeout, rx).await {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(_)) => Err(LinkError::Disconnected),
			Err(_) => {
				self.pending.lock().remove(&id);
				Err(LinkError::Timeout(self.reply_timeout))
			}
		}
	}
}

impl Drop for HostClient {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

#[async_trait]
impl BackgroundLink for HostClient {
	async fn request(&self, message: Message) -> Result<Reply, LinkError> {
		self.call(message).await
	}
}

async fn read_frames(read: OwnedReadHalf, pending: Pending, pushes: mpsc::UnboundedSender<Message>) {
	let mut lines = BufReader::new(read).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		match serde_json::from_str::<HostFrame>(&line) {
			Ok(HostFrame::Reply { id, reply }) => {
				if let Some(waiter) = pending.lock().remove(&id) {
					let _ = waiter.send(reply);
				}
			}
			Ok(HostFrame::Push { message }) => {
				let _ = pushes.send(message);
			}
			Ok(HostFrame::Request { .. }) => warn!(target = "knugget.host", "host sent a request frame"),
			Err(err) => warn!(target = "knugget.host", error = %err, "malformed frame from host"),
		}
	}
	// Waiters observe the dropped senders as a disconnect.
	pending.lock().clear();
}
