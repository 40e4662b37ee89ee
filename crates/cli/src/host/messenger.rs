use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use knugget::broadcast::{TabInfo, TabMessenger};
use knugget::error::LinkError;
use knugget_protocol::{HostFrame, Message, TabId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Identifies one client connection to the host.
pub type ConnectionId = u64;

struct TabConnection {
	connection: ConnectionId,
	url: String,
	frames: mpsc::UnboundedSender<HostFrame>,
}

/// Routes pushes to the connection each tab registered from.
///
/// A tab that reconnects on a new connection replaces its old route.
#[derive(Default)]
pub struct HostMessenger {
	tabs: Mutex<HashMap<TabId, TabConnection>>,
	opened: Mutex<Vec<String>>,
	next_connection: AtomicU64,
}

impl HostMessenger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn connection_id(&self) -> ConnectionId {
		self.next_connection.fetch_add(1, Ordering::Relaxed)
	}

	pub fn register(&self, connection: ConnectionId, tab: TabId, url: impl Into<String>, frames: mpsc::UnboundedSender<HostFrame>) {
		let url = url.into();
		debug!(target = "knugget.host", connection, tab, %url, "tab connected");
		self.tabs.lock().insert(tab, TabConnection { connection, url, frames });
	}

	/// Drops the route for `tab` if `connection` still owns it. Returns
	/// whether the tab is now gone.
	pub fn unregister(&self, connection: ConnectionId, tab: TabId) -> bool {
		let mut tabs = self.tabs.lock();
		if tabs.get(&tab).is_none_or(|t| t.connection != connection) {
			return false;
		}
		tabs.remove(&tab);
		debug!(target = "knugget.host", connection, tab, "tab disconnected");
		true
	}

	/// Pages requested through `open_tab`, oldest first.
	pub fn opened(&self) -> Vec<String> {
		self.opened.lock().clone()
	}
}

#[async_trait]
impl TabMessenger for HostMessenger {
	async fn send(&self, tab: TabId, message: Message) -> Result<(), LinkError> {
		let tabs = self.tabs.lock();
		let connection = tabs.get(&tab).ok_or(LinkError::Disconnected)?;
		connection
			.frames
			.send(HostFrame::Push { message })
			.map_err(|_| LinkError::Disconnected)
	}

	async fn tabs(&self) -> Vec<TabInfo> {
		self.tabs
			.lock()
			.iter()
			.map(|(id, connection)| TabInfo::new(*id, connection.url.clone()))
			.collect()
	}

	async fn open_tab(&self, url: &str) -> Result<(), LinkError> {
		info!(target = "knugget.host", %url, "open page");
		self.opened.lock().push(url.to_string());
		Ok(())
	}
}
