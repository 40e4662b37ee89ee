//! Local session host: the background process served over TCP.
//!
//! Every connection speaks [`HostFrame`](knugget_protocol::HostFrame) JSON
//! lines. A connection that sends a request carrying a tab id becomes that
//! tab's delivery channel for pushes until it disconnects.

mod client;
mod messenger;
mod server;

pub use client::HostClient;
pub use messenger::HostMessenger;
pub use server::HostServer;

/// Whether a connect error means no host is listening.
pub fn is_not_running(err: &std::io::Error) -> bool {
	matches!(err.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused)
}
