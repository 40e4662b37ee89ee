//! Line-delimited frames spoken between the host binary and its clients.
//!
//! Each frame is one JSON object per line. Clients send `request` frames and
//! receive the `reply` carrying the same `id`; the host may interleave `push`
//! frames addressed to the tab a connection registered for.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageSender, Reply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum HostFrame {
	Request {
		id: u64,
		#[serde(default)]
		sender: MessageSender,
		/// Sent by a web page rather than a page agent.
		#[serde(default)]
		external: bool,
		message: Message,
	},
	Reply {
		id: u64,
		reply: Reply,
	},
	Push {
		message: Message,
	},
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::message::AuthState;

	#[test]
	fn request_frame_defaults_sender() {
		let frame: HostFrame = serde_json::from_value(json!({
			"frame": "request",
			"id": 7,
			"message": { "type": "KNUGGET_CHECK_AUTH" }
		}))
		.unwrap();

		assert_eq!(
			frame,
			HostFrame::Request {
				id: 7,
				sender: MessageSender::default(),
				external: false,
				message: Message::KnuggetCheckAuth,
			}
		);
	}

	#[test]
	fn push_frame_nests_envelope() {
		let frame = HostFrame::Push {
			message: Message::SessionChanged(AuthState { is_logged_in: false }),
		};
		let value = serde_json::to_value(&frame).unwrap();
		assert_eq!(value["frame"], "push");
		assert_eq!(value["message"]["type"], "SESSION_CHANGED");
		assert_eq!(value["message"]["payload"]["isLoggedIn"], false);
	}
}
