//! Inter-context `{type, payload}` envelopes and their replies.

use serde::{Deserialize, Serialize};

use crate::session::{PublicUser, SessionRecord, UserPayload};

/// Identifier of a browser tab hosting a page agent.
pub type TabId = i64;

/// Messages exchanged between the background process, page agents, and the
/// website.
///
/// Serialized as `{"type": "SCREAMING_SNAKE", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
	/// Page-loaded handshake; the background starts tracking the sender tab.
	PageLoaded,
	/// A tab went away; the background stops tracking it.
	#[serde(rename_all = "camelCase")]
	TabClosed { tab_id: TabId },
	/// Ask the background to run a reconciliation pass and answer when done.
	ForceCheckWebsiteLogin(Option<ForceCheck>),
	/// Ask the background to refresh the stored session (single-flight).
	RefreshSession,
	/// Ask the background for the stored session.
	GetSession,
	/// Persist a session obtained in a page agent (login, signup).
	StoreSession(SessionRecord),
	/// Explicit logout from a page agent.
	Logout,
	/// Local auth event, relayed to every tracked agent.
	AuthStateChanged(AuthState),
	/// Background to agents: the stored session changed.
	SessionChanged(AuthState),
	/// Background to matching tabs: re-render auth-dependent UI.
	ForceRefreshUi,
	/// To an agent: re-read auth state, reconciling first when `forceCheck` is set.
	RefreshAuthState(Option<AuthRefresh>),
	OpenLoginPage,
	OpenSignupPage(Option<PageRef>),
	OpenSavedSummariesPage,
	OpenSettings,
	OpenFeedback(Option<PageRef>),
	/// Website to background: a login just happened on the web origin.
	KnuggetAuthSuccess(Option<UserPayload>),
	/// Website to background: is the extension logged in?
	KnuggetCheckAuth,
	/// Website to background: drop the session.
	KnuggetLogout,
}

impl Message {
	/// Wire name of the message type.
	pub fn kind(&self) -> &'static str {
		match self {
			Message::PageLoaded => "PAGE_LOADED",
			Message::TabClosed { .. } => "TAB_CLOSED",
			Message::ForceCheckWebsiteLogin(_) => "FORCE_CHECK_WEBSITE_LOGIN",
			Message::RefreshSession => "REFRESH_SESSION",
			Message::GetSession => "GET_SESSION",
			Message::StoreSession(_) => "STORE_SESSION",
			Message::Logout => "LOGOUT",
			Message::AuthStateChanged(_) => "AUTH_STATE_CHANGED",
			Message::SessionChanged(_) => "SESSION_CHANGED",
			Message::ForceRefreshUi => "FORCE_REFRESH_UI",
			Message::RefreshAuthState(_) => "REFRESH_AUTH_STATE",
			Message::OpenLoginPage => "OPEN_LOGIN_PAGE",
			Message::OpenSignupPage(_) => "OPEN_SIGNUP_PAGE",
			Message::OpenSavedSummariesPage => "OPEN_SAVED_SUMMARIES_PAGE",
			Message::OpenSettings => "OPEN_SETTINGS",
			Message::OpenFeedback(_) => "OPEN_FEEDBACK",
			Message::KnuggetAuthSuccess(_) => "KNUGGET_AUTH_SUCCESS",
			Message::KnuggetCheckAuth => "KNUGGET_CHECK_AUTH",
			Message::KnuggetLogout => "KNUGGET_LOGOUT",
		}
	}
}

/// Payload of `AUTH_STATE_CHANGED` and `SESSION_CHANGED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
	pub is_logged_in: bool,
}

/// Optional payload of `FORCE_CHECK_WEBSITE_LOGIN`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceCheck {
	/// Token the backend just rejected; the local store is not trusted for it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rejected_token: Option<String>,
}

/// Optional payload of `REFRESH_AUTH_STATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRefresh {
	#[serde(default)]
	pub force_check: bool,
}

/// Page the user was on when opening a website page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
	#[serde(default)]
	pub url: Option<String>,
}

/// Who sent a message: a tab (page agent) or a web page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tab_id: Option<TabId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl MessageSender {
	pub fn tab(tab_id: TabId, url: impl Into<String>) -> Self {
		Self {
			tab_id: Some(tab_id),
			url: Some(url.into()),
		}
	}

	pub fn page(url: impl Into<String>) -> Self {
		Self {
			tab_id: None,
			url: Some(url.into()),
		}
	}
}

/// Response to any request message; `{success, error?, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub is_logged_in: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session: Option<SessionRecord>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<PublicUser>,
}

impl Reply {
	pub fn ok() -> Self {
		Self {
			success: true,
			..Default::default()
		}
	}

	pub fn failure(error: impl Into<String>) -> Self {
		Self {
			success: false,
			error: Some(error.into()),
			..Default::default()
		}
	}

	pub fn logged_in(is_logged_in: bool) -> Self {
		Self {
			success: true,
			is_logged_in: Some(is_logged_in),
			..Default::default()
		}
	}

	pub fn with_session(mut self, session: Option<SessionRecord>) -> Self {
		self.session = session;
		self
	}

	pub fn with_user(mut self, user: Option<PublicUser>) -> Self {
		self.user = user;
		self
	}
}
