//! Session synchronization for the Knugget extension.
//!
//! One [`Background`] process owns the persisted session. It refreshes
//! tokens single-flight, reconciles the session with the website's cookies on
//! a timer and on demand, and tells every tracked tab when the login state
//! changes. [`PageAgent`]s reach the backend through the same
//! [`AuthenticatedClient`] logic but delegate refresh and reconciliation to
//! the background over a [`BackgroundLink`].

pub mod agent;
pub mod api;
pub mod background;
pub mod backend;
pub mod bridge;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod cookies;
pub mod error;
pub mod identity;
pub mod install;
pub mod reconcile;
pub mod record;
pub mod refresh;
pub mod request;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use agent::{BackgroundLink, LocalLink, PageAgent};
pub use api::KnuggetApi;
pub use background::{Background, BackgroundDeps};
pub use backend::{BackendClient, HttpTransport, ReqwestTransport};
pub use broadcast::{Broadcaster, TabInfo, TabMessenger, UrlPattern};
pub use clock::{Clock, SharedClock, SystemClock, system_clock};
pub use config::SyncConfig;
pub use cookies::{Cookie, CookieJar, CookieMatcher, StorageStateJar};
pub use error::{ApiError, ConfigError, LinkError, RefreshError, StoreError};
pub use install::InstallNotice;
pub use knugget_protocol as protocol;
pub use reconcile::Reconciler;
pub use refresh::RefreshCoordinator;
pub use request::{ApiResponse, AuthenticatedClient, Credential, SessionAccess, SessionAuthority};
pub use store::{FileStorage, MemoryStorage, SessionNotifier, SessionStorage, SessionStore};
