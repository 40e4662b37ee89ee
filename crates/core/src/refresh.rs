//! Single-flight token refresh.
//!
//! At most one refresh call is outstanding per process. Concurrent callers
//! share the in-flight attempt's result. The attempt runs as a detached task
//! whose drop guard clears the slot, so a caller giving up does not cancel it
//! and a panicking attempt does not block later ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use knugget_protocol::SessionRecord;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::RefreshError;
use crate::record::{RecordDefaults, merge_refresh};
use crate::store::SessionStore;

type RefreshFuture = Shared<BoxFuture<'static, Result<SessionRecord, RefreshError>>>;

struct InFlight {
	id: u64,
	future: RefreshFuture,
}

struct Inner {
	backend: BackendClient,
	store: SessionStore,
	clock: SharedClock,
	margin_ms: i64,
	lifetime_ms: i64,
	slot: Mutex<Option<InFlight>>,
	next_id: AtomicU64,
}

/// Clears the slot when the attempt that owns it finishes or unwinds.
struct SlotGuard {
	inner: Arc<Inner>,
	id: u64,
}

impl Drop for SlotGuard {
	fn drop(&mut self) {
		let mut slot = self.inner.slot.lock();
		if slot.as_ref().is_some_and(|f| f.id == self.id) {
			*slot = None;
		}
	}
}

#[derive(Clone)]
pub struct RefreshCoordinator {
	inner: Arc<Inner>,
}

impl RefreshCoordinator {
	pub fn new(backend: BackendClient, store: SessionStore, clock: SharedClock, config: &SyncConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				backend,
				store,
				clock,
				margin_ms: config.refresh_margin_ms(),
				lifetime_ms: config.session_lifetime_ms(),
				slot: Mutex::new(None),
				next_id: AtomicU64::new(1),
			}),
		}
	}

	/// Refreshes `current`, joining the in-flight attempt if there is one.
	pub async fn refresh(&self, current: &SessionRecord) -> Result<SessionRecord, RefreshError> {
		let future = {
			let mut slot = self.inner.slot.lock();
			match slot.as_ref() {
				Some(in_flight) => {
					debug!(target = "knugget.refresh", id = in_flight.id, "joining in-flight refresh");
					in_flight.future.clone()
				}
				None => {
					let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
					let inner = self.inner.clone();
					let current = current.clone();
					let handle = tokio::spawn(async move {
						let _guard = SlotGuard { inner: inner.clone(), id };
						inner.execute(current).await
					});
					let future = async move {
						match handle.await {
							Ok(result) => result,
							Err(err) => {
								warn!(target = "knugget.refresh", error = %err, "refresh task failed");
								Err(RefreshError::Aborted)
							}
						}
					}
					.boxed()
					.shared();
					*slot = Some(InFlight { id, future: future.clone() });
					future
				}
			}
		};
		future.await
	}

	/// Refreshes whatever record is currently stored.
	pub async fn refresh_stored(&self) -> Result<SessionRecord, RefreshError> {
		let current = self.inner.store.get().await?.ok_or(RefreshError::NoSession)?;
		self.refresh(&current).await
	}

	pub fn in_flight(&self) -> bool {
		self.inner.slot.lock().is_some()
	}
}

impl Inner {
	async fn execute(&self, current: SessionRecord) -> Result<SessionRecord, RefreshError> {
		let now = self.clock.now_ms();

		// Another context may already have replaced the token.
		if let Some(stored) = self.store.get().await? {
			if stored.access_token != current.access_token && stored.bearer_token().is_some() && !stored.expires_within(now, self.margin_ms) {
				debug!(target = "knugget.refresh", user_id = %stored.user_id, "stored session already fresh");
				return Ok(stored);
			}
		}

		if current.is_cookie_session() {
			return Err(RefreshError::NotRefreshable);
		}
		let credential = current
			.refresh_token
			.as_deref()
			.filter(|t| !t.is_empty())
			.unwrap_or(&current.access_token);

		info!(target = "knugget.refresh", user_id = %current.user_id, expires_at = current.expires_at, "refreshing session");
		let payload = match self.backend.refresh(credential).await {
			Ok(payload) => payload,
			Err(err) => {
				warn!(target = "knugget.refresh", user_id = %current.user_id, error = %err, "refresh failed");
				return Err(err);
			}
		};

		let defaults = RecordDefaults {
			now_ms: self.clock.now_ms(),
			lifetime_ms: self.lifetime_ms,
		};
		let record = merge_refresh(&current, payload, defaults).ok_or_else(|| RefreshError::InvalidResponse("response carries no token".to_string()))?;
		self.store.set(&record).await?;
		info!(
			target = "knugget.refresh",
			user_id = %record.user_id,
			expires_at = record.expires_at,
			token_len = record.access_token.len(),
			"session refreshed"
		);
		Ok(record)
	}
}
