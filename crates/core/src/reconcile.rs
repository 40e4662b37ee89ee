//! Resolves session truth across the identity sources.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::cookies::CookieJar;
use crate::identity::{CookieProbeSource, IdentitySource, LocalStoreSource, Probe, ProbeContext, RemoteProbeSource};
use crate::refresh::RefreshCoordinator;
use crate::store::SessionStore;

/// Ordered fallback chain over [`IdentitySource`]s; the first hit wins and a
/// full miss logs the user out.
pub struct Reconciler {
	sources: Vec<Arc<dyn IdentitySource>>,
	store: SessionStore,
	running: Mutex<()>,
}

impl Reconciler {
	pub fn new(sources: Vec<Arc<dyn IdentitySource>>, store: SessionStore) -> Self {
		Self {
			sources,
			store,
			running: Mutex::new(()),
		}
	}

	/// Store, cookies, credentialed check, legacy check.
	pub fn standard(
		store: SessionStore,
		coordinator: RefreshCoordinator,
		jar: Arc<dyn CookieJar>,
		backend: BackendClient,
		clock: SharedClock,
		config: &SyncConfig,
	) -> Self {
		let sources: Vec<Arc<dyn IdentitySource>> = vec![
			Arc::new(LocalStoreSource::new(store.clone(), coordinator, clock.clone(), config)),
			Arc::new(CookieProbeSource::new(jar, backend.clone(), clock.clone(), config)),
			Arc::new(RemoteProbeSource::credentialed(backend.clone(), clock.clone(), config)),
			Arc::new(RemoteProbeSource::legacy(backend, clock, config)),
		];
		Self::new(sources, store)
	}

	pub async fn reconcile(&self) -> bool {
		self.reconcile_with(&ProbeContext::default()).await
	}

	/// Waits for any running pass, then runs one.
	pub async fn reconcile_with(&self, ctx: &ProbeContext) -> bool {
		let _running = self.running.lock().await;
		self.run(ctx).await
	}

	/// Runs a pass unless one is already running; `None` when skipped.
	pub async fn reconcile_if_idle(&self) -> Option<bool> {
		let Ok(_running) = self.running.try_lock() else {
			debug!(target = "knugget.reconcile", "previous pass still running; skipping");
			return None;
		};
		Some(self.run(&ProbeContext::default()).await)
	}

	async fn run(&self, ctx: &ProbeContext) -> bool {
		for source in &self.sources {
			match source.probe(ctx).await {
				Probe::Valid => {
					debug!(target = "knugget.reconcile", source = source.kind().as_str(), "stored session valid");
					return true;
				}
				Probe::Established(record) => {
					if let Err(err) = self.store.set(&record).await {
						warn!(target = "knugget.reconcile", source = source.kind().as_str(), error = %err, "failed to persist session");
						continue;
					}
					info!(
						target = "knugget.reconcile",
						source = source.kind().as_str(),
						user_id = %record.user_id,
						kind = ?record.kind,
						"session established"
					);
					return true;
				}
				Probe::Miss => {}
			}
		}

		info!(target = "knugget.reconcile", "no session found; logging out");
		if let Err(err) = self.store.clear().await {
			warn!(target = "knugget.reconcile", error = %err, "failed to clear session");
		}
		false
	}
}
