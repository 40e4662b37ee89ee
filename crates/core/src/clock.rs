use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync {
	fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> i64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or_default()
	}
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
	Arc::new(SystemClock)
}
