//! Time source abstraction for the polling loops.
//!
//! Every sleep in the pipeline goes through a [`Clock`] so that retry and
//! confirmation semantics can be tested against simulated time instead of
//! real delays.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// A source of "now" and the ability to sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
