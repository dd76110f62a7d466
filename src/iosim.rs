//! Simulated heavy-I/O collaborators for demos and tests.
//!
//! These satisfy the opaque work-function boundary: a scope knows nothing
//! about them, they are just async callables that return a value or an
//! error after a cooperative delay. No real I/O happens anywhere.

use std::time::Duration;

use async_trait::async_trait;

/// A fake repository standing in for an expensive I/O call.
#[async_trait]
pub trait HeavyIo: Send + Sync {
    /// Process request `num` and echo it back once the "I/O" finishes.
    async fn process(&self, num: i32) -> anyhow::Result<i32>;
}

/// Simulates latency with a cooperative sleep, then echoes the request.
#[derive(Debug, Clone)]
pub struct SimulatedIo {
    latency: Duration,
}

impl SimulatedIo {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedIo {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl HeavyIo for SimulatedIo {
    async fn process(&self, num: i32) -> anyhow::Result<i32> {
        tracing::debug!(num, "starting simulated I/O");
        tokio::time::sleep(self.latency).await;
        tracing::debug!(num, "finished simulated I/O");
        Ok(num)
    }
}

/// Always fails, for exercising failure propagation paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingIo;

#[async_trait]
impl HeavyIo for FailingIo {
    async fn process(&self, num: i32) -> anyhow::Result<i32> {
        anyhow::bail!("simulated I/O failure for request {num}")
    }
}
