//! `ViewContext` for a live robot: tokio timers and the system clock.

use crate::ViewContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Must be used from inside a tokio runtime (`spawn` and `sleep` need one).
pub struct TokioContext {
    created: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
        }
    }

    /// The context as handed to a `MapSession`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewContext for TokioContext {
    fn now(&self) -> Duration {
        self.created.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_owned();
        tracing::debug!("spawning {}", name);
        tokio::spawn(async move {
            future.await;
            tracing::debug!("{} exited", name);
        });
    }
}
