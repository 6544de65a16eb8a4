//! Runtime abstraction layer for async operations
//!
//! The coordinator spawns its debounce timers and fetches through an
//! [`AsyncSpawner`] it is handed at construction, so an embedding
//! application can supply its own executor without touching the pipeline.

use crate::prelude::Future;
use crate::{MapError, Result};
use std::pin::Pin;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Abort the task at its next suspension point
    fn cancel(&self);
}

/// Spawns `future` on `spawner`
pub fn spawn_on<F>(spawner: &dyn AsyncSpawner, future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;
    use ::tokio::runtime::Handle;
    use ::tokio::task::JoinHandle;

    /// Spawns onto a specific Tokio runtime
    #[derive(Debug, Clone)]
    pub struct TokioSpawner {
        handle: Handle,
    }

    impl TokioSpawner {
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }

        /// Spawner for the Tokio runtime the caller is running on
        pub fn current() -> Result<Self> {
            Handle::try_current().map(Self::new).map_err(|_| {
                MapError::Config(
                    "no Tokio runtime is running; build the coordinator inside one \
                     or supply a spawner"
                        .into(),
                )
            })
        }
    }

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(
            &self,
            future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            Box::new(TokioHandle(self.handle.spawn(future)))
        }
    }

    struct TokioHandle(JoinHandle<()>);

    impl AsyncHandle for TokioHandle {
        fn is_finished(&self) -> bool {
            self.0.is_finished()
        }

        fn cancel(&self) {
            self.0.abort();
        }
    }
}

/// Unified async delay function
pub async fn async_delay(duration: std::time::Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
