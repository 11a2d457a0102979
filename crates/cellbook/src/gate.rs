//! Dependency readiness gate for the compiler service.
//!
//! The compiler is loaded at most once per attempt. The first
//! [`acquire`](DependencyGate::acquire) seen in [`GateState::NotLoaded`] starts
//! the load; every caller, including those arriving while it is in flight,
//! waits on the same `watch` channel until the gate settles.
//!
//! ```text
//! NotLoaded --acquire--> Loading --ok--> Ready
//!                            \---err--> Failed --retry--> Loading
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::compiler::{Compiler, NativeCompiler};

/// Error returned by a [`CompilerLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

impl LoadError {
    /// Create a load error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors returned when acquiring the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The last load attempt failed; call [`DependencyGate::retry`] to try again.
    #[error("compiler service unavailable: {0}")]
    Unavailable(String),
    /// The gate was dropped while a caller was waiting.
    #[error("compiler service unavailable: gate closed")]
    Closed,
}

/// Loads the compiler service.
///
/// The gate calls [`load`](Self::load) once per attempt, from a spawned task.
#[async_trait]
pub trait CompilerLoader: Send + Sync {
    /// Produce a ready compiler or explain why it is unavailable.
    async fn load(&self) -> Result<Arc<dyn Compiler>, LoadError>;
}

/// Loader for the in-tree [`NativeCompiler`]; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

#[async_trait]
impl CompilerLoader for BuiltinLoader {
    async fn load(&self) -> Result<Arc<dyn Compiler>, LoadError> {
        Ok(Arc::new(NativeCompiler))
    }
}

/// Observable state of a [`DependencyGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// No load has been requested.
    NotLoaded,
    /// A load is in flight.
    Loading,
    /// The compiler is available.
    Ready,
    /// The last load failed.
    Failed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GateState::NotLoaded => "not_loaded",
            GateState::Loading => "loading",
            GateState::Ready => "ready",
            GateState::Failed => "failed",
        })
    }
}

enum Status {
    NotLoaded,
    Loading,
    Ready(Arc<dyn Compiler>),
    Failed(String),
}

impl Status {
    fn state(&self) -> GateState {
        match self {
            Status::NotLoaded => GateState::NotLoaded,
            Status::Loading => GateState::Loading,
            Status::Ready(_) => GateState::Ready,
            Status::Failed(_) => GateState::Failed,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, Status::Ready(_) | Status::Failed(_))
    }
}

/// Injectable gate in front of the compiler service.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct DependencyGate {
    loader: Arc<dyn CompilerLoader>,
    status: Arc<watch::Sender<Status>>,
}

impl fmt::Debug for DependencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGate")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Default for DependencyGate {
    fn default() -> Self {
        Self::new(BuiltinLoader)
    }
}

impl DependencyGate {
    /// Create a gate in [`GateState::NotLoaded`].
    pub fn new(loader: impl CompilerLoader + 'static) -> Self {
        Self::from_arc(Arc::new(loader))
    }

    /// Create a gate from a shared loader.
    pub fn from_arc(loader: Arc<dyn CompilerLoader>) -> Self {
        let (status, _) = watch::channel(Status::NotLoaded);
        Self {
            loader,
            status: Arc::new(status),
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.status.borrow().state()
    }

    /// Wait until the compiler is ready, starting the load if nobody has.
    ///
    /// Resolves only once the gate is `Ready` or `Failed`; a `Failed` gate
    /// rejects immediately until [`retry`](Self::retry) is called.
    pub async fn acquire(&self) -> Result<Arc<dyn Compiler>, GateError> {
        let mut rx = self.status.subscribe();
        self.start_load(|status| matches!(status, Status::NotLoaded));

        let settled = rx
            .wait_for(Status::is_settled)
            .await
            .map_err(|_| GateError::Closed)?;
        match &*settled {
            Status::Ready(compiler) => Ok(Arc::clone(compiler)),
            Status::Failed(reason) => Err(GateError::Unavailable(reason.clone())),
            Status::NotLoaded | Status::Loading => Err(GateError::Closed),
        }
    }

    /// Start a new load after a failure. Returns whether a load was started;
    /// a gate that is loading or ready is left alone.
    pub fn retry(&self) -> bool {
        self.start_load(|status| matches!(status, Status::NotLoaded | Status::Failed(_)))
    }

    /// Return a settled gate to `NotLoaded`. Returns whether the state changed.
    pub fn reset(&self) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if status.is_settled() {
                *status = Status::NotLoaded;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!("dependency gate reset");
        }
        changed
    }

    fn start_load(&self, can_start: impl FnOnce(&Status) -> bool) -> bool {
        let started = self.status.send_if_modified(|status| {
            if can_start(&*status) {
                *status = Status::Loading;
                true
            } else {
                false
            }
        });
        if !started {
            return false;
        }

        tracing::debug!("loading compiler service");
        let loader = Arc::clone(&self.loader);
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            let load = AssertUnwindSafe(async move { loader.load().await }).catch_unwind();
            let next = match load.await {
                Ok(Ok(compiler)) => {
                    tracing::info!("compiler service ready");
                    Status::Ready(compiler)
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "compiler service failed to load");
                    Status::Failed(e.to_string())
                }
                Err(_) => {
                    tracing::error!("compiler loader panicked");
                    Status::Failed("compiler loader panicked".to_string())
                }
            };
            status.send_modify(|current| {
                if matches!(current, Status::Loading) {
                    *current = next;
                }
            });
        });
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyLoader {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl CompilerLoader for FlakyLoader {
        async fn load(&self) -> Result<Arc<dyn Compiler>, LoadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(LoadError::new("script error"))
            } else {
                Ok(Arc::new(NativeCompiler))
            }
        }
    }

    fn flaky(fail_first: usize) -> Arc<FlakyLoader> {
        Arc::new(FlakyLoader {
            calls: AtomicUsize::new(0),
            fail_first,
        })
    }

    #[tokio::test]
    async fn test_first_acquire_loads() {
        let gate = DependencyGate::default();
        assert_eq!(gate.state(), GateState::NotLoaded);

        gate.acquire().await.unwrap();
        assert_eq!(gate.state(), GateState::Ready);
    }

    #[tokio::test]
    async fn test_ready_gate_does_not_reload() {
        let loader = flaky(0);
        let gate = DependencyGate::from_arc(loader.clone());

        gate.acquire().await.unwrap();
        gate.acquire().await.unwrap();
        assert!(!gate.retry());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_gate_rejects_until_retry() {
        let loader = flaky(1);
        let gate = DependencyGate::from_arc(loader.clone());

        let err = gate.acquire().await.err().unwrap();
        assert_eq!(err, GateError::Unavailable("script error".into()));
        assert_eq!(gate.state(), GateState::Failed);

        // Still failed: no new load without an explicit retry.
        assert!(gate.acquire().await.is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        assert!(gate.retry());
        gate.acquire().await.unwrap();
        assert_eq!(gate.state(), GateState::Ready);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_returns_to_not_loaded() {
        let gate = DependencyGate::default();
        assert!(!gate.reset());

        gate.acquire().await.unwrap();
        assert!(gate.reset());
        assert_eq!(gate.state(), GateState::NotLoaded);
    }

    #[test]
    fn test_gate_error_messages() {
        assert_eq!(
            GateError::Unavailable("404".into()).to_string(),
            "compiler service unavailable: 404"
        );
        assert_eq!(GateState::NotLoaded.to_string(), "not_loaded");
    }
}
