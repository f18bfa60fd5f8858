//! Model lifecycle
//!
//! A handle is the only mutable piece of a served model. Requests take a
//! clone of the inner `Arc` while holding the read lock for an instant, so
//! `stop()` never waits for inference and in-flight requests keep their
//! resources until they finish.

use hfserve_types::{Result, ServeError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Lifecycle state of a handle. Handles are created ready; the only
/// transition is to `Stopped`.
#[derive(Debug)]
pub enum HandleState<T> {
    Ready(Arc<T>),
    Stopped,
}

/// Owns the loaded state of one model
#[derive(Debug)]
pub struct ModelHandle<T> {
    name: String,
    state: RwLock<HandleState<T>>,
}

impl<T> ModelHandle<T> {
    /// Handle that is ready to serve `inner`
    pub fn ready(name: impl Into<String>, inner: T) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(HandleState::Ready(Arc::new(inner))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admit a request: returns the loaded state or `ModelNotReady`
    pub fn acquire(&self) -> Result<Arc<T>> {
        match &*self.state.read() {
            HandleState::Ready(inner) => Ok(Arc::clone(inner)),
            HandleState::Stopped => Err(ServeError::model_not_ready(format!(
                "Model {} has been stopped",
                self.name
            ))),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), HandleState::Ready(_))
    }

    /// Release the loaded state. Returns false when already stopped.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.write(), HandleState::Stopped);
        let was_running = !matches!(previous, HandleState::Stopped);
        if was_running {
            info!(model = %self.name, "Model stopped");
        }
        was_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_after_stop_are_not_ready() {
        let handle = ModelHandle::ready("m", 7u32);
        let held = handle.acquire().unwrap();
        assert!(handle.stop());
        assert!(!handle.stop());

        // In-flight holders keep their state
        assert_eq!(*held, 7);
        let err = handle.acquire().unwrap_err();
        assert!(matches!(err, ServeError::ModelNotReady { .. }));
        assert!(err.to_string().contains("stopped"));
    }

    #[test]
    fn ready_handle_shares_one_state() {
        let handle = ModelHandle::ready("m", String::from("weights"));
        assert!(handle.is_ready());
        assert_eq!(handle.name(), "m");

        let first = handle.acquire().unwrap();
        let second = handle.acquire().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
