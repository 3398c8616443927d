//! Cancellation support for long-running algorithms.
//!
//! The overdraw ray tracer can run for a while on large meshes; callers
//! that need to abort pass a [`CancelToken`] in the options. The tracer
//! polls it between image rows and returns
//! [`Error::Cancelled`](crate::error::Error::Cancelled) once it trips.
//!
//! # Example
//!
//! ```ignore
//! use triorder::algo::CancelToken;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let stop = Arc::new(AtomicBool::new(false));
//! let flag = stop.clone();
//! let token = CancelToken::new(move || flag.load(Ordering::Relaxed));
//! ```

use std::sync::Arc;

/// A cancellation predicate polled by long-running operations.
///
/// The predicate returns `true` once the caller wants the operation to
/// stop. It may be called from worker threads, so it must be `Send + Sync`.
/// Tokens are cheap to clone; clones share the same predicate.
#[derive(Clone)]
pub struct CancelToken {
    predicate: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl CancelToken {
    /// Create a token from the given predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Whether the caller has requested cancellation.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        (self.predicate)()
    }

    /// Create a token that never cancels.
    pub fn none() -> Self {
        Self::new(|| false)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").finish_non_exhaustive()
    }
}
