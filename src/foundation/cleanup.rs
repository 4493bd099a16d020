use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::foundation::error::{HeadlessError, HeadlessResult};

type Disposer = Box<dyn FnOnce() -> BoxFuture<'static, HeadlessResult<()>> + Send>;

/// Disposers registered in acquisition order and executed in reverse.
///
/// Every disposer runs even when an earlier one fails; failures are collected rather than
/// short-circuiting, so a pipeline never leaks the resources acquired before the failing one.
#[derive(Default)]
pub struct CleanupStack {
    entries: Vec<(&'static str, Disposer)>,
}

impl CleanupStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a disposer for a resource that was just acquired.
    pub fn push<F>(&mut self, label: &'static str, dispose: F)
    where
        F: FnOnce() -> BoxFuture<'static, HeadlessResult<()>> + Send + 'static,
    {
        self.entries.push((label, Box::new(dispose)));
    }

    /// Number of registered disposers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every disposer in reverse registration order and return the failures.
    pub async fn run(self) -> Vec<HeadlessError> {
        let mut failures = Vec::new();
        for (label, dispose) in self.entries.into_iter().rev() {
            debug!(resource = label, "disposing");
            if let Err(e) = dispose().await {
                warn!(resource = label, error = %e, "disposal failed");
                failures.push(e);
            }
        }
        failures
    }

    /// Run the stack and merge its outcome with the pipeline result.
    ///
    /// The pipeline error always propagates; disposal failures are attached to it, never
    /// substituted for it.
    pub async fn finish<T>(self, result: HeadlessResult<T>) -> HeadlessResult<T> {
        let failures = self.run().await;
        match (result, failures.is_empty()) {
            (Ok(v), true) => Ok(v),
            (Err(e), true) => Err(e),
            (Ok(_), false) => Err(HeadlessError::Cleanup {
                primary: None,
                failures,
            }),
            (Err(e), false) => Err(HeadlessError::Cleanup {
                primary: Some(Box::new(e)),
                failures,
            }),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/cleanup.rs"]
mod tests;
