use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::browser::driver::{Page, PageEvent};
use crate::foundation::error::{HeadlessError, HeadlessResult};

/// Call `function` (JavaScript function source) inside the page with JSON `args`.
///
/// The page's event listener is registered before the call is dispatched, so a crash or an
/// uncaught exception that fires while the call is in flight always rejects it, even when
/// the evaluation itself would never settle.
pub async fn evaluate<T: DeserializeOwned>(
    page: &dyn Page,
    function: &str,
    args: &[serde_json::Value],
    frame: Option<u64>,
    timeout: Duration,
) -> HeadlessResult<T> {
    let mut events = page.subscribe();
    let expression = call_expression(function, args)?;

    let value = tokio::select! {
        biased;
        fatal = next_fatal_event(&mut events) => return Err(fatal.at_frame(frame)),
        result = page.evaluate(&expression) => result.map_err(|e| e.at_frame(frame))?,
        _ = tokio::time::sleep(timeout) => {
            return Err(HeadlessError::timeout("page evaluation", timeout));
        }
    };

    serde_json::from_value(value)
        .map_err(|e| HeadlessError::serde(format!("decode page evaluation result: {e}")))
}

/// Build the awaited expression that applies `function` to `args`.
pub fn call_expression(function: &str, args: &[serde_json::Value]) -> HeadlessResult<String> {
    let args = serde_json::to_string(args)
        .map_err(|e| HeadlessError::serde(format!("encode evaluation arguments: {e}")))?;
    Ok(format!(
        "(async () => {{ const fn_ = ({function}); return await fn_(...{args}); }})()"
    ))
}

/// Wait for the first event that must abort in-flight work on the page.
pub(crate) async fn next_fatal_event(events: &mut broadcast::Receiver<PageEvent>) -> HeadlessError {
    loop {
        match events.recv().await {
            Ok(PageEvent::Crashed { reason }) => return HeadlessError::page_crash(reason),
            Ok(PageEvent::Exception { message, stack }) => {
                return HeadlessError::Script {
                    message,
                    stack,
                    frame: None,
                };
            }
            Ok(PageEvent::Console(_)) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                return HeadlessError::page_crash("page closed while work was in flight");
            }
        }
    }
}

/// Long-lived crash listener covering a whole multi-step pipeline on one page.
///
/// The listener is attached at construction; [`ExceptionWatcher::guard`] races the pipeline
/// against it and the crash signal wins once fired. Dropping the watcher removes the listener.
pub struct ExceptionWatcher {
    signal: oneshot::Receiver<HeadlessError>,
    task: JoinHandle<()>,
}

impl ExceptionWatcher {
    /// Start listening on `page`. `frame` is attached to reported script errors.
    pub fn spawn(page: &dyn Page, frame: Option<u64>) -> Self {
        let mut events = page.subscribe();
        let (tx, signal) = oneshot::channel();
        let task = tokio::spawn(async move {
            let fatal = next_fatal_event(&mut events).await;
            let _ = tx.send(fatal.at_frame(frame));
        });
        Self { signal, task }
    }

    /// Run `pipeline`, failing fast if the page crashes or throws first.
    pub async fn guard<T, F>(mut self, pipeline: F) -> HeadlessResult<T>
    where
        F: Future<Output = HeadlessResult<T>>,
    {
        let signal = &mut self.signal;
        tokio::select! {
            biased;
            Ok(fatal) = signal => Err(fatal),
            result = pipeline => result,
        }
    }
}

impl Drop for ExceptionWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/browser/evaluate.rs"]
mod tests;
