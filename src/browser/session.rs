use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser::driver::{Browser, BrowserLauncher, LaunchOptions, Page, PageEvent};
use crate::browser::log::LogCallback;
use crate::foundation::core::Ownership;
use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::server::source_map::SourceMapProvider;

/// A page plus everything needed to tear it down.
///
/// The page always belongs to the session. The browser belongs to it only when the session
/// launched it; a caller-supplied browser is left running on [`PageSession::dispose`].
pub struct PageSession {
    page: Arc<dyn Page>,
    browser: Arc<dyn Browser>,
    browser_ownership: Ownership,
    log_forwarders: Mutex<Vec<JoinHandle<()>>>,
    source_maps: Mutex<Option<Arc<SourceMapProvider>>>,
    disposed: AtomicBool,
}

/// Open a page, launching a browser first unless `existing` is supplied.
///
/// A launched browser is closed again if the page cannot be created on it.
pub async fn acquire_page(
    existing: Option<Arc<dyn Browser>>,
    launcher: &dyn BrowserLauncher,
    executable: Option<&Path>,
    options: &LaunchOptions,
    timeout: Duration,
) -> HeadlessResult<PageSession> {
    let browser_ownership = Ownership::of(&existing);
    let browser = match existing {
        Some(browser) => browser,
        None => {
            if let Some(path) = executable
                && !path.exists()
            {
                return Err(HeadlessError::browser_launch(format!(
                    "browser executable '{}' does not exist",
                    path.display()
                )));
            }
            debug!(executable = ?executable, "launching browser");
            tokio::time::timeout(timeout, launcher.launch(executable, options))
                .await
                .map_err(|_| HeadlessError::timeout("browser launch", timeout))??
        }
    };

    let page = match tokio::time::timeout(timeout, browser.new_page()).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => return Err(release_after_failure(&browser, browser_ownership, e).await),
        Err(_) => {
            let e = HeadlessError::timeout("page creation", timeout);
            return Err(release_after_failure(&browser, browser_ownership, e).await);
        }
    };

    Ok(PageSession {
        page,
        browser,
        browser_ownership,
        log_forwarders: Mutex::new(Vec::new()),
        source_maps: Mutex::new(None),
        disposed: AtomicBool::new(false),
    })
}

async fn release_after_failure(
    browser: &Arc<dyn Browser>,
    ownership: Ownership,
    primary: HeadlessError,
) -> HeadlessError {
    if !ownership.should_release() {
        return primary;
    }
    match browser.close().await {
        Ok(()) => primary,
        Err(e) => HeadlessError::Cleanup {
            primary: Some(Box::new(primary)),
            failures: vec![e],
        },
    }
}

impl PageSession {
    /// The managed page.
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// The browser the page lives on.
    pub fn browser(&self) -> &Arc<dyn Browser> {
        &self.browser
    }

    /// Whether the browser is torn down together with the page.
    pub fn browser_ownership(&self) -> Ownership {
        self.browser_ownership
    }

    /// Source maps of the bundle the page is showing, once a server is attached.
    pub fn source_maps(&self) -> Option<Arc<SourceMapProvider>> {
        self.source_maps.lock().clone()
    }

    /// Remember the source maps of the bundle served to this page.
    pub fn attach_source_maps(&self, provider: Arc<SourceMapProvider>) {
        *self.source_maps.lock() = Some(provider);
    }

    /// Forward console messages to `callback` until [`Self::detach_logs`] or disposal.
    ///
    /// With `verbose`, messages are also emitted as `debug` events on the `browser` target,
    /// indented when `indent` is set.
    pub fn forward_logs(&self, callback: Option<LogCallback>, verbose: bool, indent: bool) {
        if callback.is_none() && !verbose {
            return;
        }
        let mut events = self.page.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PageEvent::Console(log)) => {
                        if verbose {
                            debug!(
                                target: "browser",
                                kind = ?log.log_type,
                                "{}",
                                log.display_line(indent)
                            );
                        }
                        if let Some(cb) = &callback {
                            cb(&log);
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.log_forwarders.lock().push(task);
    }

    /// Stop every log forwarder registered on this session.
    pub fn detach_logs(&self) {
        for task in self.log_forwarders.lock().drain(..) {
            task.abort();
        }
    }

    /// Number of active log forwarders.
    pub fn log_forwarder_count(&self) -> usize {
        self.log_forwarders.lock().len()
    }

    /// Return `true` once [`Self::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Unregister listeners, close the page and, when owned, the browser.
    ///
    /// Idempotent: only the first call does any work.
    pub async fn dispose(&self) -> HeadlessResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.detach_logs();

        let mut failures = Vec::new();
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "closing page failed");
            failures.push(e);
        }
        if self.browser_ownership.should_release() {
            debug!("closing owned browser");
            if let Err(e) = self.browser.close().await {
                warn!(error = %e, "closing browser failed");
                failures.push(e);
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(HeadlessError::Cleanup {
                primary: None,
                failures,
            }),
        }
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.detach_logs();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/browser/session.rs"]
mod tests;
