//! Adapter seam between the orchestration code and a concrete browser engine.
//!
//! The orchestration only ever talks to these traits. The `chromium` feature provides a
//! DevTools-protocol implementation; tests drive scripted in-memory implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::browser::log::BrowserLog;
use crate::foundation::error::HeadlessResult;

/// Capacity of each page's event channel.
pub const PAGE_EVENT_CAPACITY: usize = 256;

/// Out-of-band notifications emitted by a page.
#[derive(Clone, Debug)]
pub enum PageEvent {
    /// A console message.
    Console(BrowserLog),
    /// An exception escaped to the page's top level.
    Exception {
        /// Exception message.
        message: String,
        /// Page-side stack trace, when reported.
        stack: Option<String>,
    },
    /// The renderer process died or the page target went away.
    Crashed {
        /// Engine-provided reason.
        reason: String,
    },
}

/// Launch-time browser configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// OpenGL backend passed as `--use-gl`.
    pub gl: Option<String>,
    /// Accept invalid TLS certificates.
    pub ignore_certificate_errors: bool,
    /// Disable same-origin checks.
    pub disable_web_security: bool,
    /// Override the user agent string.
    pub user_agent: Option<String>,
    /// Initial viewport size in CSS pixels.
    pub window_size: Option<(u32, u32)>,
    /// Force a device scale factor.
    pub device_scale_factor: Option<f64>,
    /// Extra command-line switches, passed verbatim.
    pub args: Vec<String>,
    /// Log browser process and protocol activity as `debug` events on the `browser` target.
    pub dump_io: bool,
    /// Deadline for each protocol request. Sessions set it from the call timeout.
    #[serde(skip)]
    pub request_timeout: Option<Duration>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            gl: None,
            ignore_certificate_errors: false,
            disable_web_security: false,
            user_agent: None,
            window_size: None,
            device_scale_factor: None,
            args: Vec::new(),
            dump_io: false,
            request_timeout: None,
        }
    }
}

impl LaunchOptions {
    /// Copy of these options for one session: `verbose` turns on `dump_io`, and every
    /// protocol request is bounded by `timeout`.
    pub fn for_session(&self, verbose: bool, timeout: Duration) -> Self {
        Self {
            dump_io: self.dump_io || verbose,
            request_timeout: Some(timeout),
            ..self.clone()
        }
    }

    /// Command-line switches implied by these options, in a stable order.
    pub fn chromium_args(&self) -> Vec<String> {
        let mut out = vec![
            "--no-first-run".to_owned(),
            "--no-default-browser-check".to_owned(),
            "--autoplay-policy=no-user-gesture-required".to_owned(),
            "--disable-background-timer-throttling".to_owned(),
            "--disable-renderer-backgrounding".to_owned(),
        ];
        if let Some(gl) = &self.gl {
            out.push(format!("--use-gl={gl}"));
        }
        if self.ignore_certificate_errors {
            out.push("--ignore-certificate-errors".to_owned());
        }
        if self.disable_web_security {
            out.push("--disable-web-security".to_owned());
        }
        if let Some(ua) = &self.user_agent {
            out.push(format!("--user-agent={ua}"));
        }
        if let Some(scale) = self.device_scale_factor {
            out.push(format!("--force-device-scale-factor={scale}"));
        }
        out.extend(self.args.iter().cloned());
        out
    }
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser, using `executable` instead of the engine's default lookup when set.
    ///
    /// Failures map to [`crate::HeadlessError::BrowserLaunch`].
    async fn launch(
        &self,
        executable: Option<&Path>,
        options: &LaunchOptions,
    ) -> HeadlessResult<Arc<dyn Browser>>;
}

/// A running browser. Implementations must tolerate concurrent `new_page` calls.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh blank page.
    async fn new_page(&self) -> HeadlessResult<Arc<dyn Page>>;
    /// Terminate the browser and every page on it.
    async fn close(&self) -> HeadlessResult<()>;
}

/// One page (tab) of a browser.
#[async_trait]
pub trait Page: Send + Sync {
    /// Register a script that runs before any page script on every navigation.
    async fn add_init_script(&self, source: &str) -> HeadlessResult<()>;
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> HeadlessResult<()>;
    /// Evaluate `expression`, awaiting a returned promise, and return the result by value.
    ///
    /// An exception thrown by the expression maps to [`crate::HeadlessError::Script`]; a page
    /// that dies while evaluating maps to [`crate::HeadlessError::PageCrash`].
    async fn evaluate(&self, expression: &str) -> HeadlessResult<serde_json::Value>;
    /// Subscribe to this page's events. Dropping the receiver removes the listener.
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
    /// Close the page.
    async fn close(&self) -> HeadlessResult<()>;
}

#[cfg(test)]
#[path = "../../tests/unit/browser/driver.rs"]
mod tests;
