//! Chrome DevTools Protocol backend for the browser adapter traits.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    EvaluateParams, EventConsoleApiCalled, EventExceptionThrown, RemoteObject, StackTrace,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt as _;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::browser::driver::{
    Browser, BrowserLauncher, LaunchOptions, PAGE_EVENT_CAPACITY, Page, PageEvent,
};
use crate::browser::log::{BrowserLog, ConsoleType, StackFrame};
use crate::foundation::error::{HeadlessError, HeadlessResult};

/// Per-request deadline chromiumoxide applies when none is configured.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches a local Chromium through `chromiumoxide`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        executable: Option<&Path>,
        options: &LaunchOptions,
    ) -> HeadlessResult<Arc<dyn Browser>> {
        let mut builder = BrowserConfig::builder().args(options.chromium_args());
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        if let Some((w, h)) = options.window_size {
            builder = builder.window_size(w, h);
        }
        let request_timeout = options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        builder = builder.request_timeout(request_timeout);
        let config = builder.build().map_err(HeadlessError::browser_launch)?;

        let dump_io = options.dump_io;
        if dump_io {
            debug!(
                target: "browser",
                executable = ?executable,
                args = ?options.chromium_args(),
                ?request_timeout,
                "launching chromium"
            );
        }

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| HeadlessError::browser_launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    if dump_io {
                        debug!(target: "browser", error = %e, "devtools handler event failed");
                    } else {
                        trace!(error = %e, "devtools handler event failed");
                    }
                }
            }
        });

        Ok(Arc::new(ChromiumBrowser {
            inner: tokio::sync::Mutex::new(browser),
            handler: parking_lot::Mutex::new(Some(handler_task)),
            request_timeout,
            dump_io,
        }))
    }
}

struct ChromiumBrowser {
    inner: tokio::sync::Mutex<CdpBrowser>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
    dump_io: bool,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> HeadlessResult<Arc<dyn Page>> {
        let page = self
            .inner
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(cdp_error)?;
        Ok(Arc::new(
            ChromiumPage::attach(page, self.request_timeout).await?,
        ))
    }

    async fn close(&self) -> HeadlessResult<()> {
        let mut browser = self.inner.lock().await;
        browser.close().await.map_err(cdp_error)?;
        match browser.wait().await {
            Ok(status) if self.dump_io => {
                debug!(target: "browser", ?status, "browser process exited");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "waiting for the browser process failed"),
        }
        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        Ok(())
    }
}

struct ChromiumPage {
    page: CdpPage,
    events: broadcast::Sender<PageEvent>,
    listeners: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl ChromiumPage {
    async fn attach(page: CdpPage, request_timeout: Duration) -> HeadlessResult<Self> {
        let (events, _) = broadcast::channel(PAGE_EVENT_CAPACITY);
        page.execute(InspectorEnableParams::default())
            .await
            .map_err(cdp_error)?;

        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(cdp_error)?;
        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(cdp_error)?;
        let mut crashes = page
            .event_listener::<EventTargetCrashed>()
            .await
            .map_err(cdp_error)?;

        let tx = events.clone();
        let console_task = tokio::spawn(async move {
            while let Some(ev) = console.next().await {
                let log = BrowserLog {
                    text: ev
                        .args
                        .iter()
                        .map(remote_object_text)
                        .collect::<Vec<_>>()
                        .join(" "),
                    log_type: ConsoleType::from_name(&format!("{:?}", ev.r#type)),
                    stack_trace: ev.stack_trace.as_ref().map(stack_frames).unwrap_or_default(),
                };
                let _ = tx.send(PageEvent::Console(log));
            }
        });

        let tx = events.clone();
        let exception_task = tokio::spawn(async move {
            while let Some(ev) = exceptions.next().await {
                let details = &ev.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                let _ = tx.send(PageEvent::Exception {
                    message,
                    stack: details.stack_trace.as_ref().map(format_stack),
                });
            }
        });

        let tx = events.clone();
        let crash_task = tokio::spawn(async move {
            if crashes.next().await.is_some() {
                let _ = tx.send(PageEvent::Crashed {
                    reason: "renderer process crashed".to_owned(),
                });
            }
        });

        Ok(Self {
            page,
            events,
            listeners: parking_lot::Mutex::new(vec![console_task, exception_task, crash_task]),
            request_timeout,
        })
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn add_init_script(&self, source: &str) -> HeadlessResult<()> {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(source)
            .build()
            .map_err(|e| HeadlessError::config(format!("init script: {e}")))?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> HeadlessResult<()> {
        match self.page.goto(url).await {
            Ok(_) => Ok(()),
            Err(CdpError::Timeout) => Err(HeadlessError::timeout(
                "navigation",
                self.request_timeout,
            )),
            Err(e) => Err(anyhow::anyhow!("navigate to '{url}': {e}").into()),
        }
    }

    async fn evaluate(&self, expression: &str) -> HeadlessResult<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| HeadlessError::config(format!("evaluate params: {e}")))?;
        match self.page.evaluate_expression(params).await {
            Ok(result) => Ok(result.value().cloned().unwrap_or(serde_json::Value::Null)),
            Err(CdpError::JavascriptException(details)) => Err(HeadlessError::Script {
                message: details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone()),
                stack: details.stack_trace.as_ref().map(format_stack),
                frame: None,
            }),
            Err(e) => Err(request_error(e, "page evaluation", self.request_timeout)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> HeadlessResult<()> {
        for task in self.listeners.lock().drain(..) {
            task.abort();
        }
        self.page.clone().close().await.map_err(cdp_error)
    }
}

fn remote_object_text(obj: &RemoteObject) -> String {
    match &obj.value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => obj.description.clone().unwrap_or_default(),
    }
}

fn stack_frames(trace: &StackTrace) -> Vec<StackFrame> {
    trace
        .call_frames
        .iter()
        .map(|f| StackFrame {
            url: f.url.clone(),
            function_name: f.function_name.clone(),
            line: u32::try_from(f.line_number).unwrap_or(0),
            column: u32::try_from(f.column_number).unwrap_or(0),
        })
        .collect()
}

fn format_stack(trace: &StackTrace) -> String {
    stack_frames(trace)
        .iter()
        .map(|f| {
            let name = if f.function_name.is_empty() {
                "<anonymous>"
            } else {
                f.function_name.as_str()
            };
            format!("    at {name} ({}:{}:{})", f.url, f.line + 1, f.column + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify a failed evaluation request: the protocol deadline is a timeout, anything
/// else means the page is gone.
fn request_error(e: CdpError, stage: &'static str, after: Duration) -> HeadlessError {
    match e {
        CdpError::Timeout => HeadlessError::timeout(stage, after),
        e => HeadlessError::page_crash(e.to_string()),
    }
}

fn cdp_error(e: CdpError) -> HeadlessError {
    HeadlessError::Other(anyhow::anyhow!("devtools protocol: {e}"))
}

#[cfg(test)]
#[path = "../../tests/unit/browser/chromium.rs"]
mod tests;
