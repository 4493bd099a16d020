//! Scripted in-memory browser for driving discovery and sampling end to end.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use wavyte_headless::{
    Browser, BrowserLauncher, BrowserLog, ConsoleType, HeadlessError, HeadlessResult,
    LaunchOptions, Page, PageEvent,
};

/// How the fake bundle behaves.
#[derive(Clone)]
pub struct Behavior {
    pub compositions: Value,
    pub ready: bool,
    pub has_setter: bool,
    pub goto_failures: u32,
    pub crash_on_list: bool,
    pub throw_on_list: bool,
    pub fail_page_close: bool,
    pub console_on_goto: Option<String>,
    pub mounts: fn(u64) -> Value,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            compositions: json!([
                {"id": "intro", "width": 1920, "height": 1080, "fps": 30, "durationInFrames": 90},
                {"id": "square", "width": 1080, "height": 1080, "fps": 25, "durationInFrames": 50,
                 "defaultProps": {"title": "hi"}}
            ]),
            ready: true,
            has_setter: true,
            goto_failures: 0,
            crash_on_list: false,
            throw_on_list: false,
            fail_page_close: false,
            console_on_goto: None,
            mounts: |_| json!([]),
        }
    }
}

/// Everything the fake browser observed.
#[derive(Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub browsers_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub gotos: Mutex<Vec<String>>,
    pub init_scripts: Mutex<Vec<String>>,
    pub bundle_modes: Mutex<Vec<Value>>,
    pub seeks: Mutex<Vec<u64>>,
    pub launch_options: Mutex<Vec<LaunchOptions>>,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn browsers_closed(&self) -> usize {
        self.browsers_closed.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }

    pub fn goto_count(&self) -> usize {
        self.gotos.lock().len()
    }
}

pub struct FakeLauncher {
    pub behavior: Behavior,
    pub counters: Arc<Counters>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A browser that was not launched through this launcher, as a caller would supply it.
    pub fn standalone_browser(&self) -> Arc<dyn Browser> {
        Arc::new(FakeBrowser {
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
        })
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        _executable: Option<&std::path::Path>,
        options: &LaunchOptions,
    ) -> HeadlessResult<Arc<dyn Browser>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        self.counters.launch_options.lock().push(options.clone());
        Ok(self.standalone_browser())
    }
}

struct FakeBrowser {
    behavior: Behavior,
    counters: Arc<Counters>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> HeadlessResult<Arc<dyn Page>> {
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        let (events, _) = broadcast::channel(64);
        Ok(Arc::new(FakePage {
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
            events,
            goto_failures: AtomicU32::new(self.behavior.goto_failures),
            frame: AtomicU64::new(0),
        }))
    }

    async fn close(&self) -> HeadlessResult<()> {
        self.counters.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    behavior: Behavior,
    counters: Arc<Counters>,
    events: broadcast::Sender<PageEvent>,
    goto_failures: AtomicU32,
    frame: AtomicU64,
}

/// Extract the JSON argument list from an evaluation expression.
fn call_args(expression: &str) -> Value {
    expression
        .rsplit_once("return await fn_(...")
        .and_then(|(_, rest)| rest.strip_suffix("); })()"))
        .and_then(|args| serde_json::from_str(args).ok())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl Page for FakePage {
    async fn add_init_script(&self, source: &str) -> HeadlessResult<()> {
        self.counters.init_scripts.lock().push(source.to_owned());
        Ok(())
    }

    async fn goto(&self, url: &str) -> HeadlessResult<()> {
        tokio::task::yield_now().await;
        self.counters.gotos.lock().push(url.to_owned());
        let left = self.goto_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.goto_failures.store(left - 1, Ordering::SeqCst);
            return Err(HeadlessError::Other(anyhow::anyhow!(
                "net::ERR_ABORTED navigating to {url}"
            )));
        }
        if let Some(text) = &self.behavior.console_on_goto {
            let _ = self.events.send(PageEvent::Console(BrowserLog {
                text: text.clone(),
                log_type: ConsoleType::Log,
                stack_trace: Vec::new(),
            }));
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> HeadlessResult<Value> {
        tokio::task::yield_now().await;
        if expression.contains("typeof window") {
            return Ok(Value::Bool(self.behavior.has_setter));
        }
        if expression.contains("wavyte_setBundleMode") {
            let mode = call_args(expression).get(0).cloned().unwrap_or_default();
            self.counters.bundle_modes.lock().push(mode);
            return Ok(Value::Null);
        }
        if expression.contains("wavyte_ready") {
            return Ok(Value::Bool(self.behavior.ready));
        }
        if expression.contains("wavyte_getStaticCompositions") {
            if self.behavior.crash_on_list {
                let _ = self.events.send(PageEvent::Crashed {
                    reason: "renderer process gone".to_owned(),
                });
                return futures::future::pending().await;
            }
            if self.behavior.throw_on_list {
                let _ = self.events.send(PageEvent::Exception {
                    message: "ReferenceError: registerRoot is not defined".to_owned(),
                    stack: Some("    at index.js:1:1".to_owned()),
                });
                return futures::future::pending().await;
            }
            return Ok(self.behavior.compositions.clone());
        }
        if expression.contains("wavyte_seek") {
            let frame = call_args(expression)
                .get(0)
                .and_then(Value::as_u64)
                .ok_or_else(|| HeadlessError::script("seek without a frame"))?;
            self.frame.store(frame, Ordering::SeqCst);
            self.counters.seeks.lock().push(frame);
            return Ok(Value::Null);
        }
        if expression.contains("wavyte_collectAssets") {
            return Ok((self.behavior.mounts)(self.frame.load(Ordering::SeqCst)));
        }
        Err(HeadlessError::script(format!(
            "unexpected evaluation: {expression}"
        )))
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> HeadlessResult<()> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_page_close {
            return Err(HeadlessError::Other(anyhow::anyhow!("target already detached")));
        }
        Ok(())
    }
}

/// A free local port, released before returning.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Whether something is listening on `port`.
pub fn port_in_use(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
}
