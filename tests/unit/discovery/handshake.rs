use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use super::*;
use crate::browser::driver::PageEvent;

type Responder = Box<dyn Fn(&str) -> HeadlessResult<Value> + Send + Sync>;

/// Page answering evaluations through a closure; `goto` fails a set number of times.
struct ExprPage {
    events: broadcast::Sender<PageEvent>,
    respond: Responder,
    goto_failures: AtomicU32,
    goto_error: fn() -> HeadlessError,
    gotos: AtomicU32,
    scripts: Mutex<Vec<String>>,
    expressions: Mutex<Vec<String>>,
}

impl ExprPage {
    fn new(respond: impl Fn(&str) -> HeadlessResult<Value> + Send + Sync + 'static) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            respond: Box::new(respond),
            goto_failures: AtomicU32::new(0),
            goto_error: || HeadlessError::Other(anyhow::anyhow!("net::ERR_ABORTED")),
            gotos: AtomicU32::new(0),
            scripts: Mutex::new(Vec::new()),
            expressions: Mutex::new(Vec::new()),
        }
    }

    fn bundle() -> Self {
        Self::new(|_| Ok(Value::Bool(true)))
    }

    fn failing_goto(mut self, times: u32, error: fn() -> HeadlessError) -> Self {
        self.goto_failures = AtomicU32::new(times);
        self.goto_error = error;
        self
    }
}

#[async_trait]
impl Page for ExprPage {
    async fn add_init_script(&self, source: &str) -> HeadlessResult<()> {
        self.scripts.lock().push(source.to_owned());
        Ok(())
    }

    async fn goto(&self, _url: &str) -> HeadlessResult<()> {
        self.gotos.fetch_add(1, Ordering::SeqCst);
        let left = self.goto_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.goto_failures.store(left - 1, Ordering::SeqCst);
            return Err((self.goto_error)());
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> HeadlessResult<Value> {
        self.expressions.lock().push(expression.to_owned());
        (self.respond)(expression)
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> HeadlessResult<()> {
        Ok(())
    }
}

fn injection<'a>(
    props: &'a Value,
    env: &'a BTreeMap<String, String>,
    contract: &'a PageContract,
) -> Injection<'a> {
    Injection {
        serve_url: "http://localhost:3000",
        input_props: props,
        env_variables: env,
        initial_frame: 0,
        proxy_port: 4321,
        audio_enabled: false,
        video_enabled: false,
        contract,
        timeout: Duration::from_secs(1),
    }
}

#[test]
fn init_script_assigns_every_global() {
    let props = json!({"title": "hello"});
    let env = BTreeMap::from([("MODE".to_owned(), "test".to_owned())]);
    let contract = PageContract::default();
    let script = init_script(&injection(&props, &env, &contract)).unwrap();

    assert!(script.contains(r#"window["wavyte_inputProps"] = {"title":"hello"};"#));
    assert!(script.contains(r#"window["wavyte_envVariables"] = {"MODE":"test"};"#));
    assert!(script.contains(r#"window["wavyte_initialFrame"] = 0;"#));
    assert!(script.contains(r#"window["wavyte_proxyPort"] = 4321;"#));
    assert!(script.contains(r#"window["wavyte_audioEnabled"] = false;"#));
    assert!(script.contains(r#"window["wavyte_videoEnabled"] = false;"#));
}

#[tokio::test]
async fn non_object_props_fail_before_navigation() {
    let page = ExprPage::bundle();
    let props = json!([1, 2]);
    let env = BTreeMap::new();
    let contract = PageContract::default();
    let err = set_props_and_env(&page, &injection(&props, &env, &contract), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, HeadlessError::Config(_)));
    assert_eq!(page.gotos.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn navigation_races_are_retried_within_budget() {
    let page = ExprPage::bundle().failing_goto(2, || {
        HeadlessError::Other(anyhow::anyhow!("navigation interrupted"))
    });
    let props = json!({});
    let env = BTreeMap::new();
    let contract = PageContract::default();
    set_props_and_env(&page, &injection(&props, &env, &contract), 2)
        .await
        .unwrap();
    assert_eq!(page.gotos.load(Ordering::SeqCst), 3);
    assert_eq!(page.scripts.lock().len(), 1);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let page = ExprPage::bundle().failing_goto(3, || {
        HeadlessError::Other(anyhow::anyhow!("navigation interrupted"))
    });
    let props = json!({});
    let env = BTreeMap::new();
    let contract = PageContract::default();
    let err = set_props_and_env(&page, &injection(&props, &env, &contract), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, HeadlessError::Other(_)));
    assert_eq!(page.gotos.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn crashed_pages_are_not_retried() {
    let page = ExprPage::bundle().failing_goto(1, || HeadlessError::page_crash("target closed"));
    let props = json!({});
    let env = BTreeMap::new();
    let contract = PageContract::default();
    let err = set_props_and_env(&page, &injection(&props, &env, &contract), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, HeadlessError::PageCrash(_)));
    assert_eq!(page.gotos.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn incompatible_page_is_a_script_error() {
    let page = ExprPage::new(|_| Ok(Value::Bool(false)));
    let props = json!({});
    let env = BTreeMap::new();
    let contract = PageContract::default();
    let err = set_props_and_env(&page, &injection(&props, &env, &contract), 1)
        .await
        .unwrap_err();
    let HeadlessError::Script { message, .. } = err else {
        panic!("expected script error");
    };
    assert!(message.contains("wavyte_setBundleMode"));
    assert_eq!(page.gotos.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bundle_mode_payloads() {
    let page = ExprPage::new(|_| Ok(Value::Null));
    let contract = PageContract::default();
    set_bundle_mode(&page, &contract, &BundleMode::Evaluation, Duration::from_secs(1))
        .await
        .unwrap();
    set_bundle_mode(
        &page,
        &contract,
        &BundleMode::Composition {
            composition_name: "intro".to_owned(),
        },
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    let seen = page.expressions.lock();
    assert!(seen[0].contains(r#"window["wavyte_setBundleMode"]"#));
    assert!(seen[0].contains(r#"[{"type":"evaluation"}]"#));
    assert!(seen[1].contains(r#""type":"composition""#));
    assert!(seen[1].contains(r#""compositionName":"intro""#));
}

#[tokio::test]
async fn waits_until_ready_flag_flips() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let page = ExprPage::new(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(if n >= 2 { Value::Bool(true) } else { Value::Null })
    });
    wait_for_ready(&page, &PageContract::default(), None, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn never_ready_is_a_readiness_timeout() {
    let page = ExprPage::new(|_| Ok(Value::Bool(false)));
    let err = wait_for_ready(
        &page,
        &PageContract::default(),
        None,
        Duration::from_millis(150),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        HeadlessError::Timeout {
            stage: "readiness",
            ..
        }
    ));
}

#[tokio::test]
async fn readiness_probe_errors_propagate() {
    let page = ExprPage::new(|_| Err(HeadlessError::script("boom")));
    let err = wait_for_ready(
        &page,
        &PageContract::default(),
        Some(4),
        Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HeadlessError::Script { frame: Some(4), .. }));
}
