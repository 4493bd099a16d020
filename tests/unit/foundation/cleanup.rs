use std::sync::Arc;

use futures::FutureExt as _;
use parking_lot::Mutex;

use super::*;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(
    log: &Log,
    name: &'static str,
    fail: bool,
) -> impl FnOnce() -> BoxFuture<'static, HeadlessResult<()>> + Send + 'static {
    let log = log.clone();
    move || {
        async move {
            log.lock().push(name);
            if fail {
                Err(HeadlessError::page_crash(format!("{name} failed")))
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}

#[tokio::test]
async fn runs_in_reverse_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("page", recorder(&log, "page", false));
    stack.push("server", recorder(&log, "server", false));
    assert_eq!(stack.len(), 2);

    let failures = stack.run().await;
    assert!(failures.is_empty());
    assert_eq!(*log.lock(), vec!["server", "page"]);
}

#[tokio::test]
async fn failing_disposer_does_not_stop_the_rest() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("page", recorder(&log, "page", false));
    stack.push("server", recorder(&log, "server", true));

    let failures = stack.run().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(*log.lock(), vec!["server", "page"]);
}

#[tokio::test]
async fn finish_keeps_pipeline_error_as_primary() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("page", recorder(&log, "page", true));

    let result: HeadlessResult<()> = stack.finish(Err(HeadlessError::script("boom"))).await;
    let err = result.unwrap_err();
    assert!(matches!(err.root_cause(), HeadlessError::Script { .. }));
    let HeadlessError::Cleanup { failures, .. } = err else {
        panic!("expected cleanup error");
    };
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn finish_passes_through_clean_outcomes() {
    let ok = CleanupStack::new().finish(Ok(7)).await.unwrap();
    assert_eq!(ok, 7);

    let err = CleanupStack::new()
        .finish::<()>(Err(HeadlessError::config("bad")))
        .await
        .unwrap_err();
    assert!(matches!(err, HeadlessError::Config(_)));
}

#[tokio::test]
async fn finish_reports_disposal_failure_after_success() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("server", recorder(&log, "server", true));

    let err = stack.finish(Ok(1)).await.unwrap_err();
    assert!(matches!(err, HeadlessError::Cleanup { primary: None, .. }));
}
