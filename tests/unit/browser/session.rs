use std::sync::atomic::AtomicUsize;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::*;

struct QuietPage {
    events: broadcast::Sender<PageEvent>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Page for QuietPage {
    async fn add_init_script(&self, _source: &str) -> HeadlessResult<()> {
        Ok(())
    }

    async fn goto(&self, _url: &str) -> HeadlessResult<()> {
        Ok(())
    }

    async fn evaluate(&self, _expression: &str) -> HeadlessResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> HeadlessResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct QuietBrowser {
    pages_closed: Arc<AtomicUsize>,
    closed: AtomicUsize,
}

#[async_trait]
impl Browser for QuietBrowser {
    async fn new_page(&self) -> HeadlessResult<Arc<dyn Page>> {
        let (events, _) = broadcast::channel(8);
        Ok(Arc::new(QuietPage {
            events,
            closed: self.pages_closed.clone(),
        }))
    }

    async fn close(&self) -> HeadlessResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RefusingLauncher;

#[async_trait]
impl BrowserLauncher for RefusingLauncher {
    async fn launch(
        &self,
        _executable: Option<&Path>,
        _options: &LaunchOptions,
    ) -> HeadlessResult<Arc<dyn Browser>> {
        Err(HeadlessError::browser_launch("no browser here"))
    }
}

async fn borrowed_session(browser: &Arc<QuietBrowser>) -> PageSession {
    let existing: Arc<dyn Browser> = browser.clone();
    acquire_page(
        Some(existing),
        &RefusingLauncher,
        None,
        &LaunchOptions::default(),
        Duration::from_secs(1),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn borrowed_browser_survives_disposal() {
    let browser = Arc::new(QuietBrowser::default());
    let session = borrowed_session(&browser).await;
    assert_eq!(session.browser_ownership(), Ownership::Borrowed);

    session.dispose().await.unwrap();
    session.dispose().await.unwrap();
    assert!(session.is_disposed());
    assert_eq!(browser.pages_closed.load(Ordering::SeqCst), 1);
    assert_eq!(browser.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn source_maps_are_attached_to_the_session() {
    let browser = Arc::new(QuietBrowser::default());
    let session = borrowed_session(&browser).await;
    assert!(session.source_maps().is_none());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bundle.js.map"), r#"{"version":3}"#).unwrap();
    session.attach_source_maps(Arc::new(SourceMapProvider::for_root(dir.path())));

    let maps = session.source_maps().unwrap();
    let map = maps.load("bundle.js").unwrap().unwrap();
    assert!(map.contains("\"version\":3"));
}

#[tokio::test]
async fn forwarders_are_detached_on_dispose() {
    let browser = Arc::new(QuietBrowser::default());
    let session = borrowed_session(&browser).await;

    session.forward_logs(None, false, false);
    assert_eq!(session.log_forwarder_count(), 0);

    session.forward_logs(Some(Arc::new(|_: &crate::browser::log::BrowserLog| {})), true, true);
    assert_eq!(session.log_forwarder_count(), 1);

    session.dispose().await.unwrap();
    assert_eq!(session.log_forwarder_count(), 0);
}
