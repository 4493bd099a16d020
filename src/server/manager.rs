use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::foundation::core::Ownership;
use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::server::bundle::{BundleSource, PreparedBundle};
use crate::server::http::{AuxState, BundleState, aux_router, bundle_router};
use crate::server::source_map::SourceMapProvider;

/// Options for starting a [`ContentServer`].
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Port for the bundle server. `None` lets the OS pick a free one.
    pub port: Option<u16>,
    /// Expected number of pages fetching from the server at once.
    pub concurrency: usize,
    /// Log every served file.
    pub verbose: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: None,
            concurrency: 1,
            verbose: false,
        }
    }
}

/// A running bundle server plus its auxiliary data server.
pub struct ContentServer {
    serve_url: String,
    aux_port: u16,
    source_maps: Arc<SourceMapProvider>,
    running: Mutex<Option<Running>>,
}

struct Running {
    shutdown: Vec<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
    bundle: PreparedBundle,
}

impl ContentServer {
    /// Prepare `source` and start serving it.
    ///
    /// Remote bundles are not re-served: [`Self::serve_url`] is their URL and only the
    /// auxiliary server is started. An explicit `port` that is taken fails with
    /// [`HeadlessError::ServerStart`].
    pub async fn start(source: &BundleSource, opts: &ServerOptions) -> HeadlessResult<Arc<Self>> {
        let bundle = PreparedBundle::prepare(source)?;
        let mut shutdown = Vec::new();
        let mut tasks = Vec::new();

        let source_maps = Arc::new(match bundle.local_root() {
            Some(root) => SourceMapProvider::for_root(root),
            None => SourceMapProvider::empty(),
        });

        let serve_url = match &bundle {
            PreparedBundle::Remote(url) => {
                if opts.port.is_some() {
                    debug!("remote bundle: desired port ignored");
                }
                url.to_string()
            }
            PreparedBundle::Local { root, .. } => {
                let listener = bind(opts.port).await?;
                let port = local_port(&listener)?;
                let router = bundle_router(BundleState {
                    root: root.clone(),
                    source_maps: source_maps.clone(),
                    verbose: opts.verbose,
                });
                let (tx, task) = spawn_server(listener, router, "bundle");
                shutdown.push(tx);
                tasks.push(task);
                format!("http://localhost:{port}")
            }
        };

        let aux_listener = match bind(None).await {
            Ok(listener) => listener,
            Err(e) => {
                stop(shutdown, tasks).await;
                let _ = bundle.release();
                return Err(e);
            }
        };
        let aux_port = local_port(&aux_listener)?;
        let router = aux_router(AuxState {
            root: bundle.local_root().map(|p| p.to_path_buf()),
            permits: Arc::new(Semaphore::new(opts.concurrency.max(1))),
            verbose: opts.verbose,
        });
        let (tx, task) = spawn_server(aux_listener, router, "aux");
        shutdown.push(tx);
        tasks.push(task);

        debug!(%serve_url, aux_port, "content server started");
        Ok(Arc::new(Self {
            serve_url,
            aux_port,
            source_maps,
            running: Mutex::new(Some(Running {
                shutdown,
                tasks,
                bundle,
            })),
        }))
    }

    /// URL pages navigate to.
    pub fn serve_url(&self) -> &str {
        &self.serve_url
    }

    /// Port of the auxiliary data server.
    pub fn aux_port(&self) -> u16 {
        self.aux_port
    }

    /// Source maps of the served bundle.
    pub fn source_maps(&self) -> &Arc<SourceMapProvider> {
        &self.source_maps
    }

    /// Return `true` until [`Self::shutdown`] has run.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop both listeners, wait for them to exit, and remove any bundle temp dir.
    ///
    /// Idempotent: later calls return `Ok(())` immediately.
    pub async fn shutdown(&self) -> HeadlessResult<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        stop(running.shutdown, running.tasks).await;
        debug!(serve_url = %self.serve_url, "content server stopped");
        running.bundle.release()
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            for tx in running.shutdown {
                let _ = tx.send(());
            }
        }
    }
}

async fn bind(port: Option<u16>) -> HeadlessResult<TcpListener> {
    let port = port.unwrap_or(0);
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
        if port == 0 {
            HeadlessError::server_start(format!("bind an ephemeral port: {e}"))
        } else {
            HeadlessError::server_start(format!("port {port} is unavailable: {e}"))
        }
    })
}

fn local_port(listener: &TcpListener) -> HeadlessResult<u16> {
    listener
        .local_addr()
        .map(|a| a.port())
        .map_err(|e| HeadlessError::server_start(format!("read bound address: {e}")))
}

fn spawn_server(
    listener: TcpListener,
    router: axum::Router,
    name: &'static str,
) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await;
        if let Err(e) = served {
            warn!(server = name, error = %e, "server exited with error");
        }
    });
    (tx, task)
}

async fn stop(shutdown: Vec<oneshot::Sender<()>>, tasks: Vec<JoinHandle<()>>) {
    for tx in shutdown {
        let _ = tx.send(());
    }
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "server task did not exit cleanly");
        }
    }
}

/// A server handle together with who is responsible for stopping it.
pub struct ServerLease {
    server: Arc<ContentServer>,
    ownership: Ownership,
}

/// Reuse `existing` verbatim, or start a new server for `source`.
///
/// A reused server is borrowed: [`ServerLease::dispose`] leaves it running.
pub async fn acquire_server(
    existing: Option<Arc<ContentServer>>,
    source: &BundleSource,
    opts: &ServerOptions,
) -> HeadlessResult<ServerLease> {
    let ownership = Ownership::of(&existing);
    let server = match existing {
        Some(server) => server,
        None => ContentServer::start(source, opts).await?,
    };
    Ok(ServerLease { server, ownership })
}

impl ServerLease {
    /// The underlying server.
    pub fn server(&self) -> &Arc<ContentServer> {
        &self.server
    }

    /// URL pages navigate to.
    pub fn serve_url(&self) -> &str {
        self.server.serve_url()
    }

    /// Port of the auxiliary data server.
    pub fn aux_port(&self) -> u16 {
        self.server.aux_port()
    }

    /// Source maps of the served bundle.
    pub fn source_maps(&self) -> &Arc<SourceMapProvider> {
        self.server.source_maps()
    }

    /// Whether this lease stops the server on disposal.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Stop the server if this lease started it; no-op for borrowed servers.
    pub async fn dispose(&self) -> HeadlessResult<()> {
        if self.ownership.should_release() {
            self.server.shutdown().await
        } else {
            Ok(())
        }
    }
}
