use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use tracing::debug;

use crate::browser::driver::{BrowserLauncher, Page};
use crate::browser::evaluate::{ExceptionWatcher, evaluate};
use crate::browser::session::acquire_page;
use crate::discovery::handshake::{
    BundleMode, Injection, set_bundle_mode, set_props_and_env, wait_for_ready,
};
use crate::discovery::metadata::{CompositionMetadata, validate_compositions};
use crate::discovery::options::{DiscoverOptions, PageContract, validate_timeout};
use crate::foundation::cleanup::CleanupStack;
use crate::foundation::error::HeadlessResult;
use crate::server::bundle::BundleSource;
use crate::server::manager::{ServerOptions, acquire_server};

/// What a pipeline gets to work with once page and server are up.
pub(crate) struct SessionContext {
    pub(crate) page: Arc<dyn Page>,
    pub(crate) serve_url: String,
    pub(crate) aux_port: u16,
}

/// Acquire a page and a content server, run `pipeline`, then release both.
///
/// Resources are released in reverse acquisition order on every exit path. A crash or an
/// uncaught exception on the page aborts the pipeline as soon as it fires.
pub(crate) async fn with_session<T, F, Fut>(
    source: &BundleSource,
    options: &DiscoverOptions,
    launcher: &dyn BrowserLauncher,
    concurrency: usize,
    timeout: Duration,
    pipeline: F,
) -> HeadlessResult<T>
where
    F: FnOnce(SessionContext) -> Fut,
    Fut: Future<Output = HeadlessResult<T>>,
{
    let launch_options = options.chromium_options.for_session(options.verbose, timeout);
    let session = Arc::new(
        acquire_page(
            options.browser_instance.clone(),
            launcher,
            options.browser_executable.as_deref(),
            &launch_options,
            timeout,
        )
        .await?,
    );
    let mut cleanup = CleanupStack::new();
    let page_session = session.clone();
    cleanup.push("page", move || {
        async move { page_session.dispose().await }.boxed()
    });
    session.forward_logs(
        options.on_browser_log.clone(),
        options.verbose,
        options.indent,
    );

    let watcher = ExceptionWatcher::spawn(session.page().as_ref(), None);
    let result = watcher
        .guard(async {
            let server_opts = ServerOptions {
                port: options.port,
                concurrency,
                verbose: options.verbose,
            };
            let lease =
                Arc::new(acquire_server(options.server.clone(), source, &server_opts).await?);
            let server_lease = lease.clone();
            cleanup.push("server", move || {
                async move { server_lease.dispose().await }.boxed()
            });
            session.attach_source_maps(lease.source_maps().clone());
            debug!(serve_url = lease.serve_url(), aux_port = lease.aux_port(), "session ready");

            pipeline(SessionContext {
                page: session.page().clone(),
                serve_url: lease.serve_url().to_owned(),
                aux_port: lease.aux_port(),
            })
            .await
        })
        .await;

    cleanup.finish(result).await
}

/// Load a bundle in a headless page and list the compositions it defines.
///
/// All-or-nothing: either every composition is returned, or one error naming the failing
/// stage. Page and server are always released before this returns, except for a
/// caller-supplied browser or server, which are left running.
#[tracing::instrument(skip_all, fields(timeout_ms = ?options.timeout_ms))]
pub async fn discover(
    bundle: impl Into<BundleSource>,
    options: &DiscoverOptions,
    launcher: &dyn BrowserLauncher,
) -> HeadlessResult<Vec<CompositionMetadata>> {
    let timeout = validate_timeout(options.timeout_ms)?;
    let source = bundle.into();

    let compositions = with_session(&source, options, launcher, 1, timeout, |ctx| async move {
        let page = ctx.page.as_ref();
        let contract = &options.page_contract;
        let inj = Injection {
            serve_url: &ctx.serve_url,
            input_props: &options.input_props,
            env_variables: &options.env_variables,
            initial_frame: 0,
            proxy_port: ctx.aux_port,
            audio_enabled: false,
            video_enabled: false,
            contract,
            timeout,
        };
        set_props_and_env(page, &inj, options.prop_retries).await?;
        set_bundle_mode(page, contract, &BundleMode::Evaluation, timeout).await?;
        wait_for_ready(page, contract, None, timeout).await?;

        let raw: serde_json::Value = evaluate(
            page,
            &PageContract::call(&contract.get_compositions)?,
            &[],
            None,
            timeout,
        )
        .await?;
        validate_compositions(raw)
    })
    .await?;

    debug!(count = compositions.len(), "compositions discovered");
    Ok(compositions)
}
