//! Render-side sampling: seek a composition frame by frame and record mounted media.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::browser::driver::{BrowserLauncher, Page};
use crate::browser::evaluate::evaluate;
use crate::discovery::handshake::{
    BundleMode, Injection, set_bundle_mode, set_props_and_env, wait_for_ready,
};
use crate::discovery::metadata::CompositionMetadata;
use crate::discovery::options::{DiscoverOptions, PageContract, validate_timeout};
use crate::discovery::protocol::with_session;
use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::server::bundle::BundleSource;
use crate::timeline::flatten::{AssetPosition, FlattenOpts, flatten};
use crate::timeline::mount::{MediaKind, MediaMountEvent, MountTimeline, is_remote_src};

/// Anything that can report the media elements mounted at a frame.
#[async_trait]
pub trait MountSource: Send + Sync {
    /// Media elements mounted at `frame`.
    async fn mounts_at(&self, frame: FrameIndex) -> HeadlessResult<Vec<MediaMountEvent>>;
}

/// Sample `source` at every frame of `range`, in order.
pub async fn collect_mount_events(
    source: &dyn MountSource,
    range: FrameRange,
) -> HeadlessResult<MountTimeline> {
    let mut timeline = MountTimeline::new();
    for frame in range.frames() {
        let at = i64::try_from(frame.0)
            .map_err(|_| HeadlessError::config(format!("frame {} is out of range", frame.0)))?;
        let events = source.mounts_at(frame).await?;
        timeline.record(at, events);
    }
    Ok(timeline)
}

/// [`MountSource`] backed by a page running a bundle in composition mode.
pub struct PageMountSource {
    page: Arc<dyn Page>,
    contract: PageContract,
    timeout: Duration,
}

impl PageMountSource {
    /// Sample through `page`, bounding every step by `timeout`.
    pub fn new(page: Arc<dyn Page>, contract: PageContract, timeout: Duration) -> Self {
        Self {
            page,
            contract,
            timeout,
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMount {
    id: String,
    #[serde(rename = "type")]
    kind: MediaKind,
    src: String,
    media_frame: f64,
    #[serde(default)]
    trim: f64,
    #[serde(default = "one")]
    volume: f64,
    #[serde(default = "one")]
    playback_rate: f64,
    is_remote: Option<bool>,
}

fn one() -> f64 {
    1.0
}

impl From<PageMount> for MediaMountEvent {
    fn from(m: PageMount) -> Self {
        let is_remote = m.is_remote.unwrap_or_else(|| is_remote_src(&m.src));
        Self {
            id: m.id,
            kind: m.kind,
            src: m.src,
            media_frame: m.media_frame,
            trim: m.trim,
            volume: m.volume,
            playback_rate: m.playback_rate,
            is_remote,
        }
    }
}

#[async_trait]
impl MountSource for PageMountSource {
    async fn mounts_at(&self, frame: FrameIndex) -> HeadlessResult<Vec<MediaMountEvent>> {
        let page = self.page.as_ref();
        let _: serde_json::Value = evaluate(
            page,
            &PageContract::call(&self.contract.seek)?,
            &[serde_json::Value::from(frame.0)],
            Some(frame.0),
            self.timeout,
        )
        .await?;
        wait_for_ready(page, &self.contract, Some(frame.0), self.timeout).await?;

        let mounts: Vec<PageMount> = evaluate(
            page,
            &PageContract::call(&self.contract.collect_assets)?,
            &[],
            Some(frame.0),
            self.timeout,
        )
        .await?;
        Ok(mounts.into_iter().map(MediaMountEvent::from).collect())
    }
}

/// Options for [`sample_asset_positions`].
#[derive(Clone, Debug)]
pub struct SampleOptions {
    /// Browser, server and protocol settings shared with discovery.
    pub base: DiscoverOptions,
    /// Concurrency hint for the content server.
    pub concurrency: usize,
    /// Run splitting tolerance.
    pub flatten: FlattenOpts,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            base: DiscoverOptions::default(),
            concurrency: 1,
            flatten: FlattenOpts::default(),
        }
    }
}

/// Mount `composition`, sample every frame and flatten the result into asset positions.
///
/// Page and server are acquired and released exactly like [`crate::discover`].
#[tracing::instrument(skip_all, fields(composition = %composition.id))]
pub async fn sample_asset_positions(
    bundle: impl Into<BundleSource>,
    composition: &CompositionMetadata,
    options: &SampleOptions,
    launcher: &dyn BrowserLauncher,
) -> HeadlessResult<Vec<AssetPosition>> {
    let base = &options.base;
    let timeout = validate_timeout(base.timeout_ms)?;
    options.flatten.validate()?;
    let source = bundle.into();

    let concurrency = options.concurrency.max(1);
    let timeline = with_session(&source, base, launcher, concurrency, timeout, |ctx| async move {
        let page = ctx.page.as_ref();
        let contract = &base.page_contract;
        let inj = Injection {
            serve_url: &ctx.serve_url,
            input_props: &base.input_props,
            env_variables: &base.env_variables,
            initial_frame: 0,
            proxy_port: ctx.aux_port,
            audio_enabled: true,
            video_enabled: true,
            contract,
            timeout,
        };
        set_props_and_env(page, &inj, base.prop_retries).await?;
        let mode = BundleMode::Composition {
            composition_name: composition.id.clone(),
        };
        set_bundle_mode(page, contract, &mode, timeout).await?;
        wait_for_ready(page, contract, None, timeout).await?;

        let mounts = PageMountSource::new(ctx.page.clone(), contract.clone(), timeout);
        collect_mount_events(&mounts, composition.frame_range()).await
    })
    .await?;

    debug!(frames = timeline.frame_count(), "mount samples collected");
    flatten(&timeline, &options.flatten)
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/sampler.rs"]
mod tests;
