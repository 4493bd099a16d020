//! Headless-browser orchestration for Wavyte compositions.
//!
//! Two halves:
//!
//! - [`discover`] loads a bundle in a managed browser page, drives the in-page protocol and
//!   returns the [`CompositionMetadata`] the bundle defines.
//! - [`flatten`] turns per-frame [`MediaMountEvent`] samples into [`AssetPosition`]s, and
//!   [`sample_asset_positions`] produces those samples by seeking a mounted composition.
//!
//! Browsers are reached through the [`BrowserLauncher`] / [`Browser`] / [`Page`] traits. The
//! `chromium` feature adds a DevTools-protocol implementation.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod browser;
pub(crate) mod discovery;
pub(crate) mod server;
pub(crate) mod timeline;

pub use crate::foundation::cleanup::CleanupStack;
pub use crate::foundation::core::{Canvas, FrameIndex, FrameRange, Ownership};
pub use crate::foundation::error::{HeadlessError, HeadlessResult};

#[cfg(feature = "chromium")]
pub use crate::browser::chromium::ChromiumLauncher;
pub use crate::browser::driver::{
    Browser, BrowserLauncher, LaunchOptions, PAGE_EVENT_CAPACITY, Page, PageEvent,
};
pub use crate::browser::evaluate::{ExceptionWatcher, call_expression, evaluate};
pub use crate::browser::log::{BrowserLog, ConsoleType, LogCallback, StackFrame};
pub use crate::browser::session::{PageSession, acquire_page};

pub use crate::server::bundle::{BundleFile, BundleSource, normalize_rel_path};
pub use crate::server::manager::{ContentServer, ServerLease, ServerOptions, acquire_server};
pub use crate::server::source_map::SourceMapProvider;

pub use crate::discovery::handshake::BundleMode;
pub use crate::discovery::metadata::{CompositionMetadata, validate_compositions};
pub use crate::discovery::options::{
    DEFAULT_PROP_RETRIES, DEFAULT_TIMEOUT_MS, DiscoverOptions, PageContract, READY_POLL_INTERVAL,
    validate_timeout,
};
pub use crate::discovery::protocol::discover;

pub use crate::timeline::flatten::{AssetPosition, FlattenOpts, flatten};
pub use crate::timeline::mount::{MediaKind, MediaMountEvent, MountTimeline, is_remote_src};
pub use crate::timeline::sampler::{
    MountSource, PageMountSource, SampleOptions, collect_mount_events, sample_asset_positions,
};
pub use crate::timeline::volume::Volume;
