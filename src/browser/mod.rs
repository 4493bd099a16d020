//! Browser adapter seam, page session handle and in-page evaluation channel.

#[cfg(feature = "chromium")]
pub(crate) mod chromium;
pub(crate) mod driver;
pub(crate) mod evaluate;
pub(crate) mod log;
pub(crate) mod session;
