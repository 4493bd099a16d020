//! Local content server: bundle files, source maps, and an auxiliary data port.

pub(crate) mod bundle;
pub(crate) mod http;
pub(crate) mod manager;
pub(crate) mod source_map;
