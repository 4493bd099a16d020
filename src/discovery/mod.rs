//! Composition discovery: drive a bundle through the in-page protocol and list its compositions.

pub(crate) mod handshake;
pub(crate) mod metadata;
pub(crate) mod options;
pub(crate) mod protocol;
