pub(crate) mod cleanup;
pub(crate) mod core;
pub(crate) mod error;
