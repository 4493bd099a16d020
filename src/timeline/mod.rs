//! Asset timeline engine: mount samples in, flat asset positions out.

pub(crate) mod flatten;
pub(crate) mod mount;
pub(crate) mod sampler;
pub(crate) mod volume;
