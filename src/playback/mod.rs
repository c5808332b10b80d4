//! Frame-by-frame presentation of equation sets on a rendering sink.

pub(crate) mod clock;
pub(crate) mod scheduler;
pub(crate) mod sink;
