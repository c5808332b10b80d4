//! Raw per-frame outlines to cubic Bezier equations.

pub(crate) mod convert;
pub(crate) mod equation;
pub(crate) mod normalize;
pub(crate) mod path;
