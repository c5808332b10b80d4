//! Frameplot turns per-frame vector outlines into parametric cubic Bezier equations and plays
//! them back one frame at a time on a graphing surface.
//!
//! - Parse ingestion output into [`RawFrames`]
//! - [`convert`] them into an [`EquationMap`]
//! - Hand the frames to a [`PlaybackScheduler`] driving an [`EquationSink`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod curve;
mod foundation;
mod playback;

pub use crate::foundation::core::{FrameKey, HexColor, PathEl, Point, fmt_coord};
pub use crate::foundation::error::{FrameplotError, FrameplotResult};

pub use crate::curve::convert::{
    ConversionReport, ConvertOpts, EquationMap, FrameEquationSet, RawFrames, convert,
    convert_frame, convert_with_report, parse_raw_frames,
};
pub use crate::curve::equation::{CurveSegment, Equation, segment_id};
pub use crate::curve::normalize::{SegmentStats, normalize};
pub use crate::curve::path::{PathSegment, RawPath};

pub use crate::playback::clock::{CancelToken, Clock, ManualClock, SystemClock, Wait};
pub use crate::playback::scheduler::{
    PlaybackHandle, PlaybackOpts, PlaybackOutcome, PlaybackReport, PlaybackScheduler,
    PlaybackState,
};
pub use crate::playback::sink::{EquationSink, InMemorySink, JsonLinesSink, SinkEvent, Viewport};
