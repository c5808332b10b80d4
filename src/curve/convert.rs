use crate::curve::equation::Equation;
use crate::curve::normalize::{SegmentStats, normalize};
use crate::curve::path::RawPath;
use crate::foundation::core::{FrameKey, HexColor};
use crate::foundation::error::{FrameplotError, FrameplotResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Frame key to raw path, as delivered by ingestion. `None` marks a frame with no path data.
pub type RawFrames = BTreeMap<FrameKey, Option<RawPath>>;

/// Parse an ingestion JSON document (`{"000": "M0,0 ...", ...}`).
///
/// Values that are neither a path string nor a segment list (including `null`) become `None` and
/// fail later in [`convert`].
pub fn parse_raw_frames(json: &str) -> FrameplotResult<RawFrames> {
    let doc: BTreeMap<FrameKey, Value> = serde_json::from_str(json)?;
    Ok(doc
        .into_iter()
        .map(|(key, v)| {
            let raw = match v {
                Value::Null => None,
                v => serde_json::from_value::<RawPath>(v).ok(),
            };
            (key, raw)
        })
        .collect())
}

/// Options controlling equation generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOpts {
    /// Color assigned to every equation.
    pub color: HexColor,
    /// Round coordinates to this many decimals. `None` keeps full precision.
    pub precision: Option<u8>,
    /// Flattening tolerance used when approximating arcs with cubics.
    pub arc_tolerance: f64,
    /// Convert frames on the rayon pool.
    pub parallel: bool,
}

impl Default for ConvertOpts {
    fn default() -> Self {
        Self {
            color: HexColor::black(),
            precision: None,
            arc_tolerance: 0.1,
            parallel: false,
        }
    }
}

impl ConvertOpts {
    /// Reject option values that cannot produce sensible output.
    pub fn validate(&self) -> FrameplotResult<()> {
        if !self.arc_tolerance.is_finite() || self.arc_tolerance <= 0.0 {
            return Err(FrameplotError::validation(
                "arc_tolerance must be finite and > 0",
            ));
        }
        if self.precision.is_some_and(|p| p > 12) {
            return Err(FrameplotError::validation("precision must be <= 12"));
        }
        Ok(())
    }
}

/// Equations of one frame, in conversion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameEquationSet {
    /// Frame this set belongs to.
    pub key: FrameKey,
    /// Equations with ids `seg0..seg(n-1)`.
    pub equations: Vec<Equation>,
}

impl FrameEquationSet {
    /// Ids of every equation in the set.
    pub fn ids(&self) -> Vec<String> {
        self.equations.iter().map(|e| e.id.clone()).collect()
    }

    /// `true` when the frame has no visible curves.
    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }
}

/// Frame key to equations, ordered by frame key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquationMap(pub BTreeMap<FrameKey, Vec<Equation>>);

impl EquationMap {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when there are no frames.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Equations for `key`, if the frame exists.
    pub fn get(&self, key: &str) -> Option<&[Equation]> {
        self.0.get(&FrameKey::from(key)).map(Vec::as_slice)
    }

    /// Consume into per-frame sets in playback order.
    pub fn into_frames(self) -> Vec<FrameEquationSet> {
        self.0
            .into_iter()
            .map(|(key, equations)| FrameEquationSet { key, equations })
            .collect()
    }
}

/// What conversion kept and dropped, per frame and in total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    /// Stats keyed by frame.
    pub frames: BTreeMap<FrameKey, SegmentStats>,
    /// Sum over all frames.
    pub totals: SegmentStats,
}

/// Convert every frame's raw path into equations.
pub fn convert(frames: &RawFrames, opts: &ConvertOpts) -> FrameplotResult<EquationMap> {
    convert_with_report(frames, opts).map(|(map, _)| map)
}

/// Like [`convert`], also returning what was dropped along the way.
///
/// Fails only when a frame has no path data at all; in that case nothing is returned for any
/// frame.
#[tracing::instrument(skip(frames, opts), fields(frame_count = frames.len()))]
pub fn convert_with_report(
    frames: &RawFrames,
    opts: &ConvertOpts,
) -> FrameplotResult<(EquationMap, ConversionReport)> {
    opts.validate()?;
    if let Some((key, _)) = frames.iter().find(|(_, raw)| raw.is_none()) {
        return Err(FrameplotError::conversion(key.as_str()));
    }

    let convert_one =
        |(key, raw): (&FrameKey, &Option<RawPath>)| -> FrameplotResult<(FrameKey, Vec<Equation>, SegmentStats)> {
            let raw = raw
                .as_ref()
                .ok_or_else(|| FrameplotError::conversion(key.as_str()))?;
            let (equations, stats) = convert_frame(raw, opts);
            if stats.skipped() > 0 || stats.unparsable > 0 {
                tracing::debug!(frame = %key, ?stats, "frame degraded");
            }
            Ok((key.clone(), equations, stats))
        };

    let converted = if opts.parallel {
        frames
            .par_iter()
            .map(convert_one)
            .collect::<FrameplotResult<Vec<_>>>()?
    } else {
        frames
            .iter()
            .map(convert_one)
            .collect::<FrameplotResult<Vec<_>>>()?
    };

    let mut map = BTreeMap::new();
    let mut report = ConversionReport::default();
    for (key, equations, stats) in converted {
        report.totals += stats;
        report.frames.insert(key.clone(), stats);
        map.insert(key, equations);
    }

    tracing::info!(
        frames = map.len(),
        curves = report.totals.retained,
        skipped = report.totals.skipped(),
        "converted frames"
    );
    Ok((EquationMap(map), report))
}

/// Convert a single frame. Never fails; dropped segments show up in the stats.
pub fn convert_frame(raw: &RawPath, opts: &ConvertOpts) -> (Vec<Equation>, SegmentStats) {
    let (segments, stats) = normalize(raw, opts.arc_tolerance);
    let equations = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| Equation::from_segment(i, seg, &opts.color, opts.precision))
        .collect();
    (equations, stats)
}
