use crate::curve::equation::CurveSegment;
use crate::curve::path::{RawPath, SkipKind, Step, is_finite, lower};
use crate::foundation::core::{PathEl, Point};
use serde::Serialize;
use std::ops::AddAssign;

/// Per-frame accounting of what normalization kept and dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SegmentStats {
    /// Cubic segments emitted.
    pub retained: usize,
    /// Moves are not counted; lines and closes are.
    pub skipped_non_curve: usize,
    /// Non-finite coordinates, or curves with no current point.
    pub skipped_degenerate: usize,
    /// Unknown structured commands or wrong arity.
    pub skipped_malformed: usize,
    /// Frames whose SVG data could not be parsed at all.
    pub unparsable: usize,
}

impl SegmentStats {
    /// Total dropped segments (unparsable frames not included).
    pub fn skipped(&self) -> usize {
        self.skipped_non_curve + self.skipped_degenerate + self.skipped_malformed
    }
}

impl AddAssign for SegmentStats {
    fn add_assign(&mut self, rhs: Self) {
        self.retained += rhs.retained;
        self.skipped_non_curve += rhs.skipped_non_curve;
        self.skipped_degenerate += rhs.skipped_degenerate;
        self.skipped_malformed += rhs.skipped_malformed;
        self.unparsable += rhs.unparsable;
    }
}

/// Normalize a raw path into cubic segments in source order.
///
/// Quadratics are raised exactly, arcs are approximated with `arc_tolerance`. Everything that is
/// not a curve after that is dropped and counted.
pub fn normalize(raw: &RawPath, arc_tolerance: f64) -> (Vec<CurveSegment>, SegmentStats) {
    let mut stats = SegmentStats::default();
    let Some(steps) = lower(raw, arc_tolerance) else {
        stats.unparsable = 1;
        return (Vec::new(), stats);
    };

    let mut out = Vec::new();
    let mut current: Option<Point> = None;
    let mut start: Option<Point> = None;

    for step in steps {
        let el = match step {
            Step::El(el) => el,
            Step::Skipped { kind, to } => {
                match kind {
                    SkipKind::Malformed => stats.skipped_malformed += 1,
                    SkipKind::Degenerate => stats.skipped_degenerate += 1,
                }
                tracing::debug!(?kind, "dropped path segment");
                if to.is_some() {
                    current = to;
                }
                continue;
            }
        };

        match el {
            PathEl::MoveTo(p) => {
                current = Some(p);
                start = Some(p);
            }
            PathEl::LineTo(p) => {
                stats.skipped_non_curve += 1;
                current = Some(p);
            }
            PathEl::ClosePath => {
                stats.skipped_non_curve += 1;
                current = start;
            }
            PathEl::QuadTo(p1, p2) => {
                let seg = current
                    .map(|p0| CurveSegment::from(kurbo::QuadBez::new(p0, p1, p2).raise()));
                push_curve(&mut out, &mut stats, seg);
                current = Some(p2);
            }
            PathEl::CurveTo(p1, p2, p3) => {
                let seg = current.map(|p0| CurveSegment::new(p0, p1, p2, p3));
                push_curve(&mut out, &mut stats, seg);
                current = Some(p3);
            }
        }
    }

    stats.retained = out.len();
    (out, stats)
}

fn push_curve(out: &mut Vec<CurveSegment>, stats: &mut SegmentStats, seg: Option<CurveSegment>) {
    match seg {
        Some(seg) if seg.points.iter().all(|p| is_finite(*p)) => out.push(seg),
        _ => {
            stats.skipped_degenerate += 1;
            tracing::debug!("dropped degenerate curve");
        }
    }
}
