use crate::foundation::core::{HexColor, Point, fmt_coord};
use serde::{Deserialize, Serialize};

/// One normalized cubic Bezier: start, two controls, end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveSegment {
    /// Control points `P0..P3` in source order.
    pub points: [Point; 4],
}

impl CurveSegment {
    /// Build from the four control points.
    pub fn new(p0: Point, p1: Point, p2: Point, p3: Point) -> Self {
        Self {
            points: [p0, p1, p2, p3],
        }
    }

    /// Evaluate `B(t)` for `t` in `[0, 1]`.
    pub fn eval(&self, t: f64) -> Point {
        let [p0, p1, p2, p3] = self.points;
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Point::new(
            a * p0.x + b * p1.x + c * p2.x + d * p3.x,
            a * p0.y + b * p1.y + c * p2.y + d * p3.y,
        )
    }

    /// Parametric formula text consumed verbatim by the rendering sink.
    pub fn formula(&self, precision: Option<u8>) -> String {
        let [p0, p1, p2, p3] = self.points.map(|p| pair(p, precision));
        format!("{p0}(1-t)^3 + 3{p1}(1-t)^2t + 3{p2}(1-t)t^2 + {p3}t^3")
    }
}

impl From<kurbo::CubicBez> for CurveSegment {
    fn from(c: kurbo::CubicBez) -> Self {
        Self::new(c.p0, c.p1, c.p2, c.p3)
    }
}

fn pair(p: Point, precision: Option<u8>) -> String {
    format!(
        "({},{})",
        fmt_coord(p.x, precision),
        fmt_coord(p.y, precision)
    )
}

/// A named, colored parametric formula derived from exactly one [`CurveSegment`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equation {
    /// `seg<N>`, where `N` is the segment's position among the frame's retained curves.
    pub id: String,
    /// Stroke color.
    pub color: HexColor,
    /// Formula text.
    pub latex: String,
}

impl Equation {
    /// Build the equation for the `index`-th retained segment of a frame.
    pub fn from_segment(
        index: usize,
        seg: &CurveSegment,
        color: &HexColor,
        precision: Option<u8>,
    ) -> Self {
        Self {
            id: segment_id(index),
            color: color.clone(),
            latex: seg.formula(precision),
        }
    }
}

/// Positional equation id. Reused across frames by design.
pub fn segment_id(index: usize) -> String {
    format!("seg{index}")
}
