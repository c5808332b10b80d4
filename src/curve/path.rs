use crate::foundation::core::{PathEl, Point};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Vector outline of one frame as delivered by the upstream vectorizer.
///
/// Either an SVG path string (`"M0,0 C1,1 2,2 3,3"`) or a list of structured segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPath {
    /// SVG path data (`M L H V C S Q T A Z`, absolute or relative).
    Svg(String),
    /// Structured segments with absolute coordinates.
    Segments(Vec<PathSegment>),
}

impl RawPath {
    /// Wrap SVG path data as-is; bad data degrades at conversion time.
    pub fn svg(d: impl Into<String>) -> Self {
        Self::Svg(d.into())
    }
}

impl From<Vec<PathSegment>> for RawPath {
    fn from(v: Vec<PathSegment>) -> Self {
        Self::Segments(v)
    }
}

/// One structured path command. Coordinates are absolute.
///
/// On the wire a segment is either an array `["C", x1, y1, x2, y2, x, y]` or an object
/// `{"cmd": "C", "x1": .., ...}`. Anything unrecognised deserializes to
/// [`PathSegment::Malformed`] rather than failing the whole document.
#[derive(Clone, Debug, PartialEq)]
pub enum PathSegment {
    /// `M x y`
    MoveTo(Point),
    /// `L x y`
    LineTo(Point),
    /// `C x1 y1 x2 y2 x y`
    CubicTo(Point, Point, Point),
    /// `Q x1 y1 x y`
    QuadTo(Point, Point),
    /// `A rx ry rotation large_arc sweep x y`, rotation in degrees.
    Arc {
        /// Ellipse radius along x.
        rx: f64,
        /// Ellipse radius along y.
        ry: f64,
        /// Ellipse x-axis rotation in degrees.
        rotation_deg: f64,
        /// Take the larger of the two candidate arcs.
        large_arc: bool,
        /// Sweep in the positive-angle direction.
        sweep: bool,
        /// End point.
        to: Point,
    },
    /// `Z`
    Close,
    /// Unknown command or wrong arity, kept verbatim.
    Malformed(Value),
}

impl PathSegment {
    /// Interpret a JSON value as a segment. Never fails.
    pub fn from_value(v: &Value) -> Self {
        let parsed = match v {
            Value::Array(items) => from_array(items),
            Value::Object(map) => from_object(map),
            _ => None,
        };
        parsed.unwrap_or_else(|| Self::Malformed(v.clone()))
    }

    fn to_value(&self) -> Value {
        match self {
            Self::MoveTo(p) => json!(["M", p.x, p.y]),
            Self::LineTo(p) => json!(["L", p.x, p.y]),
            Self::CubicTo(a, b, p) => json!(["C", a.x, a.y, b.x, b.y, p.x, p.y]),
            Self::QuadTo(a, p) => json!(["Q", a.x, a.y, p.x, p.y]),
            Self::Arc {
                rx,
                ry,
                rotation_deg,
                large_arc,
                sweep,
                to,
            } => json!([
                "A",
                rx,
                ry,
                rotation_deg,
                u8::from(*large_arc),
                u8::from(*sweep),
                to.x,
                to.y
            ]),
            Self::Close => json!(["Z"]),
            Self::Malformed(v) => v.clone(),
        }
    }
}

fn from_array(items: &[Value]) -> Option<PathSegment> {
    let (cmd, rest) = items.split_first()?;
    let cmd = cmd.as_str()?;
    let n = |i: usize| rest.get(i).and_then(Value::as_f64);
    let flag = |i: usize| rest.get(i).and_then(as_flag);
    let pt = |i: usize| Some(Point::new(n(i)?, n(i + 1)?));

    let arity = match cmd {
        "M" | "L" => 2,
        "C" => 6,
        "Q" => 4,
        "A" => 7,
        "Z" => 0,
        _ => return None,
    };
    if rest.len() != arity {
        return None;
    }

    Some(match cmd {
        "M" => PathSegment::MoveTo(pt(0)?),
        "L" => PathSegment::LineTo(pt(0)?),
        "C" => PathSegment::CubicTo(pt(0)?, pt(2)?, pt(4)?),
        "Q" => PathSegment::QuadTo(pt(0)?, pt(2)?),
        "A" => PathSegment::Arc {
            rx: n(0)?,
            ry: n(1)?,
            rotation_deg: n(2)?,
            large_arc: flag(3)?,
            sweep: flag(4)?,
            to: pt(5)?,
        },
        _ => PathSegment::Close,
    })
}

fn from_object(map: &serde_json::Map<String, Value>) -> Option<PathSegment> {
    let n = |k: &str| map.get(k).and_then(Value::as_f64);
    let flag = |k: &str| map.get(k).and_then(as_flag);
    let pt = |kx: &str, ky: &str| Some(Point::new(n(kx)?, n(ky)?));

    Some(match map.get("cmd")?.as_str()? {
        "M" => PathSegment::MoveTo(pt("x", "y")?),
        "L" => PathSegment::LineTo(pt("x", "y")?),
        "C" => PathSegment::CubicTo(pt("x1", "y1")?, pt("x2", "y2")?, pt("x", "y")?),
        "Q" => PathSegment::QuadTo(pt("x1", "y1")?, pt("x", "y")?),
        "A" => PathSegment::Arc {
            rx: n("rx")?,
            ry: n("ry")?,
            rotation_deg: n("rotation").unwrap_or(0.0),
            large_arc: flag("large_arc").unwrap_or(false),
            sweep: flag("sweep").unwrap_or(false),
            to: pt("x", "y")?,
        },
        "Z" => PathSegment::Close,
        _ => return None,
    })
}

fn as_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

impl Serialize for PathSegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PathSegment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

/// Why a path element was dropped before or during normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SkipKind {
    /// Unknown structured command or wrong arity.
    Malformed,
    /// Non-finite coordinates, or a curve with no current point.
    Degenerate,
}

/// One element of a lowered path, ready for normalization.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Step {
    El(PathEl),
    /// Dropped during lowering; `to` is where the pen ends up, if known.
    Skipped { kind: SkipKind, to: Option<Point> },
}

/// Lower a raw path to kurbo path elements.
///
/// Returns `None` when SVG data cannot be parsed at all.
pub(crate) fn lower(raw: &RawPath, arc_tolerance: f64) -> Option<Vec<Step>> {
    match raw {
        RawPath::Svg(d) => match parse_svg(d) {
            Ok(segs) => Some(lower_segments(&segs, arc_tolerance)),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable svg path data");
                None
            }
        },
        RawPath::Segments(segs) => Some(lower_segments(segs, arc_tolerance)),
    }
}

/// Resolve SVG path data into absolute structured segments.
///
/// Relative commands are made absolute, `H`/`V` become lines, and `S`/`T` get their reflected
/// control point. Arcs stay arcs so they are approximated at the caller's tolerance.
pub(crate) fn parse_svg(d: &str) -> Result<Vec<PathSegment>, svgtypes::Error> {
    use svgtypes::PathSegment as Svg;

    let mut out = Vec::new();
    let mut pen = Point::ZERO;
    let mut start = Point::ZERO;
    // Last control point, for reflecting into the next `S` or `T`.
    let mut last_cubic_ctrl: Option<Point> = None;
    let mut last_quad_ctrl: Option<Point> = None;

    for seg in svgtypes::PathParser::from(d) {
        let seg = seg?;
        let at = |abs: bool, x: f64, y: f64| {
            if abs {
                Point::new(x, y)
            } else {
                Point::new(pen.x + x, pen.y + y)
            }
        };
        let (next, cubic_ctrl, quad_ctrl) = match seg {
            Svg::MoveTo { abs, x, y } => {
                let p = at(abs, x, y);
                out.push(PathSegment::MoveTo(p));
                start = p;
                (p, None, None)
            }
            Svg::LineTo { abs, x, y } => {
                let p = at(abs, x, y);
                out.push(PathSegment::LineTo(p));
                (p, None, None)
            }
            Svg::HorizontalLineTo { abs, x } => {
                let p = Point::new(if abs { x } else { pen.x + x }, pen.y);
                out.push(PathSegment::LineTo(p));
                (p, None, None)
            }
            Svg::VerticalLineTo { abs, y } => {
                let p = Point::new(pen.x, if abs { y } else { pen.y + y });
                out.push(PathSegment::LineTo(p));
                (p, None, None)
            }
            Svg::CurveTo {
                abs,
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let (c1, c2, p) = (at(abs, x1, y1), at(abs, x2, y2), at(abs, x, y));
                out.push(PathSegment::CubicTo(c1, c2, p));
                (p, Some(c2), None)
            }
            Svg::SmoothCurveTo { abs, x2, y2, x, y } => {
                let c1 = reflect(last_cubic_ctrl, pen);
                let (c2, p) = (at(abs, x2, y2), at(abs, x, y));
                out.push(PathSegment::CubicTo(c1, c2, p));
                (p, Some(c2), None)
            }
            Svg::Quadratic { abs, x1, y1, x, y } => {
                let (c, p) = (at(abs, x1, y1), at(abs, x, y));
                out.push(PathSegment::QuadTo(c, p));
                (p, None, Some(c))
            }
            Svg::SmoothQuadratic { abs, x, y } => {
                let c = reflect(last_quad_ctrl, pen);
                let p = at(abs, x, y);
                out.push(PathSegment::QuadTo(c, p));
                (p, None, Some(c))
            }
            Svg::EllipticalArc {
                abs,
                rx,
                ry,
                x_axis_rotation,
                large_arc,
                sweep,
                x,
                y,
            } => {
                let p = at(abs, x, y);
                out.push(PathSegment::Arc {
                    rx,
                    ry,
                    rotation_deg: x_axis_rotation,
                    large_arc,
                    sweep,
                    to: p,
                });
                (p, None, None)
            }
            Svg::ClosePath { .. } => {
                out.push(PathSegment::Close);
                (start, None, None)
            }
        };
        pen = next;
        last_cubic_ctrl = cubic_ctrl;
        last_quad_ctrl = quad_ctrl;
    }

    Ok(out)
}

/// Mirror `ctrl` through `pen`; without a previous control point the pen itself is used.
fn reflect(ctrl: Option<Point>, pen: Point) -> Point {
    match ctrl {
        Some(c) => Point::new(2.0 * pen.x - c.x, 2.0 * pen.y - c.y),
        None => pen,
    }
}

fn lower_segments(segs: &[PathSegment], arc_tolerance: f64) -> Vec<Step> {
    let mut out = Vec::with_capacity(segs.len());
    let mut current: Option<Point> = None;
    let mut start: Option<Point> = None;

    for seg in segs {
        match seg {
            PathSegment::MoveTo(p) => {
                out.push(Step::El(PathEl::MoveTo(*p)));
                current = Some(*p);
                start = Some(*p);
            }
            PathSegment::LineTo(p) => {
                out.push(Step::El(PathEl::LineTo(*p)));
                current = Some(*p);
            }
            PathSegment::CubicTo(a, b, p) => {
                out.push(Step::El(PathEl::CurveTo(*a, *b, *p)));
                current = Some(*p);
            }
            PathSegment::QuadTo(a, p) => {
                out.push(Step::El(PathEl::QuadTo(*a, *p)));
                current = Some(*p);
            }
            PathSegment::Arc {
                rx,
                ry,
                rotation_deg,
                large_arc,
                sweep,
                to,
            } => {
                let finite = [*rx, *ry, *rotation_deg, to.x, to.y]
                    .iter()
                    .all(|v| v.is_finite());
                match current {
                    Some(from) if finite && is_finite(from) => {
                        let arc = kurbo::SvgArc {
                            from,
                            to: *to,
                            radii: kurbo::Vec2::new(*rx, *ry),
                            x_rotation: rotation_deg.to_radians(),
                            large_arc: *large_arc,
                            sweep: *sweep,
                        };
                        match kurbo::Arc::from_svg_arc(&arc) {
                            Some(a) => out.extend(a.append_iter(arc_tolerance).map(Step::El)),
                            // Degenerate arcs render as a straight line.
                            None => out.push(Step::El(PathEl::LineTo(*to))),
                        }
                    }
                    _ => out.push(Step::Skipped {
                        kind: SkipKind::Degenerate,
                        to: Some(*to),
                    }),
                }
                current = Some(*to);
            }
            PathSegment::Close => {
                out.push(Step::El(PathEl::ClosePath));
                current = start;
            }
            PathSegment::Malformed(_) => out.push(Step::Skipped {
                kind: SkipKind::Malformed,
                to: None,
            }),
        }
    }

    out
}

pub(crate) fn is_finite(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}
