use crate::curve::equation::Equation;
use crate::foundation::error::{FrameplotError, FrameplotResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Rendering surface that shows named equations.
///
/// Ordering contract: the scheduler calls `add_equations` and `remove_equations` in strict
/// alternation, one frame at a time, and never sends an empty list.
pub trait EquationSink: Send {
    /// Show `equations`, keyed by their ids.
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()>;
    /// Retract the equations with these ids.
    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()>;
}

impl<S: EquationSink + ?Sized> EquationSink for Box<S> {
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()> {
        (**self).add_equations(equations)
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        (**self).remove_equations(ids)
    }
}

/// Math-space bounds of the graphing surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Minimum x.
    pub left: f64,
    /// Maximum x.
    pub right: f64,
    /// Minimum y.
    pub bottom: f64,
    /// Maximum y.
    pub top: f64,
    /// Disallow user pan/zoom while playing.
    pub locked: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            left: -100.0,
            right: 7000.0,
            bottom: -100.0,
            top: 4500.0,
            locked: true,
        }
    }
}

impl Viewport {
    /// Bounds must be finite and non-empty on both axes.
    pub fn validate(&self) -> FrameplotResult<()> {
        let all_finite = [self.left, self.right, self.bottom, self.top]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(FrameplotError::validation("viewport bounds must be finite"));
        }
        if self.left >= self.right || self.bottom >= self.top {
            return Err(FrameplotError::validation(
                "viewport requires left < right and bottom < top",
            ));
        }
        Ok(())
    }
}

/// One call observed by a sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    /// Surface configuration, emitted before any equations.
    Viewport(Viewport),
    /// `add_equations`.
    Add {
        /// Equations added.
        equations: Vec<Equation>,
    },
    /// `remove_equations`.
    Remove {
        /// Ids retracted.
        ids: Vec<String>,
    },
}

/// In-memory sink for tests and debugging.
///
/// Tracks the visible equation set and counts id collisions (an add for an id that is already
/// visible).
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Vec<SinkEvent>,
    visible: BTreeMap<String, Equation>,
    collisions: usize,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call in order.
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Ids currently shown.
    pub fn visible_ids(&self) -> Vec<String> {
        self.visible.keys().cloned().collect()
    }

    /// Adds that hit an id already on the surface.
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

impl EquationSink for InMemorySink {
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()> {
        for eq in equations {
            if self.visible.insert(eq.id.clone(), eq.clone()).is_some() {
                self.collisions += 1;
            }
        }
        self.events.push(SinkEvent::Add {
            equations: equations.to_vec(),
        });
        Ok(())
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        for id in ids {
            self.visible.remove(id);
        }
        self.events.push(SinkEvent::Remove { ids: ids.to_vec() });
        Ok(())
    }
}

/// Sink that writes one JSON object per call to `W`.
///
/// The first line is always the viewport, so a renderer can set up its surface before any
/// equations arrive.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Write the viewport header and return the sink.
    pub fn new(out: W, viewport: Viewport) -> FrameplotResult<Self> {
        viewport.validate()?;
        let mut sink = Self { out };
        sink.write_event(&SinkEvent::Viewport(viewport))?;
        Ok(sink)
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_event(&mut self, ev: &SinkEvent) -> FrameplotResult<()> {
        serde_json::to_writer(&mut self.out, ev)?;
        self.out
            .write_all(b"\n")
            .and_then(|()| self.out.flush())
            .map_err(|e| FrameplotError::sink(format!("write event: {e}")))
    }
}

impl<W: Write + Send> EquationSink for JsonLinesSink<W> {
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()> {
        self.write_event(&SinkEvent::Add {
            equations: equations.to_vec(),
        })
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        self.write_event(&SinkEvent::Remove { ids: ids.to_vec() })
    }
}
