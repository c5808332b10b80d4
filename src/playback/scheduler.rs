use crate::curve::convert::FrameEquationSet;
use crate::foundation::error::{FrameplotError, FrameplotResult};
use crate::playback::clock::{CancelToken, Clock, SystemClock, Wait};
use crate::playback::sink::EquationSink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Options controlling playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackOpts {
    /// How long each frame stays on the surface.
    pub dwell: Duration,
}

impl Default for PlaybackOpts {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(2000),
        }
    }
}

impl PlaybackOpts {
    /// Options with a dwell of `ms` milliseconds. Zero is rejected.
    pub fn from_millis(ms: u64) -> FrameplotResult<Self> {
        let opts = Self {
            dwell: Duration::from_millis(ms),
        };
        opts.validate()?;
        Ok(opts)
    }

    /// The dwell must be positive.
    pub fn validate(&self) -> FrameplotResult<()> {
        if self.dwell.is_zero() {
            return Err(FrameplotError::validation("dwell must be > 0"));
        }
        Ok(())
    }
}

/// What the scheduler is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing on the surface.
    Idle,
    /// Frame `i` is on the surface and dwelling.
    Presenting(usize),
    /// Frame `i` is being removed.
    Retracting(usize),
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every frame was presented and retracted.
    Completed,
    /// `cancel` stopped the session early.
    Cancelled,
    /// The sink failed (or the worker panicked); the surface was cleared best-effort.
    Aborted(String),
}

/// Summary handed back when a session ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Frames in the session.
    pub frames_total: usize,
    /// Frames that reached `Presenting`.
    pub frames_presented: usize,
    /// Why the session ended.
    pub outcome: PlaybackOutcome,
    /// Clock time from start to return to `Idle`.
    pub elapsed: Duration,
}

/// Completion signal for one `play` call.
pub struct PlaybackHandle {
    frames_total: usize,
    presented: Arc<AtomicUsize>,
    completion: Completion,
}

enum Completion {
    Ready(PlaybackReport),
    Running(JoinHandle<PlaybackReport>),
}

impl PlaybackHandle {
    /// `true` once the session is back to `Idle`.
    pub fn is_finished(&self) -> bool {
        match &self.completion {
            Completion::Ready(_) => true,
            Completion::Running(worker) => worker.is_finished(),
        }
    }

    /// Block until the session ends.
    pub fn wait(self) -> PlaybackReport {
        match self.completion {
            Completion::Ready(report) => report,
            Completion::Running(worker) => worker.join().unwrap_or_else(|_| PlaybackReport {
                frames_total: self.frames_total,
                frames_presented: self.presented.load(Ordering::Relaxed),
                outcome: PlaybackOutcome::Aborted("playback worker panicked".to_owned()),
                elapsed: Duration::ZERO,
            }),
        }
    }
}

/// Ephemeral state for one run, owned by the worker.
struct PlaybackSession {
    frames: Vec<FrameEquationSet>,
    dwell: Duration,
    index: usize,
    cancel: CancelToken,
    /// Frames that reached `Presenting`; outlives the worker if it panics.
    presented: Arc<AtomicUsize>,
}

struct Control {
    state: PlaybackState,
    /// Present while a session exists; doubles as the re-entrancy flag.
    cancel: Option<CancelToken>,
}

struct Shared<S, C> {
    control: Mutex<Control>,
    sink: Mutex<S>,
    clock: C,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Presents frames one at a time on an exclusively owned sink.
///
/// At most one frame is on the sink at any instant: frame `i` is fully retracted before frame
/// `i + 1` is added. The dwell runs on a worker thread and is interruptible by [`cancel`].
///
/// Lock order is control, then sink.
///
/// [`cancel`]: PlaybackScheduler::cancel
pub struct PlaybackScheduler<S, C = SystemClock> {
    shared: Arc<Shared<S, C>>,
}

impl<S: EquationSink + 'static> PlaybackScheduler<S, SystemClock> {
    /// Scheduler driving `sink` on wall-clock time.
    pub fn new(sink: S) -> Self {
        Self::with_clock(sink, SystemClock::new())
    }
}

impl<S: EquationSink + 'static, C: Clock> PlaybackScheduler<S, C> {
    /// Scheduler driving `sink` on `clock`.
    pub fn with_clock(sink: S, clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: PlaybackState::Idle,
                    cancel: None,
                }),
                sink: Mutex::new(sink),
                clock,
            }),
        }
    }

    /// Current state.
    ///
    /// Between `play` returning and the worker adding frame 0 this still reads `Idle`, while
    /// [`is_running`](Self::is_running) already reports `true`. `Presenting(i)` is only reported
    /// once frame `i` is on the sink.
    pub fn state(&self) -> PlaybackState {
        lock(&self.shared.control).state
    }

    /// `true` while a session exists (including its start-up before the first frame).
    pub fn is_running(&self) -> bool {
        lock(&self.shared.control).cancel.is_some()
    }

    /// Inspect the sink. Blocks while a present or retract is in flight.
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let sink = lock(&self.shared.sink);
        f(&*sink)
    }

    /// Start presenting `frames` in order.
    ///
    /// Fails with [`FrameplotError::AlreadyRunning`] while another session exists; that session
    /// is not disturbed. An empty sequence completes immediately without touching the sink.
    #[tracing::instrument(
        skip_all,
        fields(frame_count = frames.len(), dwell_ms = millis(opts.dwell))
    )]
    pub fn play(
        &self,
        frames: Vec<FrameEquationSet>,
        opts: &PlaybackOpts,
    ) -> FrameplotResult<PlaybackHandle> {
        opts.validate()?;
        let mut control = lock(&self.shared.control);
        if control.cancel.is_some() {
            return Err(FrameplotError::AlreadyRunning);
        }

        let frames_total = frames.len();
        if frames.is_empty() {
            tracing::debug!("nothing to play");
            return Ok(PlaybackHandle {
                frames_total,
                presented: Arc::default(),
                completion: Completion::Ready(PlaybackReport {
                    frames_total,
                    frames_presented: 0,
                    outcome: PlaybackOutcome::Completed,
                    elapsed: Duration::ZERO,
                }),
            });
        }

        let cancel = CancelToken::new();
        let presented = Arc::new(AtomicUsize::new(0));
        let session = PlaybackSession {
            frames,
            dwell: opts.dwell,
            index: 0,
            cancel: cancel.clone(),
            presented: Arc::clone(&presented),
        };
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("frameplot-playback".to_owned())
            .spawn(move || shared.run(session));

        match spawned {
            Ok(worker) => {
                control.cancel = Some(cancel);
                tracing::info!("playback started");
                Ok(PlaybackHandle {
                    frames_total,
                    presented,
                    completion: Completion::Running(worker),
                })
            }
            Err(e) => Err(FrameplotError::Other(
                anyhow::Error::new(e).context("spawn playback worker"),
            )),
        }
    }

    /// Stop the running session.
    ///
    /// Whatever is visible is retracted before the session returns to `Idle`, and no further
    /// frame is added once this returns. No-op when idle.
    pub fn cancel(&self) {
        let control = lock(&self.shared.control);
        if let Some(token) = &control.cancel {
            tracing::debug!(state = ?control.state, "cancelling playback");
            token.cancel();
        }
    }
}

impl<S: EquationSink, C: Clock> Shared<S, C> {
    fn run(&self, mut session: PlaybackSession) -> PlaybackReport {
        let _reset = ResetOnDrop(&self.control);
        let started = self.clock.now();
        let frames_total = session.frames.len();

        let outcome = loop {
            let i = session.index;
            let Some(frame) = session.frames.get(i) else {
                break PlaybackOutcome::Completed;
            };

            {
                let mut control = lock(&self.control);
                // Checked under the control lock, so a returned `cancel()` always wins.
                if session.cancel.is_cancelled() {
                    break PlaybackOutcome::Cancelled;
                }
                if !frame.is_empty() {
                    let mut sink = lock(&self.sink);
                    if let Err(e) = sink.add_equations(&frame.equations) {
                        tracing::warn!(frame = %frame.key, error = %e, "add failed, retracting");
                        control.state = PlaybackState::Retracting(i);
                        if let Err(e) = sink.remove_equations(&frame.ids()) {
                            tracing::warn!(frame = %frame.key, error = %e, "retract failed");
                        }
                        break PlaybackOutcome::Aborted(e.to_string());
                    }
                }
                control.state = PlaybackState::Presenting(i);
            }
            session.presented.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(index = i, frame = %frame.key, curves = frame.equations.len(), "presenting");

            let wait = self.clock.sleep(session.dwell, &session.cancel);

            {
                let mut control = lock(&self.control);
                control.state = PlaybackState::Retracting(i);
                if !frame.is_empty() {
                    if let Err(e) = lock(&self.sink).remove_equations(&frame.ids()) {
                        tracing::warn!(frame = %frame.key, error = %e, "retract failed");
                        break PlaybackOutcome::Aborted(e.to_string());
                    }
                }
            }
            tracing::debug!(index = i, frame = %frame.key, "retracted");

            if wait == Wait::Cancelled {
                break PlaybackOutcome::Cancelled;
            }
            session.index += 1;
        };

        let elapsed = self.clock.now().saturating_sub(started);
        let frames_presented = session.presented.load(Ordering::Relaxed);
        tracing::info!(
            frames_presented,
            frames_total,
            ?outcome,
            elapsed_ms = millis(elapsed),
            "playback finished"
        );
        PlaybackReport {
            frames_total,
            frames_presented,
            outcome,
            elapsed,
        }
    }
}

/// Returns the scheduler to `Idle` when the worker exits, including by panic.
struct ResetOnDrop<'a>(&'a Mutex<Control>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut control = lock(self.0);
        control.state = PlaybackState::Idle;
        control.cancel = None;
    }
}
