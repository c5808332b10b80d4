use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use frameplot::{
    CancelToken, Clock, ConvertOpts, Equation, EquationSink, FrameEquationSet, FrameKey,
    FrameplotError, FrameplotResult, HexColor, InMemorySink, ManualClock, PlaybackOpts,
    PlaybackOutcome, PlaybackScheduler, PlaybackState, RawFrames, RawPath, SinkEvent, Wait,
    convert,
};

fn frame(key: &str, n: usize) -> FrameEquationSet {
    FrameEquationSet {
        key: FrameKey::from(key),
        equations: (0..n)
            .map(|i| Equation {
                id: format!("seg{i}"),
                color: HexColor::black(),
                latex: format!("({key},{i})t^3"),
            })
            .collect(),
    }
}

fn wait_for_state<S: EquationSink + 'static, C: Clock>(
    sched: &PlaybackScheduler<S, C>,
    want: PlaybackState,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while sched.state() != want {
        assert!(Instant::now() < deadline, "timed out waiting for {want:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Virtual clock that holds the worker at its first time read until opened.
///
/// The worker reads the clock before its first add, so anything done before `open` happens
/// strictly before frame 0 can reach the sink.
#[derive(Clone, Default)]
struct GatedClock {
    gate: CancelToken,
    inner: ManualClock,
}

impl GatedClock {
    fn open(&self) {
        self.gate.cancel();
    }
}

impl Clock for GatedClock {
    fn now(&self) -> Duration {
        self.gate.wait_timeout(Duration::from_secs(10));
        self.inner.now()
    }

    fn sleep(&self, dur: Duration, cancel: &CancelToken) -> Wait {
        self.inner.sleep(dur, cancel)
    }
}

/// Records every call with the clock time it happened at.
struct TimedSink {
    clock: ManualClock,
    log: Vec<(Duration, SinkEvent)>,
}

impl EquationSink for TimedSink {
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()> {
        self.log.push((
            self.clock.now(),
            SinkEvent::Add {
                equations: equations.to_vec(),
            },
        ));
        Ok(())
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        self.log
            .push((self.clock.now(), SinkEvent::Remove { ids: ids.to_vec() }));
        Ok(())
    }
}

/// Flags any add that arrives while something is still visible.
#[derive(Default)]
struct ExclusiveSink {
    visible: BTreeSet<String>,
    max_visible: usize,
    overlapping_adds: usize,
    adds: usize,
}

impl EquationSink for ExclusiveSink {
    fn add_equations(&mut self, equations: &[Equation]) -> FrameplotResult<()> {
        if !self.visible.is_empty() {
            self.overlapping_adds += 1;
        }
        self.visible.extend(equations.iter().map(|e| e.id.clone()));
        self.max_visible = self.max_visible.max(self.visible.len());
        self.adds += 1;
        Ok(())
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        for id in ids {
            self.visible.remove(id);
        }
        Ok(())
    }
}

/// Fails the n-th add (0-based) or every remove.
struct FlakySink {
    fail_add_at: Option<usize>,
    fail_remove: bool,
    adds: usize,
    removes: Vec<Vec<String>>,
}

impl EquationSink for FlakySink {
    fn add_equations(&mut self, _equations: &[Equation]) -> FrameplotResult<()> {
        let n = self.adds;
        self.adds += 1;
        if self.fail_add_at == Some(n) {
            return Err(FrameplotError::sink("surface unreachable"));
        }
        Ok(())
    }

    fn remove_equations(&mut self, ids: &[String]) -> FrameplotResult<()> {
        self.removes.push(ids.to_vec());
        if self.fail_remove {
            return Err(FrameplotError::sink("surface unreachable"));
        }
        Ok(())
    }
}

/// Asks for a cancel from another thread while the first retract is in flight, and counts any
/// add that starts after that cancel has returned.
struct CancelOnRetractSink {
    retracting: mpsc::Sender<()>,
    signalled: bool,
    cancel_returned: Arc<AtomicBool>,
    late_adds: usize,
    adds: usize,
    removes: usize,
}

impl EquationSink for CancelOnRetractSink {
    fn add_equations(&mut self, _equations: &[Equation]) -> FrameplotResult<()> {
        if self.cancel_returned.load(Ordering::SeqCst) {
            self.late_adds += 1;
        }
        self.adds += 1;
        Ok(())
    }

    fn remove_equations(&mut self, _ids: &[String]) -> FrameplotResult<()> {
        if !self.signalled {
            self.signalled = true;
            let _ = self.retracting.send(());
            // Keep the retract in flight while the other thread calls `cancel`.
            std::thread::sleep(Duration::from_millis(5));
        }
        self.removes += 1;
        Ok(())
    }
}

/// Panics on the n-th add (0-based).
struct PanickySink {
    adds: usize,
    panic_at: usize,
}

impl EquationSink for PanickySink {
    fn add_equations(&mut self, _equations: &[Equation]) -> FrameplotResult<()> {
        let n = self.adds;
        self.adds += 1;
        if n == self.panic_at {
            panic!("renderer exploded");
        }
        Ok(())
    }

    fn remove_equations(&mut self, _ids: &[String]) -> FrameplotResult<()> {
        Ok(())
    }
}

#[test]
fn scenario_timeline_matches_dwell() {
    let mut raw = RawFrames::new();
    raw.insert(FrameKey::from("000"), Some(RawPath::svg("M0,0 C1,1 2,2 3,3")));
    raw.insert(FrameKey::from("001"), Some(RawPath::svg("M0,0 L5,5")));
    let frames = convert(&raw, &ConvertOpts::default()).unwrap().into_frames();

    let clock = ManualClock::new();
    let sink = TimedSink {
        clock: clock.clone(),
        log: Vec::new(),
    };
    let sched = PlaybackScheduler::with_clock(sink, clock.clone());
    let report = sched
        .play(frames, &PlaybackOpts::from_millis(2000).unwrap())
        .unwrap()
        .wait();

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(report.frames_presented, 2);
    assert_eq!(report.elapsed, Duration::from_millis(4000));
    assert_eq!(sched.state(), PlaybackState::Idle);

    sched.with_sink(|s| {
        assert_eq!(s.log.len(), 2);
        let (t0, ev0) = &s.log[0];
        assert_eq!(*t0, Duration::ZERO);
        let SinkEvent::Add { equations } = ev0 else {
            panic!("expected add, got {ev0:?}");
        };
        assert_eq!(equations.len(), 1);
        assert_eq!(equations[0].id, "seg0");

        assert_eq!(
            s.log[1],
            (
                Duration::from_millis(2000),
                SinkEvent::Remove {
                    ids: vec!["seg0".to_owned()]
                }
            )
        );
    });
}

#[test]
fn frames_never_overlap_on_the_sink() {
    let frames: Vec<_> = (0..40)
        .map(|i| frame(&format!("{i:03}"), (i * 7) % 5))
        .collect();
    let expected_adds = frames.iter().filter(|f| !f.is_empty()).count();

    let sched = PlaybackScheduler::with_clock(ExclusiveSink::default(), ManualClock::new());
    let report = sched
        .play(frames, &PlaybackOpts::from_millis(10).unwrap())
        .unwrap()
        .wait();

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(report.frames_presented, 40);
    sched.with_sink(|s| {
        assert_eq!(s.overlapping_adds, 0);
        assert!(s.max_visible <= 4);
        assert_eq!(s.adds, expected_adds);
        assert!(s.visible.is_empty());
    });
}

#[test]
fn cancel_mid_dwell_retracts_once_and_stops() {
    let sched = PlaybackScheduler::new(InMemorySink::new());
    let frames = vec![frame("000", 3), frame("001", 2), frame("002", 1)];
    let started = Instant::now();
    let handle = sched
        .play(frames, &PlaybackOpts::from_millis(10_000).unwrap())
        .unwrap();

    wait_for_state(&sched, PlaybackState::Presenting(0));
    sched.cancel();
    let report = handle.wait();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(report.frames_presented, 1);
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert!(!sched.is_running());

    sched.with_sink(|s| {
        let events = s.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SinkEvent::Add { equations } if equations.len() == 3));
        assert_eq!(
            events[1],
            SinkEvent::Remove {
                ids: vec!["seg0".into(), "seg1".into(), "seg2".into()]
            }
        );
        assert!(s.visible_ids().is_empty());
    });
}

#[test]
fn play_while_running_is_rejected_without_disturbing_the_session() {
    let sched = PlaybackScheduler::new(InMemorySink::new());
    let opts = PlaybackOpts::from_millis(10_000).unwrap();
    let handle = sched.play(vec![frame("000", 1)], &opts).unwrap();
    wait_for_state(&sched, PlaybackState::Presenting(0));

    let err = sched.play(vec![frame("999", 5)], &opts).err();
    assert!(matches!(err, Some(FrameplotError::AlreadyRunning)));
    assert_eq!(sched.state(), PlaybackState::Presenting(0));
    assert_eq!(sched.with_sink(|s| s.visible_ids()), vec!["seg0"]);

    sched.cancel();
    assert_eq!(handle.wait().outcome, PlaybackOutcome::Cancelled);

    let again = sched
        .play(vec![frame("000", 1)], &PlaybackOpts::from_millis(1).unwrap())
        .unwrap()
        .wait();
    assert_eq!(again.outcome, PlaybackOutcome::Completed);
}

#[test]
fn add_failure_aborts_to_idle_after_best_effort_retract() {
    let sink = FlakySink {
        fail_add_at: Some(1),
        fail_remove: false,
        adds: 0,
        removes: Vec::new(),
    };
    let sched = PlaybackScheduler::with_clock(sink, ManualClock::new());
    let report = sched
        .play(
            vec![frame("000", 1), frame("001", 2), frame("002", 1)],
            &PlaybackOpts::default(),
        )
        .unwrap()
        .wait();

    assert!(matches!(report.outcome, PlaybackOutcome::Aborted(ref r) if r.contains("unreachable")));
    assert_eq!(report.frames_presented, 1);
    assert_eq!(sched.state(), PlaybackState::Idle);
    sched.with_sink(|s| {
        assert_eq!(s.adds, 2);
        assert_eq!(
            s.removes,
            vec![
                vec!["seg0".to_owned()],
                vec!["seg0".to_owned(), "seg1".to_owned()]
            ]
        );
    });
}

#[test]
fn remove_failure_aborts_to_idle() {
    let sink = FlakySink {
        fail_add_at: None,
        fail_remove: true,
        adds: 0,
        removes: Vec::new(),
    };
    let sched = PlaybackScheduler::with_clock(sink, ManualClock::new());
    let report = sched
        .play(vec![frame("000", 1), frame("001", 1)], &PlaybackOpts::default())
        .unwrap()
        .wait();

    assert!(matches!(report.outcome, PlaybackOutcome::Aborted(_)));
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert_eq!(sched.with_sink(|s| s.adds), 1);
}

#[test]
fn panicking_sink_is_reported_and_scheduler_recovers() {
    let sink = PanickySink {
        adds: 0,
        panic_at: 0,
    };
    let sched = PlaybackScheduler::with_clock(sink, ManualClock::new());
    let report = sched
        .play(vec![frame("000", 1)], &PlaybackOpts::default())
        .unwrap()
        .wait();

    assert!(matches!(report.outcome, PlaybackOutcome::Aborted(ref r) if r.contains("panicked")));
    assert_eq!(report.frames_presented, 0);
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert!(!sched.is_running());

    // Empty frames never touch the sink, so this completes.
    let again = sched
        .play(vec![frame("000", 0)], &PlaybackOpts::default())
        .unwrap()
        .wait();
    assert_eq!(again.outcome, PlaybackOutcome::Completed);
}

#[test]
fn panic_report_counts_frames_already_shown() {
    let sink = PanickySink {
        adds: 0,
        panic_at: 2,
    };
    let sched = PlaybackScheduler::with_clock(sink, ManualClock::new());
    let report = sched
        .play(
            vec![frame("000", 1), frame("001", 1), frame("002", 1), frame("003", 1)],
            &PlaybackOpts::default(),
        )
        .unwrap()
        .wait();

    assert!(matches!(report.outcome, PlaybackOutcome::Aborted(_)));
    assert_eq!(report.frames_total, 4);
    assert_eq!(report.frames_presented, 2);
    assert_eq!(sched.state(), PlaybackState::Idle);
}

#[test]
fn cancel_before_first_add_leaves_sink_untouched() {
    let clock = GatedClock::default();
    let sched = PlaybackScheduler::with_clock(InMemorySink::new(), clock.clone());
    let handle = sched
        .play(
            vec![frame("000", 2), frame("001", 1)],
            &PlaybackOpts::default(),
        )
        .unwrap();

    assert!(sched.is_running());
    assert_eq!(sched.state(), PlaybackState::Idle);
    sched.cancel();
    clock.open();
    let report = handle.wait();

    assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(report.frames_presented, 0);
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert!(!sched.is_running());
    sched.with_sink(|s| assert!(s.events().is_empty()));
}

#[test]
fn running_session_reads_idle_until_first_frame_lands() {
    let clock = GatedClock::default();
    let sched = PlaybackScheduler::with_clock(InMemorySink::new(), clock.clone());
    let handle = sched
        .play(vec![frame("000", 1)], &PlaybackOpts::default())
        .unwrap();

    assert!(sched.is_running());
    assert!(!handle.is_finished());
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert!(sched.with_sink(|s| s.events().is_empty()));

    clock.open();
    assert_eq!(handle.wait().outcome, PlaybackOutcome::Completed);
    assert_eq!(sched.with_sink(|s| s.events().len()), 2);
}

#[test]
fn cancel_during_retract_admits_no_later_add() {
    for _ in 0..20 {
        let (tx, rx) = mpsc::channel();
        let cancel_returned = Arc::new(AtomicBool::new(false));
        let sink = CancelOnRetractSink {
            retracting: tx,
            signalled: false,
            cancel_returned: Arc::clone(&cancel_returned),
            late_adds: 0,
            adds: 0,
            removes: 0,
        };
        let sched = PlaybackScheduler::new(sink);
        let frames: Vec<_> = (0..500).map(|i| frame(&format!("{i:03}"), 2)).collect();

        let report = std::thread::scope(|scope| {
            let handle = sched
                .play(frames, &PlaybackOpts::from_millis(1).unwrap())
                .unwrap();
            let (sched, cancel_returned) = (&sched, &cancel_returned);
            scope.spawn(move || {
                rx.recv().unwrap();
                sched.cancel();
                cancel_returned.store(true, Ordering::SeqCst);
            });
            handle.wait()
        });

        assert_eq!(report.outcome, PlaybackOutcome::Cancelled, "{report:?}");
        assert!(report.frames_presented < 500);
        assert_eq!(sched.state(), PlaybackState::Idle);
        sched.with_sink(|s| {
            assert_eq!(s.late_adds, 0);
            assert_eq!(s.adds, s.removes);
        });
    }
}
