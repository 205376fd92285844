//! Presentation state machine.
//!
//! [`PresentationEngine`] owns the display and is advanced by an external
//! [`update`](PresentationEngine::update) tick (see [`crate::host::UpdateLoop`]).
//! Everything else talks to it through a cloneable [`EngineHandle`], which
//! posts [`Action`]s and awaits their answers.
//!
//! ```text
//!            PRESENT               last group done
//!   IDLE ─────────────▶ SHOWING ──────────────────▶ AWAITING_RESPONSE
//!    ▲                     │ response / window over        │
//!    └─────────────────────┴───────────────────────────────┘
//!                      result built and handed over
//! ```
//!
//! Stimuli with `t == 0` are chained to the next entry and shown together as
//! one group. Each tick advances at most one group. The response window `w`
//! of the last stimulus is measured from onset, not from the end of the
//! presentation, but only expires once the last group has left the screen.

pub mod renderer;
pub mod stimulus;

pub use renderer::{ItemId, NullRenderer, RecordingRenderer, RenderCall, Renderer};
pub use stimulus::{
    build_groups, Background, Eye, EyeSample, Group, PresentResult, Rgb, Shape, Stimulus,
    Texture,
};

use crate::camera::SampleCorrelator;
use crate::error::{OpiError, OpiResult};
use crate::messages::Action;
use crate::timing::{Clock, Timer};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Capacity of the action queue.
const ACTION_QUEUE_CAPACITY: usize = 32;

/// Where the engine is in a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Nothing is being presented.
    Idle,
    /// Stimulus groups are on screen.
    Showing,
    /// Everything is hidden and the response window is still open.
    AwaitingResponse,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Idle => "IDLE",
            EngineState::Showing => "SHOWING",
            EngineState::AwaitingResponse => "AWAITING_RESPONSE",
        })
    }
}

/// How long to wait for eye samples when building a result.
#[derive(Debug, Clone, Copy)]
pub struct SampleTiming {
    /// Give up on a sample after this long.
    pub max_wait: Duration,
    /// Re-check the queue (and the interrupt flag) this often.
    pub poll_interval: Duration,
}

impl Default for SampleTiming {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    shape: Shape,
    texture: Texture,
    visible: bool,
}

struct Run {
    stimuli: Vec<Stimulus>,
    groups: Vec<Group>,
    current: usize,
    showing: bool,
    // Sum of the durations of groups already taken off screen.
    accumulated: f64,
    timer: Timer,
    response: oneshot::Sender<OpiResult<PresentResult>>,
}

impl Run {
    fn window(&self) -> f64 {
        self.groups.last().map_or(0.0, |g| g.window)
    }

    fn eye(&self) -> Eye {
        self.groups[self.current].eye
    }
}

/// Stimulus sequencer driven by `update()` ticks.
pub struct PresentationEngine<R: Renderer> {
    renderer: R,
    clock: Arc<dyn Clock>,
    actions: mpsc::Receiver<Action>,
    state: watch::Sender<EngineState>,
    interrupt: Arc<AtomicBool>,
    correlator: Option<SampleCorrelator>,
    sample_timing: SampleTiming,
    items: Vec<Slot>,
    run: Option<Run>,
}

impl<R: Renderer> PresentationEngine<R> {
    /// Create an engine and the handle used to drive it.
    pub fn new(
        renderer: R,
        clock: Arc<dyn Clock>,
        correlator: Option<SampleCorrelator>,
        sample_timing: SampleTiming,
    ) -> (Self, EngineHandle) {
        let (action_tx, actions) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let (state, state_rx) = watch::channel(EngineState::Idle);
        let interrupt = Arc::new(AtomicBool::new(false));
        let handle = EngineHandle {
            actions: action_tx,
            state: state_rx,
            interrupt: interrupt.clone(),
        };
        (
            Self {
                renderer,
                clock,
                actions,
                state,
                interrupt,
                correlator,
                sample_timing,
                items: Vec::new(),
                run: None,
            },
            handle,
        )
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// The renderer, for inspection.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// One frame: apply pending actions, then check presentation deadlines.
    pub fn update(&mut self) {
        while let Ok(action) = self.actions.try_recv() {
            debug!(action = action.name(), "Engine action");
            self.handle_action(action);
        }
        self.check_timing();
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Presentation state changed");
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Show { response } => {
                self.renderer.show_display();
                let _ = response.send(());
            }
            Action::Setup {
                background,
                response,
            } => {
                self.renderer.set_background(&background);
                let _ = response.send(());
            }
            Action::Present { stimuli, response } => self.start(stimuli, response),
            Action::Respond => self.respond(),
            Action::Close { response } => {
                self.abort("Presentation closed");
                self.renderer.close_display();
                self.items.clear();
                let _ = response.send(());
            }
        }
    }

    fn start(
        &mut self,
        stimuli: Vec<Stimulus>,
        response: oneshot::Sender<OpiResult<PresentResult>>,
    ) {
        if self.run.is_some() {
            let _ = response.send(Err(OpiError::PresentationInProgress));
            return;
        }
        if let Err(e) = stimulus::validate_sequence(&stimuli) {
            let _ = response.send(Err(e));
            return;
        }
        self.interrupt.store(false, Ordering::Release);
        if let Some(correlator) = &self.correlator {
            correlator.clear();
        }

        let groups = build_groups(&stimuli);
        let now = self.clock.now_ms();
        let mut timer = Timer::default();
        timer.start(now);
        let run = Run {
            stimuli,
            groups,
            current: 0,
            showing: true,
            accumulated: 0.0,
            timer,
            response,
        };

        self.show_group(&run);
        if let Some(correlator) = &self.correlator {
            correlator.request_sample(now, run.eye());
        }
        info!(
            stimuli = run.stimuli.len(),
            groups = run.groups.len(),
            onset = now,
            "Presentation started"
        );
        self.run = Some(run);
        self.set_state(EngineState::Showing);
    }

    fn respond(&mut self) {
        let Some(mut run) = self.run.take() else {
            debug!("Response ignored; nothing is being presented");
            return;
        };
        let now = self.clock.now_ms();
        run.timer.stop(now);
        self.hide_all();
        if let Some(correlator) = &self.correlator {
            correlator.request_sample(now, run.eye());
        }
        self.finish(run, true, Some(now));
    }

    fn check_timing(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        if self.interrupt.load(Ordering::Acquire) {
            self.run = Some(run);
            self.abort("Presentation interrupted");
            return;
        }

        let now = self.clock.now_ms();
        let elapsed = run.timer.elapsed(now) as f64;
        let duration = run.groups[run.current].duration;

        if run.showing && elapsed >= run.accumulated + duration {
            run.accumulated += duration;
            if run.current + 1 < run.groups.len() {
                run.current += 1;
                debug!(group = run.current, elapsed, "Next stimulus group");
                self.show_group(&run);
            } else {
                run.showing = false;
                self.hide_all();
                self.set_state(EngineState::AwaitingResponse);
            }
            self.run = Some(run);
        } else if !run.showing && elapsed > run.window() {
            run.timer.stop(now);
            self.hide_all();
            self.finish(run, false, None);
        } else {
            self.run = Some(run);
        }
    }

    fn finish(&mut self, run: Run, seen: bool, response_at: Option<u64>) {
        let onset = run.timer.started_at().unwrap_or_default();
        let time = run.timer.elapsed(self.clock.now_ms());
        let (start, end) = match &self.correlator {
            None => (None, None),
            Some(correlator) => {
                let SampleTiming {
                    max_wait,
                    poll_interval,
                } = self.sample_timing;
                let start = correlator
                    .await_sample(onset, max_wait, poll_interval, &self.interrupt)
                    .map(|s| EyeSample::relative_to(&s, onset));
                let end = response_at.and_then(|at| {
                    correlator
                        .await_sample(at, max_wait, poll_interval, &self.interrupt)
                        .map(|s| EyeSample::relative_to(&s, onset))
                });
                (start, end)
            }
        };

        let result = PresentResult {
            seen,
            time,
            start,
            end,
        };
        info!(seen, time, "Presentation finished");
        self.set_state(EngineState::Idle);
        if run.response.send(Ok(result)).is_err() {
            warn!("Presentation result dropped; requester went away");
        }
    }

    fn abort(&mut self, reason: &str) {
        self.hide_all();
        if let Some(run) = self.run.take() {
            warn!(reason, "Presentation abandoned");
            let _ = run
                .response
                .send(Err(OpiError::DeviceCommunication(reason.to_string())));
        }
        self.set_state(EngineState::Idle);
    }

    fn show_group(&mut self, run: &Run) {
        let members = &run.stimuli[run.groups[run.current].members.clone()];
        for (slot, stimulus) in members.iter().enumerate() {
            let wanted = Slot {
                shape: stimulus.shape,
                texture: stimulus.texture,
                visible: true,
            };
            match self.items.get_mut(slot) {
                Some(item) if item.shape == stimulus.shape && item.texture == stimulus.texture => {
                    self.renderer.update_item(slot, stimulus);
                    item.visible = true;
                }
                Some(item) => {
                    self.renderer.add_item(slot, stimulus);
                    *item = wanted;
                }
                None => {
                    self.renderer.add_item(slot, stimulus);
                    self.items.push(wanted);
                }
            }
        }
        for (slot, item) in self.items.iter_mut().enumerate().skip(members.len()) {
            if item.visible {
                self.renderer.hide_item(slot);
                item.visible = false;
            }
        }
    }

    fn hide_all(&mut self) {
        for (slot, item) in self.items.iter_mut().enumerate() {
            if item.visible {
                self.renderer.hide_item(slot);
                item.visible = false;
            }
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

fn engine_gone<T>(_: T) -> OpiError {
    OpiError::DeviceCommunication("Presentation engine is not running".to_string())
}

/// Cloneable handle to a running [`PresentationEngine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    actions: mpsc::Sender<Action>,
    state: watch::Receiver<EngineState>,
    interrupt: Arc<AtomicBool>,
}

impl EngineHandle {
    async fn post(&self, action: Action) -> OpiResult<()> {
        self.actions.send(action).await.map_err(engine_gone)
    }

    /// Reveal the display.
    pub async fn show(&self) -> OpiResult<()> {
        let (action, rx) = Action::show();
        self.post(action).await?;
        rx.await.map_err(engine_gone)
    }

    /// Apply background and fixation settings.
    pub async fn setup(&self, background: Background) -> OpiResult<()> {
        let (action, rx) = Action::setup(background);
        self.post(action).await?;
        rx.await.map_err(engine_gone)
    }

    /// Present `stimuli` and wait for the result.
    pub async fn present(&self, stimuli: Vec<Stimulus>) -> OpiResult<PresentResult> {
        let (action, rx) = Action::present(stimuli);
        self.post(action).await?;
        rx.await.map_err(engine_gone)?
    }

    /// Hide everything and close the display.
    pub async fn close(&self) -> OpiResult<()> {
        let (action, rx) = Action::close();
        self.post(action).await?;
        rx.await.map_err(engine_gone)
    }

    /// Cancel waits inside a running presentation.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Latest published state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Response button bound to this engine.
    pub fn button(&self) -> ResponseButton {
        ResponseButton {
            actions: self.actions.clone(),
        }
    }
}

/// Posts subject responses from any thread.
#[derive(Debug, Clone)]
pub struct ResponseButton {
    actions: mpsc::Sender<Action>,
}

impl ResponseButton {
    /// Report a press. Returns false when the engine is gone or backlogged.
    pub fn press(&self) -> bool {
        self.actions.try_send(Action::Respond).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SampleResponse;
    use crate::timing::ManualClock;
    use std::time::Duration;

    fn stimulus(x: f64, t: f64, w: f64) -> Stimulus {
        Stimulus {
            x,
            t,
            w,
            ..Stimulus::default()
        }
    }

    fn engine(
        clock: &ManualClock,
    ) -> (PresentationEngine<RecordingRenderer>, EngineHandle, RecordingRenderer) {
        let renderer = RecordingRenderer::new();
        let (engine, handle) = PresentationEngine::new(
            renderer.clone(),
            Arc::new(clock.clone()),
            None,
            SampleTiming::default(),
        );
        (engine, handle, renderer)
    }

    fn post(handle: &EngineHandle, stimuli: Vec<Stimulus>) -> oneshot::Receiver<OpiResult<PresentResult>> {
        let (action, rx) = Action::present(stimuli);
        handle.actions.try_send(action).unwrap();
        rx
    }

    #[test]
    fn test_groups_are_sequenced_by_ticks() {
        let clock = ManualClock::new(10_000);
        let (mut engine, handle, renderer) = engine(&clock);
        let mut rx = post(
            &handle,
            vec![
                stimulus(1.0, 0.0, 1500.0),
                stimulus(2.0, 0.0, 1500.0),
                stimulus(3.0, 200.0, 1500.0),
                stimulus(4.0, 150.0, 1500.0),
            ],
        );

        engine.update();
        assert_eq!(engine.state(), EngineState::Showing);
        assert_eq!(renderer.visible(), vec![0, 1, 2]);

        clock.advance(199);
        engine.update();
        assert_eq!(renderer.visible(), vec![0, 1, 2]);

        clock.advance(1);
        engine.update();
        assert_eq!(renderer.visible(), vec![0]);
        match renderer.calls().iter().rev().find(|c| matches!(c, RenderCall::Update(..))) {
            Some(RenderCall::Update(0, s)) => assert_eq!(s.x, 4.0),
            other => panic!("expected update of slot 0, got {other:?}"),
        }

        clock.advance(149);
        engine.update();
        assert_eq!(engine.state(), EngineState::Showing);

        clock.advance(1);
        engine.update();
        assert_eq!(engine.state(), EngineState::AwaitingResponse);
        assert!(renderer.visible().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_response_builds_seen_result() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, _renderer) = engine(&clock);
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();

        clock.advance(412);
        assert!(handle.button().press());
        engine.update();

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.seen);
        assert_eq!(result.time, 412);
        assert!(result.start.is_none());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_response_while_showing_is_accepted() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, renderer) = engine(&clock);
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        clock.advance(50);
        handle.button().press();
        engine.update();

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.seen);
        assert_eq!(result.time, 50);
        assert!(renderer.visible().is_empty());
    }

    #[test]
    fn test_window_timeout_builds_unseen_result() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, _renderer) = engine(&clock);
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        clock.advance(200);
        engine.update();
        clock.advance(1300);
        engine.update();
        assert_eq!(engine.state(), EngineState::AwaitingResponse);

        clock.advance(1);
        engine.update();
        let result = rx.try_recv().unwrap().unwrap();
        assert!(!result.seen);
        assert_eq!(result.time, 1501);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_window_waits_for_last_group_to_finish() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, renderer) = engine(&clock);
        let mut rx = post(
            &handle,
            vec![stimulus(1.0, 200.0, 300.0), stimulus(2.0, 150.0, 300.0)],
        );
        engine.update();

        clock.set(200);
        engine.update();
        assert_eq!(engine.state(), EngineState::Showing);
        assert_eq!(renderer.visible(), vec![0]);

        clock.set(301);
        engine.update();
        assert_eq!(engine.state(), EngineState::Showing);
        assert_eq!(renderer.visible(), vec![0]);
        assert!(rx.try_recv().is_err());

        clock.set(350);
        engine.update();
        assert_eq!(engine.state(), EngineState::AwaitingResponse);
        assert!(renderer.visible().is_empty());
        assert!(rx.try_recv().is_err());

        clock.set(351);
        engine.update();
        let result = rx.try_recv().unwrap().unwrap();
        assert!(!result.seen);
        assert_eq!(result.time, 351);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_present_while_busy_is_rejected() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, _renderer) = engine(&clock);
        let _first = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        let mut second = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        assert!(matches!(
            second.try_recv().unwrap(),
            Err(OpiError::PresentationInProgress)
        ));
    }

    #[test]
    fn test_close_tears_down_running_presentation() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, renderer) = engine(&clock);
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        let (close, mut closed) = Action::close();
        handle.actions.try_send(close).unwrap();
        engine.update();

        assert!(closed.try_recv().is_ok());
        assert!(rx.try_recv().unwrap().is_err());
        assert!(renderer.visible().is_empty());
        assert_eq!(renderer.calls().last(), Some(&RenderCall::Close));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_items_rebuilt_only_when_shape_changes() {
        let clock = ManualClock::new(0);
        let (mut engine, handle, renderer) = engine(&clock);
        let mut square = stimulus(0.0, 100.0, 1500.0);
        square.shape = Shape::Square;
        let _rx = post(
            &handle,
            vec![stimulus(0.0, 100.0, 1500.0), stimulus(1.0, 100.0, 1500.0), square],
        );
        engine.update();
        clock.advance(100);
        engine.update();
        clock.advance(100);
        engine.update();

        let calls: Vec<_> = renderer
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RenderCall::Add(..) | RenderCall::Update(..)))
            .collect();
        assert!(matches!(calls[0], RenderCall::Add(0, _)));
        assert!(matches!(calls[1], RenderCall::Update(0, _)));
        assert!(matches!(calls[2], RenderCall::Add(0, ref s) if s.shape == Shape::Square));
    }

    #[test]
    fn test_samples_attached_to_result() {
        let clock = ManualClock::new(1_000);
        let renderer = RecordingRenderer::new();
        let (correlator, link) = SampleCorrelator::new(8);
        let (mut engine, handle) = PresentationEngine::new(
            renderer,
            Arc::new(clock.clone()),
            Some(correlator),
            SampleTiming {
                max_wait: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
        );
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();

        let start = link.next_request(Duration::from_millis(10)).unwrap();
        assert_eq!(start.timestamp, 1_000);
        link.submit_response(
            SampleResponse {
                request_timestamp: 1_000,
                acquisition_timestamp: 1_002,
                x: 0.5,
                y: 0.25,
                diameter: 4.0,
            },
            Duration::from_millis(10),
        )
        .unwrap();

        clock.advance(300);
        handle.button().press();
        engine.update();

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.seen);
        let eye = result.start.unwrap();
        assert_eq!(eye.time, 2);
        assert_eq!(eye.x, 0.5);
        assert!(result.end.is_none());
        assert_eq!(link.next_request(Duration::from_millis(10)).unwrap().timestamp, 1_300);
    }

    #[test]
    fn test_start_and_end_samples_reported() {
        let clock = ManualClock::new(5_000);
        let (correlator, link) = SampleCorrelator::new(8);
        let (mut engine, handle) = PresentationEngine::new(
            RecordingRenderer::new(),
            Arc::new(clock.clone()),
            Some(correlator),
            SampleTiming {
                max_wait: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
        );
        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        clock.advance(200);
        engine.update();
        assert_eq!(engine.state(), EngineState::AwaitingResponse);

        let sample = |request_timestamp, acquisition_timestamp, x| SampleResponse {
            request_timestamp,
            acquisition_timestamp,
            x,
            y: -1.0,
            diameter: 5.0,
        };
        link.submit_response(sample(5_000, 5_003, 0.5), Duration::from_millis(10))
            .unwrap();
        link.submit_response(sample(5_420, 5_424, 2.5), Duration::from_millis(10))
            .unwrap();

        clock.set(5_420);
        handle.button().press();
        engine.update();

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.seen);
        assert_eq!(result.time, 420);
        assert_eq!(result.start.unwrap().time, 3);
        let end = result.end.unwrap();
        assert_eq!(end.x, 2.5);
        assert_eq!(end.time, 424);

        let json = result.to_json();
        assert_eq!(json["eyexStart"], 0.5);
        assert_eq!(json["eyexEnd"], 2.5);
        assert_eq!(json["eyetEnd"], 424);
        assert_eq!(json["eyedEnd"], 5.0);

        let requests: Vec<u64> = std::iter::from_fn(|| link.next_request(Duration::from_millis(5)))
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(requests, vec![5_000, 5_420]);
    }

    #[test]
    fn test_new_run_discards_stale_samples() {
        let clock = ManualClock::new(100);
        let (correlator, link) = SampleCorrelator::new(8);
        let observer = correlator.clone();
        let (mut engine, handle) = PresentationEngine::new(
            RecordingRenderer::new(),
            Arc::new(clock.clone()),
            Some(correlator),
            SampleTiming {
                max_wait: Duration::from_millis(20),
                poll_interval: Duration::from_millis(5),
            },
        );
        link.submit_response(
            SampleResponse {
                request_timestamp: 7,
                acquisition_timestamp: 8,
                x: 0.0,
                y: 0.0,
                diameter: 4.0,
            },
            Duration::from_millis(10),
        )
        .unwrap();

        let mut rx = post(&handle, vec![stimulus(0.0, 200.0, 1500.0)]);
        engine.update();
        clock.advance(250);
        handle.button().press();
        engine.update();

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.start.is_none());
        let requests: Vec<u64> = std::iter::from_fn(|| link.next_request(Duration::from_millis(5)))
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(requests, vec![100, 350]);
        let stale = observer.await_sample(
            7,
            Duration::from_millis(20),
            Duration::from_millis(5),
            &AtomicBool::new(false),
        );
        assert!(stale.is_none());
    }
}
