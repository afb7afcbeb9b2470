//! Continuous advance/render loop.
//!
//! The loop asks a [`FrameScheduler`] for one frame at a time and asks for
//! the next one only after the current frame ran. Each start gets a fresh
//! [`CancelToken`]; a frame callback checks it before touching the target
//! and again before rescheduling, so once [`RenderLoop::stop`] returns no
//! further advance or render call happens.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Converts scheduler timestamps (seconds) into frame deltas.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<f64>,
    carried: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous tick, plus any carried time; 0 on the
    /// first tick. Timestamps that go backwards contribute 0.
    pub fn tick(&mut self, now: f64) -> f32 {
        let elapsed = match self.last {
            Some(last) => (now - last).max(0.0) as f32,
            None => 0.0,
        };
        self.last = Some(now);
        elapsed + std::mem::take(&mut self.carried)
    }

    /// Hand a delta that was not consumed back to the next tick.
    pub fn carry(&mut self, delta: f32) {
        self.carried += delta;
    }
}

pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Display-refresh scheduling: runs a callback once, at the next frame,
/// with the frame timestamp in seconds.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback);
}

/// Scheduler driven explicitly, for tests and offline rendering.
#[derive(Default)]
pub struct ManualScheduler {
    pending: RefCell<VecDeque<FrameCallback>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Run the callbacks queued so far. Callbacks they queue wait for the
    /// next call. Returns how many ran.
    pub fn run_pending(&self, now: f64) -> usize {
        let due = std::mem::take(&mut *self.pending.borrow_mut());
        let count = due.len();
        for callback in due {
            callback(now);
        }
        count
    }

    /// Run `frames` frames spaced `step` seconds apart, starting at `start`.
    pub fn run_frames(&self, frames: usize, start: f64, step: f64) {
        for i in 0..frames {
            self.run_pending(start + i as f64 * step);
        }
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        self.pending.borrow_mut().push_back(callback);
    }
}

/// What the loop drives each frame.
pub trait FrameTarget {
    fn advance(&mut self, delta: f32);
    fn render(&mut self);
}

struct LoopContext {
    target: Weak<RefCell<dyn FrameTarget>>,
    scheduler: Weak<dyn FrameScheduler>,
    token: CancelToken,
    clock: RefCell<FrameClock>,
    frames: Rc<Cell<u64>>,
}

fn schedule(ctx: Rc<LoopContext>) {
    let Some(scheduler) = ctx.scheduler.upgrade() else {
        log::debug!("Frame scheduler dropped; render loop ends");
        return;
    };
    scheduler.request_frame(Box::new(move |now| run_frame(ctx, now)));
}

fn run_frame(ctx: Rc<LoopContext>, now: f64) {
    if ctx.token.is_cancelled() {
        return;
    }
    let Some(target) = ctx.target.upgrade() else {
        log::debug!("Render target dropped; render loop ends");
        return;
    };

    let delta = ctx.clock.borrow_mut().tick(now);
    match target.try_borrow_mut() {
        Ok(mut target) => {
            target.advance(delta);
            target.render();
            ctx.frames.set(ctx.frames.get() + 1);
        }
        Err(_) => {
            log::debug!("Render target busy; frame skipped");
            ctx.clock.borrow_mut().carry(delta);
        }
    }
    drop(target);

    if !ctx.token.is_cancelled() {
        schedule(ctx);
    }
}

pub struct RenderLoop {
    token: Option<CancelToken>,
    // Kept alive while running; frame callbacks only hold a weak reference
    scheduler: Option<Rc<dyn FrameScheduler>>,
    frames: Rc<Cell<u64>>,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            token: None,
            scheduler: None,
            frames: Rc::new(Cell::new(0)),
        }
    }

    pub fn state(&self) -> LoopState {
        match &self.token {
            Some(token) if !token.is_cancelled() => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }

    /// Start advancing and rendering `target` every frame. Starting a
    /// running loop does nothing.
    pub fn start(
        &mut self,
        target: Weak<RefCell<dyn FrameTarget>>,
        scheduler: &Rc<dyn FrameScheduler>,
    ) {
        if self.state() == LoopState::Running {
            log::debug!("Render loop already running");
            return;
        }

        let token = CancelToken::new();
        self.token = Some(token.clone());
        self.scheduler = Some(Rc::clone(scheduler));

        schedule(Rc::new(LoopContext {
            target,
            scheduler: Rc::downgrade(scheduler),
            token,
            clock: RefCell::new(FrameClock::new()),
            frames: Rc::clone(&self.frames),
        }));
        log::info!("Render loop started");
    }

    /// Stop the loop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.scheduler = None;
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                token.cancel();
                log::info!(
                    "Render loop stopped after {} frames",
                    self.frames.get()
                );
            }
        }
    }

    /// Frames rendered across all runs of this loop.
    pub fn frames_rendered(&self) -> u64 {
        self.frames.get()
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        advanced: f32,
        advances: u32,
        renders: u32,
    }

    impl FrameTarget for Counter {
        fn advance(&mut self, delta: f32) {
            self.advanced += delta;
            self.advances += 1;
        }

        fn render(&mut self) {
            self.renders += 1;
        }
    }

    fn setup() -> (Rc<RefCell<Counter>>, Rc<ManualScheduler>, Rc<dyn FrameScheduler>) {
        let counter = Rc::new(RefCell::new(Counter::default()));
        let manual = Rc::new(ManualScheduler::new());
        let scheduler: Rc<dyn FrameScheduler> = manual.clone();
        (counter, manual, scheduler)
    }

    fn weak(counter: &Rc<RefCell<Counter>>) -> Weak<RefCell<dyn FrameTarget>> {
        let target: Rc<RefCell<dyn FrameTarget>> = counter.clone();
        Rc::downgrade(&target)
    }

    #[test]
    fn test_frame_clock() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick(10.0), 0.0);
        assert_eq!(clock.tick(10.5), 0.5);
        assert_eq!(clock.tick(10.25), 0.0);

        clock.carry(0.5);
        assert_eq!(clock.tick(10.5), 0.75);
        assert_eq!(clock.tick(11.0), 0.5);
    }

    #[test]
    fn test_loop_advances_then_renders_each_frame() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        assert_eq!(render_loop.state(), LoopState::Running);
        assert_eq!(manual.pending(), 1);

        manual.run_frames(3, 1.0, 0.25);

        let c = counter.borrow();
        assert_eq!(c.advances, 3);
        assert_eq!(c.renders, 3);
        assert_eq!(c.advanced, 0.5);
        assert_eq!(render_loop.frames_rendered(), 3);
        assert_eq!(manual.pending(), 1);
    }

    #[test]
    fn test_stop_is_final_and_idempotent() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        manual.run_pending(0.0);
        render_loop.stop();
        render_loop.stop();

        assert_eq!(render_loop.state(), LoopState::Stopped);
        // The queued callback observes the cancellation and does not reschedule
        manual.run_frames(5, 1.0, 1.0);
        assert_eq!(counter.borrow().renders, 1);
        assert_eq!(manual.pending(), 0);
    }

    #[test]
    fn test_restart_uses_fresh_token() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        render_loop.stop();
        render_loop.start(weak(&counter), &scheduler);

        // Old callback is cancelled, new one runs
        manual.run_pending(0.0);
        assert_eq!(counter.borrow().renders, 1);
        assert_eq!(manual.pending(), 1);
    }

    #[test]
    fn test_double_start_schedules_once() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        render_loop.start(weak(&counter), &scheduler);
        assert_eq!(manual.pending(), 1);
    }

    #[test]
    fn test_dropped_target_ends_loop() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        drop(counter);
        manual.run_pending(0.0);
        assert_eq!(manual.pending(), 0);
        assert_eq!(render_loop.frames_rendered(), 0);
    }

    #[test]
    fn test_busy_target_skips_frame() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        {
            let _held = counter.borrow_mut();
            manual.run_pending(0.0);
        }
        assert_eq!(counter.borrow().renders, 0);
        assert_eq!(manual.pending(), 1);
    }

    #[test]
    fn test_skipped_frame_time_is_not_lost() {
        let (counter, manual, scheduler) = setup();
        let mut render_loop = RenderLoop::new();

        render_loop.start(weak(&counter), &scheduler);
        manual.run_pending(1.0);
        {
            let _held = counter.borrow_mut();
            manual.run_pending(1.5);
        }
        manual.run_pending(2.0);

        let c = counter.borrow();
        assert_eq!(c.advances, 2);
        assert_eq!(c.advanced, 1.0);
    }
}
