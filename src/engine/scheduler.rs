//! Frame scheduler and layer lifecycle
//!
//! A single [`Scheduler`] owns every layer's render task and is polled once
//! per display refresh. Each task produces one frame per poll and reports
//! whether it wants another one.
//!
//! ```text
//! Uninitialized ──mount──▶ Running ◀──visible──▶ Suspended
//!       │                     │                      │
//!       └──alloc error──▶ Failed      teardown ──▶ TornDown
//! ```

use std::time::Instant;

use tracing::{debug, info, warn};

use super::color::ColorCache;
use super::pointer::PointerInput;
use super::surface::{SurfaceError, Viewport};
use crate::config::LayerConfig;
use crate::render::LayerOutput;

/// Delta reported for the first frame and after a resume
pub const NOMINAL_FRAME_DELTA: f32 = 1.0 / 60.0;

/// Default upper bound for a single simulation step
pub const DEFAULT_MAX_FRAME_DELTA: f32 = 1.0 / 30.0;

/// Monotonic frame clock producing clamped deltas in seconds
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    max_delta: f32,
}

impl FrameClock {
    pub fn new(max_delta: f32) -> Self {
        Self {
            last: None,
            max_delta: if max_delta.is_finite() && max_delta > 0.0 {
                max_delta
            } else {
                DEFAULT_MAX_FRAME_DELTA
            },
        }
    }

    pub fn tick(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(last) => now
                .checked_duration_since(last)
                .map(|d| d.as_secs_f32())
                .unwrap_or(0.0),
            None => NOMINAL_FRAME_DELTA,
        };
        self.last = Some(now);
        dt.clamp(0.0, self.max_delta)
    }

    /// Forget the previous tick so the next delta is nominal
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Lifecycle of one layer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Uninitialized,
    Running,
    Suspended,
    /// Surface allocation failed; the layer renders nothing
    Failed,
    TornDown,
}

/// Returned by a task after producing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Finish,
}

/// Result of handing a new config snapshot to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigUpdate {
    /// Nothing differed from the current snapshot
    Unchanged,
    /// New snapshot stored; simulation state kept
    Applied,
    /// Pool-affecting fields changed and the pool was re-seeded
    Reseeded,
    /// Snapshot is for a different layer kind
    Incompatible,
}

/// Per-frame inputs shared by all tasks
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub dt: f32,
    pub pointer: PointerInput,
}

/// One layer's simulation and drawing
pub trait RenderTask: std::fmt::Debug {
    fn kind(&self) -> &'static str;

    /// Allocate surfaces and seed simulation state
    fn mount(&mut self, viewport: Viewport, colors: &ColorCache) -> Result<(), SurfaceError>;

    /// Reallocate for a new viewport, keeping previous pixels where possible
    fn resize(&mut self, viewport: Viewport, colors: &ColorCache) -> Result<(), SurfaceError>;

    fn apply_config(&mut self, config: &LayerConfig, colors: &ColorCache) -> ConfigUpdate;

    fn frame(&mut self, ctx: &FrameContext) -> TaskControl;

    /// Release every owned surface. Must be idempotent.
    fn teardown(&mut self);

    /// What to present for the latest frame
    fn output(&self) -> Option<LayerOutput>;
}

#[derive(Debug)]
struct LayerSlot {
    task: Box<dyn RenderTask>,
    state: LayerState,
    frame_requested: bool,
}

impl LayerSlot {
    fn fail(&mut self, error: SurfaceError) {
        warn!("{} layer failed: {}", self.task.kind(), error);
        self.task.teardown();
        self.state = LayerState::Failed;
        self.frame_requested = false;
    }
}

/// Owns the active render tasks in z-order (first = bottom)
#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<LayerSlot>,
    clock: FrameClock,
    viewport: Viewport,
    visible: bool,
}

impl Scheduler {
    pub fn new(viewport: Viewport, max_frame_delta: f32) -> Self {
        Self {
            slots: Vec::new(),
            clock: FrameClock::new(max_frame_delta),
            viewport,
            visible: true,
        }
    }

    /// Mount `task` on top of the stack
    pub fn push(&mut self, task: Box<dyn RenderTask>, colors: &ColorCache) -> LayerState {
        let mut slot = LayerSlot {
            task,
            state: LayerState::Uninitialized,
            frame_requested: false,
        };

        match slot.task.mount(self.viewport, colors) {
            Ok(()) => {
                debug!(
                    "Mounted {} layer at {}x{}",
                    slot.task.kind(),
                    self.viewport.width,
                    self.viewport.height
                );
                slot.state = if self.visible {
                    LayerState::Running
                } else {
                    LayerState::Suspended
                };
                slot.frame_requested = self.visible;
            }
            Err(e) => slot.fail(e),
        }

        let state = slot.state;
        self.slots.push(slot);
        state
    }

    /// Poll every running task that requested a frame
    ///
    /// Returns the number of frames produced.
    pub fn tick(&mut self, now: Instant, pointer: PointerInput) -> usize {
        if !self.visible {
            return 0;
        }

        let dt = self.clock.tick(now);
        let ctx = FrameContext { dt, pointer };

        let mut produced = 0;
        for slot in &mut self.slots {
            if slot.state != LayerState::Running || !slot.frame_requested {
                continue;
            }
            slot.frame_requested = slot.task.frame(&ctx) == TaskControl::Continue;
            produced += 1;
        }
        produced
    }

    pub fn resize(&mut self, viewport: Viewport, colors: &ColorCache) {
        if viewport == self.viewport {
            return;
        }
        info!("Viewport resized to {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;

        for slot in &mut self.slots {
            if !matches!(slot.state, LayerState::Running | LayerState::Suspended) {
                continue;
            }
            match slot.task.resize(viewport, colors) {
                Ok(()) => slot.frame_requested = slot.state == LayerState::Running,
                Err(e) => slot.fail(e),
            }
        }
    }

    /// Suspend or resume every live layer
    ///
    /// Resuming schedules exactly one frame per layer and resets the clock
    /// so hidden time is not simulated.
    pub fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;

        if visible {
            info!("Resuming rendering");
            self.clock.reset();
        } else {
            info!("Suspending rendering");
        }

        for slot in &mut self.slots {
            match (visible, slot.state) {
                (false, LayerState::Running) => {
                    slot.state = LayerState::Suspended;
                    slot.frame_requested = false;
                }
                (true, LayerState::Suspended) => {
                    slot.state = LayerState::Running;
                    slot.frame_requested = true;
                }
                _ => {}
            }
        }
    }

    /// Hand a new snapshot to the layer at `index`
    pub fn apply_config(
        &mut self,
        index: usize,
        config: &LayerConfig,
        colors: &ColorCache,
    ) -> ConfigUpdate {
        let Some(slot) = self.slots.get_mut(index) else {
            return ConfigUpdate::Incompatible;
        };
        let update = slot.task.apply_config(config, colors);
        if matches!(update, ConfigUpdate::Applied | ConfigUpdate::Reseeded)
            && slot.state == LayerState::Running
        {
            slot.frame_requested = true;
        }
        update
    }

    /// Tear down every layer. Safe to call repeatedly.
    pub fn teardown_all(&mut self) {
        for slot in &mut self.slots {
            if slot.state != LayerState::TornDown {
                slot.task.teardown();
                slot.state = LayerState::TornDown;
                slot.frame_requested = false;
            }
        }
    }

    /// Drop every layer after tearing it down
    pub fn clear(&mut self) {
        self.teardown_all();
        self.slots.clear();
    }

    pub fn wants_frame(&self) -> bool {
        self.visible
            && self
                .slots
                .iter()
                .any(|s| s.state == LayerState::Running && s.frame_requested)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.task.kind()).collect()
    }

    #[cfg(test)]
    pub fn states(&self) -> Vec<LayerState> {
        self.slots.iter().map(|s| s.state).collect()
    }

    /// Outputs of live layers, bottom first
    pub fn outputs(&self) -> Vec<LayerOutput> {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, LayerState::Running | LayerState::Suspended))
            .filter_map(|s| s.task.output())
            .collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct CountingTask {
        frames: std::rc::Rc<std::cell::Cell<usize>>,
        teardowns: std::rc::Rc<std::cell::Cell<usize>>,
        fail_on_mount: bool,
        finish_after: Option<usize>,
    }

    impl RenderTask for CountingTask {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn mount(&mut self, viewport: Viewport, _: &ColorCache) -> Result<(), SurfaceError> {
            if self.fail_on_mount {
                Err(SurfaceError::Allocation {
                    width: viewport.width,
                    height: viewport.height,
                })
            } else {
                Ok(())
            }
        }

        fn resize(&mut self, _: Viewport, _: &ColorCache) -> Result<(), SurfaceError> {
            Ok(())
        }

        fn apply_config(&mut self, _: &LayerConfig, _: &ColorCache) -> ConfigUpdate {
            ConfigUpdate::Applied
        }

        fn frame(&mut self, _: &FrameContext) -> TaskControl {
            self.frames.set(self.frames.get() + 1);
            match self.finish_after {
                Some(n) if self.frames.get() >= n => TaskControl::Finish,
                _ => TaskControl::Continue,
            }
        }

        fn teardown(&mut self) {
            self.teardowns.set(self.teardowns.get() + 1);
        }

        fn output(&self) -> Option<LayerOutput> {
            None
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Viewport::new(64, 48), DEFAULT_MAX_FRAME_DELTA)
    }

    #[test]
    fn test_clock_first_tick_is_nominal_and_clamped() {
        let mut clock = FrameClock::new(DEFAULT_MAX_FRAME_DELTA);
        let start = Instant::now();
        assert_eq!(clock.tick(start), NOMINAL_FRAME_DELTA);

        let dt = clock.tick(start + Duration::from_millis(10));
        assert!((dt - 0.010).abs() < 1e-4);

        let dt = clock.tick(start + Duration::from_secs(5));
        assert_eq!(dt, DEFAULT_MAX_FRAME_DELTA);

        clock.reset();
        assert_eq!(clock.tick(start + Duration::from_secs(60)), NOMINAL_FRAME_DELTA);
    }

    #[test]
    fn test_running_tasks_produce_frames() {
        let colors = ColorCache::new();
        let mut sched = scheduler();
        let task = CountingTask::default();
        let frames = task.frames.clone();

        assert_eq!(sched.push(Box::new(task), &colors), LayerState::Running);
        assert!(sched.wants_frame());

        let now = Instant::now();
        for i in 0..3 {
            sched.tick(now + Duration::from_millis(16 * i), PointerInput::CENTER);
        }
        assert_eq!(frames.get(), 3);
    }

    #[test]
    fn test_suspend_and_resume_single_frame() {
        let colors = ColorCache::new();
        let mut sched = scheduler();
        let task = CountingTask::default();
        let frames = task.frames.clone();
        sched.push(Box::new(task), &colors);

        sched.set_visible(false);
        assert_eq!(sched.states(), vec![LayerState::Suspended]);
        assert!(!sched.wants_frame());
        assert_eq!(sched.tick(Instant::now(), PointerInput::CENTER), 0);
        assert_eq!(frames.get(), 0);

        sched.set_visible(true);
        assert_eq!(sched.states(), vec![LayerState::Running]);
        assert!(sched.wants_frame());
        assert_eq!(sched.tick(Instant::now(), PointerInput::CENTER), 1);
    }

    #[test]
    fn test_finish_stops_requests() {
        let colors = ColorCache::new();
        let mut sched = scheduler();
        let task = CountingTask {
            finish_after: Some(2),
            ..Default::default()
        };
        let frames = task.frames.clone();
        sched.push(Box::new(task), &colors);

        let now = Instant::now();
        for _ in 0..5 {
            sched.tick(now, PointerInput::CENTER);
        }
        assert_eq!(frames.get(), 2);
        assert!(!sched.wants_frame());
    }

    #[test]
    fn test_failed_layer_is_isolated() {
        let colors = ColorCache::new();
        let mut sched = scheduler();

        let broken = CountingTask {
            fail_on_mount: true,
            ..Default::default()
        };
        let broken_frames = broken.frames.clone();
        let healthy = CountingTask::default();
        let healthy_frames = healthy.frames.clone();

        assert_eq!(sched.push(Box::new(broken), &colors), LayerState::Failed);
        assert_eq!(sched.push(Box::new(healthy), &colors), LayerState::Running);

        sched.tick(Instant::now(), PointerInput::CENTER);
        assert_eq!(broken_frames.get(), 0);
        assert_eq!(healthy_frames.get(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let colors = ColorCache::new();
        let mut sched = scheduler();
        let task = CountingTask::default();
        let teardowns = task.teardowns.clone();
        sched.push(Box::new(task), &colors);

        sched.teardown_all();
        sched.teardown_all();
        assert_eq!(teardowns.get(), 1);
        assert_eq!(sched.states(), vec![LayerState::TornDown]);
        assert!(!sched.wants_frame());

        drop(sched);
        assert_eq!(teardowns.get(), 1);
    }
}
