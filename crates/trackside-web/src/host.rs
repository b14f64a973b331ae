#![forbid(unsafe_code)]

//! Step-driven runner for the scene engine.
//!
//! [`CanvasHost`] wraps a [`SceneEngine`] and a [`DeterministicClock`] and
//! exposes one method per page event source:
//!
//! 1. Push structural scenes via [`CanvasHost::push_scene`].
//! 2. Deliver each polling interval's deltas via [`CanvasHost::on_interval`].
//! 3. Forward resize observer signals via [`CanvasHost::on_resize`].
//! 4. Advance time via [`CanvasHost::advance_time`], which fires the
//!    debounced relayout and the interaction poll when they come due.
//!
//! # Example
//!
//! ```ignore
//! use trackside_web::{CanvasHost, RecordingSurface};
//! use trackside_runtime::EngineConfig;
//!
//! let mut host = CanvasHost::new(EngineConfig::default(), RecordingSurface::new());
//! host.push_scene(scene);
//! let report = host.on_interval(&batch, &context);
//! host.advance_time(Duration::from_millis(100));
//! ```

use core::time::Duration;
use std::collections::VecDeque;

use trackside_core::{DeltaBatch, SceneDescription, TickContext};
use trackside_runtime::{
    ContainerSize, EngineConfig, InteractionEvent, ResizeAction, SceneEngine, SceneSurface,
    SharedInteractionStore, TickInput, TickOutcome, TickReport,
};

use crate::DeterministicClock;
use crate::recording::RecordingSurface;

/// Tick reports retained by default; older ones are evicted.
pub const DEFAULT_REPORT_CAPACITY: usize = 256;

/// Canvas hooks for host-driven time.
///
/// A real drawing library animates on its own; recording surfaces need to
/// be told what time it is.
pub trait HostSurface: SceneSurface {
    /// Host clock reading before each engine call.
    fn set_now(&mut self, now: Duration) {
        let _ = now;
    }

    /// Host time moved forward by `dt`.
    fn advance(&mut self, dt: Duration) {
        let _ = dt;
    }
}

impl HostSurface for RecordingSurface {
    fn set_now(&mut self, now: Duration) {
        RecordingSurface::set_now(self, now);
    }

    fn advance(&mut self, dt: Duration) {
        RecordingSurface::advance(self, dt);
    }
}

/// Result of a single [`CanvasHost::advance_time`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// What the resize coordinator did.
    pub resize: ResizeAction,
    /// Interaction polls that fired during the step.
    pub polls: u32,
    /// The last event those polls published, if any.
    pub published: Option<InteractionEvent>,
}

/// Host-driven, non-blocking runner for one canvas.
pub struct CanvasHost<S: HostSurface = RecordingSurface> {
    engine: SceneEngine<S>,
    clock: DeterministicClock,
    store: SharedInteractionStore,
    scene: Option<SceneDescription>,
    scene_changed: bool,
    replay_cadence_ms: Option<f64>,
    poll_interval: Duration,
    next_poll: Duration,
    reports: VecDeque<TickReport>,
    report_capacity: usize,
}

impl<S: HostSurface> CanvasHost<S> {
    /// Create a host bound to `surface`.
    #[must_use]
    pub fn new(config: EngineConfig, surface: S) -> Self {
        let poll_interval = config.interaction.poll_interval();
        let mut engine = SceneEngine::new(config).with_surface(surface);
        if let Err(error) = engine.attach_interaction() {
            tracing::warn!(%error, "click listener install failed; retried on next rebuild");
        }
        Self {
            engine,
            clock: DeterministicClock::new(),
            store: SharedInteractionStore::new(),
            scene: None,
            scene_changed: false,
            replay_cadence_ms: None,
            poll_interval,
            next_poll: poll_interval,
            reports: VecDeque::new(),
            report_capacity: DEFAULT_REPORT_CAPACITY,
        }
    }

    /// Share an existing interaction store (builder).
    #[must_use]
    pub fn with_store(mut self, store: SharedInteractionStore) -> Self {
        self.store = store;
        self
    }

    /// Retain at most `capacity` tick reports (builder).
    #[must_use]
    pub fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self.trim_reports();
        self
    }

    #[must_use]
    pub fn engine(&self) -> &SceneEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SceneEngine<S> {
        &mut self.engine
    }

    #[must_use]
    pub fn surface(&self) -> Option<&S> {
        self.engine.surface()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.engine.surface_mut()
    }

    #[must_use]
    pub const fn clock(&self) -> &DeterministicClock {
        &self.clock
    }

    #[must_use]
    pub fn store(&self) -> &SharedInteractionStore {
        &self.store
    }

    /// The scene the next tick reconciles against.
    #[must_use]
    pub fn scene(&self) -> Option<&SceneDescription> {
        self.scene.as_ref()
    }

    /// Most recent tick reports, oldest first.
    #[must_use]
    pub fn reports(&self) -> &VecDeque<TickReport> {
        &self.reports
    }

    /// Drain the retained reports.
    pub fn take_reports(&mut self) -> Vec<TickReport> {
        self.reports.drain(..).collect()
    }

    /// Tick reports as JSONL.
    #[must_use]
    pub fn reports_jsonl(&self) -> String {
        let mut out = String::new();
        for report in &self.reports {
            out.push_str(&report.to_jsonl());
            out.push('\n');
        }
        out
    }

    /// A new structural scene arrived from the store.
    pub fn push_scene(&mut self, scene: SceneDescription) {
        self.scene = Some(scene);
        self.scene_changed = true;
    }

    /// Pace tweens for a replay running at `speed`x.
    ///
    /// Used when the tick context carries no cadence of its own.
    pub fn set_replay_speed(&mut self, speed: f64) {
        let cadence = self.engine.scheduler().cadence_for_replay_speed(speed);
        tracing::debug!(speed, cadence_ms = cadence, "replay pacing set");
        self.replay_cadence_ms = Some(cadence);
    }

    /// Back to live pacing.
    pub fn clear_replay_speed(&mut self) {
        self.replay_cadence_ms = None;
    }

    /// Interval timer fired with this tick's deltas.
    pub fn on_interval(&mut self, batch: &DeltaBatch, context: &TickContext) -> TickReport {
        self.sync_surface_time();
        let paced;
        let context = match (context.cadence_ms, self.replay_cadence_ms) {
            (None, Some(cadence)) => {
                paced = context.clone().with_cadence_ms(cadence);
                &paced
            }
            _ => context,
        };
        let mut input = TickInput::new(batch, context);
        if let Some(scene) = self.scene.as_ref() {
            input = input.with_scene(scene, self.scene_changed);
        }
        let report = self.engine.tick_at(&input, self.clock.instant());
        if !matches!(report.outcome, TickOutcome::Skipped(_)) {
            self.scene_changed = false;
        }
        self.reports.push_back(report.clone());
        self.trim_reports();
        report
    }

    /// Resize observer fired.
    pub fn on_resize(&mut self, size: ContainerSize) -> ResizeAction {
        self.sync_surface_time();
        self.engine.on_resize_at(size, self.clock.instant())
    }

    /// Poll timer fired: publish the click holder if it changed.
    pub fn on_poll(&mut self) -> Option<InteractionEvent> {
        self.engine.poll_interaction(&mut self.store)
    }

    /// Advance host time by `dt` and fire whatever came due.
    pub fn advance_time(&mut self, dt: Duration) -> StepResult {
        self.clock.advance(dt);
        let now = self.clock.now_mono();
        if let Some(surface) = self.engine.surface_mut() {
            surface.advance(dt);
            surface.set_now(now);
        }

        let resize = self.engine.poll_resize_at(self.clock.instant());

        let mut polls = 0;
        let mut published = None;
        while self.next_poll <= now {
            polls += 1;
            if let Some(event) = self.on_poll() {
                published = Some(event);
            }
            self.next_poll += self.poll_interval;
        }

        StepResult {
            resize,
            polls,
            published,
        }
    }

    fn trim_reports(&mut self) {
        while self.reports.len() > self.report_capacity {
            self.reports.pop_front();
        }
    }

    fn sync_surface_time(&mut self) {
        let now = self.clock.now_mono();
        if let Some(surface) = self.engine.surface_mut() {
            surface.set_now(now);
        }
    }
}
