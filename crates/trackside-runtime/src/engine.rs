//! The scene engine: one per canvas.
//!
//! [`SceneEngine`] owns the engine state and the components and runs them
//! in order for each tick:
//!
//! 1. reconcile the scene description (rebuild or not);
//! 2. plan slot patches for the delta batch;
//! 3. pick the apply mode;
//! 4. apply to the canvas, then commit the plan.
//!
//! Resize signals and interaction polls arrive on their own schedules and
//! go through [`SceneEngine::on_resize_at`], [`SceneEngine::poll_resize_at`],
//! and [`SceneEngine::poll_interaction`].
//!
//! No error escapes a tick. Failures are logged and reported as
//! [`TickOutcome::Skipped`].

use std::fmt::Write as _;

use web_time::Instant;

use trackside_core::{DeltaBatch, SceneDescription, TickContext};

use crate::animation_scheduler::{AnimationScheduler, ApplyMode, ScheduleDecision};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::interaction_bridge::{
    ClickHolder, InteractionBridge, InteractionEvent, InteractionStore,
};
use crate::patch_planner::{PatchKind, PatchPlanner};
use crate::reconciler::{ReconcileOutcome, ReconcileStats, RevisionReconciler};
use crate::resize_coordinator::{ResizeAction, ResizeCoordinator, ResizeStats, SignalOutcome};
use crate::scene_cache::RebuildReason;
use crate::state::EngineState;
use crate::surface::{ContainerSize, SceneSurface, Transition};

#[inline]
fn json_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Inputs of one delta tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    /// Scene description, when the host has one for this tick.
    pub scene: Option<&'a SceneDescription>,
    /// The host signalled a structural scene change with this tick.
    pub scene_changed: bool,
    pub batch: &'a DeltaBatch,
    pub context: &'a TickContext,
}

impl<'a> TickInput<'a> {
    /// A tick carrying only deltas.
    #[must_use]
    pub fn new(batch: &'a DeltaBatch, context: &'a TickContext) -> Self {
        Self {
            scene: None,
            scene_changed: false,
            batch,
            context,
        }
    }

    /// Attach a scene description.
    #[must_use]
    pub fn with_scene(mut self, scene: &'a SceneDescription, scene_changed: bool) -> Self {
        self.scene = Some(scene);
        self.scene_changed = scene_changed;
        self
    }
}

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Patches reached the canvas.
    Applied,
    /// The scene was rebuilt and this tick's patches were suppressed.
    RebuiltOnly,
    /// Nothing to apply.
    Idle,
    /// The tick did nothing because of a recoverable error.
    Skipped(EngineError),
}

impl TickOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RebuiltOnly => "rebuilt_only",
            Self::Idle => "idle",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub rebuild: Option<RebuildReason>,
    pub revision_changed: bool,
    pub patches_suppressed: bool,
    pub decision: Option<ScheduleDecision>,
    pub updated: usize,
    pub ghosted: usize,
    pub restyled: usize,
    /// Slots whose position was interpolated.
    pub tweened: usize,
    /// Identities skipped for non-numeric coordinates.
    pub invalid: Vec<String>,
    /// Deltas for identities not in the scene.
    pub dropped: usize,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            rebuild: None,
            revision_changed: false,
            patches_suppressed: false,
            decision: None,
            updated: 0,
            ghosted: 0,
            restyled: 0,
            tweened: 0,
            invalid: Vec::new(),
            dropped: 0,
            outcome: TickOutcome::Idle,
        }
    }

    fn skipped(mut self, error: EngineError) -> Self {
        self.outcome = TickOutcome::Skipped(error);
        self
    }

    /// Number of slot patches sent to the canvas.
    #[must_use]
    pub fn patched(&self) -> usize {
        if self.outcome == TickOutcome::Applied {
            self.updated + self.ghosted + self.restyled
        } else {
            0
        }
    }

    /// Serialize to one JSONL line.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let rebuild = self
            .rebuild
            .map_or_else(|| "null".to_string(), |r| format!("\"{}\"", r.as_str()));
        let (mode, reason, duration_ms) = match self.decision {
            Some(d) => (
                format!("\"{}\"", d.mode.as_str()),
                format!("\"{}\"", d.reason.as_str()),
                format!("{:.3}", d.mode.duration().as_secs_f64() * 1000.0),
            ),
            None => ("null".into(), "null".into(), "null".into()),
        };
        let error = match &self.outcome {
            TickOutcome::Skipped(e) => format!(
                r#"{{"kind":"{}","message":"{}"}}"#,
                e.kind(),
                json_escape(&e.to_string())
            ),
            _ => "null".to_string(),
        };
        let invalid = self
            .invalid
            .iter()
            .map(|id| format!("\"{}\"", json_escape(id)))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{"event":"tick","tick":{},"outcome":"{}","rebuild":{},"revision_changed":{},"patches_suppressed":{},"mode":{},"reason":{},"duration_ms":{},"updated":{},"ghosted":{},"restyled":{},"tweened":{},"dropped":{},"invalid":[{}],"error":{}}}"#,
            self.tick,
            self.outcome.as_str(),
            rebuild,
            self.revision_changed,
            self.patches_suppressed,
            mode,
            reason,
            duration_ms,
            self.updated,
            self.ghosted,
            self.restyled,
            self.tweened,
            self.dropped,
            invalid,
            error,
        )
    }
}

/// Reconciliation and animation engine bound to (at most) one canvas.
pub struct SceneEngine<S> {
    config: EngineConfig,
    surface: Option<S>,
    state: EngineState,
    reconciler: RevisionReconciler,
    planner: PatchPlanner,
    scheduler: AnimationScheduler,
    interaction: InteractionBridge,
    resize: ResizeCoordinator,
    ticks: u64,
}

impl<S: SceneSurface> SceneEngine<S> {
    /// An engine with no canvas attached yet.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            planner: PatchPlanner::new(config.style.clone()),
            scheduler: AnimationScheduler::new(config.animation.clone()),
            resize: ResizeCoordinator::new(config.resize.clone()),
            config,
            surface: None,
            state: EngineState::default(),
            reconciler: RevisionReconciler::new(),
            interaction: InteractionBridge::new(),
            ticks: 0,
        }
    }

    /// Builder: attach a canvas.
    #[must_use]
    pub fn with_surface(mut self, surface: S) -> Self {
        self.attach_surface(surface);
        self
    }

    /// Bind to a canvas, returning the previous one.
    ///
    /// Engine state belongs to the canvas, so it starts over.
    pub fn attach_surface(&mut self, surface: S) -> Option<S> {
        let previous = self.surface.replace(surface);
        self.reset_canvas_state();
        previous
    }

    /// Unbind from the canvas.
    pub fn detach_surface(&mut self) -> Option<S> {
        let previous = self.surface.take();
        self.reset_canvas_state();
        previous
    }

    fn reset_canvas_state(&mut self) {
        self.state = EngineState::default();
        self.planner.reset();
        self.resize = ResizeCoordinator::new(self.config.resize.clone());
    }

    #[must_use]
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[must_use]
    pub fn planner(&self) -> &PatchPlanner {
        &self.planner
    }

    #[must_use]
    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn reconcile_stats(&self) -> ReconcileStats {
        self.reconciler.stats()
    }

    #[must_use]
    pub fn resize_stats(&self) -> ResizeStats {
        self.resize.stats()
    }

    #[must_use]
    pub fn resize_coordinator(&self) -> &ResizeCoordinator {
        &self.resize
    }

    /// Ticks processed so far, skipped ones included.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Identity rendered in a slot of the current scene.
    #[must_use]
    pub fn identity_at(&self, slot: usize) -> Option<&str> {
        self.state.index.identity_at(slot)
    }

    // ── Ticks ──────────────────────────────────────────────────────────

    /// Run one tick now.
    pub fn tick(&mut self, input: &TickInput<'_>) -> TickReport {
        self.tick_at(input, Instant::now())
    }

    /// Run one tick at `now`.
    pub fn tick_at(&mut self, input: &TickInput<'_>, now: Instant) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::new(self.ticks);

        let Some(surface) = self.surface.as_mut() else {
            tracing::warn!(tick = self.ticks, "tick without a canvas; skipped");
            return report.skipped(EngineError::MissingSurface);
        };

        if let Some(scene) = input.scene {
            match self.reconciler.reconcile(
                &mut self.state,
                surface,
                scene,
                input.scene_changed,
                input.batch,
                input.context,
            ) {
                ReconcileOutcome::Skipped(error) => {
                    tracing::warn!(
                        tick = self.ticks,
                        kind = error.kind(),
                        %error,
                        "reconciliation skipped"
                    );
                    return report.skipped(error);
                }
                ReconcileOutcome::Unchanged => {}
                ReconcileOutcome::Rebuilt {
                    reason,
                    suppress_patches,
                    revision_changed,
                } => {
                    report.rebuild = Some(reason);
                    report.revision_changed = revision_changed;
                    if let Ok(valid) = scene.validate() {
                        self.planner.reseed(valid.entities, &self.state.index);
                    }
                    if revision_changed {
                        self.interaction.clear_holder();
                        tracing::info!(
                            revision = self.state.cache.revision().map(|r| r.as_str()),
                            "scene revision changed; selection cleared"
                        );
                    }
                    if let Err(error) = self.interaction.ensure_attached(surface) {
                        tracing::warn!(%error, "click listener install failed");
                    }
                    if suppress_patches {
                        tracing::debug!(
                            tick = self.ticks,
                            status = input.context.session_status.as_str(),
                            batch = input.batch.len(),
                            "patches suppressed after rebuild"
                        );
                        report.patches_suppressed = true;
                        report.outcome = TickOutcome::RebuiltOnly;
                        return report;
                    }
                }
            }
        }

        let plan = self.planner.plan(
            input.batch,
            input.context.selected_entity.as_deref(),
            &self.state.index,
        );
        for identity in plan.invalid() {
            let error = EngineError::InvalidDeltaEntry {
                identity: identity.clone(),
            };
            tracing::trace!(kind = error.kind(), %error, "delta entry skipped");
        }
        report.invalid = plan.invalid().to_vec();
        report.dropped = plan.dropped().len();

        let decision = self.scheduler.schedule_at(
            input.context.cadence(),
            &mut self.state.suppression,
            self.config.resize.cooldown(),
            now,
        );
        report.decision = Some(decision);
        tracing::debug!(
            tick = self.ticks,
            mode = decision.mode.as_str(),
            reason = decision.reason.as_str(),
            duration_ms = decision.mode.duration().as_millis() as u64,
            patches = plan.patches().len(),
            "apply mode chosen"
        );

        if plan.is_empty() {
            self.planner.commit(plan);
            report.outcome = if report.rebuild.is_some() {
                TickOutcome::RebuiltOnly
            } else {
                TickOutcome::Idle
            };
            return report;
        }

        let applied = match decision.mode {
            ApplyMode::Instant => surface.apply_patches(plan.patches()),
            ApplyMode::Tween { duration, easing } => surface.tween_patches(
                plan.patches(),
                plan.frames(),
                Transition { duration, easing },
            ),
        };
        if let Err(error) = applied {
            let error = EngineError::RenderApplyFailure(error);
            tracing::warn!(tick = self.ticks, %error, "apply failed; tick skipped");
            return report.skipped(error);
        }

        report.updated = plan.count(PatchKind::Update);
        report.ghosted = plan.count(PatchKind::Ghost);
        report.restyled = plan.count(PatchKind::Restyle);
        report.tweened = match decision.mode {
            ApplyMode::Instant => 0,
            ApplyMode::Tween { .. } => plan.frames().len(),
        };
        report.outcome = TickOutcome::Applied;
        self.planner.commit(plan);
        report
    }

    // ── Resize ─────────────────────────────────────────────────────────

    /// Feed a resize observer signal now.
    pub fn on_resize(&mut self, size: ContainerSize) -> ResizeAction {
        self.on_resize_at(size, Instant::now())
    }

    /// Feed a resize observer signal at `now`.
    pub fn on_resize_at(&mut self, size: ContainerSize, now: Instant) -> ResizeAction {
        match self.resize.signal_at(size, now) {
            SignalOutcome::Skipped => ResizeAction::None,
            SignalOutcome::Pending => match self.drive_resize_at(now) {
                ResizeAction::None => ResizeAction::Coalescing,
                action => action,
            },
        }
    }

    /// Relayout if a debounced resize is due now.
    pub fn poll_resize(&mut self) -> ResizeAction {
        self.poll_resize_at(Instant::now())
    }

    /// Relayout if a debounced resize is due at `now`.
    pub fn poll_resize_at(&mut self, now: Instant) -> ResizeAction {
        self.drive_resize_at(now)
    }

    fn drive_resize_at(&mut self, now: Instant) -> ResizeAction {
        let Some(due) = self.resize.due_at(now) else {
            return ResizeAction::None;
        };
        let Some(surface) = self.surface.as_mut() else {
            tracing::warn!(size = %due.size, "relayout due without a canvas; kept pending");
            return ResizeAction::None;
        };
        match surface.relayout(due.size) {
            Ok(()) => {
                self.resize.confirm_at(&due, now);
                self.state
                    .suppression
                    .arm(now, self.config.resize.cooldown());
                ResizeAction::Relayout {
                    size: due.size,
                    coalesce_time: due.coalesce_time,
                    forced_by_deadline: due.forced_by_deadline,
                }
            }
            Err(error) => {
                self.resize.record_failure(&due);
                let error = EngineError::RenderApplyFailure(error);
                tracing::warn!(size = %due.size, %error, "relayout failed; will retry");
                ResizeAction::Failed { size: due.size }
            }
        }
    }

    // ── Interaction ────────────────────────────────────────────────────

    /// Install the click listener unless the canvas already has one.
    pub fn attach_interaction(&mut self) -> Result<bool, EngineError> {
        let surface = self.surface.as_mut().ok_or(EngineError::MissingSurface)?;
        Ok(self.interaction.ensure_attached(surface)?)
    }

    /// Publish the click holder to `store` if it changed.
    pub fn poll_interaction<T: InteractionStore + ?Sized>(
        &mut self,
        store: &mut T,
    ) -> Option<InteractionEvent> {
        self.interaction.poll(store)
    }

    /// The click mailbox.
    #[must_use]
    pub fn click_holder(&self) -> &ClickHolder {
        self.interaction.holder()
    }
}

impl<S: SceneSurface> Default for SceneEngine<S> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
