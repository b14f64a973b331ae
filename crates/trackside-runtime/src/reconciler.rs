//! Rebuild-or-patch decision.
//!
//! # Decision Rule
//!
//! Rebuild iff nothing was applied yet, or the tick carries a scene-change
//! token and the revision moved, or the structural fingerprint moved. A
//! rebuild replaces the canvas, records the new revision and fingerprint,
//! and rebuilds the entity index from the new trace order.
//!
//! After a rebuild, patches for the same tick are suppressed when the
//! batch is empty or the session is not active, so a freshly reset scene
//! never receives stale attributes.

use trackside_core::{DeltaBatch, SceneDescription, SceneFingerprint, SessionStatus, TickContext};

use crate::error::EngineError;
use crate::scene_cache::RebuildReason;
use crate::state::EngineState;
use crate::surface::SceneSurface;

/// Result of reconciling one tick's scene description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The canvas was structurally replaced.
    Rebuilt {
        reason: RebuildReason,
        /// Skip delta patches for this tick.
        suppress_patches: bool,
        /// The revision token differs from the previously applied one.
        revision_changed: bool,
    },
    /// The canvas already shows this scene.
    Unchanged,
    /// Reconciliation was abandoned; state is untouched.
    Skipped(EngineError),
}

/// Counters kept by the reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub rebuilds: u64,
    pub unchanged: u64,
    pub malformed: u64,
    pub failed_rebuilds: u64,
}

/// Decides between full rebuild and incremental patching.
#[derive(Debug, Clone, Default)]
pub struct RevisionReconciler {
    stats: ReconcileStats,
}

impl RevisionReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Reconcile `scene` against the canvas.
    ///
    /// State is only updated after the surface accepted the replacement.
    pub fn reconcile<S: SceneSurface + ?Sized>(
        &mut self,
        state: &mut EngineState,
        surface: &mut S,
        scene: &SceneDescription,
        scene_changed: bool,
        batch: &DeltaBatch,
        context: &TickContext,
    ) -> ReconcileOutcome {
        let valid = match scene.validate() {
            Ok(valid) => valid,
            Err(e) => {
                self.stats.malformed += 1;
                return ReconcileOutcome::Skipped(e.into());
            }
        };
        let fingerprint = SceneFingerprint::from_scene(&valid);
        let Some(reason) = state
            .cache
            .rebuild_reason(valid.revision, fingerprint, scene_changed)
        else {
            self.stats.unchanged += 1;
            return ReconcileOutcome::Unchanged;
        };

        if let Err(e) = surface.replace_scene(&valid) {
            self.stats.failed_rebuilds += 1;
            return ReconcileOutcome::Skipped(EngineError::RenderApplyFailure(e));
        }

        let revision_changed = state
            .cache
            .revision()
            .is_some_and(|previous| previous != valid.revision);
        state.cache.record(valid.revision.clone(), fingerprint);
        let duplicates = state.index.rebuild(valid.entities);
        self.stats.rebuilds += 1;

        let suppress_patches =
            batch.is_empty() || context.session_status != SessionStatus::Active;
        tracing::debug!(
            reason = reason.as_str(),
            revision = valid.revision.as_str(),
            fingerprint = %fingerprint,
            entities = state.index.len(),
            duplicates,
            suppress_patches,
            "scene rebuilt"
        );
        ReconcileOutcome::Rebuilt {
            reason,
            suppress_patches,
            revision_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::patch_planner::{SlotPatch, TweenFrame};
    use crate::surface::{ClickHandler, ContainerSize, Transition};
    use trackside_core::scene::MalformedScene;
    use trackside_core::{EntityDelta, RenderableTrace, RevisionToken, ValidScene};

    #[derive(Default)]
    struct CountingSurface {
        replaced: usize,
        fail_replace: bool,
    }

    impl SceneSurface for CountingSurface {
        fn replace_scene(&mut self, _scene: &ValidScene<'_>) -> Result<(), SurfaceError> {
            if self.fail_replace {
                return Err(SurfaceError::rejected("replace_scene", "boom"));
            }
            self.replaced += 1;
            Ok(())
        }
        fn apply_patches(&mut self, _patches: &[SlotPatch]) -> Result<(), SurfaceError> {
            Ok(())
        }
        fn tween_patches(
            &mut self,
            _patches: &[SlotPatch],
            _frames: &[TweenFrame],
            _transition: Transition,
        ) -> Result<(), SurfaceError> {
            Ok(())
        }
        fn relayout(&mut self, _size: ContainerSize) -> Result<(), SurfaceError> {
            Ok(())
        }
        fn click_listener_attached(&self) -> bool {
            false
        }
        fn install_click_listener(&mut self, _handler: ClickHandler) -> Result<(), SurfaceError> {
            Ok(())
        }
    }

    fn scene(revision: &str, ids: &[&str]) -> SceneDescription {
        SceneDescription::new(
            RevisionToken::new(revision),
            ids.iter().map(|id| RenderableTrace::entity(*id)).collect(),
        )
    }

    fn batch() -> DeltaBatch {
        DeltaBatch::new().with("A", EntityDelta::at(1.0, 1.0))
    }

    #[test]
    fn identical_scene_rebuilds_once() {
        let mut r = RevisionReconciler::new();
        let mut state = EngineState::default();
        let mut surface = CountingSurface::default();
        let ctx = TickContext::active();
        let s = scene("r1", &["A", "B", "C"]);
        for _ in 0..3 {
            r.reconcile(&mut state, &mut surface, &s, true, &batch(), &ctx);
        }
        assert_eq!(surface.replaced, 1);
        assert_eq!(r.stats().unchanged, 2);
    }

    #[test]
    fn fingerprint_wins_over_mismatched_revision() {
        let mut r = RevisionReconciler::new();
        let mut state = EngineState::default();
        let mut surface = CountingSurface::default();
        let ctx = TickContext::active();
        r.reconcile(&mut state, &mut surface, &scene("r1", &["A"]), true, &batch(), &ctx);
        let outcome = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r2", &["A"]),
            false,
            &batch(),
            &ctx,
        );
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(state.last_applied_revision().map(RevisionToken::as_str), Some("r1"));
    }

    #[test]
    fn malformed_scene_leaves_state_alone() {
        let mut r = RevisionReconciler::new();
        let mut state = EngineState::default();
        let mut surface = CountingSurface::default();
        let ctx = TickContext::active();
        r.reconcile(&mut state, &mut surface, &scene("r1", &["A"]), true, &batch(), &ctx);
        let broken = SceneDescription {
            revision: Some(RevisionToken::new("r2")),
            entities: None,
        };
        let outcome = r.reconcile(&mut state, &mut surface, &broken, true, &batch(), &ctx);
        assert_eq!(
            outcome,
            ReconcileOutcome::Skipped(EngineError::MalformedScene(MalformedScene::MissingEntities))
        );
        assert_eq!(state.last_applied_revision().map(RevisionToken::as_str), Some("r1"));
        assert_eq!(state.index().get("A"), Some(0));
    }

    #[test]
    fn rejected_replace_is_retried() {
        let mut r = RevisionReconciler::new();
        let mut state = EngineState::default();
        let mut surface = CountingSurface {
            fail_replace: true,
            ..CountingSurface::default()
        };
        let ctx = TickContext::active();
        let s = scene("r1", &["A"]);
        let outcome = r.reconcile(&mut state, &mut surface, &s, true, &batch(), &ctx);
        assert!(matches!(outcome, ReconcileOutcome::Skipped(EngineError::RenderApplyFailure(_))));
        assert!(state.last_applied_revision().is_none());

        surface.fail_replace = false;
        let outcome = r.reconcile(&mut state, &mut surface, &s, false, &batch(), &ctx);
        assert!(matches!(
            outcome,
            ReconcileOutcome::Rebuilt { reason: RebuildReason::Initial, .. }
        ));
    }

    #[test]
    fn suppression_on_empty_batch_or_inactive_session() {
        let mut r = RevisionReconciler::new();
        let mut surface = CountingSurface::default();

        let mut state = EngineState::default();
        let outcome = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r1", &["A"]),
            true,
            &DeltaBatch::new(),
            &TickContext::active(),
        );
        assert!(matches!(outcome, ReconcileOutcome::Rebuilt { suppress_patches: true, .. }));

        let mut state = EngineState::default();
        let outcome = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r1", &["A"]),
            true,
            &batch(),
            &TickContext::default(),
        );
        assert!(matches!(outcome, ReconcileOutcome::Rebuilt { suppress_patches: true, .. }));

        let mut state = EngineState::default();
        let outcome = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r1", &["A"]),
            true,
            &batch(),
            &TickContext::active(),
        );
        assert!(matches!(outcome, ReconcileOutcome::Rebuilt { suppress_patches: false, .. }));
    }

    #[test]
    fn revision_change_is_reported() {
        let mut r = RevisionReconciler::new();
        let mut state = EngineState::default();
        let mut surface = CountingSurface::default();
        let ctx = TickContext::active();
        let first = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r1", &["A"]),
            true,
            &batch(),
            &ctx,
        );
        assert!(matches!(first, ReconcileOutcome::Rebuilt { revision_changed: false, .. }));
        let second = r.reconcile(
            &mut state,
            &mut surface,
            &scene("r2", &["A", "B"]),
            true,
            &batch(),
            &ctx,
        );
        assert!(matches!(
            second,
            ReconcileOutcome::Rebuilt {
                reason: RebuildReason::RevisionChanged,
                revision_changed: true,
                ..
            }
        ));
        assert_eq!(state.index().get("B"), Some(1));
    }
}
