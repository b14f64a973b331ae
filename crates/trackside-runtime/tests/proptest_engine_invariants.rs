#![forbid(unsafe_code)]

//! Property tests for engine-level guarantees:
//!
//! 1. A stable scene is replaced at most once however many ticks arrive.
//! 2. Every applied patch set names each slot at most once.
//! 3. A ghosted slot is not ghosted again until the entity reappears.
//! 4. Ticks never panic, whatever the coordinates.

use std::collections::BTreeSet;

use proptest::prelude::*;

use trackside_core::{
    DeltaBatch, EntityDelta, Position, RenderableTrace, RevisionToken, SceneDescription,
    TickContext, ValidScene,
};
use trackside_runtime::{
    ClickHandler, ContainerSize, EngineConfig, PatchKind, SceneEngine, SceneSurface, SlotPatch,
    SurfaceError, TickInput, Transition, TweenFrame,
};

#[derive(Default)]
struct LogCanvas {
    replaces: usize,
    batches: Vec<Vec<SlotPatch>>,
}

impl SceneSurface for LogCanvas {
    fn replace_scene(&mut self, _scene: &ValidScene<'_>) -> Result<(), SurfaceError> {
        self.replaces += 1;
        Ok(())
    }

    fn apply_patches(&mut self, patches: &[SlotPatch]) -> Result<(), SurfaceError> {
        self.batches.push(patches.to_vec());
        Ok(())
    }

    fn tween_patches(
        &mut self,
        patches: &[SlotPatch],
        _frames: &[TweenFrame],
        _transition: Transition,
    ) -> Result<(), SurfaceError> {
        self.batches.push(patches.to_vec());
        Ok(())
    }

    fn relayout(&mut self, _size: ContainerSize) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn click_listener_attached(&self) -> bool {
        true
    }

    fn install_click_listener(&mut self, _handler: ClickHandler) -> Result<(), SurfaceError> {
        Ok(())
    }
}

const IDS: [&str; 6] = ["1", "4", "11", "16", "44", "81"];

fn scene() -> SceneDescription {
    SceneDescription::new(
        RevisionToken::new("race"),
        IDS.iter()
            .map(|id| RenderableTrace::entity(*id).at(Position::new(0.0, 0.0)))
            .collect(),
    )
}

fn coordinate() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -500.0f64..500.0,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

/// Per tick: which entities report and where.
fn tick_batches() -> impl Strategy<Value = Vec<Vec<(usize, f64, f64)>>> {
    prop::collection::vec(
        prop::collection::vec((0..IDS.len(), coordinate(), coordinate()), 0..IDS.len()),
        1..30,
    )
}

fn to_batch(entries: &[(usize, f64, f64)]) -> DeltaBatch {
    entries
        .iter()
        .map(|&(i, x, y)| {
            (
                IDS[i].to_string(),
                EntityDelta {
                    x: Some(x),
                    y: Some(y),
                    ..EntityDelta::default()
                },
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn stable_scene_is_replaced_at_most_once(ticks in tick_batches(), signal in any::<bool>()) {
        let mut engine =
            SceneEngine::new(EngineConfig::default()).with_surface(LogCanvas::default());
        let scene = scene();
        let ctx = TickContext::active();
        for entries in &ticks {
            let batch = to_batch(entries);
            engine.tick(&TickInput::new(&batch, &ctx).with_scene(&scene, signal));
        }
        prop_assert_eq!(engine.surface().map(|c| c.replaces), Some(1));
    }

    #[test]
    fn each_slot_patched_at_most_once_per_tick(ticks in tick_batches(), selected in 0..IDS.len()) {
        let mut engine =
            SceneEngine::new(EngineConfig::default()).with_surface(LogCanvas::default());
        let scene = scene();
        let ctx = TickContext::active().with_selected(IDS[selected]).with_cadence_ms(1000.0);
        for entries in &ticks {
            let batch = to_batch(entries);
            engine.tick(&TickInput::new(&batch, &ctx).with_scene(&scene, false));
        }
        for patches in &engine.surface().map(|c| c.batches.clone()).unwrap_or_default() {
            let slots: BTreeSet<usize> = patches.iter().map(|p| p.slot).collect();
            prop_assert_eq!(slots.len(), patches.len());
        }
    }

    #[test]
    fn ghosts_are_not_repeated(ticks in tick_batches()) {
        let mut engine =
            SceneEngine::new(EngineConfig::default()).with_surface(LogCanvas::default());
        let scene = scene();
        let ctx = TickContext::active();
        for entries in &ticks {
            let batch = to_batch(entries);
            engine.tick(&TickInput::new(&batch, &ctx).with_scene(&scene, false));
        }
        let batches = engine.surface().map(|c| c.batches.clone()).unwrap_or_default();
        let mut ghosted: BTreeSet<usize> = BTreeSet::new();
        for patches in &batches {
            for patch in patches {
                match patch.kind {
                    PatchKind::Ghost => prop_assert!(ghosted.insert(patch.slot)),
                    PatchKind::Update => {
                        ghosted.remove(&patch.slot);
                    }
                    PatchKind::Restyle => {}
                }
            }
        }
    }
}
