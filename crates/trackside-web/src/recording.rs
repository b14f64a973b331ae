#![forbid(unsafe_code)]

//! In-memory canvas that records every mutation.
//!
//! [`RecordingSurface`] implements [`SceneSurface`] without a drawing
//! library. It keeps a per-slot view of what a real canvas would show
//! (attributes, positions, in-flight tweens), appends each call to an op
//! log, and can be told to reject specific calls. The op log is what the
//! flicker harness analyzes.

use core::time::Duration;
use std::collections::VecDeque;

use trackside_core::animation::{Animation, PositionTween};
use trackside_core::{Position, SceneFingerprint, ValidScene};
use trackside_runtime::{
    CanvasClick, ClickHandler, ContainerSize, PatchKind, SceneSurface, SlotAttributes, SlotPatch,
    SurfaceError, Transition, TweenFrame,
};

const OP_HASH_ALGO: &str = "fnv1a64";
const FNV64_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV64_PRIME: u64 = 0x100000001b3;

/// Canvas call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Replace,
    Apply,
    Tween,
    Relayout,
    InstallListener,
}

impl FailOn {
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::Replace => "replace_scene",
            Self::Apply => "apply_patches",
            Self::Tween => "tween_patches",
            Self::Relayout => "relayout",
            Self::InstallListener => "install_click_listener",
        }
    }
}

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    ReplaceScene {
        revision: String,
        fingerprint: SceneFingerprint,
        traces: usize,
    },
    ApplyPatches {
        patches: Vec<SlotPatch>,
    },
    TweenPatches {
        patches: Vec<SlotPatch>,
        frames: Vec<TweenFrame>,
        transition: Transition,
    },
    Relayout(ContainerSize),
    InstallClickListener,
    /// A call that returned an error; the canvas was left untouched.
    Rejected {
        operation: &'static str,
    },
}

impl SurfaceOp {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ReplaceScene { .. } => "replace_scene",
            Self::ApplyPatches { .. } => "apply_patches",
            Self::TweenPatches { .. } => "tween_patches",
            Self::Relayout(_) => "relayout",
            Self::InstallClickListener => "install_click_listener",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Patches carried by an apply or tween.
    #[must_use]
    pub fn patches(&self) -> &[SlotPatch] {
        match self {
            Self::ApplyPatches { patches } | Self::TweenPatches { patches, .. } => patches,
            _ => &[],
        }
    }
}

/// A recorded call and when it happened on the host clock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOp {
    pub seq: u64,
    pub at: Duration,
    pub op: SurfaceOp,
}

/// What the canvas currently shows in one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotView {
    pub identity: Option<String>,
    pub visible: bool,
    /// Target position; `None` hides the marker.
    pub position: Option<Position>,
    pub attributes: Option<SlotAttributes>,
    tween: Option<PositionTween>,
}

impl SlotView {
    /// Where the marker is drawn right now, mid-tween included.
    #[must_use]
    pub fn displayed_position(&self) -> Option<Position> {
        match &self.tween {
            Some(tween) if !tween.is_complete() => Some(tween.position()),
            _ => self.position,
        }
    }

    #[must_use]
    pub fn is_tweening(&self) -> bool {
        self.tween.as_ref().is_some_and(|t| !t.is_complete())
    }
}

/// Recording [`SceneSurface`].
#[derive(Default)]
pub struct RecordingSurface {
    ops: Vec<RecordedOp>,
    seq: u64,
    now: Duration,
    slots: Vec<SlotView>,
    size: Option<ContainerSize>,
    handler: Option<ClickHandler>,
    failures: VecDeque<FailOn>,
    detached: bool,
}

impl std::fmt::Debug for RecordingSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSurface")
            .field("ops", &self.ops.len())
            .field("slots", &self.slots.len())
            .field("size", &self.size)
            .field("listener", &self.handler.is_some())
            .field("detached", &self.detached)
            .finish()
    }
}

impl RecordingSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp stamped on subsequent ops.
    pub fn set_now(&mut self, now: Duration) {
        self.now = now;
    }

    /// Advance in-flight tweens by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        for slot in &mut self.slots {
            if let Some(tween) = slot.tween.as_mut() {
                tween.tick(dt);
            }
        }
    }

    /// Make the next call of `kind` fail.
    pub fn fail_next(&mut self, kind: FailOn) {
        self.failures.push_back(kind);
    }

    /// Simulate the canvas element being removed from the page.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    #[must_use]
    pub fn ops(&self) -> &[RecordedOp] {
        &self.ops
    }

    /// Take the op log, leaving it empty.
    pub fn take_ops(&mut self) -> Vec<RecordedOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of recorded ops of `kind` (see [`SurfaceOp::kind`]).
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.ops.iter().filter(|r| r.op.kind() == kind).count()
    }

    #[must_use]
    pub fn slots(&self) -> &[SlotView] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, slot: usize) -> Option<&SlotView> {
        self.slots.get(slot)
    }

    /// Slot currently rendering `identity`.
    #[must_use]
    pub fn slot_of(&self, identity: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.identity.as_deref() == Some(identity))
    }

    #[must_use]
    pub fn size(&self) -> Option<ContainerSize> {
        self.size
    }

    /// Click on a slot's marker. The click resolves to the slot's entity.
    pub fn click_slot(&mut self, slot: usize, timestamp_ms: u64) {
        let identity = self
            .slots
            .get(slot)
            .filter(|s| s.visible)
            .and_then(|s| s.identity.clone());
        self.dispatch(CanvasClick {
            identity,
            timestamp_ms,
        });
    }

    /// Click on empty canvas.
    pub fn click_background(&mut self, timestamp_ms: u64) {
        self.dispatch(CanvasClick {
            identity: None,
            timestamp_ms,
        });
    }

    fn dispatch(&mut self, click: CanvasClick) {
        if let Some(handler) = self.handler.as_mut() {
            handler(click);
        }
    }

    /// Deterministic hash of the op log.
    #[must_use]
    pub fn op_hash(&self) -> String {
        let mut hash = FNV64_OFFSET_BASIS;
        hash = fnv1a64_extend(hash, &(self.ops.len() as u64).to_le_bytes());
        for recorded in &self.ops {
            hash = fnv1a64_extend(hash, recorded.op.kind().as_bytes());
            match &recorded.op {
                SurfaceOp::ReplaceScene { fingerprint, .. } => {
                    hash = fnv1a64_extend(hash, &fingerprint.as_u64().to_le_bytes());
                }
                SurfaceOp::ApplyPatches { patches } | SurfaceOp::TweenPatches { patches, .. } => {
                    for patch in patches {
                        hash = fnv1a64_extend(hash, &(patch.slot as u64).to_le_bytes());
                        hash = fnv1a64_extend(hash, &[kind_tag(patch.kind)]);
                    }
                }
                SurfaceOp::Relayout(size) => {
                    hash = fnv1a64_extend(hash, &size.width.to_le_bytes());
                    hash = fnv1a64_extend(hash, &size.height.to_le_bytes());
                }
                SurfaceOp::InstallClickListener | SurfaceOp::Rejected { .. } => {}
            }
        }
        format!("{OP_HASH_ALGO}:{hash:016x}")
    }

    fn record(&mut self, op: SurfaceOp) {
        self.seq += 1;
        self.ops.push(RecordedOp {
            seq: self.seq,
            at: self.now,
            op,
        });
    }

    fn check(&mut self, kind: FailOn) -> Result<(), SurfaceError> {
        if self.detached {
            self.record(SurfaceOp::Rejected {
                operation: kind.operation(),
            });
            return Err(SurfaceError::Detached);
        }
        if let Some(i) = self.failures.iter().position(|f| *f == kind) {
            self.failures.remove(i);
            self.record(SurfaceOp::Rejected {
                operation: kind.operation(),
            });
            return Err(SurfaceError::rejected(kind.operation(), "injected failure"));
        }
        Ok(())
    }

    fn check_slots(&mut self, kind: FailOn, patches: &[SlotPatch]) -> Result<(), SurfaceError> {
        if let Some(patch) = patches.iter().find(|p| p.slot >= self.slots.len()) {
            self.record(SurfaceOp::Rejected {
                operation: kind.operation(),
            });
            return Err(SurfaceError::rejected(
                kind.operation(),
                format!("slot {} out of range", patch.slot),
            ));
        }
        Ok(())
    }

    fn write_patches(&mut self, patches: &[SlotPatch]) {
        for patch in patches {
            if let Some(view) = self.slots.get_mut(patch.slot) {
                view.position = patch.attributes.position;
                view.attributes = Some(patch.attributes.clone());
                view.tween = None;
            }
        }
    }
}

impl SceneSurface for RecordingSurface {
    fn replace_scene(&mut self, scene: &ValidScene<'_>) -> Result<(), SurfaceError> {
        self.check(FailOn::Replace)?;
        self.slots = scene
            .entities
            .iter()
            .map(|trace| SlotView {
                identity: trace.identity.clone(),
                visible: trace.visible,
                position: trace.initial_position,
                attributes: None,
                tween: None,
            })
            .collect();
        self.record(SurfaceOp::ReplaceScene {
            revision: scene.revision.as_str().to_owned(),
            fingerprint: SceneFingerprint::from_scene(scene),
            traces: scene.entities.len(),
        });
        Ok(())
    }

    fn apply_patches(&mut self, patches: &[SlotPatch]) -> Result<(), SurfaceError> {
        self.check(FailOn::Apply)?;
        self.check_slots(FailOn::Apply, patches)?;
        self.write_patches(patches);
        self.record(SurfaceOp::ApplyPatches {
            patches: patches.to_vec(),
        });
        Ok(())
    }

    fn tween_patches(
        &mut self,
        patches: &[SlotPatch],
        frames: &[TweenFrame],
        transition: Transition,
    ) -> Result<(), SurfaceError> {
        self.check(FailOn::Tween)?;
        self.check_slots(FailOn::Tween, patches)?;
        self.write_patches(patches);
        for frame in frames {
            if let Some(view) = self.slots.get_mut(frame.slot) {
                view.tween = Some(
                    PositionTween::new(frame.from, frame.to, transition.duration)
                        .easing(transition.easing),
                );
            }
        }
        self.record(SurfaceOp::TweenPatches {
            patches: patches.to_vec(),
            frames: frames.to_vec(),
            transition,
        });
        Ok(())
    }

    fn relayout(&mut self, size: ContainerSize) -> Result<(), SurfaceError> {
        self.check(FailOn::Relayout)?;
        self.size = Some(size);
        self.record(SurfaceOp::Relayout(size));
        Ok(())
    }

    fn click_listener_attached(&self) -> bool {
        self.handler.is_some()
    }

    fn install_click_listener(&mut self, handler: ClickHandler) -> Result<(), SurfaceError> {
        self.check(FailOn::InstallListener)?;
        self.handler = Some(handler);
        self.record(SurfaceOp::InstallClickListener);
        Ok(())
    }
}

#[must_use]
fn fnv1a64_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV64_PRIME);
    }
    hash
}

const fn kind_tag(kind: PatchKind) -> u8 {
    match kind {
        PatchKind::Update => 0,
        PatchKind::Ghost => 1,
        PatchKind::Restyle => 2,
    }
}
