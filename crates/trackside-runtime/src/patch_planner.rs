//! Per-slot attribute patches for one tick.
//!
//! The planner turns a delta batch into at most one [`SlotPatch`] per slot:
//!
//! - entities in the batch are updated (position, label, color, status tier);
//! - live slots whose entity vanished from the batch are ghosted once;
//! - live slots whose selection state flipped are restyled in place.
//!
//! Dimming (status) and highlighting (selection) are composed
//! independently, so a selected car in the pit lane is both enlarged and
//! dimmed.
//!
//! Planning does not mutate the planner. [`PatchPlanner::commit`] adopts a
//! plan once the canvas accepted it; a rejected plan is simply dropped and
//! the next tick plans against the same memory again.

use std::collections::{BTreeMap, BTreeSet};

use trackside_core::delta::DeltaPosition;
use trackside_core::{DeltaBatch, EntityDelta, Position, RenderableTrace, Rgb};

use crate::config::StylePolicy;
use crate::entity_index::EntityIndexMap;

/// Marker outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    pub width: f32,
    pub color: Rgb,
}

/// Full attribute set of one entity trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotAttributes {
    /// `None` hides the marker without removing the trace.
    pub position: Option<Position>,
    pub label: String,
    pub label_color: Rgb,
    pub label_alpha: f32,
    pub color: Rgb,
    pub opacity: f32,
    pub marker_size: f32,
    pub outline: Outline,
}

/// What a patch does to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// New data for an entity in this tick's batch.
    Update,
    /// The entity dropped out of the feed.
    Ghost,
    /// Selection styling changed for an entity not in this tick's batch.
    Restyle,
}

impl PatchKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Ghost => "ghost",
            Self::Restyle => "restyle",
        }
    }
}

/// Attribute patch for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPatch {
    pub slot: usize,
    pub identity: String,
    pub kind: PatchKind,
    pub attributes: SlotAttributes,
}

/// Position interpolation for a slot that moved between two known points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweenFrame {
    pub slot: usize,
    pub from: Position,
    pub to: Position,
}

#[derive(Debug, Clone, PartialEq)]
struct LiveSlot {
    identity: String,
    /// Attributes without selection styling.
    base: SlotAttributes,
}

/// The outcome of planning one tick.
#[derive(Debug, Clone, Default)]
pub struct PatchPlan {
    patches: Vec<SlotPatch>,
    frames: Vec<TweenFrame>,
    invalid: Vec<String>,
    dropped: Vec<String>,
    next_live: BTreeMap<usize, LiveSlot>,
    next_highlighted: Option<usize>,
}

impl PatchPlan {
    /// Patches in slot order, one per touched slot.
    #[must_use]
    pub fn patches(&self) -> &[SlotPatch] {
        &self.patches
    }

    /// Tween frames in slot order.
    #[must_use]
    pub fn frames(&self) -> &[TweenFrame] {
        &self.frames
    }

    /// Identities skipped for non-numeric coordinates.
    #[must_use]
    pub fn invalid(&self) -> &[String] {
        &self.invalid
    }

    /// Identities not present in the current scene.
    #[must_use]
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: PatchKind) -> usize {
        self.patches.iter().filter(|p| p.kind == kind).count()
    }

    /// Patch for a slot, if the slot was touched.
    #[must_use]
    pub fn patch_for(&self, slot: usize) -> Option<&SlotPatch> {
        self.patches.iter().find(|p| p.slot == slot)
    }
}

/// Plans per-slot patches and remembers what the canvas shows.
#[derive(Debug, Clone)]
pub struct PatchPlanner {
    style: StylePolicy,
    live: BTreeMap<usize, LiveSlot>,
    highlighted: Option<usize>,
}

impl PatchPlanner {
    #[must_use]
    pub fn new(style: StylePolicy) -> Self {
        Self {
            style,
            live: BTreeMap::new(),
            highlighted: None,
        }
    }

    #[must_use]
    pub fn style(&self) -> &StylePolicy {
        &self.style
    }

    /// Whether a slot last rendered a real entity.
    #[must_use]
    pub fn is_live(&self, slot: usize) -> bool {
        self.live.contains_key(&slot)
    }

    /// Live slots in slot order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.live.keys().copied()
    }

    /// Slot currently rendered with selection styling.
    #[must_use]
    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    /// Forget everything, as after a canvas swap.
    pub fn reset(&mut self) {
        self.live.clear();
        self.highlighted = None;
    }

    /// Re-derive the live set from a freshly built scene.
    ///
    /// Only visible placeholders with an initial placement are live.
    pub fn reseed(&mut self, traces: &[RenderableTrace], index: &EntityIndexMap) {
        self.reset();
        for (identity, slot) in index.entries() {
            let Some(trace) = traces.get(slot) else {
                continue;
            };
            if !trace.visible {
                continue;
            }
            let Some(position) = trace.initial_position else {
                continue;
            };
            let base = SlotAttributes {
                position: Some(position),
                label: identity.to_owned(),
                label_color: self.style.label_color,
                label_alpha: self.style.normal_label_alpha,
                color: Rgb::NEUTRAL_GRAY,
                opacity: self.style.normal_opacity,
                marker_size: self.style.marker_size,
                outline: self.normal_outline(),
            };
            self.live.insert(
                slot,
                LiveSlot {
                    identity: identity.to_owned(),
                    base,
                },
            );
        }
        tracing::trace!(live = self.live.len(), "live slots reseeded");
    }

    /// Plan the patches for one batch.
    #[must_use]
    pub fn plan(
        &self,
        batch: &DeltaBatch,
        selected: Option<&str>,
        index: &EntityIndexMap,
    ) -> PatchPlan {
        let selected_slot = selected.and_then(|id| index.get(id));
        let mut plan = PatchPlan {
            next_live: self.live.clone(),
            ..PatchPlan::default()
        };
        // Slots the batch spoke for, valid or not.
        let mut claimed = BTreeSet::new();

        for (identity, delta) in batch.iter() {
            let Some(slot) = index.get(identity) else {
                tracing::trace!(identity, "delta for unknown entity dropped");
                plan.dropped.push(identity.to_owned());
                continue;
            };
            claimed.insert(slot);

            let position = match delta.position() {
                DeltaPosition::Valid(p) => Some(p),
                DeltaPosition::Absent => None,
                DeltaPosition::Invalid => {
                    tracing::warn!(
                        identity,
                        slot,
                        x = ?delta.x,
                        y = ?delta.y,
                        "non-numeric delta coordinates; entity skipped"
                    );
                    plan.invalid.push(identity.to_owned());
                    continue;
                }
            };

            let base = self.entity_attributes(identity, delta, position);
            if let (Some(to), Some(from)) = (
                position,
                self.live.get(&slot).and_then(|l| l.base.position),
            ) && from != to
            {
                plan.frames.push(TweenFrame { slot, from, to });
            }

            let attributes = self.compose(&base, selected_slot == Some(slot));
            tracing::trace!(identity, slot, dimmed = delta.status.is_dimmed(), "slot update");
            plan.patches.push(SlotPatch {
                slot,
                identity: identity.to_owned(),
                kind: PatchKind::Update,
                attributes,
            });
            plan.next_live.insert(
                slot,
                LiveSlot {
                    identity: identity.to_owned(),
                    base,
                },
            );
        }

        for (&slot, live) in &self.live {
            if claimed.contains(&slot) {
                continue;
            }
            tracing::trace!(identity = live.identity.as_str(), slot, "slot ghosted");
            plan.patches.push(SlotPatch {
                slot,
                identity: live.identity.clone(),
                kind: PatchKind::Ghost,
                attributes: self.ghost_attributes(),
            });
            plan.next_live.remove(&slot);
        }

        if self.highlighted != selected_slot {
            let touched: BTreeSet<usize> = plan.patches.iter().map(|p| p.slot).collect();
            let candidates = [(self.highlighted, false), (selected_slot, true)];
            for (slot, highlight) in candidates {
                let Some(slot) = slot else { continue };
                if touched.contains(&slot) {
                    continue;
                }
                let Some(live) = plan.next_live.get(&slot) else {
                    continue;
                };
                plan.patches.push(SlotPatch {
                    slot,
                    identity: live.identity.clone(),
                    kind: PatchKind::Restyle,
                    attributes: self.compose(&live.base, highlight),
                });
            }
        }

        plan.next_highlighted = selected_slot.filter(|slot| plan.next_live.contains_key(slot));
        plan.patches.sort_by_key(|p| p.slot);
        plan.frames.sort_by_key(|f| f.slot);
        plan
    }

    /// Adopt a plan the canvas accepted.
    pub fn commit(&mut self, plan: PatchPlan) {
        self.live = plan.next_live;
        self.highlighted = plan.next_highlighted;
    }

    fn normal_outline(&self) -> Outline {
        Outline {
            width: self.style.outline_width,
            color: self.style.outline_color,
        }
    }

    fn entity_attributes(
        &self,
        identity: &str,
        delta: &EntityDelta,
        position: Option<Position>,
    ) -> SlotAttributes {
        let label = delta
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(identity)
            .to_owned();
        let (opacity, label_alpha) = if delta.status.is_dimmed() {
            (self.style.dimmed_opacity, self.style.dimmed_label_alpha)
        } else {
            (self.style.normal_opacity, self.style.normal_label_alpha)
        };
        SlotAttributes {
            position,
            label,
            label_color: self.style.label_color,
            label_alpha,
            color: Rgb::from_token_or_neutral(delta.color_hex.as_deref()),
            opacity,
            marker_size: self.style.marker_size,
            outline: self.normal_outline(),
        }
    }

    fn compose(&self, base: &SlotAttributes, selected: bool) -> SlotAttributes {
        let mut attributes = base.clone();
        if selected {
            attributes.marker_size = self.style.selected_marker_size;
            attributes.outline = Outline {
                width: self.style.selected_outline_width,
                color: self.style.selected_outline_color,
            };
        }
        attributes
    }

    fn ghost_attributes(&self) -> SlotAttributes {
        SlotAttributes {
            position: None,
            label: String::new(),
            label_color: self.style.label_color,
            label_alpha: self.style.normal_label_alpha,
            color: Rgb::NEUTRAL_GRAY,
            opacity: self.style.ghost_opacity,
            marker_size: self.style.marker_size,
            outline: self.normal_outline(),
        }
    }
}
