//! Identity → render slot lookup for the current scene.
//!
//! Slots are indices into the scene's full trace list, static layers
//! included, so a slot addresses a canvas trace directly. The map is only
//! rebuilt when a scene is accepted; per-tick churn never touches it.

use std::collections::HashMap;

use trackside_core::RenderableTrace;

/// Stable identity → slot map.
#[derive(Debug, Clone, Default)]
pub struct EntityIndexMap {
    by_identity: HashMap<String, usize>,
    by_slot: HashMap<usize, String>,
    generation: u64,
}

impl EntityIndexMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from a trace list.
    #[must_use]
    pub fn from_traces(traces: &[RenderableTrace]) -> Self {
        let mut map = Self::new();
        map.rebuild(traces);
        map
    }

    /// Replace the mapping with one derived from `traces`.
    ///
    /// When an identity repeats, its first trace keeps the identity and the
    /// later ones are treated as static layers. Returns the number of
    /// duplicates dropped.
    pub fn rebuild(&mut self, traces: &[RenderableTrace]) -> usize {
        self.by_identity.clear();
        self.by_slot.clear();
        self.generation += 1;

        let mut duplicates = 0;
        for (slot, trace) in traces.iter().enumerate() {
            let Some(identity) = trace.identity.as_deref() else {
                continue;
            };
            if self.by_identity.contains_key(identity) {
                duplicates += 1;
                tracing::warn!(identity, slot, "duplicate entity identity in scene; ignoring");
                continue;
            }
            self.by_identity.insert(identity.to_owned(), slot);
            self.by_slot.insert(slot, identity.to_owned());
        }
        tracing::trace!(
            entities = self.by_identity.len(),
            generation = self.generation,
            "entity index rebuilt"
        );
        duplicates
    }

    /// Slot of an identity in the current scene.
    #[inline]
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<usize> {
        self.by_identity.get(identity).copied()
    }

    /// Identity rendered in a slot, if the slot is an entity placeholder.
    #[inline]
    #[must_use]
    pub fn identity_at(&self, slot: usize) -> Option<&str> {
        self.by_slot.get(&slot).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Number of rebuilds so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(identity, slot)` pairs in slot order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<_> = self
            .by_identity
            .iter()
            .map(|(id, slot)| (id.as_str(), *slot))
            .collect();
        entries.sort_by_key(|(_, slot)| *slot);
        entries
    }
}
