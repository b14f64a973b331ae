//! Structural scene fingerprints.
//!
//! The fingerprint summarizes the ordered `(identity, visible, has_position)`
//! tuples of a scene. It is what decides whether a scene description needs
//! a rebuild when its revision token cannot be trusted.
//!
//! Hashing is FNV-1a 64 over a length-prefixed encoding, so it is stable
//! across platforms and runs. The hash is order sensitive: swapping two
//! entities changes slot assignment and therefore must change the
//! fingerprint.

use std::fmt;

use crate::scene::{RenderableTrace, ValidScene};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

const TAG_LAYER: u8 = 0x00;
const TAG_ENTITY: u8 = 0x01;

fn fnv1a64_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Content fingerprint of a scene's structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneFingerprint(u64);

impl SceneFingerprint {
    /// Fingerprint a list of traces.
    #[must_use]
    pub fn from_traces(traces: &[RenderableTrace]) -> Self {
        let mut hash = FNV_OFFSET_BASIS;
        hash = fnv1a64_extend(hash, &(traces.len() as u64).to_le_bytes());
        for trace in traces {
            match trace.identity.as_deref() {
                Some(id) => {
                    hash = fnv1a64_extend(hash, &[TAG_ENTITY]);
                    hash = fnv1a64_extend(hash, &(id.len() as u64).to_le_bytes());
                    hash = fnv1a64_extend(hash, id.as_bytes());
                }
                None => hash = fnv1a64_extend(hash, &[TAG_LAYER]),
            }
            let flags =
                u8::from(trace.visible) | (u8::from(trace.initial_position.is_some()) << 1);
            hash = fnv1a64_extend(hash, &[flags]);
        }
        Self(hash)
    }

    /// Fingerprint a validated scene.
    #[must_use]
    pub fn from_scene(scene: &ValidScene<'_>) -> Self {
        Self::from_traces(scene.entities)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SceneFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fnv1a64:{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Position;

    fn scene(ids: &[&str]) -> Vec<RenderableTrace> {
        ids.iter().map(|id| RenderableTrace::entity(*id)).collect()
    }

    #[test]
    fn equal_structure_equal_fingerprint() {
        assert_eq!(
            SceneFingerprint::from_traces(&scene(&["1", "44"])),
            SceneFingerprint::from_traces(&scene(&["1", "44"]))
        );
    }

    #[test]
    fn order_changes_fingerprint() {
        assert_ne!(
            SceneFingerprint::from_traces(&scene(&["1", "44"])),
            SceneFingerprint::from_traces(&scene(&["44", "1"]))
        );
    }

    #[test]
    fn visibility_and_placement_change_fingerprint() {
        let base = scene(&["1"]);
        let hidden = vec![RenderableTrace::entity("1").visible(false)];
        let placed = vec![RenderableTrace::entity("1").at(Position::new(0.0, 0.0))];
        let fp = SceneFingerprint::from_traces(&base);
        assert_ne!(fp, SceneFingerprint::from_traces(&hidden));
        assert_ne!(fp, SceneFingerprint::from_traces(&placed));
    }

    #[test]
    fn position_value_does_not_matter() {
        let a = vec![RenderableTrace::entity("1").at(Position::new(0.0, 0.0))];
        let b = vec![RenderableTrace::entity("1").at(Position::new(9.0, -3.0))];
        assert_eq!(
            SceneFingerprint::from_traces(&a),
            SceneFingerprint::from_traces(&b)
        );
    }

    #[test]
    fn identity_boundaries_are_unambiguous() {
        assert_ne!(
            SceneFingerprint::from_traces(&scene(&["12", "3"])),
            SceneFingerprint::from_traces(&scene(&["1", "23"]))
        );
    }

    #[test]
    fn layers_and_entities_differ() {
        let layer = vec![RenderableTrace::layer(true)];
        let empty_id = vec![RenderableTrace::entity("")];
        assert_ne!(
            SceneFingerprint::from_traces(&layer),
            SceneFingerprint::from_traces(&empty_id)
        );
    }

    #[test]
    fn display_uses_algorithm_prefix() {
        let fp = SceneFingerprint::from_traces(&[]);
        let text = fp.to_string();
        assert!(text.starts_with("fnv1a64:"));
        assert_eq!(text.len(), "fnv1a64:".len() + 16);
    }
}
