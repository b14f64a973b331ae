//! Per-canvas engine state.

use web_time::Instant;

use trackside_core::{RevisionToken, SceneFingerprint};

use crate::animation_scheduler::ResizeSuppression;
use crate::entity_index::EntityIndexMap;
use crate::scene_cache::SceneStateCache;

/// Everything the engine remembers about one canvas.
///
/// Lives exactly as long as the canvas it describes. Mutated in the fixed
/// order reconcile → plan → schedule → apply within a tick.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub(crate) cache: SceneStateCache,
    pub(crate) index: EntityIndexMap,
    pub(crate) suppression: ResizeSuppression,
}

impl EngineState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_applied_revision(&self) -> Option<&RevisionToken> {
        self.cache.revision()
    }

    #[must_use]
    pub fn last_applied_fingerprint(&self) -> Option<SceneFingerprint> {
        self.cache.fingerprint()
    }

    #[must_use]
    pub fn cache(&self) -> &SceneStateCache {
        &self.cache
    }

    #[must_use]
    pub fn index(&self) -> &EntityIndexMap {
        &self.index
    }

    #[must_use]
    pub fn resized_recently(&self) -> bool {
        self.suppression.resized_recently()
    }

    #[must_use]
    pub fn resize_suppress_until(&self) -> Option<Instant> {
        self.suppression.suppress_until()
    }

    #[must_use]
    pub fn suppression(&self) -> &ResizeSuppression {
        &self.suppression
    }
}
