//! Last-applied scene revision and fingerprint.

use trackside_core::{RevisionToken, SceneFingerprint};

/// Why a scene must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// Nothing has been applied yet.
    Initial,
    /// The tick carried a scene-change token and the revision moved.
    RevisionChanged,
    /// The structural fingerprint moved.
    FingerprintChanged,
}

impl RebuildReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::RevisionChanged => "revision_changed",
            Self::FingerprintChanged => "fingerprint_changed",
        }
    }
}

/// Remembers which scene is on the canvas.
#[derive(Debug, Clone, Default)]
pub struct SceneStateCache {
    revision: Option<RevisionToken>,
    fingerprint: Option<SceneFingerprint>,
    rebuilds: u64,
}

impl SceneStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a scene needs a rebuild.
    ///
    /// A revision mismatch only counts when the tick carries a scene-change
    /// token; a fingerprint mismatch always counts.
    #[must_use]
    pub fn rebuild_reason(
        &self,
        revision: &RevisionToken,
        fingerprint: SceneFingerprint,
        scene_changed: bool,
    ) -> Option<RebuildReason> {
        let Some(last_fingerprint) = self.fingerprint else {
            return Some(RebuildReason::Initial);
        };
        if scene_changed && self.revision.as_ref() != Some(revision) {
            return Some(RebuildReason::RevisionChanged);
        }
        if fingerprint != last_fingerprint {
            return Some(RebuildReason::FingerprintChanged);
        }
        None
    }

    /// Record a scene the canvas accepted.
    pub fn record(&mut self, revision: RevisionToken, fingerprint: SceneFingerprint) {
        self.revision = Some(revision);
        self.fingerprint = Some(fingerprint);
        self.rebuilds += 1;
    }

    #[must_use]
    pub fn revision(&self) -> Option<&RevisionToken> {
        self.revision.as_ref()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<SceneFingerprint> {
        self.fingerprint
    }

    /// Number of accepted rebuilds.
    #[must_use]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
