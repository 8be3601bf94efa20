//! Non-fatal warnings collected during an export or import run.
//!
//! Every warning is logged through `tracing` as it is raised and kept so the
//! caller can surface it in its own UI. Categories that could fire once per
//! vertex or per frame are reported only once per run.

use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Category of a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    TangentsFailed,
    UnassignedWeights,
    EmptyAnimationClip,
    BoneNameCollision,
    RootControlBone,
    ParentNotExported,
    MultipleArmatures,
    ArmatureWithoutModifier,
    ModifierWithoutArmatureParent,
    UnknownExtensionTag,
    MissingProfile,
    FileTooOld,
    ImporterTooOld,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
    reported: HashSet<WarningKind>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        warn!(?kind, "{}", message);
        self.reported.insert(kind);
        self.warnings.push(Warning { kind, message });
    }

    /// Record a warning unless one of the same kind was already reported.
    ///
    /// Returns whether the warning was recorded.
    pub fn warn_once(&mut self, kind: WarningKind, message: impl Into<String>) -> bool {
        if self.reported.contains(&kind) {
            return false;
        }
        self.warn(kind, message);
        true
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.reported.contains(&kind)
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
