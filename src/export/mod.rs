//! Collada export pipeline.
//!
//! [`export_scene`] is the entry point: it prepares a transient copy of the
//! scene, walks the exportable nodes, extracts geometry, skeletons, skins and
//! curves, optionally samples animation, and writes the assembled document.

pub mod animation;
pub mod collada;
pub mod curve;
pub mod document;
pub mod geometry;
pub mod skeleton;
pub mod skin;
pub mod walker;

pub use collada::{export_gr2, export_scene, DaeExporter};
pub use document::{Document, Section};

use crate::scene::ObjectType;
use serde::{Deserialize, Serialize};

/// How the document is oriented for Y-up consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YUpMode {
    #[default]
    Disabled,
    /// Rotate root nodes by -90 degrees about X and declare Y_UP.
    Rotate,
    /// Declare Y_UP without touching transforms.
    FlagOnly,
}

/// Model type forced onto every exported mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraFlag {
    #[default]
    Disabled,
    MeshProxy,
    Cloth,
    Rigid,
    RigidCloth,
}

impl ExtraFlag {
    pub fn forces_rigid(&self) -> bool {
        matches!(self, ExtraFlag::Rigid | ExtraFlag::RigidCloth)
    }

    pub fn forces_cloth(&self) -> bool {
        matches!(self, ExtraFlag::Cloth | ExtraFlag::RigidCloth)
    }

    pub fn forces_mesh_proxy(&self) -> bool {
        matches!(self, ExtraFlag::MeshProxy)
    }
}

/// Options for one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Object types that qualify for export on their own.
    pub object_types: Vec<ObjectType>,
    /// Skip hidden or unselectable objects.
    pub use_export_visible: bool,
    pub use_export_selected: bool,
    /// Skip objects in hidden collections.
    pub use_active_layers: bool,
    pub use_triangles: bool,
    pub use_tangent: bool,
    pub use_normals: bool,
    /// Keep at most four influences per vertex.
    pub use_limit_weights: bool,
    /// Scale each vertex's influences to sum to one before binding.
    pub use_normalize_weights: bool,
    pub use_exclude_ctrl_bones: bool,
    /// Capture geometry with the first armature modifier disabled and all
    /// armatures in rest position.
    pub use_exclude_armature_modifier: bool,
    pub use_rest_pose: bool,
    pub use_anim: bool,
    /// Export every action as its own animation clip.
    pub use_anim_action_all: bool,
    /// Skip actions whose name ends in `-noexp` in per-action mode.
    pub use_anim_skip_noexp: bool,
    /// Frame range sampled outside per-action mode; defaults to the scene range.
    pub frame_range: Option<(i32, i32)>,
    pub yup_mode: YUpMode,
    pub extra_data_disabled: bool,
    pub extra_flag: ExtraFlag,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            object_types: vec![
                ObjectType::Armature,
                ObjectType::Mesh,
                ObjectType::Curve,
                ObjectType::Other,
            ],
            use_export_visible: true,
            use_export_selected: false,
            use_active_layers: true,
            use_triangles: true,
            use_tangent: true,
            use_normals: true,
            use_limit_weights: true,
            use_normalize_weights: false,
            use_exclude_ctrl_bones: false,
            use_exclude_armature_modifier: true,
            use_rest_pose: true,
            use_anim: false,
            use_anim_action_all: false,
            use_anim_skip_noexp: false,
            frame_range: None,
            yup_mode: YUpMode::Disabled,
            extra_data_disabled: false,
            extra_flag: ExtraFlag::Disabled,
        }
    }
}

impl ExportConfig {
    pub fn with_object_types(mut self, types: &[ObjectType]) -> Self {
        self.object_types = types.to_vec();
        self
    }

    pub fn with_triangles(mut self, enabled: bool) -> Self {
        self.use_triangles = enabled;
        self
    }

    pub fn with_tangents(mut self, enabled: bool) -> Self {
        self.use_tangent = enabled;
        self
    }

    pub fn with_exclude_ctrl_bones(mut self, enabled: bool) -> Self {
        self.use_exclude_ctrl_bones = enabled;
        self
    }

    /// Enable animation export, optionally one clip per action.
    pub fn with_animation(mut self, per_action: bool) -> Self {
        self.use_anim = true;
        self.use_anim_action_all = per_action;
        self
    }

    pub fn with_frame_range(mut self, start: i32, end: i32) -> Self {
        self.frame_range = Some((start, end));
        self
    }

    pub fn with_yup(mut self, mode: YUpMode) -> Self {
        self.yup_mode = mode;
        self
    }

    pub fn with_extra_flag(mut self, flag: ExtraFlag) -> Self {
        self.extra_flag = flag;
        self
    }

    pub fn exports_type(&self, ty: ObjectType) -> bool {
        self.object_types.contains(&ty)
    }
}

/// Result of an export call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Finished,
    Cancelled,
    Error(String),
}

impl ExportOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, ExportOutcome::Finished)
    }
}
