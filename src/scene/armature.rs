//! Armature payloads: rest bones and the authored pose.

use super::action::ActionId;
use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Index of an armature in [`Scene::armatures`](super::Scene::armatures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmatureId(pub usize);

/// Whether an armature deforms with its pose or shows its rest position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PosePosition {
    #[default]
    Pose,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest transform in armature space.
    pub matrix_local: Mat4,
    #[serde(default = "default_true")]
    pub use_deform: bool,
}

fn default_true() -> bool {
    true
}

/// Authored pose of one bone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseBone {
    /// Pose transform relative to the rest transform.
    pub basis: Mat4,
    /// Actions referenced through Action constraints on this bone.
    #[serde(default)]
    pub action_constraints: Vec<ActionId>,
}

impl Default for PoseBone {
    fn default() -> Self {
        Self {
            basis: Mat4::IDENTITY,
            action_constraints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmatureData {
    pub name: String,
    pub bones: Vec<Bone>,
    /// One entry per bone; missing entries mean an identity pose.
    #[serde(default)]
    pub pose: Vec<PoseBone>,
    #[serde(default)]
    pub pose_position: PosePosition,
    #[serde(default)]
    pub skeleton_resource_id: String,
}

impl ArmatureData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a bone and return its index. Parents must be added before children.
    pub fn add_bone(&mut self, name: impl Into<String>, parent: Option<usize>, matrix_local: Mat4) -> usize {
        self.bones.push(Bone {
            name: name.into(),
            parent,
            matrix_local,
            use_deform: true,
        });
        self.pose.push(PoseBone::default());
        self.bones.len() - 1
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| i)
    }

    pub fn children(&self, bone: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(bone))
            .map(|(i, _)| i)
    }

    pub fn pose_basis(&self, bone: usize) -> Mat4 {
        self.pose.get(bone).map(|p| p.basis).unwrap_or(Mat4::IDENTITY)
    }

    /// All actions referenced by Action constraints.
    pub fn constraint_actions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.pose.iter().flat_map(|p| p.action_constraints.iter().copied())
    }

    /// Bones whose parent index is missing or not earlier in the list.
    pub fn validate(&self) -> Result<(), String> {
        for (i, bone) in self.bones.iter().enumerate() {
            if let Some(p) = bone.parent {
                if p >= i {
                    return Err(format!(
                        "bone '{}' in armature '{}' must come after its parent",
                        bone.name, self.name
                    ));
                }
            }
        }
        Ok(())
    }
}
