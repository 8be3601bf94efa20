//! Evaluation of transforms, poses and modifier stacks for one [`SceneState`].

use super::{Modifier, MeshData, NodeData, NodeId, PosePosition, Scene, SceneState};
use crate::error::{ExportError, Result};
use crate::types::{inverted_safe, Trs};
use glam::{Mat4, Vec3};

/// Read-only view of a scene at a given state.
pub struct Evaluator<'a> {
    scene: &'a Scene,
    state: &'a SceneState,
}

impl<'a> Evaluator<'a> {
    pub fn new(scene: &'a Scene, state: &'a SceneState) -> Self {
        Self { scene, state }
    }

    fn frame(&self) -> f32 {
        self.state.frame as f32
    }

    /// Transform relative to the parent, with object channels of the active action applied.
    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.scene.node(id);
        let mut local = node.matrix_local;

        if let Some(action) = self.state.active_action(id) {
            let action = self.scene.action(action);
            if action.animates_object() {
                let mut trs = Trs::from_matrix(&local);
                action.apply_object_channels(self.frame(), &mut trs);
                local = trs.to_matrix();
            }
        }

        match (node.parent, self.scene.root_correction) {
            (None, Some(correction)) => correction * local,
            _ => local,
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let local = self.local_matrix(id);
        match self.scene.node(id).parent {
            Some(parent) => self.world_matrix(parent) * local,
            None => local,
        }
    }

    /// Pose channels of one bone relative to its rest transform.
    pub fn pose_basis(&self, armature_node: NodeId, bone: usize) -> Trs {
        let Some(armature) = self.scene.armature_of(armature_node) else {
            return Trs::default();
        };

        let mut trs = if self.state.cleared_poses.contains(&armature_node) {
            Trs::default()
        } else {
            Trs::from_matrix(&armature.pose_basis(bone))
        };

        if let Some(action) = self.state.active_action(armature_node) {
            self.scene
                .action(action)
                .apply_bone_channels(&armature.bones[bone].name, self.frame(), &mut trs);
        }
        trs
    }

    /// Armature-space pose matrix of every bone.
    pub fn pose_matrices(&self, armature_node: NodeId) -> Vec<Mat4> {
        let NodeData::Armature(arm_id) = self.scene.node(armature_node).data else {
            return Vec::new();
        };
        let armature = self.scene.armature(arm_id);

        if self.state.pose_position(arm_id) == PosePosition::Rest {
            return armature.bones.iter().map(|b| b.matrix_local).collect();
        }

        // Parents always precede their children.
        let mut out: Vec<Mat4> = Vec::with_capacity(armature.bones.len());
        for (i, bone) in armature.bones.iter().enumerate() {
            let basis = self.pose_basis(armature_node, i).to_matrix();
            let m = match bone.parent {
                Some(p) => {
                    let parent_rest = armature.bones[p].matrix_local;
                    out[p] * inverted_safe(&parent_rest) * bone.matrix_local * basis
                }
                None => bone.matrix_local * basis,
            };
            out.push(m);
        }
        out
    }

    /// Detached copy of a mesh object's geometry with its enabled modifiers applied.
    pub fn evaluate_mesh(&self, id: NodeId) -> Result<MeshData> {
        let node = self.scene.node(id);
        let NodeData::Mesh(mesh_id) = node.data else {
            return Err(ExportError::InvalidScene(format!("'{}' is not a mesh object", node.name)));
        };
        let mut mesh = self.scene.mesh(mesh_id).clone();

        for (i, modifier) in node.modifiers.iter().enumerate() {
            let Modifier::Armature { object: Some(target), .. } = modifier else {
                continue;
            };
            if !self.state.is_modifier_visible(id, i) {
                continue;
            }
            self.apply_armature_deform(id, *target, &mut mesh);
        }
        Ok(mesh)
    }

    /// Linear blend skinning of `mesh` by the pose of `armature_node`.
    fn apply_armature_deform(&self, mesh_node: NodeId, armature_node: NodeId, mesh: &mut MeshData) {
        let Some(armature) = self.scene.armature_of(armature_node) else {
            return;
        };
        let NodeData::Armature(arm_id) = self.scene.node(armature_node).data else {
            return;
        };
        if self.state.pose_position(arm_id) == PosePosition::Rest {
            return;
        }

        let poses = self.pose_matrices(armature_node);
        let skin: Vec<Mat4> = armature
            .bones
            .iter()
            .zip(&poses)
            .map(|(b, pose)| *pose * inverted_safe(&b.matrix_local))
            .collect();

        let group_bones: Vec<Option<usize>> = self
            .scene
            .node(mesh_node)
            .vertex_groups
            .iter()
            .map(|name| armature.bone_index(name).filter(|&b| armature.bones[b].use_deform))
            .collect();

        let object_world = self.world_matrix(mesh_node);
        let armature_world = self.world_matrix(armature_node);
        let to_armature = inverted_safe(&armature_world) * object_world;
        let from_armature = inverted_safe(&object_world) * armature_world;

        for vertex in &mut mesh.vertices {
            let co = to_armature.transform_point3(Vec3::from(vertex.co));
            let mut sum = Vec3::ZERO;
            let mut total = 0.0;
            for g in &vertex.groups {
                let Some(Some(bone)) = group_bones.get(g.group) else {
                    continue;
                };
                if g.weight <= 0.0 {
                    continue;
                }
                sum += skin[*bone].transform_point3(co) * g.weight;
                total += g.weight;
            }
            if total > 0.0 {
                vertex.co = from_armature.transform_point3(sum / total).to_array();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::fixtures;
    use crate::scene::StateGuard;

    #[test]
    fn test_world_matrix_chains_parents() {
        let fx = fixtures::two_bone_rig(false);
        let state = SceneState::new(&fx.scene);
        let eval = Evaluator::new(&fx.scene, &state);
        let world = eval.world_matrix(fx.mesh);
        let expected = fx.scene.node(fx.armature).matrix_local * fx.scene.node(fx.mesh).matrix_local;
        assert_eq!(world, expected);
    }

    #[test]
    fn test_pose_matrices_follow_action() {
        let fx = fixtures::two_bone_rig(false);
        let mut state = SceneState::new(&fx.scene);
        state.frame = 10;
        let eval = Evaluator::new(&fx.scene, &state);
        let poses = eval.pose_matrices(fx.armature);
        // Root bone is translated by the action at frame 10.
        let root_pos = poses[0].transform_point3(Vec3::ZERO);
        assert!((root_pos - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_rest_position_ignores_pose() {
        let fx = fixtures::two_bone_rig(false);
        let mut state = SceneState::new(&fx.scene);
        state.frame = 10;
        let mut guard = StateGuard::new(&mut state);
        guard.set_all_rest();
        let eval = Evaluator::new(&fx.scene, &guard);
        let poses = eval.pose_matrices(fx.armature);
        let armature = fx.scene.armature_of(fx.armature).unwrap();
        assert_eq!(poses[0], armature.bones[0].matrix_local);
    }

    #[test]
    fn test_evaluate_mesh_applies_armature_deform() {
        let fx = fixtures::two_bone_rig(false);
        let mut state = SceneState::new(&fx.scene);
        state.frame = 10;
        let eval = Evaluator::new(&fx.scene, &state);
        let deformed = eval.evaluate_mesh(fx.mesh).unwrap();
        let original = fx.scene.mesh(crate::scene::MeshId(0));
        // Vertex 0 is fully weighted to the root bone, which moved up by 2.
        let delta = Vec3::from(deformed.vertices[0].co) - Vec3::from(original.vertices[0].co);
        assert!((delta - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-4);
    }
}
