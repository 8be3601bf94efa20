//! Armature flattening into an indexed joint table.

use super::document::{Document, Section};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::scene::{ArmatureData, Bone};
use crate::types::{format_matrix, inverted_safe, xml_escape};
use glam::Mat4;
use std::collections::{HashMap, HashSet};

/// Bones used only for rigging: `ctrl` name prefix or not flagged as deforming.
pub fn is_control_bone(bone: &Bone) -> bool {
    bone.name.starts_with("ctrl") || !bone.use_deform
}

/// One exported bone.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// Index of the bone in its armature.
    pub bone: usize,
    pub id: String,
    pub sid: String,
    pub name: String,
    /// Transform relative to the nearest exported ancestor.
    pub local: Mat4,
    /// Child joints by joint index.
    pub children: Vec<usize>,
}

/// Exported bones of one armature, indexed densely from zero.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub id: String,
    pub name: String,
    pub armature_xform: Mat4,
    pub joints: Vec<Joint>,
    /// Joint indices of the root bones.
    pub roots: Vec<usize>,
    /// Inverse world bind matrix of every joint.
    pub bind_poses: Vec<Mat4>,
    bone_index: HashMap<String, usize>,
    bone_joint: Vec<Option<usize>>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Joint index of the bone with this name.
    pub fn joint_index(&self, bone_name: &str) -> Option<usize> {
        self.bone_index.get(bone_name).copied()
    }

    /// Joint exported for an armature bone, if the bone was exported.
    pub fn joint_of(&self, bone: usize) -> Option<&Joint> {
        self.bone_joint.get(bone).copied().flatten().map(|j| &self.joints[j])
    }

    /// Joint sids in index order; these name the joints in skin controllers.
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.sid.as_str())
    }

    /// Element ids of the root joints.
    pub fn skeleton_nodes(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(|&r| self.joints[r].id.as_str())
    }

    /// Emit the joint hierarchy into the node section.
    pub fn write_nodes(&self, doc: &mut Document, il: usize) {
        for &root in &self.roots {
            self.write_joint(doc, root, il);
        }
    }

    fn write_joint(&self, doc: &mut Document, index: usize, il: usize) {
        let joint = &self.joints[index];
        doc.writel(
            Section::Nodes,
            il,
            format!(
                "<node id=\"{}\" sid=\"{}\" name=\"{}\" type=\"JOINT\">",
                joint.id,
                joint.sid,
                xml_escape(&joint.name)
            ),
        );
        doc.writel(
            Section::Nodes,
            il + 1,
            format!("<matrix sid=\"transform\">{}</matrix>", format_matrix(&joint.local)),
        );
        for &child in &joint.children {
            self.write_joint(doc, child, il + 1);
        }
        doc.writel(Section::Nodes, il, "</node>");
    }
}

/// Options and run-wide state for [`flatten_skeleton`].
pub struct FlattenContext<'a> {
    pub exclude_ctrl_bones: bool,
    /// Report bone names already used by another skeleton.
    pub detect_collisions: bool,
    pub used_bones: &'a mut HashSet<String>,
    pub diagnostics: &'a mut Diagnostics,
}

/// Walk the bone hierarchy in pre-order and assign joint indices.
///
/// Control bones are skipped when excluded; their children attach to the
/// nearest exported ancestor and take their local transform relative to it.
/// Root bones are always exported.
pub fn flatten_skeleton(
    doc: &mut Document,
    name: &str,
    armature: &ArmatureData,
    armature_world: Mat4,
    ctx: &mut FlattenContext<'_>,
) -> Skeleton {
    let mut skeleton = Skeleton {
        id: doc.new_id("skelbones"),
        name: name.to_string(),
        armature_xform: armature_world,
        joints: Vec::new(),
        roots: Vec::new(),
        bind_poses: Vec::new(),
        bone_index: HashMap::new(),
        bone_joint: vec![None; armature.bones.len()],
    };

    for root in armature.roots() {
        visit(doc, armature, root, None, &mut skeleton, ctx);
    }
    skeleton
}

/// `anchor` is the joint index and rest matrix of the nearest exported ancestor.
fn visit(
    doc: &mut Document,
    armature: &ArmatureData,
    bone_index: usize,
    anchor: Option<(usize, Mat4)>,
    skeleton: &mut Skeleton,
    ctx: &mut FlattenContext<'_>,
) {
    let bone = &armature.bones[bone_index];
    let mut is_ctrl = ctx.exclude_ctrl_bones && is_control_bone(bone);
    if bone.parent.is_none() && is_ctrl {
        ctx.diagnostics.warn(
            WarningKind::RootControlBone,
            format!("Root bone cannot be a control bone: {}", bone.name),
        );
        is_ctrl = false;
    }

    if is_ctrl {
        for child in armature.children(bone_index) {
            visit(doc, armature, child, anchor, skeleton, ctx);
        }
        return;
    }

    let index = skeleton.joints.len();
    let id = doc.new_id("bone");
    let sid = format!("{}-{}", skeleton.id, index);

    if !ctx.used_bones.insert(bone.name.clone()) && ctx.detect_collisions {
        ctx.diagnostics.warn_once(
            WarningKind::BoneNameCollision,
            format!(
                "Bone name \"{}\" used in more than one skeleton. Actions might export wrong.",
                bone.name
            ),
        );
    }

    let local = match anchor {
        Some((_, parent_rest)) => inverted_safe(&parent_rest) * bone.matrix_local,
        None => bone.matrix_local,
    };

    skeleton.joints.push(Joint {
        bone: bone_index,
        id,
        sid,
        name: bone.name.clone(),
        local,
        children: Vec::new(),
    });
    skeleton
        .bind_poses
        .push(inverted_safe(&(skeleton.armature_xform * bone.matrix_local)));
    skeleton.bone_index.insert(bone.name.clone(), index);
    skeleton.bone_joint[bone_index] = Some(index);

    match anchor {
        Some((parent, _)) => skeleton.joints[parent].children.push(index),
        None => skeleton.roots.push(index),
    }

    for child in armature.children(bone_index) {
        visit(doc, armature, child, Some((index, bone.matrix_local)), skeleton, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn chain(names: &[&str]) -> ArmatureData {
        let mut armature = ArmatureData::new("Chain");
        let mut parent = None;
        for (i, name) in names.iter().enumerate() {
            let m = Mat4::from_translation(Vec3::new(0.0, 0.0, i as f32));
            parent = Some(armature.add_bone(*name, parent, m));
        }
        armature
    }

    fn flatten(armature: &ArmatureData, exclude: bool, diag: &mut Diagnostics) -> Skeleton {
        let mut doc = Document::new();
        let mut used = HashSet::new();
        let mut ctx = FlattenContext {
            exclude_ctrl_bones: exclude,
            detect_collisions: false,
            used_bones: &mut used,
            diagnostics: diag,
        };
        flatten_skeleton(&mut doc, "Chain", armature, Mat4::IDENTITY, &mut ctx)
    }

    #[test]
    fn test_indices_are_dense() {
        let armature = chain(&["Root", "Mid", "Leaf"]);
        let skeleton = flatten(&armature, false, &mut Diagnostics::new());
        assert_eq!(skeleton.len(), 3);
        assert_eq!(skeleton.bind_poses.len(), 3);
        let names: Vec<&str> = skeleton.joint_names().collect();
        assert_eq!(names.len(), 3);
        for (i, name) in names.iter().enumerate() {
            assert!(name.ends_with(&format!("-{}", i)));
            assert_eq!(skeleton.joint_index(&skeleton.joints[i].name), Some(i));
        }
    }

    #[test]
    fn test_control_bone_skipped_and_child_reattached() {
        let armature = chain(&["Root", "ctrl_Mid", "Leaf"]);
        let skeleton = flatten(&armature, true, &mut Diagnostics::new());
        assert_eq!(skeleton.len(), 2);
        assert!(skeleton.joint_of(1).is_none());
        assert_eq!(skeleton.joints[0].children, vec![1]);
        // Leaf rest is z=2 and Root rest is z=0, so the skipped bone's offset is kept.
        let leaf = &skeleton.joints[1];
        assert_eq!(leaf.name, "Leaf");
        assert!((leaf.local.w_axis.truncate() - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6);
    }

    #[test]
    fn test_non_deform_bone_is_control() {
        let mut armature = chain(&["Root", "Helper"]);
        armature.bones[1].use_deform = false;
        let skeleton = flatten(&armature, true, &mut Diagnostics::new());
        assert_eq!(skeleton.len(), 1);
    }

    #[test]
    fn test_root_control_bone_is_kept() {
        let armature = chain(&["ctrl_Root", "Leaf"]);
        let mut diag = Diagnostics::new();
        let skeleton = flatten(&armature, true, &mut diag);
        assert_eq!(skeleton.len(), 2);
        assert!(diag.has(WarningKind::RootControlBone));
    }

    #[test]
    fn test_bind_pose_is_inverse_world_rest() {
        let armature = chain(&["Root", "Leaf"]);
        let mut doc = Document::new();
        let mut used = HashSet::new();
        let mut diag = Diagnostics::new();
        let mut ctx = FlattenContext {
            exclude_ctrl_bones: false,
            detect_collisions: false,
            used_bones: &mut used,
            diagnostics: &mut diag,
        };
        let world = Mat4::from_translation(Vec3::X);
        let skeleton = flatten_skeleton(&mut doc, "Chain", &armature, world, &mut ctx);
        let expected = (world * armature.bones[1].matrix_local).inverse();
        assert!(skeleton.bind_poses[1].abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_name_collision_reported_across_skeletons() {
        let armature = chain(&["Root"]);
        let mut doc = Document::new();
        let mut used = HashSet::new();
        let mut diag = Diagnostics::new();
        for _ in 0..2 {
            let mut ctx = FlattenContext {
                exclude_ctrl_bones: false,
                detect_collisions: true,
                used_bones: &mut used,
                diagnostics: &mut diag,
            };
            flatten_skeleton(&mut doc, "Chain", &armature, Mat4::IDENTITY, &mut ctx);
        }
        assert!(diag.has(WarningKind::BoneNameCollision));
    }

    #[test]
    fn test_write_nodes_nests_joints() {
        let armature = chain(&["Root", "Leaf"]);
        let mut doc = Document::new();
        let mut used = HashSet::new();
        let mut diag = Diagnostics::new();
        let mut ctx = FlattenContext {
            exclude_ctrl_bones: false,
            detect_collisions: false,
            used_bones: &mut used,
            diagnostics: &mut diag,
        };
        let skeleton = flatten_skeleton(&mut doc, "Chain", &armature, Mat4::IDENTITY, &mut ctx);
        skeleton.write_nodes(&mut doc, 2);

        let lines = doc.lines(Section::Nodes);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("\t\t<node id=\"id-bone-2\""));
        assert!(lines[2].starts_with("\t\t\t<node"));
        assert_eq!(lines[5], "\t\t</node>");
        assert_eq!(skeleton.skeleton_nodes().collect::<Vec<_>>(), vec!["id-bone-2"]);
    }
}
