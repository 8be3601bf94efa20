//! Skin controllers binding meshes to skeletons.

use super::document::{Document, Section};
use super::geometry::ExportVertex;
use super::skeleton::Skeleton;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::scene::{MeshVertex, NodeData, NodeId, Scene};
use crate::types::{format_list, format_matrix};
use glam::Mat4;
use std::fmt::Write as _;

/// Influences at or below this weight are left out of the skin.
pub const WEIGHT_THRESHOLD: f32 = 0.001;

/// Influence limit applied with `use_limit_weights`.
pub const MAX_INFLUENCES: usize = 4;

/// Armature object a mesh object is skinned to.
///
/// Only a mesh parented directly to an armature is skinned. Inconsistent
/// setups are reported and resolved as described in each warning.
pub fn resolve_armature(scene: &Scene, id: NodeId, diagnostics: &mut Diagnostics) -> Option<NodeId> {
    let node = scene.node(id);
    let modifier_count = node.armature_modifier_targets().count();

    let armature = node
        .parent
        .filter(|&p| matches!(scene.node(p).data, NodeData::Armature(_)));

    if armature.is_some() {
        if modifier_count > 1 {
            diagnostics.warn(
                WarningKind::MultipleArmatures,
                format!(
                    "Object \"{}\" refers to more than one armature; only its parent armature is used.",
                    node.name
                ),
            );
        }
        if modifier_count == 0 {
            diagnostics.warn(
                WarningKind::ArmatureWithoutModifier,
                format!("Object \"{}\" is child of an armature, but has no armature modifier.", node.name),
            );
        }
    } else if modifier_count > 0 {
        diagnostics.warn(
            WarningKind::ModifierWithoutArmatureParent,
            format!(
                "Object \"{}\" has armature modifier, but is not a child of an armature; exporting it unskinned.",
                node.name
            ),
        );
    }
    armature
}

/// Options shaping per-vertex influences.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfluenceOptions {
    pub limit: bool,
    pub normalize: bool,
}

/// Joint indices and weights of one vertex.
///
/// Groups are limited and normalized first, as the host would do on its
/// vertex groups. Groups that do not name an exported joint are then
/// dropped without redistributing their weight.
pub fn vertex_influences(
    vertex: &MeshVertex,
    group_names: &[String],
    skeleton: &Skeleton,
    options: InfluenceOptions,
) -> (Vec<usize>, Vec<f32>) {
    let mut groups: Vec<(usize, f32)> = vertex
        .groups
        .iter()
        .filter(|g| g.group < group_names.len())
        .map(|g| (g.group, g.weight))
        .collect();

    if options.limit && groups.len() > MAX_INFLUENCES {
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_by(|&a, &b| groups[b].1.total_cmp(&groups[a].1));
        order.truncate(MAX_INFLUENCES);
        order.sort_unstable();
        groups = order.into_iter().map(|i| groups[i]).collect();
    }

    if options.normalize {
        let total: f32 = groups.iter().map(|(_, w)| *w).sum();
        if total > 0.0 {
            for (_, w) in &mut groups {
                *w /= total;
            }
        }
    }

    let mut bones = Vec::new();
    let mut weights = Vec::new();
    for (group, weight) in groups {
        let Some(joint) = group_names.get(group).and_then(|name| skeleton.joint_index(name)) else {
            continue;
        };
        if weight > WEIGHT_THRESHOLD {
            bones.push(joint);
            weights.push(weight);
        }
    }
    (bones, weights)
}

/// Write a skin controller for an exported mesh and return its id.
pub fn write_controller(
    doc: &mut Document,
    mesh_id: &str,
    bind_shape: &Mat4,
    skeleton: &Skeleton,
    vertices: &[ExportVertex],
) -> String {
    let id = doc.new_id("controller");
    let s = Section::Skins;

    doc.writel(s, 1, format!("<controller id=\"{}\">", id));
    doc.writel(s, 2, format!("<skin source=\"#{}\">", mesh_id));
    doc.writel(s, 3, format!("<bind_shape_matrix>{}</bind_shape_matrix>", format_matrix(bind_shape)));

    // Joint names
    let joint_count = skeleton.len();
    doc.writel(s, 3, format!("<source id=\"{}-joints\">", id));
    doc.writel(
        s,
        4,
        format!(
            "<Name_array id=\"{}-joints-array\" count=\"{}\">{}</Name_array>",
            id,
            joint_count,
            format_list(skeleton.joint_names())
        ),
    );
    write_accessor(doc, &format!("{}-joints-array", id), joint_count, 1, &[("JOINT", "Name")]);
    doc.writel(s, 3, "</source>");

    // Inverse bind matrices
    let poses = skeleton
        .bind_poses
        .iter()
        .map(format_matrix)
        .collect::<Vec<_>>()
        .join(" ");
    doc.writel(s, 3, format!("<source id=\"{}-bind_poses\">", id));
    doc.writel(
        s,
        4,
        format!(
            "<float_array id=\"{}-bind_poses-array\" count=\"{}\">{}</float_array>",
            id,
            skeleton.bind_poses.len() * 16,
            poses
        ),
    );
    write_accessor(
        doc,
        &format!("{}-bind_poses-array", id),
        skeleton.bind_poses.len(),
        16,
        &[("TRANSFORM", "float4x4")],
    );
    doc.writel(s, 3, "</source>");

    // Weights
    let weight_count: usize = vertices.iter().map(|v| v.weights.len()).sum();
    doc.writel(s, 3, format!("<source id=\"{}-skin_weights\">", id));
    doc.writel(
        s,
        4,
        format!(
            "<float_array id=\"{}-skin_weights-array\" count=\"{}\">{}</float_array>",
            id,
            weight_count,
            format_list(vertices.iter().flat_map(|v| v.weights.iter()))
        ),
    );
    write_accessor(doc, &format!("{}-skin_weights-array", id), weight_count, 1, &[("WEIGHT", "float")]);
    doc.writel(s, 3, "</source>");

    doc.writel(s, 3, "<joints>");
    doc.writel(s, 4, format!("<input semantic=\"JOINT\" source=\"#{}-joints\"/>", id));
    doc.writel(s, 4, format!("<input semantic=\"INV_BIND_MATRIX\" source=\"#{}-bind_poses\"/>", id));
    doc.writel(s, 3, "</joints>");

    doc.writel(s, 3, format!("<vertex_weights count=\"{}\">", vertices.len()));
    doc.writel(s, 4, format!("<input semantic=\"JOINT\" source=\"#{}-joints\" offset=\"0\"/>", id));
    doc.writel(s, 4, format!("<input semantic=\"WEIGHT\" source=\"#{}-skin_weights\" offset=\"1\"/>", id));

    let mut v = String::new();
    let mut weight_index = 0;
    for vertex in vertices {
        for bone in &vertex.bones {
            if !v.is_empty() {
                v.push(' ');
            }
            write!(v, "{} {}", bone, weight_index).unwrap();
            weight_index += 1;
        }
    }
    doc.writel(
        s,
        4,
        format!("<vcount>{}</vcount>", format_list(vertices.iter().map(|v| v.weights.len()))),
    );
    doc.writel(s, 4, format!("<v>{}</v>", v));
    doc.writel(s, 3, "</vertex_weights>");

    doc.writel(s, 2, "</skin>");
    doc.writel(s, 1, "</controller>");
    id
}

fn write_accessor(doc: &mut Document, array: &str, count: usize, stride: usize, params: &[(&str, &str)]) {
    let s = Section::Skins;
    doc.writel(s, 4, "<technique_common>");
    doc.writel(
        s,
        4,
        format!("<accessor source=\"#{}\" count=\"{}\" stride=\"{}\">", array, count, stride),
    );
    for (name, ty) in params {
        doc.writel(s, 5, format!("<param name=\"{}\" type=\"{}\"/>", name, ty));
    }
    doc.writel(s, 4, "</accessor>");
    doc.writel(s, 4, "</technique_common>");
}
