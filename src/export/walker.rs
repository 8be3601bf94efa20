//! Selection of the nodes that take part in an export.
//!
//! Two filters apply. [`can_export`] is the caller-side selection (visibility,
//! selection, collection visibility) deciding which objects are handed to the
//! exporter at all. [`is_node_valid`] is the type filter deciding which of
//! those anchor the document hierarchy; every ancestor of a valid node is
//! pulled in as well so transforms stay continuous.

use super::{ExportConfig, YUpMode};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::scene::{Evaluator, NodeData, NodeId, ObjectType, Scene, SceneState};
use crate::types::yup_correction;
use std::collections::HashSet;
use tracing::debug;

fn in_hidden_collection(scene: &Scene, id: NodeId) -> bool {
    scene
        .node(id)
        .collections
        .iter()
        .any(|&c| scene.collections[c].hide_viewport)
}

/// Whether the caller-side selection options let this object be exported.
pub fn can_export(scene: &Scene, id: NodeId, config: &ExportConfig) -> bool {
    let node = scene.node(id);
    if config.use_export_visible && (node.hidden || node.hide_select) {
        return false;
    }
    if config.use_export_selected && !node.selected {
        return false;
    }
    if config.use_active_layers && in_hidden_collection(scene, id) {
        return false;
    }
    true
}

/// Whether a node qualifies for the document hierarchy on its own.
pub fn is_node_valid(scene: &Scene, id: NodeId, config: &ExportConfig) -> bool {
    if !config.exports_type(scene.node(id).object_type()) {
        return false;
    }
    !(config.use_active_layers && in_hidden_collection(scene, id))
}

/// Valid nodes among `objects` plus all of their ancestors.
pub fn compute_valid_nodes(scene: &Scene, objects: &[NodeId], config: &ExportConfig) -> HashSet<NodeId> {
    let mut valid = HashSet::new();
    for &id in objects {
        if valid.contains(&id) || !is_node_valid(scene, id, config) {
            continue;
        }
        let mut current = Some(id);
        while let Some(n) = current {
            if !valid.insert(n) {
                break;
            }
            current = scene.node(n).parent;
        }
    }
    valid
}

/// Valid root nodes, ordered by name.
pub fn sorted_roots(scene: &Scene, valid: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut roots: Vec<NodeId> = valid
        .iter()
        .copied()
        .filter(|&id| scene.node(id).parent.is_none())
        .collect();
    roots.sort_by(|a, b| scene.node(*a).name.cmp(&scene.node(*b).name).then(a.cmp(b)));
    roots
}

/// Children of a node, ordered by name.
pub fn sorted_children(scene: &Scene, id: NodeId) -> Vec<NodeId> {
    let mut children = scene.node(id).children.clone();
    children.sort_by(|a, b| scene.node(*a).name.cmp(&scene.node(*b).name).then(a.cmp(b)));
    children
}

/// The transient scene an export run works on.
#[derive(Debug)]
pub struct PreparedScene {
    pub scene: Scene,
    /// Objects selected for export, in scene order.
    pub objects: Vec<NodeId>,
}

/// Copy the scene and apply the export-only adjustments to the copy.
///
/// Objects whose parent is not exported are detached, keeping their world
/// transform. Meshes parented to an armature are detached the same way when
/// armatures are not exported. In [`YUpMode::Rotate`] every root gets a -90
/// degree rotation about X.
pub fn prepare_scene(
    source: &Scene,
    state: &SceneState,
    config: &ExportConfig,
    diagnostics: &mut Diagnostics,
) -> PreparedScene {
    let objects: Vec<NodeId> = source.node_ids().filter(|&id| can_export(source, id, config)).collect();
    let mut scene = source.clone();
    let eval = Evaluator::new(source, state);

    for &id in &objects {
        let node = source.node(id);
        let Some(parent) = node.parent else {
            continue;
        };

        if !can_export(source, parent, config) {
            diagnostics.warn(
                WarningKind::ParentNotExported,
                format!(
                    "Object '{}' has a parent '{}' that will not export. Unparenting copy and preserving transform.",
                    node.name,
                    source.node(parent).name
                ),
            );
            scene.unparent_keep_transform(id, eval.world_matrix(id));
            continue;
        }

        let parent_is_armature = matches!(source.node(parent).data, NodeData::Armature(_));
        if node.object_type() == ObjectType::Mesh
            && parent_is_armature
            && !config.exports_type(ObjectType::Armature)
        {
            debug!(object = %node.name, "Armatures are not exported; detaching mesh from its armature");
            scene.unparent_keep_transform(id, eval.world_matrix(id));
        }
    }

    if config.yup_mode == YUpMode::Rotate {
        scene.root_correction = Some(yup_correction());
    }

    PreparedScene { scene, objects }
}
