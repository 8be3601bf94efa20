//! In-memory scene graph supplied by the host.
//!
//! The graph is an explicit tree: every node stores its parent index and the
//! ordered list of its children, built once and never mutated during
//! traversal. Typed payloads (meshes, armatures, curves) live in side tables
//! so several nodes can share one mesh.
//!
//! Mutable host state (current frame, active actions, pose positions,
//! modifier visibility) is kept apart in [`SceneState`] and read through an
//! [`Evaluator`].

pub mod action;
pub mod armature;
pub mod curve;
pub mod eval;
pub mod mesh;
pub mod state;

#[cfg(test)]
pub(crate) mod fixtures;

pub use action::{Action, ActionId, FCurve, Keyframe};
pub use armature::{ArmatureData, ArmatureId, Bone, PoseBone, PosePosition};
pub use curve::{BezierPoint, CurveData, CurveId, CurvePoint, Spline, SplinePoints};
pub use eval::Evaluator;
pub use mesh::{ColorLayer, GroupWeight, LsMeshProperties, MeshData, MeshId, MeshVertex, Polygon, UvLayer};
pub use state::{SceneState, StateGuard};

use crate::convert::Game;
use crate::error::{ExportError, Result};
use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Index of a node in [`Scene::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Object type tag used by the export allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Mesh,
    Armature,
    Curve,
    Other,
}

/// Typed payload of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeData {
    Mesh(MeshId),
    Armature(ArmatureId),
    Curve(CurveId),
    #[default]
    Empty,
}

impl NodeData {
    pub fn object_type(&self) -> ObjectType {
        match self {
            NodeData::Mesh(_) => ObjectType::Mesh,
            NodeData::Armature(_) => ObjectType::Armature,
            NodeData::Curve(_) => ObjectType::Curve,
            NodeData::Empty => ObjectType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Modifier {
    Armature {
        object: Option<NodeId>,
        #[serde(default = "default_true")]
        show_viewport: bool,
    },
    Other {
        name: String,
    },
}

fn default_true() -> bool {
    true
}

/// Binding of an object to an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationData {
    pub action: Option<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub hide_viewport: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    #[serde(default = "identity")]
    pub matrix_local: Mat4,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(skip)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub data: NodeData,
    /// Indices into [`Scene::collections`].
    #[serde(default)]
    pub collections: Vec<usize>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub hide_select: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub has_constraints: bool,
    #[serde(default)]
    pub animation: Option<AnimationData>,
    /// Vertex group names, indexed by [`GroupWeight::group`].
    #[serde(default)]
    pub vertex_groups: Vec<String>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

fn identity() -> Mat4 {
    Mat4::IDENTITY
}

impl SceneNode {
    pub fn new(name: impl Into<String>, data: NodeData) -> Self {
        Self {
            name: name.into(),
            matrix_local: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            data,
            collections: Vec::new(),
            hidden: false,
            hide_select: false,
            selected: false,
            has_constraints: false,
            animation: None,
            vertex_groups: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_matrix(mut self, matrix: Mat4) -> Self {
        self.matrix_local = matrix;
        self
    }

    pub fn with_action(mut self, action: Option<ActionId>) -> Self {
        self.animation = Some(AnimationData { action });
        self
    }

    pub fn object_type(&self) -> ObjectType {
        self.data.object_type()
    }

    /// Armatures referenced by armature modifiers, in modifier order.
    pub fn armature_modifier_targets(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.modifiers.iter().enumerate().filter_map(|(i, m)| match m {
            Modifier::Armature { object: Some(obj), .. } => Some((i, *obj)),
            _ => None,
        })
    }
}

/// The complete scene handed over by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    #[serde(default = "default_fps")]
    pub fps: f32,
    #[serde(default = "default_frame_start")]
    pub frame_start: i32,
    #[serde(default = "default_frame_end")]
    pub frame_end: i32,
    #[serde(default = "default_frame_start")]
    pub frame_current: i32,
    #[serde(default)]
    pub nodes: Vec<SceneNode>,
    #[serde(default)]
    pub meshes: Vec<MeshData>,
    #[serde(default)]
    pub armatures: Vec<ArmatureData>,
    #[serde(default)]
    pub curves: Vec<CurveData>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    /// LSTools metadata schema version; 0 means unset.
    #[serde(default)]
    pub metadata_version: u32,
    #[serde(default)]
    pub game: Game,
    /// Extra transform applied on top of every root node.
    #[serde(skip)]
    pub root_correction: Option<Mat4>,
}

fn default_fps() -> f32 {
    24.0
}

fn default_frame_start() -> i32 {
    1
}

fn default_frame_end() -> i32 {
    250
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            name: "Scene".to_string(),
            fps: default_fps(),
            frame_start: default_frame_start(),
            frame_end: default_frame_end(),
            frame_current: default_frame_start(),
            nodes: Vec::new(),
            meshes: Vec::new(),
            armatures: Vec::new(),
            curves: Vec::new(),
            actions: Vec::new(),
            collections: Vec::new(),
            metadata_version: 0,
            game: Game::default(),
            root_correction: None,
        }
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a scene description and link up the child lists.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut scene: Scene = serde_json::from_str(json)?;
        scene.rebuild_children();
        scene.validate()?;
        Ok(scene)
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn add_armature(&mut self, armature: ArmatureData) -> ArmatureId {
        self.armatures.push(armature);
        ArmatureId(self.armatures.len() - 1)
    }

    pub fn add_curve(&mut self, curve: CurveData) -> CurveId {
        self.curves.push(curve);
        CurveId(self.curves.len() - 1)
    }

    pub fn add_action(&mut self, action: Action) -> ActionId {
        self.actions.push(action);
        ActionId(self.actions.len() - 1)
    }

    pub fn add_collection(&mut self, name: impl Into<String>, hide_viewport: bool) -> usize {
        self.collections.push(Collection {
            name: name.into(),
            hide_viewport,
        });
        self.collections.len() - 1
    }

    /// Add a node, linking it under its parent.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = node.parent;
        self.nodes.push(node);
        if let Some(p) = parent {
            if let Some(parent) = self.nodes.get_mut(p.0) {
                parent.children.push(id);
            }
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.0]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn mesh(&self, id: MeshId) -> &MeshData {
        &self.meshes[id.0]
    }

    pub fn armature(&self, id: ArmatureId) -> &ArmatureData {
        &self.armatures[id.0]
    }

    pub fn curve(&self, id: CurveId) -> &CurveData {
        &self.curves[id.0]
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0]
    }

    /// Armature payload of a node, if it is an armature object.
    pub fn armature_of(&self, node: NodeId) -> Option<&ArmatureData> {
        match self.node(node).data {
            NodeData::Armature(a) => Some(self.armature(a)),
            _ => None,
        }
    }

    /// Number of objects bound to an action, plus one for a fake user.
    pub fn action_users(&self, action: ActionId) -> usize {
        let bound = self
            .nodes
            .iter()
            .filter(|n| n.animation.and_then(|a| a.action) == Some(action))
            .count();
        bound + usize::from(self.action(action).use_fake_user)
    }

    /// Detach a node from its parent, keeping its world transform.
    pub fn unparent_keep_transform(&mut self, id: NodeId, world: Mat4) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        self.nodes[id.0].matrix_local = world;
    }

    pub fn rebuild_children(&mut self) {
        for node in &mut self.nodes {
            node.children.clear();
        }
        for i in 0..self.nodes.len() {
            if let Some(p) = self.nodes[i].parent {
                if let Some(parent) = self.nodes.get_mut(p.0) {
                    parent.children.push(NodeId(i));
                }
            }
        }
    }

    /// Check payload references, mesh topology and that the parent links
    /// form a tree.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ExportError::InvalidScene(msg));
        for node in &self.nodes {
            let ok = match node.data {
                NodeData::Mesh(m) => m.0 < self.meshes.len(),
                NodeData::Armature(a) => a.0 < self.armatures.len(),
                NodeData::Curve(c) => c.0 < self.curves.len(),
                NodeData::Empty => true,
            };
            if !ok {
                return invalid(format!("node '{}' references missing data", node.name));
            }
            if node.parent.is_some_and(|p| p.0 >= self.nodes.len()) {
                return invalid(format!("node '{}' references a missing parent", node.name));
            }
            if let Some(action) = node.animation.and_then(|a| a.action) {
                if action.0 >= self.actions.len() {
                    return invalid(format!("node '{}' references a missing action", node.name));
                }
            }
            if node.collections.iter().any(|c| *c >= self.collections.len()) {
                return invalid(format!("node '{}' references a missing collection", node.name));
            }
            for (_, target) in node.armature_modifier_targets() {
                if target.0 >= self.nodes.len() {
                    return invalid(format!("node '{}' has a modifier on a missing object", node.name));
                }
            }
        }

        for start in 0..self.nodes.len() {
            let mut current = self.nodes[start].parent;
            let mut steps = 0;
            while let Some(p) = current {
                steps += 1;
                if steps > self.nodes.len() {
                    return invalid(format!("node '{}' is part of a parent cycle", self.nodes[start].name));
                }
                current = self.nodes[p.0].parent;
            }
        }

        for armature in &self.armatures {
            armature.validate().map_err(ExportError::InvalidScene)?;
        }
        for mesh in &self.meshes {
            mesh.validate().map_err(ExportError::InvalidScene)?;
        }
        Ok(())
    }
}
