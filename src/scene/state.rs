//! Mutable host state and scoped restoration.

use super::{ActionId, ArmatureId, NodeId, PosePosition, Scene};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

/// Process-wide state the exporter temporarily changes while it works.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub frame: i32,
    /// Active action of every object that has animation data.
    pub active_actions: HashMap<NodeId, Option<ActionId>>,
    pub pose_positions: HashMap<ArmatureId, PosePosition>,
    /// Viewport visibility of each `(object, modifier index)`.
    pub modifier_visible: HashMap<(NodeId, usize), bool>,
    /// Armature objects whose authored pose is temporarily cleared to rest.
    pub cleared_poses: HashSet<NodeId>,
}

impl SceneState {
    /// Snapshot the state described by the scene itself.
    pub fn new(scene: &Scene) -> Self {
        let mut active_actions = HashMap::new();
        let mut modifier_visible = HashMap::new();
        for id in scene.node_ids() {
            let node = scene.node(id);
            if let Some(anim) = node.animation {
                active_actions.insert(id, anim.action);
            }
            for (i, m) in node.modifiers.iter().enumerate() {
                if let super::Modifier::Armature { show_viewport, .. } = m {
                    modifier_visible.insert((id, i), *show_viewport);
                }
            }
        }

        let pose_positions = scene
            .armatures
            .iter()
            .enumerate()
            .map(|(i, a)| (ArmatureId(i), a.pose_position))
            .collect();

        Self {
            frame: scene.frame_current,
            active_actions,
            pose_positions,
            modifier_visible,
            cleared_poses: HashSet::new(),
        }
    }

    pub fn active_action(&self, node: NodeId) -> Option<ActionId> {
        self.active_actions.get(&node).copied().flatten()
    }

    pub fn pose_position(&self, armature: ArmatureId) -> PosePosition {
        self.pose_positions.get(&armature).copied().unwrap_or_default()
    }

    pub fn is_modifier_visible(&self, node: NodeId, modifier: usize) -> bool {
        self.modifier_visible.get(&(node, modifier)).copied().unwrap_or(true)
    }

    /// Put every armature in the scene into its rest position.
    pub fn set_all_rest(&mut self) {
        for pos in self.pose_positions.values_mut() {
            *pos = PosePosition::Rest;
        }
    }
}

/// Exclusive access to [`SceneState`] that restores the original values when dropped.
///
/// Every exit path (early return, `?`, cancellation, panic unwinding) runs the
/// restore, so callers can change frames, actions, pose positions and modifier
/// visibility freely inside the guard's scope.
pub struct StateGuard<'s> {
    state: &'s mut SceneState,
    saved: Option<SceneState>,
}

impl<'s> StateGuard<'s> {
    pub fn new(state: &'s mut SceneState) -> Self {
        let saved = Some(state.clone());
        Self { state, saved }
    }
}

impl Deref for StateGuard<'_> {
    type Target = SceneState;

    fn deref(&self) -> &SceneState {
        self.state
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut SceneState {
        self.state
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.state = saved;
        }
    }
}
