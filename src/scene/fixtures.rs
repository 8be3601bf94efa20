//! Small scenes shared by the unit tests.

use super::*;
use glam::{Mat4, Vec3};

pub fn quad_mesh(name: &str) -> MeshData {
    let mut mesh = MeshData::new(name);
    for co in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
        mesh.vertices.push(MeshVertex { co, groups: Vec::new() });
    }
    mesh.add_polygon(&[0, 1, 2, 3], 0, false);
    mesh.uv_layers.push(UvLayer {
        name: "UVMap".to_string(),
        data: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
    });
    mesh
}

/// A 2x2x2 cube centered on the origin, without UVs.
pub fn cube_mesh(name: &str, smooth: bool) -> MeshData {
    let mut mesh = MeshData::new(name);
    for i in 0..8 {
        let c = |bit: usize| if i & bit != 0 { 1.0 } else { -1.0 };
        mesh.vertices.push(MeshVertex {
            co: [c(1), c(2), c(4)],
            groups: Vec::new(),
        });
    }
    for face in [
        [0, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 4, 6, 2],
        [1, 3, 7, 5],
    ] {
        mesh.add_polygon(&face, 0, smooth);
    }
    mesh
}

/// A scene holding one unparented cube object.
pub fn cube_scene(smooth: bool) -> (Scene, NodeId) {
    let mut scene = Scene::new("Cube");
    let mesh = scene.add_mesh(cube_mesh("Cube", smooth));
    let node = scene.add_node(SceneNode::new("Cube", NodeData::Mesh(mesh)));
    (scene, node)
}

pub struct Rig {
    pub scene: Scene,
    pub armature: NodeId,
    pub mesh: NodeId,
    pub action: ActionId,
}

/// Armature with a root bone and one child, a skinned quad under it, and an
/// action lifting the root bone by 2 units over frames 0..=10.
///
/// With `ctrl_child` the child bone is named as a control bone.
pub fn two_bone_rig(ctrl_child: bool) -> Rig {
    let mut scene = Scene::new("Rig");
    scene.frame_start = 0;
    scene.frame_end = 10;

    let child_name = if ctrl_child { "ctrl_Arm" } else { "Arm" };
    let mut armature = ArmatureData::new("RigData");
    let root = armature.add_bone("Root", None, Mat4::IDENTITY);
    armature.add_bone(child_name, Some(root), Mat4::from_translation(Vec3::Z));
    let arm_data = scene.add_armature(armature);

    let action = scene.add_action(
        Action::new("Lift").with_fcurve(FCurve::new(
            "pose.bones[\"Root\"].location",
            2,
            &[(0.0, 0.0), (10.0, 2.0)],
        )),
    );

    let armature = scene.add_node(
        SceneNode::new("Armature", NodeData::Armature(arm_data))
            .with_matrix(Mat4::from_translation(Vec3::X))
            .with_action(Some(action)),
    );

    let mut mesh = quad_mesh("Body");
    let weights = [(0, 1.0), (0, 1.0), (1, 1.0), (1, 1.0)];
    for (v, (group, weight)) in mesh.vertices.iter_mut().zip(weights) {
        v.groups.push(GroupWeight { group, weight });
    }
    let mesh_id = scene.add_mesh(mesh);

    let mut body = SceneNode::new("Body", NodeData::Mesh(mesh_id)).with_parent(armature);
    body.vertex_groups = vec!["Root".to_string(), child_name.to_string()];
    body.modifiers.push(Modifier::Armature {
        object: Some(armature),
        show_viewport: true,
    });
    let mesh = scene.add_node(body);

    Rig {
        scene,
        armature,
        mesh,
        action,
    }
}
