//! Collada document assembly for a whole scene.

use super::animation::{export_animations, AnimationSampler};
use super::curve::{extract_curve, write_curve};
use super::document::{Document, Section};
use super::geometry::{build_buffers, mesh_extra_tags, write_geometry, GeometryOptions, SkinInput};
use super::skeleton::{flatten_skeleton, FlattenContext, Skeleton};
use super::skin::{resolve_armature, write_controller, InfluenceOptions};
use super::walker::{compute_valid_nodes, prepare_scene, sorted_children, sorted_roots};
use super::{ExportConfig, ExportOutcome, YUpMode};
use crate::convert::{ConverterSettings, DivineInvoker, Game};
use crate::diagnostics::Diagnostics;
use crate::error::{ExportError, Result};
use crate::scene::{CurveId, Evaluator, MeshId, NodeData, NodeId, Scene, SceneState, StateGuard};
use crate::types::{format_matrix, make_name, validate_id, xml_escape};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Ids written for one source mesh.
#[derive(Debug, Clone)]
struct MeshExport {
    id: String,
    skin_id: Option<String>,
}

fn find_skeleton(skeletons: &[(NodeId, Skeleton)], node: NodeId) -> Option<&Skeleton> {
    skeletons.iter().find(|(n, _)| *n == node).map(|(_, s)| s)
}

/// Builds a Collada document from a prepared scene.
///
/// One exporter serves one run: its mesh cache and skeleton table are only
/// valid for the document it is writing.
pub struct DaeExporter<'a> {
    scene: &'a Scene,
    objects: &'a [NodeId],
    config: &'a ExportConfig,
    diagnostics: &'a mut Diagnostics,
    cancel: Option<&'a AtomicBool>,
    doc: Document,
    scene_id: String,
    valid: HashSet<NodeId>,
    mesh_cache: HashMap<MeshId, MeshExport>,
    skeletons: Vec<(NodeId, Skeleton)>,
    used_bones: HashSet<String>,
}

impl<'a> DaeExporter<'a> {
    pub fn new(
        scene: &'a Scene,
        objects: &'a [NodeId],
        config: &'a ExportConfig,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        let mut doc = Document::new();
        let scene_id = doc.new_id("scene");
        Self {
            scene,
            objects,
            config,
            diagnostics,
            cancel: None,
            doc,
            scene_id,
            valid: HashSet::new(),
            mesh_cache: HashMap::new(),
            skeletons: Vec::new(),
            used_bones: HashSet::new(),
        }
    }

    /// Abort the run once `flag` is set.
    pub fn with_cancel(mut self, flag: Option<&'a AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    /// Run the pipeline and return the finished document.
    ///
    /// `state` may be changed while exporting; it is back to its original
    /// value when this returns, whatever the result.
    pub fn export(mut self, state: &mut SceneState) -> Result<Document> {
        self.doc.writel(Section::Geometries, 0, "<library_geometries>");
        self.doc.writel(Section::Controllers, 0, "<library_controllers>");

        self.export_asset();
        self.export_visual_scene(state)?;

        self.doc.writel(Section::Geometries, 0, "</library_geometries>");

        // Morphs always go before skin controllers.
        self.doc.fold_into(Section::Morphs, Section::Controllers);
        self.doc.fold_into(Section::Skins, Section::Controllers);
        self.doc.writel(Section::Controllers, 0, "</library_controllers>");

        if self.config.use_anim {
            self.check_cancel()?;
            let sampler = AnimationSampler {
                scene: self.scene,
                objects: self.objects,
                valid: &self.valid,
                skeletons: &self.skeletons,
            };
            export_animations(&mut self.doc, &sampler, state, self.config, self.diagnostics, self.cancel)?;
        }

        self.doc.purge_empty();

        if !self.config.extra_data_disabled {
            let s = Section::Extras;
            self.doc.writel(s, 0, "<extra>");
            self.doc.writel(s, 1, "<technique profile=\"LSTools\">");
            if self.scene.metadata_version != 0 {
                self.doc.writel(
                    s,
                    2,
                    format!("<MetadataVersion>{}</MetadataVersion>", self.scene.metadata_version),
                );
            }
            self.doc.writel(s, 1, "</technique>");
            self.doc.writel(s, 0, "</extra>");
        }

        self.doc.writel(Section::Scene, 0, "<scene>");
        self.doc.writel(
            Section::Scene,
            1,
            format!("<instance_visual_scene url=\"#{}\"/>", self.scene_id),
        );
        self.doc.writel(Section::Scene, 0, "</scene>");

        info!(
            nodes = self.valid.len(),
            meshes = self.mesh_cache.len(),
            skeletons = self.skeletons.len(),
            "Assembled Collada document"
        );
        Ok(self.doc)
    }

    fn export_asset(&mut self) {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let s = Section::Asset;
        self.doc.writel(s, 0, "<asset>");
        self.doc.writel(s, 1, "<contributor>");
        self.doc.writel(s, 2, "<author></author>");
        self.doc.writel(
            s,
            2,
            format!("<authoring_tool>ls-collada {}</authoring_tool>", env!("CARGO_PKG_VERSION")),
        );
        self.doc.writel(s, 1, "</contributor>");
        self.doc.writel(s, 1, format!("<created>{}</created>", now));
        self.doc.writel(s, 1, format!("<modified>{}</modified>", now));
        self.doc.writel(s, 1, "<unit meter=\"1.0\" name=\"meter\"/>");
        let up = match self.config.yup_mode {
            YUpMode::Disabled => "Z_UP",
            YUpMode::Rotate | YUpMode::FlagOnly => "Y_UP",
        };
        self.doc.writel(s, 1, format!("<up_axis>{}</up_axis>", up));
        self.doc.writel(s, 0, "</asset>");
    }

    fn export_visual_scene(&mut self, state: &mut SceneState) -> Result<()> {
        self.valid = compute_valid_nodes(self.scene, self.objects, self.config);

        self.doc.writel(Section::Nodes, 0, "<library_visual_scenes>");
        self.doc.writel(
            Section::Nodes,
            1,
            format!("<visual_scene id=\"{}\" name=\"scene\">", self.scene_id),
        );
        for root in sorted_roots(self.scene, &self.valid) {
            self.export_node(root, 2, state)?;
        }
        self.doc.writel(Section::Nodes, 1, "</visual_scene>");
        self.doc.writel(Section::Nodes, 0, "</library_visual_scenes>");
        Ok(())
    }

    fn export_node(&mut self, id: NodeId, il: usize, state: &mut SceneState) -> Result<()> {
        if !self.valid.contains(&id) {
            return Ok(());
        }
        self.check_cancel()?;

        let scene = self.scene;
        let node = scene.node(id);
        debug!(node = %node.name, "Exporting node");
        self.doc.writel(
            Section::Nodes,
            il,
            format!(
                "<node id=\"{}\" name=\"{}\" type=\"NODE\">",
                xml_escape(&validate_id(&node.name)),
                xml_escape(&make_name(&node.name))
            ),
        );

        let local = Evaluator::new(scene, state).local_matrix(id);
        self.doc.writel(
            Section::Nodes,
            il + 1,
            format!("<matrix sid=\"transform\">{}</matrix>", format_matrix(&local)),
        );

        match node.data {
            NodeData::Mesh(mesh) => self.export_mesh_node(id, mesh, il + 1, state)?,
            NodeData::Armature(_) => self.export_armature_node(id, il + 1, state),
            NodeData::Curve(curve) => self.export_curve_node(curve, il + 1),
            NodeData::Empty => {}
        }

        for child in sorted_children(scene, id) {
            self.export_node(child, il + 1, state)?;
        }

        self.doc.writel(Section::Nodes, il, "</node>");
        Ok(())
    }

    fn export_mesh_node(&mut self, id: NodeId, mesh: MeshId, il: usize, state: &mut SceneState) -> Result<()> {
        let armature = resolve_armature(self.scene, id, self.diagnostics);
        let export = self.export_mesh(id, mesh, armature, state)?;

        match (&export.skin_id, armature.and_then(|a| find_skeleton(&self.skeletons, a))) {
            (Some(skin_id), Some(skeleton)) => {
                self.doc
                    .writel(Section::Nodes, il, format!("<instance_controller url=\"#{}\">", skin_id));
                for root in skeleton.skeleton_nodes() {
                    self.doc
                        .writel(Section::Nodes, il + 1, format!("<skeleton>#{}</skeleton>", root));
                }
                self.doc.writel(Section::Nodes, il, "</instance_controller>");
            }
            _ => {
                self.doc
                    .writel(Section::Nodes, il, format!("<instance_geometry url=\"#{}\">", export.id));
                self.doc.writel(Section::Nodes, il, "</instance_geometry>");
            }
        }
        Ok(())
    }

    /// Write the geometry (and skin) of a mesh once per source mesh.
    fn export_mesh(
        &mut self,
        id: NodeId,
        mesh_id: MeshId,
        armature: Option<NodeId>,
        state: &mut SceneState,
    ) -> Result<MeshExport> {
        if let Some(cached) = self.mesh_cache.get(&mesh_id) {
            return Ok(cached.clone());
        }

        let scene = self.scene;
        let config = self.config;
        let node = scene.node(id);

        let mesh = {
            let mut guard = StateGuard::new(state);
            let excluded = config
                .use_exclude_armature_modifier
                .then(|| node.armature_modifier_targets().next())
                .flatten();
            if let Some((index, _)) = excluded {
                guard.modifier_visible.insert((id, index), false);
                guard.set_all_rest();
            } else if config.use_rest_pose {
                guard.set_all_rest();
            }
            Evaluator::new(scene, &guard).evaluate_mesh(id)?
        };

        let skeleton = armature.and_then(|a| find_skeleton(&self.skeletons, a));
        let options = GeometryOptions {
            triangulate: config.use_triangles,
            tangents: config.use_tangent,
            normals: config.use_normals,
        };
        let skin = skeleton.map(|skeleton| SkinInput {
            group_names: &node.vertex_groups,
            skeleton,
            options: InfluenceOptions {
                limit: config.use_limit_weights,
                normalize: config.use_normalize_weights,
            },
        });
        let buffers = build_buffers(mesh, options, skin.as_ref(), &node.name, self.diagnostics);

        let source = scene.mesh(mesh_id);
        let geometry_id = self.doc.new_id("mesh");
        let tags = (!config.extra_data_disabled).then(|| mesh_extra_tags(&source.ls_properties, config.extra_flag));
        write_geometry(&mut self.doc, &geometry_id, &make_name(&source.name), &buffers, tags.as_deref());

        let eval = Evaluator::new(scene, state);
        let bind_shape = if node.parent.is_some() && node.parent == armature {
            eval.local_matrix(id)
        } else {
            eval.world_matrix(id)
        };
        let skin_id = skeleton
            .map(|skeleton| write_controller(&mut self.doc, &geometry_id, &bind_shape, skeleton, &buffers.vertices));

        let export = MeshExport {
            id: geometry_id,
            skin_id,
        };
        self.mesh_cache.insert(mesh_id, export.clone());
        Ok(export)
    }

    fn export_armature_node(&mut self, id: NodeId, il: usize, state: &SceneState) {
        let Some(armature) = self.scene.armature_of(id) else {
            return;
        };
        let world = Evaluator::new(self.scene, state).world_matrix(id);
        let mut ctx = FlattenContext {
            exclude_ctrl_bones: self.config.use_exclude_ctrl_bones,
            detect_collisions: self.config.use_anim_action_all,
            used_bones: &mut self.used_bones,
            diagnostics: &mut *self.diagnostics,
        };
        let skeleton = flatten_skeleton(&mut self.doc, &self.scene.node(id).name, armature, world, &mut ctx);
        skeleton.write_nodes(&mut self.doc, il);
        debug!(armature = %skeleton.name, joints = skeleton.len(), "Exported skeleton");
        self.skeletons.push((id, skeleton));
    }

    fn export_curve_node(&mut self, curve: CurveId, il: usize) {
        let data = self.scene.curve(curve);
        let id = self.doc.new_id("spline");
        write_curve(&mut self.doc, &id, &make_name(&data.name), &extract_curve(data));
        self.doc
            .writel(Section::Nodes, il, format!("<instance_geometry url=\"#{}\">", id));
        self.doc.writel(Section::Nodes, il, "</instance_geometry>");
    }
}

fn run_export(
    scene: &Scene,
    state: &mut SceneState,
    config: &ExportConfig,
    path: &Path,
    cancel: Option<&AtomicBool>,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let prepared = prepare_scene(scene, state, config, diagnostics);
    let doc = DaeExporter::new(&prepared.scene, &prepared.objects, config, diagnostics)
        .with_cancel(cancel)
        .export(state)?;
    doc.write_to(path)?;
    info!(path = %path.display(), "Exported Collada file");
    Ok(())
}

fn outcome_of(result: Result<()>) -> ExportOutcome {
    match result {
        Ok(()) => ExportOutcome::Finished,
        Err(ExportError::Cancelled) => {
            info!("Export cancelled");
            ExportOutcome::Cancelled
        }
        Err(e) => {
            error!("Export failed: {}", e);
            ExportOutcome::Error(e.to_string())
        }
    }
}

/// Export `scene` to a Collada file at `path`.
///
/// Nothing is written when the export fails or is cancelled. Warnings raised
/// along the way are added to `diagnostics`.
pub fn export_scene(
    scene: &Scene,
    state: &mut SceneState,
    config: &ExportConfig,
    path: &Path,
    cancel: Option<&AtomicBool>,
    diagnostics: &mut Diagnostics,
) -> ExportOutcome {
    outcome_of(run_export(scene, state, config, path, cancel, diagnostics))
}

/// Export to Collada, then convert the file to GR2 next to it.
///
/// A failed conversion is reported as an error but keeps the Collada file.
pub fn export_gr2(
    scene: &Scene,
    state: &mut SceneState,
    config: &ExportConfig,
    converter: &ConverterSettings,
    path: &Path,
    cancel: Option<&AtomicBool>,
    diagnostics: &mut Diagnostics,
) -> ExportOutcome {
    let outcome = export_scene(scene, state, config, path, cancel, diagnostics);
    if !outcome.is_finished() {
        return outcome;
    }

    let game = match scene.game {
        Game::Unset => converter.game,
        game => game,
    };
    outcome_of(DivineInvoker::new(converter).dae_to_gr2(path, game).map(|gr2| {
        info!(path = %gr2.display(), "Converted to GR2");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;
    use crate::export::ExtraFlag;
    use crate::scene::{fixtures, CurveData, CurvePoint, ObjectType, SceneNode, Spline, SplinePoints};

    fn export_to_string(scene: &Scene, config: &ExportConfig) -> (String, Diagnostics) {
        let mut state = SceneState::new(scene);
        let mut diag = Diagnostics::new();
        let prepared = prepare_scene(scene, &state, config, &mut diag);
        let doc = DaeExporter::new(&prepared.scene, &prepared.objects, config, &mut diag)
            .export(&mut state)
            .unwrap();
        (doc.render(), diag)
    }

    #[test]
    fn test_single_cube_flat() {
        let (scene, _) = fixtures::cube_scene(false);
        let (text, _) = export_to_string(&scene, &ExportConfig::default().with_tangents(false));

        assert_eq!(text.matches("<geometry ").count(), 1);
        assert_eq!(text.matches("<triangles ").count(), 1);
        assert!(text.contains("<triangles count=\"12\">"));
        assert!(text.contains("id-mesh-2-positions-array\" count=\"72\""));
        assert!(text.contains("<instance_geometry url=\"#id-mesh-2\">"));
        assert!(text.contains("<up_axis>Z_UP</up_axis>"));
        assert!(!text.contains("<library_controllers>"));
    }

    #[test]
    fn test_single_cube_smooth_shares_corners() {
        let (scene, _) = fixtures::cube_scene(true);
        let (text, _) = export_to_string(&scene, &ExportConfig::default());
        assert!(text.contains("id-mesh-2-positions-array\" count=\"24\""));
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let fx = fixtures::two_bone_rig(false);
        let (text, _) = export_to_string(&fx.scene, &ExportConfig::default().with_animation(false));

        let order = [
            "\n<asset>",
            "\n<library_geometries>",
            "\n<library_controllers>",
            "\n<library_visual_scenes>",
            "\n<library_animations>",
            "\n<scene>",
            "\n<extra>",
        ];
        let positions: Vec<usize> = order.iter().map(|tag| text.find(tag).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<COLLADA"));
        assert!(text.ends_with("</COLLADA>\n"));
    }

    #[test]
    fn test_skinned_mesh_uses_controller() {
        let fx = fixtures::two_bone_rig(false);
        let (text, _) = export_to_string(&fx.scene, &ExportConfig::default());

        assert!(text.contains("<instance_controller url=\"#id-controller-"));
        assert!(text.contains("<skeleton>#id-bone-"));
        assert_eq!(text.matches("type=\"JOINT\"").count(), 2);
        assert!(!text.contains("<instance_geometry"));
    }

    #[test]
    fn test_control_bone_excluded_from_joints() {
        let fx = fixtures::two_bone_rig(true);
        let config = ExportConfig::default().with_exclude_ctrl_bones(true);
        let (text, _) = export_to_string(&fx.scene, &config);

        assert_eq!(text.matches("type=\"JOINT\"").count(), 1);
        assert!(text.contains("<Name_array id=\"id-controller-"));
        assert!(text.contains("-joints-array\" count=\"1\">"));
    }

    #[test]
    fn test_shared_mesh_written_once() {
        let mut scene = Scene::new("Shared");
        let mesh = scene.add_mesh(fixtures::quad_mesh("Quad"));
        scene.add_node(SceneNode::new("A", NodeData::Mesh(mesh)));
        scene.add_node(SceneNode::new("B", NodeData::Mesh(mesh)));
        let (text, _) = export_to_string(&scene, &ExportConfig::default());

        assert_eq!(text.matches("<geometry ").count(), 1);
        assert_eq!(text.matches("<instance_geometry url=\"#id-mesh-2\">").count(), 2);
    }

    #[test]
    fn test_curve_and_empty_nodes() {
        let mut scene = Scene::new("Curves");
        let curve = scene.add_curve(CurveData {
            name: "Path".to_string(),
            splines: vec![Spline {
                points: SplinePoints::Poly(vec![CurvePoint {
                    co: [0.0, 0.0, 0.0],
                    tilt: 0.0,
                }]),
                cyclic: false,
            }],
        });
        let group = scene.add_node(SceneNode::new("Group", NodeData::Empty));
        scene.add_node(SceneNode::new("Path", NodeData::Curve(curve)).with_parent(group));

        let config = ExportConfig::default().with_object_types(&[ObjectType::Curve]);
        let (text, _) = export_to_string(&scene, &config);
        assert!(text.contains("<node id=\"Group\" name=\"Group\" type=\"NODE\">"));
        assert!(text.contains("<spline closed=\"false\">"));
        assert!(text.contains("<instance_geometry url=\"#id-spline-"));
    }

    #[test]
    fn test_yup_rotate_declares_axis() {
        let (scene, _) = fixtures::cube_scene(false);
        let (text, _) = export_to_string(&scene, &ExportConfig::default().with_yup(YUpMode::Rotate));
        assert!(text.contains("<up_axis>Y_UP</up_axis>"));
        // -90 degrees about X maps Z onto Y.
        let matrix = text.lines().find(|l| l.contains("<matrix sid=")).unwrap();
        assert!(matrix.contains(" -1 "), "{}", matrix);
    }

    #[test]
    fn test_extras_carry_metadata() {
        let (mut scene, _) = fixtures::cube_scene(false);
        scene.metadata_version = 2;
        scene.meshes[0].ls_properties.lod = 2;
        let config = ExportConfig::default().with_extra_flag(ExtraFlag::Rigid);
        let (text, _) = export_to_string(&scene, &config);

        assert!(text.contains("<MetadataVersion>2</MetadataVersion>"));
        assert!(text.contains("<DivModelType>Rigid</DivModelType>"));
        assert!(text.contains("<LOD>2</LOD>"));

        let config = ExportConfig {
            extra_data_disabled: true,
            ..config
        };
        let (text, _) = export_to_string(&scene, &config);
        assert!(!text.contains("LSTools"));
    }

    #[test]
    fn test_mesh_captured_in_bind_pose() {
        let fx = fixtures::two_bone_rig(false);
        let mut state = SceneState::new(&fx.scene);
        state.frame = 10;
        let before = state.clone();
        let mut diag = Diagnostics::new();
        let config = ExportConfig::default().with_tangents(false);
        let prepared = prepare_scene(&fx.scene, &state, &config, &mut diag);
        let text = DaeExporter::new(&prepared.scene, &prepared.objects, &config, &mut diag)
            .export(&mut state)
            .unwrap()
            .render();

        // The root bone is lifted at frame 10, but positions stay at rest height.
        let line = text.lines().find(|l| l.contains("-positions-array")).unwrap();
        let values = &line[line.find('>').unwrap() + 1..line.rfind("</").unwrap()];
        let coords: Vec<f32> = values.split(' ').map(|v| v.parse().unwrap()).collect();
        assert_eq!(coords.len(), 12);
        assert!(coords.chunks(3).all(|c| c[2] == 0.0));
        assert_eq!(state, before);
    }

    #[test]
    fn test_empty_animation_libraries_pruned() {
        let (scene, _) = fixtures::cube_scene(false);
        let (text, _) = export_to_string(&scene, &ExportConfig::default().with_animation(false));
        assert!(!text.contains("library_animations"));
        assert!(!text.contains("library_animation_clips"));
        assert!(roxmltree::Document::parse(&text).is_ok());

        // Per-action mode with a skeleton but no action in use.
        let mut fx = fixtures::two_bone_rig(false);
        for node in &mut fx.scene.nodes {
            node.animation = None;
        }
        let (text, diag) = export_to_string(&fx.scene, &ExportConfig::default().with_animation(true));
        assert!(!text.contains("library_animations"));
        assert!(!text.contains("library_animation_clips"));
        assert!(!diag.has(WarningKind::EmptyAnimationClip));
    }

    #[test]
    fn test_export_scene_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.dae");
        let (scene, _) = fixtures::cube_scene(false);
        let mut state = SceneState::new(&scene);
        let mut diag = Diagnostics::new();

        let outcome = export_scene(&scene, &mut state, &ExportConfig::default(), &path, None, &mut diag);
        assert_eq!(outcome, ExportOutcome::Finished);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(roxmltree::Document::parse(&text).is_ok());
    }

    #[test]
    fn test_cancelled_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.dae");
        let fx = fixtures::two_bone_rig(false);
        let mut state = SceneState::new(&fx.scene);
        let before = state.clone();
        let cancel = AtomicBool::new(true);

        let outcome = export_scene(
            &fx.scene,
            &mut state,
            &ExportConfig::default().with_animation(true),
            &path,
            Some(&cancel),
            &mut Diagnostics::new(),
        );
        assert_eq!(outcome, ExportOutcome::Cancelled);
        assert!(!path.exists());
        assert_eq!(state, before);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cube.dae");
        let (scene, _) = fixtures::cube_scene(false);
        let mut state = SceneState::new(&scene);

        let outcome = export_scene(&scene, &mut state, &ExportConfig::default(), &path, None, &mut Diagnostics::new());
        assert!(matches!(outcome, ExportOutcome::Error(_)));
    }

    #[test]
    fn test_gr2_with_missing_converter_keeps_collada() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.dae");
        let (scene, _) = fixtures::cube_scene(false);
        let mut state = SceneState::new(&scene);
        let converter = ConverterSettings::default().with_divine_path(dir.path().join("divine.exe"));

        let outcome = export_gr2(
            &scene,
            &mut state,
            &ExportConfig::default(),
            &converter,
            &path,
            None,
            &mut Diagnostics::new(),
        );
        assert!(matches!(outcome, ExportOutcome::Error(ref m) if m.contains("not found")));
        assert!(path.is_file());
    }

    #[test]
    fn test_hierarchy_warning_surfaces() {
        let mut scene = Scene::new("Loose");
        let mesh = scene.add_mesh(fixtures::quad_mesh("Quad"));
        let other = scene.add_node(SceneNode::new("Other", NodeData::Empty));
        let mut node = SceneNode::new("Quad", NodeData::Mesh(mesh));
        node.modifiers.push(crate::scene::Modifier::Armature {
            object: Some(other),
            show_viewport: true,
        });
        scene.add_node(node);

        let (text, diag) = export_to_string(&scene, &ExportConfig::default());
        assert!(diag.has(WarningKind::ModifierWithoutArmatureParent));
        assert!(text.contains("<instance_geometry"));
    }
}
