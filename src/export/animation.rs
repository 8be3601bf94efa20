//! Animation sampling into baked matrix tracks.
//!
//! The frame loop is the outer loop: every frame is evaluated once and all
//! targets are captured from that state. Time values always start at zero
//! for the first sampled frame.

use super::document::{Document, Section};
use super::skeleton::Skeleton;
use super::ExportConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ExportError, Result};
use crate::scene::{ActionId, Evaluator, NodeData, NodeId, Scene, SceneState, StateGuard};
use crate::types::{format_list, format_matrix, inverted_safe, make_name, validate_id};
use glam::Mat4;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Sampled transforms of one node or joint.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Element id of the animated node.
    pub target: String,
    pub keys: Vec<(f32, Mat4)>,
}

/// Everything the sampler reads; built by the exporter once nodes are written.
pub struct AnimationSampler<'a> {
    pub scene: &'a Scene,
    /// Objects handed to the exporter, in scene order.
    pub objects: &'a [NodeId],
    pub valid: &'a HashSet<NodeId>,
    /// Exported armature objects and their skeletons, in export order.
    pub skeletons: &'a [(NodeId, Skeleton)],
}

impl<'a> AnimationSampler<'a> {
    fn skeleton_of(&self, node: NodeId) -> Option<&'a Skeleton> {
        self.skeletons.iter().find(|(n, _)| *n == node).map(|(_, s)| s)
    }

    /// Sample frames `start..=end` of every animated target.
    ///
    /// `allowed` restricts sampling to the given nodes. The frame is restored
    /// when sampling returns, including on cancellation.
    pub fn sample(
        &self,
        state: &mut SceneState,
        start: i32,
        end: i32,
        allowed: Option<&HashSet<NodeId>>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<Track>> {
        let fps = self.scene.fps;
        let mut guard = StateGuard::new(state);
        let mut tracks: Vec<Track> = Vec::new();
        let mut by_target: HashMap<String, usize> = HashMap::new();

        for frame in start..=end {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(ExportError::Cancelled);
            }
            guard.frame = frame;
            let time = frame as f32 / fps - start as f32 / fps;
            let eval = Evaluator::new(self.scene, &guard);

            for &id in self.objects {
                if !self.valid.contains(&id) || allowed.is_some_and(|a| !a.contains(&id)) {
                    continue;
                }
                let node = self.scene.node(id);

                // Skinned meshes are animated through their skeleton.
                let skinned = matches!(node.data, NodeData::Mesh(_))
                    && node
                        .parent
                        .is_some_and(|p| matches!(self.scene.node(p).data, NodeData::Armature(_)));
                if skinned {
                    continue;
                }

                if node.has_constraints || node.animation.is_some() {
                    let mut matrix = eval.world_matrix(id);
                    if let Some(parent) = node.parent {
                        matrix = inverted_safe(&eval.world_matrix(parent)) * matrix;
                    }
                    push_key(&mut tracks, &mut by_target, validate_id(&node.name), time, matrix);
                }

                if let Some(skeleton) = self.skeleton_of(id) {
                    self.sample_bones(&eval, id, skeleton, time, &mut tracks, &mut by_target);
                }
            }
        }
        Ok(tracks)
    }

    fn sample_bones(
        &self,
        eval: &Evaluator<'_>,
        node: NodeId,
        skeleton: &Skeleton,
        time: f32,
        tracks: &mut Vec<Track>,
        by_target: &mut HashMap<String, usize>,
    ) {
        let Some(armature) = self.scene.armature_of(node) else {
            return;
        };
        let poses = eval.pose_matrices(node);

        for (i, bone) in armature.bones.iter().enumerate() {
            let Some(joint) = skeleton.joint_of(i) else {
                continue;
            };
            let mut matrix = poses[i];

            if let Some(mut parent) = bone.parent {
                while skeleton.joint_of(parent).is_none() {
                    match armature.bones[parent].parent {
                        Some(p) => parent = p,
                        None => break,
                    }
                }
                // A parent scaled to zero on any axis has no usable inverse.
                if !eval.pose_basis(node, parent).has_zero_scale_axis() {
                    matrix = inverted_safe(&poses[parent]) * matrix;
                }
            }
            push_key(tracks, by_target, joint.id.clone(), time, matrix);
        }
    }
}

fn push_key(tracks: &mut Vec<Track>, by_target: &mut HashMap<String, usize>, target: String, time: f32, matrix: Mat4) {
    let index = *by_target.entry(target.clone()).or_insert_with(|| {
        tracks.push(Track {
            target,
            keys: Vec::new(),
        });
        tracks.len() - 1
    });
    tracks[index].keys.push((time, matrix));
}

/// Write one baked matrix channel and return its animation id.
pub fn write_transform_channel(doc: &mut Document, track: &Track) -> String {
    let id = doc.new_id("anim");
    let s = Section::Animations;
    let count = track.keys.len();

    let times = format_list(track.keys.iter().map(|(t, _)| t));
    let matrices = format_list(track.keys.iter().map(|(_, m)| format_matrix(m)));
    let interpolations = format_list(std::iter::repeat("LINEAR").take(count));

    doc.writel(s, 1, format!("<animation id=\"{}\">", id));

    let sources: [(&str, String, usize, &str); 3] = [
        (
            "input",
            format!("<float_array id=\"{}-input-array\" count=\"{}\">{}</float_array>", id, count, times),
            1,
            "<param name=\"TIME\" type=\"float\"/>",
        ),
        (
            "transform-output",
            format!(
                "<float_array id=\"{}-transform-output-array\" count=\"{}\">{}</float_array>",
                id,
                count * 16,
                matrices
            ),
            16,
            "<param name=\"TRANSFORM\" type=\"float4x4\"/>",
        ),
        (
            "interpolation-output",
            format!(
                "<Name_array id=\"{}-interpolation-output-array\" count=\"{}\">{}</Name_array>",
                id, count, interpolations
            ),
            1,
            "<param name=\"INTERPOLATION\" type=\"Name\"/>",
        ),
    ];

    for (suffix, array, stride, param) in sources {
        doc.writel(s, 2, format!("<source id=\"{}-{}\">", id, suffix));
        doc.writel(s, 3, array);
        doc.writel(s, 3, "<technique_common>");
        doc.writel(
            s,
            4,
            format!(
                "<accessor source=\"#{}-{}-array\" count=\"{}\" stride=\"{}\">",
                id, suffix, count, stride
            ),
        );
        doc.writel(s, 5, param);
        doc.writel(s, 4, "</accessor>");
        doc.writel(s, 3, "</technique_common>");
        doc.writel(s, 2, "</source>");
    }

    doc.writel(s, 2, format!("<sampler id=\"{}-sampler\">", id));
    doc.writel(s, 3, format!("<input semantic=\"INPUT\" source=\"#{}-input\"/>", id));
    doc.writel(s, 3, format!("<input semantic=\"OUTPUT\" source=\"#{}-transform-output\"/>", id));
    doc.writel(
        s,
        3,
        format!("<input semantic=\"INTERPOLATION\" source=\"#{}-interpolation-output\"/>", id),
    );
    doc.writel(s, 2, "</sampler>");
    doc.writel(
        s,
        2,
        format!("<channel source=\"#{}-sampler\" target=\"{}/transform\"/>", id, track.target),
    );
    doc.writel(s, 1, "</animation>");
    id
}

/// Sample and write all animation for an export run.
///
/// Authored poses of exported skeletons are cleared while sampling so only
/// actions drive the bones. Every state change is undone before returning.
pub fn export_animations(
    doc: &mut Document,
    sampler: &AnimationSampler<'_>,
    state: &mut SceneState,
    config: &ExportConfig,
    diagnostics: &mut Diagnostics,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let mut guard = StateGuard::new(state);
    for (node, _) in sampler.skeletons {
        guard.cleared_poses.insert(*node);
    }

    doc.writel(Section::Animations, 0, "<library_animations>");
    if config.use_anim_action_all && !sampler.skeletons.is_empty() {
        export_clips(doc, sampler, &mut guard, config, diagnostics, cancel)?;
    } else {
        let scene = sampler.scene;
        let (start, end) = config.frame_range.unwrap_or((scene.frame_start, scene.frame_end));
        let tracks = sampler.sample(&mut guard, start, end, None, cancel)?;
        for track in &tracks {
            write_transform_channel(doc, track);
        }
        info!(tracks = tracks.len(), start, end, "Sampled animation");
    }
    doc.writel(Section::Animations, 0, "</library_animations>");
    Ok(())
}

/// One `<animation_clip>` per exportable action.
fn export_clips(
    doc: &mut Document,
    sampler: &AnimationSampler<'_>,
    state: &mut SceneState,
    config: &ExportConfig,
    diagnostics: &mut Diagnostics,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let scene = sampler.scene;
    let constrained: HashSet<ActionId> = sampler
        .skeletons
        .iter()
        .filter_map(|(n, _)| scene.armature_of(*n))
        .flat_map(|a| a.constraint_actions())
        .collect();

    doc.writel(Section::AnimationClips, 0, "<library_animation_clips>");

    for (index, action) in scene.actions.iter().enumerate() {
        let action_id = ActionId(index);
        if scene.action_users(action_id) == 0 || constrained.contains(&action_id) {
            debug!(action = %action.name, "Skipping unused or constraint-driven action");
            continue;
        }
        if config.use_anim_skip_noexp && action.name.ends_with("-noexp") {
            debug!(action = %action.name, "Skipping -noexp action");
            continue;
        }

        let bones = action.bone_names();
        let mut allowed = HashSet::new();
        for (node, _) in sampler.skeletons {
            if scene.node(*node).animation.is_none() {
                continue;
            }
            let uses_action = scene
                .armature_of(*node)
                .is_some_and(|a| a.bones.iter().any(|b| bones.contains(&b.name.as_str())));
            if uses_action {
                allowed.insert(*node);
            }
            state.active_actions.insert(*node, Some(action_id));
        }

        let (first, last) = action.frame_range();
        let start = first as i32;
        let end = (last + 0.5) as i32;
        let tracks = sampler.sample(state, start, end, Some(&allowed), cancel)?;
        let ids: Vec<String> = tracks.iter().map(|t| write_transform_channel(doc, t)).collect();

        let duration = (last - first) / scene.fps;
        doc.writel(
            Section::AnimationClips,
            1,
            format!(
                "<animation_clip name=\"{}\" start=\"0\" end=\"{}\">",
                make_name(&action.name),
                duration
            ),
        );
        for id in &ids {
            doc.writel(Section::AnimationClips, 2, format!("<instance_animation url=\"#{}\"/>", id));
        }
        doc.writel(Section::AnimationClips, 1, "</animation_clip>");

        if ids.is_empty() {
            diagnostics.warn(
                WarningKind::EmptyAnimationClip,
                format!("Animation clip \"{}\" contains no tracks.", action.name),
            );
        }
    }

    doc.writel(Section::AnimationClips, 0, "</library_animation_clips>");
    Ok(())
}
