//! Keyframed actions and F-curve evaluation.

use crate::types::{euler_to_quat, quat_to_euler, Trs};
use glam::Quat;
use serde::{Deserialize, Serialize};

/// Index of an action in [`Scene::actions`](super::Scene::actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub usize);

const BONE_PATH_PREFIX: &str = "pose.bones[\"";

/// A single keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: f32,
    pub value: f32,
}

/// An animation curve driving one component of one property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FCurve {
    /// Property path, e.g. `location` or `pose.bones["Arm"].rotation_quaternion`.
    pub data_path: String,
    /// Component index within the property.
    #[serde(default)]
    pub index: usize,
    pub keyframes: Vec<Keyframe>,
}

impl FCurve {
    pub fn new(data_path: impl Into<String>, index: usize, keyframes: &[(f32, f32)]) -> Self {
        Self {
            data_path: data_path.into(),
            index,
            keyframes: keyframes
                .iter()
                .map(|&(frame, value)| Keyframe { frame, value })
                .collect(),
        }
    }

    /// Evaluate with linear interpolation and constant extrapolation.
    pub fn evaluate(&self, frame: f32) -> f32 {
        let keys = &self.keyframes;
        match keys.len() {
            0 => 0.0,
            1 => keys[0].value,
            _ => {
                if frame <= keys[0].frame {
                    return keys[0].value;
                }
                let last = keys[keys.len() - 1];
                if frame >= last.frame {
                    return last.value;
                }
                let i = keys.partition_point(|k| k.frame <= frame);
                let (a, b) = (keys[i - 1], keys[i]);
                let span = b.frame - a.frame;
                if span <= 0.0 {
                    return b.value;
                }
                a.value + (b.value - a.value) * ((frame - a.frame) / span)
            }
        }
    }

    /// Name of the bone this curve targets, if it is a pose bone curve.
    pub fn bone_name(&self) -> Option<&str> {
        let rest = self.data_path.strip_prefix(BONE_PATH_PREFIX)?;
        let end = rest.find('"')?;
        Some(&rest[..end])
    }

    /// The property this curve animates, without the bone prefix.
    fn property(&self) -> &str {
        match self.data_path.strip_prefix(BONE_PATH_PREFIX) {
            Some(rest) => rest
                .find("\"].")
                .map(|end| &rest[end + 3..])
                .unwrap_or(""),
            None => &self.data_path,
        }
    }
}

/// A named set of F-curves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    /// Keeps the action alive even when nothing is bound to it.
    #[serde(default)]
    pub use_fake_user: bool,
    #[serde(default)]
    pub fcurves: Vec<FCurve>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_fcurve(mut self, fcurve: FCurve) -> Self {
        self.fcurves.push(fcurve);
        self
    }

    /// First and last keyed frame across all curves.
    pub fn frame_range(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for k in self.fcurves.iter().flat_map(|c| &c.keyframes) {
            min = min.min(k.frame);
            max = max.max(k.frame);
        }
        if min > max {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }

    /// Bone names referenced by pose bone curves, in first-seen order.
    pub fn bone_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.fcurves.iter().filter_map(FCurve::bone_name) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Apply object-level channels at `frame`.
    pub fn apply_object_channels(&self, frame: f32, trs: &mut Trs) {
        let curves = self.fcurves.iter().filter(|c| c.bone_name().is_none());
        apply_channels(curves, frame, trs);
    }

    /// Apply channels of the named pose bone at `frame`.
    pub fn apply_bone_channels(&self, bone: &str, frame: f32, trs: &mut Trs) {
        let curves = self
            .fcurves
            .iter()
            .filter(|c| c.bone_name() == Some(bone));
        apply_channels(curves, frame, trs);
    }

    pub fn animates_object(&self) -> bool {
        self.fcurves.iter().any(|c| c.bone_name().is_none())
    }
}

fn apply_channels<'a>(curves: impl Iterator<Item = &'a FCurve>, frame: f32, trs: &mut Trs) {
    let mut quat = [trs.rotation.w, trs.rotation.x, trs.rotation.y, trs.rotation.z];
    let mut euler = quat_to_euler(trs.rotation);
    let mut quat_keyed = false;
    let mut euler_keyed = false;

    for curve in curves {
        let value = curve.evaluate(frame);
        match (curve.property(), curve.index) {
            ("location", i @ 0..=2) => trs.location[i] = value,
            ("scale", i @ 0..=2) => trs.scale[i] = value,
            ("rotation_quaternion", i @ 0..=3) => {
                quat[i] = value;
                quat_keyed = true;
            }
            ("rotation_euler", i @ 0..=2) => {
                euler[i] = value;
                euler_keyed = true;
            }
            _ => {}
        }
    }

    if euler_keyed {
        trs.rotation = euler_to_quat(euler);
    } else if quat_keyed {
        let q = Quat::from_xyzw(quat[1], quat[2], quat[3], quat[0]);
        trs.rotation = if q.length_squared() > 0.0 {
            q.normalize()
        } else {
            Quat::IDENTITY
        };
    }
}
