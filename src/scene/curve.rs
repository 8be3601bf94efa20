//! Curve payloads.

use serde::{Deserialize, Serialize};

/// Index of a curve in [`Scene::curves`](super::Scene::curves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurveId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierPoint {
    pub co: [f32; 3],
    pub handle_left: [f32; 3],
    pub handle_right: [f32; 3],
    #[serde(default)]
    pub tilt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub co: [f32; 3],
    #[serde(default)]
    pub tilt: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplinePoints {
    Bezier(Vec<BezierPoint>),
    Poly(Vec<CurvePoint>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spline {
    pub points: SplinePoints,
    #[serde(default)]
    pub cyclic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub name: String,
    pub splines: Vec<Spline>,
}
