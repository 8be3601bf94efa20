//! Polygonal mesh payloads.
//!
//! Meshes follow the usual host layout: vertices hold positions and
//! vertex-group weights, polygons reference a contiguous run of loops, and
//! per-corner attributes (UVs, colors) are stored per loop.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a mesh in [`Scene::meshes`](super::Scene::meshes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshId(pub usize);

/// Determinants of the UV basis below this mark a degenerate mapping.
const UV_DEGENERATE_EPSILON: f32 = 1e-12;

/// Weight of a vertex in one vertex group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupWeight {
    /// Index into the owning object's vertex group names.
    pub group: usize,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    pub co: [f32; 3],
    #[serde(default)]
    pub groups: Vec<GroupWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub loop_start: usize,
    pub loop_total: usize,
    #[serde(default)]
    pub material_index: usize,
    #[serde(default)]
    pub smooth: bool,
}

impl Polygon {
    pub fn loops(&self) -> std::ops::Range<usize> {
        self.loop_start..self.loop_start + self.loop_total
    }
}

/// Per-loop texture coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    pub data: Vec<[f32; 2]>,
}

/// Per-loop RGBA colors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorLayer {
    pub name: String,
    pub data: Vec<[f32; 4]>,
}

/// LSTools per-mesh export properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsMeshProperties {
    pub rigid: bool,
    pub cloth: bool,
    pub mesh_proxy: bool,
    pub proxy: bool,
    pub spring: bool,
    pub occluder: bool,
    pub cloth_physics: bool,
    pub cloth_flag1: bool,
    pub cloth_flag2: bool,
    pub cloth_flag4: bool,
    pub impostor: bool,
    /// 1-based export order; 0 means unset.
    pub export_order: u32,
    pub lod: u32,
    pub lod_distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    /// Vertex index of every loop.
    pub loops: Vec<u32>,
    pub polygons: Vec<Polygon>,
    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    #[serde(default)]
    pub color_layers: Vec<ColorLayer>,
    #[serde(default)]
    pub ls_properties: LsMeshProperties,
}

/// Why tangent space could not be computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TangentError {
    #[error("mesh has no UV layer")]
    NoUvLayer,
    #[error("polygon {0} has more than four corners")]
    NGon(usize),
    #[error("polygon {0} has degenerate UVs")]
    DegenerateUv(usize),
}

/// Tangent and bitangent of one loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTangent {
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl MeshData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check that polygons, loops and per-loop layers index within bounds.
    pub fn validate(&self) -> Result<(), String> {
        for (i, polygon) in self.polygons.iter().enumerate() {
            if polygon.loop_start + polygon.loop_total > self.loops.len() {
                return Err(format!(
                    "polygon {} of mesh '{}' uses loops {}..{} but the mesh has {} loops",
                    i,
                    self.name,
                    polygon.loop_start,
                    polygon.loop_start + polygon.loop_total,
                    self.loops.len()
                ));
            }
        }
        if let Some((i, v)) = self
            .loops
            .iter()
            .enumerate()
            .find(|(_, v)| **v as usize >= self.vertices.len())
        {
            return Err(format!(
                "loop {} of mesh '{}' references vertex {} but the mesh has {} vertices",
                i,
                self.name,
                v,
                self.vertices.len()
            ));
        }
        let layers = self
            .uv_layers
            .iter()
            .map(|l| (&l.name, l.data.len()))
            .chain(self.color_layers.iter().map(|l| (&l.name, l.data.len())));
        for (name, len) in layers {
            if len != self.loops.len() {
                return Err(format!(
                    "layer '{}' of mesh '{}' has {} entries for {} loops",
                    name,
                    self.name,
                    len,
                    self.loops.len()
                ));
            }
        }
        Ok(())
    }

    /// Append a polygon over existing vertices and return its index.
    pub fn add_polygon(&mut self, vertices: &[u32], material_index: usize, smooth: bool) -> usize {
        let loop_start = self.loops.len();
        self.loops.extend_from_slice(vertices);
        self.polygons.push(Polygon {
            loop_start,
            loop_total: vertices.len(),
            material_index,
            smooth,
        });
        self.polygons.len() - 1
    }

    pub fn position(&self, loop_index: usize) -> Vec3 {
        Vec3::from(self.vertices[self.loops[loop_index] as usize].co)
    }

    /// Unnormalized polygon normal (Newell's method); its length is twice the area.
    fn polygon_normal_weighted(&self, poly: &Polygon) -> Vec3 {
        let mut n = Vec3::ZERO;
        let loops: Vec<usize> = poly.loops().collect();
        for (i, &l) in loops.iter().enumerate() {
            let a = self.position(l);
            let b = self.position(loops[(i + 1) % loops.len()]);
            n += a.cross(b);
        }
        n
    }

    pub fn polygon_normal(&self, poly: &Polygon) -> Vec3 {
        self.polygon_normal_weighted(poly).normalize_or_zero()
    }

    /// Normal of every loop: smooth polygons use area-weighted vertex normals,
    /// flat polygons use the face normal.
    pub fn loop_normals(&self) -> Vec<Vec3> {
        let mut vertex_normals = vec![Vec3::ZERO; self.vertices.len()];
        for poly in &self.polygons {
            let n = self.polygon_normal_weighted(poly);
            for l in poly.loops() {
                vertex_normals[self.loops[l] as usize] += n;
            }
        }

        let mut normals = vec![Vec3::ZERO; self.loops.len()];
        for poly in &self.polygons {
            let face = self.polygon_normal(poly);
            for l in poly.loops() {
                normals[l] = if poly.smooth {
                    vertex_normals[self.loops[l] as usize].normalize_or_zero()
                } else {
                    face
                };
            }
        }
        normals
    }

    /// Split every polygon with more than three corners into a triangle fan.
    pub fn triangulate(&mut self) {
        if self.polygons.iter().all(|p| p.loop_total <= 3) {
            return;
        }

        let mut loops = Vec::with_capacity(self.loops.len() * 2);
        let mut polygons = Vec::with_capacity(self.polygons.len() * 2);
        let mut uv_layers: Vec<Vec<[f32; 2]>> = vec![Vec::new(); self.uv_layers.len()];
        let mut color_layers: Vec<Vec<[f32; 4]>> = vec![Vec::new(); self.color_layers.len()];

        for poly in &self.polygons {
            let corners: Vec<usize> = poly.loops().collect();
            let tris: Vec<[usize; 3]> = if corners.len() < 3 {
                vec![]
            } else {
                (1..corners.len() - 1)
                    .map(|i| [corners[0], corners[i], corners[i + 1]])
                    .collect()
            };
            if corners.len() < 3 {
                // Keep degenerate faces so later stages can drop them.
                let start = loops.len();
                for &l in &corners {
                    copy_loop(self, l, &mut loops, &mut uv_layers, &mut color_layers);
                }
                polygons.push(Polygon { loop_start: start, loop_total: corners.len(), ..*poly });
                continue;
            }
            for tri in tris {
                let start = loops.len();
                for l in tri {
                    copy_loop(self, l, &mut loops, &mut uv_layers, &mut color_layers);
                }
                polygons.push(Polygon { loop_start: start, loop_total: 3, ..*poly });
            }
        }

        self.loops = loops;
        self.polygons = polygons;
        for (layer, data) in self.uv_layers.iter_mut().zip(uv_layers) {
            layer.data = data;
        }
        for (layer, data) in self.color_layers.iter_mut().zip(color_layers) {
            layer.data = data;
        }
    }

    /// Per-loop tangent space from the first UV layer.
    ///
    /// Polygons must be triangles or quads and must have a non-degenerate UV mapping.
    pub fn calc_tangents(&self, normals: &[Vec3]) -> Result<Vec<LoopTangent>, TangentError> {
        let uvs = &self.uv_layers.first().ok_or(TangentError::NoUvLayer)?.data;
        let mut out = vec![
            LoopTangent {
                tangent: Vec3::ZERO,
                bitangent: Vec3::ZERO,
            };
            self.loops.len()
        ];

        for (pi, poly) in self.polygons.iter().enumerate() {
            if poly.loop_total > 4 {
                return Err(TangentError::NGon(pi));
            }
            if poly.loop_total < 3 {
                continue;
            }

            let corners: Vec<usize> = poly.loops().collect();
            let mut t_sum = Vec3::ZERO;
            let mut b_sum = Vec3::ZERO;
            for i in 1..corners.len() - 1 {
                let [a, b, c] = [corners[0], corners[i], corners[i + 1]];
                let e1 = self.position(b) - self.position(a);
                let e2 = self.position(c) - self.position(a);
                let uv_a = Vec2::from(uvs.get(a).copied().unwrap_or_default());
                let d1 = Vec2::from(uvs.get(b).copied().unwrap_or_default()) - uv_a;
                let d2 = Vec2::from(uvs.get(c).copied().unwrap_or_default()) - uv_a;
                let det = d1.x * d2.y - d2.x * d1.y;
                if det.abs() <= UV_DEGENERATE_EPSILON {
                    return Err(TangentError::DegenerateUv(pi));
                }
                let r = 1.0 / det;
                t_sum += (e1 * d2.y - e2 * d1.y) * r;
                b_sum += (e2 * d1.x - e1 * d2.x) * r;
            }

            for &l in &corners {
                let n = normals[l];
                let t = (t_sum - n * n.dot(t_sum)).normalize_or_zero();
                let sign = if n.cross(t).dot(b_sum) < 0.0 { -1.0 } else { 1.0 };
                out[l] = LoopTangent {
                    tangent: t,
                    bitangent: n.cross(t) * sign,
                };
            }
        }

        Ok(out)
    }
}

fn copy_loop(
    mesh: &MeshData,
    l: usize,
    loops: &mut Vec<u32>,
    uv_layers: &mut [Vec<[f32; 2]>],
    color_layers: &mut [Vec<[f32; 4]>],
) {
    loops.push(mesh.loops[l]);
    for (dst, layer) in uv_layers.iter_mut().zip(&mesh.uv_layers) {
        dst.push(layer.data.get(l).copied().unwrap_or_default());
    }
    for (dst, layer) in color_layers.iter_mut().zip(&mesh.color_layers) {
        dst.push(layer.data.get(l).copied().unwrap_or([1.0; 4]));
    }
}
