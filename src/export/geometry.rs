//! Mesh extraction into deduplicated Collada vertex and index buffers.

use super::document::{Document, Section};
use super::skeleton::Skeleton;
use super::skin::{vertex_influences, InfluenceOptions};
use super::ExtraFlag;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::scene::{LsMeshProperties, MeshData};
use crate::types::{format_list, xml_escape};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One exported vertex. Two loops producing equal vertices share an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: Option<[f32; 3]>,
    pub bitangent: Option<[f32; 3]>,
    pub color: Option<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub bones: Vec<usize>,
    pub weights: Vec<f32>,
}

/// Bit pattern used for deduplication; both zeros compare equal.
fn key_bits(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl ExportVertex {
    /// Exact-match identity of every exported attribute, in a fixed order.
    pub fn key(&self) -> Vec<u32> {
        let mut key = Vec::with_capacity(32);
        key.extend(self.position.iter().map(|v| key_bits(*v)));
        key.extend(self.normal.iter().map(|v| key_bits(*v)));
        for uv in &self.uvs {
            key.extend(uv.iter().map(|v| key_bits(*v)));
        }
        for attr in [&self.color, &self.tangent, &self.bitangent].into_iter().flatten() {
            key.extend(attr.iter().map(|v| key_bits(*v)));
        }
        key.extend(self.bones.iter().map(|b| *b as u32));
        key.extend(self.weights.iter().map(|v| key_bits(*v)));
        key
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryOptions {
    pub triangulate: bool,
    pub tangents: bool,
    pub normals: bool,
}

/// Skinning input for a mesh bound to a skeleton.
pub struct SkinInput<'a> {
    /// Vertex group names of the mesh object.
    pub group_names: &'a [String],
    pub skeleton: &'a Skeleton,
    pub options: InfluenceOptions,
}

/// Deduplicated buffers of one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshBuffers {
    pub vertices: Vec<ExportVertex>,
    /// Face index tuples grouped by material index.
    pub surfaces: BTreeMap<usize, Vec<Vec<u32>>>,
    pub triangles: bool,
    pub has_normals: bool,
    pub has_tangents: bool,
    pub has_colors: bool,
    pub uv_count: usize,
}

impl MeshBuffers {
    pub fn face_count(&self) -> usize {
        self.surfaces.values().map(Vec::len).sum()
    }
}

/// Build the vertex and index buffers of an evaluated mesh.
///
/// Faces with fewer than three corners are dropped. Tangents are computed
/// only when requested and a UV layer exists; failures fall back to
/// normals-only output with a warning.
pub fn build_buffers(
    mut mesh: MeshData,
    options: GeometryOptions,
    skin: Option<&SkinInput<'_>>,
    object_name: &str,
    diagnostics: &mut Diagnostics,
) -> MeshBuffers {
    if options.triangulate {
        mesh.triangulate();
    }

    let normals = mesh.loop_normals();
    let tangents = if options.tangents && !mesh.uv_layers.is_empty() {
        match mesh.calc_tangents(&normals) {
            Ok(t) => Some(t),
            Err(e) => {
                diagnostics.warn(
                    WarningKind::TangentsFailed,
                    format!(
                        "CalcTangents failed for mesh \"{}\" ({}), no tangents will be exported.",
                        mesh.name, e
                    ),
                );
                None
            }
        }
    } else {
        None
    };
    let has_colors = !mesh.color_layers.is_empty();

    let mut buffers = MeshBuffers {
        triangles: options.triangulate,
        has_normals: options.normals,
        has_tangents: tangents.is_some(),
        has_colors,
        uv_count: mesh.uv_layers.len(),
        ..Default::default()
    };
    let mut index_of: HashMap<Vec<u32>, u32> = HashMap::new();

    // Influences depend only on the source vertex.
    let influences: Option<Vec<(Vec<usize>, Vec<f32>)>> = skin.map(|skin| {
        mesh.vertices
            .iter()
            .map(|v| {
                let (bones, weights) = vertex_influences(v, skin.group_names, skin.skeleton, skin.options);
                if weights.is_empty() {
                    diagnostics.warn_once(
                        WarningKind::UnassignedWeights,
                        format!(
                            "Mesh for object \"{}\" has unassigned weights. This may look wrong in exported model.",
                            object_name
                        ),
                    );
                    (vec![0], vec![1.0])
                } else {
                    (bones, weights)
                }
            })
            .collect()
    });

    for poly in &mesh.polygons {
        let mut face = Vec::with_capacity(poly.loop_total);
        for l in poly.loops() {
            let vi = mesh.loops[l] as usize;
            let mut v = ExportVertex {
                position: mesh.vertices[vi].co,
                normal: if options.normals { normals[l].to_array() } else { [0.0; 3] },
                uvs: mesh
                    .uv_layers
                    .iter()
                    .map(|layer| layer.data.get(l).copied().unwrap_or_default())
                    .collect(),
                ..Default::default()
            };
            if has_colors {
                let c = mesh.color_layers[0].data.get(l).copied().unwrap_or([1.0; 4]);
                v.color = Some([c[0], c[1], c[2]]);
            }
            if let Some(t) = &tangents {
                v.tangent = Some(t[l].tangent.to_array());
                v.bitangent = Some(t[l].bitangent.to_array());
            }
            if let Some(influences) = &influences {
                let (bones, weights) = &influences[vi];
                v.bones = bones.clone();
                v.weights = weights.clone();
            }

            let key = v.key();
            let index = match index_of.get(&key) {
                Some(&i) => i,
                None => {
                    let i = buffers.vertices.len() as u32;
                    buffers.vertices.push(v);
                    index_of.insert(key, i);
                    i
                }
            };
            face.push(index);
        }

        if face.len() > 2 {
            buffers.surfaces.entry(poly.material_index).or_default().push(face);
        }
    }

    debug!(
        mesh = %mesh.name,
        loops = mesh.loops.len(),
        vertices = buffers.vertices.len(),
        faces = buffers.face_count(),
        "Built mesh buffers"
    );
    buffers
}

/// LSTools tags describing a mesh.
pub fn mesh_extra_tags(props: &LsMeshProperties, flag: ExtraFlag) -> Vec<String> {
    let model_types = [
        (props.rigid || flag.forces_rigid(), "Rigid"),
        (props.cloth || flag.forces_cloth(), "Cloth"),
        (props.mesh_proxy || flag.forces_mesh_proxy(), "MeshProxy"),
        (props.proxy, "ProxyGeometry"),
        (props.spring, "Spring"),
        (props.occluder, "Occluder"),
        (props.cloth_physics, "ClothPhysics"),
        (props.cloth_flag1, "Cloth01"),
        (props.cloth_flag2, "Cloth02"),
        (props.cloth_flag4, "Cloth04"),
    ];

    let mut tags: Vec<String> = model_types
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| format!("<DivModelType>{}</DivModelType>", name))
        .collect();

    if props.impostor {
        tags.push("<IsImpostor>1</IsImpostor>".to_string());
    }
    if props.export_order != 0 {
        tags.push(format!("<ExportOrder>{}</ExportOrder>", props.export_order - 1));
    }
    if props.lod != 0 {
        tags.push(format!("<LOD>{}</LOD>", props.lod));
    }
    if props.lod_distance != 0.0 {
        tags.push(format!("<LODDistance>{}</LODDistance>", props.lod_distance));
    }
    tags
}

fn write_source<T: std::fmt::Display>(
    doc: &mut Document,
    id: &str,
    values: impl IntoIterator<Item = T>,
    count: usize,
    params: &[&str],
) {
    let s = Section::Geometries;
    let stride = params.len();
    doc.writel(s, 3, format!("<source id=\"{}\">", id));
    doc.writel(
        s,
        4,
        format!(
            "<float_array id=\"{}-array\" count=\"{}\">{}</float_array>",
            id,
            count * stride,
            format_list(values)
        ),
    );
    doc.writel(s, 4, "<technique_common>");
    doc.writel(
        s,
        4,
        format!("<accessor source=\"#{}-array\" count=\"{}\" stride=\"{}\">", id, count, stride),
    );
    for p in params {
        doc.writel(s, 5, format!("<param name=\"{}\" type=\"float\"/>", p));
    }
    doc.writel(s, 4, "</accessor>");
    doc.writel(s, 4, "</technique_common>");
    doc.writel(s, 3, "</source>");
}

const XYZ: [&str; 3] = ["X", "Y", "Z"];

/// Write a `<geometry>` element for the buffers.
///
/// `extra` carries the LSTools tags; `None` omits the `<extra>` block.
pub fn write_geometry(doc: &mut Document, id: &str, name: &str, buffers: &MeshBuffers, extra: Option<&[String]>) {
    let s = Section::Geometries;
    let verts = &buffers.vertices;
    let n = verts.len();

    doc.writel(s, 1, format!("<geometry id=\"{}\" name=\"{}\">", id, xml_escape(name)));
    doc.writel(s, 2, "<mesh>");

    write_source(doc, &format!("{}-positions", id), verts.iter().flat_map(|v| v.position), n, &XYZ);
    if buffers.has_normals {
        write_source(doc, &format!("{}-normals", id), verts.iter().flat_map(|v| v.normal), n, &XYZ);
    }
    if buffers.has_tangents {
        let tangents = verts.iter().flat_map(|v| v.tangent.unwrap_or_default());
        write_source(doc, &format!("{}-tangents", id), tangents, n, &XYZ);
        let bitangents = verts.iter().flat_map(|v| v.bitangent.unwrap_or_default());
        write_source(doc, &format!("{}-bitangents", id), bitangents, n, &XYZ);
    }
    for uvi in 0..buffers.uv_count {
        let uvs = verts.iter().flat_map(|v| v.uvs.get(uvi).copied().unwrap_or_default());
        write_source(doc, &format!("{}-texcoord-{}", id, uvi), uvs, n, &["S", "T"]);
    }
    if buffers.has_colors {
        let colors = verts.iter().flat_map(|v| v.color.unwrap_or([1.0; 3]));
        write_source(doc, &format!("{}-colors", id), colors, n, &XYZ);
    }

    doc.writel(s, 3, format!("<vertices id=\"{}-vertices\">", id));
    doc.writel(s, 4, format!("<input semantic=\"POSITION\" source=\"#{}-positions\"/>", id));
    doc.writel(s, 3, "</vertices>");

    let prim = if buffers.triangles { "triangles" } else { "polygons" };
    for faces in buffers.surfaces.values() {
        doc.writel(s, 3, format!("<{} count=\"{}\">", prim, faces.len()));
        doc.writel(s, 4, format!("<input semantic=\"VERTEX\" source=\"#{}-vertices\" offset=\"0\"/>", id));
        if buffers.has_normals {
            doc.writel(s, 4, format!("<input semantic=\"NORMAL\" source=\"#{}-normals\" offset=\"0\"/>", id));
        }
        for uvi in 0..buffers.uv_count {
            doc.writel(
                s,
                4,
                format!(
                    "<input semantic=\"TEXCOORD\" source=\"#{}-texcoord-{}\" offset=\"0\" set=\"{}\"/>",
                    id, uvi, uvi
                ),
            );
        }
        if buffers.has_colors {
            doc.writel(s, 4, format!("<input semantic=\"COLOR\" source=\"#{}-colors\" offset=\"0\"/>", id));
        }
        if buffers.has_tangents {
            doc.writel(s, 4, format!("<input semantic=\"TEXTANGENT\" source=\"#{}-tangents\" offset=\"0\"/>", id));
            doc.writel(
                s,
                4,
                format!("<input semantic=\"TEXBINORMAL\" source=\"#{}-bitangents\" offset=\"0\"/>", id),
            );
        }

        if buffers.triangles {
            doc.writel(s, 4, format!("<p>{}</p>", format_list(faces.iter().flatten())));
        } else {
            for face in faces {
                doc.writel(s, 4, format!("<p>{}</p>", format_list(face)));
            }
        }
        doc.writel(s, 3, format!("</{}>", prim));
    }

    if let Some(tags) = extra {
        doc.writel(s, 3, "<extra>");
        doc.writel(s, 4, "<technique profile=\"LSTools\">");
        for tag in tags {
            doc.writel(s, 5, tag);
        }
        doc.writel(s, 4, "</technique>");
        doc.writel(s, 3, "</extra>");
    }

    doc.writel(s, 2, "</mesh>");
    doc.writel(s, 1, "</geometry>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::skeleton::{flatten_skeleton, FlattenContext};
    use crate::scene::fixtures;
    use glam::Mat4;
    use std::collections::HashSet;

    const TRIS: GeometryOptions = GeometryOptions {
        triangulate: true,
        tangents: true,
        normals: true,
    };

    fn assert_indices_valid(buffers: &MeshBuffers) {
        for face in buffers.surfaces.values().flatten() {
            for &i in face {
                assert!((i as usize) < buffers.vertices.len());
            }
        }
    }

    #[test]
    fn test_flat_cube_splits_normals() {
        let mesh = fixtures::cube_mesh("Cube", false);
        let loops = mesh.loops.len();
        let buffers = build_buffers(mesh, TRIS, None, "Cube", &mut Diagnostics::new());
        assert_eq!(buffers.vertices.len(), 24);
        assert_eq!(buffers.face_count(), 12);
        assert!(buffers.vertices.len() <= loops);
        assert_indices_valid(&buffers);
    }

    #[test]
    fn test_smooth_cube_shares_corners() {
        let mesh = fixtures::cube_mesh("Cube", true);
        let buffers = build_buffers(mesh, TRIS, None, "Cube", &mut Diagnostics::new());
        assert_eq!(buffers.vertices.len(), 8);
        assert_indices_valid(&buffers);
    }

    #[test]
    fn test_polygons_kept_without_triangulation() {
        let mesh = fixtures::cube_mesh("Cube", false);
        let options = GeometryOptions {
            triangulate: false,
            ..TRIS
        };
        let buffers = build_buffers(mesh, options, None, "Cube", &mut Diagnostics::new());
        assert_eq!(buffers.face_count(), 6);
        assert!(buffers.surfaces[&0].iter().all(|f| f.len() == 4));
    }

    #[test]
    fn test_degenerate_faces_dropped() {
        let mut mesh = fixtures::quad_mesh("Quad");
        mesh.add_polygon(&[0, 1], 0, false);
        let options = GeometryOptions {
            triangulate: false,
            tangents: false,
            normals: true,
        };
        let buffers = build_buffers(mesh, options, None, "Quad", &mut Diagnostics::new());
        assert_eq!(buffers.face_count(), 1);
    }

    #[test]
    fn test_materials_group_faces() {
        let mut mesh = fixtures::cube_mesh("Cube", false);
        mesh.polygons[5].material_index = 2;
        let buffers = build_buffers(mesh, TRIS, None, "Cube", &mut Diagnostics::new());
        assert_eq!(buffers.surfaces.len(), 2);
        assert_eq!(buffers.surfaces[&2].len(), 2);
    }

    #[test]
    fn test_tangent_failure_falls_back() {
        let mut mesh = fixtures::quad_mesh("Quad");
        for uv in &mut mesh.uv_layers[0].data {
            *uv = [0.0, 0.0];
        }
        let mut diag = Diagnostics::new();
        let buffers = build_buffers(mesh, TRIS, None, "Quad", &mut diag);
        assert!(!buffers.has_tangents);
        assert!(diag.has(WarningKind::TangentsFailed));
        assert!(buffers.vertices.iter().all(|v| v.tangent.is_none()));
    }

    #[test]
    fn test_tangents_exported_with_uvs() {
        let mesh = fixtures::quad_mesh("Quad");
        let buffers = build_buffers(mesh, TRIS, None, "Quad", &mut Diagnostics::new());
        assert!(buffers.has_tangents);
        assert_eq!(buffers.uv_count, 1);
        assert_eq!(buffers.vertices.len(), 4);
    }

    #[test]
    fn test_unweighted_vertex_binds_to_first_joint() {
        let rig = fixtures::two_bone_rig(false);
        let armature = rig.scene.armature_of(rig.armature).unwrap();
        let mut doc = Document::new();
        let mut used = HashSet::new();
        let mut diag = Diagnostics::new();
        let skeleton = {
            let mut ctx = FlattenContext {
                exclude_ctrl_bones: false,
                detect_collisions: false,
                used_bones: &mut used,
                diagnostics: &mut diag,
            };
            flatten_skeleton(&mut doc, "Armature", armature, Mat4::IDENTITY, &mut ctx)
        };

        // The plain quad carries no vertex group weights at all.
        let mesh = fixtures::quad_mesh("Body");
        let skin = SkinInput {
            group_names: &rig.scene.node(rig.mesh).vertex_groups,
            skeleton: &skeleton,
            options: InfluenceOptions::default(),
        };
        let buffers = build_buffers(mesh, TRIS, Some(&skin), "Body", &mut diag);

        assert!(buffers.vertices.iter().all(|v| v.bones == vec![0] && v.weights == vec![1.0]));
        assert_eq!(diag.count(WarningKind::UnassignedWeights), 1);
    }

    #[test]
    fn test_extra_tags() {
        let props = LsMeshProperties {
            rigid: true,
            lod: 2,
            export_order: 3,
            ..Default::default()
        };
        let tags = mesh_extra_tags(&props, ExtraFlag::Disabled);
        assert_eq!(
            tags,
            vec![
                "<DivModelType>Rigid</DivModelType>",
                "<ExportOrder>2</ExportOrder>",
                "<LOD>2</LOD>",
            ]
        );

        let forced = mesh_extra_tags(&LsMeshProperties::default(), ExtraFlag::RigidCloth);
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_write_geometry_single_triangle_block() {
        let mesh = fixtures::cube_mesh("Cube", false);
        let buffers = build_buffers(mesh, TRIS, None, "Cube", &mut Diagnostics::new());
        let mut doc = Document::new();
        let tags: Vec<String> = Vec::new();
        write_geometry(&mut doc, "id-mesh-1", "Cube", &buffers, Some(tags.as_slice()));

        let text = doc.lines(Section::Geometries).join("\n");
        assert_eq!(text.matches("<geometry ").count(), 1);
        assert_eq!(text.matches("<triangles count=\"12\">").count(), 1);
        assert!(text.contains("<float_array id=\"id-mesh-1-positions-array\" count=\"72\">"));
        assert!(text.contains("<technique profile=\"LSTools\">"));
        assert!(!text.contains("TEXTANGENT"));
    }
}
