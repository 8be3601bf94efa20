//! Reading LSTools metadata back out of Collada files.
//!
//! Only the vendor extension blocks are read; geometry itself is left to
//! whatever tool performs the actual import. The recovered values are applied
//! onto a [`Scene`] so that a later export writes them again.

use crate::convert::{ConverterSettings, DivineInvoker, Game};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ExportError, Result};
use crate::scene::{LsMeshProperties, NodeData, Scene};
use crate::types::make_name;
use roxmltree::Node;
use std::path::Path;
use tracing::{debug, info};

/// LSTools metadata version written into the root profile.
pub const METADATA_VERSION: u32 = 2;

/// Vendor tags found on one `<geometry>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshProfile {
    pub model_types: Vec<String>,
    pub impostor: bool,
    /// Raw zero-based value as written in the file.
    pub export_order: Option<u32>,
    pub lod: Option<u32>,
    pub lod_distance: Option<f32>,
}

impl MeshProfile {
    /// Set the flags this profile names. Flags it does not mention are left
    /// untouched.
    pub fn apply(&self, props: &mut LsMeshProperties) {
        for model_type in &self.model_types {
            match model_type.as_str() {
                "Rigid" => props.rigid = true,
                "Cloth" => props.cloth = true,
                "MeshProxy" => props.mesh_proxy = true,
                "ProxyGeometry" => props.proxy = true,
                "Spring" => props.spring = true,
                "Occluder" => props.occluder = true,
                "ClothPhysics" => props.cloth_physics = true,
                "Cloth01" => props.cloth_flag1 = true,
                "Cloth02" => props.cloth_flag2 = true,
                "Cloth04" => props.cloth_flag4 = true,
                _ => {}
            }
        }
        if self.impostor {
            props.impostor = true;
        }
        if let Some(order) = self.export_order {
            props.export_order = order + 1;
        }
        if let Some(lod) = self.lod {
            props.lod = lod;
        }
        if let Some(distance) = self.lod_distance {
            props.lod_distance = distance;
        }
    }
}

/// Everything the importer recovered from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColladaMetadata {
    pub has_root_profile: bool,
    pub game: Option<Game>,
    /// 0 when the root profile carries no version.
    pub metadata_version: u32,
    /// Profiles keyed by geometry name.
    pub meshes: Vec<(String, MeshProfile)>,
    pub skeleton_resource_id: Option<String>,
}

impl ColladaMetadata {
    /// Write the recovered metadata onto `scene`.
    ///
    /// Mesh profiles go to every mesh whose exported name matches. The
    /// skeleton resource id goes to the armature data of selected armature
    /// objects.
    pub fn apply(&self, scene: &mut Scene) {
        if let Some(game) = self.game {
            scene.game = game;
        }
        if self.has_root_profile {
            scene.metadata_version = self.metadata_version;
        }

        for (name, profile) in &self.meshes {
            let mut matched = false;
            for mesh in scene.meshes.iter_mut().filter(|m| make_name(&m.name) == *name) {
                profile.apply(&mut mesh.ls_properties);
                matched = true;
            }
            if !matched {
                debug!(geometry = %name, "No mesh matches imported geometry profile");
            }
        }

        if let Some(id) = &self.skeleton_resource_id {
            let targets: Vec<_> = scene
                .nodes
                .iter()
                .filter(|n| n.selected)
                .filter_map(|n| match n.data {
                    NodeData::Armature(a) => Some(a),
                    _ => None,
                })
                .collect();
            for armature in targets {
                scene.armatures[armature.0].skeleton_resource_id = id.clone();
            }
        }
    }
}

fn element<'a, 'i>(parent: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    parent.children().find(|c| c.is_element() && c.tag_name().name() == name)
}

fn elements<'a, 'i: 'a>(parent: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    parent
        .children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// `extra/technique[@profile='LSTools']` below `parent`.
fn lstools_technique<'a, 'i>(parent: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    elements(parent, "extra")
        .flat_map(|extra| elements(extra, "technique"))
        .find(|t| t.attribute("profile") == Some("LSTools"))
}

fn text_of<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_number<T: std::str::FromStr>(node: Node, diagnostics: &mut Diagnostics) -> Option<T> {
    let text = text_of(node);
    match text.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            diagnostics.warn(
                WarningKind::UnknownExtensionTag,
                format!("Invalid value \"{}\" for <{}>", text, node.tag_name().name()),
            );
            None
        }
    }
}

fn unknown_tag(node: Node, scope: &str, diagnostics: &mut Diagnostics) {
    diagnostics.warn_once(
        WarningKind::UnknownExtensionTag,
        format!("Unrecognized LSTools {} tag <{}>", scope, node.tag_name().name()),
    );
}

/// Warn when the file's metadata version differs from ours.
pub fn check_version(version: u32, diagnostics: &mut Diagnostics) {
    if version < METADATA_VERSION {
        diagnostics.warn(
            WarningKind::FileTooOld,
            format!(
                "Collada file was exported with metadata version {}; re-export it to update to version {}",
                version, METADATA_VERSION
            ),
        );
    } else if version > METADATA_VERSION {
        diagnostics.warn(
            WarningKind::ImporterTooOld,
            format!(
                "Collada file uses metadata version {} but this importer only understands version {}",
                version, METADATA_VERSION
            ),
        );
    }
}

fn read_mesh_profile(technique: Node, diagnostics: &mut Diagnostics) -> MeshProfile {
    let mut profile = MeshProfile::default();
    for tag in technique.children().filter(Node::is_element) {
        match tag.tag_name().name() {
            "DivModelType" => {
                let value = text_of(tag);
                match value {
                    "Rigid" | "Cloth" | "MeshProxy" | "ProxyGeometry" | "Spring" | "Occluder"
                    | "ClothPhysics" | "Cloth01" | "Cloth02" | "Cloth04" => {
                        profile.model_types.push(value.to_string())
                    }
                    _ => diagnostics.warn(
                        WarningKind::UnknownExtensionTag,
                        format!("Unrecognized DivModelType \"{}\"", value),
                    ),
                }
            }
            "IsImpostor" => profile.impostor = text_of(tag) == "1",
            "ExportOrder" => profile.export_order = parse_number(tag, diagnostics),
            "LOD" => profile.lod = parse_number(tag, diagnostics),
            "LODDistance" => profile.lod_distance = parse_number(tag, diagnostics),
            _ => unknown_tag(tag, "mesh", diagnostics),
        }
    }
    profile
}

/// Parse the vendor metadata out of a Collada document.
pub fn read_metadata(text: &str, diagnostics: &mut Diagnostics) -> Result<ColladaMetadata> {
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "COLLADA" {
        return Err(ExportError::Import(format!(
            "expected <COLLADA> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut meta = ColladaMetadata::default();

    match lstools_technique(root) {
        Some(technique) => {
            meta.has_root_profile = true;
            for tag in technique.children().filter(Node::is_element) {
                match tag.tag_name().name() {
                    "Game" => {
                        let value = text_of(tag);
                        match Game::from_collada_tag(value) {
                            Some(game) => meta.game = Some(game),
                            None => diagnostics.warn(
                                WarningKind::UnknownExtensionTag,
                                format!("Unrecognized game \"{}\" in LSTools profile", value),
                            ),
                        }
                    }
                    "MetadataVersion" => {
                        meta.metadata_version = parse_number(tag, diagnostics).unwrap_or(0);
                    }
                    _ => unknown_tag(tag, "document", diagnostics),
                }
            }
            check_version(meta.metadata_version, diagnostics);
        }
        None => diagnostics.warn(
            WarningKind::MissingProfile,
            "LSTools profile data not found in Collada file; it was not exported with the LSTools extension",
        ),
    }

    if let Some(library) = element(root, "library_geometries") {
        for geometry in elements(library, "geometry") {
            let Some(name) = geometry.attribute("name") else {
                continue;
            };
            let Some(technique) = element(geometry, "mesh").and_then(lstools_technique) else {
                continue;
            };
            meta.meshes.push((name.to_string(), read_mesh_profile(technique, diagnostics)));
        }
    }

    if let Some(library) = element(root, "library_animations") {
        if let Some(technique) = elements(library, "animation").find_map(lstools_technique) {
            let id = element(technique, "SkeletonResourceID").map(text_of).unwrap_or("");
            meta.skeleton_resource_id = Some(id.to_string());
        }
    }

    debug!(
        meshes = meta.meshes.len(),
        version = meta.metadata_version,
        "Read LSTools metadata"
    );
    Ok(meta)
}

/// Read the vendor metadata of a `.dae` file on disk.
pub fn load_metadata(path: &Path, diagnostics: &mut Diagnostics) -> Result<ColladaMetadata> {
    let text = std::fs::read_to_string(path)?;
    read_metadata(&text, diagnostics)
}

/// Import metadata from a `.dae` or `.gr2` file and apply it to `scene`.
///
/// GR2 input is converted to a temporary Collada file first, which is removed
/// once it has been read.
pub fn import_file(
    path: &Path,
    scene: &mut Scene,
    converter: &ConverterSettings,
    diagnostics: &mut Diagnostics,
) -> Result<ColladaMetadata> {
    let is_gr2 = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gr2"));

    let meta = if is_gr2 {
        let temp = tempfile::Builder::new().suffix(".dae").tempfile()?;
        DivineInvoker::new(converter).gr2_to_dae(path, temp.path())?;
        load_metadata(temp.path(), diagnostics)?
    } else {
        load_metadata(path, diagnostics)?
    };

    meta.apply(scene);
    info!(path = %path.display(), meshes = meta.meshes.len(), "Imported LSTools metadata");
    Ok(meta)
}
