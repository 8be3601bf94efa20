//! # LS Collada
//!
//! A Collada (.dae) exporter for scene graphs, with the LSTools vendor
//! extension used by Larian's model pipeline.
//!
//! ## Overview
//!
//! The library takes a [`Scene`] (objects, meshes, armatures, curves and
//! actions) and writes a Collada 1.4.1 document holding geometry, skin
//! controllers, a node hierarchy and sampled animation. The document can then
//! be handed to the external `divine` tool to produce a GR2 file, and LSTools
//! metadata can be read back from an existing `.dae` or `.gr2`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ls_collada::{export_scene, Diagnostics, ExportConfig, Scene, SceneState};
//!
//! let scene = Scene::from_json(&std::fs::read_to_string("scene.json")?)?;
//! let mut state = SceneState::new(&scene);
//! let mut diagnostics = Diagnostics::new();
//!
//! let outcome = export_scene(
//!     &scene,
//!     &mut state,
//!     &ExportConfig::default(),
//!     "model.dae".as_ref(),
//!     None,
//!     &mut diagnostics,
//! );
//! assert!(outcome.is_finished());
//! ```
//!
//! ## Conversion
//!
//! [`export_gr2`] writes the document and then runs the converter configured
//! in [`ConverterSettings`]. Configuration problems leave the `.dae` on disk.

pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod import;
pub mod scene;
pub mod types;

pub use convert::{ConverterSettings, DivineInvoker, Game, Gr2Settings};
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use error::{ExportError, Result};
pub use export::{export_gr2, export_scene, DaeExporter, ExportConfig, ExportOutcome, ExtraFlag, YUpMode};
pub use import::{import_file, read_metadata, ColladaMetadata, METADATA_VERSION};
pub use scene::{Scene, SceneState};
