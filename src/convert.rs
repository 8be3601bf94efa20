//! GR2 conversion through the external `divine` command line tool.
//!
//! The tool is treated as an opaque collaborator: it receives the source and
//! destination paths, the target game and a list of `-e <token>` flags, and
//! its exit code decides success.

use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

/// Target game; selects the model format version written by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Dos,
    DosEE,
    Dos2,
    Dos2DE,
    #[default]
    Bg3,
    Unset,
}

impl Game {
    /// Identifier passed to the converter's `-g` option.
    pub fn token(&self) -> &'static str {
        match self {
            Game::Dos => "dos",
            Game::DosEE => "dosee",
            Game::Dos2 => "dos2",
            Game::Dos2DE => "dos2de",
            Game::Bg3 => "bg3",
            Game::Unset => "unset",
        }
    }

    /// Game named by the `<Game>` tag of an LSTools technique block.
    pub fn from_collada_tag(tag: &str) -> Option<Game> {
        match tag {
            "DivinityOriginalSin" => Some(Game::Dos),
            "DivinityOriginalSinEE" => Some(Game::DosEE),
            "DivinityOriginalSin2" => Some(Game::Dos2),
            "DivinityOriginalSin2DE" => Some(Game::Dos2DE),
            "BaldursGate3PrePatch8" | "BaldursGate3" => Some(Game::Bg3),
            "Unset" => Some(Game::Unset),
            _ => None,
        }
    }
}

/// GR2-specific converter switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gr2Settings {
    pub yup_conversion: bool,
    pub apply_basis_transforms: bool,
    pub force_legacy: bool,
    pub store_indices: bool,
    pub create_dummyskeleton: bool,
}

impl Default for Gr2Settings {
    fn default() -> Self {
        Self {
            yup_conversion: false,
            apply_basis_transforms: false,
            force_legacy: false,
            store_indices: true,
            create_dummyskeleton: true,
        }
    }
}

/// Converter location and the options forwarded to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub divine_path: Option<PathBuf>,
    pub game: Game,
    /// Remove the intermediate .dae after a successful conversion.
    pub delete_collada: bool,
    pub xflip_skeletons: bool,
    pub xflip_meshes: bool,
    pub export_normals: bool,
    pub export_tangents: bool,
    pub export_uvs: bool,
    pub export_colors: bool,
    pub deduplicate_vertices: bool,
    pub deduplicate_uvs: bool,
    pub recalculate_normals: bool,
    pub recalculate_tangents: bool,
    pub recalculate_iwt: bool,
    pub flip_uvs: bool,
    pub ignore_uv_nan: bool,
    pub gr2: Gr2Settings,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            divine_path: None,
            game: Game::Dos2DE,
            delete_collada: true,
            xflip_skeletons: false,
            xflip_meshes: false,
            export_normals: true,
            export_tangents: true,
            export_uvs: true,
            export_colors: true,
            deduplicate_vertices: true,
            deduplicate_uvs: true,
            recalculate_normals: false,
            recalculate_tangents: false,
            recalculate_iwt: false,
            flip_uvs: true,
            ignore_uv_nan: false,
            gr2: Gr2Settings::default(),
        }
    }
}

impl ConverterSettings {
    pub fn with_divine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.divine_path = Some(path.into());
        self
    }

    /// Tokens for every enabled option, each passed as `-e <token>`.
    pub fn flag_tokens(&self) -> Vec<&'static str> {
        let flags = [
            (self.xflip_skeletons, "x-flip-skeletons"),
            (self.xflip_meshes, "x-flip-meshes"),
            (self.export_normals, "export-normals"),
            (self.export_tangents, "export-tangents"),
            (self.export_uvs, "export-uvs"),
            (self.export_colors, "export-colors"),
            (self.deduplicate_vertices, "deduplicate-vertices"),
            (self.deduplicate_uvs, "deduplicate-uvs"),
            (self.recalculate_normals, "recalculate-normals"),
            (self.recalculate_tangents, "recalculate-tangents"),
            (self.recalculate_iwt, "recalculate-iwt"),
            (self.flip_uvs, "flip-uvs"),
            (self.ignore_uv_nan, "ignore-uv-nan"),
            (self.gr2.force_legacy, "force-legacy-version"),
            (self.gr2.store_indices, "compact-tris"),
            (self.gr2.create_dummyskeleton, "build-dummy-skeleton"),
            (self.gr2.yup_conversion, "y-up-skeletons"),
            (self.gr2.apply_basis_transforms, "apply-basis-transforms"),
        ];
        flags
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, token)| token)
            .collect()
    }
}

/// Path of the GR2 file produced for a Collada file.
pub fn gr2_path_for(collada: &Path) -> PathBuf {
    collada.with_extension("gr2")
}

/// Argument list for a `convert-model` run.
pub fn build_args(
    game: Game,
    source: &Path,
    destination: &Path,
    input_format: &str,
    output_format: &str,
    flags: &[&str],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--loglevel".into(),
        "all".into(),
        "-g".into(),
        game.token().into(),
        "-s".into(),
        source.as_os_str().to_owned(),
        "-d".into(),
        destination.as_os_str().to_owned(),
        "-i".into(),
        input_format.into(),
        "-o".into(),
        output_format.into(),
        "-a".into(),
        "convert-model".into(),
    ];
    for flag in flags {
        args.push("-e".into());
        args.push((*flag).into());
    }
    args
}

/// Runs the converter.
pub struct DivineInvoker<'a> {
    settings: &'a ConverterSettings,
}

impl<'a> DivineInvoker<'a> {
    pub fn new(settings: &'a ConverterSettings) -> Self {
        Self { settings }
    }

    /// Resolve the converter executable, failing with a configuration error.
    pub fn check_lslib(&self) -> Result<&'a Path> {
        let path = match &self.settings.divine_path {
            Some(p) if !p.as_os_str().is_empty() => p.as_path(),
            _ => {
                error!("LSLib path is not set up; cannot convert to GR2");
                return Err(ExportError::ConverterNotConfigured);
            }
        };
        if !path.is_file() {
            error!(path = %path.display(), "LSLib path is invalid; cannot convert to GR2");
            return Err(ExportError::ConverterMissing(path.to_path_buf()));
        }
        Ok(path)
    }

    /// Convert a written Collada file to GR2 and return the GR2 path.
    ///
    /// On failure the Collada file is left in place for diagnosis.
    pub fn dae_to_gr2(&self, collada_path: &Path, game: Game) -> Result<PathBuf> {
        let exe = self.check_lslib()?;
        let gr2_path = gr2_path_for(collada_path);
        let flags = self.settings.flag_tokens();
        let args = build_args(game, collada_path, &gr2_path, "dae", "gr2", &flags);

        info!("Starting GR2 conversion using divine");
        run(exe, &args, "Failed to convert Collada to GR2.")?;

        if self.settings.delete_collada && collada_path.is_file() {
            info!(path = %collada_path.display(), "GR2 conversion successful; deleting temporary collada file");
            std::fs::remove_file(collada_path)?;
        }
        Ok(gr2_path)
    }

    /// Convert a GR2 file to Collada so it can be imported.
    pub fn gr2_to_dae(&self, gr2_path: &Path, collada_path: &Path) -> Result<()> {
        let exe = self.check_lslib()?;
        let args = build_args(Game::Bg3, gr2_path, collada_path, "gr2", "dae", &["flip-uvs"]);

        info!("Starting DAE conversion using divine");
        run(exe, &args, "Failed to convert GR2 to Collada.")
    }
}

fn run(exe: &Path, args: &[OsString], failure: &str) -> Result<()> {
    debug!(exe = %exe.display(), ?args, "Sending command");
    let output = Command::new(exe).args(args).output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(%stdout, %stderr, "Converter output");

    if output.status.success() {
        return Ok(());
    }

    let last_line = stdout.lines().last().unwrap_or("");
    let message = format!("{} {}\n{}", failure, last_line, stderr);
    error!("{}", message);
    Err(ExportError::ConversionFailed(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_tokens_follow_enabled_options() {
        let settings = ConverterSettings::default();
        let tokens = settings.flag_tokens();
        assert!(tokens.contains(&"export-normals"));
        assert!(tokens.contains(&"flip-uvs"));
        assert!(tokens.contains(&"compact-tris"));
        assert!(!tokens.contains(&"x-flip-meshes"));
        assert!(!tokens.contains(&"y-up-skeletons"));
    }

    #[test]
    fn test_build_args_prefixes_each_flag() {
        let args = build_args(
            Game::Dos2DE,
            Path::new("model.dae"),
            Path::new("model.gr2"),
            "dae",
            "gr2",
            &["flip-uvs", "compact-tris"],
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[2..4], &["-g", "dos2de"]);
        assert_eq!(&args[4..6], &["-s", "model.dae"]);
        assert_eq!(&args[args.len() - 4..], &["-e", "flip-uvs", "-e", "compact-tris"]);
    }

    #[test]
    fn test_gr2_path_replaces_extension() {
        assert_eq!(gr2_path_for(Path::new("out/model.dae")), PathBuf::from("out/model.gr2"));
    }

    #[test]
    fn test_unset_path_is_configuration_error() {
        let settings = ConverterSettings::default();
        let err = DivineInvoker::new(&settings)
            .dae_to_gr2(Path::new("model.dae"), Game::Bg3)
            .unwrap_err();
        assert!(matches!(err, ExportError::ConverterNotConfigured));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_tool_keeps_collada() {
        let dir = tempfile::tempdir().unwrap();
        let dae = dir.path().join("model.dae");
        std::fs::write(&dae, "<COLLADA/>").unwrap();

        let settings = ConverterSettings::default().with_divine_path(dir.path().join("no-such-divine.exe"));
        let err = DivineInvoker::new(&settings).dae_to_gr2(&dae, Game::Bg3).unwrap_err();
        assert!(matches!(err, ExportError::ConverterMissing(_)));
        assert!(dae.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_decides_outcome() {
        let find = |name: &str| {
            ["/bin", "/usr/bin"]
                .iter()
                .map(|d| Path::new(d).join(name))
                .find(|p| p.is_file())
        };
        let (Some(ok_tool), Some(fail_tool)) = (find("true"), find("false")) else {
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let dae = dir.path().join("model.dae");

        std::fs::write(&dae, "<COLLADA/>").unwrap();
        let failing = ConverterSettings::default().with_divine_path(fail_tool);
        let err = DivineInvoker::new(&failing).dae_to_gr2(&dae, Game::Bg3).unwrap_err();
        assert!(matches!(err, ExportError::ConversionFailed(_)));
        assert!(dae.is_file());

        let passing = ConverterSettings::default().with_divine_path(ok_tool);
        let gr2 = DivineInvoker::new(&passing).dae_to_gr2(&dae, Game::Bg3).unwrap();
        assert_eq!(gr2, dir.path().join("model.gr2"));
        assert!(!dae.is_file());
    }
}
