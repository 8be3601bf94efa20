//! LS Collada CLI
//!
//! Export JSON scene descriptions to Collada and GR2, and inspect LSTools
//! metadata in existing files.

use clap::{Parser, Subcommand};
use ls_collada::{
    export_gr2, export_scene, import_file, ConverterSettings, Diagnostics, ExportConfig, ExportOutcome, Scene,
    SceneState,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ls-collada")]
#[command(author, version, about = "Export scenes to Collada with LSTools metadata", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene description to a .dae file
    Export {
        /// Scene description (JSON)
        #[arg(short, long)]
        scene: PathBuf,

        /// Export options (JSON); omitted fields keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output .dae path
        #[arg(short, long)]
        output: PathBuf,

        /// Convert the written document to GR2 using these converter settings (JSON)
        #[arg(long)]
        convert: Option<PathBuf>,
    },

    /// Show the LSTools metadata of a .dae or .gr2 file
    Inspect {
        /// File to read
        input: PathBuf,

        /// Converter settings (JSON), needed for .gr2 input
        #[arg(long)]
        converter: Option<PathBuf>,

        /// Apply the metadata to this scene description and print the result
        #[arg(long)]
        scene: Option<PathBuf>,
    },
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt().with_env_filter(filter).with_target(verbosity >= 1).init();
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(T::default()),
    }
}

fn print_warnings(diagnostics: Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    println!("Warnings:");
    for warning in diagnostics.into_warnings() {
        println!("  - [{:?}] {}", warning.kind, warning);
    }
}

fn run_export(
    scene_path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    convert: Option<&Path>,
) -> Result<ExportOutcome, Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", scene_path);
    let scene = Scene::from_json(&fs::read_to_string(scene_path)?)?;
    println!("  Found {} objects", scene.nodes.len());

    let config: ExportConfig = read_json(config_path)?;
    let mut state = SceneState::new(&scene);
    let mut diagnostics = Diagnostics::new();

    let outcome = match convert {
        Some(settings) => {
            let converter: ConverterSettings = read_json(Some(settings))?;
            export_gr2(&scene, &mut state, &config, &converter, output, None, &mut diagnostics)
        }
        None => export_scene(&scene, &mut state, &config, output, None, &mut diagnostics),
    };

    print_warnings(diagnostics);
    Ok(outcome)
}

fn run_inspect(
    input: &Path,
    converter_path: Option<&Path>,
    scene_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let converter: ConverterSettings = read_json(converter_path)?;
    let mut scene = match scene_path {
        Some(path) => Scene::from_json(&fs::read_to_string(path)?)?,
        None => Scene::new("inspect"),
    };

    let mut diagnostics = Diagnostics::new();
    let meta = import_file(input, &mut scene, &converter, &mut diagnostics)?;

    println!("LSTools metadata of {:?}:", input);
    println!("  Root profile: {}", if meta.has_root_profile { "present" } else { "missing" });
    if let Some(game) = meta.game {
        println!("  Game: {}", game.token());
    }
    println!("  Metadata version: {}", meta.metadata_version);
    for (name, profile) in &meta.meshes {
        println!("  Mesh {}: {:?}", name, profile);
    }
    if let Some(id) = &meta.skeleton_resource_id {
        println!("  Skeleton resource: {}", id);
    }
    print_warnings(diagnostics);

    if scene_path.is_some() {
        println!("{}", serde_json::to_string_pretty(&scene)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Export {
            scene,
            config,
            output,
            convert,
        } => run_export(&scene, config.as_deref(), &output, convert.as_deref()).map(|outcome| {
            match &outcome {
                ExportOutcome::Finished => println!("Exported to {:?}", output),
                ExportOutcome::Cancelled => println!("Export cancelled"),
                ExportOutcome::Error(message) => eprintln!("Export failed: {}", message),
            }
            outcome.is_finished()
        }),
        Commands::Inspect {
            input,
            converter,
            scene,
        } => run_inspect(&input, converter.as_deref(), scene.as_deref()).map(|_| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
