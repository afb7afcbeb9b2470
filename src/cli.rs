use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{Configuration, ModelType};
use crate::fetch::DirectoryStore;
use crate::gpu::offscreen::OffscreenRenderer;
use crate::loader::ModelLoaders;
use crate::property::{builtin_catalog, joint_catalog};
use crate::render_loop::{FrameScheduler, ManualScheduler};
use crate::telemetry::{parse_records, TelemetryHub, TelemetryRecord};
use crate::viewer::ModelViewer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a configured widget to PNG frames
    Render {
        /// Widget configuration JSON (bare or host envelope)
        #[arg(long)]
        config: PathBuf,

        /// Directory holding model binaries named by binary id
        #[arg(long)]
        model_dir: PathBuf,

        /// JSON-lines telemetry to replay
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 5.0)]
        duration: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,
    },
    /// Print the bindable properties and clips of a model file as JSON
    Inspect {
        /// Model file
        #[arg(long)]
        model: PathBuf,

        /// Model type (.dae, .obj or .gltf); derived from the file name if omitted
        #[arg(long)]
        model_type: Option<String>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config,
            model_dir,
            telemetry,
            out,
            fps,
            duration,
            width,
            height,
        } => {
            let options = RenderOptions {
                fps,
                duration,
                width,
                height,
            };
            render_offline(&config, model_dir, telemetry.as_deref(), out, options)?;
        }
        Commands::Inspect { model, model_type } => {
            println!("{}", inspect(&model, model_type.as_deref())?);
        }
    }
    Ok(())
}

struct RenderOptions {
    fps: f32,
    duration: f32,
    width: u32,
    height: u32,
}

fn render_offline(
    config_path: &Path,
    model_dir: PathBuf,
    telemetry_path: Option<&Path>,
    out_dir: PathBuf,
    options: RenderOptions,
) -> Result<()> {
    if options.fps <= 0.0 {
        return Err(anyhow!("--fps must be positive"));
    }

    let json = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let config = Configuration::from_json(&json)?;

    let records = match telemetry_path {
        Some(path) => {
            let jsonl = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_records(&jsonl)?
        }
        None => Vec::new(),
    };

    let hub = TelemetryHub::new();
    let mut viewer = ModelViewer::new(config, Rc::new(hub.clone()));

    let renderer = pollster::block_on(OffscreenRenderer::new(
        options.width,
        options.height,
        Some(out_dir.clone()),
    ))?;
    viewer.load(&DirectoryStore::new(model_dir), &ModelLoaders::new(), Box::new(renderer))?;

    let manual = Rc::new(ManualScheduler::new());
    let scheduler: Rc<dyn FrameScheduler> = manual.clone();
    viewer.start(&scheduler)?;

    let total_frames = (options.duration * options.fps).ceil() as usize;
    let dt = 1.0 / options.fps;
    let mut replay = Replay::new(&records);

    println!("Rendering {} frames to {:?}...", total_frames, out_dir);

    for i in 0..total_frames {
        let now = i as f32 * dt;
        replay.publish_until(now, &hub);
        manual.run_pending(now as f64);

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }

    let frames = viewer.frames_rendered();
    let diagnostics = viewer.take_diagnostics();
    viewer.teardown();

    println!("\nDone: {} frames, {} telemetry events.", frames, replay.published);
    for diagnostic in diagnostics {
        println!("{}", serde_json::to_string(&diagnostic)?);
    }
    Ok(())
}

/// Publishes records at their offset from the first record.
struct Replay<'a> {
    records: &'a [TelemetryRecord],
    next: usize,
    published: usize,
}

impl<'a> Replay<'a> {
    fn new(records: &'a [TelemetryRecord]) -> Self {
        Self {
            records,
            next: 0,
            published: 0,
        }
    }

    fn publish_until(&mut self, now: f32, hub: &TelemetryHub) {
        let Some(first) = self.records.first() else {
            return;
        };
        while let Some(record) = self.records.get(self.next) {
            if record.offset_from(first.at) > now {
                break;
            }
            if hub.publish(&record.device, &record.event()) == 0 {
                log::debug!("No subscriber for device {}", record.device);
            }
            self.published += 1;
            self.next += 1;
        }
    }
}

fn inspect(model_path: &Path, model_type: Option<&str>) -> Result<String> {
    let model_type = match model_type {
        Some(declared) => ModelType::from_extension(declared)
            .ok_or_else(|| anyhow!("unsupported model type '{}'", declared))?,
        None => model_path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(ModelType::from_file_name)
            .ok_or_else(|| anyhow!("cannot derive the model type of {}", model_path.display()))?,
    };

    let bytes = std::fs::read(model_path)
        .with_context(|| format!("reading {}", model_path.display()))?;
    let graph = ModelLoaders::new().parse(model_type, &bytes)?;

    let mut properties = builtin_catalog();
    if let Some(kinematics) = &graph.kinematics {
        properties.extend(joint_catalog(kinematics));
    }

    let report = serde_json::json!({
        "modelType": model_type.extension(),
        "meshes": graph.meshes.len(),
        "triangles": graph.triangle_count(),
        "animations": graph.animations,
        "properties": properties,
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_publishes_by_offset() {
        let records = parse_records(
            r#"{"at": "2024-01-01T00:00:00Z", "device": "d", "data": {}}
{"at": "2024-01-01T00:00:01Z", "device": "d", "data": {}}
{"at": "2024-01-01T00:00:03Z", "device": "d", "data": {}}"#,
        )
        .unwrap();
        let hub = TelemetryHub::new();
        let mut replay = Replay::new(&records);

        replay.publish_until(0.0, &hub);
        assert_eq!(replay.published, 1);
        replay.publish_until(2.0, &hub);
        assert_eq!(replay.published, 2);
        replay.publish_until(10.0, &hub);
        assert_eq!(replay.published, 3);
    }

    #[test]
    fn test_inspect_obj() {
        let path = std::env::temp_dir().join(format!("model-viewer-inspect-{}.obj", std::process::id()));
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let json: serde_json::Value = serde_json::from_str(&inspect(&path, None).unwrap()).unwrap();
        assert_eq!(json["modelType"], ".obj");
        assert_eq!(json["triangles"], 1);
        assert_eq!(json["properties"].as_array().unwrap().len(), 9);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_inspect_rejects_unknown_type() {
        assert!(inspect(Path::new("model.stl"), None).is_err());
        assert!(inspect(Path::new("model.obj"), Some(".stl")).is_err());
    }
}
