//! waste_classify - offline label and image classification

use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use waste_sorter::config::DetectorSettings;
use waste_sorter::detect::{decode_image, yolo::DEFAULT_IOU_THRESHOLD};
use waste_sorter::{CategoryResolver, CategoryTable, MatchPolicy};

#[derive(Parser, Debug)]
#[command(name = "waste_classify", author, version, about = "Map detection labels to waste categories")]
struct Args {
    /// TOML category table replacing the built-in one.
    #[arg(long, env = "WASTE_CATEGORIES_PATH")]
    categories: Option<PathBuf>,
    /// Tie-break for ambiguous substring matches (table_order|longest_key).
    #[arg(long, default_value = "table_order", value_name = "POLICY")]
    match_policy: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve one or more labels (prints one JSON object per line)
    Resolve {
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// List the category table in order, or with --detector the
    /// detector's class names and the category each resolves to
    Classes {
        #[arg(long)]
        detector: bool,
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Run a detector on an image file and classify every detection
    Detect {
        #[arg(long)]
        image: PathBuf,
        #[arg(long, default_value_t = 0.25)]
        confidence: f32,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct BackendArgs {
    /// Detector backend (stub|tract).
    #[arg(long, default_value = "stub", env = "WASTE_BACKEND")]
    backend: String,
    /// ONNX model file for the tract backend.
    #[arg(long, env = "WASTE_MODEL_PATH")]
    model: Option<PathBuf>,
    /// Class names, one per line (defaults to COCO).
    #[arg(long, env = "WASTE_LABELS_PATH")]
    labels: Option<PathBuf>,
    #[arg(long, default_value_t = 640)]
    input_size: u32,
}

impl BackendArgs {
    fn settings(self, confidence: f32) -> DetectorSettings {
        DetectorSettings {
            backend: self.backend.trim().to_lowercase(),
            model_path: self.model,
            labels_path: self.labels,
            input_size: self.input_size,
            confidence,
            multi_confidence: confidence,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let table = match &args.categories {
        Some(path) => CategoryTable::load(path)?,
        None => CategoryTable::builtin(),
    };
    let policy: MatchPolicy = args.match_policy.parse()?;
    let resolver = CategoryResolver::new(Arc::new(table), policy);

    match args.command {
        Command::Resolve { labels } => {
            for label in labels {
                let resolution = resolver.resolve_match(&label);
                let line = json!({
                    "label": label,
                    "category": resolution.entry.category,
                    "recommendation": resolution.entry.recommendation,
                    "match": resolution.kind,
                });
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Command::Classes { detector: false, .. } => {
            for entry in resolver.table().entries() {
                println!("{:<18} {}", entry.canonical_label, entry.category);
            }
        }
        Command::Classes {
            detector: true,
            backend,
        } => {
            let settings = backend.settings(0.0);
            let registry = settings.build_registry()?;
            for label in registry.labels(&settings.backend)? {
                let entry = resolver.resolve(&label);
                println!("{:<18} {}", label, entry.category);
            }
        }
        Command::Detect {
            image,
            confidence,
            backend,
        } => {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(anyhow!("confidence must be within [0, 1]"));
            }
            let registry = backend.settings(confidence).build_registry()?;
            let bytes = std::fs::read(&image)
                .map_err(|e| anyhow!("failed to read image {}: {}", image.display(), e))?;
            let decoded = decode_image(&bytes)?;
            let detections = registry.detect(&decoded, confidence)?;

            if detections.is_empty() {
                println!("no objects detected in {}", image.display());
                return Ok(());
            }
            println!("detected {} object(s) in {}:", detections.len(), image.display());
            for (i, det) in detections.iter().enumerate() {
                let entry = resolver.resolve(&det.label);
                print!(
                    "{:>3}. {} ({:.1}%) -> {}",
                    i + 1,
                    det.label,
                    det.confidence * 100.0,
                    entry.category
                );
                if let Some(bbox) = det.bounding_box {
                    print!(
                        " at ({:.0}, {:.0}, {:.0}x{:.0})",
                        bbox.x, bbox.y, bbox.width, bbox.height
                    );
                }
                println!();
                println!("     {}", entry.recommendation);
            }
        }
    }

    Ok(())
}
