//! Canonlabel: one record format for COCO and YOLO-style detection datasets.
//!
//! Each supported on-disk layout is read into the same canonical shape
//! (pixel-space XYXY boxes, class indices with `BACKGROUND` at 0), and a
//! [`dataset::DetectionDataset`] serves it sample by sample with optional
//! transforms, class balancing and visual diagnostics.
//!
//! # Modules
//!
//! - [`ir`]: Canonical records, box geometry and the COCO / YOLO readers
//! - [`dataset`]: Indexed sample access, balancing and summaries
//! - [`diagnostics`]: Before/after panels for inspecting transforms
//! - [`error`]: Error types for canonlabel operations

pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod ir;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use dataset::{BalancePolicy, DatasetBuilder, DetectionDataset};
use diagnostics::GridFileVisualizer;
pub use error::CanonlabelError;
use ir::io_coco_json::CocoSource;
use ir::io_yolo::YoloSource;
use ir::{AnnotationSource, BBoxXYXY, ClassIndex, ImageRef, Split};

/// The canonlabel CLI application.
#[derive(Parser)]
#[command(name = "canonlabel")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Load a dataset split and print its summary.
    Summary(SourceArgs),
    /// Print one sample's boxes and labels as JSON.
    Show(ShowArgs),
}

/// Supported annotation layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceFormat {
    Coco,
    Yolo,
}

/// Arguments shared by every subcommand.
#[derive(clap::Args)]
struct SourceArgs {
    /// Dataset root directory.
    root: PathBuf,

    /// Annotation layout of the dataset.
    #[arg(long, value_enum)]
    format: SourceFormat,

    /// Split to load ('train' or 'val').
    #[arg(long, default_value = "train")]
    split: Split,

    /// Drop records so every class is represented evenly.
    #[arg(long)]
    balance: bool,

    /// Shuffle records with this seed before balancing.
    #[arg(long, requires = "balance")]
    seed: Option<u64>,

    /// Write before/after diagnostic grids into this directory.
    #[arg(long, env = "CANONLABEL_VISUALIZE_DIR")]
    visualize_dir: Option<PathBuf>,

    /// Caption diagnostic boxes with class names using this TTF/OTF font.
    #[arg(long, env = "CANONLABEL_FONT", requires = "visualize_dir")]
    font: Option<PathBuf>,
}

/// Arguments for the show subcommand.
#[derive(clap::Args)]
struct ShowArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Index of the sample to show.
    #[arg(long)]
    index: usize,

    /// Report boxes in pixels instead of the unit interval.
    #[arg(long)]
    pixel: bool,
}

#[derive(Serialize)]
#[serde(bound = "")]
struct ShownSample<TSpace> {
    image: ImageRef,
    width: usize,
    height: usize,
    boxes: Vec<BBoxXYXY<TSpace>>,
    labels: Vec<ClassIndex>,
    names: Vec<String>,
}

/// Run the canonlabel CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), CanonlabelError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Summary(args)) => match args.format {
            SourceFormat::Coco => run_summary(open_dataset(CocoSource::open, &args)?),
            SourceFormat::Yolo => run_summary(open_dataset(YoloSource::open, &args)?),
        },
        Some(Commands::Show(args)) => match args.source.format {
            SourceFormat::Coco => run_show(open_dataset(CocoSource::open, &args.source)?, &args),
            SourceFormat::Yolo => run_show(open_dataset(YoloSource::open, &args.source)?, &args),
        },
        None => {
            println!("canonlabel {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Canonicalizes COCO and YOLO-style detection datasets.");
            println!();
            println!("Run 'canonlabel --help' for usage information.");
            Ok(())
        }
    }
}

fn open_dataset<S, F>(open: F, args: &SourceArgs) -> Result<DetectionDataset<S>, CanonlabelError>
where
    S: AnnotationSource,
    F: FnOnce(&Path, Split) -> Result<S, CanonlabelError>,
{
    let source = open(&args.root, args.split)?;
    let mut builder = DatasetBuilder::new(source);
    if args.balance {
        builder = builder.balance(match args.seed {
            Some(seed) => BalancePolicy::Shuffled { seed },
            None => BalancePolicy::KeepEarliest,
        });
    }
    if let Some(dir) = &args.visualize_dir {
        let mut visualizer = GridFileVisualizer::new(dir)?;
        if let Some(font) = &args.font {
            visualizer = visualizer.with_font(font)?;
        }
        builder = builder.visualizer(Arc::new(visualizer));
    }
    Ok(builder.build())
}

fn run_summary<S: AnnotationSource>(dataset: DetectionDataset<S>) -> Result<(), CanonlabelError> {
    print!("{}", dataset.summary());
    Ok(())
}

fn run_show<S: AnnotationSource>(
    dataset: DetectionDataset<S>,
    args: &ShowArgs,
) -> Result<(), CanonlabelError> {
    let names = |labels: &[ClassIndex]| -> Vec<String> {
        labels
            .iter()
            .map(|label| {
                dataset
                    .catalog()
                    .name(*label)
                    .map(str::to_string)
                    .unwrap_or_else(|| label.to_string())
            })
            .collect()
    };

    let json = if args.pixel {
        let sample = dataset.get_pixel(args.index)?;
        serde_json::to_string_pretty(&ShownSample {
            width: sample.image.width(),
            height: sample.image.height(),
            names: names(&sample.targets.labels),
            image: sample.image_ref,
            boxes: sample.targets.boxes,
            labels: sample.targets.labels,
        })?
    } else {
        let sample = dataset.get(args.index)?;
        serde_json::to_string_pretty(&ShownSample {
            width: sample.image.width(),
            height: sample.image.height(),
            names: names(&sample.targets.labels),
            image: sample.image_ref,
            boxes: sample.targets.boxes,
            labels: sample.targets.labels,
        })?
    };

    println!("{json}");
    Ok(())
}
