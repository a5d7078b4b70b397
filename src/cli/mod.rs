//! Command-line interface for the detection pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{JobConfig, PipelineConfig, WrapPolicy};
use crate::core::loaders;
use crate::core::writers;
use crate::processors::boxes::ColorMap;
use crate::processors::detection;
use crate::visualization;

#[derive(Parser)]
#[command(name = "lidar-pipeline")]
#[command(about = "LiDAR point cloud change detection pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect movers across a folder of PCD frames
    Detect {
        /// Folder containing PCD frames
        input_dir: PathBuf,
        /// Folder receiving per-frame annotation JSONs
        output_dir: PathBuf,
        /// Index offset to the reference frame
        #[arg(long)]
        stride: Option<usize>,
        /// Skip pairs whose reference falls past the sequence end instead of
        /// clamping to the last frame
        #[arg(long)]
        skip_overflow: bool,
        /// Voxel edge length for downsampling
        #[arg(long)]
        voxel_size: Option<f32>,
        /// Distance threshold for frame differencing
        #[arg(long)]
        threshold: Option<f32>,
        /// DBSCAN neighborhood radius
        #[arg(long)]
        eps: Option<f32>,
        /// DBSCAN minimum samples (counting the point itself)
        #[arg(long)]
        min_samples: Option<usize>,
        /// Minimum bounding box height
        #[arg(long)]
        min_height: Option<f32>,
        /// Limit number of frame pairs to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run all (input, output) jobs listed in the config file
    Run,

    /// Detect movers for one explicit frame pair
    DetectPair {
        /// Current frame PCD
        current: PathBuf,
        /// Reference frame PCD
        reference: PathBuf,
        /// Output annotation JSON path
        output: PathBuf,
        /// Also write per-point cluster labels to this CSV
        #[arg(long)]
        labels_csv: Option<PathBuf>,
    },

    /// Count annotation files and the share with detections
    Analyze {
        /// Directory tree containing annotation JSONs
        directory: PathBuf,
    },

    /// Render a frame and its annotations as a top-down PNG
    Render {
        /// Input PCD file
        pcd_file: PathBuf,
        /// Annotation JSON (defaults to the PCD path with .json extension)
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Output PNG path (defaults to the PCD path with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum number of points to plot (subsamples if exceeded)
        #[arg(long, default_value_t = 1_000_000)]
        max_points: usize,
        /// Alpha/transparency value for points (0.0 to 1.0)
        #[arg(long, default_value_t = 0.5)]
        alpha: f32,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Detect {
            input_dir,
            output_dir,
            stride,
            skip_overflow,
            voxel_size,
            threshold,
            eps,
            min_samples,
            min_height,
            limit,
        } => {
            let mut config = config;
            if let Some(v) = stride {
                config.sequence.stride = v;
            }
            if skip_overflow {
                config.sequence.wrap = WrapPolicy::Skip;
            }
            if let Some(v) = voxel_size {
                config.downsample.voxel_size = v;
            }
            if let Some(v) = threshold {
                config.change.threshold = v;
            }
            if let Some(v) = eps {
                config.clustering.eps = v;
            }
            if let Some(v) = min_samples {
                config.clustering.min_samples = v;
            }
            if let Some(v) = min_height {
                config.boxes.min_height = v;
            }
            cmd_detect(&input_dir, &output_dir, &config, limit);
        }
        Commands::Run => {
            cmd_run(&config);
        }
        Commands::DetectPair {
            current,
            reference,
            output,
            labels_csv,
        } => {
            cmd_detect_pair(&current, &reference, &output, labels_csv.as_deref(), &config);
        }
        Commands::Analyze { directory } => {
            cmd_analyze(&directory);
        }
        Commands::Render {
            pcd_file,
            annotations,
            output,
            max_points,
            alpha,
        } => {
            cmd_render(&pcd_file, annotations, output, max_points, alpha);
        }
    }
}

fn cmd_detect(
    input_dir: &std::path::Path,
    output_dir: &std::path::Path,
    config: &PipelineConfig,
    limit: Option<usize>,
) {
    let start = Instant::now();

    println!("Detecting movers...");
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());
    println!("Parameters:");
    println!("  stride: {}", config.sequence.stride);
    println!("  voxel_size: {}", config.downsample.voxel_size);
    println!("  threshold: {}", config.change.threshold);
    println!("  eps: {}", config.clustering.eps);
    println!("  min_samples: {}", config.clustering.min_samples);
    println!("  min_height: {}", config.boxes.min_height);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green} {pos}/{len}")
            .unwrap(),
    );

    // The pair count is only known once the driver has scanned the folder.
    let result = detection::process_folder(input_dir, output_dir, config, limit, |done, total| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    });

    bar.finish_and_clear();

    match result {
        Ok(summary) => {
            print_summary(
                "Detection Complete",
                &[
                    ("Input directory", input_dir.display().to_string()),
                    ("Output directory", output_dir.display().to_string()),
                    ("Pairs processed", summary.processed.to_string()),
                    ("Pairs skipped", summary.skipped.to_string()),
                    ("Pairs failed", summary.failed.to_string()),
                    ("Boxes written", summary.boxes.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Detection failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_run(config: &PipelineConfig) {
    let start = Instant::now();

    if config.jobs.is_empty() {
        error!("No jobs configured; add a 'jobs' list to the config file");
        std::process::exit(1);
    }

    println!("Running {} configured job(s)...", config.jobs.len());
    for JobConfig {
        input_dir,
        output_dir,
    } in &config.jobs
    {
        println!("  {} -> {}", input_dir.display(), output_dir.display());
    }

    let results = detection::run_jobs(config);

    let processed: usize = results.iter().map(|(_, s)| s.processed).sum();
    let failed: usize = results.iter().map(|(_, s)| s.failed).sum();
    let boxes: usize = results.iter().map(|(_, s)| s.boxes).sum();

    print_summary(
        "Batch Run Complete",
        &[
            ("Jobs configured", config.jobs.len().to_string()),
            ("Jobs completed", results.len().to_string()),
            ("Pairs processed", processed.to_string()),
            ("Pairs failed", failed.to_string()),
            ("Boxes written", boxes.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if results.len() < config.jobs.len() {
        std::process::exit(1);
    }
}

fn cmd_detect_pair(
    current: &std::path::Path,
    reference: &std::path::Path,
    output: &std::path::Path,
    labels_csv: Option<&std::path::Path>,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Detecting movers for one frame pair...");
    println!("Current: {}", current.display());
    println!("Reference: {}", reference.display());

    let spinner = create_spinner("Processing frame pair...");

    let current_cloud = match loaders::load_pcd(current) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load current frame: {}", e);
            std::process::exit(1);
        }
    };
    let reference_cloud = match loaders::load_pcd(reference) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load reference frame: {}", e);
            std::process::exit(1);
        }
    };

    let mut colors = ColorMap::new(config.boxes.color_seed);
    let result = detection::detect_movers(&current_cloud, &reference_cloud, config, &mut colors);

    if let Err(e) = writers::write_annotations(output, &result.boxes) {
        spinner.finish_and_clear();
        error!("Failed to write annotations: {}", e);
        std::process::exit(1);
    }

    if let Some(csv_path) = labels_csv {
        if let Err(e) = writers::write_labels_csv(csv_path, &result.changed, &result.labels) {
            spinner.finish_and_clear();
            error!("Failed to write labels CSV: {}", e);
            std::process::exit(1);
        }
    }

    spinner.finish_and_clear();

    print_summary(
        "Frame Pair Complete",
        &[
            ("Current frame", current.display().to_string()),
            ("Reference frame", reference.display().to_string()),
            ("Output JSON", output.display().to_string()),
            ("Change points", result.changed.len().to_string()),
            ("Boxes written", result.boxes.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_analyze(directory: &std::path::Path) {
    let start = Instant::now();

    let spinner = create_spinner("Scanning annotation files...");

    let stats = match detection::annotation_stats(directory) {
        Ok(s) => s,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Analysis failed: {:#}", e);
            std::process::exit(1);
        }
    };

    spinner.finish_and_clear();

    print_summary(
        "Annotation Analysis",
        &[
            ("Directory", directory.display().to_string()),
            ("Annotation files", stats.total.to_string()),
            ("With detections", stats.non_empty.to_string()),
            ("Detection rate", format!("{:.2}%", stats.detection_rate())),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_render(
    pcd_file: &std::path::Path,
    annotations: Option<PathBuf>,
    output: Option<PathBuf>,
    max_points: usize,
    alpha: f32,
) {
    let start = Instant::now();

    let annotation_path = annotations.unwrap_or_else(|| {
        let mut path = pcd_file.to_path_buf();
        path.set_extension("json");
        path
    });
    let output_path = output.unwrap_or_else(|| {
        let mut path = pcd_file.to_path_buf();
        path.set_extension("png");
        path
    });

    println!("Rendering frame...");
    println!("Input: {}", pcd_file.display());
    println!("Annotations: {}", annotation_path.display());
    println!("Output: {}", output_path.display());

    let spinner = create_spinner("Loading frame...");

    let cloud = match loaders::load_pcd(pcd_file) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load PCD file: {}", e);
            std::process::exit(1);
        }
    };

    // Missing or unreadable annotations render as "no detections".
    let boxes = writers::load_boxes_or_empty(&annotation_path);

    spinner.set_message("Generating plot...");

    match visualization::plot_frame(&output_path, &cloud, &boxes, max_points, alpha) {
        Ok(()) => {
            spinner.finish_and_clear();

            print_summary(
                "Render Complete",
                &[
                    ("Input file", pcd_file.display().to_string()),
                    ("Output PNG", output_path.display().to_string()),
                    ("Points in cloud", cloud.len().to_string()),
                    ("Boxes drawn", boxes.len().to_string()),
                    ("Max points plotted", max_points.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Render failed: {}", e);
            std::process::exit(1);
        }
    }
}
