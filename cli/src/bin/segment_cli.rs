use clap::{Args, Parser, Subcommand};
use cli::{load_settings, BatchManifest};
use color_eyre::eyre::{eyre, Result, WrapErr};
use mask::{save_geojson, GeometryConverter, MaskGeometry, RasterMask};
use segment::{
    parse_text_prompts, BatchResult, InferenceResult, Orchestrator, PromptSpec, ReplayModel, RequestOptions,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace a binary mask image into simplified polygons
    Outline {
        /// Path to the mask image; pixels above 127 are foreground
        #[arg(short, long)]
        mask: PathBuf,
        /// Simplification tolerance in pixels
        #[arg(long, default_value = "1.5")]
        tolerance: f64,
        /// Also write the polygons as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Segment one image with a text prompt
    Text {
        #[command(flatten)]
        common: CommonArgs,
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,
        /// Text description of the objects to find
        #[arg(short, long)]
        prompt: String,
    },
    /// Segment one image with box prompts
    Boxes {
        #[command(flatten)]
        common: CommonArgs,
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON array of [x1, y1, x2, y2] boxes
        #[arg(short, long)]
        boxes: String,
    },
    /// Segment several images in one model call
    Batch {
        #[command(flatten)]
        common: CommonArgs,
        /// Input images, in order
        #[arg(short, long, num_args = 1.., conflicts_with = "manifest")]
        images: Vec<PathBuf>,
        /// JSON array with one prompt (or null) per image
        #[arg(short, long, conflicts_with = "manifest")]
        prompts: Option<String>,
        /// TOML or JSON manifest listing images and prompts
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Recorded model predictions to replay
    #[arg(long)]
    predictions: PathBuf,
    /// Settings file (.toml or .json)
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Detection score threshold for this request
    #[arg(long)]
    threshold: Option<f64>,
    /// Mask probability threshold for this request
    #[arg(long)]
    mask_threshold: Option<f64>,
    /// Write the overlay image here (a directory for batches)
    #[arg(long)]
    visualize: Option<PathBuf>,
    /// Write detections as GeoJSON (single-image commands)
    #[arg(long)]
    geojson: Option<PathBuf>,
}

impl CommonArgs {
    fn options(&self) -> RequestOptions {
        RequestOptions {
            threshold: self.threshold,
            mask_threshold: self.mask_threshold,
            visualize: self.visualize.is_some(),
        }
    }

    fn orchestrator(&self) -> Result<Orchestrator<ReplayModel>> {
        let settings = load_settings(self.settings.as_deref())?;
        let model = ReplayModel::from_file(&self.predictions)
            .wrap_err_with(|| format!("loading predictions from {}", self.predictions.display()))?;
        Ok(Orchestrator::new(model, settings)?)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    // stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Outline { mask, tolerance, geojson } => outline(mask, *tolerance, geojson.as_deref()),
        Commands::Text { common, image, prompt } => {
            single(common, image, &PromptSpec::text(prompt.as_str()))
        }
        Commands::Boxes { common, image, boxes } => single(common, image, &PromptSpec::boxes_from_json(boxes)?),
        Commands::Batch {
            common,
            images,
            prompts,
            manifest,
        } => batch(common, images, prompts.as_deref(), manifest.as_deref()),
    }
}

fn outline(mask_path: &Path, tolerance: f64, geojson: Option<&Path>) -> Result<()> {
    let image = image::open(mask_path)
        .wrap_err_with(|| format!("reading mask {}", mask_path.display()))?
        .to_luma8();
    let raster = RasterMask::from_luma(&image, 127);
    let converter = GeometryConverter::builder().with_tolerance(tolerance).build()?;
    info!("{}", converter.info());

    let geometry = converter.convert(&raster)?;
    info!(
        "Traced {} polygons ({} vertices), area {}",
        geometry.polygons.len(),
        geometry.vertex_count(),
        geometry.area
    );

    if let Some(path) = geojson {
        save_geojson(path, std::slice::from_ref(&geometry), None)?;
        info!("GeoJSON written to {}", path.display());
    }
    print_json(&geometry)
}

fn single(common: &CommonArgs, image_path: &Path, prompt: &PromptSpec) -> Result<()> {
    let orchestrator = common.orchestrator()?;
    let bytes = std::fs::read(image_path).wrap_err_with(|| format!("reading image {}", image_path.display()))?;

    info!("Segmenting {} with {}", image_path.display(), prompt.describe());
    let result = orchestrator.infer(&bytes, prompt, &common.options())?;
    info!(
        "Found {} objects in {:.2} ms",
        result.num_objects, result.processing_time_ms
    );

    if let Some(path) = &common.visualize {
        match &result.visualization {
            Some(visualization) => {
                visualization.save(path)?;
                info!("Visualization written to {}", path.display());
            }
            None => warn!("No visualization produced"),
        }
    }
    if let Some(path) = &common.geojson {
        write_geojson(path, &result)?;
    }
    print_json(&result)
}

fn batch(common: &CommonArgs, images: &[PathBuf], prompts: Option<&str>, manifest: Option<&Path>) -> Result<()> {
    let (payloads, prompts) = match manifest {
        Some(path) => {
            let manifest = BatchManifest::from_file(path)?;
            (manifest.read_images()?, manifest.prompts())
        }
        None => {
            if images.is_empty() {
                return Err(eyre!("Provide --images or --manifest"));
            }
            let payloads = images
                .iter()
                .map(|path| std::fs::read(path).wrap_err_with(|| format!("reading image {}", path.display())))
                .collect::<Result<Vec<_>>>()?;
            let prompts = match prompts {
                Some(json) => parse_text_prompts(json)?,
                None => vec![None; images.len()],
            };
            (payloads, prompts)
        }
    };
    if common.geojson.is_some() {
        warn!("--geojson is ignored for batches");
    }

    let orchestrator = common.orchestrator()?;
    let result = orchestrator.infer_batch(&payloads, &prompts, &common.options())?;
    info!(
        "Processed {} images in {:.2} ms ({} failed)",
        result.total_images,
        result.total_processing_time_ms,
        result.failed_count()
    );

    if let Some(dir) = &common.visualize {
        save_batch_visualizations(dir, &result)?;
    }
    print_json(&result)
}

fn save_batch_visualizations(dir: &Path, result: &BatchResult) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for item in &result.results {
        if let Some(visualization) = &item.visualization {
            let path = dir.join(format!("{}.{}", item.index, visualization.format.extension()));
            visualization.save(&path)?;
            info!("Visualization for image {} written to {}", item.index, path.display());
        }
    }
    Ok(())
}

fn write_geojson(path: &Path, result: &InferenceResult) -> Result<()> {
    let geometries: Vec<MaskGeometry> = result.geometries();
    save_geojson(path, &geometries, Some(&result.scores()))?;
    info!("GeoJSON written to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
