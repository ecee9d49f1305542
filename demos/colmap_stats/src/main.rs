use argh::FromArgs;
use std::path::{Path, PathBuf};

use kornia_colmap::{ColmapSource, FileFormat, SharedBuffer};
use kornia_scene::{
    resolve_model_directory, GlobalStats, ReconstructionBuilder, ReconstructionConfig,
    ResolvedFile, SceneFiles,
};

#[derive(FromArgs)]
/// Find a COLMAP model inside a directory and print its statistics
struct Args {
    /// path to the directory holding the reconstruction
    #[argh(positional)]
    path: PathBuf,

    /// path to a JSON loading configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// include per image statistics in the output
    #[argh(switch)]
    per_image: bool,
}

#[derive(serde::Serialize)]
struct Report<'a> {
    directory: &'a str,
    tier: &'static str,
    num_cameras: usize,
    warnings: Vec<String>,
    global: &'a GlobalStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<ImageReport<'a>>>,
}

#[derive(serde::Serialize)]
struct ImageReport<'a> {
    image_id: u32,
    name: &'a str,
    num_points2d: usize,
    num_points3d: usize,
    mean_error: Option<f64>,
    covisible_images: usize,
}

fn read_source(path: &Path, format: FileFormat) -> std::io::Result<ColmapSource> {
    match format {
        FileFormat::Binary => {
            let file = std::fs::File::open(path)?;
            // the model files are not expected to change while they are mapped
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            Ok(ColmapSource::Binary(SharedBuffer::new(mmap)))
        }
        FileFormat::Text => Ok(ColmapSource::text(std::fs::read_to_string(path)?)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ReconstructionConfig::default(),
    };

    // list every file below the root, paths relative to it
    let listing = walkdir::WalkDir::new(&args.path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(&args.path).ok()?;
            Some((relative.to_string_lossy().into_owned(), entry.into_path()))
        })
        .collect::<Vec<_>>();
    log::debug!("found {} files below {}", listing.len(), args.path.display());

    let Some(model) = resolve_model_directory(listing) else {
        return Err(format!("no COLMAP model found in {}", args.path.display()).into());
    };
    log::info!("reading model from '{}'", model.directory);

    let files = SceneFiles::load_resolved(&model, |resolved: &ResolvedFile<PathBuf>| {
        read_source(&resolved.file, resolved.format)
    })?;

    let outcome = ReconstructionBuilder::new(config).build(&files)?;
    let reconstruction = &outcome.reconstruction;
    let stats = reconstruction.stats();

    let images = args.per_image.then(|| {
        reconstruction
            .images()
            .values()
            .filter_map(|image| {
                let image_stats = stats.image_stats.get(&image.image_id)?;
                Some(ImageReport {
                    image_id: image.image_id,
                    name: &image.name,
                    num_points2d: image_stats.num_points2d,
                    num_points3d: image_stats.num_points3d,
                    mean_error: image_stats.mean_error,
                    covisible_images: image_stats.covisible_images,
                })
            })
            .collect::<Vec<_>>()
    });

    let report = Report {
        directory: &model.directory,
        tier: reconstruction.data().tier(),
        num_cameras: reconstruction.cameras().len(),
        warnings: outcome.warnings.iter().map(|w| w.to_string()).collect(),
        global: &stats.global,
        images,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
