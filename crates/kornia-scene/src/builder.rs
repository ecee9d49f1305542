use std::collections::BTreeMap;

use kornia_colmap::{
    decode_cameras, decode_images, decode_points3d, decode_rig_data, ColmapCamera, ColmapImage,
    ColmapSource, ImageDecodeOptions, RigData,
};
use kornia_colmap_engine::{ColmapEngine, EngineInputs, EngineLoad};

use crate::{
    EngineMode, LoadWarning, ModelFile, Reconstruction, ReconstructionConfig, ReferenceKind,
    SceneData, SceneError, SceneFiles, SceneStats,
};

/// A reconstruction together with the non-fatal conditions met while loading it.
#[derive(Debug)]
pub struct LoadOutcome {
    /// The loaded reconstruction
    pub reconstruction: Reconstruction,
    /// Warnings, already logged
    pub warnings: Vec<LoadWarning>,
}

struct Decoded {
    cameras: BTreeMap<u32, ColmapCamera>,
    images: BTreeMap<u32, ColmapImage>,
    data: SceneData,
}

/// Builds reconstructions from model files, choosing the decoding tier per load.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionBuilder {
    config: ReconstructionConfig,
}

impl ReconstructionBuilder {
    /// Create a builder with the given configuration.
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    /// The builder configuration.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Decode the model files and compute the statistics.
    ///
    /// The accelerated engine is tried first when the three mandatory files are
    /// binary. If it is unavailable or fails, the interpreted decoders are used.
    /// Rig data is attached only when both rig files decode and reference valid
    /// rigs and sensors, it is dropped with a warning otherwise.
    ///
    /// # Arguments
    ///
    /// * `files` - The model file contents.
    ///
    /// # Returns
    ///
    /// The reconstruction and the warnings raised while loading.
    pub fn build(&self, files: &SceneFiles) -> Result<LoadOutcome, SceneError> {
        let (Some(cameras), Some(images), Some(points3d)) =
            (&files.cameras, &files.images, &files.points3d)
        else {
            return Err(SceneError::MissingRequiredFiles(files.missing_required()));
        };

        let now = std::time::Instant::now();
        let mut warnings = Vec::new();

        let decoded = match self.try_engine(cameras, images, points3d, &mut warnings) {
            Some(decoded) => decoded,
            None => self.decode_interpreted(cameras, images, points3d, &mut warnings)?,
        };

        check_camera_references(&decoded.cameras, &decoded.images)?;

        let stats = decoded.data.with_source(&decoded.images, |source| {
            SceneStats::compute(&decoded.images, source, &self.config.stats)
        })?;

        let rig_data = if self.config.load_rig_data {
            self.load_rig_data(files, &decoded.data, &mut warnings)
        } else {
            None
        };

        log::info!(
            "loaded {} reconstruction with {} cameras, {} images and {} points in {:?}",
            decoded.data.tier(),
            decoded.cameras.len(),
            decoded.images.len(),
            stats.global.total_points,
            now.elapsed()
        );

        Ok(LoadOutcome {
            reconstruction: Reconstruction {
                cameras: decoded.cameras,
                images: decoded.images,
                data: decoded.data,
                stats,
                rig_data,
            },
            warnings,
        })
    }

    fn try_engine(
        &self,
        cameras: &ColmapSource,
        images: &ColmapSource,
        points3d: &ColmapSource,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<Decoded> {
        let inputs = self.engine_inputs(
            ColmapEngine::is_supported(),
            cameras,
            images,
            points3d,
            warnings,
        )?;

        match ColmapEngine::load(inputs) {
            Ok(EngineLoad {
                engine,
                cameras,
                images,
            }) => Some(Decoded {
                cameras,
                images,
                data: SceneData::Accelerated(engine),
            }),
            Err(err) => {
                warn(warnings, LoadWarning::EngineFailed(err.to_string()));
                None
            }
        }
    }

    // text inputs are not applicable and never warn, only an unsupported target does
    fn engine_inputs(
        &self,
        supported: bool,
        cameras: &ColmapSource,
        images: &ColmapSource,
        points3d: &ColmapSource,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<EngineInputs> {
        if self.config.engine == EngineMode::Disabled {
            log::debug!("accelerated engine disabled by configuration");
            return None;
        }

        let Some(inputs) = EngineInputs::from_sources(cameras, images, points3d) else {
            log::debug!("text model files, using the interpreted decoders");
            return None;
        };

        if !supported {
            warn(
                warnings,
                LoadWarning::EngineUnavailable("not supported on this target".to_string()),
            );
            return None;
        }
        Some(inputs)
    }

    fn decode_interpreted(
        &self,
        cameras: &ColmapSource,
        images: &ColmapSource,
        points3d: &ColmapSource,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<Decoded, SceneError> {
        let images_bytes = images.len_bytes();
        let keep_points2d =
            !(images.is_binary() && images_bytes >= self.config.lazy_points2d_threshold_bytes);
        if !keep_points2d {
            warn(warnings, LoadWarning::Points2dDropped { images_bytes });
        }
        let options = ImageDecodeOptions { keep_points2d };

        let (cameras_result, (images_result, points_result)) = if self.config.parallel_decode {
            rayon::join(
                || decode_cameras(cameras),
                || rayon::join(|| decode_images(images, options), || decode_points3d(points3d)),
            )
        } else {
            let cameras_result = decode_cameras(cameras);
            let images_result = decode_images(images, options);
            let points_result = decode_points3d(points3d);
            (cameras_result, (images_result, points_result))
        };

        Ok(Decoded {
            cameras: cameras_result.map_err(SceneError::decode(ModelFile::Cameras))?,
            images: images_result.map_err(SceneError::decode(ModelFile::Images))?,
            data: SceneData::Interpreted(
                points_result.map_err(SceneError::decode(ModelFile::Points3d))?,
            ),
        })
    }

    fn load_rig_data(
        &self,
        files: &SceneFiles,
        data: &SceneData,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<RigData> {
        let (rigs, frames) = match (&files.rigs, &files.frames) {
            (Some(rigs), Some(frames)) => (rigs, frames),
            (None, None) => return None,
            (Some(_), None) => {
                warn(
                    warnings,
                    LoadWarning::PartialRigData("frames file is missing".to_string()),
                );
                return None;
            }
            (None, Some(_)) => {
                warn(
                    warnings,
                    LoadWarning::PartialRigData("rigs file is missing".to_string()),
                );
                return None;
            }
        };

        let decoded = match (data, rigs.as_binary(), frames.as_binary()) {
            (SceneData::Accelerated(engine), Some(rigs), Some(frames)) => engine
                .decode_rig_data(rigs, frames)
                .map_err(|err| err.to_string()),
            _ => decode_rig_data(rigs, frames).map_err(|err| err.to_string()),
        };

        match decoded.and_then(|rig_data| validate_rig_data(&rig_data).map(|_| rig_data)) {
            Ok(rig_data) => {
                log::debug!(
                    "loaded {} rigs and {} frames",
                    rig_data.rigs.len(),
                    rig_data.frames.len()
                );
                Some(rig_data)
            }
            Err(reason) => {
                warn(warnings, LoadWarning::PartialRigData(reason));
                None
            }
        }
    }
}

fn warn(warnings: &mut Vec<LoadWarning>, warning: LoadWarning) {
    log::warn!("{warning}");
    warnings.push(warning);
}

fn check_camera_references(
    cameras: &BTreeMap<u32, ColmapCamera>,
    images: &BTreeMap<u32, ColmapImage>,
) -> Result<(), SceneError> {
    match images
        .values()
        .find(|image| !cameras.contains_key(&image.camera_id))
    {
        Some(image) => Err(SceneError::DanglingReference {
            kind: ReferenceKind::Camera,
            id: image.camera_id as u64,
            referrer: format!("image {}", image.image_id),
        }),
        None => Ok(()),
    }
}

/// Check that every frame references a known rig and only sensors declared on it.
pub fn validate_rig_data(rig_data: &RigData) -> Result<(), String> {
    for frame in rig_data.frames.values() {
        let Some(rig) = rig_data.rigs.get(&frame.rig_id) else {
            return Err(SceneError::DanglingReference {
                kind: ReferenceKind::Rig,
                id: frame.rig_id as u64,
                referrer: format!("frame {}", frame.frame_id),
            }
            .to_string());
        };
        if let Some(data_id) = frame
            .data_ids
            .iter()
            .find(|data_id| !rig.has_sensor(&data_id.sensor_id))
        {
            return Err(SceneError::DanglingReference {
                kind: ReferenceKind::Sensor,
                id: data_id.sensor_id.id as u64,
                referrer: format!("frame {}", frame.frame_id),
            }
            .to_string());
        }
    }
    Ok(())
}
