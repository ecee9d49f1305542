use std::collections::BTreeMap;

use kornia_colmap::{
    binary, ColmapCamera, ColmapImage, ColmapPoint3d, ColmapSource, Point2d, RigData,
    SharedBuffer, TrackRef,
};

use crate::{
    index::{ImageIndex, PointIndex},
    EngineError,
};

/// The binary buffers of the three mandatory model files.
#[derive(Debug, Clone)]
pub struct EngineInputs {
    /// Contents of cameras.bin
    pub cameras: SharedBuffer,
    /// Contents of images.bin
    pub images: SharedBuffer,
    /// Contents of points3D.bin
    pub points3d: SharedBuffer,
}

impl EngineInputs {
    /// Collect the engine inputs from model file sources.
    ///
    /// Returns `None` if any of the sources is text encoded, the engine only
    /// accepts binary files.
    pub fn from_sources(
        cameras: &ColmapSource,
        images: &ColmapSource,
        points3d: &ColmapSource,
    ) -> Option<Self> {
        Some(Self {
            cameras: cameras.as_binary()?.clone(),
            images: images.as_binary()?.clone(),
            points3d: points3d.as_binary()?.clone(),
        })
    }
}

/// A 3D point borrowed from the engine.
#[derive(Debug, Clone, Copy)]
pub struct PointRef<'a> {
    /// Point3d id
    pub point3d_id: u64,
    /// x, y, z coordinates
    pub xyz: [f64; 3],
    /// rgb color
    pub rgb: [u8; 3],
    /// Reprojection error, negative when it was not computed
    pub error: f64,
    /// Track, still packed in the model buffer
    pub track: TrackRef<'a>,
}

impl PointRef<'_> {
    /// Materialize the point.
    pub fn to_point3d(&self) -> ColmapPoint3d {
        ColmapPoint3d {
            point3d_id: self.point3d_id,
            xyz: self.xyz,
            rgb: self.rgb,
            error: self.error,
            track: self.track.to_vec(),
        }
    }
}

/// What a successful engine load hands back to the caller.
pub struct EngineLoad {
    /// The engine, owning the point data and the image keypoints
    pub engine: ColmapEngine,
    /// Cameras, decoded eagerly
    pub cameras: BTreeMap<u32, ColmapCamera>,
    /// Image metadata without keypoints, only `num_points2d` is set
    pub images: BTreeMap<u32, ColmapImage>,
}

struct EngineState {
    images_buffer: SharedBuffer,
    points_buffer: SharedBuffer,
    images: ImageIndex,
    points: PointIndex,
}

/// Decoding engine operating directly on binary model buffers.
///
/// Points are kept in a compact columnar index whose tracks stay in the model
/// buffer, and image keypoints are only decoded when requested with
/// [`ColmapEngine::fetch_points2d`]. With memory-mapped buffers this keeps the
/// heap footprint of very large models bounded.
///
/// The engine owns its buffers until [`ColmapEngine::dispose`] is called or it
/// is dropped. Disposing twice is a no-op, any query after disposal fails with
/// [`EngineError::Disposed`].
pub struct ColmapEngine {
    state: Option<EngineState>,
}

impl ColmapEngine {
    /// Whether the engine can run on this target.
    ///
    /// Offsets into multi-gigabyte model files need a 64-bit address space.
    pub fn is_supported() -> bool {
        cfg!(target_pointer_width = "64")
    }

    /// Parse the three mandatory model files.
    ///
    /// Cameras and points are indexed eagerly, images lazily.
    ///
    /// # Arguments
    ///
    /// * `inputs` - The binary buffers of cameras, images and points3D.
    ///
    /// # Returns
    ///
    /// The engine together with the cameras and the image metadata.
    pub fn load(inputs: EngineInputs) -> Result<EngineLoad, EngineError> {
        if !Self::is_supported() {
            return Err(EngineError::Unsupported);
        }

        let now = std::time::Instant::now();
        let cameras = binary::decode_cameras_binary(&inputs.cameras)?;
        let (images_scan, points_scan) = rayon::join(
            || ImageIndex::scan(&inputs.images),
            || PointIndex::scan(&inputs.points3d),
        );
        let (images_index, images) = images_scan?;
        let points = points_scan?;

        log::debug!(
            "engine indexed {} cameras, {} images and {} points in {:?}",
            cameras.len(),
            images.len(),
            points.len(),
            now.elapsed()
        );

        let engine = Self {
            state: Some(EngineState {
                images_buffer: inputs.images,
                points_buffer: inputs.points3d,
                images: images_index,
                points,
            }),
        };

        Ok(EngineLoad {
            engine,
            cameras,
            images,
        })
    }

    fn state(&self) -> Result<&EngineState, EngineError> {
        self.state.as_ref().ok_or(EngineError::Disposed)
    }

    /// Release the buffers and indices held by the engine.
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(state) = self.state.take() {
            log::debug!(
                "disposing engine with {} images and {} points",
                state.images.len(),
                state.points.len()
            );
        }
    }

    /// Whether the engine has been disposed.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.state.is_none()
    }

    /// Number of indexed 3D points.
    pub fn num_points3d(&self) -> Result<usize, EngineError> {
        Ok(self.state()?.points.len())
    }

    /// Number of indexed images.
    pub fn num_images(&self) -> Result<usize, EngineError> {
        Ok(self.state()?.images.len())
    }

    /// Visit every point in ascending point id order.
    pub fn for_each_point3d(&self, mut f: impl FnMut(PointRef<'_>)) -> Result<(), EngineError> {
        let state = self.state()?;
        for record in state.points.sorted() {
            f(point_ref(state, record));
        }
        Ok(())
    }

    /// The `rank`-th point in ascending point id order.
    pub fn point3d_by_rank(&self, rank: usize) -> Result<Option<PointRef<'_>>, EngineError> {
        let state = self.state()?;
        Ok(state
            .points
            .record_at_rank(rank)
            .map(|record| point_ref(state, record)))
    }

    /// Look up a point by id without materializing its track.
    pub fn point3d_ref(&self, point3d_id: u64) -> Result<Option<PointRef<'_>>, EngineError> {
        let state = self.state()?;
        Ok(state
            .points
            .find(point3d_id)
            .map(|record| point_ref(state, record)))
    }

    /// Materialize a single point.
    pub fn point3d(&self, point3d_id: u64) -> Result<Option<ColmapPoint3d>, EngineError> {
        Ok(self.point3d_ref(point3d_id)?.map(|p| p.to_point3d()))
    }

    /// Track length of a point.
    pub fn track_length(&self, point3d_id: u64) -> Result<Option<usize>, EngineError> {
        let state = self.state()?;
        Ok(state
            .points
            .find(point3d_id)
            .map(|record| state.points.track_len(record)))
    }

    /// Track length of the `rank`-th point in ascending point id order.
    pub fn track_length_by_rank(&self, rank: usize) -> Result<Option<usize>, EngineError> {
        let state = self.state()?;
        Ok(state
            .points
            .record_at_rank(rank)
            .map(|record| state.points.track_len(record)))
    }

    /// Point positions in file order, ready for rendering.
    pub fn point_positions(&self) -> Result<&[[f64; 3]], EngineError> {
        Ok(&self.state()?.points.positions)
    }

    /// Point colors in file order, matching [`ColmapEngine::point_positions`].
    pub fn point_colors(&self) -> Result<&[[u8; 3]], EngineError> {
        Ok(&self.state()?.points.colors)
    }

    /// Point reprojection errors in file order.
    pub fn point_errors(&self) -> Result<&[f64], EngineError> {
        Ok(&self.state()?.points.errors)
    }

    /// Number of keypoints of an image.
    pub fn num_points2d(&self, image_id: u32) -> Result<Option<usize>, EngineError> {
        Ok(self.state()?.images.num_points2d(image_id))
    }

    /// Decode the keypoints of one image from the engine buffer.
    pub fn fetch_points2d(&self, image_id: u32) -> Result<Vec<Point2d>, EngineError> {
        let state = self.state()?;
        let points2d = state
            .images
            .points2d(&state.images_buffer, image_id)
            .ok_or(EngineError::ImageNotFound(image_id))??;
        Ok(points2d)
    }

    /// Decode rigs and frames from their binary buffers.
    pub fn decode_rig_data(
        &self,
        rigs: &SharedBuffer,
        frames: &SharedBuffer,
    ) -> Result<RigData, EngineError> {
        self.state()?;
        let (rigs, frames) = rayon::join(
            || binary::decode_rigs_binary(rigs),
            || binary::decode_frames_binary(frames),
        );
        Ok(RigData {
            rigs: rigs?,
            frames: frames?,
        })
    }

    /// Heap bytes held by the engine indices, excluding the model buffers.
    pub fn index_size(&self) -> usize {
        self.state
            .as_ref()
            .map_or(0, |state| state.images.heap_size() + state.points.heap_size())
    }

    /// Bytes of the model buffers retained by the engine.
    pub fn buffer_size(&self) -> usize {
        self.state.as_ref().map_or(0, |state| {
            state.images_buffer.len() + state.points_buffer.len()
        })
    }
}

fn point_ref(state: &EngineState, record: usize) -> PointRef<'_> {
    let points = &state.points;
    PointRef {
        point3d_id: points.ids[record],
        xyz: points.positions[record],
        rgb: points.colors[record],
        error: points.errors[record],
        track: points.track(&state.points_buffer, record),
    }
}

impl std::fmt::Debug for ColmapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => f
                .debug_struct("ColmapEngine")
                .field("num_images", &state.images.len())
                .field("num_points3d", &state.points.len())
                .finish(),
            None => f.write_str("ColmapEngine(disposed)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kornia_colmap::testing::SyntheticScene;

    fn inputs(scene: &SyntheticScene) -> EngineInputs {
        EngineInputs {
            cameras: scene.cameras_binary().into(),
            images: scene.images_binary().into(),
            points3d: scene.points3d_binary().into(),
        }
    }

    #[test]
    fn dispose_is_idempotent() -> Result<(), EngineError> {
        let scene = SyntheticScene::generate(4, 16, 5);
        let EngineLoad { mut engine, .. } = ColmapEngine::load(inputs(&scene))?;
        assert_eq!(engine.num_points3d()?, 16);
        assert!(engine.index_size() > 0);

        engine.dispose();
        assert!(engine.is_disposed());
        engine.dispose();
        assert!(matches!(engine.num_points3d(), Err(EngineError::Disposed)));
        assert!(matches!(engine.fetch_points2d(1), Err(EngineError::Disposed)));
        assert_eq!(engine.index_size(), 0);
        assert_eq!(engine.buffer_size(), 0);
        Ok(())
    }

    #[test]
    fn text_sources_are_not_applicable() {
        let binary = ColmapSource::binary(vec![0u8; 8]);
        let text = ColmapSource::text("");
        assert!(EngineInputs::from_sources(&binary, &binary, &binary).is_some());
        assert!(EngineInputs::from_sources(&binary, &text, &binary).is_none());
        assert!(EngineInputs::from_sources(&text, &binary, &binary).is_none());
    }

    #[test]
    fn unknown_image_is_reported() -> Result<(), EngineError> {
        let scene = SyntheticScene::generate(2, 4, 5);
        let load = ColmapEngine::load(inputs(&scene))?;
        assert!(matches!(
            load.engine.fetch_points2d(1000),
            Err(EngineError::ImageNotFound(1000))
        ));
        Ok(())
    }
}
