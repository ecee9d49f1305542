use std::{borrow::Cow, collections::BTreeMap};

use kornia_colmap::{ColmapCamera, ColmapImage, ColmapPoint3d, Point2d, RigData};
use kornia_colmap_engine::ColmapEngine;

use crate::{InterpretedSource, ObservationSource, SceneError, SceneStats};

/// The tier holding the 3D points of a reconstruction.
#[derive(Debug)]
pub enum SceneData {
    /// Points and keypoints stay in the engine buffers.
    Accelerated(ColmapEngine),
    /// Points decoded into the heap.
    Interpreted(BTreeMap<u64, ColmapPoint3d>),
}

impl SceneData {
    /// Name of the tier, for logging.
    pub fn tier(&self) -> &'static str {
        match self {
            SceneData::Accelerated(_) => "accelerated",
            SceneData::Interpreted(_) => "interpreted",
        }
    }

    /// Run a closure against the points regardless of the tier.
    pub fn with_source<R>(
        &self,
        images: &BTreeMap<u32, ColmapImage>,
        f: impl FnOnce(&dyn ObservationSource) -> R,
    ) -> R {
        match self {
            SceneData::Accelerated(engine) => f(engine),
            SceneData::Interpreted(points3d) => f(&InterpretedSource::new(points3d, images)),
        }
    }
}

/// A loaded reconstruction with its derived statistics.
#[derive(Debug)]
pub struct Reconstruction {
    pub(crate) cameras: BTreeMap<u32, ColmapCamera>,
    pub(crate) images: BTreeMap<u32, ColmapImage>,
    pub(crate) data: SceneData,
    pub(crate) stats: SceneStats,
    pub(crate) rig_data: Option<RigData>,
}

impl Reconstruction {
    /// Cameras by id.
    pub fn cameras(&self) -> &BTreeMap<u32, ColmapCamera> {
        &self.cameras
    }

    /// Images by id.
    ///
    /// Keypoints are absent when the reconstruction is accelerated or was
    /// loaded without them, `num_points2d` is always set.
    pub fn images(&self) -> &BTreeMap<u32, ColmapImage> {
        &self.images
    }

    /// A single image.
    pub fn image(&self, image_id: u32) -> Option<&ColmapImage> {
        self.images.get(&image_id)
    }

    /// The tier holding the points.
    pub fn data(&self) -> &SceneData {
        &self.data
    }

    /// Whether the points live in the accelerated engine.
    pub fn is_accelerated(&self) -> bool {
        matches!(self.data, SceneData::Accelerated(_))
    }

    /// The engine, when the reconstruction is accelerated.
    pub fn engine(&self) -> Option<&ColmapEngine> {
        match &self.data {
            SceneData::Accelerated(engine) => Some(engine),
            SceneData::Interpreted(_) => None,
        }
    }

    /// The decoded points, only available on the interpreted tier.
    pub fn points3d(&self) -> Option<&BTreeMap<u64, ColmapPoint3d>> {
        match &self.data {
            SceneData::Accelerated(_) => None,
            SceneData::Interpreted(points3d) => Some(points3d),
        }
    }

    /// Number of 3D points.
    pub fn num_points3d(&self) -> usize {
        self.stats.global.total_points
    }

    /// A single point, borrowed on the interpreted tier and decoded on demand otherwise.
    pub fn point3d(&self, point3d_id: u64) -> Result<Option<Cow<'_, ColmapPoint3d>>, SceneError> {
        match &self.data {
            SceneData::Accelerated(engine) => Ok(engine.point3d(point3d_id)?.map(Cow::Owned)),
            SceneData::Interpreted(points3d) => Ok(points3d.get(&point3d_id).map(Cow::Borrowed)),
        }
    }

    /// Fetch the keypoints of an image from the engine.
    ///
    /// Returns `Ok(None)` on the interpreted tier, where the keypoints are
    /// either already on the image or were not loaded.
    pub fn fetch_points2d(&self, image_id: u32) -> Result<Option<Vec<Point2d>>, SceneError> {
        match &self.data {
            SceneData::Accelerated(engine) => Ok(Some(engine.fetch_points2d(image_id)?)),
            SceneData::Interpreted(_) => Ok(None),
        }
    }

    /// The keypoints of an image from wherever they are held.
    pub fn points2d(&self, image_id: u32) -> Result<Option<Cow<'_, [Point2d]>>, SceneError> {
        if let Some(points2d) = self.image(image_id).and_then(|i| i.points2d.as_deref()) {
            return Ok(Some(Cow::Borrowed(points2d)));
        }
        if !self.images.contains_key(&image_id) {
            return Ok(None);
        }
        Ok(self.fetch_points2d(image_id)?.map(Cow::Owned))
    }

    /// Derived statistics and indices.
    pub fn stats(&self) -> &SceneStats {
        &self.stats
    }

    /// Rigs and frames, when they were loaded.
    pub fn rig_data(&self) -> Option<&RigData> {
        self.rig_data.as_ref()
    }

    /// Release the engine resources, if any.
    ///
    /// Safe to call more than once. The metadata and statistics stay available.
    pub fn dispose(&mut self) {
        if let SceneData::Accelerated(engine) = &mut self.data {
            engine.dispose();
        }
    }
}
