use std::collections::{BTreeMap, HashMap, HashSet};

use kornia_colmap::{has_reprojection_error, ColmapImage, ColmapPoint3d, TrackRef};
use kornia_colmap_engine::ColmapEngine;
use serde::Serialize;

use crate::{ReferenceKind, SceneError, StatsConfig};

/// The data of a 3D point needed to compute statistics.
#[derive(Debug, Clone, Copy)]
pub struct PointObservation<'a> {
    /// Point3d id
    pub point3d_id: u64,
    /// Reprojection error, negative when it was not computed
    pub error: f64,
    /// The images observing the point
    pub track: TrackRef<'a>,
}

/// Read access to the points of a reconstruction, regardless of the tier holding them.
pub trait ObservationSource {
    /// Number of 3D points.
    fn num_points3d(&self) -> Result<usize, SceneError>;

    /// Visit every point in ascending point id order.
    fn for_each_point3d(
        &self,
        f: &mut dyn FnMut(PointObservation<'_>),
    ) -> Result<(), SceneError>;

    /// Track length of the `rank`-th point in ascending point id order.
    fn track_length(&self, rank: usize) -> Result<Option<usize>, SceneError>;

    /// Number of keypoints of an image, `None` if the image is unknown.
    fn num_points2d(&self, image_id: u32) -> Option<usize>;
}

impl ObservationSource for ColmapEngine {
    fn num_points3d(&self) -> Result<usize, SceneError> {
        Ok(ColmapEngine::num_points3d(self)?)
    }

    fn for_each_point3d(
        &self,
        f: &mut dyn FnMut(PointObservation<'_>),
    ) -> Result<(), SceneError> {
        ColmapEngine::for_each_point3d(self, |point| {
            f(PointObservation {
                point3d_id: point.point3d_id,
                error: point.error,
                track: point.track,
            })
        })?;
        Ok(())
    }

    fn track_length(&self, rank: usize) -> Result<Option<usize>, SceneError> {
        Ok(self.track_length_by_rank(rank)?)
    }

    fn num_points2d(&self, image_id: u32) -> Option<usize> {
        ColmapEngine::num_points2d(self, image_id).ok().flatten()
    }
}

/// Points and images decoded into the heap.
pub struct InterpretedSource<'a> {
    images: &'a BTreeMap<u32, ColmapImage>,
    // ascending point id order
    points3d: Vec<&'a ColmapPoint3d>,
}

impl<'a> InterpretedSource<'a> {
    /// Create a source over decoded points and images.
    pub fn new(
        points3d: &'a BTreeMap<u64, ColmapPoint3d>,
        images: &'a BTreeMap<u32, ColmapImage>,
    ) -> Self {
        Self {
            images,
            points3d: points3d.values().collect(),
        }
    }
}

impl ObservationSource for InterpretedSource<'_> {
    fn num_points3d(&self) -> Result<usize, SceneError> {
        Ok(self.points3d.len())
    }

    fn for_each_point3d(
        &self,
        f: &mut dyn FnMut(PointObservation<'_>),
    ) -> Result<(), SceneError> {
        for point in &self.points3d {
            f(PointObservation {
                point3d_id: point.point3d_id,
                error: point.error,
                track: TrackRef::Elements(&point.track),
            });
        }
        Ok(())
    }

    fn track_length(&self, rank: usize) -> Result<Option<usize>, SceneError> {
        Ok(self.points3d.get(rank).map(|p| p.track.len()))
    }

    fn num_points2d(&self, image_id: u32) -> Option<usize> {
        self.images.get(&image_id).map(|image| image.num_points2d)
    }
}

/// Statistics of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStats {
    /// Number of keypoints, matched or not
    pub num_points2d: usize,
    /// Number of distinct 3D points observed by the image
    pub num_points3d: usize,
    /// Mean reprojection error of the observed points that have one
    pub mean_error: Option<f64>,
    /// Number of other images sharing at least one point
    pub covisible_images: usize,
}

/// Minimum, maximum and mean of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeStats {
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Mean value
    pub mean: f64,
    /// Number of samples
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
struct RangeAccumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: usize,
}

impl RangeAccumulator {
    fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    #[inline]
    fn push(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    fn finish(self) -> Option<RangeStats> {
        (self.count > 0).then(|| RangeStats {
            min: self.min,
            max: self.max,
            mean: self.sum / self.count as f64,
            count: self.count,
        })
    }
}

/// A histogram with equally sized bins starting at zero and an overflow bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Width of each bin
    pub bin_width: f64,
    /// Counts per bin, bin `i` covers `[i * bin_width, (i + 1) * bin_width)`
    pub counts: Vec<u64>,
    /// Number of values beyond the last bin
    pub overflow: u64,
}

impl Histogram {
    /// Create an empty histogram covering `[0, max)`.
    pub fn new(num_bins: usize, max: f64) -> Self {
        let bin_width = if num_bins > 0 && max > 0.0 {
            max / num_bins as f64
        } else {
            0.0
        };
        Self {
            bin_width,
            counts: vec![0; if bin_width > 0.0 { num_bins } else { 0 }],
            overflow: 0,
        }
    }

    /// Count a non-negative value.
    pub fn add(&mut self, value: f64) {
        if self.bin_width <= 0.0 {
            self.overflow += 1;
            return;
        }
        let bin = (value / self.bin_width) as usize;
        match self.counts.get_mut(bin) {
            Some(count) => *count += 1,
            None => self.overflow += 1,
        }
    }

    /// Total number of values counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.overflow
    }
}

/// Statistics over the whole reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    /// Number of 3D points
    pub total_points: usize,
    /// Sum of all track lengths
    pub total_observations: usize,
    /// Number of images
    pub num_images: usize,
    /// Reprojection error over the points that have one
    pub error: Option<RangeStats>,
    /// Track length over all points
    pub track_length: Option<RangeStats>,
    /// Reprojection error histogram
    pub error_histogram: Histogram,
    /// Number of points per track length
    pub track_length_histogram: BTreeMap<usize, u64>,
}

/// Derived statistics and indices of a reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneStats {
    /// Per image statistics
    pub image_stats: BTreeMap<u32, ImageStats>,
    /// The images sharing at least one point with each image, every image has an entry
    pub connected_images: HashMap<u32, HashSet<u32>>,
    /// Global statistics
    pub global: GlobalStats,
    /// Distinct images observing each point, sorted by image id
    pub point_to_image_ids: HashMap<u64, Vec<u32>>,
    /// Points observed by each image, sorted by point id
    pub image_to_point3d_ids: HashMap<u32, Vec<u64>>,
}

#[derive(Default)]
struct ImageAccumulator {
    num_points3d: usize,
    error_sum: f64,
    error_count: usize,
}

impl SceneStats {
    /// Compute the statistics of a reconstruction.
    ///
    /// Points are visited once in ascending id order, so the result does not
    /// depend on the tier holding them. Every track element must reference a
    /// known image and one of its keypoints.
    ///
    /// # Arguments
    ///
    /// * `images` - The images of the reconstruction.
    /// * `source` - The points of the reconstruction.
    /// * `config` - Histogram parameters.
    pub fn compute(
        images: &BTreeMap<u32, ColmapImage>,
        source: &dyn ObservationSource,
        config: &StatsConfig,
    ) -> Result<Self, SceneError> {
        let now = std::time::Instant::now();
        let num_points = source.num_points3d()?;

        let mut accumulators: HashMap<u32, ImageAccumulator> = images
            .keys()
            .map(|&image_id| (image_id, ImageAccumulator::default()))
            .collect();
        let mut connected_images: HashMap<u32, HashSet<u32>> = images
            .keys()
            .map(|&image_id| (image_id, HashSet::new()))
            .collect();
        let mut image_to_point3d_ids: HashMap<u32, Vec<u64>> = images
            .keys()
            .map(|&image_id| (image_id, Vec::new()))
            .collect();
        let mut point_to_image_ids = HashMap::with_capacity(num_points);

        let mut error = RangeAccumulator::new();
        let mut error_histogram =
            Histogram::new(config.error_histogram_bins, config.error_histogram_max);
        let mut total_observations = 0;

        let mut failure = None;
        let mut observers: Vec<u32> = Vec::new();
        source.for_each_point3d(&mut |point| {
            if failure.is_some() {
                return;
            }

            observers.clear();
            for element in point.track.iter() {
                let num_points2d = match source.num_points2d(element.image_id) {
                    Some(n) if images.contains_key(&element.image_id) => n,
                    _ => {
                        failure = Some(dangling(
                            ReferenceKind::Image,
                            element.image_id as u64,
                            point.point3d_id,
                        ));
                        return;
                    }
                };
                if element.point2d_idx as usize >= num_points2d {
                    failure = Some(dangling(
                        ReferenceKind::Point2d,
                        element.point2d_idx as u64,
                        point.point3d_id,
                    ));
                    return;
                }
                observers.push(element.image_id);
            }
            observers.sort_unstable();
            observers.dedup();

            total_observations += point.track.len();
            let has_error = has_reprojection_error(point.error);
            if has_error {
                error.push(point.error);
                error_histogram.add(point.error);
            }

            for (i, &image_id) in observers.iter().enumerate() {
                if let Some(acc) = accumulators.get_mut(&image_id) {
                    acc.num_points3d += 1;
                    if has_error {
                        acc.error_sum += point.error;
                        acc.error_count += 1;
                    }
                }
                if let Some(ids) = image_to_point3d_ids.get_mut(&image_id) {
                    ids.push(point.point3d_id);
                }
                for &other in &observers[i + 1..] {
                    if let Some(set) = connected_images.get_mut(&image_id) {
                        set.insert(other);
                    }
                    if let Some(set) = connected_images.get_mut(&other) {
                        set.insert(image_id);
                    }
                }
            }
            point_to_image_ids.insert(point.point3d_id, observers.clone());
        })?;

        if let Some(err) = failure {
            return Err(err);
        }

        let mut track_length = RangeAccumulator::new();
        let mut track_length_histogram = BTreeMap::new();
        for rank in 0..num_points {
            let Some(len) = source.track_length(rank)? else {
                break;
            };
            track_length.push(len as f64);
            *track_length_histogram.entry(len).or_insert(0) += 1;
        }

        let image_stats = images
            .values()
            .map(|image| {
                let acc = accumulators.remove(&image.image_id).unwrap_or_default();
                let stats = ImageStats {
                    num_points2d: image.num_points2d,
                    num_points3d: acc.num_points3d,
                    mean_error: (acc.error_count > 0)
                        .then(|| acc.error_sum / acc.error_count as f64),
                    covisible_images: connected_images
                        .get(&image.image_id)
                        .map_or(0, |set| set.len()),
                };
                (image.image_id, stats)
            })
            .collect();

        let global = GlobalStats {
            total_points: num_points,
            total_observations,
            num_images: images.len(),
            error: error.finish(),
            track_length: track_length.finish(),
            error_histogram,
            track_length_histogram,
        };

        log::debug!(
            "computed statistics of {} images and {} points in {:?}",
            images.len(),
            num_points,
            now.elapsed()
        );

        Ok(Self {
            image_stats,
            connected_images,
            global,
            point_to_image_ids,
            image_to_point3d_ids,
        })
    }

    /// The images sharing at least one point with an image.
    pub fn connected_images(&self, image_id: u32) -> Option<&HashSet<u32>> {
        self.connected_images.get(&image_id)
    }

    /// The images observing a point.
    pub fn images_observing(&self, point3d_id: u64) -> Option<&[u32]> {
        self.point_to_image_ids.get(&point3d_id).map(Vec::as_slice)
    }

    /// The points observed by an image.
    pub fn points_observed_by(&self, image_id: u32) -> Option<&[u64]> {
        self.image_to_point3d_ids.get(&image_id).map(Vec::as_slice)
    }
}

fn dangling(kind: ReferenceKind, id: u64, point3d_id: u64) -> SceneError {
    SceneError::DanglingReference {
        kind,
        id,
        referrer: format!("point3D {point3d_id}"),
    }
}
