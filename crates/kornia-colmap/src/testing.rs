//! Binary encoders mirroring the decoders in [`crate::binary`].
//!
//! These are only meant to produce synthetic model files for tests and
//! benchmarks, images without retained keypoints are encoded with none.

use crate::{
    CameraModelId, ColmapCamera, ColmapImage, ColmapPoint3d, Frame, Point2d, Rig, RigidTransform,
    SensorId, TrackElement,
};

fn put_sensor_id(buf: &mut Vec<u8>, sensor_id: &SensorId) {
    buf.extend_from_slice(&(sensor_id.sensor_type as i32).to_le_bytes());
    buf.extend_from_slice(&sensor_id.id.to_le_bytes());
}

fn put_f64s(buf: &mut Vec<u8>, values: &[f64]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_rigid_transform(buf: &mut Vec<u8>, transform: &RigidTransform) {
    put_f64s(buf, &transform.rotation);
    put_f64s(buf, &transform.translation);
}

/// Encode cameras in the `cameras.bin` layout.
pub fn encode_cameras_binary(cameras: &[ColmapCamera]) -> Vec<u8> {
    let mut buf = (cameras.len() as u64).to_le_bytes().to_vec();
    for camera in cameras {
        buf.extend_from_slice(&camera.camera_id.to_le_bytes());
        buf.extend_from_slice(&camera.model_id.id().to_le_bytes());
        buf.extend_from_slice(&camera.width.to_le_bytes());
        buf.extend_from_slice(&camera.height.to_le_bytes());
        put_f64s(&mut buf, &camera.params);
    }
    buf
}

/// Encode images in the `images.bin` layout.
pub fn encode_images_binary(images: &[ColmapImage]) -> Vec<u8> {
    let mut buf = (images.len() as u64).to_le_bytes().to_vec();
    for image in images {
        buf.extend_from_slice(&image.image_id.to_le_bytes());
        put_f64s(&mut buf, &image.qvec);
        put_f64s(&mut buf, &image.tvec);
        buf.extend_from_slice(&image.camera_id.to_le_bytes());
        buf.extend_from_slice(image.name.as_bytes());
        buf.push(0);
        let points2d = image.points2d.as_deref().unwrap_or_default();
        buf.extend_from_slice(&(points2d.len() as u64).to_le_bytes());
        for p in points2d {
            put_f64s(&mut buf, &[p.x, p.y]);
            buf.extend_from_slice(&p.raw_point3d_id().to_le_bytes());
        }
    }
    buf
}

/// Encode 3D points in the `points3D.bin` layout.
pub fn encode_points3d_binary(points: &[ColmapPoint3d]) -> Vec<u8> {
    let mut buf = (points.len() as u64).to_le_bytes().to_vec();
    for point in points {
        buf.extend_from_slice(&point.point3d_id.to_le_bytes());
        put_f64s(&mut buf, &point.xyz);
        buf.extend_from_slice(&point.rgb);
        buf.extend_from_slice(&point.error.to_le_bytes());
        buf.extend_from_slice(&(point.track.len() as u64).to_le_bytes());
        for element in &point.track {
            buf.extend_from_slice(&(element.image_id as i32).to_le_bytes());
            buf.extend_from_slice(&(element.point2d_idx as i32).to_le_bytes());
        }
    }
    buf
}

/// Encode rigs in the `rigs.bin` layout.
pub fn encode_rigs_binary(rigs: &[Rig]) -> Vec<u8> {
    let mut buf = (rigs.len() as u64).to_le_bytes().to_vec();
    for rig in rigs {
        buf.extend_from_slice(&rig.rig_id.to_le_bytes());
        buf.extend_from_slice(&(rig.num_sensors() as u32).to_le_bytes());
        if let Some(ref_sensor) = &rig.ref_sensor {
            put_sensor_id(&mut buf, ref_sensor);
        }
        for sensor in &rig.sensors {
            put_sensor_id(&mut buf, &sensor.sensor_id);
            match &sensor.sensor_from_rig {
                Some(transform) => {
                    buf.push(1);
                    put_rigid_transform(&mut buf, transform);
                }
                None => buf.push(0),
            }
        }
    }
    buf
}

/// Encode frames in the `frames.bin` layout.
pub fn encode_frames_binary(frames: &[Frame]) -> Vec<u8> {
    let mut buf = (frames.len() as u64).to_le_bytes().to_vec();
    for frame in frames {
        buf.extend_from_slice(&frame.frame_id.to_le_bytes());
        buf.extend_from_slice(&frame.rig_id.to_le_bytes());
        put_rigid_transform(&mut buf, &frame.rig_from_world);
        buf.extend_from_slice(&(frame.data_ids.len() as u32).to_le_bytes());
        for data_id in &frame.data_ids {
            put_sensor_id(&mut buf, &data_id.sensor_id);
            buf.extend_from_slice(&data_id.data_id.to_le_bytes());
        }
    }
    buf
}

/// A consistent synthetic reconstruction.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// One camera per known camera model
    pub cameras: Vec<ColmapCamera>,
    /// Images with full keypoints
    pub images: Vec<ColmapImage>,
    /// Points whose tracks reference the image keypoints
    pub points3d: Vec<ColmapPoint3d>,
}

impl SyntheticScene {
    /// Generate a deterministic scene.
    ///
    /// Every camera model is used at least once when `num_images >= 12`. Every
    /// seventh point carries the negative "no error" sentinel and every image
    /// has one unmatched keypoint. Point ids are emitted in shuffled order.
    pub fn generate(num_images: usize, num_points: usize, seed: u64) -> Self {
        let mut rng = XorShift(seed.max(1));

        let cameras = CameraModelId::ALL
            .iter()
            .enumerate()
            .map(|(idx, &model_id)| ColmapCamera {
                camera_id: idx as u32 + 1,
                model_id,
                width: 1920,
                height: 1080,
                params: (0..model_id.num_params())
                    .map(|p| 100.0 + p as f64 * 0.5)
                    .collect(),
            })
            .collect::<Vec<_>>();

        let mut images = (0..num_images)
            .map(|idx| ColmapImage {
                image_id: idx as u32 + 1,
                camera_id: (idx % cameras.len()) as u32 + 1,
                name: format!("images/{idx:05}.jpg"),
                qvec: [1.0, 0.0, 0.0, 0.0],
                tvec: [idx as f64, 0.0, 0.0],
                num_points2d: 0,
                points2d: Some(Vec::new()),
            })
            .collect::<Vec<_>>();

        let mut points3d = Vec::with_capacity(num_points);
        for idx in 0..num_points {
            let point3d_id = idx as u64 * 7919 + 1;
            let track_len = if num_images == 0 {
                0
            } else {
                2 + (rng.next() as usize % 4).min(num_images.saturating_sub(2))
            };
            let mut track = Vec::with_capacity(track_len);
            let start = rng.next() as usize % num_images.max(1);
            for k in 0..track_len.min(num_images) {
                let image = &mut images[(start + k) % num_images];
                let keypoints = image.points2d.get_or_insert_with(Vec::new);
                track.push(TrackElement {
                    image_id: image.image_id,
                    point2d_idx: keypoints.len() as u32,
                });
                keypoints.push(Point2d {
                    x: (rng.next() % 1920) as f64 + 0.5,
                    y: (rng.next() % 1080) as f64 + 0.25,
                    point3d_id: Some(point3d_id),
                });
            }
            let error = if idx % 7 == 0 {
                -1.0
            } else {
                (rng.next() % 1000) as f64 / 400.0
            };
            points3d.push(ColmapPoint3d {
                point3d_id,
                xyz: [idx as f64, (idx % 13) as f64, 1.0 + (idx % 5) as f64],
                rgb: [(idx % 256) as u8, 10, 200],
                error,
                track,
            });
        }

        for image in images.iter_mut() {
            let keypoints = image.points2d.get_or_insert_with(Vec::new);
            keypoints.push(Point2d::from_raw(1.0, 1.0, Point2d::UNMATCHED));
            image.num_points2d = keypoints.len();
        }

        // shuffle the on-disk order of the points
        for i in (1..points3d.len()).rev() {
            let j = rng.next() as usize % (i + 1);
            points3d.swap(i, j);
        }

        Self {
            cameras,
            images,
            points3d,
        }
    }

    /// Encode the cameras in the binary layout.
    pub fn cameras_binary(&self) -> Vec<u8> {
        encode_cameras_binary(&self.cameras)
    }

    /// Encode the images in the binary layout.
    pub fn images_binary(&self) -> Vec<u8> {
        encode_images_binary(&self.images)
    }

    /// Encode the points in the binary layout.
    pub fn points3d_binary(&self) -> Vec<u8> {
        encode_points3d_binary(&self.points3d)
    }
}

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
