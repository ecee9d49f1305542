use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Represents a Colmap camera model id.
///
/// The discriminant is the integer id stored in `cameras.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraModelId {
    /// Simple pinhole camera model: f, cx, cy
    SimplePinhole = 0,
    /// Pinhole camera model: fx, fy, cx, cy
    Pinhole = 1,
    /// Simplified radial camera model: f, cx, cy, k
    SimpleRadial = 2,
    /// Radial camera model: f, cx, cy, k1, k2
    Radial = 3,
    /// OpenCV camera model: fx, fy, cx, cy, k1, k2, p1, p2
    OpenCV = 4,
    /// OpenCV fisheye camera model: fx, fy, cx, cy, k1, k2, k3, k4
    OpenCVFisheye = 5,
    /// Full OpenCV camera model: fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6
    FullOpenCV = 6,
    /// Field of view camera model: fx, fy, cx, cy, omega
    FOV = 7,
    /// Simple radial fisheye camera model: f, cx, cy, k
    SimpleRadialFisheye = 8,
    /// Radial fisheye camera model: f, cx, cy, k1, k2
    RadialFisheye = 9,
    /// Thin prism fisheye camera model: fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, sx1, sy1
    ThinPrismFisheye = 10,
    /// Radial-tangential thin prism fisheye camera model (16 parameters)
    RadTanThinPrismFisheye = 11,
}

impl CameraModelId {
    /// All known camera models ordered by id.
    pub const ALL: [CameraModelId; 12] = [
        CameraModelId::SimplePinhole,
        CameraModelId::Pinhole,
        CameraModelId::SimpleRadial,
        CameraModelId::Radial,
        CameraModelId::OpenCV,
        CameraModelId::OpenCVFisheye,
        CameraModelId::FullOpenCV,
        CameraModelId::FOV,
        CameraModelId::SimpleRadialFisheye,
        CameraModelId::RadialFisheye,
        CameraModelId::ThinPrismFisheye,
        CameraModelId::RadTanThinPrismFisheye,
    ];

    /// Look up a camera model from its integer id.
    pub fn from_id(model_id: i32) -> Option<Self> {
        usize::try_from(model_id)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Look up a camera model from its COLMAP name, e.g. `PINHOLE`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|model| model.name() == name)
    }

    /// The integer id of the camera model.
    #[inline]
    pub fn id(self) -> i32 {
        self as i32
    }

    /// The COLMAP name of the camera model.
    pub fn name(self) -> &'static str {
        match self {
            CameraModelId::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModelId::Pinhole => "PINHOLE",
            CameraModelId::SimpleRadial => "SIMPLE_RADIAL",
            CameraModelId::Radial => "RADIAL",
            CameraModelId::OpenCV => "OPENCV",
            CameraModelId::OpenCVFisheye => "OPENCV_FISHEYE",
            CameraModelId::FullOpenCV => "FULL_OPENCV",
            CameraModelId::FOV => "FOV",
            CameraModelId::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            CameraModelId::RadialFisheye => "RADIAL_FISHEYE",
            CameraModelId::ThinPrismFisheye => "THIN_PRISM_FISHEYE",
            CameraModelId::RadTanThinPrismFisheye => "RAD_TAN_THIN_PRISM_FISHEYE",
        }
    }

    /// The number of parameters mandated by the camera model.
    pub fn num_params(self) -> usize {
        match self {
            CameraModelId::SimplePinhole => 3,
            CameraModelId::Pinhole => 4,
            CameraModelId::SimpleRadial => 4,
            CameraModelId::Radial => 5,
            CameraModelId::OpenCV => 8,
            CameraModelId::OpenCVFisheye => 8,
            CameraModelId::FullOpenCV => 12,
            CameraModelId::FOV => 5,
            CameraModelId::SimpleRadialFisheye => 4,
            CameraModelId::RadialFisheye => 5,
            CameraModelId::ThinPrismFisheye => 12,
            CameraModelId::RadTanThinPrismFisheye => 16,
        }
    }
}

impl std::fmt::Display for CameraModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Represents a camera in the Colmap system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColmapCamera {
    /// Camera id
    pub camera_id: u32,
    /// Camera model id
    pub model_id: CameraModelId,
    /// Image width
    pub width: u64,
    /// Image height
    pub height: u64,
    /// Camera parameters, laid out as mandated by `model_id`
    pub params: Vec<f64>,
}

/// A 2D keypoint observed in an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2d {
    /// x pixel coordinate
    pub x: f64,
    /// y pixel coordinate
    pub y: f64,
    /// The observed 3D point, `None` when the keypoint is unmatched.
    pub point3d_id: Option<u64>,
}

impl Point2d {
    /// The sentinel used on disk for an unmatched keypoint.
    pub const UNMATCHED: i64 = -1;

    /// Build a keypoint from the raw on-disk point3D id.
    ///
    /// Any negative id is treated as unmatched, decoders use
    /// [`Point2d::try_from_raw`] to reject negative ids other than the sentinel.
    #[inline]
    pub fn from_raw(x: f64, y: f64, point3d_id: i64) -> Self {
        Self {
            x,
            y,
            point3d_id: u64::try_from(point3d_id).ok(),
        }
    }

    /// Build a keypoint from the raw on-disk point3D id.
    ///
    /// Returns `None` for a negative id other than [`Point2d::UNMATCHED`].
    #[inline]
    pub fn try_from_raw(x: f64, y: f64, point3d_id: i64) -> Option<Self> {
        (point3d_id >= 0 || point3d_id == Self::UNMATCHED).then(|| Self::from_raw(x, y, point3d_id))
    }

    /// The on-disk representation of the point3D reference.
    #[inline]
    pub fn raw_point3d_id(&self) -> i64 {
        self.point3d_id.map_or(Self::UNMATCHED, |id| id as i64)
    }
}

/// Represents an image in the Colmap system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColmapImage {
    /// Image id
    pub image_id: u32,
    /// Camera id
    pub camera_id: u32,
    /// Image name, relative to the image root
    pub name: String,
    /// Rotation quaternion
    pub qvec: [f64; 4], // qw, qx, qy, qz
    /// Translation
    pub tvec: [f64; 3], // x, y, z
    /// Number of 2D keypoints in the image, always present.
    pub num_points2d: usize,
    /// The 2D keypoints, `None` when they were not retained to bound memory.
    pub points2d: Option<Vec<Point2d>>,
}

impl ColmapImage {
    /// Whether the keypoints of the image were retained.
    #[inline]
    pub fn has_points2d(&self) -> bool {
        self.points2d.is_some()
    }

    /// Number of retained keypoints with a 3D correspondence.
    ///
    /// Returns `None` if the keypoints were not retained.
    pub fn num_matched_points2d(&self) -> Option<usize> {
        self.points2d
            .as_ref()
            .map(|points| points.iter().filter(|p| p.point3d_id.is_some()).count())
    }

    /// The rotation matrix encoded by `qvec` in row-major order.
    pub fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        quaternion_to_rotation(&self.qvec)
    }

    /// The camera projection centre in world coordinates, `-R^T t`.
    pub fn projection_center(&self) -> [f64; 3] {
        let r = self.rotation_matrix();
        let t = &self.tvec;
        let mut center = [0.0; 3];
        for (i, c) in center.iter_mut().enumerate() {
            *c = -(r[0][i] * t[0] + r[1][i] * t[1] + r[2][i] * t[2]);
        }
        center
    }
}

/// Convert a (w, x, y, z) quaternion into a row-major rotation matrix.
///
/// The quaternion is normalized first.
pub fn quaternion_to_rotation(q: &[f64; 4]) -> [[f64; 3]; 3] {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    }
    let (w, x, y, z) = (q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm);
    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ]
}

/// One observation of a 3D point: the observing image and the keypoint index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackElement {
    /// Image id
    pub image_id: u32,
    /// Index into the keypoints of the image
    pub point2d_idx: u32,
}

/// Represents a 3D point in the Colmap system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColmapPoint3d {
    /// Point3d id
    pub point3d_id: u64,
    /// x, y, z coordinates
    pub xyz: [f64; 3],
    /// rgb color
    pub rgb: [u8; 3],
    /// Reprojection error, negative when it was not computed
    pub error: f64,
    /// Track
    pub track: Vec<TrackElement>,
}

impl ColmapPoint3d {
    /// Whether the reprojection error was computed for this point.
    #[inline]
    pub fn has_error(&self) -> bool {
        has_reprojection_error(self.error)
    }
}

/// Whether a stored reprojection error is a real value and not the negative sentinel.
#[inline]
pub fn has_reprojection_error(error: f64) -> bool {
    error >= 0.0 && error.is_finite()
}

/// The kind of sensor mounted on a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorType {
    /// A camera, data ids are image ids
    Camera = 0,
    /// An inertial measurement unit
    Imu = 1,
}

impl SensorType {
    /// Look up a sensor type from its integer id.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(SensorType::Camera),
            1 => Some(SensorType::Imu),
            _ => None,
        }
    }

    /// Look up a sensor type from its COLMAP name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CAMERA" => Some(SensorType::Camera),
            "IMU" => Some(SensorType::Imu),
            _ => None,
        }
    }

    /// The COLMAP name of the sensor type.
    pub fn name(self) -> &'static str {
        match self {
            SensorType::Camera => "CAMERA",
            SensorType::Imu => "IMU",
        }
    }
}

/// Identifies a sensor on a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId {
    /// Sensor type
    pub sensor_type: SensorType,
    /// Sensor id, a camera id for camera sensors
    pub id: u32,
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.sensor_type.name(), self.id)
    }
}

/// A rigid transform stored as a (w, x, y, z) quaternion and a translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation quaternion
    pub rotation: [f64; 4],
    /// Translation
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0],
            translation: [0.0; 3],
        }
    }
}

/// A non-reference sensor of a rig and its optional fixed pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigSensor {
    /// Sensor id
    pub sensor_id: SensorId,
    /// Pose of the sensor relative to the reference sensor, if known
    pub sensor_from_rig: Option<RigidTransform>,
}

/// A multi-sensor rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rig {
    /// Rig id
    pub rig_id: u32,
    /// Reference sensor, absent for an empty rig
    pub ref_sensor: Option<SensorId>,
    /// Non-reference sensors
    pub sensors: Vec<RigSensor>,
}

impl Rig {
    /// Total number of sensors including the reference sensor.
    pub fn num_sensors(&self) -> usize {
        self.sensors.len() + usize::from(self.ref_sensor.is_some())
    }

    /// Whether the sensor is declared on the rig.
    pub fn has_sensor(&self, sensor_id: &SensorId) -> bool {
        self.ref_sensor.as_ref() == Some(sensor_id)
            || self.sensors.iter().any(|s| &s.sensor_id == sensor_id)
    }
}

/// Binds one sensor of a frame to its measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDataId {
    /// Sensor id
    pub sensor_id: SensorId,
    /// Measurement id, an image id for camera sensors
    pub data_id: u64,
}

/// A rig instance captured at one moment in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame id
    pub frame_id: u32,
    /// Rig id
    pub rig_id: u32,
    /// Pose of the rig
    pub rig_from_world: RigidTransform,
    /// Per-sensor measurements
    pub data_ids: Vec<FrameDataId>,
}

/// Rigs and frames of a reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigData {
    /// Rigs by id
    pub rigs: BTreeMap<u32, Rig>,
    /// Frames by id
    pub frames: BTreeMap<u32, Frame>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn camera_model_lookup() {
        for (idx, model) in CameraModelId::ALL.iter().enumerate() {
            assert_eq!(model.id(), idx as i32);
            assert_eq!(CameraModelId::from_id(model.id()), Some(*model));
            assert_eq!(CameraModelId::from_name(model.name()), Some(*model));
        }
        assert_eq!(CameraModelId::from_id(-1), None);
        assert_eq!(CameraModelId::from_id(12), None);
        assert_eq!(CameraModelId::from_name("pinhole"), None);
        assert_eq!(CameraModelId::Pinhole.num_params(), 4);
    }

    #[test]
    fn point2d_sentinel() {
        let p = Point2d::from_raw(1.0, 2.0, -1);
        assert_eq!(p.point3d_id, None);
        assert_eq!(p.raw_point3d_id(), -1);
        let p = Point2d::from_raw(1.0, 2.0, 42);
        assert_eq!(p.point3d_id, Some(42));
        assert_eq!(p.raw_point3d_id(), 42);
    }

    #[test]
    fn projection_center_identity_rotation() {
        let image = ColmapImage {
            image_id: 1,
            camera_id: 1,
            name: "a.jpg".to_string(),
            qvec: [1.0, 0.0, 0.0, 0.0],
            tvec: [1.0, -2.0, 3.0],
            num_points2d: 0,
            points2d: Some(vec![]),
        };
        let c = image.projection_center();
        assert_relative_eq!(c[0], -1.0);
        assert_relative_eq!(c[1], 2.0);
        assert_relative_eq!(c[2], -3.0);
    }

    #[test]
    fn quaternion_rotation_about_z() {
        let half = std::f64::consts::FRAC_PI_4;
        let r = quaternion_to_rotation(&[half.cos(), 0.0, 0.0, half.sin()]);
        assert_relative_eq!(r[0][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(r[0][1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(r[1][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[2][2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rig_sensor_membership() {
        let camera = |id| SensorId {
            sensor_type: SensorType::Camera,
            id,
        };
        let rig = Rig {
            rig_id: 1,
            ref_sensor: Some(camera(1)),
            sensors: vec![RigSensor {
                sensor_id: camera(2),
                sensor_from_rig: None,
            }],
        };
        assert_eq!(rig.num_sensors(), 2);
        assert!(rig.has_sensor(&camera(1)));
        assert!(rig.has_sensor(&camera(2)));
        assert!(!rig.has_sensor(&camera(3)));
    }

    #[test]
    fn reprojection_error_sentinel() {
        assert!(has_reprojection_error(0.0));
        assert!(has_reprojection_error(0.5));
        assert!(!has_reprojection_error(-1.0));
        assert!(!has_reprojection_error(f64::NAN));
    }
}
