//! Decoders for the line oriented COLMAP text model files.
//!
//! Fields are separated by whitespace or commas and lines starting with `#` are
//! comments. Line numbers reported in errors are one-based.

use std::{collections::BTreeMap, str::FromStr};

use crate::{
    CameraModelId, ColmapCamera, ColmapError, ColmapImage, ColmapPoint3d, Frame, FrameDataId,
    ImageDecodeOptions, Location, Point2d, RecordKind, Rig, RigSensor, RigidTransform, SensorId,
    SensorType, TrackElement,
};

/// Cursor over the fields of one line.
struct Fields<'a> {
    parts: Vec<&'a str>,
    pos: usize,
    kind: RecordKind,
    line: usize,
}

impl<'a> Fields<'a> {
    fn new(text: &'a str, kind: RecordKind, line: usize) -> Self {
        Self {
            parts: split_fields(text).collect(),
            pos: 0,
            kind,
            line,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ColmapError {
        ColmapError::malformed(self.kind, Location::Line(self.line), reason)
    }

    fn remaining(&self) -> usize {
        self.parts.len() - self.pos
    }

    fn next_str(&mut self, what: &str) -> Result<&'a str, ColmapError> {
        let part = self
            .parts
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(format!("missing {what}")))?;
        self.pos += 1;
        Ok(part)
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, ColmapError>
    where
        T::Err: std::fmt::Display,
    {
        let part = self.next_str(what)?;
        part.parse::<T>()
            .map_err(|e| self.error(format!("invalid {what} `{part}`: {e}")))
    }

    /// Parse a float, rejecting NaN and infinities.
    fn next_f64(&mut self, what: &str) -> Result<f64, ColmapError> {
        let value: f64 = self.next(what)?;
        if !value.is_finite() {
            return Err(self.error(format!("non-finite {what} `{value}`")));
        }
        Ok(value)
    }

    fn next_f64_array<const N: usize>(&mut self, what: &str) -> Result<[f64; N], ColmapError> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.next_f64(what)?;
        }
        Ok(values)
    }

    fn next_sensor_id(&mut self) -> Result<SensorId, ColmapError> {
        let name = self.next_str("sensor type")?;
        let sensor_type = SensorType::from_name(name)
            .or_else(|| name.parse().ok().and_then(SensorType::from_id))
            .ok_or_else(|| self.error(format!("invalid sensor type `{name}`")))?;
        let id = self.next("sensor id")?;
        Ok(SensorId { sensor_type, id })
    }

    fn next_rigid_transform(&mut self) -> Result<RigidTransform, ColmapError> {
        Ok(RigidTransform {
            rotation: self.next_f64_array("rotation")?,
            translation: self.next_f64_array("translation")?,
        })
    }

    fn finish(&self) -> Result<(), ColmapError> {
        if self.remaining() > 0 {
            return Err(self.error(format!("{} unexpected trailing fields", self.remaining())));
        }
        Ok(())
    }
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
}

/// The text of `line` starting at `field`, which must be a subslice of it.
fn raw_remainder<'a>(line: &'a str, field: &'a str) -> &'a str {
    let start = field.as_ptr() as usize - line.as_ptr() as usize;
    &line[start..]
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Non-empty, non-comment lines with their one-based line number.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty() && !is_comment(line))
}

fn insert_unique<K: Ord + std::fmt::Display, T>(
    records: &mut BTreeMap<K, T>,
    id: K,
    record: T,
    kind: RecordKind,
    line: usize,
) -> Result<(), ColmapError> {
    if records.contains_key(&id) {
        return Err(ColmapError::malformed(
            kind,
            Location::Line(line),
            format!("duplicate {kind} id {id}"),
        ));
    }
    records.insert(id, record);
    Ok(())
}

/// Parse a camera line.
///
/// `CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]`
fn parse_camera_line(line: &str, line_no: usize) -> Result<ColmapCamera, ColmapError> {
    let mut fields = Fields::new(line, RecordKind::Camera, line_no);
    let camera_id = fields.next("camera id")?;
    let model_name = fields.next_str("camera model")?;
    let model_id =
        CameraModelId::from_name(model_name).ok_or_else(|| ColmapError::UnknownCameraModelName {
            name: model_name.to_string(),
            line: line_no,
        })?;
    let width = fields.next("width")?;
    let height = fields.next("height")?;

    // NOTE: the number of parameters depends on the camera model
    let found = fields.remaining();
    if found != model_id.num_params() {
        return Err(ColmapError::InvalidNumCameraParams {
            camera_id,
            model: model_id,
            expected: model_id.num_params(),
            found,
            line: line_no,
        });
    }
    let params = (0..found)
        .map(|_| fields.next_f64("camera parameter"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ColmapCamera {
        camera_id,
        model_id,
        width,
        height,
        params,
    })
}

/// Parse a point3D line.
///
/// `POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)`
fn parse_point3d_line(line: &str, line_no: usize) -> Result<ColmapPoint3d, ColmapError> {
    let mut fields = Fields::new(line, RecordKind::Point3d, line_no);
    let point3d_id = fields.next("point3D id")?;
    let xyz = fields.next_f64_array("coordinate")?;
    let rgb = [
        fields.next("color")?,
        fields.next("color")?,
        fields.next("color")?,
    ];
    let error = fields.next_f64("error")?;

    if fields.remaining() % 2 != 0 {
        return Err(fields.error("track elements must come in (IMAGE_ID, POINT2D_IDX) pairs"));
    }
    let mut track = Vec::with_capacity(fields.remaining() / 2);
    while fields.remaining() > 0 {
        track.push(TrackElement {
            image_id: fields.next("track image id")?,
            point2d_idx: fields.next("track point2D index")?,
        });
    }

    Ok(ColmapPoint3d {
        point3d_id,
        xyz,
        rgb,
        error,
        track,
    })
}

/// Parse the two lines of an image record.
///
/// `IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME`
/// `POINTS2D[] as (X, Y, POINT3D_ID)`
fn parse_image_lines(
    header: (usize, &str),
    points: Option<(usize, &str)>,
    options: ImageDecodeOptions,
) -> Result<ColmapImage, ColmapError> {
    let (header_no, header) = header;
    let mut fields = Fields::new(header, RecordKind::Image, header_no);
    let image_id = fields.next("image id")?;
    let qvec = fields.next_f64_array("rotation")?;
    let tvec = fields.next_f64_array("translation")?;
    let camera_id = fields.next("camera id")?;
    let first = fields.next_str("name")?;
    // names may contain spaces and commas, keep the raw remainder of the line
    let name = raw_remainder(header, first).trim_end().to_string();

    let (points_no, points) = points.unwrap_or((header_no, ""));
    let mut fields = Fields::new(points, RecordKind::Image, points_no);
    if fields.remaining() % 3 != 0 {
        return Err(fields.error("keypoints must come in (X, Y, POINT3D_ID) triples"));
    }
    let num_points2d = fields.remaining() / 3;
    let points2d = if options.keep_points2d {
        let mut points2d = Vec::with_capacity(num_points2d);
        while fields.remaining() > 0 {
            let x = fields.next_f64("keypoint x")?;
            let y = fields.next_f64("keypoint y")?;
            let point3d_id = fields.next("keypoint point3D id")?;
            let point = Point2d::try_from_raw(x, y, point3d_id).ok_or_else(|| {
                fields.error(format!("invalid keypoint point3D id {point3d_id}"))
            })?;
            points2d.push(point);
        }
        Some(points2d)
    } else {
        None
    };

    Ok(ColmapImage {
        image_id,
        camera_id,
        name,
        qvec,
        tvec,
        num_points2d,
        points2d,
    })
}

/// Parse a rig line.
///
/// `RIG_ID, NUM_SENSORS, [REF_SENSOR_TYPE, REF_SENSOR_ID], SENSORS[] as (TYPE, ID, HAS_POSE, [QW, QX, QY, QZ, TX, TY, TZ])`
fn parse_rig_line(line: &str, line_no: usize) -> Result<Rig, ColmapError> {
    let mut fields = Fields::new(line, RecordKind::Rig, line_no);
    let rig_id = fields.next("rig id")?;
    let num_sensors: u32 = fields.next("number of sensors")?;

    let mut rig = Rig {
        rig_id,
        ref_sensor: None,
        sensors: Vec::new(),
    };
    if num_sensors > 0 {
        rig.ref_sensor = Some(fields.next_sensor_id()?);
        for _ in 1..num_sensors {
            let sensor_id = fields.next_sensor_id()?;
            let sensor_from_rig = match fields.next::<u8>("has_pose flag")? {
                0 => None,
                1 => Some(fields.next_rigid_transform()?),
                flag => return Err(fields.error(format!("invalid has_pose flag {flag}"))),
            };
            rig.sensors.push(RigSensor {
                sensor_id,
                sensor_from_rig,
            });
        }
    }
    fields.finish()?;
    Ok(rig)
}

/// Parse a frame line.
///
/// `FRAME_ID, RIG_ID, QW, QX, QY, QZ, TX, TY, TZ, NUM_DATA_IDS, DATA_IDS[] as (SENSOR_TYPE, SENSOR_ID, DATA_ID)`
fn parse_frame_line(line: &str, line_no: usize) -> Result<Frame, ColmapError> {
    let mut fields = Fields::new(line, RecordKind::Frame, line_no);
    let frame_id = fields.next("frame id")?;
    let rig_id = fields.next("rig id")?;
    let rig_from_world = fields.next_rigid_transform()?;
    let num_data_ids: usize = fields.next("number of data ids")?;
    let data_ids = (0..num_data_ids)
        .map(|_| -> Result<FrameDataId, ColmapError> {
            Ok(FrameDataId {
                sensor_id: fields.next_sensor_id()?,
                data_id: fields.next("data id")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    fields.finish()?;

    Ok(Frame {
        frame_id,
        rig_id,
        rig_from_world,
        data_ids,
    })
}

/// Decode the contents of a `cameras.txt` file.
///
/// # Arguments
///
/// * `text` - The contents of the cameras.txt file.
///
/// # Returns
///
/// The cameras keyed by camera id.
pub fn decode_cameras_text(text: &str) -> Result<BTreeMap<u32, ColmapCamera>, ColmapError> {
    let mut cameras = BTreeMap::new();
    for (line_no, line) in data_lines(text) {
        let camera = parse_camera_line(line, line_no)?;
        insert_unique(&mut cameras, camera.camera_id, camera, RecordKind::Camera, line_no)?;
    }
    Ok(cameras)
}

/// Decode the contents of a `points3D.txt` file.
///
/// # Arguments
///
/// * `text` - The contents of the points3D.txt file.
///
/// # Returns
///
/// The 3D points keyed by point id.
pub fn decode_points3d_text(text: &str) -> Result<BTreeMap<u64, ColmapPoint3d>, ColmapError> {
    let mut points = BTreeMap::new();
    for (line_no, line) in data_lines(text) {
        let point = parse_point3d_line(line, line_no)?;
        insert_unique(&mut points, point.point3d_id, point, RecordKind::Point3d, line_no)?;
    }
    Ok(points)
}

/// Decode the contents of an `images.txt` file.
///
/// Each image spans two lines. The keypoint line is always the line following
/// the header, even when it is empty.
///
/// # Arguments
///
/// * `text` - The contents of the images.txt file.
/// * `options` - Whether to retain the keypoints of each image.
///
/// # Returns
///
/// The images keyed by image id.
pub fn decode_images_text(
    text: &str,
    options: ImageDecodeOptions,
) -> Result<BTreeMap<u32, ColmapImage>, ColmapError> {
    let mut images = BTreeMap::new();
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !is_comment(line));

    while let Some((header_no, header)) = lines.next() {
        if header.trim().is_empty() {
            continue;
        }
        let image = parse_image_lines((header_no, header), lines.next(), options)?;
        insert_unique(&mut images, image.image_id, image, RecordKind::Image, header_no)?;
    }
    Ok(images)
}

/// Decode the contents of a `rigs.txt` file into rigs keyed by rig id.
pub fn decode_rigs_text(text: &str) -> Result<BTreeMap<u32, Rig>, ColmapError> {
    let mut rigs = BTreeMap::new();
    for (line_no, line) in data_lines(text) {
        let rig = parse_rig_line(line, line_no)?;
        insert_unique(&mut rigs, rig.rig_id, rig, RecordKind::Rig, line_no)?;
    }
    Ok(rigs)
}

/// Decode the contents of a `frames.txt` file into frames keyed by frame id.
pub fn decode_frames_text(text: &str) -> Result<BTreeMap<u32, Frame>, ColmapError> {
    let mut frames = BTreeMap::new();
    for (line_no, line) in data_lines(text) {
        let frame = parse_frame_line(line, line_no)?;
        insert_unique(&mut frames, frame.frame_id, frame, RecordKind::Frame, line_no)?;
    }
    Ok(frames)
}
