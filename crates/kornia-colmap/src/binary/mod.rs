//! Decoders for the little-endian COLMAP binary model files.
//!
//! Every file starts with a `u64` record count followed by the records, with no
//! padding. See <https://colmap.github.io/format.html#binary-file-format>.

mod reader;
pub use reader::ByteReader;

use std::collections::BTreeMap;

use crate::{
    CameraModelId, ColmapCamera, ColmapError, ColmapImage, ColmapPoint3d, Frame, FrameDataId,
    ImageDecodeOptions, Point2d, RecordKind, Rig, RigSensor, RigidTransform, SensorId, SensorType,
    TrackElement,
};

/// Fixed part of a camera record: id, model, width, height.
pub const CAMERA_HEADER_SIZE: usize = 4 + 4 + 8 + 8;
/// Smallest image record: id, pose, camera id, empty name, keypoint count.
pub const MIN_IMAGE_RECORD_SIZE: usize = 4 + 7 * 8 + 4 + 1 + 8;
/// Size of one keypoint: x, y, point3D id.
pub const POINT2D_SIZE: usize = 8 + 8 + 8;
/// Fixed part of a point3D record: id, xyz, rgb, error, track length.
pub const POINT3D_HEADER_SIZE: usize = 8 + 3 * 8 + 3 + 8 + 8;
/// Size of one track element: image id, keypoint index.
pub const TRACK_ELEMENT_SIZE: usize = 4 + 4;
/// Smallest rig record: id and sensor count.
const MIN_RIG_RECORD_SIZE: usize = 4 + 4;
/// Smallest frame record: ids, pose and data id count.
const MIN_FRAME_RECORD_SIZE: usize = 4 + 4 + 7 * 8 + 4;

/// Read one camera record.
pub fn read_camera_record(reader: &mut ByteReader) -> Result<ColmapCamera, ColmapError> {
    let camera_id = reader.read_u32()?;
    let location = reader.location();
    let model_id = reader.read_i32()?;
    let model_id = CameraModelId::from_id(model_id)
        .ok_or(ColmapError::UnknownCameraModel { model_id, location })?;
    let width = reader.read_u64()?;
    let height = reader.read_u64()?;
    let params = (0..model_id.num_params())
        .map(|_| reader.read_f64())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ColmapCamera {
        camera_id,
        model_id,
        width,
        height,
        params,
    })
}

/// Read one image record.
///
/// When `keep_points2d` is false the keypoints are skipped and only their count
/// is retained.
pub fn read_image_record(
    reader: &mut ByteReader,
    keep_points2d: bool,
) -> Result<ColmapImage, ColmapError> {
    let image_id = reader.read_u32()?;
    let qvec = reader.read_f64_array::<4>()?;
    let tvec = reader.read_f64_array::<3>()?;
    let camera_id = reader.read_u32()?;
    let name = reader.read_cstr()?;
    let num_points2d = reader.read_len_u64()?;

    let points2d = if keep_points2d {
        if num_points2d > reader.remaining() / POINT2D_SIZE {
            return Err(reader.error(format!(
                "{num_points2d} keypoints exceed the remaining buffer"
            )));
        }
        let mut points = Vec::with_capacity(num_points2d);
        for _ in 0..num_points2d {
            let x = reader.read_f64()?;
            let y = reader.read_f64()?;
            let point3d_id = reader.read_i64()?;
            let point = Point2d::try_from_raw(x, y, point3d_id).ok_or_else(|| {
                reader.error(format!("invalid keypoint point3D id {point3d_id}"))
            })?;
            points.push(point);
        }
        Some(points)
    } else {
        reader.skip_elements(num_points2d as u64, POINT2D_SIZE)?;
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

/// Read one track element, rejecting negative ids.
#[inline]
pub fn read_track_element(reader: &mut ByteReader) -> Result<TrackElement, ColmapError> {
    let image_id = reader.read_i32()?;
    let point2d_idx = reader.read_i32()?;
    if image_id < 0 || point2d_idx < 0 {
        return Err(reader.error(format!(
            "negative track element ({image_id}, {point2d_idx})"
        )));
    }
    Ok(TrackElement {
        image_id: image_id as u32,
        point2d_idx: point2d_idx as u32,
    })
}

/// Read one point3D record.
pub fn read_point3d_record(reader: &mut ByteReader) -> Result<ColmapPoint3d, ColmapError> {
    let point3d_id = reader.read_u64()?;
    let xyz = reader.read_f64_array::<3>()?;
    let rgb = [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?];
    let error = reader.read_f64()?;
    let track_len = reader.read_len_u64()?;
    if track_len > reader.remaining() / TRACK_ELEMENT_SIZE {
        return Err(reader.error(format!(
            "track of length {track_len} exceeds the remaining buffer"
        )));
    }
    let track = (0..track_len)
        .map(|_| read_track_element(reader))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ColmapPoint3d {
        point3d_id,
        xyz,
        rgb,
        error,
        track,
    })
}

fn read_sensor_id(reader: &mut ByteReader) -> Result<SensorId, ColmapError> {
    let sensor_type = reader.read_i32()?;
    let sensor_type = SensorType::from_id(sensor_type)
        .ok_or_else(|| reader.error(format!("invalid sensor type {sensor_type}")))?;
    let id = reader.read_u32()?;
    Ok(SensorId { sensor_type, id })
}

fn read_rigid_transform(reader: &mut ByteReader) -> Result<RigidTransform, ColmapError> {
    Ok(RigidTransform {
        rotation: reader.read_f64_array::<4>()?,
        translation: reader.read_f64_array::<3>()?,
    })
}

/// Read one rig record.
pub fn read_rig_record(reader: &mut ByteReader) -> Result<Rig, ColmapError> {
    let rig_id = reader.read_u32()?;
    let num_sensors = reader.read_u32()?;
    if num_sensors == 0 {
        return Ok(Rig {
            rig_id,
            ref_sensor: None,
            sensors: Vec::new(),
        });
    }

    let ref_sensor = read_sensor_id(reader)?;
    let mut sensors = Vec::new();
    for _ in 1..num_sensors {
        let sensor_id = read_sensor_id(reader)?;
        let sensor_from_rig = match reader.read_u8()? {
            0 => None,
            1 => Some(read_rigid_transform(reader)?),
            flag => return Err(reader.error(format!("invalid has_pose flag {flag}"))),
        };
        sensors.push(RigSensor {
            sensor_id,
            sensor_from_rig,
        });
    }

    Ok(Rig {
        rig_id,
        ref_sensor: Some(ref_sensor),
        sensors,
    })
}

/// Read one frame record.
pub fn read_frame_record(reader: &mut ByteReader) -> Result<Frame, ColmapError> {
    let frame_id = reader.read_u32()?;
    let rig_id = reader.read_u32()?;
    let rig_from_world = read_rigid_transform(reader)?;
    let num_data_ids = reader.read_u32()?;
    let data_ids = (0..num_data_ids)
        .map(|_| -> Result<FrameDataId, ColmapError> {
            Ok(FrameDataId {
                sensor_id: read_sensor_id(reader)?,
                data_id: reader.read_u64()?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Frame {
        frame_id,
        rig_id,
        rig_from_world,
        data_ids,
    })
}

/// Decode all the records of a binary model file into a map keyed by id.
///
/// Duplicate ids are rejected, trailing bytes are logged and ignored.
fn decode_records<K, T>(
    buf: &[u8],
    kind: RecordKind,
    min_record_size: usize,
    mut read_record: impl FnMut(&mut ByteReader) -> Result<T, ColmapError>,
    key: impl Fn(&T) -> K,
) -> Result<BTreeMap<K, T>, ColmapError>
where
    K: Ord + std::fmt::Display,
{
    let mut reader = ByteReader::new(buf, kind);
    let (count, _) = reader.read_record_count(min_record_size)?;

    let mut records = BTreeMap::new();
    for index in 0..count {
        reader.set_record(index as usize);
        let location = reader.location();
        let record = read_record(&mut reader)?;
        let id = key(&record);
        if records.contains_key(&id) {
            return Err(ColmapError::malformed(
                kind,
                location,
                format!("duplicate {kind} id {id}"),
            ));
        }
        records.insert(id, record);
    }

    if reader.remaining() > 0 {
        log::warn!(
            "ignoring {} trailing bytes after {count} {kind} records",
            reader.remaining()
        );
    }

    Ok(records)
}

/// Decode a `cameras.bin` buffer.
///
/// # Arguments
///
/// * `buf` - The contents of the cameras.bin file.
///
/// # Returns
///
/// The cameras keyed by camera id.
pub fn decode_cameras_binary(buf: &[u8]) -> Result<BTreeMap<u32, ColmapCamera>, ColmapError> {
    decode_records(
        buf,
        RecordKind::Camera,
        CAMERA_HEADER_SIZE,
        read_camera_record,
        |camera| camera.camera_id,
    )
}

/// Decode an `images.bin` buffer.
///
/// # Arguments
///
/// * `buf` - The contents of the images.bin file.
/// * `options` - Whether to retain the keypoints of each image.
///
/// # Returns
///
/// The images keyed by image id.
pub fn decode_images_binary(
    buf: &[u8],
    options: ImageDecodeOptions,
) -> Result<BTreeMap<u32, ColmapImage>, ColmapError> {
    decode_records(
        buf,
        RecordKind::Image,
        MIN_IMAGE_RECORD_SIZE,
        |reader| read_image_record(reader, options.keep_points2d),
        |image| image.image_id,
    )
}

/// Decode a `points3D.bin` buffer.
///
/// # Arguments
///
/// * `buf` - The contents of the points3D.bin file.
///
/// # Returns
///
/// The 3D points keyed by point id.
pub fn decode_points3d_binary(buf: &[u8]) -> Result<BTreeMap<u64, ColmapPoint3d>, ColmapError> {
    decode_records(
        buf,
        RecordKind::Point3d,
        POINT3D_HEADER_SIZE,
        read_point3d_record,
        |point| point.point3d_id,
    )
}

/// Decode a `rigs.bin` buffer into rigs keyed by rig id.
pub fn decode_rigs_binary(buf: &[u8]) -> Result<BTreeMap<u32, Rig>, ColmapError> {
    decode_records(
        buf,
        RecordKind::Rig,
        MIN_RIG_RECORD_SIZE,
        read_rig_record,
        |rig| rig.rig_id,
    )
}

/// Decode a `frames.bin` buffer into frames keyed by frame id.
pub fn decode_frames_binary(buf: &[u8]) -> Result<BTreeMap<u32, Frame>, ColmapError> {
    decode_records(
        buf,
        RecordKind::Frame,
        MIN_FRAME_RECORD_SIZE,
        read_frame_record,
        |frame| frame.frame_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, Location};

    fn pinhole(camera_id: u32) -> ColmapCamera {
        ColmapCamera {
            camera_id,
            model_id: CameraModelId::Pinhole,
            width: 640,
            height: 480,
            params: vec![500.0, 501.0, 320.0, 240.0],
        }
    }

    #[test]
    fn unknown_camera_model_is_rejected() {
        let mut buf = testing::encode_cameras_binary(&[pinhole(1)]);
        // model id lives right after the u64 count and the u32 camera id
        buf[12..16].copy_from_slice(&42i32.to_le_bytes());
        match decode_cameras_binary(&buf) {
            Err(ColmapError::UnknownCameraModel { model_id, location }) => {
                assert_eq!(model_id, 42);
                assert_eq!(location, Location::Binary { record: 0, offset: 12 });
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn truncated_camera_reports_record() {
        let buf = testing::encode_cameras_binary(&[pinhole(1), pinhole(2)]);
        let truncated = &buf[..buf.len() - 4];
        match decode_cameras_binary(truncated) {
            Err(ColmapError::MalformedRecord { kind, location, .. }) => {
                assert_eq!(kind, RecordKind::Camera);
                assert!(matches!(location, Location::Binary { record: 1, .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn duplicate_camera_id_is_rejected() {
        let buf = testing::encode_cameras_binary(&[pinhole(1), pinhole(1)]);
        assert!(matches!(
            decode_cameras_binary(&buf),
            Err(ColmapError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn images_without_keypoints_keep_the_count() -> Result<(), ColmapError> {
        let image = ColmapImage {
            image_id: 5,
            camera_id: 1,
            name: "dir/img.png".to_string(),
            qvec: [1.0, 0.0, 0.0, 0.0],
            tvec: [0.0, 0.0, 1.0],
            num_points2d: 2,
            points2d: Some(vec![
                Point2d::from_raw(1.0, 2.0, -1),
                Point2d::from_raw(3.0, 4.0, 9),
            ]),
        };
        let buf = testing::encode_images_binary(std::slice::from_ref(&image));

        let full = decode_images_binary(&buf, ImageDecodeOptions::default())?;
        assert_eq!(full[&5], image);

        let lazy = decode_images_binary(
            &buf,
            ImageDecodeOptions {
                keep_points2d: false,
            },
        )?;
        assert_eq!(lazy[&5].num_points2d, 2);
        assert_eq!(lazy[&5].points2d, None);
        assert_eq!(lazy[&5].name, "dir/img.png");
        Ok(())
    }

    #[test]
    fn negative_keypoint_reference_is_rejected() {
        let image = ColmapImage {
            image_id: 5,
            camera_id: 1,
            name: "a.png".to_string(),
            qvec: [1.0, 0.0, 0.0, 0.0],
            tvec: [0.0; 3],
            num_points2d: 1,
            points2d: Some(vec![Point2d::from_raw(1.0, 2.0, 3)]),
        };
        let mut buf = testing::encode_images_binary(&[image]);
        let len = buf.len();
        buf[len - 8..].copy_from_slice(&(-7i64).to_le_bytes());

        match decode_images_binary(&buf, ImageDecodeOptions::default()) {
            Err(ColmapError::MalformedRecord { kind, location, .. }) => {
                assert_eq!(kind, RecordKind::Image);
                assert_eq!(
                    location,
                    Location::Binary {
                        record: 0,
                        offset: len
                    }
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn negative_track_element_is_rejected() {
        let point = ColmapPoint3d {
            point3d_id: 1,
            xyz: [0.0; 3],
            rgb: [0; 3],
            error: 0.1,
            track: vec![TrackElement {
                image_id: 1,
                point2d_idx: 0,
            }],
        };
        let mut buf = testing::encode_points3d_binary(&[point]);
        let len = buf.len();
        buf[len - 8..len - 4].copy_from_slice(&(-2i32).to_le_bytes());
        assert!(matches!(
            decode_points3d_binary(&buf),
            Err(ColmapError::MalformedRecord {
                kind: RecordKind::Point3d,
                ..
            })
        ));
    }

    #[test]
    fn huge_track_length_does_not_allocate() {
        let mut buf = 1u64.to_le_bytes().to_vec();
        buf.extend_from_slice(&7u64.to_le_bytes());
        buf.extend_from_slice(&[0u8; 3 * 8 + 3 + 8]);
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(decode_points3d_binary(&buf).is_err());
    }

    #[test]
    fn rigs_and_frames() -> Result<(), ColmapError> {
        let camera = |id| SensorId {
            sensor_type: SensorType::Camera,
            id,
        };
        let rig = Rig {
            rig_id: 1,
            ref_sensor: Some(camera(1)),
            sensors: vec![
                RigSensor {
                    sensor_id: camera(2),
                    sensor_from_rig: Some(RigidTransform {
                        rotation: [1.0, 0.0, 0.0, 0.0],
                        translation: [0.1, 0.0, 0.0],
                    }),
                },
                RigSensor {
                    sensor_id: SensorId {
                        sensor_type: SensorType::Imu,
                        id: 7,
                    },
                    sensor_from_rig: None,
                },
            ],
        };
        let empty_rig = Rig {
            rig_id: 2,
            ref_sensor: None,
            sensors: vec![],
        };
        let frame = Frame {
            frame_id: 3,
            rig_id: 1,
            rig_from_world: RigidTransform::default(),
            data_ids: vec![
                FrameDataId {
                    sensor_id: camera(1),
                    data_id: 10,
                },
                FrameDataId {
                    sensor_id: camera(2),
                    data_id: 11,
                },
            ],
        };

        let rigs = decode_rigs_binary(&testing::encode_rigs_binary(&[rig.clone(), empty_rig.clone()]))?;
        assert_eq!(rigs[&1], rig);
        assert_eq!(rigs[&2], empty_rig);

        let frames = decode_frames_binary(&testing::encode_frames_binary(&[frame.clone()]))?;
        assert_eq!(frames[&3], frame);
        Ok(())
    }

    #[test]
    fn empty_file_has_no_records() -> Result<(), ColmapError> {
        let buf = 0u64.to_le_bytes();
        assert!(decode_cameras_binary(&buf)?.is_empty());
        assert!(decode_points3d_binary(&buf)?.is_empty());
        assert!(decode_cameras_binary(&[]).is_err());
        Ok(())
    }
}
