use std::collections::{BTreeMap, HashMap};

use kornia_colmap::{
    binary::{
        read_image_record, read_track_element, ByteReader, MIN_IMAGE_RECORD_SIZE, POINT2D_SIZE,
        POINT3D_HEADER_SIZE, TRACK_ELEMENT_SIZE,
    },
    ColmapError, ColmapImage, Location, Point2d, RecordKind, TrackRef,
};

/// Columnar index over the records of a `points3D.bin` buffer.
///
/// Tracks are not copied, only their byte range in the buffer is recorded.
pub(crate) struct PointIndex {
    pub ids: Vec<u64>,
    pub positions: Vec<[f64; 3]>,
    pub colors: Vec<[u8; 3]>,
    pub errors: Vec<f64>,
    track_offsets: Vec<usize>,
    track_lengths: Vec<u32>,
    // record indices sorted by point id
    order: Vec<u32>,
}

impl PointIndex {
    /// Scan the buffer, validating every record and track element.
    pub fn scan(buf: &[u8]) -> Result<Self, ColmapError> {
        let mut reader = ByteReader::new(buf, RecordKind::Point3d);
        let (count, capacity) = reader.read_record_count(POINT3D_HEADER_SIZE)?;
        if count > u32::MAX as u64 {
            return Err(reader.error(format!("{count} points exceed the engine capacity")));
        }

        let mut index = Self {
            ids: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            errors: Vec::with_capacity(capacity),
            track_offsets: Vec::with_capacity(capacity),
            track_lengths: Vec::with_capacity(capacity),
            order: Vec::new(),
        };

        for record in 0..count as usize {
            reader.set_record(record);
            index.ids.push(reader.read_u64()?);
            index.positions.push(reader.read_f64_array::<3>()?);
            index
                .colors
                .push([reader.read_u8()?, reader.read_u8()?, reader.read_u8()?]);
            index.errors.push(reader.read_f64()?);

            let track_len = reader.read_len_u64()?;
            if track_len > reader.remaining() / TRACK_ELEMENT_SIZE {
                return Err(reader.error(format!(
                    "track of length {track_len} exceeds the remaining buffer"
                )));
            }
            index.track_offsets.push(reader.position());
            index.track_lengths.push(track_len as u32);
            for _ in 0..track_len {
                read_track_element(&mut reader)?;
            }
        }

        if reader.remaining() > 0 {
            log::warn!(
                "ignoring {} trailing bytes after {count} point3D records",
                reader.remaining()
            );
        }

        index.order = (0..index.ids.len() as u32).collect();
        index.order.sort_unstable_by_key(|&i| index.ids[i as usize]);
        for pair in index.order.windows(2) {
            let (a, b) = (pair[0] as usize, pair[1] as usize);
            if index.ids[a] == index.ids[b] {
                let record = a.max(b);
                return Err(ColmapError::malformed(
                    RecordKind::Point3d,
                    Location::Binary {
                        record,
                        offset: index.track_offsets[record] - POINT3D_HEADER_SIZE,
                    },
                    format!("duplicate point3D id {}", index.ids[a]),
                ));
            }
        }

        Ok(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Record indices in ascending point id order.
    #[inline]
    pub fn sorted(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().map(|&i| i as usize)
    }

    /// The record index of the `rank`-th point in ascending id order.
    #[inline]
    pub fn record_at_rank(&self, rank: usize) -> Option<usize> {
        self.order.get(rank).map(|&i| i as usize)
    }

    /// The record index of a point id.
    pub fn find(&self, point3d_id: u64) -> Option<usize> {
        self.order
            .binary_search_by_key(&point3d_id, |&i| self.ids[i as usize])
            .ok()
            .map(|rank| self.order[rank] as usize)
    }

    #[inline]
    pub fn track_len(&self, record: usize) -> usize {
        self.track_lengths[record] as usize
    }

    /// The packed track of a record, borrowed from the buffer it was scanned from.
    #[inline]
    pub fn track<'a>(&self, buf: &'a [u8], record: usize) -> TrackRef<'a> {
        let start = self.track_offsets[record];
        let end = start + self.track_len(record) * TRACK_ELEMENT_SIZE;
        TrackRef::Packed(&buf[start..end])
    }

    /// Bytes held by the index itself.
    pub fn heap_size(&self) -> usize {
        self.ids.capacity() * std::mem::size_of::<u64>()
            + self.positions.capacity() * std::mem::size_of::<[f64; 3]>()
            + self.colors.capacity() * std::mem::size_of::<[u8; 3]>()
            + self.errors.capacity() * std::mem::size_of::<f64>()
            + self.track_offsets.capacity() * std::mem::size_of::<usize>()
            + self.track_lengths.capacity() * std::mem::size_of::<u32>()
            + self.order.capacity() * std::mem::size_of::<u32>()
    }
}

/// Byte range of the keypoints of one image.
#[derive(Debug, Clone, Copy)]
struct KeypointRange {
    offset: usize,
    count: usize,
}

/// Index over an `images.bin` buffer.
///
/// Image metadata is handed back to the caller while the keypoints stay in the
/// buffer and are decoded on demand.
pub(crate) struct ImageIndex {
    keypoints: HashMap<u32, KeypointRange>,
}

impl ImageIndex {
    /// Scan the buffer and return the index together with the image metadata.
    pub fn scan(buf: &[u8]) -> Result<(Self, BTreeMap<u32, ColmapImage>), ColmapError> {
        let mut reader = ByteReader::new(buf, RecordKind::Image);
        let (count, capacity) = reader.read_record_count(MIN_IMAGE_RECORD_SIZE)?;

        let mut images = BTreeMap::new();
        let mut keypoints = HashMap::with_capacity(capacity);
        for record in 0..count as usize {
            reader.set_record(record);
            let location = reader.location();
            let image = read_image_record(&mut reader, false)?;
            let range = KeypointRange {
                offset: reader.position() - image.num_points2d * POINT2D_SIZE,
                count: image.num_points2d,
            };
            if images.contains_key(&image.image_id) {
                return Err(ColmapError::malformed(
                    RecordKind::Image,
                    location,
                    format!("duplicate image id {}", image.image_id),
                ));
            }
            keypoints.insert(image.image_id, range);
            images.insert(image.image_id, image);
        }

        if reader.remaining() > 0 {
            log::warn!(
                "ignoring {} trailing bytes after {count} image records",
                reader.remaining()
            );
        }

        Ok((Self { keypoints }, images))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn num_points2d(&self, image_id: u32) -> Option<usize> {
        self.keypoints.get(&image_id).map(|range| range.count)
    }

    /// Decode the keypoints of one image from the buffer it was scanned from.
    pub fn points2d(&self, buf: &[u8], image_id: u32) -> Option<Result<Vec<Point2d>, ColmapError>> {
        let range = self.keypoints.get(&image_id)?;
        let end = range.offset + range.count * POINT2D_SIZE;
        let mut reader = ByteReader::new(&buf[range.offset..end], RecordKind::Image);
        Some(
            (0..range.count)
                .map(|_| -> Result<Point2d, ColmapError> {
                    let x = reader.read_f64()?;
                    let y = reader.read_f64()?;
                    let point3d_id = reader.read_i64()?;
                    Point2d::try_from_raw(x, y, point3d_id).ok_or_else(|| {
                        reader.error(format!("invalid keypoint point3D id {point3d_id}"))
                    })
                })
                .collect(),
        )
    }

    pub fn heap_size(&self) -> usize {
        self.keypoints.capacity()
            * (std::mem::size_of::<u32>() + std::mem::size_of::<KeypointRange>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kornia_colmap::{testing, ColmapPoint3d, TrackElement};

    fn point(point3d_id: u64, track: Vec<TrackElement>) -> ColmapPoint3d {
        ColmapPoint3d {
            point3d_id,
            xyz: [point3d_id as f64, 0.0, 0.0],
            rgb: [1, 2, 3],
            error: 0.5,
            track,
        }
    }

    #[test]
    fn points_are_ordered_by_id() -> Result<(), ColmapError> {
        let track = vec![TrackElement {
            image_id: 4,
            point2d_idx: 2,
        }];
        let buf = testing::encode_points3d_binary(&[
            point(30, track.clone()),
            point(10, vec![]),
            point(20, track.clone()),
        ]);
        let index = PointIndex::scan(&buf)?;
        assert_eq!(index.len(), 3);
        let ids = index.sorted().map(|r| index.ids[r]).collect::<Vec<_>>();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(index.find(20), Some(2));
        assert_eq!(index.find(25), None);
        assert_eq!(index.record_at_rank(0), Some(1));
        assert_eq!(index.track(&buf, 0).to_vec(), track);
        assert!(index.track(&buf, 1).is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_point_ids_are_rejected() {
        let buf = testing::encode_points3d_binary(&[point(1, vec![]), point(1, vec![])]);
        match PointIndex::scan(&buf) {
            Err(ColmapError::MalformedRecord { location, .. }) => {
                assert_eq!(location, Location::Binary { record: 1, offset: 8 + POINT3D_HEADER_SIZE });
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn keypoints_are_decoded_on_demand() -> Result<(), ColmapError> {
        let scene = testing::SyntheticScene::generate(3, 20, 11);
        let buf = scene.images_binary();
        let (index, images) = ImageIndex::scan(&buf)?;
        assert_eq!(index.len(), 3);
        for expected in &scene.images {
            let image = &images[&expected.image_id];
            assert!(image.points2d.is_none());
            assert_eq!(index.num_points2d(image.image_id), Some(expected.num_points2d));
            let points2d = index.points2d(&buf, image.image_id).expect("indexed image")?;
            assert_eq!(Some(points2d), expected.points2d);
        }
        assert!(index.points2d(&buf, 99).is_none());
        Ok(())
    }

    #[test]
    fn negative_keypoint_reference_fails_on_fetch() -> Result<(), ColmapError> {
        let image = ColmapImage {
            image_id: 2,
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

        let (index, _) = ImageIndex::scan(&buf)?;
        assert!(matches!(
            index.points2d(&buf, 2),
            Some(Err(ColmapError::MalformedRecord { .. }))
        ));
        Ok(())
    }
}
