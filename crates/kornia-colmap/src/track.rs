use crate::TrackElement;

/// Size in bytes of one packed track element: `(i32 image_id, i32 point2d_idx)`.
pub const PACKED_TRACK_ELEMENT_SIZE: usize = 8;

/// A borrowed view of a track.
///
/// Tracks are either decoded into [`TrackElement`]s or left packed in the
/// little-endian layout of `points3D.bin`. Packed tracks must have been
/// validated (non-negative ids, exact length) by whoever built the view.
#[derive(Debug, Clone, Copy)]
pub enum TrackRef<'a> {
    /// Decoded track elements
    Elements(&'a [TrackElement]),
    /// Raw track bytes, a multiple of [`PACKED_TRACK_ELEMENT_SIZE`]
    Packed(&'a [u8]),
}

impl<'a> TrackRef<'a> {
    /// Number of observations in the track.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            TrackRef::Elements(elements) => elements.len(),
            TrackRef::Packed(bytes) => bytes.len() / PACKED_TRACK_ELEMENT_SIZE,
        }
    }

    /// Whether the track has no observations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the observations of the track.
    pub fn iter(&self) -> TrackIter<'a> {
        match *self {
            TrackRef::Elements(elements) => TrackIter::Elements(elements.iter()),
            TrackRef::Packed(bytes) => {
                TrackIter::Packed(bytes.chunks_exact(PACKED_TRACK_ELEMENT_SIZE))
            }
        }
    }

    /// Materialize the track.
    pub fn to_vec(&self) -> Vec<TrackElement> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for TrackRef<'a> {
    type Item = TrackElement;
    type IntoIter = TrackIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TrackRef`].
pub enum TrackIter<'a> {
    /// Iterating decoded elements
    Elements(std::slice::Iter<'a, TrackElement>),
    /// Iterating packed elements
    Packed(std::slice::ChunksExact<'a, u8>),
}

impl Iterator for TrackIter<'_> {
    type Item = TrackElement;

    fn next(&mut self) -> Option<TrackElement> {
        match self {
            TrackIter::Elements(iter) => iter.next().copied(),
            TrackIter::Packed(chunks) => chunks.next().map(unpack_track_element),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            TrackIter::Elements(iter) => iter.size_hint(),
            TrackIter::Packed(chunks) => chunks.size_hint(),
        }
    }
}

impl ExactSizeIterator for TrackIter<'_> {}

#[inline]
fn unpack_track_element(chunk: &[u8]) -> TrackElement {
    let mut image_id = [0u8; 4];
    let mut point2d_idx = [0u8; 4];
    image_id.copy_from_slice(&chunk[0..4]);
    point2d_idx.copy_from_slice(&chunk[4..8]);
    TrackElement {
        image_id: i32::from_le_bytes(image_id) as u32,
        point2d_idx: i32::from_le_bytes(point2d_idx) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_and_decoded_agree() {
        let elements = vec![
            TrackElement {
                image_id: 3,
                point2d_idx: 7,
            },
            TrackElement {
                image_id: 1,
                point2d_idx: 0,
            },
        ];
        let mut bytes = Vec::new();
        for e in &elements {
            bytes.extend_from_slice(&(e.image_id as i32).to_le_bytes());
            bytes.extend_from_slice(&(e.point2d_idx as i32).to_le_bytes());
        }

        let packed = TrackRef::Packed(&bytes);
        let decoded = TrackRef::Elements(&elements);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed.iter().len(), 2);
        assert_eq!(packed.to_vec(), decoded.to_vec());
        assert!(TrackRef::Packed(&[]).is_empty());
    }
}
