#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

use std::collections::BTreeMap;

/// Binary model file decoders.
pub mod binary;

/// Error types for decoding.
mod error;
pub use error::*;

/// Byte buffers and model file sources.
mod source;
pub use source::*;

/// Text model file decoders.
pub mod text;

/// Borrowed views over point tracks.
mod track;
pub use track::*;

/// Colmap record types.
mod types;
pub use types::*;

/// Binary encoders to build synthetic datasets.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// Options controlling how images are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDecodeOptions {
    /// Retain the 2D keypoints of every image. When false only the keypoint
    /// count is kept, which bounds memory for very large models.
    pub keep_points2d: bool,
}

impl Default for ImageDecodeOptions {
    fn default() -> Self {
        Self {
            keep_points2d: true,
        }
    }
}

/// Decode cameras from either encoding.
pub fn decode_cameras(source: &ColmapSource) -> Result<BTreeMap<u32, ColmapCamera>, ColmapError> {
    match source {
        ColmapSource::Binary(buf) => binary::decode_cameras_binary(buf),
        ColmapSource::Text(data) => text::decode_cameras_text(data),
    }
}

/// Decode images from either encoding.
pub fn decode_images(
    source: &ColmapSource,
    options: ImageDecodeOptions,
) -> Result<BTreeMap<u32, ColmapImage>, ColmapError> {
    match source {
        ColmapSource::Binary(buf) => binary::decode_images_binary(buf, options),
        ColmapSource::Text(data) => text::decode_images_text(data, options),
    }
}

/// Decode 3D points from either encoding.
pub fn decode_points3d(
    source: &ColmapSource,
) -> Result<BTreeMap<u64, ColmapPoint3d>, ColmapError> {
    match source {
        ColmapSource::Binary(buf) => binary::decode_points3d_binary(buf),
        ColmapSource::Text(data) => text::decode_points3d_text(data),
    }
}

/// Decode rigs from either encoding.
pub fn decode_rigs(source: &ColmapSource) -> Result<BTreeMap<u32, Rig>, ColmapError> {
    match source {
        ColmapSource::Binary(buf) => binary::decode_rigs_binary(buf),
        ColmapSource::Text(data) => text::decode_rigs_text(data),
    }
}

/// Decode frames from either encoding.
pub fn decode_frames(source: &ColmapSource) -> Result<BTreeMap<u32, Frame>, ColmapError> {
    match source {
        ColmapSource::Binary(buf) => binary::decode_frames_binary(buf),
        ColmapSource::Text(data) => text::decode_frames_text(data),
    }
}

/// Decode rigs and frames together.
pub fn decode_rig_data(
    rigs: &ColmapSource,
    frames: &ColmapSource,
) -> Result<RigData, ColmapError> {
    Ok(RigData {
        rigs: decode_rigs(rigs)?,
        frames: decode_frames(frames)?,
    })
}
