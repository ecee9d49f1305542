/// The kind of record being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A camera record
    Camera,
    /// An image record
    Image,
    /// A 3D point record
    Point3d,
    /// A rig record
    Rig,
    /// A frame record
    Frame,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Camera => "camera",
            RecordKind::Image => "image",
            RecordKind::Point3d => "point3D",
            RecordKind::Rig => "rig",
            RecordKind::Frame => "frame",
        };
        f.write_str(name)
    }
}

/// Where decoding broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Record index and absolute byte offset in a binary buffer.
    Binary {
        /// Zero-based record index, the record count header is not a record.
        record: usize,
        /// Absolute byte offset from the start of the buffer.
        offset: usize,
    },
    /// One-based line number in a text file.
    Line(usize),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Binary { record, offset } => {
                write!(f, "record {record} (byte offset {offset})")
            }
            Location::Line(line) => write!(f, "line {line}"),
        }
    }
}

/// Error types for the COLMAP module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ColmapError {
    /// A record could not be decoded.
    #[error("Malformed {kind} record at {location}: {reason}")]
    MalformedRecord {
        /// The kind of record
        kind: RecordKind,
        /// Where decoding broke
        location: Location,
        /// What went wrong
        reason: String,
    },

    /// A binary camera record uses a model id outside the known enumeration.
    #[error("Unknown camera model id {model_id} at {location}")]
    UnknownCameraModel {
        /// The unknown model id
        model_id: i32,
        /// Where decoding broke
        location: Location,
    },

    /// A text camera record uses an unknown model name.
    #[error("Unknown camera model `{name}` at line {line}")]
    UnknownCameraModelName {
        /// The unknown model name
        name: String,
        /// One-based line number
        line: usize,
    },

    /// Invalid number of camera parameters
    #[error(
        "Camera {camera_id} with model {model} expects {expected} parameters, got {found} at line {line}"
    )]
    InvalidNumCameraParams {
        /// Camera id
        camera_id: u32,
        /// Camera model
        model: crate::CameraModelId,
        /// Number of parameters mandated by the model
        expected: usize,
        /// Number of parameters found
        found: usize,
        /// One-based line number
        line: usize,
    },
}

impl ColmapError {
    /// Shorthand to build a [`ColmapError::MalformedRecord`].
    pub fn malformed(kind: RecordKind, location: Location, reason: impl Into<String>) -> Self {
        ColmapError::MalformedRecord {
            kind,
            location,
            reason: reason.into(),
        }
    }

    /// The location at which decoding broke, if known.
    pub fn location(&self) -> Option<Location> {
        match self {
            ColmapError::MalformedRecord { location, .. }
            | ColmapError::UnknownCameraModel { location, .. } => Some(*location),
            ColmapError::UnknownCameraModelName { line, .. }
            | ColmapError::InvalidNumCameraParams { line, .. } => Some(Location::Line(*line)),
        }
    }
}
