use kornia_colmap::ColmapError;
use kornia_colmap_engine::EngineError;

/// The model files of a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelFile {
    /// cameras.bin / cameras.txt
    Cameras,
    /// images.bin / images.txt
    Images,
    /// points3D.bin / points3D.txt
    Points3d,
    /// rigs.bin / rigs.txt
    Rigs,
    /// frames.bin / frames.txt
    Frames,
}

impl ModelFile {
    /// The three files every reconstruction needs.
    pub const REQUIRED: [ModelFile; 3] = [ModelFile::Cameras, ModelFile::Images, ModelFile::Points3d];

    /// The file stem used on disk.
    pub fn stem(self) -> &'static str {
        match self {
            ModelFile::Cameras => "cameras",
            ModelFile::Images => "images",
            ModelFile::Points3d => "points3D",
            ModelFile::Rigs => "rigs",
            ModelFile::Frames => "frames",
        }
    }
}

impl std::fmt::Display for ModelFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stem())
    }
}

/// What a dangling reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// A camera id
    Camera,
    /// An image id
    Image,
    /// A keypoint index inside an image
    Point2d,
    /// A rig id
    Rig,
    /// A sensor declared on a rig
    Sensor,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReferenceKind::Camera => "camera",
            ReferenceKind::Image => "image",
            ReferenceKind::Point2d => "point2D",
            ReferenceKind::Rig => "rig",
            ReferenceKind::Sensor => "sensor",
        };
        f.write_str(name)
    }
}

/// Error types for loading a reconstruction.
///
/// Every variant is terminal for the load attempt and is meant to be displayed
/// to the user as is.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SceneError {
    /// One or more of cameras, images, points3D is absent.
    #[error("Missing required model files: {}", display_files(.0))]
    MissingRequiredFiles(Vec<ModelFile>),

    /// A model file failed to decode.
    #[error("Failed to decode {file}: {source}")]
    Decode {
        /// The file at fault
        file: ModelFile,
        /// The decoding error
        #[source]
        source: ColmapError,
    },

    /// A record references an id that does not exist.
    #[error("{referrer} references unknown {kind} {id}")]
    DanglingReference {
        /// What the missing id should have been
        kind: ReferenceKind,
        /// The missing id
        id: u64,
        /// The record holding the reference, e.g. `image 3`
        referrer: String,
    },

    /// The accelerated engine failed after it took over the reconstruction.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SceneError {
    pub(crate) fn decode(file: ModelFile) -> impl FnOnce(ColmapError) -> SceneError {
        move |source| SceneError::Decode { file, source }
    }
}

fn display_files(files: &[ModelFile]) -> String {
    files
        .iter()
        .map(|f| f.stem())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A non-fatal condition met while loading.
///
/// Warnings are logged and returned alongside the reconstruction so that a
/// notification layer can surface them.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// The accelerated engine was not used, the interpreted decoders took over.
    EngineUnavailable(String),
    /// The accelerated engine failed to decode the model and was discarded.
    EngineFailed(String),
    /// Images were loaded without their keypoints to bound memory.
    Points2dDropped {
        /// Size of the images file in bytes
        images_bytes: u64,
    },
    /// Rig and frame data was omitted.
    PartialRigData(String),
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadWarning::EngineUnavailable(reason) => {
                write!(f, "accelerated engine unavailable: {reason}")
            }
            LoadWarning::EngineFailed(reason) => write!(f, "accelerated engine failed: {reason}"),
            LoadWarning::Points2dDropped { images_bytes } => write!(
                f,
                "images file is {images_bytes} bytes, keypoints were not loaded"
            ),
            LoadWarning::PartialRigData(reason) => write!(f, "rig data omitted: {reason}"),
        }
    }
}
