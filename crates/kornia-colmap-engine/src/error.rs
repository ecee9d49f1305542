use kornia_colmap::ColmapError;

/// Error types for the accelerated engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine cannot run on this target.
    #[error("The accelerated engine is not supported on this target")]
    Unsupported,

    /// The engine was used after being disposed.
    #[error("The accelerated engine has been disposed")]
    Disposed,

    /// The requested image is not part of the indexed model.
    #[error("Image {0} is not indexed by the engine")]
    ImageNotFound(u32),

    /// A model file failed to decode.
    #[error(transparent)]
    Colmap(#[from] ColmapError),
}
