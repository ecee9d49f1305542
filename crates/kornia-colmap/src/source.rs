use std::{ops::Deref, path::Path, sync::Arc};

/// The on-disk encoding of a COLMAP model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FileFormat {
    /// Little-endian binary, `.bin`
    Binary,
    /// Line oriented text, `.txt`
    Text,
}

impl FileFormat {
    /// Detect the format from the file extension (case-insensitive).
    ///
    /// # Example
    ///
    /// ```
    /// use kornia_colmap::FileFormat;
    ///
    /// assert_eq!(FileFormat::from_path("sparse/0/images.BIN"), Some(FileFormat::Binary));
    /// assert_eq!(FileFormat::from_path("sparse/0/images.txt"), Some(FileFormat::Text));
    /// assert_eq!(FileFormat::from_path("sparse/0/images"), None);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "bin" => Some(FileFormat::Binary),
            "txt" => Some(FileFormat::Text),
            _ => None,
        }
    }
}

/// A cheaply clonable, immutable byte buffer.
///
/// The buffer can be backed by anything exposing bytes, e.g. a `Vec<u8>` or a
/// `memmap2::Mmap`, so that large model files never need to be copied.
#[derive(Clone)]
pub struct SharedBuffer(Arc<dyn AsRef<[u8]> + Send + Sync>);

impl SharedBuffer {
    /// Wrap any byte container.
    pub fn new<T>(data: T) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        Self(Arc::new(data))
    }

    /// The bytes of the buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        (*self.0).as_ref()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// The contents of one model file as handed over by the file acquisition layer.
#[derive(Debug, Clone)]
pub enum ColmapSource {
    /// Contents of a `.bin` file
    Binary(SharedBuffer),
    /// Contents of a `.txt` file
    Text(Arc<str>),
}

impl ColmapSource {
    /// Build a binary source.
    pub fn binary(data: impl Into<SharedBuffer>) -> Self {
        ColmapSource::Binary(data.into())
    }

    /// Build a text source.
    pub fn text(data: impl Into<Arc<str>>) -> Self {
        ColmapSource::Text(data.into())
    }

    /// The encoding of the source.
    pub fn format(&self) -> FileFormat {
        match self {
            ColmapSource::Binary(_) => FileFormat::Binary,
            ColmapSource::Text(_) => FileFormat::Text,
        }
    }

    /// Whether the source is binary encoded.
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, ColmapSource::Binary(_))
    }

    /// The binary buffer, if the source is binary encoded.
    pub fn as_binary(&self) -> Option<&SharedBuffer> {
        match self {
            ColmapSource::Binary(buffer) => Some(buffer),
            ColmapSource::Text(_) => None,
        }
    }

    /// Size of the source in bytes.
    pub fn len_bytes(&self) -> u64 {
        match self {
            ColmapSource::Binary(buffer) => buffer.len() as u64,
            ColmapSource::Text(text) => text.len() as u64,
        }
    }
}
