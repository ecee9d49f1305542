use std::collections::BTreeMap;

use kornia_colmap::FileFormat;

use crate::ModelFile;

/// A file picked by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile<F> {
    /// The normalized relative path of the file.
    pub path: String,
    /// The encoding inferred from the extension.
    pub format: FileFormat,
    /// The caller provided file handle.
    pub file: F,
}

/// The model files found in the best candidate directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel<F> {
    /// The directory holding the model, empty for the root.
    pub directory: String,
    /// cameras file
    pub cameras: ResolvedFile<F>,
    /// images file
    pub images: ResolvedFile<F>,
    /// points3D file
    pub points3d: ResolvedFile<F>,
    /// rigs file, if present
    pub rigs: Option<ResolvedFile<F>>,
    /// frames file, if present
    pub frames: Option<ResolvedFile<F>>,
    /// database.db, if present
    pub database: Option<(String, F)>,
}

#[derive(Debug)]
struct Candidate<F> {
    cameras: Option<ResolvedFile<F>>,
    images: Option<ResolvedFile<F>>,
    points3d: Option<ResolvedFile<F>>,
    rigs: Option<ResolvedFile<F>>,
    frames: Option<ResolvedFile<F>>,
    database: Option<(String, F)>,
}

impl<F> Default for Candidate<F> {
    fn default() -> Self {
        Self {
            cameras: None,
            images: None,
            points3d: None,
            rigs: None,
            frames: None,
            database: None,
        }
    }
}

impl<F> Candidate<F> {
    fn slot(&mut self, file: ModelFile) -> &mut Option<ResolvedFile<F>> {
        match file {
            ModelFile::Cameras => &mut self.cameras,
            ModelFile::Images => &mut self.images,
            ModelFile::Points3d => &mut self.points3d,
            ModelFile::Rigs => &mut self.rigs,
            ModelFile::Frames => &mut self.frames,
        }
    }

    // binary wins over text, the first file seen wins otherwise
    fn offer(&mut self, model_file: ModelFile, entry: ResolvedFile<F>) {
        let slot = self.slot(model_file);
        let replace = match slot {
            None => true,
            Some(current) => {
                current.format == FileFormat::Text && entry.format == FileFormat::Binary
            }
        };
        if replace {
            *slot = Some(entry);
        }
    }

    fn into_model(self, directory: String) -> Option<ResolvedModel<F>> {
        Some(ResolvedModel {
            directory,
            cameras: self.cameras?,
            images: self.images?,
            points3d: self.points3d?,
            rigs: self.rigs,
            frames: self.frames,
            database: self.database,
        })
    }

    fn is_complete(&self) -> bool {
        self.cameras.is_some() && self.images.is_some() && self.points3d.is_some()
    }
}

/// Normalize a relative path to forward slashes without leading `./` or `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn classify(file_name: &str) -> Option<(ModelFile, FileFormat)> {
    let lower = file_name.to_ascii_lowercase();
    let (stem, _) = lower.rsplit_once('.')?;
    let format = FileFormat::from_path(&lower)?;
    let model_file = match stem {
        "cameras" => ModelFile::Cameras,
        "images" => ModelFile::Images,
        "points3d" => ModelFile::Points3d,
        "rigs" => ModelFile::Rigs,
        "frames" => ModelFile::Frames,
        _ => return None,
    };
    Some((model_file, format))
}

/// Score a candidate directory, lower is better.
///
/// # Example
///
/// ```
/// use kornia_scene::directory_score;
///
/// assert_eq!(directory_score("scan/sparse/0"), 0);
/// assert_eq!(directory_score("scan/sparse"), 1);
/// assert_eq!(directory_score("model"), 9);
/// ```
pub fn directory_score(directory: &str) -> usize {
    if directory.ends_with("sparse/0") {
        0
    } else if directory.ends_with("sparse") {
        1
    } else if directory.contains("/sparse/") {
        2
    } else if directory.contains("/sparse") {
        3
    } else {
        4 + directory.len()
    }
}

/// Find the directory holding the most plausible COLMAP model.
///
/// Files are grouped by parent directory and matched by name, case-insensitive.
/// Binary files are preferred over text files of the same kind. Only
/// directories with cameras, images and points3D are candidates, the one with
/// the lowest [`directory_score`] wins and ties are broken by the directory
/// name.
///
/// # Arguments
///
/// * `files` - Pairs of relative path and caller defined file handle.
///
/// # Returns
///
/// The resolved model, or `None` when no directory holds the three mandatory files.
pub fn resolve_model_directory<F, P, I>(files: I) -> Option<ResolvedModel<F>>
where
    I: IntoIterator<Item = (P, F)>,
    P: AsRef<str>,
{
    let mut directories: BTreeMap<String, Candidate<F>> = BTreeMap::new();

    for (path, file) in files {
        let path = normalize_path(path.as_ref());
        let (parent, file_name) = split_parent(&path);

        if file_name.eq_ignore_ascii_case("database.db") {
            let candidate = directories.entry(parent.to_string()).or_default();
            if candidate.database.is_none() {
                candidate.database = Some((path.clone(), file));
            }
            continue;
        }

        let Some((model_file, format)) = classify(file_name) else {
            continue;
        };
        let parent = parent.to_string();
        directories.entry(parent).or_default().offer(
            model_file,
            ResolvedFile {
                path,
                format,
                file,
            },
        );
    }

    let best = directories
        .iter()
        .filter(|(_, candidate)| candidate.is_complete())
        .min_by(|(a, _), (b, _)| directory_score(a).cmp(&directory_score(b)).then(a.cmp(b)))
        .map(|(directory, _)| directory.clone())?;

    log::debug!(
        "resolved model directory '{best}' among {} directories",
        directories.len()
    );

    directories.remove(&best)?.into_model(best)
}
