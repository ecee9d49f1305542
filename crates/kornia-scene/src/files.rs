use kornia_colmap::ColmapSource;

use crate::{ModelFile, ResolvedFile, ResolvedModel};

/// The model file contents handed to the builder.
///
/// The builder never touches the file system, reading (or memory mapping) the
/// files is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct SceneFiles {
    /// cameras.bin / cameras.txt
    pub cameras: Option<ColmapSource>,
    /// images.bin / images.txt
    pub images: Option<ColmapSource>,
    /// points3D.bin / points3D.txt
    pub points3d: Option<ColmapSource>,
    /// rigs.bin / rigs.txt
    pub rigs: Option<ColmapSource>,
    /// frames.bin / frames.txt
    pub frames: Option<ColmapSource>,
}

impl SceneFiles {
    /// Create the set from the three mandatory files.
    pub fn new(cameras: ColmapSource, images: ColmapSource, points3d: ColmapSource) -> Self {
        Self {
            cameras: Some(cameras),
            images: Some(images),
            points3d: Some(points3d),
            rigs: None,
            frames: None,
        }
    }

    /// Attach the optional rig and frame files.
    pub fn with_rig_data(mut self, rigs: ColmapSource, frames: ColmapSource) -> Self {
        self.rigs = Some(rigs);
        self.frames = Some(frames);
        self
    }

    /// Set one of the files.
    pub fn set(&mut self, file: ModelFile, source: ColmapSource) {
        let slot = match file {
            ModelFile::Cameras => &mut self.cameras,
            ModelFile::Images => &mut self.images,
            ModelFile::Points3d => &mut self.points3d,
            ModelFile::Rigs => &mut self.rigs,
            ModelFile::Frames => &mut self.frames,
        };
        *slot = Some(source);
    }

    /// The mandatory files that are absent.
    pub fn missing_required(&self) -> Vec<ModelFile> {
        ModelFile::REQUIRED
            .into_iter()
            .filter(|file| match file {
                ModelFile::Cameras => self.cameras.is_none(),
                ModelFile::Images => self.images.is_none(),
                ModelFile::Points3d => self.points3d.is_none(),
                ModelFile::Rigs | ModelFile::Frames => false,
            })
            .collect()
    }

    /// Read every file of a resolved model with the given loader.
    ///
    /// # Arguments
    ///
    /// * `model` - The model found by [`crate::resolve_model_directory`].
    /// * `load` - Turns a resolved file into its contents.
    pub fn load_resolved<F, E>(
        model: &ResolvedModel<F>,
        mut load: impl FnMut(&ResolvedFile<F>) -> Result<ColmapSource, E>,
    ) -> Result<Self, E> {
        let mut files = Self::new(load(&model.cameras)?, load(&model.images)?, load(&model.points3d)?);
        if let Some(rigs) = &model.rigs {
            files.rigs = Some(load(rigs)?);
        }
        if let Some(frames) = &model.frames {
            files.frames = Some(load(frames)?);
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_files() {
        let mut files = SceneFiles::default();
        assert_eq!(files.missing_required(), ModelFile::REQUIRED.to_vec());
        files.set(ModelFile::Images, ColmapSource::text(""));
        files.set(ModelFile::Rigs, ColmapSource::text(""));
        assert_eq!(
            files.missing_required(),
            vec![ModelFile::Cameras, ModelFile::Points3d]
        );
    }
}
