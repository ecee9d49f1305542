use crate::{LoadWarning, Reconstruction, ReconstructionBuilder, SceneError, SceneFiles};

/// Owns the live reconstruction and at most one accelerated engine.
///
/// A new reconstruction replaces the current one only once it has been built,
/// so a failed load leaves the previous scene untouched.
#[derive(Debug, Default)]
pub struct ReconstructionSession {
    builder: ReconstructionBuilder,
    current: Option<Reconstruction>,
}

impl ReconstructionSession {
    /// Create an empty session.
    pub fn new(builder: ReconstructionBuilder) -> Self {
        Self {
            builder,
            current: None,
        }
    }

    /// Load a reconstruction and make it the current one.
    ///
    /// # Returns
    ///
    /// The warnings raised while loading. On error the current reconstruction is kept.
    pub fn load(&mut self, files: &SceneFiles) -> Result<Vec<LoadWarning>, SceneError> {
        let outcome = self.builder.build(files)?;
        if let Some(mut previous) = self.current.replace(outcome.reconstruction) {
            previous.dispose();
        }
        Ok(outcome.warnings)
    }

    /// The current reconstruction.
    pub fn current(&self) -> Option<&Reconstruction> {
        self.current.as_ref()
    }

    /// Release the current reconstruction. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(mut reconstruction) = self.current.take() {
            log::debug!("disposing the {} reconstruction", reconstruction.data().tier());
            reconstruction.dispose();
        }
    }
}

impl Drop for ReconstructionSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
