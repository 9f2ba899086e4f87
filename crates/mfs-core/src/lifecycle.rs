//! Binding of an image to its backing file.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::error::{MfsError, Result};
use crate::image::Image;
use crate::layout::Geometry;

/// Whether an image is currently bound.
pub enum ImageState {
    Closed,
    Open { path: PathBuf, image: Image },
}

/// Owner of the single active image.
///
/// Every file operation goes through [`MockFs::image`] or
/// [`MockFs::image_mut`], which fail with [`MfsError::ImageNotOpen`] while no
/// image is bound.
pub struct MockFs {
    geometry: Geometry,
    state: ImageState,
}

impl Default for MockFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFs {
    pub fn new() -> Self {
        Self::with_geometry(Geometry::default())
    }

    pub fn with_geometry(geometry: Geometry) -> Self {
        Self {
            geometry,
            state: ImageState::Closed,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ImageState::Open { .. })
    }

    /// Path of the bound backing file.
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            ImageState::Open { path, .. } => Some(path),
            ImageState::Closed => None,
        }
    }

    /// Reset to an empty image and truncate (or create) the backing file.
    #[instrument(skip(self))]
    pub fn create(&mut self, path: &Path) -> Result<()> {
        self.state = ImageState::Closed;
        File::create(path)?;
        let image = Image::new(self.geometry)?;
        info!(path = %path.display(), "Created image");
        self.state = ImageState::Open {
            path: path.to_path_buf(),
            image,
        };
        Ok(())
    }

    /// Load the backing file. On failure the image stays closed.
    #[instrument(skip(self))]
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.state = ImageState::Closed;
        let image = Image::load(path, self.geometry).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to open image");
        })?;
        info!(path = %path.display(), "Opened image");
        self.state = ImageState::Open {
            path: path.to_path_buf(),
            image,
        };
        Ok(())
    }

    /// Write the whole image to its bound file.
    #[instrument(skip(self))]
    pub fn save(&mut self) -> Result<()> {
        match &mut self.state {
            ImageState::Open { path, image } => {
                image.save(path)?;
                info!(path = %path.display(), "Saved image");
                Ok(())
            }
            ImageState::Closed => Err(MfsError::ImageNotOpen),
        }
    }

    /// Unbind the image. Unsaved changes are discarded.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ImageState::Closed) {
            ImageState::Open { path, .. } => {
                info!(path = %path.display(), "Closed image");
                Ok(())
            }
            ImageState::Closed => Err(MfsError::ImageNotOpen),
        }
    }

    pub fn image(&self) -> Result<&Image> {
        match &self.state {
            ImageState::Open { image, .. } => Ok(image),
            ImageState::Closed => Err(MfsError::ImageNotOpen),
        }
    }

    pub fn image_mut(&mut self) -> Result<&mut Image> {
        match &mut self.state {
            ImageState::Open { image, .. } => Ok(image),
            ImageState::Closed => Err(MfsError::ImageNotOpen),
        }
    }

    /// Free bytes in the bound image (`df`).
    pub fn available(&self) -> Result<u64> {
        Ok(self.image()?.available())
    }
}
