use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::prelude::{OverlayError, OverlayResult};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Decoded raster frames with known intrinsic dimensions.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);
    /// Number of frames available, `None` when any index is served.
    fn frame_count(&self) -> Option<usize>;
    fn frame(&self, index: usize) -> OverlayResult<RgbaImage>;
}

/// A single raster served for every frame index.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: RgbaImage,
}

impl StillImage {
    pub fn new(image: RgbaImage) -> OverlayResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OverlayError::InvalidMedia("image has no pixels".into()));
        }
        Ok(Self { image })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> OverlayResult<Self> {
        let image = image::open(path.as_ref())?.to_rgba8();
        Self::new(image)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl FrameSource for StillImage {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn frame_count(&self) -> Option<usize> {
        None
    }

    fn frame(&self, _index: usize) -> OverlayResult<RgbaImage> {
        Ok(self.image.clone())
    }
}

/// Pre-extracted video frames stored as image files in one directory.
///
/// Frames are ordered by file name, so zero-padded names (`frame_0001.png`)
/// keep playback order. Dimensions come from the first frame.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    dimensions: (u32, u32),
}

impl ImageSequence {
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> OverlayResult<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_frame {
                paths.push(path);
            }
        }
        paths.sort();

        let first = paths.first().ok_or_else(|| {
            OverlayError::InvalidMedia(format!("no frames found in {}", dir.display()))
        })?;
        let dimensions = image::image_dimensions(first)?;
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(OverlayError::InvalidMedia(format!(
                "{} has no pixels",
                first.display()
            )));
        }
        Ok(Self { paths, dimensions })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.paths.len())
    }

    fn frame(&self, index: usize) -> OverlayResult<RgbaImage> {
        let path = self.paths.get(index).ok_or(OverlayError::IndexOutOfRange {
            index,
            len: self.paths.len(),
        })?;
        Ok(image::open(path)?.to_rgba8())
    }
}

/// Opens a file as a still image, or a directory as a frame sequence.
pub fn open_source<P: AsRef<Path>>(path: P) -> OverlayResult<Box<dyn FrameSource>> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Box::new(ImageSequence::open_dir(path)?))
    } else {
        Ok(Box::new(StillImage::open(path)?))
    }
}
