use anyhow::Context;
use overlaycore::detection::MediaKind;
use overlaycore::render::{ChipPlacement, OverlayStyle, RasterSurface};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub service_url: String,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub chip_placement: ChipPlacement,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            output_dir: PathBuf::from("output"),
            font_path: None,
            chip_placement: ChipPlacement::Above,
        }
    }
}

impl AnnotatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading annotator config {}", path_ref.display()))?;
        let config: AnnotatorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing annotator config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        service_url: String,
        timeout_secs: u64,
        output_dir: PathBuf,
        font_path: Option<PathBuf>,
        clamp_chips: bool,
    ) -> Self {
        Self {
            service_url,
            timeout_secs,
            output_dir,
            font_path,
            chip_placement: if clamp_chips {
                ChipPlacement::Clamped
            } else {
                ChipPlacement::Above
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn overlay_style(&self, kind: MediaKind) -> OverlayStyle {
        let style = match kind {
            MediaKind::Image => OverlayStyle::image(),
            MediaKind::Video => OverlayStyle::video(),
        };
        style.with_placement(self.chip_placement)
    }

    /// Fresh drawing surface, carrying the configured label font if any.
    pub fn surface(&self) -> anyhow::Result<RasterSurface> {
        let surface = RasterSurface::default();
        match &self.font_path {
            Some(path) => {
                let font = RasterSurface::load_font(path)
                    .with_context(|| format!("loading label font {}", path.display()))?;
                Ok(surface.with_font(font))
            }
            None => Ok(surface),
        }
    }
}
