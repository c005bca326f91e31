pub mod overlay;
pub mod raster;
pub mod style;
pub mod surface;

pub use overlay::OverlayRenderer;
pub use raster::RasterSurface;
pub use style::{ChipPlacement, OverlayStyle};
pub use surface::{OverlayRect, Surface};
