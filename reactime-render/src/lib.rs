pub mod render;
pub mod scene;
pub mod text;

pub use render::{FrameStats, SkiaRenderer};
pub use scene::{Scene, TrailMark};
pub use text::TextCache;
