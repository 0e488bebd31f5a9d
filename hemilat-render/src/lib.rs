pub mod render;
pub mod scene;
pub mod text;

pub use render::{FrameStats, SceneRenderer, SceneStyle};
pub use scene::{FLASH_FRAMES, Scene, Screen, Spot};
pub use text::{TextCache, render_text_pixmap};
