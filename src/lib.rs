//! Cubemap panorama viewer.
//!
//! One packed atlas image is mapped onto the inside of a cube and viewed
//! from its centre, either on screen (mono) or through a stereo / immersive
//! presentation backend.

pub mod atlas;
pub mod config;
pub mod media;
pub mod mesh;
pub mod orientation;
pub mod overlay;
pub mod presentation;
pub mod renderer;
pub mod scheduler;
pub mod shader;
pub mod view;
pub mod viewer;

pub use config::{ConfigError, ViewerConfig};
pub use renderer::{EyeRenderer, RenderError, WgpuRenderer};
pub use viewer::{FrameReport, Viewer, ViewerStatus};
