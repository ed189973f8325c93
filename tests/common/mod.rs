// Shared fixtures: a renderer that records what the frame loop asks of it.

#![allow(dead_code)]

use cubemap_viewer::config::ViewerConfig;
use cubemap_viewer::mesh::CubeMesh;
use cubemap_viewer::presentation::{MockBackend, MockConfig, MockState, PresentationBackend};
use cubemap_viewer::view::EyeView;
use cubemap_viewer::{EyeRenderer, RenderError, Viewer, ViewerStatus};
use image::{Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UploadMesh { vertices: usize, indices: usize },
    AllocateTexture { size: (u32, u32), mipmapped: bool },
    UpdateTexture { size: (u32, u32) },
    Resize((u32, u32)),
    BeginFrame,
    DrawEye { eye: EyeView, atlas_scale: [f32; 2] },
    EndFrame,
    Release,
}

pub struct RecordingRenderer {
    pub calls: Vec<Call>,
    pub size: (u32, u32),
    texture: Option<(u32, u32)>,
    released: bool,
}

impl RecordingRenderer {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            calls: Vec::new(),
            size,
            texture: None,
            released: false,
        }
    }

    /// Eyes drawn in each completed frame, oldest first.
    pub fn frames(&self) -> Vec<Vec<EyeView>> {
        let mut frames = Vec::new();
        let mut current = None;
        for call in &self.calls {
            match call {
                Call::BeginFrame => current = Some(Vec::new()),
                Call::DrawEye { eye, .. } => {
                    if let Some(eyes) = current.as_mut() {
                        eyes.push(*eye);
                    }
                }
                Call::EndFrame => frames.extend(current.take()),
                _ => {}
            }
        }
        frames
    }

    pub fn last_frame(&self) -> Vec<EyeView> {
        self.frames().pop().unwrap_or_default()
    }
}

impl EyeRenderer for RecordingRenderer {
    fn upload_mesh(&mut self, mesh: &CubeMesh) {
        self.calls.push(Call::UploadMesh {
            vertices: mesh.vertex_count(),
            indices: mesh.index_count(),
        });
    }

    fn allocate_texture(&mut self, image: &RgbaImage, mipmapped: bool) -> Result<(u32, u32), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let size = image.dimensions();
        self.texture = Some(size);
        self.calls.push(Call::AllocateTexture { size, mipmapped });
        Ok(size)
    }

    fn update_texture(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
        let expected = self.texture.ok_or(RenderError::NoTexture)?;
        if image.dimensions() != expected {
            return Err(RenderError::SizeMismatch {
                expected,
                actual: image.dimensions(),
            });
        }
        self.calls.push(Call::UpdateTexture { size: expected });
        Ok(())
    }

    fn target_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_target(&mut self, size: (u32, u32)) {
        self.size = size;
        self.calls.push(Call::Resize(size));
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn draw_eye(&mut self, eye: &EyeView, atlas_scale: [f32; 2]) {
        self.calls.push(Call::DrawEye {
            eye: *eye,
            atlas_scale,
        });
    }

    fn end_frame(&mut self, _status: &ViewerStatus) -> Result<(), RenderError> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.calls.push(Call::Release);
    }
}

pub fn solid_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([128, 64, 32, 255]))
}

pub fn viewer(size: (u32, u32)) -> Viewer<RecordingRenderer> {
    Viewer::new(&ViewerConfig::default(), RecordingRenderer::new(size), None).expect("default config is valid")
}

pub fn viewer_with_backend(
    size: (u32, u32),
    mock: MockConfig,
) -> (Viewer<RecordingRenderer>, Arc<Mutex<MockState>>) {
    let backend = MockBackend::new(mock);
    let state = backend.state_handle();
    let boxed: Box<dyn PresentationBackend> = Box::new(backend);
    let mut viewer = Viewer::new(&ViewerConfig::default(), RecordingRenderer::new(size), Some(boxed))
        .expect("default config is valid");
    viewer.pump();
    (viewer, state)
}
