// renderer.rs - GPU resources (mesh buffers, atlas texture, eye uniforms) and per-eye draws

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::mesh::CubeMesh;
use crate::overlay::{Overlay, UiAction};
use crate::shader::{self, ShaderProgram};
use crate::view::{EyeView, Viewport};
use crate::viewer::ViewerStatus;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create the window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible graphics adapter found")]
    NoAdapter,
    #[error("failed to open the graphics device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("shader program failed to build: {0}")]
    Program(String),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("frame is {actual:?} but the texture is {expected:?}")]
    SizeMismatch { expected: (u32, u32), actual: (u32, u32) },
    #[error("image is empty")]
    EmptyImage,
    #[error("texture {size:?} exceeds the GPU limit of {max} pixels per side")]
    TextureTooLarge { size: (u32, u32), max: u32 },
    #[error("no texture has been allocated")]
    NoTexture,
    #[error("renderer resources have been released")]
    Released,
}

/// What the frame loop needs from a renderer. The viewer drives this trait
/// so the loop can run against a recording implementation in tests.
pub trait EyeRenderer {
    fn upload_mesh(&mut self, mesh: &CubeMesh);

    /// Replaces the texture. Returns the size actually allocated, which can
    /// be smaller than the image when it exceeds the device limit.
    fn allocate_texture(&mut self, image: &RgbaImage, mipmapped: bool) -> Result<(u32, u32), RenderError>;

    /// Overwrites mip level 0 of the current texture in place.
    fn update_texture(&mut self, image: &RgbaImage) -> Result<(), RenderError>;

    fn target_size(&self) -> (u32, u32);

    fn resize_target(&mut self, size: (u32, u32));

    /// Starts a frame; colour and depth are cleared.
    fn begin_frame(&mut self) -> Result<(), RenderError>;

    fn draw_eye(&mut self, eye: &EyeView, atlas_scale: [f32; 2]);

    fn end_frame(&mut self, status: &ViewerStatus) -> Result<(), RenderError>;

    /// Destroys GPU buffers and textures. Nothing draws afterwards.
    fn release(&mut self);
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct EyeUniform {
    model_view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    tex_scale: [f32; 2],
    _pad: [f32; 2],
}

const EYE_UNIFORM_SIZE: u64 = std::mem::size_of::<EyeUniform>() as u64;
const INITIAL_EYE_SLOTS: u64 = 4;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

// One buffer per attribute, bound to slots 0..=2.
const POSITION_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 12,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x3,
    }],
};
const UV_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 8,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        offset: 0,
        shader_location: 1,
        format: wgpu::VertexFormat::Float32x2,
    }],
};
const UV_OFFSET_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 8,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        offset: 0,
        shader_location: 2,
        format: wgpu::VertexFormat::Float32x2,
    }],
};

pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Levels 1.. of the mip chain, each half the size of the previous one.
pub fn downsampled_levels(base: &RgbaImage) -> Vec<RgbaImage> {
    let (mut width, mut height) = base.dimensions();
    let mut levels: Vec<RgbaImage> = Vec::new();
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        let source = levels.last().unwrap_or(base);
        let next = imageops::resize(source, width, height, FilterType::Triangle);
        levels.push(next);
    }
    levels
}

/// Scales an image down (Lanczos3) so neither side exceeds `max`.
pub fn fit_to_limit(image: &RgbaImage, max: u32) -> Cow<'_, RgbaImage> {
    let (width, height) = image.dimensions();
    if width <= max && height <= max {
        return Cow::Borrowed(image);
    }
    let scale = max as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).clamp(1, max);
    let new_height = ((height as f32 * scale) as u32).clamp(1, max);
    warn!(
        "Image {}x{} exceeds the GPU texture limit {}, scaling to {}x{}",
        width, height, max, new_width, new_height
    );
    Cow::Owned(imageops::resize(image, new_width, new_height, FilterType::Lanczos3))
}

/// Live textures are rewritten in place at the source's size, so they
/// cannot be scaled down like still images.
pub fn check_texture_size(size: (u32, u32), max: u32) -> Result<(), RenderError> {
    if size.0 > max || size.1 > max {
        return Err(RenderError::TextureTooLarge { size, max });
    }
    Ok(())
}

struct MeshBuffers {
    positions: wgpu::Buffer,
    uvs: wgpu::Buffer,
    uv_offsets: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn destroy(&self) {
        self.positions.destroy();
        self.uvs.destroy();
        self.uv_offsets.destroy();
        self.indices.destroy();
    }
}

struct AtlasTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

struct EyeSlots {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u64,
}

struct PendingFrame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    eyes: Vec<(Viewport, EyeUniform)>,
}

pub struct WgpuRenderer {
    window: Arc<Window>,
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,

    eye_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    eye_slots: EyeSlots,
    depth: (wgpu::Texture, wgpu::TextureView),

    mesh: Option<MeshBuffers>,
    atlas: Option<AtlasTexture>,
    frame: Option<PendingFrame>,
    overlay: Overlay,
    released: bool,
}

impl WgpuRenderer {
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(RenderError::NoAdapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let eye_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("eye_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(EYE_UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("atlas_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let stride = aligned_stride(
            EYE_UNIFORM_SIZE,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let eye_slots = create_eye_slots(&device, &eye_layout, stride, INITIAL_EYE_SLOTS);

        let pipeline = build_pipeline(
            &device,
            &shader::cube_program(),
            &[&eye_layout, &texture_layout],
            config.format,
        )
        .await?;

        let depth = create_depth_texture(&device, config.width, config.height);
        let overlay = Overlay::new(window.as_ref(), &device, config.format);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            pipeline,
            eye_layout,
            texture_layout,
            sampler,
            eye_slots,
            depth,
            mesh: None,
            atlas: None,
            frame: None,
            overlay,
            released: false,
        })
    }

    /// Feeds a window event to the overlay. Returns true when the overlay
    /// consumed it.
    pub fn on_window_event(&mut self, event: &WindowEvent<'_>) -> bool {
        self.overlay.on_event(event)
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.overlay.set_loading(loading);
    }

    pub fn take_actions(&mut self) -> Vec<UiAction> {
        self.overlay.take_actions()
    }

    /// Reconfigures the surface at its current size, after `SurfaceError::Lost`.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn ensure_eye_capacity(&mut self, eyes: u64) {
        if eyes <= self.eye_slots.capacity {
            return;
        }
        let capacity = eyes.next_power_of_two();
        debug!("Growing eye uniform buffer to {} slots", capacity);
        self.eye_slots.buffer.destroy();
        self.eye_slots = create_eye_slots(&self.device, &self.eye_layout, self.eye_slots.stride, capacity);
    }
}

fn create_eye_slots(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, stride: u64, capacity: u64) -> EyeSlots {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("eye_uniform_buffer"),
        size: stride * capacity,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("eye_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(EYE_UNIFORM_SIZE),
            }),
        }],
    });
    EyeSlots {
        buffer,
        bind_group,
        stride,
        capacity,
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Compiles the program and builds the pipeline inside a validation error
/// scope so a bad shader surfaces as `RenderError::Program`.
async fn build_pipeline(
    device: &wgpu::Device,
    program: &ShaderProgram,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(program.source)),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("cube_pipeline_layout"),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("cube_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: program.vertex_entry,
            buffers: &[POSITION_LAYOUT, UV_LAYOUT, UV_OFFSET_LAYOUT],
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: program.fragment_entry,
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    });

    match device.pop_error_scope().await {
        Some(err) => Err(RenderError::Program(err.to_string())),
        None => Ok(pipeline),
    }
}

fn write_level(queue: &wgpu::Queue, texture: &wgpu::Texture, level: u32, image: &RgbaImage) {
    let (width, height) = image.dimensions();
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

impl EyeRenderer for WgpuRenderer {
    fn upload_mesh(&mut self, mesh: &CubeMesh) {
        if let Some(old) = self.mesh.take() {
            old.destroy();
        }
        let vertex = |label, contents: &[u8]| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            })
        };
        let positions = vertex("cube_positions", bytemuck::cast_slice(&mesh.positions));
        let uvs = vertex("cube_face_uvs", bytemuck::cast_slice(&mesh.uvs));
        let uv_offsets = vertex("cube_face_offsets", bytemuck::cast_slice(&mesh.uv_offsets));
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cube_indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        debug!(
            "Uploaded cube mesh: {} vertices, {} indices",
            mesh.vertex_count(),
            mesh.index_count()
        );
        self.mesh = Some(MeshBuffers {
            positions,
            uvs,
            uv_offsets,
            indices,
            index_count: mesh.index_count() as u32,
        });
    }

    fn allocate_texture(&mut self, image: &RgbaImage, mipmapped: bool) -> Result<(u32, u32), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RenderError::EmptyImage);
        }
        let max = self.max_texture_dimension();
        let image = if mipmapped {
            fit_to_limit(image, max)
        } else {
            check_texture_size(image.dimensions(), max)?;
            Cow::Borrowed(image)
        };
        let (width, height) = image.dimensions();
        let mip_levels = if mipmapped { mip_level_count(width, height) } else { 1 };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("atlas_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        write_level(&self.queue, &texture, 0, &image);
        if mipmapped {
            for (level, mip) in downsampled_levels(&image).iter().enumerate() {
                write_level(&self.queue, &texture, level as u32 + 1, mip);
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("atlas_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        if let Some(old) = self.atlas.take() {
            old.texture.destroy();
        }
        info!("Allocated {}x{} atlas texture ({} mip levels)", width, height, mip_levels);
        self.atlas = Some(AtlasTexture {
            texture,
            bind_group,
            size: (width, height),
        });
        Ok((width, height))
    }

    fn update_texture(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
        let atlas = self.atlas.as_ref().ok_or(RenderError::NoTexture)?;
        if image.dimensions() != atlas.size {
            return Err(RenderError::SizeMismatch {
                expected: atlas.size,
                actual: image.dimensions(),
            });
        }
        write_level(&self.queue, &atlas.texture, 0, image);
        Ok(())
    }

    fn target_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_target(&mut self, size: (u32, u32)) {
        let (width, height) = size;
        if width == 0 || height == 0 || (width, height) == self.target_size() {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = create_depth_texture(&self.device, width, height);
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        // A frame left open by an earlier error is dropped unpresented.
        self.frame = None;
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(PendingFrame {
            output,
            view,
            eyes: Vec::with_capacity(2),
        });
        Ok(())
    }

    fn draw_eye(&mut self, eye: &EyeView, atlas_scale: [f32; 2]) {
        let target = self.target_size();
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let viewport = eye.viewport.clamped_to(target);
        if viewport.is_empty() {
            return;
        }
        frame.eyes.push((
            viewport,
            EyeUniform {
                model_view: eye.view.to_cols_array_2d(),
                projection: eye.projection.to_cols_array_2d(),
                tex_scale: atlas_scale,
                _pad: [0.0; 2],
            },
        ));
    }

    fn end_frame(&mut self, status: &ViewerStatus) -> Result<(), RenderError> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };

        self.ensure_eye_capacity(frame.eyes.len() as u64);
        let stride = self.eye_slots.stride;
        for (i, (_, uniform)) in frame.eyes.iter().enumerate() {
            self.queue
                .write_buffer(&self.eye_slots.buffer, i as u64 * stride, bytemuck::bytes_of(uniform));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("cube_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.1,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: true,
                    }),
                    stencil_ops: None,
                }),
            });

            if let (Some(mesh), Some(atlas)) = (&self.mesh, &self.atlas) {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(1, &atlas.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.positions.slice(..));
                pass.set_vertex_buffer(1, mesh.uvs.slice(..));
                pass.set_vertex_buffer(2, mesh.uv_offsets.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint16);

                for (i, (viewport, _)) in frame.eyes.iter().enumerate() {
                    pass.set_viewport(
                        viewport.x as f32,
                        viewport.y as f32,
                        viewport.width as f32,
                        viewport.height as f32,
                        0.0,
                        1.0,
                    );
                    pass.set_scissor_rect(viewport.x, viewport.y, viewport.width, viewport.height);
                    pass.set_bind_group(0, &self.eye_slots.bind_group, &[(i as u64 * stride) as u32]);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }

        self.overlay.paint(
            self.window.as_ref(),
            &self.device,
            &self.queue,
            &mut encoder,
            &frame.view,
            [self.config.width, self.config.height],
            status,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.output.present();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.frame = None;
        if let Some(mesh) = self.mesh.take() {
            mesh.destroy();
        }
        if let Some(atlas) = self.atlas.take() {
            atlas.texture.destroy();
        }
        self.eye_slots.buffer.destroy();
        self.depth.0.destroy();
        self.released = true;
        info!("Renderer resources released");
    }
}
