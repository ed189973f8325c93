// overlay.rs - egui menu, presentation toggle and status bar drawn over the scene

use winit::event::WindowEvent;
use winit::window::Window;

use crate::presentation::{PresentationState, SessionStatus};
use crate::viewer::{MediaStatus, ViewerStatus};

/// Requests raised by the overlay, handled by the host after the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    OpenFile,
    TogglePresentation,
    Exit,
}

/// Label of the presentation button, or `None` when no device can present.
pub fn toggle_label(status: &ViewerStatus) -> Option<&'static str> {
    match (status.presentation, status.session) {
        (PresentationState::NoBackend, _) => None,
        (PresentationState::SessionActive, _) => Some("Exit VR"),
        (_, SessionStatus::Requested) => Some("Cancel VR"),
        _ => Some("Enter VR"),
    }
}

/// Status bar fields, left to right.
pub fn status_fields(status: &ViewerStatus, loading: bool) -> Vec<String> {
    let mut fields = Vec::new();
    if loading {
        fields.push("Loading...".to_string());
    }
    fields.push(format!("Mode: {}", status.plan.label()));
    match (&status.backend, &status.device) {
        (Some(backend), Some(device)) => fields.push(format!("{backend}: {device}")),
        (Some(backend), None) => fields.push(format!("{backend}: no device")),
        (None, _) => fields.push("VR not supported".to_string()),
    }
    match status.media {
        MediaStatus::Empty => fields.push("No media".to_string()),
        MediaStatus::Image { width, height } => fields.push(format!("Image {width}x{height}")),
        MediaStatus::Stream {
            width,
            height,
            frames,
            ended,
        } => fields.push(format!(
            "Stream {width}x{height} #{frames}{}",
            if ended { " (ended)" } else { "" }
        )),
    }
    fields.push(format!("Pitch: {:.1}°", status.pitch_degrees));
    fields.push(format!("Yaw: {:.1}°", status.yaw_degrees));
    fields.push(format!("Drag: {}", status.policy.label()));
    fields.push(format!("Frames: {}", status.frames));
    fields
}

pub struct Overlay {
    ctx: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    actions: Vec<UiAction>,
    loading: bool,
}

impl Overlay {
    pub fn new(window: &Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let ctx = egui::Context::default();
        let mut state = egui_winit::State::new(window);
        state.set_pixels_per_point(window.scale_factor() as f32);
        let renderer = egui_wgpu::Renderer::new(device, format, None, 1);
        Self {
            ctx,
            state,
            renderer,
            actions: Vec::new(),
            loading: false,
        }
    }

    pub fn on_event(&mut self, event: &WindowEvent<'_>) -> bool {
        self.state.on_event(&self.ctx, event).consumed
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn take_actions(&mut self) -> Vec<UiAction> {
        std::mem::take(&mut self.actions)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn paint(
        &mut self,
        window: &Window,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        size_in_pixels: [u32; 2],
        status: &ViewerStatus,
    ) {
        let raw_input = self.state.take_egui_input(window);
        let loading = self.loading;
        let actions = &mut self.actions;
        let full_output = self.ctx.run(raw_input, |ctx| draw_ui(ctx, status, loading, actions));

        self.state
            .handle_platform_output(window, &self.ctx, full_output.platform_output);
        let clipped_primitives = self.ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels,
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &clipped_primitives, &screen_descriptor);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.renderer
                .render(&mut pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}

fn draw_ui(ctx: &egui::Context, status: &ViewerStatus, loading: bool, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open...").clicked() {
                    ui.close_menu();
                    actions.push(UiAction::OpenFile);
                }
                if ui.button("Exit").clicked() {
                    ui.close_menu();
                    actions.push(UiAction::Exit);
                }
            });

            if let Some(label) = toggle_label(status) {
                ui.separator();
                if ui.button(label).clicked() {
                    actions.push(UiAction::TogglePresentation);
                }
            }
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            for (i, field) in status_fields(status, loading).into_iter().enumerate() {
                if i > 0 {
                    ui.label("|");
                }
                if loading && i == 0 {
                    ui.label(egui::RichText::new(field).color(egui::Color32::YELLOW));
                } else {
                    ui.label(field);
                }
            }
        });
    });
}
