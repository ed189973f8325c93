// main.rs - window, event loop, file loading and the presentation toggle

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use cubemap_viewer::config::{BackendChoice, ConfigError, SourceKind, ViewerConfig};
use cubemap_viewer::media::{spawn_image_loader, spawn_sequence_player, MediaSource};
use cubemap_viewer::overlay::UiAction;
use cubemap_viewer::presentation::{MockBackend, MockConfig, PresentationBackend};
use cubemap_viewer::{RenderError, Viewer, WgpuRenderer};

use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use thiserror::Error;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

const IMAGE_FILTER: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tga"];

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{e}");
        rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title("Cubemap Viewer")
            .set_description(&e.to_string())
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
        std::process::exit(1);
    }
}

fn make_backend(choice: BackendChoice) -> Option<Box<dyn PresentationBackend>> {
    match choice {
        BackendChoice::None => None,
        BackendChoice::MockStereo => Some(Box::new(MockBackend::new(MockConfig::stereo().animated()))),
        BackendChoice::MockImmersive => Some(Box::new(MockBackend::new(MockConfig::immersive().animated()))),
    }
}

fn start_loading(path: PathBuf, config: &ViewerConfig, tx: Sender<MediaSource>) {
    let as_sequence = match config.source_kind {
        SourceKind::Sequence => true,
        SourceKind::Image => false,
        SourceKind::Auto => path.is_dir(),
    };
    if as_sequence {
        spawn_sequence_player(path, config.sequence_fps, config.sequence_loop, tx);
    } else {
        spawn_image_loader(path, tx);
    }
}

fn pick_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Cubemap images", &IMAGE_FILTER)
        .pick_file()
}

/// Returns false when the loop has to exit.
fn handle_render_result(result: Result<(), RenderError>, viewer: &mut Viewer<WgpuRenderer>) -> bool {
    match result {
        Ok(()) => true,
        Err(RenderError::Surface(wgpu::SurfaceError::Lost)) => {
            viewer.renderer_mut().reconfigure();
            true
        }
        Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
            error!("GPU out of memory");
            false
        }
        Err(e) => {
            warn!("Render error: {e}");
            true
        }
    }
}

fn run() -> Result<(), StartupError> {
    let config = ViewerConfig::from_env()?;

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.window.title)
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)?,
    );

    let renderer = pollster::block_on(WgpuRenderer::new(window.clone()))?;
    let mut viewer = Viewer::new(&config, renderer, make_backend(config.backend))?;

    let (tx, rx) = channel::<MediaSource>();
    let mut cursor = (0.0f64, 0.0f64);
    let mut closing = false;

    if let Some(path) = config.source.clone() {
        viewer.renderer_mut().set_loading(true);
        start_loading(path, &config, tx.clone());
    } else {
        info!("No source given; press O or drop a file to open one");
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if closing {
            return;
        }

        if let Ok(source) = rx.try_recv() {
            viewer.renderer_mut().set_loading(false);
            if let Err(e) = viewer.install_media(source) {
                error!("Failed to install media: {e}");
            }
        }

        let mut open_requested = false;

        match event {
            Event::WindowEvent { event, .. } => {
                if viewer.renderer_mut().on_window_event(&event) {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        viewer.release();
                        closing = true;
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(size) => viewer.on_resize((size.width, size.height)),

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        viewer.on_resize((new_inner_size.width, new_inner_size.height))
                    }

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => open_requested = true,
                            Some(VirtualKeyCode::V) => viewer.toggle_presentation(),
                            Some(VirtualKeyCode::Escape) => viewer.deactivate_presentation(),
                            _ => {}
                        }
                    }

                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => match state {
                        ElementState::Pressed => viewer.on_pointer_down(cursor.0, cursor.1),
                        ElementState::Released => viewer.on_pointer_up(),
                    },

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = (position.x, position.y);
                        viewer.on_pointer_move(position.x, position.y);
                    }

                    WindowEvent::DroppedFile(path) => {
                        viewer.renderer_mut().set_loading(true);
                        start_loading(path, &config, tx.clone());
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                let result = if viewer.is_started() {
                    viewer.on_host_frame().map(|_| ())
                } else {
                    viewer.on_idle_frame()
                };
                if !handle_render_result(result, &mut viewer) {
                    *control_flow = ControlFlow::Exit;
                }
            }

            Event::MainEventsCleared => {
                viewer.pump();
                if viewer.wants_backend_frame() {
                    let result = viewer.on_backend_tick().map(|_| ());
                    if !handle_render_result(result, &mut viewer) {
                        *control_flow = ControlFlow::Exit;
                    }
                }
                if viewer.wants_host_frame() || !viewer.is_started() {
                    window.request_redraw();
                }
            }

            _ => {}
        }

        for action in viewer.renderer_mut().take_actions() {
            match action {
                UiAction::OpenFile => open_requested = true,
                UiAction::TogglePresentation => viewer.toggle_presentation(),
                UiAction::Exit => {
                    viewer.release();
                    closing = true;
                    *control_flow = ControlFlow::Exit;
                }
            }
        }

        if open_requested && !closing {
            if let Some(path) = pick_file() {
                viewer.renderer_mut().set_loading(true);
                start_loading(path, &config, tx.clone());
            }
        }
    })
}
