// viewer.rs - render context, frame loop and input routing
//
// The viewer owns everything one frame needs: orientation, projection,
// presentation controller, scheduler, texture updater and the renderer.
// The host forwards window events and calls the frame entry points; the
// viewer decides which path (host or backend) is armed.

use glam::Mat4;
use log::{debug, info};

use crate::atlas::AtlasLayout;
use crate::config::{CameraSettings, ConfigError, ViewerConfig};
use crate::media::{MediaSource, TextureUpdater};
use crate::mesh::CubeMesh;
use crate::orientation::{DragPolicy, OrientationModel, PointerState};
use crate::presentation::{
    BackendFrame, BackendKind, HeadPose, PresentationBackend, PresentationController, PresentationEvent,
    PresentationState, SessionOptions, SessionStatus,
};
use crate::renderer::{EyeRenderer, RenderError};
use crate::scheduler::{FrameScheduler, FrameSource};
use crate::view::{EyeMatrices, EyeView, PlanKind, RenderPlan, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Empty,
    Image {
        width: u32,
        height: u32,
    },
    Stream {
        width: u32,
        height: u32,
        frames: u64,
        ended: bool,
    },
}

/// Snapshot shown by the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerStatus {
    pub plan: PlanKind,
    pub presentation: PresentationState,
    pub session: SessionStatus,
    pub backend: Option<String>,
    pub device: Option<String>,
    pub media: MediaStatus,
    pub pitch_degrees: f32,
    pub yaw_degrees: f32,
    pub policy: DragPolicy,
    pub frames: u64,
}

/// What a frame entry point did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub source: FrameSource,
    /// `None` when the backend had no pose and nothing was drawn.
    pub plan: Option<RenderPlan>,
    pub texture_updated: bool,
}

struct RenderContext {
    orientation: OrientationModel,
    pointer: PointerState,
    camera: CameraSettings,
    window_size: (u32, u32),
    projection: Mat4,
}

impl RenderContext {
    fn new(config: &ViewerConfig, window_size: (u32, u32)) -> Self {
        Self {
            orientation: OrientationModel::new(config.drag_policy, config.sensitivity),
            pointer: PointerState::default(),
            camera: config.camera,
            window_size,
            projection: config.camera.projection(Viewport::full(window_size).aspect()),
        }
    }

    fn reset(&mut self, window_size: (u32, u32)) {
        self.window_size = window_size;
        self.projection = self.camera.projection(Viewport::full(window_size).aspect());
        self.orientation.reset();
        self.pointer.release();
    }
}

pub struct Viewer<R: EyeRenderer> {
    renderer: R,
    context: RenderContext,
    controller: PresentationController,
    scheduler: FrameScheduler,
    media: TextureUpdater,
    layout: AtlasLayout,
    session_kind: Option<BackendKind>,
    /// Set while an immersive session has resized the target.
    immersive_target: Option<(u32, u32)>,
    started: bool,
    released: bool,
}

impl<R: EyeRenderer> Viewer<R> {
    /// Builds the cube for the configured layout, uploads it and starts
    /// backend detection. Rendering starts with the first installed media.
    pub fn new(
        config: &ViewerConfig,
        mut renderer: R,
        backend: Option<Box<dyn PresentationBackend>>,
    ) -> Result<Self, ConfigError> {
        let layout = config.layout.resolve()?;
        let mesh = CubeMesh::build(&layout);
        renderer.upload_mesh(&mesh);

        let window_size = renderer.target_size();
        let options = SessionOptions {
            depth_near: config.camera.near,
            depth_far: config.camera.far,
        };
        let mut controller = PresentationController::new(backend, options);
        controller.detect();

        Ok(Self {
            renderer,
            context: RenderContext::new(config, window_size),
            controller,
            scheduler: FrameScheduler::new(),
            media: TextureUpdater::new(),
            layout,
            session_kind: None,
            immersive_target: None,
            started: false,
            released: false,
        })
    }

    /// Installs a decoded source. The first one starts the frame loop.
    pub fn install_media(&mut self, source: MediaSource) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        self.media.install(source, &mut self.renderer)?;
        if !self.started {
            self.started = true;
            info!("Render loop started");
            self.rearm();
        }
        Ok(())
    }

    /// Drains backend replies and events and switches paths accordingly.
    pub fn pump(&mut self) -> Vec<PresentationEvent> {
        let events = self.controller.pump();
        for event in &events {
            self.apply(*event);
        }
        events
    }

    fn apply(&mut self, event: PresentationEvent) {
        match event {
            PresentationEvent::SessionStarted { kind } => {
                info!("Switching to {:?} presentation", kind);
                self.session_kind = Some(kind);
                self.context.pointer.release();
            }
            PresentationEvent::SessionStopped => {
                info!("Back to mono rendering");
                self.session_kind = None;
                if self.immersive_target.take().is_some() {
                    self.renderer.resize_target(self.context.window_size);
                }
            }
        }
        if self.started {
            self.rearm();
        }
    }

    /// Arms the callback for the current path; replaces any armed one.
    fn rearm(&mut self) {
        if self.released {
            return;
        }
        if self.controller.is_session_active() {
            self.scheduler.arm(FrameSource::Backend);
            self.controller.request_animation_frame();
        } else {
            self.scheduler.arm(FrameSource::Host);
        }
    }

    pub fn toggle_presentation(&mut self) {
        if let Some(event) = self.controller.toggle() {
            self.apply(event);
        }
    }

    pub fn deactivate_presentation(&mut self) {
        if let Some(event) = self.controller.deactivate() {
            self.apply(event);
        }
    }

    /// A resize resets the orientation and recomputes the mono projection.
    pub fn on_resize(&mut self, size: (u32, u32)) {
        if size.0 == 0 || size.1 == 0 {
            return;
        }
        debug!("Resize to {}x{}", size.0, size.1);
        self.context.reset(size);
        if self.immersive_target.is_none() {
            self.renderer.resize_target(size);
        }
    }

    pub fn on_pointer_down(&mut self, x: f64, y: f64) {
        if self.controller.is_session_active() {
            debug!("Ignoring pointer press during a presentation session");
            return;
        }
        self.context.pointer.press(x, y);
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        if let Some((dx, dy)) = self.context.pointer.move_to(x, y) {
            self.context.orientation.apply_drag(dx, dy);
        }
    }

    pub fn on_pointer_up(&mut self) {
        self.context.pointer.release();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn wants_host_frame(&self) -> bool {
        self.scheduler.is_armed(FrameSource::Host)
    }

    pub fn wants_backend_frame(&self) -> bool {
        self.scheduler.is_armed(FrameSource::Backend)
    }

    /// Host redraw callback. Does nothing unless the host path is armed.
    pub fn on_host_frame(&mut self) -> Result<Option<FrameReport>, RenderError> {
        if !self.scheduler.fire(FrameSource::Host) {
            return Ok(None);
        }
        let texture_updated = self.media.refresh(&mut self.renderer);
        let size = self.renderer.target_size();
        let plan = RenderPlan::Mono(EyeView::new(
            Viewport::full(size),
            EyeMatrices {
                view: self.context.orientation.view_matrix(),
                projection: self.context.projection,
            },
        ));
        let result = self.draw(&plan);
        self.rearm();
        result.map(|()| {
            Some(FrameReport {
                source: FrameSource::Host,
                plan: Some(plan),
                texture_updated,
            })
        })
    }

    /// Backend frame callback. Polls the backend for its next frame and
    /// renders it when the backend path is armed and a frame is due.
    pub fn on_backend_tick(&mut self) -> Result<Option<FrameReport>, RenderError> {
        if !self.scheduler.is_armed(FrameSource::Backend) {
            return Ok(None);
        }
        let Some(frame) = self.controller.take_frame() else {
            return Ok(None);
        };
        self.scheduler.fire(FrameSource::Backend);

        let texture_updated = self.media.refresh(&mut self.renderer);
        let plan = self.session_plan(frame);
        let result = match &plan {
            Some(plan) => self.draw(plan),
            None => {
                debug!("No pose for this frame, skipping draw");
                self.draw_empty()
            }
        };
        self.controller.submit_frame();
        self.rearm();
        result.map(|()| {
            Some(FrameReport {
                source: FrameSource::Backend,
                plan,
                texture_updated,
            })
        })
    }

    /// Clears and draws only the overlay; used before any media is loaded.
    pub fn on_idle_frame(&mut self) -> Result<(), RenderError> {
        if self.started {
            return Ok(());
        }
        self.draw_empty()
    }

    fn session_plan(&mut self, frame: BackendFrame) -> Option<RenderPlan> {
        match frame.pose? {
            HeadPose::Stereo { left, right } => {
                let (left_vp, right_vp) = Viewport::split_halves(self.renderer.target_size());
                Some(RenderPlan::Stereo([
                    EyeView::new(left_vp, left),
                    EyeView::new(right_vp, right),
                ]))
            }
            HeadPose::Immersive { framebuffer, views } => {
                if self.renderer.target_size() != framebuffer {
                    debug!("Resizing target to framebuffer {}x{}", framebuffer.0, framebuffer.1);
                    self.renderer.resize_target(framebuffer);
                }
                self.immersive_target = Some(framebuffer);
                Some(RenderPlan::Immersive(
                    views
                        .into_iter()
                        .map(|(viewport, matrices)| EyeView::new(viewport.clamped_to(framebuffer), matrices))
                        .collect(),
                ))
            }
        }
    }

    fn draw(&mut self, plan: &RenderPlan) -> Result<(), RenderError> {
        self.renderer.begin_frame()?;
        for eye in plan.eyes() {
            self.renderer.draw_eye(eye, self.layout.scale);
        }
        let status = self.status();
        self.renderer.end_frame(&status)
    }

    fn draw_empty(&mut self) -> Result<(), RenderError> {
        self.renderer.begin_frame()?;
        let status = self.status();
        self.renderer.end_frame(&status)
    }

    pub fn status(&self) -> ViewerStatus {
        let (pitch, yaw) = self.context.orientation.angles_degrees();
        let plan = match self.session_kind {
            None => PlanKind::Mono,
            Some(BackendKind::Stereo) => PlanKind::Stereo,
            Some(BackendKind::Immersive) => PlanKind::Immersive,
        };
        ViewerStatus {
            plan,
            presentation: self.controller.state(),
            session: self.controller.session_status(),
            backend: self.controller.backend_name().map(str::to_string),
            device: self.controller.device().map(|d| d.name.clone()),
            media: self.media.status(),
            pitch_degrees: pitch,
            yaw_degrees: yaw,
            policy: self.context.orientation.policy(),
            frames: self.scheduler.frames(),
        }
    }

    pub fn orientation(&self) -> &OrientationModel {
        &self.context.orientation
    }

    pub fn projection(&self) -> Mat4 {
        self.context.projection
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn presentation(&self) -> &PresentationController {
        &self.controller
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Ends any session and frees GPU resources. Never called implicitly;
    /// the viewer renders nothing afterwards.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.deactivate_presentation();
        self.scheduler.disarm();
        self.renderer.release();
        self.released = true;
        info!("Viewer released");
    }
}
