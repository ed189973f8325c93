mod common;

use common::{solid_image, viewer, viewer_with_backend, Call, RecordingRenderer};

use cubemap_viewer::config::ViewerConfig;
use cubemap_viewer::media::{FrameStream, MediaSource};
use cubemap_viewer::presentation::{
    BackendEvent, BackendFrame, BackendKind, DeviceId, FrameOfReference, MockBackend, MockConfig,
    PresentationBackend, PresentationEvent, PresentationState, ReferenceKind, ReplySink, SessionId,
    SessionOptions, SessionStatus, Ticket,
};
use cubemap_viewer::scheduler::FrameSource;
use cubemap_viewer::view::{PlanKind, RenderPlan, Viewport};
use cubemap_viewer::{RenderError, Viewer};
use glam::Mat4;
use std::sync::mpsc::sync_channel;

const EPS: f32 = 1e-5;

fn start_stereo(viewer: &mut Viewer<RecordingRenderer>) {
    viewer.toggle_presentation();
    let events = viewer.pump();
    assert_eq!(
        events,
        vec![PresentationEvent::SessionStarted {
            kind: BackendKind::Stereo
        }]
    );
}

#[test]
fn loop_waits_for_first_media() {
    let mut viewer = viewer((800, 600));
    assert!(!viewer.is_started());
    assert!(!viewer.wants_host_frame());
    assert_eq!(viewer.on_host_frame().unwrap(), None);
    assert!(viewer.renderer().frames().is_empty());

    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    assert!(viewer.is_started());
    assert!(viewer.wants_host_frame());
}

#[test]
fn mono_frame_draws_one_eye_over_the_full_viewport() {
    let mut viewer = viewer((2000, 1000));
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();

    let report = viewer.on_host_frame().unwrap().expect("host frame was armed");
    assert_eq!(report.source, FrameSource::Host);
    assert!(matches!(report.plan, Some(RenderPlan::Mono(_))));

    let eyes = viewer.renderer().last_frame();
    assert_eq!(eyes.len(), 1);
    assert_eq!(eyes[0].viewport, Viewport::new(0, 0, 2000, 1000));
    let expected = Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.01, 10000.0);
    assert!(eyes[0].projection.abs_diff_eq(expected, EPS));
    assert!(eyes[0].view.abs_diff_eq(Mat4::IDENTITY, EPS));

    // The loop re-arms itself.
    assert!(viewer.wants_host_frame());
    assert!(viewer.on_host_frame().unwrap().is_some());
    assert_eq!(viewer.renderer().frames().len(), 2);
}

#[test]
fn every_eye_uses_the_atlas_scale_of_the_layout() {
    let mut viewer = viewer((640, 480));
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    viewer.on_host_frame().unwrap();
    let scales: Vec<_> = viewer
        .renderer()
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::DrawEye { atlas_scale, .. } => Some(*atlas_scale),
            _ => None,
        })
        .collect();
    assert_eq!(scales, vec![[1.0 / 3.0, 0.5]]);
    assert_eq!(
        viewer.renderer().calls[0],
        Call::UploadMesh {
            vertices: 24,
            indices: 36
        }
    );
}

#[test]
fn stereo_session_draws_two_half_width_eyes_with_backend_matrices() {
    let (mut viewer, state) = viewer_with_backend((2000, 1000), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);

    let report = viewer.on_backend_tick().unwrap().expect("backend frame was armed");
    assert_eq!(report.source, FrameSource::Backend);

    let eyes = viewer.renderer().last_frame();
    assert_eq!(eyes.len(), 2);
    assert_eq!(eyes[0].viewport, Viewport::new(0, 0, 1000, 1000));
    assert_eq!(eyes[1].viewport, Viewport::new(1000, 0, 1000, 1000));

    // Eye offsets of the mock headset, not the mono camera.
    assert!((eyes[0].view.w_axis.x - 0.035_95).abs() < EPS);
    assert!((eyes[1].view.w_axis.x + 0.035_95).abs() < EPS);
    let mono = Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.01, 10000.0);
    assert!(!eyes[0].projection.abs_diff_eq(mono, 1e-3));
    assert!(eyes[0].projection.z_axis.x != 0.0, "headset frusta are asymmetric");

    assert_eq!(state.lock().unwrap().submitted_frames, 1);
    assert_eq!(viewer.status().plan, PlanKind::Stereo);
}

#[test]
fn exactly_one_source_is_armed_across_a_toggle() {
    let (mut viewer, _) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Host));

    viewer.toggle_presentation();
    // Requested but not granted yet: still on the host path.
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Host));

    viewer.pump();
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Backend));
    assert!(!viewer.wants_host_frame());
}

#[test]
fn host_firing_during_a_session_is_ignored() {
    let (mut viewer, _) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);

    let frames_before = viewer.renderer().frames().len();
    assert_eq!(viewer.on_host_frame().unwrap(), None);
    assert_eq!(viewer.renderer().frames().len(), frames_before);
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Backend));
}

#[test]
fn device_ending_the_session_returns_to_mono() {
    let (mut viewer, state) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);
    viewer.on_backend_tick().unwrap();

    state.lock().unwrap().end_requested = true;
    assert_eq!(viewer.pump(), vec![PresentationEvent::SessionStopped]);
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Host));
    assert_eq!(viewer.on_backend_tick().unwrap(), None);

    let report = viewer.on_host_frame().unwrap().unwrap();
    assert!(matches!(report.plan, Some(RenderPlan::Mono(_))));
    assert_eq!(viewer.status().session, SessionStatus::Ended);
}

#[test]
fn toggling_off_goes_back_to_host_immediately() {
    let (mut viewer, _) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);

    viewer.toggle_presentation();
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Host));
    // The backend's own end notice is stale by now.
    assert!(viewer.pump().is_empty());
    assert_eq!(viewer.status().plan, PlanKind::Mono);
}

#[test]
fn rejected_session_keeps_rendering_mono() {
    let mut mock = MockConfig::stereo();
    mock.reject_sessions = true;
    let (mut viewer, _) = viewer_with_backend((800, 600), mock);
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();

    viewer.toggle_presentation();
    assert!(viewer.pump().is_empty());
    assert_eq!(viewer.status().presentation, PresentationState::BackendDetected);
    assert_eq!(viewer.scheduler().armed(), Some(FrameSource::Host));
    assert!(viewer.on_host_frame().unwrap().is_some());
}

#[test]
fn immersive_session_uses_backend_framebuffer_and_restores_window_size() {
    let (mut viewer, _) = viewer_with_backend((1280, 720), MockConfig::immersive());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    viewer.toggle_presentation();
    viewer.pump();

    let report = viewer.on_backend_tick().unwrap().unwrap();
    assert!(matches!(report.plan, Some(RenderPlan::Immersive(ref eyes)) if eyes.len() == 2));
    assert_eq!(viewer.renderer().size, (1512, 1680));
    let eyes = viewer.renderer().last_frame();
    assert_eq!(eyes[0].viewport, Viewport::new(0, 0, 756, 1680));
    assert_eq!(eyes[1].viewport, Viewport::new(756, 0, 756, 1680));

    // Window resizes while immersive leave the framebuffer alone.
    viewer.on_resize((1600, 900));
    assert_eq!(viewer.renderer().size, (1512, 1680));

    viewer.toggle_presentation();
    assert_eq!(viewer.renderer().size, (1600, 900));
}

#[test]
fn pointer_press_is_ignored_while_presenting() {
    let (mut viewer, _) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);

    viewer.on_pointer_down(100.0, 100.0);
    viewer.on_pointer_move(200.0, 100.0);
    assert!(viewer.orientation().view_matrix().abs_diff_eq(Mat4::IDENTITY, EPS));
}

#[test]
fn drag_turns_the_view_and_resize_resets_it() {
    let mut viewer = viewer((800, 600));
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();

    viewer.on_pointer_down(100.0, 100.0);
    viewer.on_pointer_move(200.0, 102.0);
    viewer.on_pointer_up();
    viewer.on_pointer_move(400.0, 400.0);
    let (pitch, yaw) = viewer.orientation().angles_degrees();
    assert!(pitch.abs() < EPS, "small vertical jitter snaps away");
    assert!((yaw + 10.0).abs() < 1e-3);

    viewer.on_resize((1000, 500));
    assert!(viewer.orientation().view_matrix().abs_diff_eq(Mat4::IDENTITY, EPS));
    let expected = Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.01, 10000.0);
    assert!(viewer.projection().abs_diff_eq(expected, EPS));
    assert_eq!(viewer.renderer().size, (1000, 500));
}

#[test]
fn stream_frames_refresh_the_texture_in_place() {
    let mut viewer = viewer((800, 600));
    let (tx, rx) = sync_channel(2);
    viewer
        .install_media(MediaSource::Stream(FrameStream {
            first: solid_image(6, 4),
            frames: rx,
        }))
        .unwrap();

    tx.send(solid_image(6, 4)).unwrap();
    let report = viewer.on_host_frame().unwrap().unwrap();
    assert!(report.texture_updated);

    tx.send(solid_image(5, 5)).unwrap();
    let report = viewer.on_host_frame().unwrap().unwrap();
    assert!(!report.texture_updated, "mismatched frame is skipped");

    let calls = &viewer.renderer().calls;
    let allocations = calls
        .iter()
        .filter(|c| matches!(c, Call::AllocateTexture { .. }))
        .count();
    assert_eq!(allocations, 1);
    assert!(calls.contains(&Call::AllocateTexture {
        size: (6, 4),
        mipmapped: false
    }));
}

#[test]
fn release_is_explicit_and_final() {
    let (mut viewer, _) = viewer_with_backend((800, 600), MockConfig::stereo());
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    start_stereo(&mut viewer);

    viewer.release();
    assert!(viewer.renderer().calls.contains(&Call::Release));
    assert_eq!(viewer.scheduler().armed(), None);
    assert!(!viewer.presentation().is_session_active());
    assert!(matches!(
        viewer.install_media(MediaSource::Image(solid_image(6, 4))),
        Err(RenderError::Released)
    ));
}

/// Mock headset that never reports a pose.
struct PoselessBackend(MockBackend);

impl PresentationBackend for PoselessBackend {
    fn name(&self) -> &str {
        "poseless"
    }

    fn kind(&self) -> BackendKind {
        self.0.kind()
    }

    fn connect(&mut self, sink: ReplySink) {
        self.0.connect(sink)
    }

    fn enumerate_devices(&mut self, ticket: Ticket) {
        self.0.enumerate_devices(ticket)
    }

    fn request_session(&mut self, device: DeviceId, options: SessionOptions, ticket: Ticket) {
        self.0.request_session(device, options, ticket)
    }

    fn request_frame_of_reference(&mut self, session: SessionId, kind: ReferenceKind, ticket: Ticket) {
        self.0.request_frame_of_reference(session, kind, ticket)
    }

    fn end_session(&mut self, session: SessionId) {
        self.0.end_session(session)
    }

    fn request_animation_frame(&mut self, session: SessionId) {
        self.0.request_animation_frame(session)
    }

    fn take_frame(&mut self, session: SessionId, reference: &FrameOfReference) -> Option<BackendFrame> {
        self.0
            .take_frame(session, reference)
            .map(|_| BackendFrame { pose: None })
    }

    fn submit_frame(&mut self, session: SessionId) {
        self.0.submit_frame(session)
    }

    fn poll_events(&mut self) -> Vec<BackendEvent> {
        self.0.poll_events()
    }
}

#[test]
fn missing_pose_skips_drawing_but_keeps_the_loop_alive() {
    let backend: Box<dyn PresentationBackend> = Box::new(PoselessBackend(MockBackend::new(MockConfig::stereo())));
    let mut viewer = Viewer::new(&ViewerConfig::default(), RecordingRenderer::new((800, 600)), Some(backend)).unwrap();
    viewer.pump();
    viewer.install_media(MediaSource::Image(solid_image(6, 4))).unwrap();
    viewer.toggle_presentation();
    viewer.pump();

    for _ in 0..3 {
        let report = viewer.on_backend_tick().unwrap().unwrap();
        assert_eq!(report.plan, None);
        assert!(viewer.wants_backend_frame());
    }
    assert!(viewer.renderer().frames().iter().all(|eyes| eyes.is_empty()));
}
