// mock.rs - deterministic presentation device for desktop runs and tests
//
// Eye parameters simulate an HTC Vive: 1512x1680 per eye, ~63 mm IPD.

use glam::{Mat4, Quat, Vec3};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{
    fov_projection, BackendError, BackendEvent, BackendFrame, BackendKind, BackendReply, DeviceId, DeviceInfo,
    FrameOfReference, HeadPose, PresentationBackend, ReferenceKind, ReplySink, SessionId, SessionOptions, Ticket,
};
use crate::view::{EyeMatrices, Viewport};

const EYE_WIDTH: u32 = 1512;
const EYE_HEIGHT: u32 = 1680;
const EYE_OFFSET: f32 = 0.035_95;

// up, down, left, right in degrees
const LEFT_FOV: [f32; 4] = [55.820_93, 55.707_8, 54.422_634, 51.269_485];
const RIGHT_FOV: [f32; 4] = [55.898_05, 55.614_716, 51.304_9, 54.374_104];

/// Calls received by the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    EnumerateDevices,
    RequestSession(DeviceId),
    RequestFrameOfReference(SessionId),
    EndSession(SessionId),
    RequestAnimationFrame(SessionId),
    SubmitFrame(SessionId),
}

/// Shared with whoever created the mock so it can be inspected and poked
/// while the controller owns the backend.
#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<BackendCall>,
    pub submitted_frames: u64,
    /// Makes the device end the active session on the next poll.
    pub end_requested: bool,
    /// Queued display activation events.
    pub pending_events: Vec<BackendEvent>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub kind: BackendKind,
    pub devices: Vec<DeviceInfo>,
    pub reject_sessions: bool,
    pub fail_reference: bool,
    pub frame_interval: Duration,
    /// Degrees of head yaw per delivered frame.
    pub yaw_per_frame: f32,
}

impl MockConfig {
    pub fn stereo() -> Self {
        Self {
            kind: BackendKind::Stereo,
            devices: vec![DeviceInfo {
                id: DeviceId(1),
                name: "Mock VRDisplay".into(),
                can_present: true,
            }],
            reject_sessions: false,
            fail_reference: false,
            frame_interval: Duration::ZERO,
            yaw_per_frame: 0.0,
        }
    }

    pub fn immersive() -> Self {
        Self {
            kind: BackendKind::Immersive,
            devices: vec![DeviceInfo {
                id: DeviceId(1),
                name: "Mock XRDevice".into(),
                can_present: true,
            }],
            ..Self::stereo()
        }
    }

    /// 90 Hz with a slow head turn, for interactive runs.
    pub fn animated(mut self) -> Self {
        self.frame_interval = Duration::from_micros(11_111);
        self.yaw_per_frame = 0.1;
        self
    }
}

pub struct MockBackend {
    config: MockConfig,
    sink: Option<ReplySink>,
    state: Arc<Mutex<MockState>>,
    next_session: u32,
    active: Option<(SessionId, SessionOptions)>,
    frame_armed: bool,
    last_frame: Option<Instant>,
    frames: u64,
    ended: Vec<SessionId>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            sink: None,
            state: Default::default(),
            next_session: 1,
            active: None,
            frame_armed: false,
            last_frame: None,
            frames: 0,
            ended: Vec::new(),
        }
    }

    pub fn state_handle(&self) -> Arc<Mutex<MockState>> {
        self.state.clone()
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }

    fn reply(&self, reply: BackendReply) {
        match &self.sink {
            Some(sink) => {
                if sink.send(reply).is_err() {
                    debug!("mock backend: reply receiver dropped");
                }
            }
            None => warn!("mock backend used before connect()"),
        }
    }

    fn is_active(&self, session: SessionId) -> bool {
        matches!(self.active, Some((id, _)) if id == session)
    }

    fn head_pose(&self, options: SessionOptions) -> HeadPose {
        let yaw = (self.frames as f32 * self.config.yaw_per_frame).to_radians();
        let head = Quat::from_rotation_y(yaw);
        let eye = |offset: f32, fov: [f32; 4]| EyeMatrices {
            view: Mat4::from_translation(Vec3::new(-offset, 0.0, 0.0)) * Mat4::from_quat(head.inverse()),
            projection: fov_projection(fov[0], fov[1], fov[2], fov[3], options.depth_near, options.depth_far),
        };
        let left = eye(-EYE_OFFSET, LEFT_FOV);
        let right = eye(EYE_OFFSET, RIGHT_FOV);

        match self.config.kind {
            BackendKind::Stereo => HeadPose::Stereo { left, right },
            BackendKind::Immersive => HeadPose::Immersive {
                framebuffer: (EYE_WIDTH, EYE_HEIGHT),
                views: vec![
                    (Viewport::new(0, 0, EYE_WIDTH / 2, EYE_HEIGHT), left),
                    (Viewport::new(EYE_WIDTH / 2, 0, EYE_WIDTH / 2, EYE_HEIGHT), right),
                ],
            },
        }
    }
}

impl PresentationBackend for MockBackend {
    fn name(&self) -> &str {
        match self.config.kind {
            BackendKind::Stereo => "mock-stereo",
            BackendKind::Immersive => "mock-immersive",
        }
    }

    fn kind(&self) -> BackendKind {
        self.config.kind
    }

    fn connect(&mut self, sink: ReplySink) {
        self.sink = Some(sink);
    }

    fn enumerate_devices(&mut self, ticket: Ticket) {
        self.record(BackendCall::EnumerateDevices);
        let result = if self.config.devices.is_empty() {
            Err(BackendError::NoDevice)
        } else {
            Ok(self.config.devices.clone())
        };
        self.reply(BackendReply::Devices { ticket, result });
    }

    fn request_session(&mut self, device: DeviceId, options: SessionOptions, ticket: Ticket) {
        self.record(BackendCall::RequestSession(device));
        let result = if self.config.reject_sessions {
            Err(BackendError::Rejected("mock device refused the session".into()))
        } else if self.active.is_some() {
            Err(BackendError::Rejected("a session is already running".into()))
        } else if !self.config.devices.iter().any(|d| d.id == device && d.can_present) {
            Err(BackendError::NoDevice)
        } else {
            let id = SessionId(self.next_session);
            self.next_session += 1;
            self.active = Some((id, options));
            self.frames = 0;
            Ok(id)
        };
        self.reply(BackendReply::Session { ticket, result });
    }

    fn request_frame_of_reference(&mut self, session: SessionId, kind: ReferenceKind, ticket: Ticket) {
        self.record(BackendCall::RequestFrameOfReference(session));
        let result = if !self.is_active(session) {
            Err(BackendError::SessionGone(session))
        } else if self.config.fail_reference {
            Err(BackendError::Unsupported("eye-level reference space".into()))
        } else {
            Ok(FrameOfReference { session, kind })
        };
        self.reply(BackendReply::Reference { ticket, result });
    }

    fn end_session(&mut self, session: SessionId) {
        self.record(BackendCall::EndSession(session));
        if self.is_active(session) {
            self.active = None;
            self.frame_armed = false;
            self.ended.push(session);
        }
    }

    fn request_animation_frame(&mut self, session: SessionId) {
        self.record(BackendCall::RequestAnimationFrame(session));
        if self.is_active(session) {
            self.frame_armed = true;
        }
    }

    fn take_frame(&mut self, session: SessionId, reference: &FrameOfReference) -> Option<BackendFrame> {
        let (_, options) = self.active.filter(|(id, _)| *id == session)?;
        if !self.frame_armed || reference.session != session {
            return None;
        }
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.config.frame_interval {
                return None;
            }
        }

        self.frame_armed = false;
        self.last_frame = Some(now);
        let pose = self.head_pose(options);
        self.frames += 1;

        Some(BackendFrame { pose: Some(pose) })
    }

    fn submit_frame(&mut self, session: SessionId) {
        self.record(BackendCall::SubmitFrame(session));
        if let Ok(mut state) = self.state.lock() {
            state.submitted_frames += 1;
        }
    }

    fn poll_events(&mut self) -> Vec<BackendEvent> {
        let mut events: Vec<BackendEvent> = self.ended.drain(..).map(BackendEvent::SessionEnded).collect();

        let (end_requested, mut pending) = match self.state.lock() {
            Ok(mut state) => (
                std::mem::take(&mut state.end_requested),
                std::mem::take(&mut state.pending_events),
            ),
            Err(_) => (false, Vec::new()),
        };

        if end_requested {
            if let Some((id, _)) = self.active.take() {
                self.frame_armed = false;
                events.push(BackendEvent::SessionEnded(id));
            }
        }
        events.append(&mut pending);
        events
    }
}
