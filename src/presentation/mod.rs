//! Stereo / immersive presentation backends.
//!
//! A backend answers requests asynchronously: every request carries a
//! [`Ticket`] and the answer comes back as a [`BackendReply`] on the sink
//! handed over in [`PresentationBackend::connect`]. Unsolicited
//! notifications (session ended by the device, display activation) are
//! returned from [`PresentationBackend::poll_events`].

pub mod controller;
pub mod mock;

use glam::Mat4;
use std::sync::mpsc::Sender;
use thiserror::Error;

use crate::view::{EyeMatrices, Viewport};

pub use controller::{PresentationController, PresentationEvent, PresentationState, SessionStatus};
pub use mock::{BackendCall, MockBackend, MockConfig, MockState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no presentation device found")]
    NoDevice,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("session {0:?} is no longer active")]
    SessionGone(SessionId),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub can_present: bool,
}

/// How a backend lays out its eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Two eyes drawn side by side into the application's own surface.
    Stereo,
    /// Backend-owned framebuffer with backend-supplied per-view viewports.
    Immersive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub depth_near: f32,
    pub depth_far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    EyeLevel,
}

/// Anchor used to resolve head poses; only valid for its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOfReference {
    pub session: SessionId,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeadPose {
    Stereo {
        left: EyeMatrices,
        right: EyeMatrices,
    },
    Immersive {
        framebuffer: (u32, u32),
        views: Vec<(Viewport, EyeMatrices)>,
    },
}

/// One frame delivered on the backend's own cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendFrame {
    /// `None` when the device has no pose for this frame.
    pub pose: Option<HeadPose>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    Devices {
        ticket: Ticket,
        result: Result<Vec<DeviceInfo>, BackendError>,
    },
    Session {
        ticket: Ticket,
        result: Result<SessionId, BackendError>,
    },
    Reference {
        ticket: Ticket,
        result: Result<FrameOfReference, BackendError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    SessionEnded(SessionId),
    DisplayActivate,
    DisplayDeactivate,
}

pub type ReplySink = Sender<BackendReply>;

pub trait PresentationBackend {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Called once before any request.
    fn connect(&mut self, sink: ReplySink);

    fn enumerate_devices(&mut self, ticket: Ticket);

    fn request_session(&mut self, device: DeviceId, options: SessionOptions, ticket: Ticket);

    fn request_frame_of_reference(&mut self, session: SessionId, kind: ReferenceKind, ticket: Ticket);

    /// Ending a session also produces `BackendEvent::SessionEnded`.
    fn end_session(&mut self, session: SessionId);

    /// Arms the backend's frame callback for one frame.
    fn request_animation_frame(&mut self, session: SessionId);

    /// Returns the armed frame once the backend's cadence allows it.
    fn take_frame(&mut self, session: SessionId, reference: &FrameOfReference) -> Option<BackendFrame>;

    /// Hands the finished frame to the device.
    fn submit_frame(&mut self, _session: SessionId) {}

    fn poll_events(&mut self) -> Vec<BackendEvent>;
}

/// Off-axis projection for a field of view given as half-angles in degrees.
/// Right-handed, depth mapped to [0, 1].
pub fn fov_projection(up: f32, down: f32, left: f32, right: f32, near: f32, far: f32) -> Mat4 {
    let up = up.to_radians().tan();
    let down = down.to_radians().tan();
    let left = left.to_radians().tan();
    let right = right.to_radians().tan();

    let x_scale = 2.0 / (left + right);
    let y_scale = 2.0 / (up + down);
    let depth = far / (near - far);

    Mat4::from_cols(
        glam::Vec4::new(x_scale, 0.0, 0.0, 0.0),
        glam::Vec4::new(0.0, y_scale, 0.0, 0.0),
        glam::Vec4::new(
            (right - left) / (right + left),
            (up - down) / (up + down),
            depth,
            -1.0,
        ),
        glam::Vec4::new(0.0, 0.0, depth * near, 0.0),
    )
}
