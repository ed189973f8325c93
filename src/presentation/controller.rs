// controller.rs - presentation mode state machine
//
// NoBackend -> BackendDetected -> SessionActive -> BackendDetected ...
//
// Requests are fire-and-forget; replies are matched against the ticket of
// the request still outstanding and silently dropped otherwise.

use log::{debug, error, info, warn};
use std::sync::mpsc::{channel, Receiver, Sender};

use super::{
    BackendEvent, BackendFrame, BackendKind, BackendReply, DeviceInfo, FrameOfReference, PresentationBackend,
    ReferenceKind, SessionId, SessionOptions, Ticket,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationState {
    NoBackend,
    BackendDetected,
    SessionActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Absent,
    Requested,
    Active,
    Ended,
}

/// Emitted when the render path has to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationEvent {
    SessionStarted { kind: BackendKind },
    SessionStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detection {
    Unavailable,
    Pending(Ticket),
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle { ended: bool },
    RequestingSession { ticket: Ticket, ended_before: bool },
    RequestingReference { session: SessionId, ticket: Ticket },
    Active { session: SessionId, reference: FrameOfReference },
}

pub struct PresentationController {
    backend: Option<Box<dyn PresentationBackend>>,
    sink: Sender<BackendReply>,
    replies: Receiver<BackendReply>,
    next_ticket: u64,
    detection: Detection,
    device: Option<DeviceInfo>,
    phase: Phase,
    options: SessionOptions,
}

impl PresentationController {
    pub fn new(backend: Option<Box<dyn PresentationBackend>>, options: SessionOptions) -> Self {
        let (sink, replies) = channel();
        Self {
            backend,
            sink,
            replies,
            next_ticket: 1,
            detection: Detection::Unavailable,
            device: None,
            phase: Phase::Idle { ended: false },
            options,
        }
    }

    fn ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Starts device enumeration. Without a backend, or when enumeration
    /// finds nothing, the controller stays in `NoBackend` for good.
    pub fn detect(&mut self) {
        if self.detection != Detection::Unavailable || self.device.is_some() {
            return;
        }
        let ticket = self.ticket();
        let Some(backend) = self.backend.as_mut() else {
            error!("Stereo presentation not supported: no presentation backend available");
            return;
        };
        backend.connect(self.sink.clone());
        self.detection = Detection::Pending(ticket);
        backend.enumerate_devices(ticket);
    }

    pub fn state(&self) -> PresentationState {
        match (self.device.is_some(), self.phase) {
            (false, _) => PresentationState::NoBackend,
            (true, Phase::Active { .. }) => PresentationState::SessionActive,
            (true, _) => PresentationState::BackendDetected,
        }
    }

    pub fn session_status(&self) -> SessionStatus {
        match self.phase {
            Phase::Idle { ended: false } => SessionStatus::Absent,
            Phase::Idle { ended: true } => SessionStatus::Ended,
            Phase::RequestingSession { .. } | Phase::RequestingReference { .. } => SessionStatus::Requested,
            Phase::Active { .. } => SessionStatus::Active,
        }
    }

    pub fn is_session_active(&self) -> bool {
        matches!(self.phase, Phase::Active { .. })
    }

    /// A request is outstanding or a session is running.
    pub fn is_engaged(&self) -> bool {
        !matches!(self.phase, Phase::Idle { .. })
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_deref().map(|b| b.kind())
    }

    pub fn toggle(&mut self) -> Option<PresentationEvent> {
        if self.is_engaged() {
            self.deactivate()
        } else {
            self.activate();
            None
        }
    }

    pub fn activate(&mut self) {
        if self.is_engaged() {
            return;
        }
        let Some(device) = self.device.clone() else {
            warn!("Cannot start presentation: no capable device detected");
            return;
        };
        let ticket = self.ticket();
        let ended_before = matches!(self.phase, Phase::Idle { ended: true });
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        info!("Requesting presentation session on {}", device.name);
        self.phase = Phase::RequestingSession { ticket, ended_before };
        backend.request_session(device.id, self.options, ticket);
    }

    /// Ends or cancels the current session. A no-op without one.
    pub fn deactivate(&mut self) -> Option<PresentationEvent> {
        match self.phase {
            Phase::Idle { .. } => None,
            Phase::RequestingSession { ended_before, .. } => {
                debug!("Cancelling pending session request");
                self.phase = Phase::Idle { ended: ended_before };
                None
            }
            Phase::RequestingReference { session, .. } => {
                self.end_backend_session(session);
                self.phase = Phase::Idle { ended: true };
                None
            }
            Phase::Active { session, .. } => {
                info!("Leaving presentation session {:?}", session);
                self.end_backend_session(session);
                self.phase = Phase::Idle { ended: true };
                Some(PresentationEvent::SessionStopped)
            }
        }
    }

    fn end_backend_session(&mut self, session: SessionId) {
        if let Some(backend) = self.backend.as_mut() {
            backend.end_session(session);
        }
    }

    /// Drains backend replies and events. Call once per event-loop turn.
    pub fn pump(&mut self) -> Vec<PresentationEvent> {
        let mut out = Vec::new();

        let events = match self.backend.as_mut() {
            Some(backend) => backend.poll_events(),
            None => return out,
        };
        for event in events {
            out.extend(self.handle_event(event));
        }

        while let Ok(reply) = self.replies.try_recv() {
            out.extend(self.handle_reply(reply));
        }
        out
    }

    fn handle_event(&mut self, event: BackendEvent) -> Option<PresentationEvent> {
        match event {
            BackendEvent::SessionEnded(id) => match self.phase {
                Phase::Active { session, .. } if session == id => {
                    info!("Presentation session {:?} ended by the device", id);
                    self.phase = Phase::Idle { ended: true };
                    Some(PresentationEvent::SessionStopped)
                }
                Phase::RequestingReference { session, .. } if session == id => {
                    self.phase = Phase::Idle { ended: true };
                    None
                }
                _ => {
                    debug!("Ignoring end of stale session {:?}", id);
                    None
                }
            },
            BackendEvent::DisplayActivate => {
                self.activate();
                None
            }
            BackendEvent::DisplayDeactivate => self.deactivate(),
        }
    }

    fn handle_reply(&mut self, reply: BackendReply) -> Option<PresentationEvent> {
        match reply {
            BackendReply::Devices { ticket, result } => {
                if self.detection != Detection::Pending(ticket) {
                    return None;
                }
                match result {
                    Ok(devices) => match devices.into_iter().find(|d| d.can_present) {
                        Some(device) => {
                            // First capable device wins; there is no device picker.
                            info!("Presentation device: {}", device.name);
                            self.device = Some(device);
                            self.detection = Detection::Ready;
                        }
                        None => {
                            warn!("No devices available able to present");
                            self.detection = Detection::Ready;
                        }
                    },
                    Err(e) => {
                        error!("Requesting presentation devices failed: {e}");
                        self.detection = Detection::Ready;
                    }
                }
                None
            }
            BackendReply::Session { ticket, result } => match self.phase {
                Phase::RequestingSession { ticket: expected, ended_before } if expected == ticket => match result {
                    Ok(session) => {
                        let ticket = self.ticket();
                        self.phase = Phase::RequestingReference { session, ticket };
                        if let Some(backend) = self.backend.as_mut() {
                            backend.request_frame_of_reference(session, ReferenceKind::EyeLevel, ticket);
                        }
                        None
                    }
                    Err(e) => {
                        error!("Unable to start presentation session: {e}");
                        self.phase = Phase::Idle { ended: ended_before };
                        None
                    }
                },
                _ => {
                    if let Ok(orphan) = result {
                        debug!("Ending session {:?} granted after its request was cancelled", orphan);
                        self.end_backend_session(orphan);
                    }
                    None
                }
            },
            BackendReply::Reference { ticket, result } => match self.phase {
                Phase::RequestingReference { session, ticket: expected } if expected == ticket => match result {
                    Ok(reference) => {
                        self.phase = Phase::Active { session, reference };
                        let kind = self.backend_kind().unwrap_or(BackendKind::Stereo);
                        info!("Presentation session {:?} active", session);
                        Some(PresentationEvent::SessionStarted { kind })
                    }
                    Err(e) => {
                        error!("Unable to obtain a frame of reference: {e}");
                        self.end_backend_session(session);
                        self.phase = Phase::Idle { ended: true };
                        None
                    }
                },
                _ => None,
            },
        }
    }

    /// Arms the backend's frame callback for the active session.
    pub fn request_animation_frame(&mut self) {
        if let (Phase::Active { session, .. }, Some(backend)) = (self.phase, self.backend.as_mut()) {
            backend.request_animation_frame(session);
        }
    }

    pub fn take_frame(&mut self) -> Option<BackendFrame> {
        match (self.phase, self.backend.as_mut()) {
            (Phase::Active { session, reference }, Some(backend)) => backend.take_frame(session, &reference),
            _ => None,
        }
    }

    pub fn submit_frame(&mut self) {
        if let (Phase::Active { session, .. }, Some(backend)) = (self.phase, self.backend.as_mut()) {
            backend.submit_frame(session);
        }
    }
}
