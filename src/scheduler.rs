// scheduler.rs - single-slot frame callback arming

use log::trace;

/// Where the next frame callback comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// The windowing system's redraw cadence.
    Host,
    /// The presentation backend's own frame cadence.
    Backend,
}

/// Holds at most one armed frame source. Arming replaces whatever was armed
/// before, so switching paths never leaves two callbacks outstanding.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    armed: Option<FrameSource>,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, source: FrameSource) {
        if let Some(previous) = self.armed.replace(source) {
            if previous != source {
                trace!("frame source {:?} replaced by {:?}", previous, source);
            }
        }
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<FrameSource> {
        self.armed
    }

    pub fn is_armed(&self, source: FrameSource) -> bool {
        self.armed == Some(source)
    }

    /// Consumes the armed callback if `source` is the one armed.
    /// Returns false for stale firings, which must not render.
    pub fn fire(&mut self, source: FrameSource) -> bool {
        if self.armed == Some(source) {
            self.armed = None;
            self.frames += 1;
            true
        } else {
            trace!("ignoring stale {:?} frame", source);
            false
        }
    }

    /// Frames fired so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
