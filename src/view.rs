// view.rs - per-eye viewports and matrices, and the per-frame eye list

use glam::Mat4;

/// Pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn full(size: (u32, u32)) -> Self {
        Self::new(0, 0, size.0, size.1)
    }

    /// Left and right halves of a target of the given size.
    pub fn split_halves(size: (u32, u32)) -> (Self, Self) {
        let (width, height) = size;
        let half = width / 2;
        (
            Self::new(0, 0, half, height),
            Self::new(half, 0, width - half, height),
        )
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Intersection with a target of the given size.
    pub fn clamped_to(&self, size: (u32, u32)) -> Self {
        let x = self.x.min(size.0);
        let y = self.y.min(size.1);
        Self::new(x, y, self.width.min(size.0 - x), self.height.min(size.1 - y))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeMatrices {
    pub view: Mat4,
    pub projection: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub viewport: Viewport,
    pub view: Mat4,
    pub projection: Mat4,
}

impl EyeView {
    pub fn new(viewport: Viewport, matrices: EyeMatrices) -> Self {
        Self {
            viewport,
            view: matrices.view,
            projection: matrices.projection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Mono,
    Stereo,
    Immersive,
}

impl PlanKind {
    pub fn label(self) -> &'static str {
        match self {
            PlanKind::Mono => "Mono",
            PlanKind::Stereo => "Stereo",
            PlanKind::Immersive => "Immersive",
        }
    }
}

/// Everything a frame draws. Each eye gets the same draw; only the
/// viewport and matrices differ.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan {
    Mono(EyeView),
    Stereo([EyeView; 2]),
    Immersive(Vec<EyeView>),
}

impl RenderPlan {
    pub fn eyes(&self) -> &[EyeView] {
        match self {
            RenderPlan::Mono(eye) => std::slice::from_ref(eye),
            RenderPlan::Stereo(eyes) => eyes,
            RenderPlan::Immersive(eyes) => eyes,
        }
    }

    pub fn kind(&self) -> PlanKind {
        match self {
            RenderPlan::Mono(_) => PlanKind::Mono,
            RenderPlan::Stereo(_) => PlanKind::Stereo,
            RenderPlan::Immersive(_) => PlanKind::Immersive,
        }
    }
}
