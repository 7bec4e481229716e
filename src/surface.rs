//! Render surface capability
//!
//! Surfaces are owned by the UI layer. Sessions only hold `Weak` references
//! and tell a surface which session currently drives it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Largest size with the content's aspect ratio that fits inside `bounds`
    ///
    /// Falls back to `bounds` when the content size is unknown.
    pub fn fit_within(content: FrameSize, bounds: FrameSize) -> FrameSize {
        if content.is_empty() || bounds.is_empty() {
            return bounds;
        }

        let (cw, ch) = (content.width as u64, content.height as u64);
        let (bw, bh) = (bounds.width as u64, bounds.height as u64);

        // Compare cw/ch against bw/bh without floating point
        if cw * bh >= bw * ch {
            let height = (bw * ch / cw).max(1);
            FrameSize::new(bounds.width, height as u32)
        } else {
            let width = (bh * cw / ch).max(1);
            FrameSize::new(width as u32, bounds.height)
        }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Association between a surface and the session driving it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub session: usize,
}

/// Externally-owned render target
pub trait RenderSurface: Send + Sync {
    /// Attach the surface to a session's output
    fn bind(&self, binding: SurfaceBinding);

    /// Detach the surface from whichever session drives it
    fn unbind(&self);

    /// Native size of the content currently shown
    fn intrinsic_content_size(&self) -> FrameSize;

    /// Size the layout has allocated for this surface
    fn allocated_size(&self) -> FrameSize;
}

/// Surface that tracks bindings without drawing anything
pub struct HeadlessSurface {
    allocated: FrameSize,
    content: FrameSize,
    bound: Mutex<Option<SurfaceBinding>>,
}

impl HeadlessSurface {
    pub fn new(allocated: FrameSize, content: FrameSize) -> Self {
        Self {
            allocated,
            content,
            bound: Mutex::new(None),
        }
    }

    /// Session currently driving this surface
    pub fn bound_session(&self) -> Option<usize> {
        let bound = *self.bound.lock();
        bound.map(|b| b.session)
    }
}

impl RenderSurface for HeadlessSurface {
    fn bind(&self, binding: SurfaceBinding) {
        *self.bound.lock() = Some(binding);
    }

    fn unbind(&self) {
        *self.bound.lock() = None;
    }

    fn intrinsic_content_size(&self) -> FrameSize {
        self.content
    }

    fn allocated_size(&self) -> FrameSize {
        self.allocated
    }
}
