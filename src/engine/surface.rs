//! Render surfaces
//!
//! A [`RenderSurface`] is the exclusive, writable pixel buffer of one layer.
//! [`SurfaceView`] is a read-only handle onto the same buffer that the GPU
//! presentation (and the refraction pass) use to sample the latest frame
//! without copying it.

use std::sync::Arc;

use parking_lot::RwLock;
use tiny_skia::{Pixmap, PixmapPaint, Transform};

/// Upper bound on device pixel ratio for every surface
pub const DEFAULT_MAX_PIXEL_RATIO: f32 = 2.0;

/// Viewport size in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Convert a logical window size, capping the pixel ratio
    pub fn from_logical(width: f32, height: f32, scale: f32, max_ratio: f32) -> Self {
        let ratio = if scale.is_finite() && scale > 0.0 {
            scale.min(max_ratio.max(0.1))
        } else {
            1.0
        };
        Self {
            width: (width.max(0.0) * ratio).round() as u32,
            height: (height.max(0.0) * ratio).round() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Minimum drawable size so a minimized window keeps its layers alive
    fn drawable(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }
}

/// Surface errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The pixel buffer could not be created at this size
    Allocation { width: u32, height: u32 },
    /// The surface was released and cannot be drawn to
    Released,
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::Allocation { width, height } => {
                write!(f, "failed to allocate {}x{} surface", width, height)
            }
            SurfaceError::Released => write!(f, "surface already released"),
        }
    }
}

impl std::error::Error for SurfaceError {}

#[derive(Debug)]
struct SurfaceBuffer {
    pixmap: Option<Pixmap>,
    generation: u64,
}

/// Allocate a transparent pixmap sized to `viewport`
pub fn allocate_pixmap(viewport: Viewport) -> Result<Pixmap, SurfaceError> {
    let (width, height) = viewport.drawable();
    Pixmap::new(width, height).ok_or(SurfaceError::Allocation { width, height })
}

/// Exclusively owned pixel buffer of one layer
#[derive(Debug)]
pub struct RenderSurface {
    shared: Arc<RwLock<SurfaceBuffer>>,
}

impl RenderSurface {
    pub fn new(viewport: Viewport) -> Result<Self, SurfaceError> {
        let pixmap = allocate_pixmap(viewport)?;
        Ok(Self {
            shared: Arc::new(RwLock::new(SurfaceBuffer {
                pixmap: Some(pixmap),
                generation: 0,
            })),
        })
    }

    /// Read-only capability onto this surface
    pub fn view(&self) -> SurfaceView {
        SurfaceView {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        let buffer = self.shared.read();
        buffer.pixmap.as_ref().map(|p| (p.width(), p.height()))
    }

    /// Draw into the surface; bumps the generation so readers re-upload
    pub fn write<R>(&mut self, f: impl FnOnce(&mut Pixmap) -> R) -> Result<R, SurfaceError> {
        let mut buffer = self.shared.write();
        let result = match buffer.pixmap.as_mut() {
            Some(pixmap) => f(pixmap),
            None => return Err(SurfaceError::Released),
        };
        buffer.generation = buffer.generation.wrapping_add(1);
        Ok(result)
    }

    /// Read the current pixels without marking the surface dirty
    pub fn read<R>(&self, f: impl FnOnce(&Pixmap) -> R) -> Option<R> {
        let buffer = self.shared.read();
        buffer.pixmap.as_ref().map(f)
    }

    /// Reallocate at `viewport`, drawing the previous pixels into the new buffer
    pub fn resize(&mut self, viewport: Viewport) -> Result<(), SurfaceError> {
        let mut next = allocate_pixmap(viewport)?;
        let mut buffer = self.shared.write();
        if let Some(previous) = buffer.pixmap.as_ref() {
            copy_forward(&mut next, previous);
        }
        buffer.pixmap = Some(next);
        buffer.generation = buffer.generation.wrapping_add(1);
        Ok(())
    }

    /// Reallocate without keeping content
    pub fn reset(&mut self, viewport: Viewport) -> Result<(), SurfaceError> {
        let next = allocate_pixmap(viewport)?;
        let mut buffer = self.shared.write();
        buffer.pixmap = Some(next);
        buffer.generation = buffer.generation.wrapping_add(1);
        Ok(())
    }

    /// Drop the pixel buffer. Safe to call any number of times.
    pub fn release(&mut self) {
        let mut buffer = self.shared.write();
        if buffer.pixmap.take().is_some() {
            buffer.generation = buffer.generation.wrapping_add(1);
        }
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.shared.read().pixmap.is_none()
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.release();
    }
}

/// Draw `source` onto `target` at the origin, unscaled
pub fn copy_forward(target: &mut Pixmap, source: &Pixmap) {
    target.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Read-only view onto another owner's surface
#[derive(Debug, Clone)]
pub struct SurfaceView {
    shared: Arc<RwLock<SurfaceBuffer>>,
}

impl SurfaceView {
    /// Incremented on every write, resize and release
    pub fn generation(&self) -> u64 {
        self.shared.read().generation
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        let buffer = self.shared.read();
        buffer.pixmap.as_ref().map(|p| (p.width(), p.height()))
    }

    /// Borrow the premultiplied RGBA bytes of the latest frame
    pub fn with_pixels<R>(&self, f: impl FnOnce(u32, u32, &[u8]) -> R) -> Option<R> {
        let buffer = self.shared.read();
        buffer
            .pixmap
            .as_ref()
            .map(|p| f(p.width(), p.height(), p.data()))
    }
}
