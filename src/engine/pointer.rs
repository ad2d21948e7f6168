//! Pointer smoothing
//!
//! Each reactive layer owns its own [`PointerSmoother`] so layers can lag
//! behind the same raw input with different profiles.

/// Raw pointer position normalized to the viewport, `[0, 1]²`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub x: f32,
    pub y: f32,
}

impl PointerInput {
    pub const CENTER: Self = Self { x: 0.5, y: 0.5 };

    /// Normalize a position in logical pixels against the window size
    pub fn from_position(x: f32, y: f32, width: f32, height: f32) -> Self {
        let nx = if width > 0.0 { x / width } else { 0.5 };
        let ny = if height > 0.0 { y / height } else { 0.5 };
        Self {
            x: nx.clamp(0.0, 1.0),
            y: ny.clamp(0.0, 1.0),
        }
    }
}

impl Default for PointerInput {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Highest accepted decay; 1.0 would freeze the pointer forever
const MAX_DECAY: f32 = 0.999;

/// Exponential low-pass filter over the pointer position
#[derive(Debug, Clone, Copy)]
pub struct PointerSmoother {
    current: PointerInput,
    decay: f32,
}

impl PointerSmoother {
    pub fn new(decay: f32) -> Self {
        Self {
            current: PointerInput::CENTER,
            decay: clamp_decay(decay),
        }
    }

    #[cfg(test)]
    pub fn with_position(mut self, position: PointerInput) -> Self {
        self.current = position;
        self
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.decay = clamp_decay(decay);
    }

    #[cfg(test)]
    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Advance one frame toward `target`
    ///
    /// The remaining distance shrinks by `decay`; zero decay lands on the
    /// target exactly.
    pub fn update(&mut self, target: PointerInput) -> PointerInput {
        self.current.x = target.x + (self.current.x - target.x) * self.decay;
        self.current.y = target.y + (self.current.y - target.y) * self.decay;
        self.current
    }

    pub fn current(&self) -> PointerInput {
        self.current
    }
}

fn clamp_decay(decay: f32) -> f32 {
    if decay.is_finite() {
        decay.clamp(0.0, MAX_DECAY)
    } else {
        0.0
    }
}
