//! Window size primitives and the constraint rules persisted sizes obey.
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_WIDTH: u32 = 600;
pub const DEFAULT_MIN_HEIGHT: u32 = 400;
pub const DEFAULT_MAX_WIDTH: u32 = 1500;
pub const DEFAULT_MAX_HEIGHT: u32 = 1000;
pub const DEFAULT_RESIZE_STEP: u32 = 50;
pub const DEFAULT_RESIZE_THROTTLE_MS: u64 = 1000;
pub const DEFAULT_WINDOW_WIDTH: u32 = 600;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConstraints {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub resize_step: u32,
    pub resize_throttle_ms: u64,
}

impl Default for WindowConstraints {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            resize_step: DEFAULT_RESIZE_STEP,
            resize_throttle_ms: DEFAULT_RESIZE_THROTTLE_MS,
        }
    }
}

/// Outcome of fitting a reported size into the constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeValidation {
    pub requested: WindowSize,
    pub size: WindowSize,
    pub adjusted: bool,
}

impl WindowConstraints {
    pub fn contains(&self, size: WindowSize) -> bool {
        (self.min_width..=self.max_width).contains(&size.width)
            && (self.min_height..=self.max_height).contains(&size.height)
    }

    pub fn clamp(&self, requested: WindowSize) -> SizeValidation {
        let size = WindowSize::new(
            clamp_axis(requested.width, self.min_width, self.max_width),
            clamp_axis(requested.height, self.min_height, self.max_height),
        );
        SizeValidation {
            requested,
            size,
            adjusted: size != requested,
        }
    }
}

// Minimums win when a host reports an inverted range.
fn clamp_axis(value: u32, min: u32, max: u32) -> u32 {
    value.min(max.max(min)).max(min)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub fixed: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            fixed: false,
        }
    }
}

impl WindowSettings {
    pub const fn size(&self) -> WindowSize {
        WindowSize::new(self.width, self.height)
    }
}
