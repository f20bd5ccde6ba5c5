use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Check the rectangle is non-empty and lies within a `width x height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= width
            && self.y.saturating_add(self.height) <= height
    }

    /// Express the rectangle relative to a `width x height` frame.
    pub fn normalize(&self, width: u32, height: u32) -> NormalizedRect {
        let w = width.max(1) as f64;
        let h = height.max(1) as f64;
        NormalizedRect::new(
            self.x as f64 / w,
            self.y as f64 / h,
            self.width as f64 / w,
            self.height as f64 / h,
        )
    }
}

/// A normalized rectangle (0.0 to 1.0) representing a relative region of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRect {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the rectangle (0.0 to 1.0)
    pub width: f64,
    /// Height of the rectangle (0.0 to 1.0)
    pub height: f64,
}

impl NormalizedRect {
    /// Create a new normalized rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check if the rectangle is valid (within 0.0-1.0 range).
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.001 // Allow small epsilon for float precision
            && self.y + self.height <= 1.001
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_within() {
        assert!(PixelRect::new(0, 0, 100, 100).fits_within(100, 100));
        assert!(!PixelRect::new(1, 0, 100, 100).fits_within(100, 100));
        assert!(!PixelRect::new(0, 0, 0, 10).fits_within(100, 100));
    }

    #[test]
    fn test_normalize() {
        let n = PixelRect::new(50, 25, 100, 50).normalize(200, 100);
        assert!((n.x - 0.25).abs() < 1e-9);
        assert!((n.y - 0.25).abs() < 1e-9);
        assert!((n.width - 0.5).abs() < 1e-9);
        assert!(n.is_valid());
    }
}
