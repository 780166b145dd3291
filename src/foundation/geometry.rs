use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};

/// A device-independent position inside a frame, `(0,0)` top-left and `(1,1)` bottom-right.
///
/// This is the only coordinate form that survives frame-size changes, so strokes and tracked
/// points are always stored this way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    /// Pixel position in a `width`×`height` buffer (not rounded).
    pub fn to_pixel(self, width: u32, height: u32) -> Point {
        Point::new(self.x * f64::from(width), self.y * f64::from(height))
    }

    pub fn from_pixel(p: Point, width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::default();
        }
        Self::new(p.x / f64::from(width), p.y / f64::from(height))
    }
}

/// Maps between the letterboxed on-screen preview and normalized frame space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoordinateMapper {
    frame: Size,
    surface: Size,
}

impl CoordinateMapper {
    pub fn new(frame_w: u32, frame_h: u32, surface_w: f64, surface_h: f64) -> Self {
        Self {
            frame: Size::new(f64::from(frame_w), f64::from(frame_h)),
            surface: Size::new(surface_w.max(0.0), surface_h.max(0.0)),
        }
    }

    pub fn set_frame_size(&mut self, frame_w: u32, frame_h: u32) {
        self.frame = Size::new(f64::from(frame_w), f64::from(frame_h));
    }

    pub fn set_surface_size(&mut self, surface_w: f64, surface_h: f64) {
        self.surface = Size::new(surface_w.max(0.0), surface_h.max(0.0));
    }

    pub fn frame_size(&self) -> Size {
        self.frame
    }

    pub fn surface_size(&self) -> Size {
        self.surface
    }

    fn has_frame(&self) -> bool {
        self.frame.width > 0.0 && self.frame.height > 0.0
    }

    /// Uniform fit scale `min(sw/fw, sh/fh)`; zero while no frame is loaded.
    pub fn scale(&self) -> f64 {
        if !self.has_frame() {
            return 0.0;
        }
        (self.surface.width / self.frame.width).min(self.surface.height / self.frame.height)
    }

    /// The on-screen rectangle the frame occupies.
    pub fn image_rect(&self) -> Rect {
        let r = self.scale();
        let size = Size::new(self.frame.width * r, self.frame.height * r);
        let origin = Point::new(
            (self.surface.width - size.width) / 2.0,
            (self.surface.height - size.height) / 2.0,
        );
        Rect::from_origin_size(origin, size)
    }

    /// Surface pixel → normalized frame position, clamped onto the frame.
    pub fn to_normalized(&self, px: f64, py: f64) -> NormalizedPoint {
        let rect = self.image_rect();
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return NormalizedPoint::default();
        }
        NormalizedPoint::new((px - rect.x0) / rect.width(), (py - rect.y0) / rect.height())
    }

    /// Normalized frame position → surface pixel.
    pub fn to_surface(&self, p: NormalizedPoint) -> Point {
        let rect = self.image_rect();
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return Point::ZERO;
        }
        Point::new(rect.x0 + p.x * rect.width(), rect.y0 + p.y * rect.height())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/geometry.rs"]
mod tests;
