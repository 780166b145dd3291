//! Interactive mask state keyed to the frame currently on screen.
//!
//! All pointer input arrives in surface pixels and is mapped through a [`CoordinateMapper`].
//! Strokes and tracked points are stored normalized; flood selections are stored as binary
//! buffers at the resolution of the frame they were computed from and only resampled (nearest
//! neighbor) when the canvas is flattened.
//!
//! The canvas is owned by the interaction thread. Background jobs receive a clone (or the
//! flattened mask) once interaction has stopped.

pub mod session;

use std::sync::Arc;

use image::{GrayImage, RgbImage};
use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::{
    config::Tunables,
    foundation::{
        error::{MatteError, MatteResult},
        geometry::{CoordinateMapper, NormalizedPoint},
    },
    raster::{draw, flood},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Pointer input is ignored.
    View,
    /// Freehand strokes.
    #[default]
    Pencil,
    /// Connected-region selection by color.
    Flood,
    /// Points followed by optical flow during export.
    Track,
}

/// One freehand stroke; append-only until the next stroke begins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stroke {
    points: Vec<NormalizedPoint>,
}

impl Stroke {
    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }
}

/// Binary selection produced by one flood click.
#[derive(Clone, Debug)]
pub struct FloodMask {
    pub mask: GrayImage,
    pub seed: NormalizedPoint,
    /// The fill found only noise and a disk was stamped instead.
    pub fallback: bool,
}

/// Surface-space primitives for drawing the tool overlay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    pub track_points: Vec<Point>,
    pub strokes: Vec<Vec<Point>>,
}

#[derive(Clone, Debug)]
pub struct MaskCanvas {
    mapper: CoordinateMapper,
    frame: Option<Arc<RgbImage>>,
    mode: ToolMode,
    strokes: Vec<Stroke>,
    floods: Vec<FloodMask>,
    track_points: Vec<NormalizedPoint>,
    flood_tolerance: u8,
    flood_fallback_radius: u32,
    flood_min_pixels: usize,
    stroke_thickness: u32,
}

impl MaskCanvas {
    pub fn new(tunables: &Tunables) -> Self {
        Self {
            mapper: CoordinateMapper::default(),
            frame: None,
            mode: ToolMode::default(),
            strokes: Vec::new(),
            floods: Vec::new(),
            track_points: Vec::new(),
            flood_tolerance: tunables.flood_tolerance,
            flood_fallback_radius: tunables.flood_fallback_radius,
            flood_min_pixels: tunables.flood_min_pixels,
            stroke_thickness: tunables.stroke_thickness,
        }
    }

    /// Show the first frame of a new source, discarding all tool state.
    pub fn load(&mut self, frame: impl Into<Arc<RgbImage>>) {
        self.clear();
        self.show(frame);
    }

    /// Show another frame of the same source (playback/seek); tool state is kept.
    pub fn show(&mut self, frame: impl Into<Arc<RgbImage>>) {
        let frame = frame.into();
        self.mapper.set_frame_size(frame.width(), frame.height());
        self.frame = Some(frame);
    }

    pub fn current_frame(&self) -> Option<&RgbImage> {
        self.frame.as_deref()
    }

    pub fn set_surface_size(&mut self, width: f64, height: f64) {
        self.mapper.set_surface_size(width, height);
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        tracing::debug!(?mode, "canvas mode");
        self.mode = mode;
    }

    /// Pointer-down, routed by the active mode.
    pub fn press(&mut self, px: f64, py: f64) -> MatteResult<()> {
        match self.mode {
            ToolMode::View => {}
            ToolMode::Pencil => self.begin_stroke(px, py),
            ToolMode::Flood => self.add_flood_click(px, py)?,
            ToolMode::Track => self.add_track_point(px, py),
        }
        Ok(())
    }

    /// Pointer-move with the button held.
    pub fn drag(&mut self, px: f64, py: f64) {
        match self.mode {
            ToolMode::Pencil => self.extend_stroke(px, py),
            ToolMode::Track => self.add_track_point(px, py),
            ToolMode::View | ToolMode::Flood => {}
        }
    }

    pub fn begin_stroke(&mut self, px: f64, py: f64) {
        let p = self.mapper.to_normalized(px, py);
        self.strokes.push(Stroke { points: vec![p] });
    }

    /// Append to the stroke in progress; ignored when no stroke was begun.
    pub fn extend_stroke(&mut self, px: f64, py: f64) {
        let p = self.mapper.to_normalized(px, py);
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.points.push(p);
        }
    }

    pub fn add_track_point(&mut self, px: f64, py: f64) {
        let p = self.mapper.to_normalized(px, py);
        self.track_points.push(p);
    }

    /// Select the region connected to the clicked pixel on the current frame.
    ///
    /// A selection smaller than `flood_min_pixels` is replaced by a disk at the click so the
    /// user always gets visible feedback.
    pub fn add_flood_click(&mut self, px: f64, py: f64) -> MatteResult<()> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| MatteError::validation("flood click before any frame was shown"))?;
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(MatteError::validation("flood click on an empty frame"));
        }

        let seed = self.mapper.to_normalized(px, py);
        let pixel = seed.to_pixel(w, h);
        let ix = (pixel.x as u32).min(w - 1);
        let iy = (pixel.y as u32).min(h - 1);

        let mut mask = flood::flood_select(frame, ix, iy, self.flood_tolerance);
        let selected = draw::count_nonzero(&mask);
        let fallback = selected < self.flood_min_pixels;
        if fallback {
            tracing::debug!(ix, iy, selected, "flood selected noise, stamping fallback disk");
            draw::stamp_disk(
                &mut mask,
                Point::new(f64::from(ix), f64::from(iy)),
                self.flood_fallback_radius,
                255,
            );
        }
        self.floods.push(FloodMask {
            mask,
            seed,
            fallback,
        });
        Ok(())
    }

    /// Remove the most recent flood selection.
    pub fn undo_flood(&mut self) -> Option<FloodMask> {
        self.floods.pop()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.floods.clear();
        self.track_points.clear();
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn flood_masks(&self) -> &[FloodMask] {
        &self.floods
    }

    pub fn track_points(&self) -> &[NormalizedPoint] {
        &self.track_points
    }

    /// Whether strokes or flood selections contribute to [`MaskCanvas::flatten`].
    pub fn has_manual_mask(&self) -> bool {
        !self.floods.is_empty() || self.strokes.iter().any(|s| !s.points.is_empty())
    }

    /// Union of all strokes and flood selections as a binary mask at `width`×`height`.
    ///
    /// Pure with respect to canvas state: repeated calls return identical buffers.
    pub fn flatten(&self, width: u32, height: u32) -> MatteResult<GrayImage> {
        let mut out = GrayImage::new(width, height);
        if width == 0 || height == 0 {
            return Ok(out);
        }

        for stroke in &self.strokes {
            let pts: Vec<Point> = stroke
                .points
                .iter()
                .map(|p| p.to_pixel(width, height))
                .collect();
            draw::draw_thick_polyline(&mut out, &pts, self.stroke_thickness, 255);
        }

        for flood in &self.floods {
            let resized = draw::resize_nearest(&flood.mask, width, height);
            draw::union_into(&mut out, &resized)?;
        }

        Ok(out)
    }

    pub fn overlay(&self) -> Overlay {
        Overlay {
            track_points: self
                .track_points
                .iter()
                .map(|&p| self.mapper.to_surface(p))
                .collect(),
            strokes: self
                .strokes
                .iter()
                .map(|s| s.points.iter().map(|&p| self.mapper.to_surface(p)).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn canvas_with(frame: RgbImage) -> MaskCanvas {
        let mut c = MaskCanvas::new(&Tunables::default());
        let (w, h) = frame.dimensions();
        c.set_surface_size(f64::from(w), f64::from(h));
        c.load(frame);
        c
    }

    #[test]
    fn load_resets_tool_state_but_show_keeps_it() {
        let mut c = canvas_with(RgbImage::new(32, 32));
        c.set_mode(ToolMode::Track);
        c.press(5.0, 5.0).unwrap();
        c.show(RgbImage::new(32, 32));
        assert_eq!(c.track_points().len(), 1);
        c.load(RgbImage::new(32, 32));
        assert!(c.track_points().is_empty());
    }

    #[test]
    fn drag_in_track_mode_adds_points() {
        let mut c = canvas_with(RgbImage::new(32, 32));
        c.set_mode(ToolMode::Track);
        c.press(1.0, 1.0).unwrap();
        c.drag(2.0, 2.0);
        c.drag(3.0, 3.0);
        assert_eq!(c.track_points().len(), 3);
        assert!(!c.has_manual_mask());
    }

    #[test]
    fn pencil_stroke_flattens_at_any_resolution() {
        let mut c = canvas_with(RgbImage::new(100, 100));
        c.set_mode(ToolMode::Pencil);
        c.press(10.0, 50.0).unwrap();
        c.drag(90.0, 50.0);
        assert_eq!(c.strokes()[0].points().len(), 2);

        let small = c.flatten(100, 100).unwrap();
        let big = c.flatten(400, 200).unwrap();
        assert_eq!(small.get_pixel(50, 50)[0], 255);
        assert_eq!(big.get_pixel(200, 100)[0], 255);
        assert_eq!(small.get_pixel(50, 10)[0], 0);
    }

    #[test]
    fn extend_without_begin_is_ignored() {
        let mut c = canvas_with(RgbImage::new(16, 16));
        c.extend_stroke(3.0, 3.0);
        assert!(c.strokes().is_empty());
    }

    #[test]
    fn flood_on_isolated_pixel_falls_back_to_a_disk() {
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        frame.put_pixel(32, 32, Rgb([255, 255, 255]));
        let mut c = canvas_with(frame);
        c.set_mode(ToolMode::Flood);
        c.press(32.5, 32.5).unwrap();
        let flood = &c.flood_masks()[0];
        assert!(flood.fallback);
        assert!(draw::count_nonzero(&flood.mask) > 100);
    }

    #[test]
    fn flood_without_frame_is_an_error() {
        let mut c = MaskCanvas::new(&Tunables::default());
        c.set_mode(ToolMode::Flood);
        assert!(c.press(1.0, 1.0).is_err());
    }

    #[test]
    fn undo_removes_only_the_last_selection() {
        let frame = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([250, 0, 0]) } else { Rgb([0, 0, 250]) }
        });
        let mut c = canvas_with(frame);
        c.set_mode(ToolMode::Flood);
        c.press(5.0, 5.0).unwrap();
        c.press(60.0, 5.0).unwrap();
        assert_eq!(draw::count_nonzero(&c.flatten(64, 64).unwrap()), 64 * 64);
        c.undo_flood();
        assert_eq!(draw::count_nonzero(&c.flatten(64, 64).unwrap()), 32 * 64);
    }

    #[test]
    fn overlay_maps_back_to_surface_space() {
        let mut c = MaskCanvas::new(&Tunables::default());
        c.set_surface_size(200.0, 100.0);
        c.load(RgbImage::new(50, 50));
        c.set_mode(ToolMode::Track);
        c.press(100.0, 50.0).unwrap();
        let ov = c.overlay();
        assert_eq!(ov.track_points.len(), 1);
        assert!((ov.track_points[0].x - 100.0).abs() < 1e-9);
        assert!((ov.track_points[0].y - 50.0).abs() < 1e-9);
    }
}
