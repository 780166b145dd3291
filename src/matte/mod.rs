//! Per-frame matte construction.
//!
//! A raw estimate from the active [`backend::ForegroundBackend`] is normalized, hard-cut below
//! the threshold, feathered, then reinforced with disks at every tracked point and finally OR'd
//! with the manual mask.

pub mod backend;

use image::{GrayImage, RgbImage};
use kurbo::Point;

use crate::{
    config::{OutputSpec, Tunables},
    foundation::{error::MatteResult, geometry::NormalizedPoint},
    raster::{
        blur, draw,
        flow::{self, FlowParams, Pyramid},
    },
};

use self::backend::BackendSession;

/// Points followed frame to frame by pyramidal optical flow.
///
/// Points are placed in pixel space on the first frame seen; a point whose flow fails is dropped
/// for the rest of the run.
#[derive(Clone, Debug)]
pub struct TrackState {
    seeds: Vec<NormalizedPoint>,
    points: Vec<Point>,
    prev: Option<Pyramid>,
    params: FlowParams,
    radius: u32,
}

impl TrackState {
    pub fn new(seeds: &[NormalizedPoint], tunables: &Tunables) -> Self {
        Self {
            seeds: seeds.to_vec(),
            points: Vec::new(),
            prev: None,
            params: FlowParams {
                window: tunables.flow_window,
                levels: tunables.flow_levels,
                max_iterations: tunables.flow_max_iterations,
                epsilon: tunables.flow_epsilon,
                ..FlowParams::default()
            },
            radius: tunables.track_radius,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        if self.prev.is_some() {
            self.points.is_empty()
        } else {
            self.seeds.is_empty()
        }
    }

    /// Move the point set onto `frame` and return the surviving positions.
    pub fn advance(&mut self, frame: &RgbImage) -> &[Point] {
        let pyramid = Pyramid::build(frame, self.params.levels);
        match self.prev.take() {
            None => {
                let (w, h) = frame.dimensions();
                self.points = self.seeds.iter().map(|p| p.to_pixel(w, h)).collect();
            }
            Some(prev) if !self.points.is_empty() => {
                let before = self.points.len();
                self.points = flow::track_points(&prev, &pyramid, &self.points, &self.params)
                    .into_iter()
                    .flatten()
                    .collect();
                let lost = before - self.points.len();
                if lost > 0 {
                    tracing::debug!(lost, remaining = self.points.len(), "tracking lost points");
                }
            }
            Some(_) => {}
        }
        self.prev = Some(pyramid);
        &self.points
    }
}

#[derive(Clone, Debug)]
pub struct MatteOutcome {
    pub mask: GrayImage,
    /// The backend found no foreground above the threshold on this frame.
    pub empty: bool,
}

/// Turns frames into opacity masks using a lazily loaded backend.
pub struct MatteBuilder {
    session: BackendSession,
}

impl Default for MatteBuilder {
    fn default() -> Self {
        Self::new(BackendSession::new())
    }
}

impl MatteBuilder {
    pub fn new(session: BackendSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BackendSession {
        &self.session
    }

    pub fn into_session(self) -> BackendSession {
        self.session
    }

    /// Forget temporal state held by the active backend.
    pub fn reset(&mut self, spec: &OutputSpec) -> MatteResult<()> {
        self.session.ensure(&spec.engine)?.reset();
        Ok(())
    }

    pub fn compute_mask(
        &mut self,
        frame: &RgbImage,
        spec: &OutputSpec,
        track: Option<&mut TrackState>,
        manual: Option<&GrayImage>,
    ) -> MatteResult<MatteOutcome> {
        let (w, h) = frame.dimensions();
        let _span = tracing::debug_span!("compute_mask", w, h).entered();

        let backend = self.session.ensure(&spec.engine)?;
        let mut mask = backend.estimate(frame)?.into_mask(w, h);

        let cut = spec.threshold_u8();
        let mut any = false;
        for v in mask.iter_mut() {
            if *v < cut {
                *v = 0;
            }
            any |= *v != 0;
        }

        if spec.feather_radius > 1 {
            mask = blur::feather_mask(&mask, spec.feather_radius)?;
        }

        if let Some(track) = track {
            let radius = track.radius;
            for &p in track.advance(frame) {
                draw::stamp_disk(&mut mask, p, radius, 255);
            }
        }

        if let Some(manual) = manual {
            if manual.dimensions() == (w, h) {
                draw::union_into(&mut mask, manual)?;
            } else {
                draw::union_into(&mut mask, &draw::resize_nearest(manual, w, h))?;
            }
        }

        Ok(MatteOutcome { mask, empty: !any })
    }
}
