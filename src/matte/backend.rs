//! Foreground estimators and the session that owns the active one.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops};

use crate::{
    config::EngineChoice,
    foundation::error::{MatteError, MatteResult},
};

/// Model name of the built-in light segmenter.
pub const SEGMENTER_MODEL: &str = "border-contrast";
/// Model name of the built-in dense matting estimator.
pub const BORDER_MATTING_MODEL: &str = "border-distance";

pub type ConfidenceMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// What a backend returns for one frame, before normalization.
#[derive(Clone, Debug)]
pub enum RawEstimate {
    /// Dense per-pixel alpha, 0..=255.
    Alpha(GrayImage),
    /// Per-pixel foreground probability in `[0,1]`, possibly at a coarser resolution.
    Confidence(ConfidenceMap),
}

impl RawEstimate {
    /// Normalize to an owned single-channel 0..=255 buffer at `width`×`height`.
    pub fn into_mask(self, width: u32, height: u32) -> GrayImage {
        let mask = match self {
            Self::Alpha(mask) => mask,
            Self::Confidence(conf) => {
                let (w, h) = conf.dimensions();
                GrayImage::from_fn(w, h, |x, y| {
                    let v = conf.get_pixel(x, y)[0];
                    Luma([(v * 255.0).round().clamp(0.0, 255.0) as u8])
                })
            }
        };
        if mask.dimensions() == (width, height) {
            mask
        } else {
            imageops::resize(&mask, width, height, imageops::FilterType::Triangle)
        }
    }
}

/// A foreground estimator consumed as a black box.
pub trait ForegroundBackend: Send {
    fn name(&self) -> &str;

    fn estimate(&mut self, frame: &RgbImage) -> MatteResult<RawEstimate>;

    /// Drop any temporal state before a new video.
    fn reset(&mut self) {}
}

/// Builds backends by model name. Returning `Ok(None)` means "not mine".
pub trait BackendProvider: Send + Sync {
    fn create(&self, model: &str) -> MatteResult<Option<Box<dyn ForegroundBackend>>>;
}

/// Provider for the two built-in estimators.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinProvider;

impl BackendProvider for BuiltinProvider {
    fn create(&self, model: &str) -> MatteResult<Option<Box<dyn ForegroundBackend>>> {
        Ok(match model {
            SEGMENTER_MODEL => Some(Box::new(BorderContrastSegmenter::default())),
            BORDER_MATTING_MODEL => Some(Box::new(BorderDistanceMatting::default())),
            _ => None,
        })
    }
}

/// Holds the loaded backend across frames and runs; rebuilt only when the model name changes.
pub struct BackendSession {
    providers: Vec<Box<dyn BackendProvider>>,
    active: Option<(String, Box<dyn ForegroundBackend>)>,
}

impl Default for BackendSession {
    fn default() -> Self {
        Self {
            providers: vec![Box::new(BuiltinProvider)],
            active: None,
        }
    }
}

impl BackendSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider consulted before the built-ins.
    pub fn with_provider(mut self, provider: impl BackendProvider + 'static) -> Self {
        self.providers.insert(0, Box::new(provider));
        self
    }

    pub fn active_model(&self) -> Option<&str> {
        self.active.as_ref().map(|(name, _)| name.as_str())
    }

    /// Return the backend for `engine`, loading it if the model differs from the active one.
    pub fn ensure(&mut self, engine: &EngineChoice) -> MatteResult<&mut dyn ForegroundBackend> {
        let model = engine.model_name();
        let loaded = matches!(&self.active, Some((name, _)) if name == model);
        if !loaded {
            tracing::info!(model, "loading foreground backend");
            let backend = self.build(model)?;
            self.active = Some((model.to_string(), backend));
        }
        match self.active.as_mut() {
            Some((_, backend)) => Ok(backend.as_mut()),
            None => Err(MatteError::backend(format!("no backend loaded for '{model}'"))),
        }
    }

    fn build(&self, model: &str) -> MatteResult<Box<dyn ForegroundBackend>> {
        for provider in &self.providers {
            if let Some(backend) = provider.create(model)? {
                return Ok(backend);
            }
        }
        Err(MatteError::backend(format!(
            "no provider knows model '{model}'"
        )))
    }
}

/// Median color of the outermost ring of pixels, taken as the background.
fn border_median(frame: &RgbImage) -> [u8; 3] {
    let (w, h) = frame.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();
    let mut push = |p: &Rgb<u8>| {
        for c in 0..3 {
            channels[c].push(p[c]);
        }
    };
    for x in 0..w {
        push(frame.get_pixel(x, 0));
        if h > 1 {
            push(frame.get_pixel(x, h - 1));
        }
    }
    for y in 1..h.saturating_sub(1) {
        push(frame.get_pixel(0, y));
        if w > 1 {
            push(frame.get_pixel(w - 1, y));
        }
    }
    let mut out = [0u8; 3];
    for (c, values) in channels.iter_mut().enumerate() {
        if values.is_empty() {
            continue;
        }
        values.sort_unstable();
        out[c] = values[values.len() / 2];
    }
    out
}

fn color_distance(a: &Rgb<u8>, b: [u8; 3]) -> f32 {
    let dr = f32::from(a[0]) - f32::from(b[0]);
    let dg = f32::from(a[1]) - f32::from(b[1]);
    let db = f32::from(a[2]) - f32::from(b[2]);
    (dr * dr + dg * dg + db * db).sqrt()
}

fn ramp(v: f32, low: f32, high: f32) -> f32 {
    ((v - low) / (high - low)).clamp(0.0, 1.0)
}

/// Light segmenter: coarse confidence from color contrast against the frame border, computed at
/// reduced resolution.
#[derive(Clone, Debug)]
pub struct BorderContrastSegmenter {
    pub downscale: u32,
    pub low: f32,
    pub high: f32,
}

impl Default for BorderContrastSegmenter {
    fn default() -> Self {
        Self {
            downscale: 4,
            low: 30.0,
            high: 90.0,
        }
    }
}

impl ForegroundBackend for BorderContrastSegmenter {
    fn name(&self) -> &str {
        SEGMENTER_MODEL
    }

    fn estimate(&mut self, frame: &RgbImage) -> MatteResult<RawEstimate> {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(MatteError::validation("cannot segment an empty frame"));
        }
        let sw = (w / self.downscale.max(1)).max(1);
        let sh = (h / self.downscale.max(1)).max(1);
        let small = imageops::resize(frame, sw, sh, imageops::FilterType::Triangle);
        let bg = border_median(&small);
        let conf = ConfidenceMap::from_fn(sw, sh, |x, y| {
            Luma([ramp(color_distance(small.get_pixel(x, y), bg), self.low, self.high)])
        });
        Ok(RawEstimate::Confidence(conf))
    }
}

/// Dense matting: soft alpha from color distance to the border background at full resolution.
#[derive(Clone, Debug)]
pub struct BorderDistanceMatting {
    pub low: f32,
    pub high: f32,
}

impl Default for BorderDistanceMatting {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 120.0,
        }
    }
}

impl ForegroundBackend for BorderDistanceMatting {
    fn name(&self) -> &str {
        BORDER_MATTING_MODEL
    }

    fn estimate(&mut self, frame: &RgbImage) -> MatteResult<RawEstimate> {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(MatteError::validation("cannot matte an empty frame"));
        }
        let bg = border_median(frame);
        let alpha = GrayImage::from_fn(w, h, |x, y| {
            let a = ramp(color_distance(frame.get_pixel(x, y), bg), self.low, self.high);
            Luma([(a * 255.0).round() as u8])
        });
        Ok(RawEstimate::Alpha(alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn subject_frame() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                Rgb([230, 40, 40])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    #[test]
    fn builtins_find_a_contrasting_subject() {
        let frame = subject_frame();
        for engine in [
            EngineChoice::Segmenter,
            EngineChoice::Matting {
                model: BORDER_MATTING_MODEL.to_string(),
            },
        ] {
            let mut session = BackendSession::new();
            let mask = session
                .ensure(&engine)
                .unwrap()
                .estimate(&frame)
                .unwrap()
                .into_mask(64, 64);
            assert_eq!(mask.dimensions(), (64, 64));
            assert_eq!(mask.get_pixel(32, 32)[0], 255, "{engine:?}");
            assert_eq!(mask.get_pixel(2, 2)[0], 0, "{engine:?}");
        }
    }

    #[test]
    fn uniform_frame_has_no_foreground() {
        let frame = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let mut seg = BorderContrastSegmenter::default();
        let mask = seg.estimate(&frame).unwrap().into_mask(64, 64);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn unknown_model_is_unavailable() {
        let mut session = BackendSession::new();
        let err = session
            .ensure(&EngineChoice::Matting {
                model: "u2net".to_string(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, MatteError::BackendUnavailable(_)));
    }

    struct CountingProvider(Arc<AtomicUsize>);

    impl BackendProvider for CountingProvider {
        fn create(&self, model: &str) -> MatteResult<Option<Box<dyn ForegroundBackend>>> {
            if model != "counted" {
                return Ok(None);
            }
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Box::new(BorderDistanceMatting::default())))
        }
    }

    #[test]
    fn session_reloads_only_when_model_changes() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut session = BackendSession::new().with_provider(CountingProvider(loads.clone()));
        let counted = EngineChoice::Matting {
            model: "counted".to_string(),
        };

        session.ensure(&counted).unwrap();
        session.ensure(&counted).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        session.ensure(&EngineChoice::Segmenter).unwrap();
        assert_eq!(session.active_model(), Some(SEGMENTER_MODEL));
        session.ensure(&counted).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
