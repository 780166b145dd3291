use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use super::{MaskCanvas, ToolMode};
use crate::foundation::error::MatteResult;

/// A recorded sequence of pointer events, replayable onto a [`MaskCanvas`].
///
/// This is how the command-line front end acquires masks without a windowing toolkit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskSession {
    pub surface_width: f64,
    pub surface_height: f64,
    pub events: Vec<ToolEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ToolEvent {
    Mode { mode: ToolMode },
    Press { x: f64, y: f64 },
    Drag { x: f64, y: f64 },
    UndoFlood,
    Clear,
}

impl MaskSession {
    pub fn from_path(path: &Path) -> MatteResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open mask session '{}'", path.display()))?;
        let session = serde_json::from_reader(std::io::BufReader::new(f))
            .with_context(|| format!("parse mask session '{}'", path.display()))?;
        Ok(session)
    }

    /// Apply every event in order. The canvas must already show the frame the events were
    /// recorded against.
    pub fn replay(&self, canvas: &mut MaskCanvas) -> MatteResult<()> {
        canvas.set_surface_size(self.surface_width, self.surface_height);
        for event in &self.events {
            match *event {
                ToolEvent::Mode { mode } => canvas.set_mode(mode),
                ToolEvent::Press { x, y } => canvas.press(x, y)?,
                ToolEvent::Drag { x, y } => canvas.drag(x, y),
                ToolEvent::UndoFlood => {
                    canvas.undo_flood();
                }
                ToolEvent::Clear => canvas.clear(),
            }
        }
        tracing::debug!(
            strokes = canvas.strokes().len(),
            floods = canvas.flood_masks().len(),
            track_points = canvas.track_points().len(),
            "mask session replayed"
        );
        Ok(())
    }
}
