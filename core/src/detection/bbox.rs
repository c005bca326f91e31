use serde::{Deserialize, Serialize};

use crate::prelude::{OverlayError, OverlayResult};

/// Labeled axis-aligned box in source-pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default)]
    pub label: String,
    pub confidence: f32,
}

impl DetectedBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label: label.into(),
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Checks the ordering and range invariants a box must hold once accepted.
    pub fn validate(&self) -> OverlayResult<()> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(OverlayError::MalformedResult(format!(
                "box '{}' has non-finite coordinates",
                self.label
            )));
        }
        if self.x1 > self.x2 || self.y1 > self.y2 {
            return Err(OverlayError::MalformedResult(format!(
                "box '{}' corners are inverted: ({}, {}) - ({}, {})",
                self.label, self.x1, self.y1, self.x2, self.y2
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OverlayError::MalformedResult(format!(
                "box '{}' confidence {} outside [0, 1]",
                self.label, self.confidence
            )));
        }
        Ok(())
    }

    /// One-line listing: label, confidence percentage and corner coordinates.
    pub fn describe(&self) -> String {
        format!(
            "{} {:.2}% ({}, {}) - ({}, {})",
            self.label,
            self.confidence * 100.0,
            self.x1,
            self.y1,
            self.x2,
            self.y2
        )
    }
}
