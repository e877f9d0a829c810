use serde::{Deserialize, Serialize};

use crate::application::services::{ImageOutcome, VideoOutcome};
use crate::domain::detection::Detection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub detected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CctvQuery {
    pub stream: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    pub message: String,
    pub detected: bool,
    pub detections: Vec<Detection>,
    pub weapons: Vec<Detection>,
    /// URL relativa del archivo anotado, p. ej. `/uploads/detected.jpg`.
    pub output: String,
}

impl ImageReport {
    pub fn from_outcome(outcome: ImageOutcome, output_url: String) -> Self {
        let message = if outcome.detected {
            "Weapon detected in image."
        } else {
            "No weapon detected in image."
        };
        Self {
            message: message.to_string(),
            detected: outcome.detected,
            detections: outcome.detections,
            weapons: outcome.weapons,
            output: output_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoReport {
    pub message: String,
    pub detected: bool,
    pub frames_scanned: usize,
    pub detections: Vec<Detection>,
    pub weapons: Vec<Detection>,
    pub output: String,
}

impl VideoReport {
    pub fn from_outcome(outcome: VideoOutcome, output_url: String) -> Self {
        let message = if outcome.detected {
            "Weapon detected in video."
        } else {
            "No weapon detected in sampled frames."
        };
        Self {
            message: message.to_string(),
            detected: outcome.detected,
            frames_scanned: outcome.frames_scanned,
            detections: outcome.detections,
            weapons: outcome.weapons,
            output: output_url,
        }
    }
}
