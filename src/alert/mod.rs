//! Alert detection module
//!
//! Classifies price moves, gates them by cooldown, notifies and records one
//! AlertEvent per successful notification.

mod detector;
mod pass;
mod types;

pub use detector::{AlertDetector, DetectionInput, DetectionParams, MoveMetrics};
pub use pass::{DetectionPass, DetectionReport};
pub use types::{
    AlertCandidate, AlertCategory, AlertConfig, AlertEvent, AlertKind, Direction, PriceObservation,
};
