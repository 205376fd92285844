//! Eye-tracking camera plumbing.
//!
//! The presentation engine asks for eye samples by timestamp and the camera
//! side answers asynchronously. The two sides only share the bounded queues of
//! the [`SampleCorrelator`]; the camera end is the [`CameraLink`].

pub mod correlator;
pub mod simulated;

pub use correlator::{CameraLink, SampleCorrelator};
pub use simulated::SimulatedCamera;

use crate::presentation::Eye;
use serde::{Deserialize, Serialize};

/// Request for the eye position at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRequest {
    /// Request timestamp in milliseconds; responses are matched on it.
    pub timestamp: u64,
    /// Eye(s) to sample.
    pub eye: Eye,
}

/// One eye sample answering a [`SampleRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleResponse {
    /// Timestamp of the request this sample answers.
    pub request_timestamp: u64,
    /// When the frame was acquired, in milliseconds.
    pub acquisition_timestamp: u64,
    /// Horizontal pupil position (degrees).
    pub x: f64,
    /// Vertical pupil position (degrees).
    pub y: f64,
    /// Pupil diameter (mm).
    pub diameter: f64,
}
