//! Simulated eye camera.
//!
//! Answers each sample request on its own thread after a short latency, with a
//! pupil near the centre and a plausible diameter.

use super::{CameraLink, SampleResponse};
use crate::timing::Clock;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the camera thread blocks waiting for a request before re-checking
/// its stop flag.
const REQUEST_POLL: Duration = Duration::from_millis(20);

/// Background thread producing synthetic eye samples.
pub struct SimulatedCamera {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedCamera {
    /// Start answering requests from `link`, `latency` after each arrives.
    pub fn spawn(link: CameraLink, clock: Arc<dyn Clock>, latency: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            info!("Simulated camera started");
            let mut rng = rand::thread_rng();
            while !flag.load(Ordering::Acquire) {
                let Some(request) = link.next_request(REQUEST_POLL) else {
                    continue;
                };
                std::thread::sleep(latency);
                let response = SampleResponse {
                    request_timestamp: request.timestamp,
                    acquisition_timestamp: clock.now_ms(),
                    x: rng.gen_range(-0.5..0.5),
                    y: rng.gen_range(-0.5..0.5),
                    diameter: rng.gen_range(3.0..6.0),
                };
                debug!(request = request.timestamp, eye = %request.eye, "Simulated sample");
                if let Err(e) = link.submit_response(response, REQUEST_POLL) {
                    warn!(error = %e, "Simulated sample dropped");
                }
            }
            info!("Simulated camera stopped");
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop the thread and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Simulated camera thread panicked");
            }
        }
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
