//! Timestamp correlation between sample requests and camera responses.
//!
//! Requests and responses travel over two bounded crossbeam channels. Neither
//! side ever blocks indefinitely: enqueueing a request never blocks (the oldest
//! request is dropped when the queue is full) and waiting for a response polls
//! with a timeout until a deadline.

use super::{SampleRequest, SampleResponse};
use crate::error::{OpiError, OpiResult};
use crate::presentation::Eye;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runtime side of the sample queues.
#[derive(Debug, Clone)]
pub struct SampleCorrelator {
    request_tx: Sender<SampleRequest>,
    // Kept to evict the oldest request when the queue is full.
    request_rx: Receiver<SampleRequest>,
    response_tx: Sender<SampleResponse>,
    response_rx: Receiver<SampleResponse>,
}

/// Camera side of the sample queues.
#[derive(Debug, Clone)]
pub struct CameraLink {
    request_rx: Receiver<SampleRequest>,
    response_tx: Sender<SampleResponse>,
}

impl SampleCorrelator {
    /// Create both ends with queues holding at most `capacity` items each.
    pub fn new(capacity: usize) -> (Self, CameraLink) {
        let capacity = capacity.max(1);
        let (request_tx, request_rx) = bounded(capacity);
        let (response_tx, response_rx) = bounded(capacity);
        let link = CameraLink {
            request_rx: request_rx.clone(),
            response_tx: response_tx.clone(),
        };
        (
            Self {
                request_tx,
                request_rx,
                response_tx,
                response_rx,
            },
            link,
        )
    }

    /// Queue a request for the sample at `timestamp`.
    pub fn request_sample(&self, timestamp: u64, eye: Eye) {
        let mut request = SampleRequest { timestamp, eye };
        loop {
            match self.request_tx.try_send(request) {
                Ok(()) => {
                    debug!(timestamp, ?eye, "Queued eye sample request");
                    return;
                }
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.request_rx.try_recv() {
                        warn!(
                            dropped = dropped.timestamp,
                            timestamp, "Sample request queue full; dropped oldest request"
                        );
                    }
                    request = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!(timestamp, "Sample request queue closed; request discarded");
                    return;
                }
            }
        }
    }

    /// Wait for the response to the request made at `timestamp`.
    ///
    /// Responses for other timestamps are put back for later awaiters. Returns
    /// `None` when `max_wait` elapses or `interrupt` is raised; the caller
    /// records that as missing eye data.
    pub fn await_sample(
        &self,
        timestamp: u64,
        max_wait: Duration,
        poll_interval: Duration,
        interrupt: &AtomicBool,
    ) -> Option<SampleResponse> {
        let deadline = Instant::now() + max_wait;
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let mut deferred = Vec::new();

        let found = loop {
            if interrupt.load(Ordering::Acquire) {
                debug!(timestamp, "Sample wait interrupted");
                break None;
            }
            let now = Instant::now();
            if now >= deadline {
                break None;
            }
            match self.response_rx.recv_timeout(poll_interval.min(deadline - now)) {
                Ok(response) if response.request_timestamp == timestamp => break Some(response),
                Ok(other) => deferred.push(other),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        for response in deferred {
            if self.response_tx.try_send(response).is_err() {
                warn!(
                    request = response.request_timestamp,
                    "Response queue full; unmatched eye sample dropped"
                );
            }
        }

        if found.is_none() && !interrupt.load(Ordering::Acquire) {
            warn!(error = %OpiError::SampleTimeout { timestamp }, "Continuing without eye data");
        }
        found
    }

    /// Drop every queued request and response.
    pub fn clear(&self) {
        while self.request_rx.try_recv().is_ok() {}
        while self.response_rx.try_recv().is_ok() {}
    }

    /// Number of requests not yet taken by the camera.
    pub fn pending_requests(&self) -> usize {
        self.request_tx.len()
    }
}

impl CameraLink {
    /// Next request, waiting at most `timeout`.
    pub fn next_request(&self, timeout: Duration) -> Option<SampleRequest> {
        self.request_rx.recv_timeout(timeout).ok()
    }

    /// Hand a sample back, waiting at most `timeout` for queue space.
    pub fn submit_response(&self, response: SampleResponse, timeout: Duration) -> OpiResult<()> {
        self.response_tx
            .send_timeout(response, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(r) => OpiError::DeviceCommunication(format!(
                    "Response queue full; sample for {} dropped",
                    r.request_timestamp
                )),
                SendTimeoutError::Disconnected(_) => {
                    OpiError::DeviceCommunication("Sample correlator is gone".to_string())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn sample(ts: u64) -> SampleResponse {
        SampleResponse {
            request_timestamp: ts,
            acquisition_timestamp: ts + 3,
            x: 0.5,
            y: -0.25,
            diameter: 4.0,
        }
    }

    #[test]
    fn test_matching_response_is_returned() {
        let (correlator, link) = SampleCorrelator::new(4);
        let flag = AtomicBool::new(false);

        correlator.request_sample(100, Eye::Left);
        let request = link.next_request(Duration::from_millis(10)).unwrap();
        assert_eq!(request, SampleRequest { timestamp: 100, eye: Eye::Left });

        link.submit_response(sample(100), Duration::from_millis(10)).unwrap();
        let got = correlator
            .await_sample(100, Duration::from_millis(200), Duration::from_millis(5), &flag)
            .unwrap();
        assert_eq!(got, sample(100));
    }

    #[test]
    fn test_mismatched_response_is_requeued() {
        let (correlator, link) = SampleCorrelator::new(4);
        let flag = AtomicBool::new(false);

        link.submit_response(sample(50), Duration::from_millis(10)).unwrap();
        link.submit_response(sample(100), Duration::from_millis(10)).unwrap();

        let got = correlator
            .await_sample(100, Duration::from_millis(200), Duration::from_millis(5), &flag)
            .unwrap();
        assert_eq!(got.request_timestamp, 100);

        let later = correlator
            .await_sample(50, Duration::from_millis(200), Duration::from_millis(5), &flag)
            .unwrap();
        assert_eq!(later.request_timestamp, 50);
    }

    #[test]
    #[traced_test]
    fn test_timeout_returns_none_within_one_poll() {
        let (correlator, _link) = SampleCorrelator::new(4);
        let flag = AtomicBool::new(false);
        let started = Instant::now();
        let got = correlator.await_sample(
            7,
            Duration::from_millis(100),
            Duration::from_millis(20),
            &flag,
        );
        let waited = started.elapsed();

        assert!(got.is_none());
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(100 + 20 + 50));
        assert!(logs_contain("Continuing without eye data"));
    }

    #[test]
    fn test_interrupt_cancels_wait() {
        let (correlator, _link) = SampleCorrelator::new(4);
        let flag = AtomicBool::new(true);
        let started = Instant::now();
        let got = correlator.await_sample(
            7,
            Duration::from_secs(5),
            Duration::from_millis(10),
            &flag,
        );
        assert!(got.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    #[traced_test]
    fn test_full_request_queue_drops_oldest() {
        let (correlator, link) = SampleCorrelator::new(2);
        correlator.request_sample(1, Eye::Left);
        correlator.request_sample(2, Eye::Right);
        correlator.request_sample(3, Eye::Both);
        assert_eq!(correlator.pending_requests(), 2);

        let first = link.next_request(Duration::from_millis(10)).unwrap();
        let second = link.next_request(Duration::from_millis(10)).unwrap();
        assert_eq!(first.timestamp, 2);
        assert_eq!(second.timestamp, 3);
        assert!(logs_contain("dropped oldest request"));
    }

    #[test]
    fn test_submit_times_out_when_full() {
        let (correlator, link) = SampleCorrelator::new(1);
        link.submit_response(sample(1), Duration::from_millis(5)).unwrap();
        let err = link
            .submit_response(sample(2), Duration::from_millis(5))
            .unwrap_err();
        assert_eq!(err.kind(), "DeviceCommunicationFailure");

        correlator.clear();
        assert!(link.submit_response(sample(2), Duration::from_millis(5)).is_ok());
    }
}
