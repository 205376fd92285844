//! Headless update loop.
//!
//! Stands in for a render loop: ticks a [`PresentationEngine`] at a fixed
//! frame interval on a dedicated thread until stopped.

use crate::presentation::{PresentationEngine, Renderer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Thread calling `update()` once per frame.
pub struct UpdateLoop {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UpdateLoop {
    /// Move `engine` onto a new thread ticking every `frame_interval`.
    pub fn spawn<R>(mut engine: PresentationEngine<R>, frame_interval: Duration) -> Self
    where
        R: Renderer + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            info!(?frame_interval, "Update loop started");
            let mut frames: u64 = 0;
            while !flag.load(Ordering::Acquire) {
                let started = Instant::now();
                engine.update();
                frames += 1;
                if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
            info!(frames, "Update loop stopped");
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Whether the loop thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop ticking and join the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Update loop thread panicked");
            }
        }
    }
}

impl Drop for UpdateLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
