//! Core library for the rust_opi runtime.
//!
//! The runtime serves the OPI line protocol for one client at a time. Inbound
//! commands are validated against per-device parameter schemas and routed to a
//! [`instrument::Device`]; the display device drives a headless
//! [`presentation::PresentationEngine`] that sequences stimuli, waits for the
//! subject's response and attaches eye samples correlated by timestamp.

pub mod camera;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod instrument;
pub mod messages;
pub mod parameter;
pub mod presentation;
pub mod protocol;
pub mod session;
pub mod timing;

pub use error::{OpiError, OpiResult};
