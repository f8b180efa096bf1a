pub mod ble;
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod error;
pub mod orientation;
pub mod pipeline;
pub mod quaternion;
pub mod rate_limiter;
pub mod recording;
pub mod types;
pub mod window_buffer;

pub use error::{Result, TelemetryError};
pub use pipeline::{Outcome, SampleReady, TelemetryPipeline};
