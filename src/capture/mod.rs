#[cfg(target_os = "linux")]
mod camera;
mod frame;
mod sampler;

#[cfg(target_os = "linux")]
pub use camera::Camera;
pub use frame::{CaptureError, FrameSource, RawFrame};
pub use sampler::{SampledFrame, Sampler};
