//! edumood-hw: Hardware abstraction for local camera capture.
//!
//! Provides V4L2-based webcam access and the frame conversions shared with
//! the browser stream (RGB conversion, mirroring, JPEG codec).

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::FrameError;
