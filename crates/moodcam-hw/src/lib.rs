//! moodcam-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access, RGB frame conversion, and the
//! off-screen surface that still snapshots are drawn into.

pub mod camera;
pub mod frame;
pub mod surface;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use surface::CaptureSurface;
