//! facewatch-hw — V4L2 camera capture and grayscale frame handling.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraInfo, DeviceInfo, PixelFormat};
pub use frame::Frame;
