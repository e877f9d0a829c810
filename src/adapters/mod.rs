pub mod ffmpeg;
pub mod fs;
pub mod http;
pub mod mail;
pub mod onnx;
#[cfg(feature = "v4l2")]
pub mod v4l2;
