//! Image processing module

pub mod encoder;
pub mod orientation;

pub use encoder::{JpegEncoder, MozJpegEncoder};
pub use orientation::ImageOrientation;
