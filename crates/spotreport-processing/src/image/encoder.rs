use ::image::DynamicImage;
use anyhow::Result;
use bytes::Bytes;

/// Encodes a decoded image to JPEG at a quality factor in `0.0..=1.0`.
pub trait JpegEncoder: Send + Sync {
    fn encode(&self, img: &DynamicImage, quality: f32) -> Result<Bytes>;
}

/// JPEG encoder backed by mozjpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct MozJpegEncoder;

impl JpegEncoder for MozJpegEncoder {
    fn encode(&self, img: &DynamicImage, quality: f32) -> Result<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality((quality * 100.0).clamp(1.0, 100.0));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp.start_compress(Vec::new())?;
        comp.write_scanlines(&rgb_img)?;
        let jpeg_data = comp.finish()?;

        Ok(Bytes::from(jpeg_data))
    }
}
