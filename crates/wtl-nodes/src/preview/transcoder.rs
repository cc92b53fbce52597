use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder};

use crate::effect::Frame;
use crate::error::TranscodeError;

/// Largest preview sent to a client, in pixels.
pub const DEFAULT_PIXEL_BUDGET: u64 = 1_000_000;

/// Turns frames into base64 PNG strings small and fast enough to send on
/// every poll tick.
#[derive(Debug, Clone, Copy)]
pub struct PreviewTranscoder {
    pixel_budget: u64,
}

impl PreviewTranscoder {
    pub fn new(pixel_budget: u64) -> Self {
        Self {
            pixel_budget: pixel_budget.max(1),
        }
    }

    pub fn pixel_budget(&self) -> u64 {
        self.pixel_budget
    }

    /// Downscale to the budget with Lanczos, then PNG at the fastest setting.
    pub fn encode_png(&self, frame: &Frame) -> Result<Vec<u8>, TranscodeError> {
        if frame.is_empty() {
            return Err(TranscodeError::EmptyFrame);
        }
        let expected = frame.width as usize * frame.height as usize * frame.channels;
        if frame.data.len() != expected {
            return Err(TranscodeError::ShapeMismatch {
                expected,
                actual: frame.data.len(),
            });
        }
        let fitted = frame.fit_to_budget(self.pixel_budget, FilterType::Lanczos3);
        let rgb = fitted
            .to_rgb8()
            .ok_or(TranscodeError::UnsupportedChannels(frame.channels))?;

        let mut png = Vec::new();
        PngEncoder::new_with_quality(&mut png, CompressionType::Fast, PngFilter::NoFilter).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(png)
    }

    /// Wire form: base64 of the PNG bytes.
    pub fn encode(&self, frame: &Frame) -> Result<String, TranscodeError> {
        self.encode_png(frame).map(|png| STANDARD.encode(png))
    }
}

impl Default for PreviewTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_PIXEL_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(b64: &str) -> image::DynamicImage {
        let bytes = STANDARD.decode(b64).unwrap();
        image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap()
    }

    #[test]
    fn encodes_small_frame_at_full_size() {
        let frame = Frame::filled(4, 3, 3, 0.5);
        let img = decode(&PreviewTranscoder::default().encode(&frame).unwrap());
        assert_eq!((img.width(), img.height()), (4, 3));
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn downscales_past_budget() {
        let frame = Frame::filled(40, 20, 3, 1.0);
        let img = decode(&PreviewTranscoder::new(200).encode(&frame).unwrap());
        assert_eq!((img.width(), img.height()), (20, 10));
    }

    #[test]
    fn masks_encode_as_gray_rgb() {
        let frame = Frame::filled(2, 2, 1, 1.0);
        let img = decode(&PreviewTranscoder::default().encode(&frame).unwrap());
        assert_eq!(img.to_rgb8().get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn rejects_bad_shapes() {
        let t = PreviewTranscoder::default();
        assert!(matches!(t.encode(&Frame::filled(0, 4, 3, 0.0)), Err(TranscodeError::EmptyFrame)));
        assert!(matches!(
            t.encode(&Frame::filled(2, 2, 2, 0.0)),
            Err(TranscodeError::UnsupportedChannels(2))
        ));
        let broken = Frame {
            width: 2,
            height: 2,
            channels: 3,
            data: vec![0.0; 5],
        };
        assert!(matches!(t.encode(&broken), Err(TranscodeError::ShapeMismatch { expected: 12, actual: 5 })));
    }
}
