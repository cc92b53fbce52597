use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

/// Single-channel f32 plane, used to run `image` resampling and blur on any
/// channel count.
type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// One H×W×C image with normalized `[0, 1]` samples, row-major, channels
/// interleaved. Masks are frames with one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

/// A batch of independent items, as the host passes them.
pub type Batch = Vec<Frame>;

impl Frame {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, channels: usize, value: f32) -> Self {
        let len = width as usize * height as usize * channels;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn from_fn(
        width: u32,
        height: u32,
        channels: usize,
        mut f: impl FnMut(u32, u32, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(f(x, y, c));
                }
            }
        }
        Self::new(width, height, channels, data)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, c: usize) -> f32 {
        self.data[self.offset(x, y) + c]
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let o = self.offset(x, y);
        &self.data[o..o + self.channels]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let o = self.offset(x, y);
        let c = self.channels;
        &mut self.data[o..o + c]
    }

    /// Per-sample transform, result clamped to `[0, 1]`.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Frame {
        let data = self.data.iter().map(|&v| f(v).clamp(0.0, 1.0)).collect();
        Frame::new(self.width, self.height, self.channels, data)
    }

    /// Per-pixel transform over the channel slice, result clamped to `[0, 1]`.
    pub fn map_pixels(&self, mut f: impl FnMut(&mut [f32])) -> Frame {
        let mut out = self.clone();
        for px in out.data.chunks_exact_mut(self.channels.max(1)) {
            f(px);
            for v in px.iter_mut() {
                *v = v.clamp(0.0, 1.0);
            }
        }
        out
    }

    /// Collapse to one channel by averaging.
    pub fn to_gray(&self) -> Frame {
        if self.channels == 1 {
            return self.clone();
        }
        let n = self.channels as f32;
        let data = self
            .data
            .chunks_exact(self.channels)
            .map(|px| px.iter().sum::<f32>() / n)
            .collect();
        Frame::new(self.width, self.height, 1, data)
    }

    /// Replicate a single channel to `channels`.
    pub fn expand_channels(&self, channels: usize) -> Frame {
        if self.channels == channels {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.data.len() / self.channels.max(1) * channels);
        for px in self.data.chunks_exact(self.channels.max(1)) {
            for c in 0..channels {
                data.push(px[c.min(px.len() - 1)]);
            }
        }
        Frame::new(self.width, self.height, channels, data)
    }

    fn planes(&self) -> Vec<Plane> {
        (0..self.channels)
            .map(|c| {
                let samples: Vec<f32> = self.data.iter().skip(c).step_by(self.channels).copied().collect();
                Plane::from_raw(self.width, self.height, samples)
                    .unwrap_or_else(|| Plane::new(self.width, self.height))
            })
            .collect()
    }

    fn from_planes(planes: &[Plane]) -> Frame {
        let Some(first) = planes.first() else {
            return Frame::new(0, 0, 0, Vec::new());
        };
        let (w, h) = first.dimensions();
        let channels = planes.len();
        let mut data = vec![0.0; w as usize * h as usize * channels];
        for (c, plane) in planes.iter().enumerate() {
            for (i, v) in plane.as_raw().iter().enumerate() {
                data[i * channels + c] = v.clamp(0.0, 1.0);
            }
        }
        Frame::new(w, h, channels, data)
    }

    /// Resample to exactly `width`×`height`.
    pub fn resized(&self, width: u32, height: u32, filter: FilterType) -> Frame {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return self.clone();
        }
        let planes: Vec<Plane> = self
            .planes()
            .iter()
            .map(|p| imageops::resize(p, width, height, filter))
            .collect();
        Frame::from_planes(&planes)
    }

    /// Gaussian blur with standard deviation `sigma` in pixels.
    pub fn blurred(&self, sigma: f32) -> Frame {
        if sigma <= 0.0 || self.is_empty() {
            return self.clone();
        }
        let planes: Vec<Plane> = self
            .planes()
            .iter()
            .map(|p| imageops::blur(p, sigma))
            .collect();
        Frame::from_planes(&planes)
    }

    /// Downscale so the pixel count fits `budget`, keeping aspect ratio.
    /// Frames already within budget are returned as-is.
    pub fn fit_to_budget(&self, budget: u64, filter: FilterType) -> Frame {
        let (w, h) = budget_dimensions(self.width, self.height, budget);
        if (w, h) == (self.width, self.height) {
            self.clone()
        } else {
            self.resized(w, h, filter)
        }
    }

    /// Quantize to 8-bit RGB. One-channel frames become gray; alpha is dropped.
    pub fn to_rgb8(&self) -> Option<RgbImage> {
        if !matches!(self.channels, 1 | 3 | 4) {
            return None;
        }
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut img = RgbImage::new(self.width, self.height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let src = self.pixel(x, y);
            *px = if self.channels == 1 {
                let g = to_u8(src[0]);
                Rgb([g, g, g])
            } else {
                Rgb([to_u8(src[0]), to_u8(src[1]), to_u8(src[2])])
            };
        }
        Some(img)
    }

    pub fn from_rgb8(img: &RgbImage) -> Frame {
        let (w, h) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Frame::new(w, h, 3, data)
    }
}

/// Largest size with the same aspect ratio whose pixel count fits `budget`.
pub fn budget_dimensions(width: u32, height: u32, budget: u64) -> (u32, u32) {
    let pixels = width as u64 * height as u64;
    if pixels <= budget || pixels == 0 {
        return (width, height);
    }
    let scale = (budget as f64 / pixels as f64).sqrt();
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32, channels: usize) -> Frame {
        Frame::from_fn(w, h, channels, |x, _, _| x as f32 / (w - 1).max(1) as f32)
    }

    #[test]
    fn budget_keeps_small_frames() {
        assert_eq!(budget_dimensions(800, 600, 1_000_000), (800, 600));
    }

    #[test]
    fn budget_shrinks_and_keeps_aspect() {
        let (w, h) = budget_dimensions(2000, 1000, 1_000_000);
        assert!(w as u64 * h as u64 <= 1_000_000);
        assert_eq!((w, h), (1414, 707));
    }

    #[test]
    fn budget_never_collapses_to_zero() {
        assert_eq!(budget_dimensions(1, 4_000_000, 1_000_000), (1, 2_000_000));
    }

    #[test]
    fn map_clamps() {
        let f = Frame::filled(2, 2, 3, 0.8).map(|v| v * 2.0);
        assert!(f.data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn resized_changes_dimensions_and_channels_survive() {
        let f = gradient(8, 4, 1).resized(4, 2, FilterType::Triangle);
        assert_eq!((f.width, f.height, f.channels), (4, 2, 1));
        assert_eq!(f.data.len(), 8);
    }

    #[test]
    fn blur_of_flat_frame_is_flat() {
        let f = Frame::filled(10, 10, 3, 0.25).blurred(2.0);
        assert!(f.data.iter().all(|v| (v - 0.25).abs() < 1e-2));
    }

    #[test]
    fn gray_and_expand() {
        let f = Frame::new(1, 1, 3, vec![0.0, 0.5, 1.0]);
        let g = f.to_gray();
        assert_eq!(g.channels, 1);
        assert!((g.data[0] - 0.5).abs() < 1e-6);
        assert_eq!(g.expand_channels(3).data, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn rgb8_conversion() {
        let f = Frame::new(1, 1, 1, vec![1.0]);
        let img = f.to_rgb8().unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert!(Frame::filled(1, 1, 2, 0.0).to_rgb8().is_none());
        let back = Frame::from_rgb8(&img);
        assert_eq!(back.data, vec![1.0, 1.0, 1.0]);
    }
}
