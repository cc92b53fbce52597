//! Per-channel posterisation with optional ordered dithering.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{choice_param, effect_params, Effect, Frame, NodeKind};

choice_param! {
    pub enum DitherMethod {
        None => "none",
        Bayer => "bayer",
        ArithmeticAdd => "arithmetic_add",
        BlueNoise => "blue_noise",
    }
}

effect_params! {
    pub struct DitherParams {
        pub dither_method: DitherMethod,
        pub r_levels: i64,
        pub g_levels: i64,
        pub b_levels: i64,
        pub dither_scale: f64,
    }
}

/// 8×8 Bayer index matrix, entries `0..64`.
fn bayer8() -> [[u8; 8]; 8] {
    let mut m = [[0u8; 8]; 8];
    let mut size = 1;
    while size < 8 {
        for y in 0..size {
            for x in 0..size {
                let v = m[y][x] * 4;
                m[y][x] = v;
                m[y][x + size] = v + 2;
                m[y + size][x] = v + 3;
                m[y + size][x + size] = v + 1;
            }
        }
        size *= 2;
    }
    m
}

const NOISE_SIZE: u32 = 256;

/// Tiling 256×256 blue-noise texture, one plane per colour channel, values
/// in `[0, 1]`. Seeded white noise with its low frequencies subtracted a few
/// times over; built once per process.
fn blue_noise() -> &'static [Frame; 3] {
    static TEXTURE: OnceLock<[Frame; 3]> = OnceLock::new();
    TEXTURE.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0);
        std::array::from_fn(|_| {
            let white = Frame::from_fn(NOISE_SIZE, NOISE_SIZE, 1, |_, _, _| rng.random::<f32>());
            let mut noise = white.clone();
            for _ in 0..5 {
                let smooth = noise.blurred(2.0);
                noise = Frame::from_fn(NOISE_SIZE, NOISE_SIZE, 1, |x, y, _| {
                    white.get(x, y, 0) - 0.7 * smooth.get(x, y, 0)
                });
                let (lo, hi) = noise
                    .data
                    .iter()
                    .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                noise = noise.map(|v| (v - lo) / (hi - lo + 1e-8));
            }
            noise
        })
    })
}

fn quantize(v: f32, levels: i64) -> f32 {
    let steps = (levels.max(2) - 1) as f32;
    ((v * steps + 0.5).floor() / steps).clamp(0.0, 1.0)
}

pub struct Dither;

impl Dither {
    /// Offset added before quantising channel `c` at (`x`, `y`), already in
    /// pattern space (divided by the dither scale).
    fn threshold(method: DitherMethod, bayer: &[[u8; 8]; 8], x: u32, y: u32, c: usize, levels: i64) -> f32 {
        let levels = levels.max(2) as f32;
        match method {
            DitherMethod::None => 0.0,
            DitherMethod::Bayer => {
                let b = bayer[(y % 8) as usize][(x % 8) as usize] as f32;
                (b - 32.5) / 64.0 / levels
            }
            DitherMethod::ArithmeticAdd => {
                let pattern = ((x as u64 + c as u64 * 67 + y as u64 * 236) * 119) & 255;
                (pattern as f32 - 128.0) / 256.0 / levels
            }
            DitherMethod::BlueNoise => {
                let n = (blue_noise()[c].get(x % NOISE_SIZE, y % NOISE_SIZE, 0) * 255.0).floor();
                (n - 128.0) / 257.0 / levels
            }
        }
    }
}

impl Effect for Dither {
    type Params = DitherParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Dither
    }

    fn apply(&self, _item: usize, input: &Frame, params: &DitherParams) -> Frame {
        let levels = [params.r_levels, params.g_levels, params.b_levels];
        let scale = params.dither_scale.max(1e-3);
        let bayer = bayer8();
        let mut out = input.clone();
        for y in 0..input.height {
            let py = (y as f64 / scale) as u32;
            for x in 0..input.width {
                let px = (x as f64 / scale) as u32;
                let pixel = out.pixel_mut(x, y);
                let colour = pixel.len().min(3);
                for (c, v) in pixel[..colour].iter_mut().enumerate() {
                    let t = Dither::threshold(params.dither_method, &bayer, px, py, c, levels[c]);
                    *v = quantize(*v + t, levels[c]);
                }
            }
        }
        out
    }
}
