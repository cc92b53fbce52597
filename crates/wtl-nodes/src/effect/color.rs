//! Per-pixel colour adjustments. Percent params run from -100 to 100 with 0
//! as the identity.

use super::{effect_params, Effect, Frame, NodeKind};

/// Colour channels of a pixel; alpha, if any, is left alone.
fn rgb(px: &mut [f32]) -> &mut [f32] {
    let n = px.len().min(3);
    &mut px[..n]
}

/// Rec.601 luma. Single-channel pixels are their own luma.
fn luma(px: &[f32]) -> f32 {
    match px {
        [r, g, b, ..] => 0.299 * r + 0.587 * g + 0.114 * b,
        [v, ..] => *v,
        [] => 0.0,
    }
}

effect_params! {
    pub struct BrightnessParams {
        pub brightness: f64,
    }
}

pub struct Brightness;

impl Effect for Brightness {
    type Params = BrightnessParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Brightness
    }

    fn apply(&self, _item: usize, input: &Frame, params: &BrightnessParams) -> Frame {
        let factor = (1.0 + params.brightness / 100.0) as f32;
        input.map_pixels(|px| rgb(px).iter_mut().for_each(|v| *v *= factor))
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}

effect_params! {
    pub struct ContrastParams {
        pub contrast: f64,
    }
}

pub struct Contrast;

impl Effect for Contrast {
    type Params = ContrastParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Contrast
    }

    fn apply(&self, _item: usize, input: &Frame, params: &ContrastParams) -> Frame {
        let factor = (1.0 + params.contrast / 100.0) as f32;
        input.map_pixels(|px| {
            rgb(px)
                .iter_mut()
                .for_each(|v| *v = (*v - 0.5) * factor + 0.5);
        })
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}

effect_params! {
    pub struct SaturationParams {
        pub saturation: f64,
    }
}

pub struct Saturation;

impl Effect for Saturation {
    type Params = SaturationParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Saturation
    }

    fn apply(&self, _item: usize, input: &Frame, params: &SaturationParams) -> Frame {
        if input.channels < 3 {
            return input.clone();
        }
        let factor = (1.0 + params.saturation / 100.0) as f32;
        input.map_pixels(|px| {
            let gray = luma(px);
            rgb(px)
                .iter_mut()
                .for_each(|v| *v = gray + (*v - gray) * factor);
        })
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}

effect_params! {
    pub struct ExposureParams {
        pub exposure: f64,
    }
}

pub struct Exposure;

impl Effect for Exposure {
    type Params = ExposureParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Exposure
    }

    /// One stop per 100 units.
    fn apply(&self, _item: usize, input: &Frame, params: &ExposureParams) -> Frame {
        let gain = 2f64.powf(params.exposure / 100.0) as f32;
        input.map_pixels(|px| rgb(px).iter_mut().for_each(|v| *v *= gain))
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}

effect_params! {
    pub struct TemperatureParams {
        pub kelvin: i64,
    }
}

pub struct Temperature;

/// Black-body colour of `kelvin` as normalised RGB (Tanner Helland's fit).
fn kelvin_to_rgb(kelvin: f64) -> [f64; 3] {
    let t = kelvin / 100.0;
    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2)
    };
    let g = if t <= 66.0 {
        99.470_802_586_1 * t.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2)
    };
    let b = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
    };
    [r, g, b].map(|c| c.clamp(0.0, 255.0) / 255.0)
}

impl Temperature {
    /// Per-channel gains that tint neutral 6500 K toward `kelvin`.
    pub fn gains(kelvin: i64) -> [f32; 3] {
        let target = kelvin_to_rgb(kelvin as f64);
        let neutral = kelvin_to_rgb(6500.0);
        std::array::from_fn(|c| (target[c] / neutral[c].max(1e-6)) as f32)
    }
}

impl Effect for Temperature {
    type Params = TemperatureParams;

    fn kind(&self) -> NodeKind {
        NodeKind::Temperature
    }

    fn apply(&self, _item: usize, input: &Frame, params: &TemperatureParams) -> Frame {
        if input.channels < 3 {
            return input.clone();
        }
        let gains = Temperature::gains(params.kelvin);
        input.map_pixels(|px| {
            for (v, g) in rgb(px).iter_mut().zip(gains) {
                *v *= g;
            }
        })
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}

effect_params! {
    pub struct HighlightShadowParams {
        pub shadow_adjustment: f64,
        pub highlight_adjustment: f64,
        pub midpoint: f64,
        pub feather_radius: f64,
    }
}

/// Lifts or lowers the HSV value channel separately below and above a
/// midpoint, keeping hue and saturation.
pub struct HighlightShadow;

impl Effect for HighlightShadow {
    type Params = HighlightShadowParams;

    fn kind(&self) -> NodeKind {
        NodeKind::HighlightShadow
    }

    fn apply(&self, _item: usize, input: &Frame, params: &HighlightShadowParams) -> Frame {
        let mid = params.midpoint as f32;
        let value: Vec<f32> = input
            .data
            .chunks_exact(input.channels.max(1))
            .map(|px| px[..px.len().min(3)].iter().copied().fold(0.0, f32::max))
            .collect();

        let mask = |f: &dyn Fn(f32) -> f32| {
            let plane = Frame::new(
                input.width,
                input.height,
                1,
                value.iter().map(|&v| f(v).clamp(0.0, 1.0)).collect(),
            );
            if params.feather_radius > 0.0 {
                plane.blurred((params.feather_radius / 3.0) as f32)
            } else {
                plane
            }
        };
        let shadows = mask(&|v| (mid - v) / (mid + 1e-10));
        let highlights = mask(&|v| (v - mid) / (1.0 - mid + 1e-10));

        let shadow_amount = (params.shadow_adjustment / 100.0) as f32;
        let highlight_amount = (params.highlight_adjustment / 100.0) as f32;

        let mut i = 0;
        input.map_pixels(|px| {
            let v = value[i];
            let adjusted = (v + shadow_amount * shadows.data[i] + highlight_amount * highlights.data[i])
                .clamp(0.0, 1.0);
            i += 1;
            let colour = rgb(px);
            if v > 0.0 {
                let scale = adjusted / v;
                colour.iter_mut().for_each(|c| *c *= scale);
            } else {
                colour.iter_mut().for_each(|c| *c = adjusted);
            }
        })
    }

    fn scale_invariant(&self) -> bool {
        true
    }
}
