//! Lens-style depth of field: a shaped bokeh kernel averaged over the
//! out-of-focus region only, so sharp subjects don't bleed into the blur.

use std::f64::consts::{FRAC_PI_4, FRAC_PI_6, FRAC_PI_8, LN_2, PI};

use super::depth::{DepthMaps, FocusPlane};
use super::mask::dilate;
use super::{choice_param, effect_params, Effect, Frame, NodeKind};

/// Blur weight below which a pixel counts as in focus.
const IN_FOCUS_BELOW: f32 = 0.01;
/// Blur levels blended between in depth-aware mode.
const LEVELS: usize = 8;

choice_param! {
    pub enum BokehShape {
        Circle => "circle",
        Hexagon => "hexagon",
        Octagon => "octagon",
    }
}

effect_params! {
    pub struct CameraDepthOfFieldParams {
        pub focal_point: f64,
        pub focus_falloff: f64,
        pub edge_fix: i64,
        pub focal_plane: f64,
        pub blur_strength: f64,
        pub in_focus_mask_fix: i64,
        pub bokeh_shape: BokehShape,
        pub highlight_factor: f64,
        pub highlight_threshold_low: f64,
        pub highlight_threshold_high: f64,
        pub depth_aware_blur: bool,
        pub blur_fixed_edge: bool,
    }
}

impl CameraDepthOfFieldParams {
    fn plane(&self) -> FocusPlane {
        FocusPlane {
            focus: self.focal_point,
            hard_range: self.focal_plane,
            falloff: self.focus_falloff,
            edge_fix: self.edge_fix,
        }
    }
}

/// Odd kernel width for a blur strength.
fn kernel_size(blur_strength: f64) -> usize {
    (blur_strength.max(0.0) * 2.0) as usize * 2 + 1
}

/// Flat-topped aperture of `size`×`size` pixels. Every shape is convex, so
/// each kernel row is one run of columns.
#[derive(Debug, Clone, PartialEq)]
struct BokehKernel {
    /// `(dy, first dx, last dx)` per non-empty row.
    rows: Vec<(i64, i64, i64)>,
}

impl BokehKernel {
    fn new(size: usize, shape: BokehShape) -> Self {
        let c = (size / 2) as i64;
        let radius = c as f64;
        let inside = |x: i64, y: i64| {
            let (x, y) = (x as f64, y as f64);
            let distance = x.hypot(y);
            let angle = y.atan2(x);
            match shape {
                BokehShape::Circle => distance <= radius,
                BokehShape::Hexagon => distance <= 0.95 * radius / (angle.rem_euclid(PI / 3.0) - FRAC_PI_6).cos(),
                BokehShape::Octagon => distance <= 0.95 * radius / (angle.rem_euclid(FRAC_PI_4) - FRAC_PI_8).cos(),
            }
        };
        let rows = (-c..=c)
            .filter_map(|dy| {
                let mut run = (-c..=c).filter(|&dx| inside(dx, dy));
                let first = run.next()?;
                let last = run.last().unwrap_or(first);
                Some((dy, first, last))
            })
            .collect();
        Self { rows }
    }

    #[cfg(test)]
    fn contains(&self, dx: i64, dy: i64) -> bool {
        self.rows
            .iter()
            .any(|&(row, first, last)| row == dy && (first..=last).contains(&dx))
    }

    /// Sum of `plane` under the kernel centred on every pixel, zero outside.
    fn sum(&self, plane: &[f32], width: usize, height: usize) -> Vec<f32> {
        let mut prefix = vec![0.0f64; (width + 1) * height];
        for y in 0..height {
            let row = &mut prefix[y * (width + 1)..(y + 1) * (width + 1)];
            for x in 0..width {
                row[x + 1] = row[x] + plane[y * width + x] as f64;
            }
        }
        let (w, h) = (width as i64, height as i64);
        let mut out = vec![0.0; width * height];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for &(dy, first, last) in &self.rows {
                    let sy = y + dy;
                    let (lo, hi) = ((x + first).max(0), (x + last).min(w - 1));
                    if sy < 0 || sy >= h || lo > hi {
                        continue;
                    }
                    let row = &prefix[sy as usize * (width + 1)..];
                    acc += row[hi as usize + 1] - row[lo as usize];
                }
                out[(y * w + x) as usize] = acc as f32;
            }
        }
        out
    }
}

/// Per-pixel focus classification. `border` is the ring added by the
/// in-focus fix; `in_focus` includes it.
struct Zones {
    in_focus: Vec<bool>,
    border: Vec<bool>,
}

impl Zones {
    fn new(blur_mask: &Frame, fix: i64) -> Self {
        let sharp: Vec<bool> = blur_mask.data.iter().map(|&b| b < IN_FOCUS_BELOW).collect();
        if fix <= 0 {
            let border = vec![false; sharp.len()];
            return Self { in_focus: sharp, border };
        }
        let as_mask = Frame::new(
            blur_mask.width,
            blur_mask.height,
            1,
            sharp.iter().map(|&s| if s { 1.0 } else { 0.0 }).collect(),
        );
        let in_focus: Vec<bool> = dilate(&as_mask, fix as u32).data.iter().map(|&v| v > 0.5).collect();
        let border = in_focus.iter().zip(&sharp).map(|(&grown, &s)| grown && !s).collect();
        Self { in_focus, border }
    }

    fn to_frames(&self, width: u32, height: u32) -> [Frame; 3] {
        let frame = |f: &dyn Fn(usize) -> bool| {
            Frame::new(width, height, 1, (0..self.in_focus.len()).map(|i| if f(i) { 1.0 } else { 0.0 }).collect())
        };
        [
            frame(&|i| self.in_focus[i]),
            frame(&|i| !self.in_focus[i]),
            frame(&|i| self.border[i]),
        ]
    }
}

/// Colour planes and luminance weights of one image, with the in-focus
/// pixels zeroed so they don't contribute to the blur.
struct Weighted {
    planes: Vec<Vec<f32>>,
    weights: Vec<f32>,
}

impl Weighted {
    fn new(input: &Frame, params: &CameraDepthOfFieldParams, in_focus: Option<&[bool]>) -> Self {
        let colour = input.channels.min(3);
        let n = input.pixel_count() as usize;
        let (low, high) = (params.highlight_threshold_low, params.highlight_threshold_high);
        let boost = 10.0 * params.highlight_factor * LN_2;
        let mut planes = vec![vec![0.0; n]; colour];
        let mut weights = vec![0.0; n];
        for (i, px) in input.data.chunks_exact(input.channels.max(1)).enumerate() {
            if in_focus.is_some_and(|f| f[i]) {
                continue;
            }
            let w = if params.highlight_factor > 0.0 {
                let luma = if colour == 3 {
                    0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2]
                } else {
                    px[0]
                };
                let v = ((luma as f64 - low) / (high - low + 1e-8)).clamp(0.0, 1.0);
                (v * boost).exp() as f32
            } else {
                1.0
            };
            for (c, plane) in planes.iter_mut().enumerate() {
                plane[i] = px[c] * w;
            }
            weights[i] = w;
        }
        Self { planes, weights }
    }

    fn blurred(&self, kernel: &BokehKernel, width: usize, height: usize) -> Self {
        Self {
            planes: self.planes.iter().map(|p| kernel.sum(p, width, height)).collect(),
            weights: kernel.sum(&self.weights, width, height),
        }
    }

    fn normalized(&self, i: usize, c: usize) -> f32 {
        (self.planes[c][i] / (self.weights[i] + 1e-8)).clamp(0.0, 1.0)
    }
}

/// Flat mode: one kernel for every out-of-focus pixel.
fn flat_blur(input: &Frame, params: &CameraDepthOfFieldParams, zones: &Zones) -> Vec<Vec<f32>> {
    let (w, h) = (input.width as usize, input.height as usize);
    let size = kernel_size(params.blur_strength);
    let colour = input.channels.min(3);
    if size <= 1 {
        return source_planes(input, colour);
    }
    let kernel = BokehKernel::new(size, params.bokeh_shape);
    let sums = Weighted::new(input, params, Some(zones.in_focus.as_slice())).blurred(&kernel, w, h);
    (0..colour)
        .map(|c| (0..w * h).map(|i| sums.normalized(i, c)).collect())
        .collect()
}

/// Depth-aware mode: kernels grow with the blur weight, interpolated between
/// evenly spaced sizes.
fn depth_aware_blur(input: &Frame, blur_mask: &Frame, params: &CameraDepthOfFieldParams, zones: &Zones) -> Vec<Vec<f32>> {
    let (w, h) = (input.width as usize, input.height as usize);
    let colour = input.channels.min(3);
    let largest = kernel_size(params.blur_strength);
    let masked = Weighted::new(input, params, Some(zones.in_focus.as_slice()));
    let levels: Vec<Weighted> = (0..LEVELS)
        .map(|level| {
            let size = 1 + (largest - 1) * level / (LEVELS - 1);
            let size = size | 1;
            if size <= 1 {
                Weighted::new(input, params, None)
            } else {
                masked.blurred(&BokehKernel::new(size, params.bokeh_shape), w, h)
            }
        })
        .collect();

    let mut out = vec![vec![0.0; w * h]; colour];
    for i in 0..w * h {
        let scaled = blur_mask.data[i] * (LEVELS - 1) as f32;
        let lower = (scaled.floor().max(0.0) as usize).min(LEVELS - 2);
        let t = scaled - lower as f32;
        let (a, b) = (&levels[lower], &levels[lower + 1]);
        let weight = a.weights[i] * (1.0 - t) + b.weights[i] * t;
        for (c, plane) in out.iter_mut().enumerate() {
            let sum = a.planes[c][i] * (1.0 - t) + b.planes[c][i] * t;
            plane[i] = (sum / (weight + 1e-8)).clamp(0.0, 1.0);
        }
    }
    out
}

fn source_planes(input: &Frame, colour: usize) -> Vec<Vec<f32>> {
    let channels = input.channels.max(1);
    (0..colour)
        .map(|c| input.data.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

/// 5×5 Gaussian (sigma 1) over the border ring only.
fn soften_border(input: &Frame, zones: &Zones, c: usize) -> Vec<f32> {
    let (w, h) = (input.width as i64, input.height as i64);
    let mut out = vec![0.0; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            if !zones.border[i] {
                continue;
            }
            let (mut acc, mut norm) = (0.0, 0.0);
            for dy in -2..=2i64 {
                for dx in -2..=2i64 {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx < 0 || sy < 0 || sx >= w || sy >= h || !zones.border[(sy * w + sx) as usize] {
                        continue;
                    }
                    let g = (-((dx * dx + dy * dy) as f32) / 2.0).exp();
                    acc += g * input.get(sx as u32, sy as u32, c);
                    norm += g;
                }
            }
            out[i] = (acc / (norm + 1e-8)).clamp(0.0, 1.0);
        }
    }
    out
}

/// Depth of field with a shaped aperture, optional highlight boost, and
/// focus-zone masks as extra outputs: blur, in focus, out of focus and the
/// in-focus fix border, in that order.
pub struct CameraDepthOfField {
    depths: DepthMaps,
}

impl CameraDepthOfField {
    pub fn new(depths: DepthMaps) -> Self {
        Self { depths }
    }

    fn blur_mask(&self, item: usize, input: &Frame, params: &CameraDepthOfFieldParams) -> Frame {
        self.depths.blur_mask(item, input.width, input.height, params.plane())
    }
}

impl Effect for CameraDepthOfField {
    type Params = CameraDepthOfFieldParams;

    fn kind(&self) -> NodeKind {
        NodeKind::CameraDepthOfField
    }

    fn apply(&self, item: usize, input: &Frame, params: &CameraDepthOfFieldParams) -> Frame {
        self.apply_with_masks(item, input, params).0
    }

    fn apply_with_masks(&self, item: usize, input: &Frame, params: &CameraDepthOfFieldParams) -> (Frame, Vec<Frame>) {
        let blur_mask = self.blur_mask(item, input, params);
        let zones = Zones::new(&blur_mask, params.in_focus_mask_fix);
        let blurred = if params.depth_aware_blur {
            depth_aware_blur(input, &blur_mask, params, &zones)
        } else {
            flat_blur(input, params, &zones)
        };

        let colour = input.channels.min(3);
        let channels = input.channels.max(1);
        let border: Vec<Vec<f32>> = if params.blur_fixed_edge && zones.border.iter().any(|&b| b) {
            (0..colour).map(|c| soften_border(input, &zones, c)).collect()
        } else {
            Vec::new()
        };

        let mut out = input.clone();
        for (i, px) in out.data.chunks_exact_mut(channels).enumerate() {
            let m = blur_mask.data[i];
            for c in 0..colour {
                let lens = if zones.border[i] {
                    border.get(c).map_or(px[c], |plane| plane[i])
                } else if zones.in_focus[i] {
                    px[c]
                } else {
                    blurred[c][i]
                };
                px[c] = px[c] * (1.0 - m) + lens * m;
            }
        }

        let [in_focus, out_of_focus, border_mask] = zones.to_frames(input.width, input.height);
        (out, vec![blur_mask, in_focus, out_of_focus, border_mask])
    }

    /// Nothing blurred, everything in focus.
    fn skipped_masks(&self, input: &Frame) -> Vec<Frame> {
        let (w, h) = (input.width, input.height);
        vec![
            Frame::filled(w, h, 1, 0.0),
            Frame::filled(w, h, 1, 1.0),
            Frame::filled(w, h, 1, 0.0),
            Frame::filled(w, h, 1, 0.0),
        ]
    }

    /// The blur weight, as with the plain depth-of-field node.
    fn preview(&self, item: usize, input: &Frame, params: &CameraDepthOfFieldParams) -> Frame {
        self.blur_mask(item, input, params).expand_channels(3)
    }
}
