//! Mask morphology: grow or shrink with an elliptical structuring element,
//! then feather. Also filtering of mask regions by area.

use super::{choice_param, effect_params, Effect, Frame, NodeKind};

/// Offsets of a filled disc of `radius` pixels.
fn ellipse(radius: u32) -> Vec<(i64, i64)> {
    let r = radius as i64;
    let limit = (radius as f64 + 0.5).powi(2);
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if ((dx * dx + dy * dy) as f64) <= limit {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Per-channel max (`grow`) or min over the disc around each pixel. Samples
/// outside the frame are ignored.
fn morph(src: &Frame, radius: u32, grow: bool) -> Frame {
    if radius == 0 || src.is_empty() {
        return src.clone();
    }
    let kernel = ellipse(radius);
    let (w, h) = (src.width as i64, src.height as i64);
    Frame::from_fn(src.width, src.height, src.channels, |x, y, c| {
        let mut acc = if grow { f32::MIN } else { f32::MAX };
        for &(dx, dy) in &kernel {
            let (sx, sy) = (x as i64 + dx, y as i64 + dy);
            if sx < 0 || sy < 0 || sx >= w || sy >= h {
                continue;
            }
            let v = src.get(sx as u32, sy as u32, c);
            acc = if grow { acc.max(v) } else { acc.min(v) };
        }
        acc
    })
}

pub fn dilate(src: &Frame, radius: u32) -> Frame {
    morph(src, radius, true)
}

pub fn erode(src: &Frame, radius: u32) -> Frame {
    morph(src, radius, false)
}

/// Gaussian sigma for an odd `ksize`×`ksize` kernel when no sigma is given,
/// the usual `0.3·((k−1)/2 − 1) + 0.8` rule.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

effect_params! {
    pub struct MaskProcessParams {
        pub expand: i64,
        pub feather: i64,
    }
}

/// Positive `expand` dilates, negative erodes; `feather` is a blur radius.
pub struct MaskProcess;

impl Effect for MaskProcess {
    type Params = MaskProcessParams;

    fn kind(&self) -> NodeKind {
        NodeKind::MaskProcessor
    }

    fn apply(&self, _item: usize, input: &Frame, params: &MaskProcessParams) -> Frame {
        let radius = params.expand.unsigned_abs() as u32;
        let shaped = match params.expand {
            e if e > 0 => dilate(input, radius),
            e if e < 0 => erode(input, radius),
            _ => input.clone(),
        };
        if params.feather > 0 {
            let ksize = params.feather as u32 * 2 + 1;
            shaped.blurred(kernel_sigma(ksize))
        } else {
            shaped
        }
    }
}

choice_param! {
    pub enum KeepRule {
        AboveX => "above_x",
        BelowX => "bellow_x",
        BetweenXY => "between_x_y",
    }
}

effect_params! {
    pub struct MaskFilterParams {
        pub area_x: i64,
        pub area_y: i64,
        pub keep: KeepRule,
    }
}

impl MaskFilterParams {
    /// Bounds are inclusive.
    fn keeps(&self, area: usize) -> bool {
        let area = area as i64;
        match self.keep {
            KeepRule::AboveX => area >= self.area_x,
            KeepRule::BelowX => area <= self.area_x,
            KeepRule::BetweenXY => (self.area_x..=self.area_y).contains(&area),
        }
    }
}

/// 4-connected regions of pixels above 0.5, as lists of pixel indices.
fn regions(mask: &Frame) -> Vec<Vec<usize>> {
    let (w, h) = (mask.width as usize, mask.height as usize);
    let lit: Vec<bool> = (0..w * h)
        .map(|i| mask.get((i % w) as u32, (i / w) as u32, 0) > 0.5)
        .collect();
    let mut seen = vec![false; w * h];
    let mut found = Vec::new();
    let mut stack = Vec::new();
    for start in 0..w * h {
        if !lit[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let mut region = Vec::new();
        while let Some(i) = stack.pop() {
            region.push(i);
            let (x, y) = (i % w, i / w);
            let neighbours = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for n in neighbours.into_iter().flatten() {
                if lit[n] && !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        found.push(region);
    }
    found
}

/// Keeps the mask regions whose pixel area passes the keep rule; everything
/// else goes to zero. Kept pixels keep their original values.
pub struct MaskFilter;

impl Effect for MaskFilter {
    type Params = MaskFilterParams;

    fn kind(&self) -> NodeKind {
        NodeKind::MaskFilter
    }

    fn apply(&self, _item: usize, input: &Frame, params: &MaskFilterParams) -> Frame {
        let channels = input.channels.max(1);
        let mut out = Frame::filled(input.width, input.height, input.channels, 0.0);
        for region in regions(input) {
            if !params.keeps(region.len()) {
                continue;
            }
            for i in region {
                let px = i * channels..(i + 1) * channels;
                out.data[px.clone()].copy_from_slice(&input.data[px]);
            }
        }
        out
    }
}
