//! Depth-of-field from a depth map, and the depth handling shared with the
//! camera variant.

use super::mask::{dilate, erode, kernel_sigma};
use super::{effect_params, Effect, Frame, NodeKind};

effect_params! {
    pub struct DepthOfFieldParams {
        pub focus_depth: f64,
        pub focus_range: f64,
        pub edge_fix: i64,
        pub hard_focus_range: f64,
        pub blur_strength: f64,
    }
}

/// Sharp zone in normalised depth: `focus ± hard_range` stays sharp, blur
/// ramps to full over `falloff` beyond it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPlane {
    pub focus: f64,
    pub hard_range: f64,
    pub falloff: f64,
    pub edge_fix: i64,
}

/// One depth map per batch item, collapsed to one channel and normalised to
/// `[0, 1]`. Never empty; the last map is reused if the batch is longer.
#[derive(Debug, Clone)]
pub struct DepthMaps {
    maps: Vec<Frame>,
}

impl DepthMaps {
    /// `None` when no maps are given.
    pub fn new(depth_maps: &[Frame]) -> Option<Self> {
        if depth_maps.is_empty() {
            return None;
        }
        let maps = depth_maps.iter().map(normalize_depth).collect();
        Some(Self { maps })
    }

    fn for_item(&self, item: usize) -> &Frame {
        &self.maps[item.min(self.maps.len() - 1)]
    }

    /// Per-pixel blur weight at `width`×`height`: 0 inside the hard focus
    /// zone, ramping to 1 over the falloff on either side, then closed by
    /// `edge_fix`.
    pub fn blur_mask(&self, item: usize, width: u32, height: u32, plane: FocusPlane) -> Frame {
        let depth = self.for_item(item);
        let depth = if (depth.width, depth.height) == (width, height) {
            depth.clone()
        } else {
            depth.resized(width, height, image::imageops::FilterType::Triangle)
        };
        let lo = (plane.focus - plane.hard_range) as f32;
        let hi = (plane.focus + plane.hard_range) as f32;
        let range = plane.falloff.max(1e-6) as f32;
        let mask = depth.map(|d| {
            if d < lo {
                (lo - d) / range
            } else if d > hi {
                (d - hi) / range
            } else {
                0.0
            }
        });
        let radius = plane.edge_fix.unsigned_abs() as u32;
        erode(&dilate(&mask, radius), radius)
    }
}

/// Blurs each item by how far its depth lies from the focus plane. Besides
/// the image it outputs the blur mask it used.
pub struct DepthOfField {
    depths: DepthMaps,
}

impl DepthOfField {
    pub fn new(depths: DepthMaps) -> Self {
        Self { depths }
    }

    pub fn focus_mask(&self, item: usize, width: u32, height: u32, params: &DepthOfFieldParams) -> Frame {
        let plane = FocusPlane {
            focus: params.focus_depth,
            hard_range: params.hard_focus_range,
            falloff: params.focus_range,
            edge_fix: params.edge_fix,
        };
        self.depths.blur_mask(item, width, height, plane)
    }
}

/// `input` blended toward its blurred copy by `mask`.
fn blend_blurred(input: &Frame, mask: &Frame, blur_strength: f64) -> Frame {
    let ksize = (blur_strength * 2.0) as u32 * 2 + 1;
    if ksize <= 1 {
        return input.clone();
    }
    let blurred = input.blurred(kernel_sigma(ksize));
    let channels = input.channels.max(1);
    let mut out = input.clone();
    for ((px, soft), &m) in out
        .data
        .chunks_exact_mut(channels)
        .zip(blurred.data.chunks_exact(channels))
        .zip(&mask.data)
    {
        for (v, b) in px.iter_mut().zip(soft) {
            *v = *v * (1.0 - m) + b * m;
        }
    }
    out
}

impl Effect for DepthOfField {
    type Params = DepthOfFieldParams;

    fn kind(&self) -> NodeKind {
        NodeKind::DepthOfField
    }

    fn apply(&self, item: usize, input: &Frame, params: &DepthOfFieldParams) -> Frame {
        let mask = self.focus_mask(item, input.width, input.height, params);
        blend_blurred(input, &mask, params.blur_strength)
    }

    fn apply_with_masks(&self, item: usize, input: &Frame, params: &DepthOfFieldParams) -> (Frame, Vec<Frame>) {
        let mask = self.focus_mask(item, input.width, input.height, params);
        (blend_blurred(input, &mask, params.blur_strength), vec![mask])
    }

    /// A skipped item reports no blur anywhere.
    fn skipped_masks(&self, input: &Frame) -> Vec<Frame> {
        vec![Frame::filled(input.width, input.height, 1, 0.0)]
    }

    /// The blur weight as a gray image, so focus can be placed before paying
    /// for the blur.
    fn preview(&self, item: usize, input: &Frame, params: &DepthOfFieldParams) -> Frame {
        self.focus_mask(item, input.width, input.height, params)
            .expand_channels(3)
    }
}
