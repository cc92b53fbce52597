//! Resize, zoom, translation and rotation. Frames are channel-generic, so the
//! mask node kinds run the same code on one-channel frames.

use image::imageops::FilterType;

use super::{choice_param, effect_params, Effect, Frame, NodeKind};

choice_param! {
    pub enum Interpolation {
        Area => "area",
        Nearest => "nearest",
        Bilinear => "bilinear",
        Bicubic => "bicubic",
        Lanczos => "lanczos",
    }
}

impl Interpolation {
    /// Resampling filter for scaling. `image` has no box filter, so area
    /// averaging falls back to the triangle filter.
    pub fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear | Interpolation::Area => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        }
    }
}

choice_param! {
    pub enum ResizeFit {
        Crop => "crop",
        Adjust => "adjust",
        Fit => "fit",
    }
}

choice_param! {
    pub enum RotateFit {
        Crop => "crop",
        Fit => "fit",
        Adjust => "adjust",
        Expand => "none",
    }
}

choice_param! {
    pub enum Background {
        Black => "black",
        White => "white",
    }
}

impl Background {
    fn value(self) -> f32 {
        match self {
            Background::Black => 0.0,
            Background::White => 1.0,
        }
    }
}

/// Copy of the `w`×`h` window at (`x`, `y`). The window must lie inside `src`.
fn crop(src: &Frame, x: u32, y: u32, w: u32, h: u32) -> Frame {
    Frame::from_fn(w, h, src.channels, |cx, cy, c| src.get(x + cx, y + cy, c))
}

/// `src` centred on a `w`×`h` canvas of `fill`.
fn pad(src: &Frame, w: u32, h: u32, fill: f32) -> Frame {
    let ox = (w.saturating_sub(src.width) / 2) as i64;
    let oy = (h.saturating_sub(src.height) / 2) as i64;
    Frame::from_fn(w, h, src.channels, |x, y, c| {
        let sx = x as i64 - ox;
        let sy = y as i64 - oy;
        if (0..src.width as i64).contains(&sx) && (0..src.height as i64).contains(&sy) {
            src.get(sx as u32, sy as u32, c)
        } else {
            fill
        }
    })
}

/// Centre crop when `src` is larger, centre pad when smaller.
fn fit_canvas(src: &Frame, w: u32, h: u32, fill: f32) -> Frame {
    if src.width >= w && src.height >= h {
        crop(src, (src.width - w) / 2, (src.height - h) / 2, w, h)
    } else if src.width <= w && src.height <= h {
        pad(src, w, h, fill)
    } else {
        // Larger on one axis only: pad up to a canvas covering both, then crop.
        let padded = pad(src, src.width.max(w), src.height.max(h), fill);
        crop(&padded, (padded.width - w) / 2, (padded.height - h) / 2, w, h)
    }
}

fn fetch(src: &Frame, x: i64, y: i64, c: usize, fill: f32) -> f32 {
    if x < 0 || y < 0 || x >= src.width as i64 || y >= src.height as i64 {
        fill
    } else {
        src.get(x as u32, y as u32, c)
    }
}

/// Sample `src` at a fractional source position, `fill` outside the frame.
fn sample(src: &Frame, x: f64, y: f64, c: usize, interp: Interpolation, fill: f32) -> f32 {
    if interp == Interpolation::Nearest {
        return fetch(src, x.round() as i64, y.round() as i64, c, fill);
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let top = fetch(src, x0, y0, c, fill) * (1.0 - fx) + fetch(src, x0 + 1, y0, c, fill) * fx;
    let bottom = fetch(src, x0, y0 + 1, c, fill) * (1.0 - fx) + fetch(src, x0 + 1, y0 + 1, c, fill) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Inverse-mapped warp: `to_source` maps each output pixel to the source
/// position it reads from. Warps sample bilinearly unless nearest is chosen.
fn warp(
    src: &Frame,
    width: u32,
    height: u32,
    interp: Interpolation,
    fill: f32,
    to_source: impl Fn(f64, f64) -> (f64, f64),
) -> Frame {
    let mut out = Frame::filled(width, height, src.channels, fill);
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = to_source(x as f64, y as f64);
            let px = out.pixel_mut(x, y);
            for (c, v) in px.iter_mut().enumerate() {
                *v = sample(src, sx, sy, c, interp, fill);
            }
        }
    }
    out
}

fn geometry_kind(mask: bool, image: NodeKind, mask_kind: NodeKind) -> NodeKind {
    if mask { mask_kind } else { image }
}

effect_params! {
    pub struct ResizeParams {
        pub resize_by: bool,
        pub width: i64,
        pub height: i64,
        pub multiplier: f64,
        pub interpolation: Interpolation,
        pub fit_mode: ResizeFit,
    }
}

impl ResizeParams {
    /// Output size for a `w`×`h` input.
    pub fn target(&self, w: u32, h: u32) -> (u32, u32) {
        if self.resize_by {
            (
                ((w as f64 * self.multiplier) as u32).max(1),
                ((h as f64 * self.multiplier) as u32).max(1),
            )
        } else {
            (self.width.max(1) as u32, self.height.max(1) as u32)
        }
    }
}

pub struct Resize {
    pub mask: bool,
}

impl Effect for Resize {
    type Params = ResizeParams;

    fn kind(&self) -> NodeKind {
        geometry_kind(self.mask, NodeKind::ImageResize, NodeKind::MaskResize)
    }

    fn apply(&self, _item: usize, input: &Frame, params: &ResizeParams) -> Frame {
        if input.is_empty() {
            return input.clone();
        }
        let (tw, th) = params.target(input.width, input.height);
        let filter = params.interpolation.filter();
        let aspect = input.width as f64 / input.height as f64;
        let target_aspect = tw as f64 / th as f64;
        match params.fit_mode {
            ResizeFit::Adjust => input.resized(tw, th, filter),
            ResizeFit::Crop => {
                let (nw, nh) = if aspect > target_aspect {
                    ((th as f64 * aspect) as u32, th)
                } else {
                    (tw, (tw as f64 / aspect) as u32)
                };
                let scaled = input.resized(nw.max(tw), nh.max(th), filter);
                fit_canvas(&scaled, tw, th, 0.0)
            }
            ResizeFit::Fit => {
                let (nw, nh) = if aspect > target_aspect {
                    (tw, (tw as f64 / aspect) as u32)
                } else {
                    ((th as f64 * aspect) as u32, th)
                };
                let scaled = input.resized(nw.clamp(1, tw), nh.clamp(1, th), filter);
                pad(&scaled, tw, th, 0.0)
            }
        }
    }
}

effect_params! {
    pub struct ZoomParams {
        pub zoom: f64,
        pub interpolation: Interpolation,
    }
}

/// Scales about the centre, keeping the canvas size: crops when zooming in,
/// pads with black when zooming out.
pub struct Zoom {
    pub mask: bool,
}

impl Effect for Zoom {
    type Params = ZoomParams;

    fn kind(&self) -> NodeKind {
        geometry_kind(self.mask, NodeKind::ImageZoom, NodeKind::MaskZoom)
    }

    fn apply(&self, _item: usize, input: &Frame, params: &ZoomParams) -> Frame {
        if input.is_empty() {
            return input.clone();
        }
        let nw = ((input.width as f64 * params.zoom) as u32).max(1);
        let nh = ((input.height as f64 * params.zoom) as u32).max(1);
        let scaled = input.resized(nw, nh, params.interpolation.filter());
        fit_canvas(&scaled, input.width, input.height, 0.0)
    }
}

effect_params! {
    pub struct TranslateParams {
        pub translate_x: i64,
        pub translate_y: i64,
    }
}

/// Integer shift; uncovered pixels are black.
pub struct Translate {
    pub mask: bool,
}

impl Effect for Translate {
    type Params = TranslateParams;

    fn kind(&self) -> NodeKind {
        geometry_kind(self.mask, NodeKind::ImageTranslation, NodeKind::MaskTranslation)
    }

    fn apply(&self, _item: usize, input: &Frame, params: &TranslateParams) -> Frame {
        Frame::from_fn(input.width, input.height, input.channels, |x, y, c| {
            fetch(
                input,
                x as i64 - params.translate_x,
                y as i64 - params.translate_y,
                c,
                0.0,
            )
        })
    }
}

effect_params! {
    pub struct RotateParams {
        pub rotate: f64,
        pub interpolation: Interpolation,
        pub fit_mode: RotateFit,
        pub bg_color: Background,
    }
}

/// Clockwise rotation in degrees about the frame centre.
pub struct Rotate {
    pub mask: bool,
}

impl Effect for Rotate {
    type Params = RotateParams;

    fn kind(&self) -> NodeKind {
        geometry_kind(self.mask, NodeKind::ImageRotation, NodeKind::MaskRotation)
    }

    fn apply(&self, _item: usize, input: &Frame, params: &RotateParams) -> Frame {
        if input.is_empty() {
            return input.clone();
        }
        let (w, h) = (input.width as f64, input.height as f64);
        let theta = params.rotate.to_radians();
        let (sin, cos) = theta.sin_cos();
        let (abs_sin, abs_cos) = (sin.abs(), cos.abs());

        // Largest scale at which the whole rotated frame fits the canvas.
        let contain = (w / (w * abs_cos + h * abs_sin)).min(h / (w * abs_sin + h * abs_cos));
        let (out_w, out_h, scale) = match params.fit_mode {
            RotateFit::Crop => (input.width, input.height, 1.0),
            RotateFit::Fit => (input.width, input.height, contain),
            // Zoom in by the inverse so the rotated frame covers every corner.
            RotateFit::Adjust if abs_sin < 1e-3 => (input.width, input.height, 1.0),
            RotateFit::Adjust => (input.width, input.height, 1.0 / contain),
            RotateFit::Expand => (
                ((h * abs_sin + w * abs_cos).round() as u32).max(1),
                ((h * abs_cos + w * abs_sin).round() as u32).max(1),
                1.0,
            ),
        };

        let (icx, icy) = ((w - 1.0) / 2.0, (h - 1.0) / 2.0);
        let (ocx, ocy) = ((out_w as f64 - 1.0) / 2.0, (out_h as f64 - 1.0) / 2.0);
        warp(
            input,
            out_w,
            out_h,
            params.interpolation,
            params.bg_color.value(),
            |x, y| {
                let (dx, dy) = (x - ocx, y - ocy);
                (
                    (cos * dx + sin * dy) / scale + icx,
                    (-sin * dx + cos * dy) / scale + icy,
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectParams;
    use crate::params::ParamValue;

    fn ramp(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, 1, |x, y, _| (y * w + x) as f32 / (w * h) as f32)
    }

    fn resize(fit_mode: ResizeFit, width: i64, height: i64) -> ResizeParams {
        ResizeParams {
            resize_by: false,
            width,
            height,
            multiplier: 1.0,
            interpolation: Interpolation::Bilinear,
            fit_mode,
        }
    }

    #[test]
    fn resize_modes_hit_target_size() {
        let src = Frame::filled(40, 20, 3, 0.5);
        for fit in [ResizeFit::Crop, ResizeFit::Adjust, ResizeFit::Fit] {
            let out = Resize { mask: false }.apply(0, &src, &resize(fit, 16, 16));
            assert_eq!((out.width, out.height, out.channels), (16, 16, 3), "{fit:?}");
        }
    }

    #[test]
    fn resize_fit_letterboxes_with_black() {
        let src = Frame::filled(40, 20, 1, 1.0);
        let out = Resize { mask: true }.apply(0, &src, &resize(ResizeFit::Fit, 16, 16));
        assert_eq!(out.get(8, 0, 0), 0.0);
        assert!(out.get(8, 8, 0) > 0.9);
    }

    #[test]
    fn resize_by_multiplier() {
        let p = ResizeParams {
            resize_by: true,
            multiplier: 0.5,
            ..resize(ResizeFit::Adjust, 512, 512)
        };
        assert_eq!(p.target(100, 60), (50, 30));
    }

    #[test]
    fn translate_shifts_and_fills_black() {
        let src = ramp(4, 4);
        let out = Translate { mask: true }.apply(
            0,
            &src,
            &TranslateParams {
                translate_x: 1,
                translate_y: 0,
            },
        );
        assert_eq!(out.get(0, 0, 0), 0.0);
        assert_eq!(out.get(1, 2, 0), src.get(0, 2, 0));
    }

    #[test]
    fn zoom_keeps_canvas() {
        let src = ramp(10, 6);
        for zoom in [0.5, 1.0, 2.0] {
            let p = ZoomParams {
                zoom,
                interpolation: Interpolation::Nearest,
            };
            let out = Zoom { mask: true }.apply(0, &src, &p);
            assert_eq!((out.width, out.height), (10, 6));
        }
    }

    #[test]
    fn zoom_out_pads_corners() {
        let src = Frame::filled(10, 10, 1, 1.0);
        let p = ZoomParams {
            zoom: 0.5,
            interpolation: Interpolation::Bilinear,
        };
        let out = Zoom { mask: false }.apply(0, &src, &p);
        assert_eq!(out.get(0, 0, 0), 0.0);
        assert!(out.get(5, 5, 0) > 0.9);
    }

    fn rotate(angle: f64, fit_mode: RotateFit) -> RotateParams {
        RotateParams {
            rotate: angle,
            interpolation: Interpolation::Nearest,
            fit_mode,
            bg_color: Background::Black,
        }
    }

    #[test]
    fn rotate_zero_is_identity() {
        let src = ramp(5, 3);
        assert_eq!(Rotate { mask: true }.apply(0, &src, &rotate(0.0, RotateFit::Crop)), src);
    }

    #[test]
    fn rotate_half_turn_reverses() {
        let src = ramp(3, 1);
        let out = Rotate { mask: true }.apply(0, &src, &rotate(180.0, RotateFit::Crop));
        assert_eq!(out.get(0, 0, 0), src.get(2, 0, 0));
        assert_eq!(out.get(2, 0, 0), src.get(0, 0, 0));
    }

    #[test]
    fn rotate_none_grows_canvas() {
        let src = ramp(4, 2);
        let out = Rotate { mask: true }.apply(0, &src, &rotate(90.0, RotateFit::Expand));
        assert_eq!((out.width, out.height), (2, 4));
    }

    #[test]
    fn rotate_adjust_fills_corners() {
        let src = Frame::filled(20, 20, 1, 1.0);
        let cropped = Rotate { mask: true }.apply(0, &src, &rotate(30.0, RotateFit::Crop));
        assert_eq!(cropped.get(0, 0, 0), 0.0);
        let adjusted = Rotate { mask: true }.apply(0, &src, &rotate(30.0, RotateFit::Adjust));
        assert_eq!((adjusted.width, adjusted.height), (20, 20));
        assert!(adjusted.data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rotate_adjust_at_zero_is_identity() {
        let src = ramp(5, 3);
        assert_eq!(Rotate { mask: true }.apply(0, &src, &rotate(0.0, RotateFit::Adjust)), src);
    }

    #[test]
    fn rotate_white_background() {
        let src = Frame::filled(8, 8, 3, 0.0);
        let p = RotateParams {
            bg_color: Background::White,
            ..rotate(45.0, RotateFit::Crop)
        };
        let out = Rotate { mask: false }.apply(0, &src, &p);
        assert_eq!(out.get(0, 0, 0), 1.0);
        assert_eq!(out.get(4, 4, 0), 0.0);
    }

    #[test]
    fn choice_params_parse_from_store_values() {
        let values = vec![
            ParamValue::Float(45.0),
            ParamValue::from("bicubic"),
            ParamValue::from("fit"),
            ParamValue::from("white"),
        ];
        let p = RotateParams::from_values(&values).unwrap();
        assert_eq!(p.interpolation, Interpolation::Bicubic);
        assert_eq!(p.fit_mode, RotateFit::Fit);
        let mut bad = values.clone();
        bad[2] = ParamValue::from("stretch");
        assert!(RotateParams::from_values(&bad).is_none());
    }

    #[test]
    fn kinds_follow_target() {
        assert_eq!(Rotate { mask: true }.kind(), NodeKind::MaskRotation);
        assert_eq!(Zoom { mask: false }.kind(), NodeKind::ImageZoom);
    }
}
