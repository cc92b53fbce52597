use serde::Serialize;

use crate::params::{ParamDef, ParamValue};

/// Every node type the control panel can address, keyed by its short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Brightness,
    Contrast,
    Saturation,
    Exposure,
    Temperature,
    HighlightShadow,
    DepthOfField,
    CameraDepthOfField,
    ImageResize,
    ImageRotation,
    ImageTranslation,
    ImageZoom,
    Dither,
    MaskProcessor,
    MaskFilter,
    MaskResize,
    MaskRotation,
    MaskTranslation,
    MaskZoom,
}

const INTERPOLATIONS: &[&str] = &["area", "nearest", "bilinear", "bicubic", "lanczos"];

const fn percent(name: &'static str) -> ParamDef {
    ParamDef::Float {
        name,
        default: 0.0,
        min: -100.0,
        max: 100.0,
    }
}

const INTERPOLATION: ParamDef = ParamDef::Choice {
    name: "interpolation",
    default: "bilinear",
    options: INTERPOLATIONS,
};

const BRIGHTNESS: &[ParamDef] = &[percent("brightness")];
const CONTRAST: &[ParamDef] = &[percent("contrast")];
const SATURATION: &[ParamDef] = &[percent("saturation")];
const EXPOSURE: &[ParamDef] = &[percent("exposure")];

const TEMPERATURE: &[ParamDef] = &[ParamDef::Int {
    name: "kelvin",
    default: 6500,
    min: 1000,
    max: 12000,
}];

const HIGHLIGHT_SHADOW: &[ParamDef] = &[
    percent("shadow_adjustment"),
    percent("highlight_adjustment"),
    ParamDef::Float {
        name: "midpoint",
        default: 0.5,
        min: 0.0,
        max: 1.0,
    },
    ParamDef::Float {
        name: "feather_radius",
        default: 50.0,
        min: 0.0,
        max: 200.0,
    },
];

const DEPTH_OF_FIELD: &[ParamDef] = &[
    ParamDef::Float {
        name: "focus_depth",
        default: 0.5,
        min: 0.0,
        max: 1.0,
    },
    ParamDef::Float {
        name: "focus_range",
        default: 0.25,
        min: 0.0,
        max: 1.0,
    },
    ParamDef::Int {
        name: "edge_fix",
        default: 0,
        min: 0,
        max: 5,
    },
    ParamDef::Float {
        name: "hard_focus_range",
        default: 0.0,
        min: 0.0,
        max: 0.5,
    },
    ParamDef::Float {
        name: "blur_strength",
        default: 10.0,
        min: 0.0,
        max: 100.0,
    },
];

const fn unit(name: &'static str, default: f64) -> ParamDef {
    ParamDef::Float {
        name,
        default,
        min: 0.0,
        max: 1.0,
    }
}

const CAMERA_DEPTH_OF_FIELD: &[ParamDef] = &[
    unit("focal_point", 0.5),
    unit("focus_falloff", 0.25),
    ParamDef::Int {
        name: "edge_fix",
        default: 0,
        min: 0,
        max: 5,
    },
    ParamDef::Float {
        name: "focal_plane",
        default: 0.0,
        min: 0.0,
        max: 0.5,
    },
    ParamDef::Float {
        name: "blur_strength",
        default: 10.0,
        min: 0.0,
        max: 100.0,
    },
    ParamDef::Int {
        name: "in_focus_mask_fix",
        default: 0,
        min: 0,
        max: 10,
    },
    ParamDef::Choice {
        name: "bokeh_shape",
        default: "circle",
        options: &["circle", "hexagon", "octagon"],
    },
    unit("highlight_factor", 0.0),
    unit("highlight_threshold_low", 0.0),
    unit("highlight_threshold_high", 1.0),
    ParamDef::Bool {
        name: "depth_aware_blur",
        default: false,
    },
    ParamDef::Bool {
        name: "blur_fixed_edge",
        default: false,
    },
];

const RESIZE: &[ParamDef] = &[
    ParamDef::Bool {
        name: "resize_by",
        default: false,
    },
    ParamDef::Int {
        name: "width",
        default: 512,
        min: 64,
        max: 8192,
    },
    ParamDef::Int {
        name: "height",
        default: 512,
        min: 64,
        max: 8192,
    },
    ParamDef::Float {
        name: "multiplier",
        default: 1.0,
        min: 0.1,
        max: 8.0,
    },
    INTERPOLATION,
    ParamDef::Choice {
        name: "fit_mode",
        default: "crop",
        options: &["crop", "adjust", "fit"],
    },
];

const ROTATION: &[ParamDef] = &[
    ParamDef::Float {
        name: "rotate",
        default: 0.0,
        min: -360.0,
        max: 360.0,
    },
    INTERPOLATION,
    ParamDef::Choice {
        name: "fit_mode",
        default: "crop",
        options: &["crop", "fit", "adjust", "none"],
    },
    ParamDef::Choice {
        name: "bg_color",
        default: "black",
        options: &["black", "white"],
    },
];

const TRANSLATION: &[ParamDef] = &[
    ParamDef::Int {
        name: "translate_x",
        default: 0,
        min: -4096,
        max: 4096,
    },
    ParamDef::Int {
        name: "translate_y",
        default: 0,
        min: -4096,
        max: 4096,
    },
];

const ZOOM: &[ParamDef] = &[
    ParamDef::Float {
        name: "zoom",
        default: 1.0,
        min: 0.1,
        max: 5.0,
    },
    INTERPOLATION,
];

const DITHER: &[ParamDef] = &[
    ParamDef::Choice {
        name: "dither_method",
        default: "none",
        options: &["none", "bayer", "arithmetic_add", "blue_noise"],
    },
    ParamDef::Int {
        name: "r_levels",
        default: 8,
        min: 2,
        max: 256,
    },
    ParamDef::Int {
        name: "g_levels",
        default: 8,
        min: 2,
        max: 256,
    },
    ParamDef::Int {
        name: "b_levels",
        default: 8,
        min: 2,
        max: 256,
    },
    ParamDef::Float {
        name: "dither_scale",
        default: 1.0,
        min: 0.25,
        max: 5.0,
    },
];

const MASK_PROCESSOR: &[ParamDef] = &[
    ParamDef::Int {
        name: "expand",
        default: 0,
        min: -100,
        max: 100,
    },
    ParamDef::Int {
        name: "feather",
        default: 0,
        min: 0,
        max: 100,
    },
];

const MASK_FILTER: &[ParamDef] = &[
    ParamDef::Int {
        name: "area_x",
        default: 3000,
        min: 0,
        max: 10_000_000,
    },
    ParamDef::Int {
        name: "area_y",
        default: 5000,
        min: 0,
        max: 10_000_000,
    },
    ParamDef::Choice {
        name: "keep",
        default: "above_x",
        options: &["above_x", "bellow_x", "between_x_y"],
    },
];

impl NodeKind {
    pub const ALL: &[NodeKind] = &[
        NodeKind::Brightness,
        NodeKind::Contrast,
        NodeKind::Saturation,
        NodeKind::Exposure,
        NodeKind::Temperature,
        NodeKind::HighlightShadow,
        NodeKind::DepthOfField,
        NodeKind::CameraDepthOfField,
        NodeKind::ImageResize,
        NodeKind::ImageRotation,
        NodeKind::ImageTranslation,
        NodeKind::ImageZoom,
        NodeKind::Dither,
        NodeKind::MaskProcessor,
        NodeKind::MaskFilter,
        NodeKind::MaskResize,
        NodeKind::MaskRotation,
        NodeKind::MaskTranslation,
        NodeKind::MaskZoom,
    ];

    /// Short code the control panel sends as `node_type`.
    pub fn code(self) -> &'static str {
        match self {
            NodeKind::Brightness => "bri",
            NodeKind::Contrast => "con",
            NodeKind::Saturation => "sat",
            NodeKind::Exposure => "exp",
            NodeKind::Temperature => "tmp",
            NodeKind::HighlightShadow => "hls",
            NodeKind::DepthOfField => "dof",
            NodeKind::CameraDepthOfField => "cdf",
            NodeKind::ImageResize => "rsz",
            NodeKind::ImageRotation => "rot",
            NodeKind::ImageTranslation => "trn",
            NodeKind::ImageZoom => "zom",
            NodeKind::Dither => "dit",
            NodeKind::MaskProcessor => "mpr",
            NodeKind::MaskFilter => "mfl",
            NodeKind::MaskResize => "mrs",
            NodeKind::MaskRotation => "mrt",
            NodeKind::MaskTranslation => "mtr",
            NodeKind::MaskZoom => "mzm",
        }
    }

    pub fn from_code(code: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.code() == code)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            NodeKind::Brightness => "Brightness",
            NodeKind::Contrast => "Contrast",
            NodeKind::Saturation => "Saturation",
            NodeKind::Exposure => "Exposure",
            NodeKind::Temperature => "Color Temperature",
            NodeKind::HighlightShadow => "Highlight / Shadow",
            NodeKind::DepthOfField => "Depth of Field (DOF)",
            NodeKind::CameraDepthOfField => "Camera Depth of Field",
            NodeKind::ImageResize => "Image Resize",
            NodeKind::ImageRotation => "Image Rotation",
            NodeKind::ImageTranslation => "Image Translation",
            NodeKind::ImageZoom => "Image Zoom",
            NodeKind::Dither => "Dither",
            NodeKind::MaskProcessor => "Mask Processor",
            NodeKind::MaskFilter => "Mask Filter",
            NodeKind::MaskResize => "Mask Resize",
            NodeKind::MaskRotation => "Mask Rotation",
            NodeKind::MaskTranslation => "Mask Translation",
            NodeKind::MaskZoom => "Mask Zoom",
        }
    }

    /// Editable inputs in store tuple order.
    pub fn params(self) -> &'static [ParamDef] {
        match self {
            NodeKind::Brightness => BRIGHTNESS,
            NodeKind::Contrast => CONTRAST,
            NodeKind::Saturation => SATURATION,
            NodeKind::Exposure => EXPOSURE,
            NodeKind::Temperature => TEMPERATURE,
            NodeKind::HighlightShadow => HIGHLIGHT_SHADOW,
            NodeKind::DepthOfField => DEPTH_OF_FIELD,
            NodeKind::CameraDepthOfField => CAMERA_DEPTH_OF_FIELD,
            NodeKind::ImageResize | NodeKind::MaskResize => RESIZE,
            NodeKind::ImageRotation | NodeKind::MaskRotation => ROTATION,
            NodeKind::ImageTranslation | NodeKind::MaskTranslation => TRANSLATION,
            NodeKind::ImageZoom | NodeKind::MaskZoom => ZOOM,
            NodeKind::Dither => DITHER,
            NodeKind::MaskProcessor => MASK_PROCESSOR,
            NodeKind::MaskFilter => MASK_FILTER,
        }
    }

    pub fn default_values(self) -> Vec<ParamValue> {
        self.params().iter().map(ParamDef::default_value).collect()
    }

    /// Mask nodes take and return single-channel frames.
    pub fn is_mask(self) -> bool {
        matches!(
            self,
            NodeKind::MaskProcessor
                | NodeKind::MaskFilter
                | NodeKind::MaskResize
                | NodeKind::MaskRotation
                | NodeKind::MaskTranslation
                | NodeKind::MaskZoom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_resolve() {
        let codes: HashSet<_> = NodeKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), NodeKind::ALL.len());
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_code(kind.code()), Some(*kind));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(NodeKind::from_code("nope"), None);
        assert_eq!(NodeKind::from_code("DOF"), None);
    }

    #[test]
    fn param_names_unique_per_kind() {
        for kind in NodeKind::ALL {
            let names: HashSet<_> = kind.params().iter().map(|d| d.name()).collect();
            assert_eq!(names.len(), kind.params().len(), "{kind:?}");
            assert!(!kind.params().is_empty());
        }
    }

    fn choice_options(kind: NodeKind, name: &str) -> &'static [&'static str] {
        kind.params()
            .iter()
            .find_map(|d| match d {
                ParamDef::Choice { name: n, options, .. } if *n == name => Some(*options),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn choice_tables_match_effect_enums() {
        use crate::effect::camera::BokehShape;
        use crate::effect::dither::DitherMethod;
        use crate::effect::geometry::{Background, Interpolation, ResizeFit, RotateFit};
        use crate::effect::mask::KeepRule;

        assert_eq!(choice_options(NodeKind::Dither, "dither_method"), DitherMethod::NAMES);
        assert_eq!(choice_options(NodeKind::ImageRotation, "fit_mode"), RotateFit::NAMES);
        assert_eq!(choice_options(NodeKind::ImageRotation, "bg_color"), Background::NAMES);
        assert_eq!(choice_options(NodeKind::ImageResize, "fit_mode"), ResizeFit::NAMES);
        assert_eq!(choice_options(NodeKind::ImageZoom, "interpolation"), Interpolation::NAMES);
        assert_eq!(choice_options(NodeKind::CameraDepthOfField, "bokeh_shape"), BokehShape::NAMES);
        assert_eq!(choice_options(NodeKind::MaskFilter, "keep"), KeepRule::NAMES);
    }

    #[test]
    fn choice_defaults_are_listed_options() {
        for kind in NodeKind::ALL {
            for def in kind.params() {
                if let ParamDef::Choice { name, default, options } = def {
                    assert!(options.contains(default), "{kind:?}.{name}");
                }
            }
        }
        assert_eq!(NodeKind::Dither.default_values()[0], ParamValue::from("none"));
    }

    #[test]
    fn mask_filter_is_a_mask_node() {
        assert!(NodeKind::MaskFilter.is_mask());
        assert!(!NodeKind::CameraDepthOfField.is_mask());
        assert_eq!(NodeKind::from_code("mfl"), Some(NodeKind::MaskFilter));
        assert_eq!(NodeKind::from_code("cdf"), Some(NodeKind::CameraDepthOfField));
    }

    #[test]
    fn mask_kinds_share_image_tables() {
        assert_eq!(NodeKind::MaskZoom.params(), NodeKind::ImageZoom.params());
        assert!(NodeKind::MaskZoom.is_mask());
        assert!(!NodeKind::ImageZoom.is_mask());
    }
}
