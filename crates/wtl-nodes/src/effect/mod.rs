//! Pure effect functions and the static node-type registry.
//!
//! An [`Effect`] maps one batch item to a new frame given its typed params.
//! Effects hold no state between calls; the interactive runner in
//! [`crate::node`] decides when and with which params they run.

pub mod camera;
pub mod color;
pub mod depth;
pub mod dither;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod registry;

use std::fmt;

use crate::params::ParamValue;

pub use self::frame::{Batch, Frame};
pub use self::registry::NodeKind;

/// Typed parameter tuple for one effect, convertible to and from the ordered
/// values kept in the parameter store.
pub trait EffectParams: Clone + fmt::Debug + Send {
    fn to_values(&self) -> Vec<ParamValue>;

    /// `None` when arity or any value type doesn't match.
    fn from_values(values: &[ParamValue]) -> Option<Self>;
}

/// A single-item image or mask transform.
pub trait Effect: Sync {
    type Params: EffectParams;

    fn kind(&self) -> NodeKind;

    /// Full-fidelity result. `item` is the batch index, for effects with
    /// per-item side inputs such as a depth map.
    fn apply(&self, item: usize, input: &Frame, params: &Self::Params) -> Frame;

    /// [`apply`](Self::apply) plus the one-channel masks the node outputs
    /// next to its image, in a fixed order. Most effects output none.
    fn apply_with_masks(&self, item: usize, input: &Frame, params: &Self::Params) -> (Frame, Vec<Frame>) {
        (self.apply(item, input, params), Vec::new())
    }

    /// Masks reported for an item that was passed through unchanged. Same
    /// count and order as [`apply_with_masks`](Self::apply_with_masks).
    fn skipped_masks(&self, _input: &Frame) -> Vec<Frame> {
        Vec::new()
    }

    /// What the control panel sees while tuning. Defaults to [`apply`](Self::apply).
    fn preview(&self, item: usize, input: &Frame, params: &Self::Params) -> Frame {
        self.apply(item, input, params)
    }

    /// Per-pixel effects look the same on a downscaled input, so their
    /// preview can be computed at preview resolution.
    fn scale_invariant(&self) -> bool {
        false
    }
}

/// One field of an [`EffectParams`] tuple.
pub trait ParamField: Sized {
    fn to_value(&self) -> ParamValue;
    fn from_value(value: &ParamValue) -> Option<Self>;
}

impl ParamField for f64 {
    fn to_value(&self) -> ParamValue {
        ParamValue::Float(*self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        value.as_f64()
    }
}

impl ParamField for i64 {
    fn to_value(&self) -> ParamValue {
        ParamValue::Int(*self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        value.as_i64()
    }
}

impl ParamField for bool {
    fn to_value(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        value.as_bool()
    }
}

/// Declares a params struct whose field order is the store tuple order.
macro_rules! effect_params {
    ($(#[$meta:meta])* pub struct $name:ident { $(pub $field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl $crate::effect::EffectParams for $name {
            fn to_values(&self) -> Vec<$crate::params::ParamValue> {
                vec![$($crate::effect::ParamField::to_value(&self.$field)),*]
            }

            fn from_values(values: &[$crate::params::ParamValue]) -> Option<Self> {
                let mut it = values.iter();
                let parsed = Self {
                    $($field: $crate::effect::ParamField::from_value(it.next()?)?),*
                };
                it.next().is_none().then_some(parsed)
            }
        }
    };
}

/// Declares a string-valued choice param (`"crop"`, `"bilinear"`, ...).
macro_rules! choice_param {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident => $text:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub const NAMES: &[&str] = &[$($text),*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl $crate::effect::ParamField for $name {
            fn to_value(&self) -> $crate::params::ParamValue {
                $crate::params::ParamValue::Str(self.as_str().to_string())
            }

            fn from_value(value: &$crate::params::ParamValue) -> Option<Self> {
                value.as_str().and_then($name::parse)
            }
        }
    };
}

pub(crate) use {choice_param, effect_params};
