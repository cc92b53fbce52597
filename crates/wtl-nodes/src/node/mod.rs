//! The interactive preview / apply / skip loop shared by every node.
//!
//! A run clears stale state for its identity, honours a pending skip, then
//! either applies straight away (auto-apply, or no identity to talk to) or
//! polls the [`ParameterStore`] until the control panel presses a button.
//! With [`ApplyType::PerItem`] each batch item gets its own round; with
//! [`ApplyType::ApplyAll`] one round decides the whole batch.

mod session;

pub use self::session::{Decision, PollSession};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::effect::{Batch, Effect, Frame};
use crate::params::{ActionFlag, ParameterStore};
use crate::preview::{PreviewSink, DEFAULT_PIXEL_BUDGET};

/// Poll interval when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Apply scope of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApplyType {
    /// Interactive, one decision per batch item.
    #[default]
    #[serde(rename = "none")]
    PerItem,
    /// No polling; static params are committed directly.
    #[serde(rename = "auto_apply")]
    AutoApply,
    /// Interactive, one decision for the whole batch.
    #[serde(rename = "apply_all")]
    ApplyAll,
}

impl ApplyType {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyType::PerItem => "none",
            ApplyType::AutoApply => "auto_apply",
            ApplyType::ApplyAll => "apply_all",
        }
    }
}

impl fmt::Display for ApplyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ApplyType::PerItem),
            "auto_apply" => Ok(ApplyType::AutoApply),
            "apply_all" => Ok(ApplyType::ApplyAll),
            other => Err(format!("unknown apply type '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub apply_type: ApplyType,
    /// Upper bound on the wait between ticks. Writes to the node's entry
    /// end the wait early.
    pub poll_interval: Duration,
    /// Scale-invariant effects preview on an input downscaled to this many
    /// pixels.
    pub preview_budget: u64,
    /// Push the input alongside each preview.
    pub compare: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            apply_type: ApplyType::PerItem,
            poll_interval: DEFAULT_POLL_INTERVAL,
            preview_budget: DEFAULT_PIXEL_BUDGET,
            compare: false,
        }
    }
}

/// What a run produced: the processed batch, and each extra mask output as
/// a batch aligned with `images`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub images: Batch,
    pub masks: Vec<Batch>,
}

impl FromIterator<(Frame, Vec<Frame>)> for NodeOutput {
    fn from_iter<I: IntoIterator<Item = (Frame, Vec<Frame>)>>(items: I) -> Self {
        let mut out = NodeOutput::default();
        for (image, masks) in items {
            if out.masks.len() < masks.len() {
                out.masks.resize_with(masks.len(), Batch::new);
            }
            for (slot, mask) in out.masks.iter_mut().zip(masks) {
                slot.push(mask);
            }
            out.images.push(image);
        }
        out
    }
}

/// Runs one effect interactively against a shared store and preview sink.
pub struct InteractiveNode<'a, E: Effect> {
    store: &'a ParameterStore,
    sink: &'a dyn PreviewSink,
    effect: &'a E,
    options: NodeOptions,
}

impl<'a, E: Effect> InteractiveNode<'a, E> {
    pub fn new(store: &'a ParameterStore, sink: &'a dyn PreviewSink, effect: &'a E, options: NodeOptions) -> Self {
        Self {
            store,
            sink,
            effect,
            options,
        }
    }

    /// Process `batch`. `params` are the node's statically configured values,
    /// used as live-param defaults and as the final params when nothing
    /// interactive happens. Blocks until every decision is made.
    pub fn run(&self, identity: Option<&str>, batch: &[Frame], params: &E::Params) -> Batch {
        self.run_with_masks(identity, batch, params).images
    }

    /// [`run`](Self::run), also collecting the masks the effect outputs. A
    /// skipped item reports the effect's skipped masks.
    pub fn run_with_masks(&self, identity: Option<&str>, batch: &[Frame], params: &E::Params) -> NodeOutput {
        let kind = self.effect.kind();
        let Some(identity) = identity else {
            log::debug!("{kind:?}: no identity, applying static params");
            return self.apply_all(batch, params);
        };

        self.store.clear_all(identity);
        if self.store.check_and_clear_flag(identity, ActionFlag::Skip) {
            log::info!("[{identity}] skip pending at start, passing input through");
            return self.skip_all(batch);
        }

        match self.options.apply_type {
            ApplyType::AutoApply => {
                log::debug!("[{identity}] auto-apply");
                self.apply_all(batch, params)
            }
            ApplyType::ApplyAll => {
                let Some(first) = batch.first() else {
                    return NodeOutput::default();
                };
                match self.session(identity, params).resolve(0, &self.preview_input(first), self.options.poll_interval) {
                    Decision::Apply(p) => self.apply_all(batch, &p),
                    Decision::Skip => self.skip_all(batch),
                }
            }
            ApplyType::PerItem => batch
                .iter()
                .enumerate()
                .map(|(item, frame)| {
                    let mut session = self.session(identity, params);
                    match session.resolve(item, &self.preview_input(frame), self.options.poll_interval) {
                        Decision::Apply(p) => self.effect.apply_with_masks(item, frame, &p),
                        Decision::Skip => (frame.clone(), self.effect.skipped_masks(frame)),
                    }
                })
                .collect(),
        }
    }

    fn session<'s>(&'s self, identity: &'s str, params: &E::Params) -> PollSession<'s, E> {
        PollSession::new(self.store, self.sink, self.effect, identity, params).compare(self.options.compare)
    }

    fn preview_input(&self, frame: &Frame) -> Frame {
        if self.effect.scale_invariant() {
            frame.fit_to_budget(self.options.preview_budget, FilterType::Lanczos3)
        } else {
            frame.clone()
        }
    }

    fn apply_all(&self, batch: &[Frame], params: &E::Params) -> NodeOutput {
        batch
            .iter()
            .enumerate()
            .map(|(item, frame)| self.effect.apply_with_masks(item, frame, params))
            .collect()
    }

    fn skip_all(&self, batch: &[Frame]) -> NodeOutput {
        batch
            .iter()
            .map(|frame| (frame.clone(), self.effect.skipped_masks(frame)))
            .collect()
    }
}
