use std::time::Duration;

use crate::effect::{Effect, EffectParams, Frame};
use crate::params::{ActionFlag, ParamValue, ParameterStore};
use crate::preview::PreviewSink;

/// How a polling session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<P> {
    /// Run the full effect with these params, the ones current when apply
    /// was observed.
    Apply(P),
    /// Pass the input through unchanged.
    Skip,
}

/// One POLLING round for one identity and one input. Each [`tick`](Self::tick)
/// reads live params, pushes a preview and checks the action flags, in that
/// order.
pub struct PollSession<'a, E: Effect> {
    store: &'a ParameterStore,
    sink: &'a dyn PreviewSink,
    effect: &'a E,
    identity: &'a str,
    fallback: E::Params,
    defaults: Vec<ParamValue>,
    compare: bool,
    revision: u64,
    ticks: u64,
}

impl<'a, E: Effect> PollSession<'a, E> {
    pub fn new(
        store: &'a ParameterStore,
        sink: &'a dyn PreviewSink,
        effect: &'a E,
        identity: &'a str,
        defaults: &E::Params,
    ) -> Self {
        Self {
            store,
            sink,
            effect,
            identity,
            fallback: defaults.clone(),
            defaults: defaults.to_values(),
            compare: false,
            revision: 0,
            ticks: 0,
        }
    }

    /// Push the unmodified input next to each preview.
    pub fn compare(mut self, compare: bool) -> Self {
        self.compare = compare;
        self
    }

    /// Current params, or the node's static ones if the stored tuple doesn't
    /// decode.
    fn live_params(&self) -> E::Params {
        let values = self.store.get_params(self.identity, &self.defaults);
        E::Params::from_values(&values).unwrap_or_else(|| {
            log::warn!(
                "[{}] stored params {:?} don't fit {:?}, using node defaults",
                self.identity,
                values,
                self.effect.kind()
            );
            self.fallback.clone()
        })
    }

    /// One iteration. `input` is what the preview is computed on, possibly a
    /// downscaled copy of batch item `item`.
    pub fn tick(&mut self, item: usize, input: &Frame) -> Option<Decision<E::Params>> {
        // Captured before the read, so a write racing with this tick still
        // wakes the following wait.
        self.revision = self.store.revision(self.identity);
        self.ticks += 1;

        let params = self.live_params();
        let preview = self.effect.preview(item, input, &params);
        if self.compare {
            self.sink.push(self.identity, &[input.clone(), preview]);
        } else {
            self.sink.push(self.identity, &[preview]);
        }
        log::debug!("[{}] item {item} tick {} previewed {:?}", self.identity, self.ticks, params);

        if self.store.check_and_clear_flag(self.identity, ActionFlag::Apply) {
            log::info!("[{}] item {item}: apply {:?}", self.identity, params);
            return Some(Decision::Apply(params));
        }
        if self.store.check_and_clear_flag(self.identity, ActionFlag::Skip) {
            log::info!("[{}] item {item}: skip", self.identity);
            return Some(Decision::Skip);
        }
        None
    }

    /// Tick until a flag resolves the session, waiting up to `interval`
    /// between ticks. Returns early from a wait when the entry is written.
    pub fn resolve(&mut self, item: usize, input: &Frame, interval: Duration) -> Decision<E::Params> {
        loop {
            if let Some(decision) = self.tick(item, input) {
                return decision;
            }
            self.store.wait_for_update(self.identity, self.revision, interval);
        }
    }
}
