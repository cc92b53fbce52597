//! Process-level owner of the shared parameter store and the preview channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::effect::camera::CameraDepthOfField;
use crate::effect::color::{Brightness, Contrast, Exposure, HighlightShadow, Saturation, Temperature};
use crate::effect::depth::{DepthMaps, DepthOfField};
use crate::effect::dither::Dither;
use crate::effect::geometry::{Resize, Rotate, Translate, Zoom};
use crate::effect::mask::{MaskFilter, MaskProcess};
use crate::effect::{Effect, EffectParams, Frame, NodeKind};
use crate::node::{ApplyType, InteractiveNode, NodeOptions, NodeOutput};
use crate::params::{ParamValue, ParameterStore};
use crate::settings::ServerConfig;
use crate::web::PreviewChannel;

pub struct NodeHost {
    store: Arc<ParameterStore>,
    channel: PreviewChannel,
}

impl NodeHost {
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(ParameterStore::new());
        let channel = PreviewChannel::new(store.clone(), config);
        Self { store, channel }
    }

    /// Start the control server if enabled. `None` when disabled.
    pub fn start(&mut self) -> anyhow::Result<Option<SocketAddr>> {
        if !self.channel.config.enabled {
            log::info!("Control server disabled in config");
            return Ok(None);
        }
        self.channel.start().map(Some)
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn channel(&self) -> &PreviewChannel {
        &self.channel
    }

    /// Node options using the configured poll interval and preview budget.
    pub fn options(&self, apply_type: ApplyType, compare: bool) -> NodeOptions {
        NodeOptions {
            apply_type,
            poll_interval: self.channel.config.poll_interval(),
            preview_budget: self.channel.config.preview_pixel_budget,
            compare,
        }
    }

    /// Run one node of `kind` on `batch`. `values` are its static params in
    /// registry order; `depth` is only read by the depth-of-field kinds.
    /// Depth of field also outputs its blur mask, camera depth of field its
    /// blur, in-focus, out-of-focus and border masks.
    pub fn run_node(
        &self,
        kind: NodeKind,
        identity: Option<&str>,
        batch: &[Frame],
        values: &[ParamValue],
        options: NodeOptions,
        depth: &[Frame],
    ) -> anyhow::Result<NodeOutput> {
        let depth_maps = || DepthMaps::new(depth).with_context(|| format!("{} needs a depth map", kind.display_name()));
        match kind {
            NodeKind::Brightness => self.run_effect(&Brightness, identity, batch, values, options),
            NodeKind::Contrast => self.run_effect(&Contrast, identity, batch, values, options),
            NodeKind::Saturation => self.run_effect(&Saturation, identity, batch, values, options),
            NodeKind::Exposure => self.run_effect(&Exposure, identity, batch, values, options),
            NodeKind::Temperature => self.run_effect(&Temperature, identity, batch, values, options),
            NodeKind::HighlightShadow => self.run_effect(&HighlightShadow, identity, batch, values, options),
            NodeKind::DepthOfField => {
                let effect = DepthOfField::new(depth_maps()?);
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::CameraDepthOfField => {
                let effect = CameraDepthOfField::new(depth_maps()?);
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::ImageResize | NodeKind::MaskResize => {
                let effect = Resize { mask: kind.is_mask() };
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::ImageRotation | NodeKind::MaskRotation => {
                let effect = Rotate { mask: kind.is_mask() };
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::ImageTranslation | NodeKind::MaskTranslation => {
                let effect = Translate { mask: kind.is_mask() };
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::ImageZoom | NodeKind::MaskZoom => {
                let effect = Zoom { mask: kind.is_mask() };
                self.run_effect(&effect, identity, batch, values, options)
            }
            NodeKind::Dither => self.run_effect(&Dither, identity, batch, values, options),
            NodeKind::MaskProcessor => self.run_effect(&MaskProcess, identity, batch, values, options),
            NodeKind::MaskFilter => self.run_effect(&MaskFilter, identity, batch, values, options),
        }
    }

    fn run_effect<E: Effect>(
        &self,
        effect: &E,
        identity: Option<&str>,
        batch: &[Frame],
        values: &[ParamValue],
        options: NodeOptions,
    ) -> anyhow::Result<NodeOutput> {
        let kind = effect.kind();
        let params = match E::Params::from_values(values) {
            Some(p) => p,
            None => {
                log::warn!("{} static params {values:?} don't match, using defaults", kind.code());
                match E::Params::from_values(&kind.default_values()) {
                    Some(p) => p,
                    None => bail!("{} defaults don't decode", kind.code()),
                }
            }
        };
        let node = InteractiveNode::new(&self.store, &self.channel, effect, options);
        Ok(node.run_with_masks(identity, batch, &params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::params::ActionFlag;

    fn first_preview_red(message: &str) -> u8 {
        use base64::Engine;
        let msg: serde_json::Value = serde_json::from_str(message).unwrap();
        let b64 = msg["data"]["output"]["ram_preview"][0].as_str().unwrap();
        let png = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        image::load_from_memory(&png).unwrap().to_rgb8().get_pixel(0, 0).0[0]
    }

    fn host() -> NodeHost {
        NodeHost::new(ServerConfig {
            enabled: false,
            port: 0,
            ..ServerConfig::default()
        })
    }

    fn fast(host: &NodeHost, apply_type: ApplyType) -> NodeOptions {
        NodeOptions {
            poll_interval: Duration::from_millis(5),
            ..host.options(apply_type, false)
        }
    }

    #[test]
    fn every_kind_decodes_its_defaults() {
        let host = host();
        let batch = vec![Frame::filled(8, 8, 3, 0.5)];
        let depth = vec![Frame::filled(8, 8, 1, 0.5)];
        for &kind in NodeKind::ALL {
            let out = host
                .run_node(kind, None, &batch, &kind.default_values(), fast(&host, ApplyType::AutoApply), &depth)
                .unwrap();
            assert_eq!(out.images.len(), 1, "{kind:?}");
        }
    }

    #[test]
    fn disabled_host_does_not_bind() {
        let mut host = host();
        assert_eq!(host.start().unwrap(), None);
        assert!(!host.channel().is_running());
    }

    #[test]
    fn depth_kinds_require_depth() {
        let host = host();
        let batch = vec![Frame::filled(4, 4, 3, 0.5)];
        for kind in [NodeKind::DepthOfField, NodeKind::CameraDepthOfField] {
            let err = host
                .run_node(kind, None, &batch, &kind.default_values(), fast(&host, ApplyType::AutoApply), &[])
                .unwrap_err();
            assert!(err.to_string().contains("depth"), "{kind:?}");
        }
    }

    /// Left half at depth 0, right half at depth 1.
    fn split_depth() -> Vec<Frame> {
        vec![Frame::from_fn(8, 4, 1, |x, _, _| if x < 4 { 0.0 } else { 1.0 })]
    }

    fn near_focus() -> Vec<ParamValue> {
        let mut values = NodeKind::DepthOfField.default_values();
        values[0] = ParamValue::Float(0.0);
        values
    }

    #[test]
    fn depth_of_field_outputs_its_blur_mask() {
        let host = host();
        let batch = vec![Frame::filled(8, 4, 3, 0.5)];
        let out = host
            .run_node(
                NodeKind::DepthOfField,
                Some("d1"),
                &batch,
                &near_focus(),
                fast(&host, ApplyType::AutoApply),
                &split_depth(),
            )
            .unwrap();
        assert_eq!(out.masks.len(), 1);
        let mask = &out.masks[0][0];
        assert_eq!((mask.width, mask.height, mask.channels), (8, 4, 1));
        assert_eq!(mask.get(0, 0, 0), 0.0);
        assert_eq!(mask.get(7, 0, 0), 1.0);
    }

    #[test]
    fn skipped_depth_of_field_outputs_a_zero_mask() {
        let host = host();
        let store = host.store().clone();
        let done = Arc::new(AtomicBool::new(false));
        let presser = {
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    store.set_flag("d2", ActionFlag::Skip);
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };
        let batch = vec![Frame::filled(8, 4, 3, 0.5), Frame::filled(8, 4, 3, 0.25)];
        let out = host
            .run_node(
                NodeKind::DepthOfField,
                Some("d2"),
                &batch,
                &near_focus(),
                fast(&host, ApplyType::PerItem),
                &split_depth(),
            )
            .unwrap();
        done.store(true, Ordering::SeqCst);
        presser.join().unwrap();
        assert_eq!(out.images, batch);
        assert_eq!(out.masks, vec![vec![Frame::filled(8, 4, 1, 0.0); 2]]);
    }

    #[test]
    fn camera_depth_of_field_outputs_four_masks() {
        let host = host();
        let batch = vec![Frame::filled(8, 4, 3, 0.5)];
        let kind = NodeKind::CameraDepthOfField;
        let mut values = kind.default_values();
        values[0] = ParamValue::Float(0.0);
        let out = host
            .run_node(kind, None, &batch, &values, fast(&host, ApplyType::AutoApply), &split_depth())
            .unwrap();
        assert_eq!(out.masks.len(), 4);
        assert_eq!(out.masks[0][0].get(7, 0, 0), 1.0);
        assert_eq!(out.masks[1][0].get(0, 0, 0), 1.0);
        assert_eq!(out.masks[2][0].get(0, 0, 0), 0.0);
    }

    #[test]
    fn mask_filter_drops_small_regions() {
        let host = host();
        let mask = Frame::from_fn(8, 8, 1, |x, y, _| if x < 4 && y < 4 || (x, y) == (7, 7) { 1.0 } else { 0.0 });
        let values = vec![ParamValue::Int(2), ParamValue::Int(0), ParamValue::from("above_x")];
        let out = host
            .run_node(NodeKind::MaskFilter, None, &[mask], &values, fast(&host, ApplyType::AutoApply), &[])
            .unwrap();
        assert!(out.masks.is_empty());
        assert_eq!(out.images[0].get(1, 1, 0), 1.0);
        assert_eq!(out.images[0].get(7, 7, 0), 0.0);
    }

    #[test]
    fn mismatched_static_params_fall_back_to_defaults() {
        let host = host();
        let batch = vec![Frame::filled(2, 2, 3, 0.4)];
        let out = host
            .run_node(
                NodeKind::Brightness,
                None,
                &batch,
                &[ParamValue::Str("bright".into())],
                fast(&host, ApplyType::AutoApply),
                &[],
            )
            .unwrap();
        assert_eq!(out.images, batch);
    }

    #[test]
    fn interactive_node_applies_values_posted_after_first_preview() {
        let mut host = NodeHost::new(ServerConfig {
            port: 0,
            ..ServerConfig::default()
        });
        let addr = host.start().unwrap().unwrap();
        let store = host.store().clone();
        let writer = thread::spawn(move || {
            let (mut ws, _) = tungstenite::connect(format!("ws://{addr}/ws")).unwrap();
            let mut posted = false;
            loop {
                let tungstenite::Message::Text(text) = ws.read().unwrap() else {
                    continue;
                };
                // The first preview proves the node has cleared its entry;
                // a brightened one proves it has read the new params.
                if !posted {
                    store.set_params("b1", vec![ParamValue::Float(100.0)]);
                    posted = true;
                } else if first_preview_red(text.as_str()) == 128 {
                    store.set_flag("b1", ActionFlag::Apply);
                    break;
                }
            }
        });
        let batch = vec![Frame::filled(2, 2, 3, 0.25)];
        let out = host
            .run_node(
                NodeKind::Brightness,
                Some("b1"),
                &batch,
                &[ParamValue::Float(0.0)],
                fast(&host, ApplyType::PerItem),
                &[],
            )
            .unwrap();
        writer.join().unwrap();
        assert!(out.images[0].data.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }
}
