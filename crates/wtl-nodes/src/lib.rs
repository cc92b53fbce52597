//! Interactive image and mask effect nodes.
//!
//! A node blocked in [`node::InteractiveNode::run`] pushes previews to a
//! browser over [`web::PreviewChannel`] and waits for the control panel to
//! post parameters and press apply or skip. Both sides meet in one shared
//! [`params::ParameterStore`], owned by [`host::NodeHost`].

pub mod effect;
pub mod error;
pub mod host;
pub mod node;
pub mod params;
pub mod preview;
pub mod settings;
pub mod web;
