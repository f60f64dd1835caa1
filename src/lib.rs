//! Hologram effect viewer.
//!
//! The crate loads a model into a small scene graph and can swap the
//! materials of every mesh under it for an animated hologram shader. The
//! effect is driven by [`controller::EffectController`]: it owns the
//! parameter store, one canonical material plus a clone per mesh, and the
//! animation clock feeding the shader's time uniform. Rendering and platform
//! glue (`wgpu` natively, a 2D canvas in the browser) sit on top and only
//! read the scene through [`render::collect_draws`].

pub mod animation;
pub mod app;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod input;
pub mod material;
pub mod model;
pub mod params;
pub mod render;
pub mod scene;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{Viewer, ViewportProvider, WindowViewport};
pub use config::ViewerConfig;
pub use controller::{EffectBinding, EffectController, EffectState, RenderTrigger, UpdateOutcome};
pub use error::{HologramError, Result};
pub use input::{KeyCode, NamedKey, Shortcut};
pub use material::{InstanceId, InstanceSet, MaterialInstance};
pub use model::ModelSource;
pub use params::{HologramParameters, ParameterName, ParameterUpdate, ParameterValue};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{NodeId, SceneGraph};
