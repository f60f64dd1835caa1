mod common;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(not(target_arch = "wasm32"))]
pub mod shaders;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use common::{collect_draws, CameraParams, DrawItem, DrawMaterial, LightParams};
#[cfg(not(target_arch = "wasm32"))]
pub use native::Renderer;
#[cfg(target_arch = "wasm32")]
pub use wasm::Renderer;
