use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::controller::EffectController;
use crate::material::HologramUniforms;
use crate::params::rgb_from_hex;
use crate::scene::{Geometry, MaterialSlot, NodeId, NodeKind, SceneGraph, StandardMaterial};

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn from_config(camera: &CameraConfig, aspect: f32) -> Self {
        let view = Mat4::look_at_rh(camera.position, camera.target, Vec3::Y);
        let projection =
            Mat4::perspective_rh(camera.fov.to_radians(), aspect.max(0.01), 0.1, 1000.0);
        Self {
            view_proj: projection * view,
            position: camera.position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: Vec3,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::ONE,
            intensity: 1.0,
            ambient: rgb_from_hex(0x404040),
        }
    }
}

#[derive(Clone, Debug)]
pub enum DrawMaterial {
    Standard(Arc<StandardMaterial>),
    Hologram(HologramUniforms),
    Lines(Vec3),
}

impl DrawMaterial {
    /// Draw order bucket: lit meshes, then lines, then additive holograms.
    fn pass(&self) -> u8 {
        match self {
            Self::Standard(_) => 0,
            Self::Lines(_) => 1,
            Self::Hologram(_) => 2,
        }
    }
}

/// One visible node ready to be drawn.
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub node: NodeId,
    pub geometry: Arc<Geometry>,
    pub model: Mat4,
    pub material: DrawMaterial,
}

/// Walks the scene and resolves every visible mesh and line node to the
/// data a renderer needs.
pub fn collect_draws(scene: &SceneGraph, effect: &EffectController) -> Vec<DrawItem> {
    let mut draws: Vec<DrawItem> = scene
        .iter()
        .filter(|id| scene.is_visible(*id))
        .filter_map(|id| {
            let node = scene.node(id)?;
            let (geometry, material) = match &node.kind {
                NodeKind::Group => return None,
                NodeKind::Lines(lines) => (&lines.geometry, DrawMaterial::Lines(lines.color)),
                NodeKind::Mesh(mesh) => {
                    let material = match &mesh.material {
                        MaterialSlot::Standard(material) => {
                            DrawMaterial::Standard(Arc::clone(material))
                        }
                        MaterialSlot::Hologram(instance) => {
                            DrawMaterial::Hologram(effect.instance(*instance)?.gpu_uniforms())
                        }
                    };
                    (&mesh.geometry, material)
                }
            };
            Some(DrawItem {
                node: id,
                geometry: Arc::clone(geometry),
                model: scene.world_matrix(id),
                material,
            })
        })
        .collect();
    draws.sort_by_key(|draw| draw.material.pass());
    draws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_model, grid_helper};

    #[test]
    fn disabled_effect_draws_standard_materials() {
        let mut scene = SceneGraph::new();
        grid_helper(&mut scene, 10.0, 10);
        default_model(&mut scene);
        let draws = collect_draws(&scene, &EffectController::new());
        let meshes = draws
            .iter()
            .filter(|draw| matches!(draw.material, DrawMaterial::Standard(_)))
            .count();
        assert_eq!(meshes, 3);
        assert_eq!(draws.len(), 6);
    }

    #[test]
    fn hologram_meshes_draw_last_with_their_uniforms() {
        let mut scene = SceneGraph::new();
        let model = default_model(&mut scene);
        let mut effect = EffectController::new();
        effect.bind_target(Some(model)).unwrap();
        effect.enable(&mut scene, None).unwrap();
        let draws = collect_draws(&scene, &effect);
        assert!(matches!(draws[0].material, DrawMaterial::Lines(_)));
        let holograms: Vec<_> = draws
            .iter()
            .filter_map(|draw| match draw.material {
                DrawMaterial::Hologram(uniforms) => Some(uniforms),
                _ => None,
            })
            .collect();
        assert_eq!(holograms.len(), 3);
        assert!(holograms.iter().all(|uniforms| uniforms.color[3] == 0.22));
    }

    #[test]
    fn hidden_groups_are_skipped() {
        let mut scene = SceneGraph::new();
        let grid = grid_helper(&mut scene, 10.0, 10);
        scene.node_mut(grid).unwrap().visible = false;
        assert!(collect_draws(&scene, &EffectController::new()).is_empty());
    }

    #[test]
    fn camera_looks_at_target() {
        let camera = CameraParams::from_config(&CameraConfig::default(), 16.0 / 9.0);
        let clip = camera.view_proj * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
    }
}
