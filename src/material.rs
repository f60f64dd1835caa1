use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::params::{HologramParameters, ParameterName, ParameterValue};

/// Name of the animated time uniform.
pub const TIME_UNIFORM: &str = "uTime";

/// Value stored in a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Float(f32),
    Vec3(Vec3),
}

impl From<ParameterValue> for UniformValue {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Color(color) => Self::Vec3(color),
            ParameterValue::Scalar(scalar) => Self::Float(scalar),
        }
    }
}

impl From<UniformValue> for ParameterValue {
    fn from(value: UniformValue) -> Self {
        match value {
            UniformValue::Vec3(color) => Self::Color(color),
            UniformValue::Float(scalar) => Self::Scalar(scalar),
        }
    }
}

/// Generic named-uniform storage shared by shader materials.
///
/// Every write bumps `revision`, which tells the renderer that the GPU copy
/// of this material is stale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformBag {
    slots: Vec<(&'static str, UniformValue)>,
    revision: u64,
}

impl UniformBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: UniformValue) {
        match self.slots.iter_mut().find(|(slot, _)| *slot == name) {
            Some(slot) => slot.1 = value,
            None => self.slots.push((name, value)),
        }
        self.revision += 1;
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, value)| *value)
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(UniformValue::Float(value)) => value,
            _ => 0.0,
        }
    }

    pub fn vec3(&self, name: &str) -> Vec3 {
        match self.get(name) {
            Some(UniformValue::Vec3(value)) => value,
            _ => Vec3::ZERO,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    Normal,
    Additive,
}

/// Shader material capability: a uniform bag plus fixed render state.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderMaterial {
    pub uniforms: UniformBag,
    pub blend: BlendMode,
    pub double_sided: bool,
    pub depth_write: bool,
    pub transparent: bool,
}

impl ShaderMaterial {
    /// Render state used by the hologram pass.
    pub fn hologram() -> Self {
        Self {
            uniforms: UniformBag::new(),
            blend: BlendMode::Additive,
            double_sided: true,
            depth_write: false,
            transparent: true,
        }
    }
}

/// Handle identifying a [`MaterialInstance`] inside an [`InstanceSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Canonical,
    Clone,
}

/// One hologram material, mapping hologram parameters onto shader uniforms.
///
/// Reads are public; writes go through the owning [`InstanceSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInstance {
    id: InstanceId,
    role: InstanceRole,
    shader: ShaderMaterial,
}

impl MaterialInstance {
    fn from_parameters(id: InstanceId, role: InstanceRole, params: &HologramParameters) -> Self {
        let mut shader = ShaderMaterial::hologram();
        for name in ParameterName::ALL {
            shader
                .uniforms
                .set(name.uniform_name(), params.get(name).into());
        }
        shader.uniforms.set(TIME_UNIFORM, UniformValue::Float(0.0));
        Self { id, role, shader }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn role(&self) -> InstanceRole {
        self.role
    }

    pub fn shader(&self) -> &ShaderMaterial {
        &self.shader
    }

    pub fn revision(&self) -> u64 {
        self.shader.uniforms.revision()
    }

    pub fn time(&self) -> f32 {
        self.shader.uniforms.float(TIME_UNIFORM)
    }

    pub fn parameter(&self, name: ParameterName) -> ParameterValue {
        match self.shader.uniforms.get(name.uniform_name()) {
            Some(value) => value.into(),
            None => HologramParameters::default().get(name),
        }
    }

    /// Parameters reconstructed from the uniform snapshot.
    pub fn snapshot(&self) -> HologramParameters {
        let mut params = HologramParameters::default();
        for name in ParameterName::ALL {
            // Values in the bag were validated on the way in.
            let _ = params.set(name, self.parameter(name));
        }
        params
    }

    /// GPU layout of the current uniforms.
    pub fn gpu_uniforms(&self) -> HologramUniforms {
        let u = &self.shader.uniforms;
        let uniform = |name: ParameterName| u.float(name.uniform_name());
        HologramUniforms {
            color: u
                .vec3(ParameterName::Color.uniform_name())
                .extend(uniform(ParameterName::Opacity))
                .to_array(),
            rim: [
                uniform(ParameterName::RimPower),
                uniform(ParameterName::RimIntensity),
                uniform(ParameterName::WireframeWidth),
                uniform(ParameterName::WireframeDensity),
            ],
            effects: [
                uniform(ParameterName::ScanlineIntensity),
                uniform(ParameterName::ScanlineCount),
                uniform(ParameterName::GridIntensity),
                uniform(ParameterName::GlitchIntensity),
            ],
            time: [self.time(), 0.0, 0.0, 0.0],
        }
    }

    fn write_parameter(&mut self, name: ParameterName, value: ParameterValue) {
        self.shader.uniforms.set(name.uniform_name(), value.into());
    }

    fn write_time(&mut self, time: f32) {
        self.shader.uniforms.set(TIME_UNIFORM, UniformValue::Float(time));
    }
}

/// Hologram uniform block as consumed by the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct HologramUniforms {
    /// rgb + opacity
    pub color: [f32; 4],
    /// rim power, rim intensity, wireframe width, wireframe density
    pub rim: [f32; 4],
    /// scanline intensity, scanline count, grid intensity, glitch intensity
    pub effects: [f32; 4],
    pub time: [f32; 4],
}

/// The canonical instance plus the per-mesh clones that follow it.
#[derive(Debug, Clone)]
pub struct InstanceSet {
    canonical: MaterialInstance,
    clones: Vec<MaterialInstance>,
    next_id: u32,
}

impl InstanceSet {
    pub fn new(params: &HologramParameters) -> Self {
        Self {
            canonical: MaterialInstance::from_parameters(
                InstanceId(0),
                InstanceRole::Canonical,
                params,
            ),
            clones: Vec::new(),
            next_id: 1,
        }
    }

    pub fn canonical(&self) -> &MaterialInstance {
        &self.canonical
    }

    pub fn clones(&self) -> &[MaterialInstance] {
        &self.clones
    }

    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }

    /// Canonical instance followed by every clone.
    pub fn iter(&self) -> impl Iterator<Item = &MaterialInstance> {
        std::iter::once(&self.canonical).chain(self.clones.iter())
    }

    pub fn get(&self, id: InstanceId) -> Option<&MaterialInstance> {
        self.iter().find(|instance| instance.id == id)
    }

    /// Creates a clone from the canonical snapshot and returns its handle.
    pub(crate) fn spawn_clone(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let mut clone = self.canonical.clone();
        clone.id = id;
        clone.role = InstanceRole::Clone;
        self.clones.push(clone);
        id
    }

    /// Writes `value` into the canonical instance and every clone.
    pub(crate) fn propagate(&mut self, name: ParameterName, value: ParameterValue) {
        for instance in std::iter::once(&mut self.canonical).chain(self.clones.iter_mut()) {
            instance.write_parameter(name, value);
        }
        debug!("propagated {name}={value} to {} clone(s)", self.clones.len());
    }

    pub(crate) fn write_time(&mut self, time: f32) {
        for instance in std::iter::once(&mut self.canonical).chain(self.clones.iter_mut()) {
            instance.write_time(time);
        }
    }

    pub(crate) fn clear_clones(&mut self) {
        self.clones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_maps_parameters_to_uniforms() {
        let params = HologramParameters::default();
        let set = InstanceSet::new(&params);
        let canonical = set.canonical();
        assert_eq!(canonical.snapshot(), params);
        assert_eq!(canonical.time(), 0.0);
        assert_eq!(
            canonical.shader().uniforms.get("uOpacity"),
            Some(UniformValue::Float(0.22))
        );
        assert_eq!(canonical.shader().uniforms.len(), ParameterName::ALL.len() + 1);
    }

    #[test]
    fn hologram_render_state_is_additive_and_double_sided() {
        let set = InstanceSet::new(&HologramParameters::default());
        let shader = set.canonical().shader();
        assert_eq!(shader.blend, BlendMode::Additive);
        assert!(shader.double_sided);
        assert!(!shader.depth_write);
    }

    #[test]
    fn propagate_reaches_every_clone() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        let a = set.spawn_clone();
        let b = set.spawn_clone();
        assert_ne!(a, b);
        set.propagate(ParameterName::GridIntensity, ParameterValue::Scalar(1.5));
        for instance in set.iter() {
            assert_eq!(
                instance.parameter(ParameterName::GridIntensity),
                ParameterValue::Scalar(1.5)
            );
        }
    }

    #[test]
    fn clones_start_from_the_current_canonical_snapshot() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        set.propagate(ParameterName::Opacity, ParameterValue::Scalar(0.75));
        let id = set.spawn_clone();
        let clone = set.get(id).unwrap();
        assert_eq!(clone.role(), InstanceRole::Clone);
        assert_eq!(clone.snapshot(), set.canonical().snapshot());
    }

    #[test]
    fn writes_bump_the_revision() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        let before = set.canonical().revision();
        set.write_time(1.0);
        assert!(set.canonical().revision() > before);
        assert_eq!(set.canonical().gpu_uniforms().time[0], 1.0);
    }

    #[test]
    fn gpu_uniforms_pack_color_and_opacity() {
        let set = InstanceSet::new(&HologramParameters::default());
        let gpu = set.canonical().gpu_uniforms();
        assert_eq!(gpu.color[3], 0.22);
        assert_eq!(gpu.effects[1], 30.0);
        assert_eq!(std::mem::size_of::<HologramUniforms>(), 64);
    }
}
