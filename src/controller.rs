//! Hologram effect lifecycle.
//!
//! [`EffectController`] is the single owner of the live [`EffectBinding`].
//! A binding is created on enable and dropped on disable; while it exists,
//! every mesh under the bound object carries one hologram clone and the
//! mesh's previous material is held by the binding for restoration.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::animation::AnimationDriver;
use crate::error::{HologramError, Result};
use crate::material::{InstanceId, InstanceSet, MaterialInstance};
use crate::params::{HologramParameters, ParameterName, ParameterValue, ParameterUpdate};
use crate::scene::{MaterialSlot, NodeId, SceneGraph};

/// Host hook for drawing a frame outside the regular frame schedule.
pub trait RenderTrigger {
    fn render_now(&mut self);
}

impl<F: FnMut()> RenderTrigger for F {
    fn render_now(&mut self) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Disabled,
    Enabled,
}

/// Result of a parameter update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum UpdateOutcome {
    Applied,
    /// The effect is off; nothing changed. Recoverable, the control surface
    /// may have raced a disable.
    NotEnabled,
}

/// Active association between one renderable object and its hologram
/// parameters and material instances.
#[derive(Debug)]
pub struct EffectBinding {
    target: NodeId,
    params: HologramParameters,
    instances: InstanceSet,
    driver: AnimationDriver,
    originals: HashMap<NodeId, MaterialSlot>,
}

impl EffectBinding {
    pub fn new(target: NodeId, params: HologramParameters) -> Self {
        Self {
            target,
            instances: InstanceSet::new(&params),
            params,
            driver: AnimationDriver::new(),
            originals: HashMap::new(),
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn parameters(&self) -> HologramParameters {
        self.params
    }

    pub fn instances(&self) -> &InstanceSet {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.clone_count()
    }

    pub fn elapsed(&self) -> f32 {
        self.driver.elapsed()
    }

    /// Original material saved for `node`, if the binding replaced it.
    pub fn original_material(&self, node: NodeId) -> Option<&MaterialSlot> {
        self.originals.get(&node)
    }

    /// Validates and applies one value, then fans it out to every clone.
    pub fn set_parameter(&mut self, name: ParameterName, value: ParameterValue) -> Result<()> {
        self.params.set(name, value)?;
        self.instances.propagate(name, value);
        Ok(())
    }

    /// Applies every entry of `update` or, on the first invalid entry, none.
    pub fn set_parameters(&mut self, update: &ParameterUpdate) -> Result<()> {
        self.params.merge(update)?;
        for (name, value) in update.iter() {
            self.instances.propagate(name, value);
        }
        Ok(())
    }

    pub fn tick(&mut self, delta: f32) {
        self.driver.tick(delta, &mut self.instances);
    }

    /// Assigns a fresh clone to every mesh under `object` and returns the
    /// affected nodes. Fails before touching anything if a mesh already
    /// carries a hologram material.
    pub fn apply_to(&mut self, scene: &mut SceneGraph, object: NodeId) -> Result<Vec<NodeId>> {
        if !scene.contains(object) {
            return Err(HologramError::MissingNode(object));
        }
        let meshes = scene.meshes_under(object);
        if let Some(taken) = meshes
            .iter()
            .copied()
            .find(|node| self.originals.contains_key(node) || is_hologram(scene, *node))
        {
            return Err(HologramError::AlreadyApplied(taken));
        }

        for node in &meshes {
            let clone = self.instances.spawn_clone();
            let original = scene.replace_material(*node, MaterialSlot::Hologram(clone))?;
            self.originals.insert(*node, original);
        }
        debug!(
            "applied hologram material to {} mesh(es) under {object}",
            meshes.len()
        );
        Ok(meshes)
    }

    /// Restores every saved material under `object` and drops all clones.
    /// Calling it with nothing applied is a no-op.
    pub fn remove_from(&mut self, scene: &mut SceneGraph, object: NodeId) -> usize {
        let mut restored = 0;
        for node in scene.descendants(object).collect::<Vec<_>>() {
            if let Some(original) = self.originals.remove(&node) {
                if scene.replace_material(node, original).is_ok() {
                    restored += 1;
                }
            }
        }
        self.instances.clear_clones();
        restored
    }
}

fn is_hologram(scene: &SceneGraph, node: NodeId) -> bool {
    scene
        .material(node)
        .and_then(MaterialSlot::hologram)
        .is_some()
}

/// Owns zero or one [`EffectBinding`] for the currently bound object.
#[derive(Debug, Default)]
pub struct EffectController {
    target: Option<NodeId>,
    binding: Option<EffectBinding>,
}

impl EffectController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EffectState {
        if self.binding.is_some() {
            EffectState::Enabled
        } else {
            EffectState::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == EffectState::Enabled
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn binding(&self) -> Option<&EffectBinding> {
        self.binding.as_ref()
    }

    /// Binds (or clears) the renderable object. Refused while enabled.
    pub fn bind_target(&mut self, target: Option<NodeId>) -> Result<()> {
        if self.is_enabled() {
            return Err(HologramError::RetargetWhileEnabled);
        }
        self.target = target;
        Ok(())
    }

    /// Current parameters: the live binding's, or the defaults when disabled.
    pub fn parameters(&self) -> HologramParameters {
        self.binding
            .as_ref()
            .map(EffectBinding::parameters)
            .unwrap_or_default()
    }

    /// Looks up a hologram instance assigned to a mesh.
    pub fn instance(&self, id: InstanceId) -> Option<&MaterialInstance> {
        self.binding.as_ref()?.instances.get(id)
    }

    /// Enables the effect on the bound object with defaults merged with
    /// `overrides`. An existing binding is torn down first. Returns the
    /// number of affected meshes.
    pub fn enable(
        &mut self,
        scene: &mut SceneGraph,
        overrides: Option<&ParameterUpdate>,
    ) -> Result<usize> {
        let target = self.target.ok_or(HologramError::NoTarget)?;
        let params = match overrides {
            Some(update) => HologramParameters::with_overrides(update)?,
            None => HologramParameters::default(),
        };
        if !scene.contains(target) {
            return Err(HologramError::MissingNode(target));
        }

        self.disable(scene);

        let mut binding = EffectBinding::new(target, params);
        match binding.apply_to(scene, target) {
            Ok(meshes) => {
                info!("hologram effect enabled on {} mesh(es)", meshes.len());
                self.binding = Some(binding);
                Ok(meshes.len())
            }
            Err(err) => {
                binding.remove_from(scene, target);
                Err(err)
            }
        }
    }

    /// Restores original materials and drops the binding. Returns whether
    /// the effect was enabled.
    pub fn disable(&mut self, scene: &mut SceneGraph) -> bool {
        let Some(mut binding) = self.binding.take() else {
            return false;
        };
        let restored = binding.remove_from(scene, binding.target);
        info!("hologram effect disabled, restored {restored} material(s)");
        true
    }

    /// Flips the effect and returns the resulting enabled state.
    pub fn toggle(
        &mut self,
        scene: &mut SceneGraph,
        overrides: Option<&ParameterUpdate>,
    ) -> Result<bool> {
        if self.target.is_none() {
            return Err(HologramError::NoTarget);
        }
        if self.is_enabled() {
            self.disable(scene);
        } else {
            self.enable(scene, overrides)?;
        }
        Ok(self.is_enabled())
    }

    /// Sets one parameter on the live binding.
    pub fn set_parameter(
        &mut self,
        name: ParameterName,
        value: ParameterValue,
    ) -> Result<UpdateOutcome> {
        self.update_with(|binding| binding.set_parameter(name, value))
    }

    /// Applies a partial update and requests an off-cycle render.
    pub fn update_parameters(
        &mut self,
        update: &ParameterUpdate,
        renderer: &mut dyn RenderTrigger,
    ) -> Result<UpdateOutcome> {
        let outcome = self.update_with(|binding| binding.set_parameters(update))?;
        if outcome == UpdateOutcome::Applied {
            renderer.render_now();
        }
        Ok(outcome)
    }

    fn update_with<F>(&mut self, apply: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&mut EffectBinding) -> Result<()>,
    {
        match self.binding.as_mut() {
            Some(binding) => {
                apply(binding)?;
                Ok(UpdateOutcome::Applied)
            }
            None => {
                warn!("hologram effect is not enabled; parameter update ignored");
                Ok(UpdateOutcome::NotEnabled)
            }
        }
    }

    /// Per-frame hook. Skipped entirely while disabled.
    pub fn tick(&mut self, delta: f32) {
        if let Some(binding) = self.binding.as_mut() {
            binding.tick(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::scene::{Geometry, StandardMaterial};

    fn scene_with_meshes(count: usize) -> (SceneGraph, NodeId) {
        let mut scene = SceneGraph::new();
        let root = scene.add_group("model", None);
        let geometry = Arc::new(Geometry::new("quad", vec![0.0; 18], vec![0, 1, 2]));
        for i in 0..count {
            scene.add_mesh(
                format!("mesh-{i}"),
                Some(root),
                Arc::clone(&geometry),
                Arc::new(StandardMaterial::default()),
            );
        }
        (scene, root)
    }

    fn enabled_controller(scene: &mut SceneGraph, root: NodeId) -> EffectController {
        let mut controller = EffectController::new();
        controller.bind_target(Some(root)).unwrap();
        controller.enable(scene, None).unwrap();
        controller
    }

    #[test]
    fn failed_enable_keeps_no_partial_binding() {
        let (mut scene, root) = scene_with_meshes(2);
        let owner = enabled_controller(&mut scene, root);
        let assigned: Vec<_> = scene
            .meshes_under(root)
            .into_iter()
            .map(|node| scene.material(node).and_then(MaterialSlot::hologram))
            .collect();

        let mut second = EffectController::new();
        second.bind_target(Some(root)).unwrap();
        assert!(matches!(
            second.enable(&mut scene, None),
            Err(HologramError::AlreadyApplied(_))
        ));
        assert_eq!(second.state(), EffectState::Disabled);
        assert!(second.binding().is_none());

        let after: Vec<_> = scene
            .meshes_under(root)
            .into_iter()
            .map(|node| scene.material(node).and_then(MaterialSlot::hologram))
            .collect();
        assert_eq!(assigned, after);
        assert!(owner.is_enabled());
    }

    #[test]
    fn enable_without_target_fails() {
        let (mut scene, _) = scene_with_meshes(1);
        let mut controller = EffectController::new();
        assert_eq!(controller.enable(&mut scene, None), Err(HologramError::NoTarget));
        assert_eq!(controller.toggle(&mut scene, None), Err(HologramError::NoTarget));
        assert_eq!(controller.state(), EffectState::Disabled);
    }

    #[test]
    fn apply_to_clones_once_per_mesh() {
        let (mut scene, root) = scene_with_meshes(4);
        let mut binding = EffectBinding::new(root, HologramParameters::default());
        let affected = binding.apply_to(&mut scene, root).unwrap();
        assert_eq!(affected.len(), 4);
        assert_eq!(binding.instance_count(), 4);
        for clone in binding.instances().clones() {
            assert_eq!(clone.snapshot(), binding.parameters());
        }
    }

    #[test]
    fn apply_twice_is_rejected_without_side_effects() {
        let (mut scene, root) = scene_with_meshes(2);
        let mut binding = EffectBinding::new(root, HologramParameters::default());
        binding.apply_to(&mut scene, root).unwrap();
        assert!(matches!(
            binding.apply_to(&mut scene, root),
            Err(HologramError::AlreadyApplied(_))
        ));
        assert_eq!(binding.instance_count(), 2);
    }

    #[test]
    fn remove_restores_identical_materials() {
        let (mut scene, root) = scene_with_meshes(3);
        let before: Vec<MaterialSlot> = scene
            .meshes_under(root)
            .iter()
            .map(|node| scene.material(*node).unwrap().clone())
            .collect();
        let mut binding = EffectBinding::new(root, HologramParameters::default());
        binding.apply_to(&mut scene, root).unwrap();
        assert_eq!(binding.remove_from(&mut scene, root), 3);
        for (node, original) in scene.meshes_under(root).iter().zip(&before) {
            assert!(scene.material(*node).unwrap().same_as(original));
        }
        assert_eq!(binding.instance_count(), 0);
        assert_eq!(binding.remove_from(&mut scene, root), 0);
    }

    #[test]
    fn enabling_twice_keeps_one_clone_per_mesh() {
        let (mut scene, root) = scene_with_meshes(3);
        let mut controller = enabled_controller(&mut scene, root);
        controller.enable(&mut scene, None).unwrap();
        let binding = controller.binding().unwrap();
        assert_eq!(binding.instance_count(), 3);
        for node in scene.meshes_under(root) {
            let id = scene.material(node).unwrap().hologram().unwrap();
            assert!(controller.instance(id).is_some());
        }
    }

    #[test]
    fn disable_is_idempotent() {
        let (mut scene, root) = scene_with_meshes(1);
        let mut controller = enabled_controller(&mut scene, root);
        assert!(controller.disable(&mut scene));
        assert!(!controller.disable(&mut scene));
        assert!(scene
            .meshes_under(root)
            .iter()
            .all(|node| scene.material(*node).unwrap().hologram().is_none()));
    }

    #[test]
    fn enable_merges_overrides_with_defaults() {
        let (mut scene, root) = scene_with_meshes(1);
        let mut controller = EffectController::new();
        controller.bind_target(Some(root)).unwrap();
        let overrides = ParameterUpdate::new().scalar(ParameterName::Opacity, 0.5);
        controller.enable(&mut scene, Some(&overrides)).unwrap();
        let params = controller.parameters();
        assert_eq!(params.opacity, 0.5);
        assert_eq!(params.rim_power, HologramParameters::default().rim_power);
    }

    #[test]
    fn invalid_overrides_leave_the_live_binding_alone() {
        let (mut scene, root) = scene_with_meshes(2);
        let mut controller = enabled_controller(&mut scene, root);
        let bad = ParameterUpdate::new().scalar(ParameterName::GlitchIntensity, -2.0);
        assert!(controller.enable(&mut scene, Some(&bad)).is_err());
        assert!(controller.is_enabled());
        assert_eq!(controller.binding().unwrap().instance_count(), 2);
    }

    #[test]
    fn enable_cleans_up_when_application_fails() {
        let (mut scene, root) = scene_with_meshes(2);
        let stray = scene.meshes_under(root)[1];
        let mut foreign = EffectBinding::new(root, HologramParameters::default());
        foreign.apply_to(&mut scene, stray).unwrap();

        let mut controller = EffectController::new();
        controller.bind_target(Some(root)).unwrap();
        assert_eq!(
            controller.enable(&mut scene, None),
            Err(HologramError::AlreadyApplied(stray))
        );
        assert!(!controller.is_enabled());
        let first = scene.meshes_under(root)[0];
        assert!(scene.material(first).unwrap().hologram().is_none());
    }

    #[test]
    fn toggle_reports_resulting_state() {
        let (mut scene, root) = scene_with_meshes(1);
        let mut controller = EffectController::new();
        controller.bind_target(Some(root)).unwrap();
        assert_eq!(controller.toggle(&mut scene, None), Ok(true));
        assert_eq!(controller.toggle(&mut scene, None), Ok(false));
    }

    #[test]
    fn update_while_disabled_signals_and_changes_nothing() {
        let mut controller = EffectController::new();
        let mut renders = 0;
        let update = ParameterUpdate::new().scalar(ParameterName::Opacity, 0.5);
        let outcome = controller
            .update_parameters(&update, &mut || renders += 1)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotEnabled);
        assert_eq!(renders, 0);
        assert_eq!(controller.parameters(), HologramParameters::default());
    }

    #[test]
    fn update_propagates_and_renders_off_cycle() {
        let (mut scene, root) = scene_with_meshes(2);
        let mut controller = enabled_controller(&mut scene, root);
        let mut renders = 0;
        let update = ParameterUpdate::new()
            .color(Vec3::new(1.0, 0.0, 0.0))
            .scalar(ParameterName::WireframeWidth, 0.5);
        let outcome = controller
            .update_parameters(&update, &mut || renders += 1)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(renders, 1);
        for instance in controller.binding().unwrap().instances().iter() {
            assert_eq!(
                instance.parameter(ParameterName::Color),
                ParameterValue::Color(Vec3::new(1.0, 0.0, 0.0))
            );
            assert_eq!(
                instance.parameter(ParameterName::WireframeWidth),
                ParameterValue::Scalar(0.5)
            );
        }
    }

    #[test]
    fn rejected_value_leaves_clones_untouched() {
        let (mut scene, root) = scene_with_meshes(2);
        let mut controller = enabled_controller(&mut scene, root);
        let err = controller
            .set_parameter(ParameterName::Opacity, ParameterValue::Scalar(1.4))
            .unwrap_err();
        assert!(matches!(err, HologramError::InvalidValue { .. }));
        assert_eq!(controller.parameters(), HologramParameters::default());
        for clone in controller.binding().unwrap().instances().clones() {
            assert_eq!(clone.parameter(ParameterName::Opacity), ParameterValue::Scalar(0.22));
        }
    }

    #[test]
    fn tick_only_runs_while_enabled_and_resets_per_binding() {
        let (mut scene, root) = scene_with_meshes(1);
        let mut controller = EffectController::new();
        controller.bind_target(Some(root)).unwrap();
        controller.tick(1.0);
        controller.enable(&mut scene, None).unwrap();
        controller.tick(0.5);
        controller.tick(0.25);
        assert_eq!(controller.binding().unwrap().elapsed(), 0.75);
        controller.disable(&mut scene);
        controller.enable(&mut scene, None).unwrap();
        assert_eq!(controller.binding().unwrap().elapsed(), 0.0);
    }

    #[test]
    fn retarget_requires_disable() {
        let (mut scene, root) = scene_with_meshes(1);
        let other = scene.add_group("other", None);
        let mut controller = enabled_controller(&mut scene, root);
        assert_eq!(
            controller.bind_target(Some(other)),
            Err(HologramError::RetargetWhileEnabled)
        );
        controller.disable(&mut scene);
        controller.bind_target(Some(other)).unwrap();
        assert_eq!(controller.target(), Some(other));
    }
}
