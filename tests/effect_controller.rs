use std::sync::Arc;

use glam::Vec3;
use hologram_viewer::model::{default_model, torus_knot_model};
use hologram_viewer::params::{HologramParameters, ParameterName, ParameterUpdate, ParameterValue};
use hologram_viewer::scene::{MaterialSlot, NodeId, SceneGraph};
use hologram_viewer::{EffectController, EffectState, HologramError, UpdateOutcome};

fn bound_controller(scene: &mut SceneGraph) -> (EffectController, NodeId) {
    let model = default_model(scene);
    let mut controller = EffectController::new();
    controller.bind_target(Some(model)).unwrap();
    (controller, model)
}

fn materials(scene: &SceneGraph, root: NodeId) -> Vec<MaterialSlot> {
    scene
        .meshes_under(root)
        .into_iter()
        .map(|node| scene.material(node).unwrap().clone())
        .collect()
}

#[test]
fn parameters_after_updates_are_the_field_wise_merge() {
    let mut scene = SceneGraph::new();
    let (mut controller, _) = bound_controller(&mut scene);
    controller.enable(&mut scene, None).unwrap();

    let mut expected = HologramParameters::default();
    let updates = [
        ParameterUpdate::new().scalar(ParameterName::Opacity, 0.8),
        ParameterUpdate::new()
            .color(Vec3::new(0.2, 1.0, 0.4))
            .scalar(ParameterName::ScanlineCount, 64.0),
        ParameterUpdate::new().scalar(ParameterName::Opacity, 0.1),
    ];
    for update in &updates {
        expected.merge(update).unwrap();
        let outcome = controller.update_parameters(update, &mut || {}).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(controller.parameters(), expected);
    }
}

#[test]
fn disabling_restores_the_exact_original_materials() {
    let mut scene = SceneGraph::new();
    let (mut controller, model) = bound_controller(&mut scene);
    let before = materials(&scene, model);

    assert_eq!(controller.enable(&mut scene, None).unwrap(), 3);
    assert!(materials(&scene, model)
        .iter()
        .all(|slot| slot.hologram().is_some()));

    assert!(controller.disable(&mut scene));
    let after = materials(&scene, model);
    assert_eq!(after.len(), 3);
    for (original, restored) in before.iter().zip(&after) {
        match (original, restored) {
            (MaterialSlot::Standard(a), MaterialSlot::Standard(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("unexpected materials {other:?}"),
        }
    }
    assert_eq!(controller.state(), EffectState::Disabled);
    assert!(controller.binding().is_none());
}

#[test]
fn repeated_enable_does_not_leak_clones() {
    let mut scene = SceneGraph::new();
    let (mut controller, model) = bound_controller(&mut scene);
    controller.enable(&mut scene, None).unwrap();
    controller.enable(&mut scene, None).unwrap();

    let binding = controller.binding().unwrap();
    assert_eq!(binding.instance_count(), 3);
    let mut assigned: Vec<_> = materials(&scene, model)
        .iter()
        .map(|slot| slot.hologram().unwrap())
        .collect();
    assigned.sort();
    assigned.dedup();
    assert_eq!(assigned.len(), 3);
    assert!(assigned.iter().all(|id| controller.instance(*id).is_some()));
}

#[test]
fn time_uniform_is_the_sum_of_ticks() {
    let mut scene = SceneGraph::new();
    let (mut controller, _) = bound_controller(&mut scene);
    controller.enable(&mut scene, None).unwrap();

    controller.tick(0.0);
    let instances = controller.binding().unwrap().instances();
    assert!(instances.iter().all(|instance| instance.time() == 0.0));

    controller.tick(0.25);
    controller.tick(0.5);
    let instances = controller.binding().unwrap().instances();
    assert!(instances.iter().all(|instance| instance.time() == 0.75));
}

#[test]
fn clones_match_the_canonical_snapshot_at_apply_time() {
    let mut scene = SceneGraph::new();
    let model = torus_knot_model(&mut scene);
    let mut controller = EffectController::new();
    controller.bind_target(Some(model)).unwrap();
    let overrides = ParameterUpdate::new().scalar(ParameterName::RimPower, 4.0);
    assert_eq!(controller.enable(&mut scene, Some(&overrides)).unwrap(), 1);

    let instances = controller.binding().unwrap().instances();
    assert_eq!(instances.clone_count(), 1);
    let canonical = instances.canonical().snapshot();
    assert_eq!(canonical.rim_power, 4.0);
    assert!(instances
        .clones()
        .iter()
        .all(|clone| clone.snapshot() == canonical));
}

#[test]
fn update_while_disabled_is_signalled_and_ignored() {
    let mut scene = SceneGraph::new();
    let (mut controller, _) = bound_controller(&mut scene);
    let mut renders = 0;
    let update = ParameterUpdate::new().scalar(ParameterName::Opacity, 0.5);

    let outcome = controller
        .update_parameters(&update, &mut || renders += 1)
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::NotEnabled);
    assert_eq!(renders, 0);
    assert_eq!(controller.state(), EffectState::Disabled);
    assert_eq!(controller.parameters(), HologramParameters::default());
}

#[test]
fn out_of_range_opacity_is_rejected_everywhere() {
    let mut scene = SceneGraph::new();
    let (mut controller, _) = bound_controller(&mut scene);
    controller.enable(&mut scene, None).unwrap();

    let result = controller.set_parameter(ParameterName::Opacity, ParameterValue::Scalar(1.4));
    assert!(matches!(result, Err(HologramError::InvalidValue { .. })));
    assert_eq!(controller.parameters(), HologramParameters::default());
    let instances = controller.binding().unwrap().instances();
    assert!(instances
        .iter()
        .all(|instance| instance.parameter(ParameterName::Opacity) == ParameterValue::Scalar(0.22)));
}

#[test]
fn mixed_update_with_one_bad_entry_changes_nothing() {
    let mut scene = SceneGraph::new();
    let (mut controller, _) = bound_controller(&mut scene);
    controller.enable(&mut scene, None).unwrap();
    let mut renders = 0;

    let update = ParameterUpdate::new()
        .scalar(ParameterName::Opacity, 0.5)
        .scalar(ParameterName::RimPower, -1.0);
    let result = controller.update_parameters(&update, &mut || renders += 1);

    assert!(matches!(
        result,
        Err(HologramError::InvalidValue {
            name: ParameterName::RimPower,
            ..
        })
    ));
    assert_eq!(renders, 0);
    assert_eq!(controller.parameters(), HologramParameters::default());
    let instances = controller.binding().unwrap().instances();
    assert!(instances
        .iter()
        .all(|instance| instance.snapshot() == HologramParameters::default()));
}
