//! Viewer lifecycle: owns the scene, the effect controller and the control
//! panel, and turns host events (frames, control input, shortcuts) into
//! operations on them.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use parking_lot::RwLock;

use crate::animation::FrameClock;
use crate::config::{CameraConfig, ViewerConfig};
use crate::control::{ControlPanel, NotificationKind};
use crate::controller::{EffectController, RenderTrigger, UpdateOutcome};
use crate::error::HologramError;
use crate::input::Shortcut;
use crate::model::{grid_helper, load_model, load_or_fallback, place_root, ModelSource};
use crate::params::{HologramParameters, ParameterUpdate};
use crate::render::{collect_draws, DrawItem};
use crate::scene::{NodeId, SceneGraph};

/// Smallest and largest accepted model scale.
pub const MODEL_SCALE_RANGE: (f32, f32) = (0.01, 10.0);

/// Size of the surface the viewer draws into.
pub trait ViewportProvider {
    fn viewport_size(&self) -> (u32, u32);

    fn aspect(&self) -> f32 {
        let (width, height) = self.viewport_size();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}

/// Viewport shared between the event loop and whoever needs the aspect.
#[derive(Debug)]
pub struct WindowViewport {
    size: RwLock<(u32, u32)>,
}

impl WindowViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width.max(1), height.max(1))),
        }
    }

    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }
}

impl ViewportProvider for WindowViewport {
    fn viewport_size(&self) -> (u32, u32) {
        *self.size.read()
    }
}

/// Latch set when the effect asks for a frame outside the regular schedule.
/// The host draws once without advancing animation time.
#[derive(Debug, Default)]
pub struct PendingRedraw {
    requested: bool,
}

impl PendingRedraw {
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }
}

impl RenderTrigger for PendingRedraw {
    fn render_now(&mut self) {
        self.requested = true;
    }
}

pub struct Viewer {
    config: ViewerConfig,
    scene: SceneGraph,
    model: NodeId,
    model_source: ModelSource,
    grid: NodeId,
    effect: EffectController,
    panel: ControlPanel,
    clock: FrameClock,
    redraw: PendingRedraw,
    now: f64,
}

impl Viewer {
    /// Builds the scene (grid and model), binds the model to the effect and
    /// enables it when the configuration asks for it.
    pub fn new(config: ViewerConfig) -> Result<Self> {
        let mut scene = SceneGraph::new();
        let grid = grid_helper(&mut scene, config.grid.size, config.grid.divisions);
        if let Some(node) = scene.node_mut(grid) {
            node.visible = config.grid.visible;
        }
        let model = load_or_fallback(&mut scene, &config.model.source, config.model.options);

        let mut effect = EffectController::new();
        effect.bind_target(Some(model))?;
        if config.hologram.enabled {
            effect
                .enable(&mut scene, Some(&config.hologram.overrides))
                .context("failed to enable the hologram effect")?;
        }

        info!("viewer ready with {} scene node(s)", scene.len());
        Ok(Self {
            model_source: config.model.source.clone(),
            config,
            scene,
            model,
            grid,
            effect,
            panel: ControlPanel::new(),
            clock: FrameClock::new(),
            redraw: PendingRedraw::default(),
            now: 0.0,
        })
    }

    /// Restores every original material and releases the scene.
    pub fn dispose(mut self) {
        self.effect.disable(&mut self.scene);
        let released = self.scene.len();
        info!("viewer disposed, released {released} scene node(s)");
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn effect(&self) -> &EffectController {
        &self.effect
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.config.camera
    }

    pub fn model(&self) -> NodeId {
        self.model
    }

    pub fn model_source(&self) -> &ModelSource {
        &self.model_source
    }

    pub fn parameters(&self) -> HologramParameters {
        self.effect.parameters()
    }

    pub fn draws(&self) -> Vec<DrawItem> {
        collect_draws(&self.scene, &self.effect)
    }

    /// Swaps the displayed model. When the effect was on it is disabled on the
    /// old model first and re-enabled on the new one with the same parameters.
    /// A source that fails to load is replaced by the placeholder group.
    pub fn replace_model(&mut self, source: &ModelSource) -> Result<NodeId> {
        let root = load_or_fallback(&mut self.scene, source, self.config.model.options);
        self.install_model(root, source.clone())
    }

    /// Imports a glTF/GLB document picked by the user. Unlike
    /// [`Viewer::replace_model`] a broken file keeps the current model.
    pub fn import_model(&mut self, name: &str, data: Vec<u8>) -> Result<NodeId> {
        let source = ModelSource::from_bytes(name, data);
        match load_model(&mut self.scene, &source, self.config.model.options) {
            Ok(root) => {
                self.install_model(root, source)?;
                self.panel
                    .notify(NotificationKind::Success, format!("Loaded model {name}"), self.now);
                Ok(root)
            }
            Err(err) => {
                warn!("model import failed: {err:#}");
                self.panel.notify(
                    NotificationKind::Error,
                    format!("Model import failed: {err}"),
                    self.now,
                );
                Err(err)
            }
        }
    }

    fn install_model(&mut self, root: NodeId, source: ModelSource) -> Result<NodeId> {
        let previous = self
            .effect
            .is_enabled()
            .then(|| self.effect.parameters());
        self.effect.disable(&mut self.scene);
        self.effect.bind_target(None)?;
        self.scene.remove_subtree(self.model);

        self.model = root;
        self.model_source = source;
        self.effect.bind_target(Some(root))?;
        if let Some(params) = previous {
            let overrides = ParameterUpdate::from(&params);
            self.effect
                .enable(&mut self.scene, Some(&overrides))
                .context("failed to re-apply the hologram effect")?;
        }
        self.redraw.render_now();
        Ok(root)
    }

    pub fn model_scale(&self) -> f32 {
        self.config.model.options.scale
    }

    /// Uniform scale of the model root, clamped to the slider range. Later
    /// imports keep the same scale.
    pub fn set_model_scale(&mut self, scale: f32) -> Result<f32> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(anyhow!("model scale must be a positive number, got {scale}"));
        }
        let scale = scale.clamp(MODEL_SCALE_RANGE.0, MODEL_SCALE_RANGE.1);
        self.config.model.options.scale = scale;
        place_root(&mut self.scene, self.model, self.config.model.options);
        self.redraw.render_now();
        Ok(scale)
    }

    pub fn toggle_effect(&mut self) -> Result<bool, HologramError> {
        let result = self
            .effect
            .toggle(&mut self.scene, Some(&self.config.hologram.overrides));
        match &result {
            Ok(true) => self.panel.notify(NotificationKind::Success, "Hologram effect on", self.now),
            Ok(false) => self.panel.notify(NotificationKind::Info, "Hologram effect off", self.now),
            Err(err) => self.panel.notify(NotificationKind::Error, err.to_string(), self.now),
        }
        self.redraw.render_now();
        result
    }

    /// Applies a partial update and, when applied, latches an off-cycle redraw.
    pub fn update_parameters(&mut self, update: &ParameterUpdate) -> Result<UpdateOutcome, HologramError> {
        let result = self.effect.update_parameters(update, &mut self.redraw);
        self.panel.report(&result, None, self.now);
        result
    }

    /// A control moved; the value is applied after the debounce delay.
    pub fn control_input(&mut self, name: &str, raw: &str) {
        if let Err(err) = self.panel.input(name, raw, self.now) {
            warn!("rejected control value {name}={raw}: {err}");
            self.panel.notify(NotificationKind::Error, err.to_string(), self.now);
        }
    }

    /// A control was released; the value is applied immediately.
    pub fn control_commit(&mut self, name: &str, raw: &str) -> Result<UpdateOutcome, HologramError> {
        let update = match self.panel.commit(name, raw) {
            Ok(update) => update,
            Err(err) => {
                self.panel.notify(NotificationKind::Error, err.to_string(), self.now);
                return Err(err);
            }
        };
        self.update_parameters(&update)
    }

    pub fn reset_parameters(&mut self) {
        if let Some(defaults) = self.panel.reset(self.effect.is_enabled(), self.now) {
            let result = self.effect.update_parameters(&defaults, &mut self.redraw);
            self.panel
                .report(&result, Some("Hologram parameters reset to defaults"), self.now);
        }
    }

    pub fn inspect(&mut self) {
        let params = self.effect.is_enabled().then(|| self.effect.parameters());
        self.panel.inspect(params.as_ref(), self.now);
    }

    pub fn toggle_grid(&mut self) -> bool {
        let visible = match self.scene.node_mut(self.grid) {
            Some(node) => {
                node.visible = !node.visible;
                node.visible
            }
            None => false,
        };
        self.redraw.render_now();
        visible
    }

    pub fn toggle_panel(&mut self) -> bool {
        self.panel.toggle_visible()
    }

    /// Hides the current notification before it expires.
    pub fn dismiss_notification(&mut self) {
        if self.panel.notification().is_some() {
            self.panel.dismiss();
            self.redraw.render_now();
        }
    }

    /// Runs a keyboard shortcut. `Quit` is left to the host.
    pub fn handle_shortcut(&mut self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::ToggleEffect => {
                let _ = self.toggle_effect();
            }
            Shortcut::TogglePanel => {
                self.toggle_panel();
            }
            Shortcut::ResetParameters => self.reset_parameters(),
            Shortcut::ToggleGrid => {
                self.toggle_grid();
            }
            Shortcut::NextSlider => {
                let slider = self.panel.select_next();
                self.panel
                    .notify(NotificationKind::Info, slider.label, self.now);
            }
            Shortcut::StepUp | Shortcut::StepDown => {
                let steps = if shortcut == Shortcut::StepUp { 1 } else { -1 };
                let update = self.panel.step_selected(&self.effect.parameters(), steps);
                let _ = self.update_parameters(&update);
            }
            Shortcut::Inspect => self.inspect(),
            Shortcut::Dismiss => self.dismiss_notification(),
            Shortcut::Quit => {}
        }
    }

    /// Regular frame: applies debounced control values, then advances the
    /// animation by the time since the previous frame. Returns the delta.
    pub fn advance_frame(&mut self, now: f64) -> f32 {
        self.now = now;
        let ready = self.panel.poll(now);
        if !ready.is_empty() {
            let _ = self.update_parameters(&ready);
        }
        let delta = self.clock.delta(now);
        self.effect.tick(delta);
        self.redraw.take();
        delta
    }

    /// Whether an off-cycle frame was requested since the last regular one.
    pub fn take_redraw_request(&mut self) -> bool {
        self.redraw.take()
    }

    /// Text for the on-screen panel: slider values while the panel is shown,
    /// then the current notification.
    pub fn overlay_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.panel.is_visible() {
            let params = self.effect.parameters();
            let selected = self.panel.selected().name;
            let state = if self.effect.is_enabled() { "on" } else { "off" };
            lines.push(format!("Hologram [{state}]  E toggle  R reset  H hide"));
            for slider in self.panel.sliders() {
                let marker = if slider.name == selected { '>' } else { ' ' };
                lines.push(format!(
                    "{marker} {}: {}",
                    slider.label,
                    params.get(slider.name)
                ));
            }
        }
        if let Some(notification) = self.panel.notification() {
            lines.extend(notification.text.lines().map(str::to_string));
        }
        lines
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Model: {} ({} mesh(es))",
            self.model_source,
            self.scene.meshes_under(self.model).len()
        )];
        match self.effect.binding() {
            Some(binding) => {
                lines.push(format!(
                    "Hologram effect: enabled on {} mesh(es)",
                    binding.instance_count()
                ));
                lines.push(format!("Elapsed: {:.2}s", binding.elapsed()));
            }
            None => lines.push("Hologram effect: disabled".to_string()),
        }
        lines.push("Parameters:".to_string());
        lines.extend(
            self.effect
                .parameters()
                .describe()
                .lines()
                .map(|line| format!(" - {line}")),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::params::{ParameterName, ParameterValue};

    fn enabled_config() -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.hologram.enabled = true;
        config
    }

    #[test]
    fn new_viewer_applies_configured_effect() {
        let viewer = Viewer::new(enabled_config()).unwrap();
        let binding = viewer.effect().binding().unwrap();
        assert_eq!(binding.instance_count(), 3);
        assert_eq!(binding.target(), viewer.model());
    }

    #[test]
    fn frames_advance_time_but_off_cycle_redraws_do_not() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        assert_eq!(viewer.advance_frame(10.0), 0.0);
        assert_eq!(viewer.advance_frame(10.5), 0.5);

        let update = ParameterUpdate::new().scalar(ParameterName::Opacity, 0.5);
        assert_eq!(viewer.update_parameters(&update), Ok(UpdateOutcome::Applied));
        assert!(viewer.take_redraw_request());
        assert!(!viewer.take_redraw_request());
        assert_eq!(viewer.effect().binding().unwrap().elapsed(), 0.5);
    }

    #[test]
    fn replace_model_reapplies_the_effect_with_same_parameters() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        let update = ParameterUpdate::new().color(Vec3::new(1.0, 0.0, 0.0));
        viewer.update_parameters(&update).unwrap();
        let old = viewer.model();

        let new = viewer.replace_model(&ModelSource::TorusKnot).unwrap();
        assert_ne!(old, new);
        assert!(!viewer.scene().contains(old));
        let binding = viewer.effect().binding().unwrap();
        assert_eq!(binding.target(), new);
        assert_eq!(binding.instance_count(), 1);
        assert_eq!(
            viewer.parameters().get(ParameterName::Color),
            ParameterValue::Color(Vec3::new(1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn imported_model_takes_over_the_effect() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        let old = viewer.model();
        viewer.take_redraw_request();

        let data = crate::model::TRIANGLE_GLTF.as_bytes().to_vec();
        let root = viewer.import_model("triangle.gltf", data).unwrap();
        assert!(!viewer.scene().contains(old));
        assert_eq!(viewer.effect().binding().unwrap().target(), root);
        assert_eq!(viewer.effect().binding().unwrap().instance_count(), 1);
        assert_eq!(viewer.model_source().to_string(), "triangle.gltf");
        assert_eq!(viewer.panel().notification().unwrap().kind, NotificationKind::Success);
        assert!(viewer.take_redraw_request());
    }

    #[test]
    fn broken_import_keeps_the_current_model() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        let old = viewer.model();
        assert!(viewer.import_model("broken.glb", b"not a model".to_vec()).is_err());
        assert_eq!(viewer.model(), old);
        assert_eq!(viewer.effect().binding().unwrap().instance_count(), 3);
        assert_eq!(viewer.panel().notification().unwrap().kind, NotificationKind::Error);
    }

    #[test]
    fn model_scale_is_clamped_and_kept_for_imports() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        assert_eq!(viewer.set_model_scale(2.5).unwrap(), 2.5);
        let scale = viewer.scene().node(viewer.model()).unwrap().transform.scale;
        assert_eq!(scale, Vec3::splat(2.5));
        assert!(viewer.take_redraw_request());

        assert_eq!(viewer.set_model_scale(50.0).unwrap(), 10.0);
        assert!(viewer.set_model_scale(0.0).is_err());
        assert!(viewer.set_model_scale(f32::NAN).is_err());
        assert_eq!(viewer.model_scale(), 10.0);

        let root = viewer.replace_model(&ModelSource::TorusKnot).unwrap();
        let scale = viewer.scene().node(root).unwrap().transform.scale;
        assert_eq!(scale, Vec3::splat(10.0));
    }

    #[test]
    fn host_operations_request_an_immediate_frame() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        viewer.toggle_effect().unwrap();
        assert!(viewer.take_redraw_request());

        viewer.control_commit("opacity", "0.5").unwrap();
        assert!(viewer.take_redraw_request());

        viewer.reset_parameters();
        assert!(viewer.take_redraw_request());

        viewer.dismiss_notification();
        assert!(viewer.take_redraw_request());
        assert!(viewer.panel().notification().is_none());
        viewer.dismiss_notification();
        assert!(!viewer.take_redraw_request());
    }

    #[test]
    fn regular_frame_consumes_a_pending_redraw() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        viewer.control_commit("opacity", "0.5").unwrap();
        viewer.advance_frame(1.0);
        assert!(!viewer.take_redraw_request());
    }

    #[test]
    fn dismiss_shortcut_clears_the_notification() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        viewer.handle_shortcut(Shortcut::Inspect);
        assert!(viewer.panel().notification().is_some());
        viewer.handle_shortcut(Shortcut::Dismiss);
        assert!(viewer.panel().notification().is_none());
    }

    #[test]
    fn replace_model_keeps_a_disabled_effect_disabled() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        viewer.replace_model(&ModelSource::TorusKnot).unwrap();
        assert!(!viewer.effect().is_enabled());
        assert_eq!(viewer.effect().target(), Some(viewer.model()));
    }

    #[test]
    fn debounced_input_applies_on_a_later_frame() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        viewer.advance_frame(1.0);
        viewer.control_input("glitchIntensity", "0.5");
        viewer.advance_frame(1.01);
        assert_eq!(viewer.parameters().glitch_intensity, 0.03);
        viewer.advance_frame(1.1);
        assert_eq!(viewer.parameters().glitch_intensity, 0.5);
    }

    #[test]
    fn invalid_commit_surfaces_a_notification() {
        let mut viewer = Viewer::new(enabled_config()).unwrap();
        assert!(viewer.control_commit("opacity", "1.4").is_err());
        let notification = viewer.panel().notification().unwrap();
        assert_eq!(notification.kind, NotificationKind::Error);
        assert_eq!(viewer.parameters().opacity, 0.22);
    }

    #[test]
    fn shortcuts_drive_the_viewer() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        viewer.handle_shortcut(Shortcut::ToggleEffect);
        assert!(viewer.effect().is_enabled());
        viewer.handle_shortcut(Shortcut::StepUp);
        assert_eq!(viewer.parameters().opacity, 0.23);
        viewer.handle_shortcut(Shortcut::ResetParameters);
        assert_eq!(viewer.parameters(), HologramParameters::default());
        assert!(!viewer.toggle_grid());
        viewer.handle_shortcut(Shortcut::ToggleEffect);
        assert!(!viewer.effect().is_enabled());
    }

    #[test]
    fn summary_lists_state() {
        let viewer = Viewer::new(enabled_config()).unwrap();
        let summary = viewer.summary();
        assert!(summary.contains("Model: default (3 mesh(es))"));
        assert!(summary.contains("Hologram effect: enabled on 3 mesh(es)"));
        assert!(summary.contains(" - opacity: 0.22"));
    }

    #[test]
    fn overlay_shows_sliders_and_notification() {
        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        let lines = viewer.overlay_lines();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("[off]"));
        assert!(lines[1].starts_with('>'));

        viewer.toggle_panel();
        viewer.toggle_effect().unwrap();
        assert_eq!(viewer.overlay_lines(), vec!["Hologram effect on".to_string()]);
    }

    #[test]
    fn viewport_reports_aspect() {
        let viewport = WindowViewport::new(1280, 720);
        viewport.update(800, 0);
        assert_eq!(viewport.viewport_size(), (800, 1));
        assert_eq!(viewport.aspect(), 800.0);
    }
}
