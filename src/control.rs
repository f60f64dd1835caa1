//! Control-surface state: slider ranges, per-control debouncing and the
//! transient notification line. Nothing here touches the effect directly;
//! the viewer applies the updates this module produces.

use log::debug;

use crate::controller::UpdateOutcome;
use crate::error::Result;
use crate::params::{HologramParameters, ParameterName, ParameterUpdate, ParameterValue};

/// Seconds a slider must stay still before its value is applied.
pub const DEBOUNCE_SECONDS: f64 = 0.05;
/// Default lifetime of a notification.
pub const NOTIFICATION_SECONDS: f64 = 3.0;
/// Lifetime of the parameter listing shown by [`ControlPanel::inspect`].
pub const INSPECT_SECONDS: f64 = 5.0;

/// Range and granularity of one slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderSpec {
    pub name: ParameterName,
    pub label: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl SliderSpec {
    /// Clamps `value` into the slider range and snaps it to the step grid.
    pub fn snap(&self, value: f32) -> f32 {
        let steps = ((value - self.min) / self.step).round();
        let snapped = self.min + steps * self.step;
        // Keep the decimal precision of the step so 0.1 + 0.2 stays 0.3.
        let scale = 1.0 / self.step.min(1.0);
        ((snapped * scale).round() / scale).clamp(self.min, self.max)
    }

    pub fn nudge(&self, value: f32, steps: i32) -> f32 {
        self.snap(value + steps as f32 * self.step)
    }
}

pub const SLIDERS: [SliderSpec; 6] = [
    SliderSpec {
        name: ParameterName::Opacity,
        label: "Opacity",
        min: 0.0,
        max: 1.0,
        step: 0.01,
    },
    SliderSpec {
        name: ParameterName::RimIntensity,
        label: "Rim intensity",
        min: 0.0,
        max: 5.0,
        step: 0.1,
    },
    SliderSpec {
        name: ParameterName::WireframeWidth,
        label: "Wireframe width",
        min: 0.0,
        max: 2.0,
        step: 0.01,
    },
    SliderSpec {
        name: ParameterName::WireframeDensity,
        label: "Wireframe density",
        min: 1.0,
        max: 20.0,
        step: 0.5,
    },
    SliderSpec {
        name: ParameterName::GridIntensity,
        label: "Grid intensity",
        min: 0.0,
        max: 2.0,
        step: 0.01,
    },
    SliderSpec {
        name: ParameterName::GlitchIntensity,
        label: "Glitch intensity",
        min: 0.0,
        max: 2.0,
        step: 0.01,
    },
];

/// Trailing-edge debounce keyed by control.
///
/// Every new value for a control restarts that control's timer; controls do
/// not delay each other.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: f64,
    pending: Vec<(ParameterName, ParameterValue, f64)>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_SECONDS)
    }
}

impl Debouncer {
    pub fn new(delay: f64) -> Self {
        Self {
            delay,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, name: ParameterName, value: ParameterValue, now: f64) {
        let deadline = now + self.delay;
        match self.pending.iter_mut().find(|(pending, ..)| *pending == name) {
            Some(entry) => {
                entry.1 = value;
                entry.2 = deadline;
            }
            None => self.pending.push((name, value, deadline)),
        }
    }

    /// Removes and returns every value whose timer ran out.
    pub fn due(&mut self, now: f64) -> ParameterUpdate {
        let mut update = ParameterUpdate::new();
        self.pending.retain(|(name, value, deadline)| {
            if *deadline <= now {
                update.insert(*name, *value);
                false
            } else {
                true
            }
        });
        update
    }

    /// Drops a pending value without applying it.
    pub fn cancel(&mut self, name: ParameterName) -> Option<ParameterValue> {
        let index = self.pending.iter().position(|(pending, ..)| *pending == name)?;
        Some(self.pending.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
    pub expires_at: f64,
}

#[derive(Debug, Clone)]
pub struct ControlPanel {
    visible: bool,
    selected: usize,
    debouncer: Debouncer,
    notification: Option<Notification>,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self {
            visible: true,
            selected: 0,
            debouncer: Debouncer::default(),
            notification: None,
        }
    }
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle_visible(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn sliders(&self) -> &'static [SliderSpec] {
        &SLIDERS
    }

    pub fn selected(&self) -> &'static SliderSpec {
        &SLIDERS[self.selected % SLIDERS.len()]
    }

    pub fn select_next(&mut self) -> &'static SliderSpec {
        self.selected = (self.selected + 1) % SLIDERS.len();
        self.selected()
    }

    /// A control moved. The value is parsed now and applied once the control
    /// has been still for the debounce delay (see [`ControlPanel::poll`]).
    pub fn input(&mut self, name: &str, raw: &str, now: f64) -> Result<()> {
        let (name, value) = parse_control(name, raw)?;
        self.debouncer.push(name, value, now);
        Ok(())
    }

    /// A control was released: its value applies immediately and any pending
    /// debounced value for it is dropped.
    pub fn commit(&mut self, name: &str, raw: &str) -> Result<ParameterUpdate> {
        let (name, value) = parse_control(name, raw)?;
        self.debouncer.cancel(name);
        Ok(ParameterUpdate::new().set(name, value))
    }

    /// Debounced values that are ready, and expiry of the notification.
    pub fn poll(&mut self, now: f64) -> ParameterUpdate {
        if self
            .notification
            .as_ref()
            .map_or(false, |notification| notification.expires_at <= now)
        {
            self.notification = None;
        }
        let update = self.debouncer.due(now);
        if !update.is_empty() {
            debug!("{} debounced control value(s) ready", update.len());
        }
        update
    }

    pub fn has_pending(&self) -> bool {
        !self.debouncer.is_idle()
    }

    /// Nudges the selected slider by `steps` from its current value.
    pub fn step_selected(&self, current: &HologramParameters, steps: i32) -> ParameterUpdate {
        let slider = self.selected();
        let value = current.get(slider.name).as_scalar().unwrap_or(slider.min);
        ParameterUpdate::new().scalar(slider.name, slider.nudge(value, steps))
    }

    /// Defaults when the effect is on; an info notification otherwise.
    pub fn reset(&mut self, enabled: bool, now: f64) -> Option<ParameterUpdate> {
        self.debouncer.clear();
        if enabled {
            Some(ParameterUpdate::defaults())
        } else {
            self.notify(
                NotificationKind::Info,
                "Hologram effect is off; enable it first",
                now,
            );
            None
        }
    }

    /// Shows the current parameter listing.
    pub fn inspect(&mut self, params: Option<&HologramParameters>, now: f64) {
        match params {
            Some(params) => {
                self.notify_for(NotificationKind::Info, params.describe(), now, INSPECT_SECONDS);
            }
            None => self.notify(
                NotificationKind::Info,
                "Hologram effect is off; enable it first",
                now,
            ),
        }
    }

    /// Turns the result of applying an update into user feedback.
    pub fn report(&mut self, result: &Result<UpdateOutcome>, success: Option<&str>, now: f64) {
        match result {
            Ok(UpdateOutcome::Applied) => {
                if let Some(text) = success {
                    self.notify(NotificationKind::Success, text, now);
                }
            }
            Ok(UpdateOutcome::NotEnabled) => self.notify(
                NotificationKind::Info,
                "Hologram effect is off; enable it first",
                now,
            ),
            Err(err) => self.notify(NotificationKind::Error, err.to_string(), now),
        }
    }

    pub fn notify(&mut self, kind: NotificationKind, text: impl Into<String>, now: f64) {
        self.notify_for(kind, text, now, NOTIFICATION_SECONDS);
    }

    /// Replaces the visible notification.
    pub fn notify_for(&mut self, kind: NotificationKind, text: impl Into<String>, now: f64, seconds: f64) {
        self.notification = Some(Notification {
            kind,
            text: text.into(),
            expires_at: now + seconds,
        });
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn dismiss(&mut self) {
        self.notification = None;
    }
}

fn parse_control(name: &str, raw: &str) -> Result<(ParameterName, ParameterValue)> {
    let name = name.parse::<ParameterName>()?;
    let value = ParameterValue::parse_ui(name, raw)?;
    Ok((name, value))
}
