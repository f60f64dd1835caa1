use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{HologramError, Result};

/// Recognized hologram parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterName {
    Color,
    Opacity,
    RimPower,
    RimIntensity,
    WireframeWidth,
    WireframeDensity,
    ScanlineIntensity,
    ScanlineCount,
    GridIntensity,
    GlitchIntensity,
}

impl ParameterName {
    pub const ALL: [ParameterName; 10] = [
        Self::Color,
        Self::Opacity,
        Self::RimPower,
        Self::RimIntensity,
        Self::WireframeWidth,
        Self::WireframeDensity,
        Self::ScanlineIntensity,
        Self::ScanlineCount,
        Self::GridIntensity,
        Self::GlitchIntensity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Opacity => "opacity",
            Self::RimPower => "rimPower",
            Self::RimIntensity => "rimIntensity",
            Self::WireframeWidth => "wireframeWidth",
            Self::WireframeDensity => "wireframeDensity",
            Self::ScanlineIntensity => "scanlineIntensity",
            Self::ScanlineCount => "scanlineCount",
            Self::GridIntensity => "gridIntensity",
            Self::GlitchIntensity => "glitchIntensity",
        }
    }

    /// Name of the shader uniform fed by this parameter.
    pub fn uniform_name(self) -> &'static str {
        match self {
            Self::Color => "uColor",
            Self::Opacity => "uOpacity",
            Self::RimPower => "uRimPower",
            Self::RimIntensity => "uRimIntensity",
            Self::WireframeWidth => "uWireframeWidth",
            Self::WireframeDensity => "uWireframeDensity",
            Self::ScanlineIntensity => "uScanlineIntensity",
            Self::ScanlineCount => "uScanlineCount",
            Self::GridIntensity => "uGridIntensity",
            Self::GlitchIntensity => "uGlitchIntensity",
        }
    }

    pub fn is_color(self) -> bool {
        matches!(self, Self::Color)
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = HologramError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == name)
            .ok_or_else(|| HologramError::UnknownParameter(name.to_string()))
    }
}

/// Value carried by a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Color(Vec3),
    Scalar(f32),
}

impl ParameterValue {
    /// Converts a control-surface value (hex color text or decimal text) into
    /// the internal representation for `name`. The result is not range checked.
    pub fn parse_ui(name: ParameterName, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if name.is_color() {
            parse_hex_color(raw)
                .map(Self::Color)
                .ok_or_else(|| HologramError::invalid(name, format!("`{raw}` is not a hex color")))
        } else {
            raw.parse::<f32>()
                .map(Self::Scalar)
                .map_err(|err| HologramError::invalid(name, format!("`{raw}`: {err}")))
        }
    }

    pub fn as_scalar(self) -> Option<f32> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Color(_) => None,
        }
    }

    pub fn as_color(self) -> Option<Vec3> {
        match self {
            Self::Color(color) => Some(color),
            Self::Scalar(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(color) => f.write_str(&format_hex(*color)),
            Self::Scalar(value) => write!(f, "{value:.2}"),
        }
    }
}

/// Checks that `value` has the right shape for `name` and lies in its domain.
///
/// Opacity must be in `[0, 1]`, color channels in `[0, 1]`, every other
/// scalar must be non-negative. Non-finite numbers are always rejected.
pub fn validate(name: ParameterName, value: ParameterValue) -> Result<ParameterValue> {
    match (name, value) {
        (ParameterName::Color, ParameterValue::Color(color)) => {
            let in_range = color
                .to_array()
                .iter()
                .all(|channel| channel.is_finite() && (0.0..=1.0).contains(channel));
            if in_range {
                Ok(value)
            } else {
                Err(HologramError::invalid(name, "color channels must lie in [0, 1]"))
            }
        }
        (ParameterName::Color, ParameterValue::Scalar(_)) => {
            Err(HologramError::invalid(name, "expected a color, found a number"))
        }
        (_, ParameterValue::Color(_)) => {
            Err(HologramError::invalid(name, "expected a number, found a color"))
        }
        (_, ParameterValue::Scalar(scalar)) if !scalar.is_finite() => {
            Err(HologramError::invalid(name, "value must be finite"))
        }
        (ParameterName::Opacity, ParameterValue::Scalar(scalar)) => {
            if (0.0..=1.0).contains(&scalar) {
                Ok(value)
            } else {
                Err(HologramError::invalid(name, format!("{scalar} is outside [0, 1]")))
            }
        }
        (_, ParameterValue::Scalar(scalar)) => {
            if scalar >= 0.0 {
                Ok(value)
            } else {
                Err(HologramError::invalid(name, format!("{scalar} is negative")))
            }
        }
    }
}

/// Full set of hologram parameters. Every field is always populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HologramParameters {
    pub color: Vec3,
    pub opacity: f32,
    pub rim_power: f32,
    pub rim_intensity: f32,
    pub wireframe_width: f32,
    pub wireframe_density: f32,
    pub scanline_intensity: f32,
    pub scanline_count: f32,
    pub grid_intensity: f32,
    pub glitch_intensity: f32,
}

impl Default for HologramParameters {
    fn default() -> Self {
        Self {
            color: rgb_from_hex(0x00aaff),
            opacity: 0.22,
            rim_power: 2.0,
            rim_intensity: 0.40,
            wireframe_width: 1.35,
            wireframe_density: 2.0,
            scanline_intensity: 0.3,
            scanline_count: 30.0,
            grid_intensity: 0.2,
            glitch_intensity: 0.03,
        }
    }
}

impl HologramParameters {
    /// Defaults merged with `update`. Fails without side effects on the first
    /// invalid entry.
    pub fn with_overrides(update: &ParameterUpdate) -> Result<Self> {
        let mut params = Self::default();
        params.merge(update)?;
        Ok(params)
    }

    pub fn get(&self, name: ParameterName) -> ParameterValue {
        match name {
            ParameterName::Color => ParameterValue::Color(self.color),
            ParameterName::Opacity => ParameterValue::Scalar(self.opacity),
            ParameterName::RimPower => ParameterValue::Scalar(self.rim_power),
            ParameterName::RimIntensity => ParameterValue::Scalar(self.rim_intensity),
            ParameterName::WireframeWidth => ParameterValue::Scalar(self.wireframe_width),
            ParameterName::WireframeDensity => ParameterValue::Scalar(self.wireframe_density),
            ParameterName::ScanlineIntensity => ParameterValue::Scalar(self.scanline_intensity),
            ParameterName::ScanlineCount => ParameterValue::Scalar(self.scanline_count),
            ParameterName::GridIntensity => ParameterValue::Scalar(self.grid_intensity),
            ParameterName::GlitchIntensity => ParameterValue::Scalar(self.glitch_intensity),
        }
    }

    /// Validates and stores a single value.
    pub fn set(&mut self, name: ParameterName, value: ParameterValue) -> Result<()> {
        let value = validate(name, value)?;
        self.store(name, value);
        Ok(())
    }

    /// Applies every entry of `update` or none of them.
    pub fn merge(&mut self, update: &ParameterUpdate) -> Result<()> {
        update.validate()?;
        for (name, value) in update.iter() {
            self.store(name, value);
        }
        Ok(())
    }

    // Callers validate first; a shape mismatch here is ignored.
    fn store(&mut self, name: ParameterName, value: ParameterValue) {
        match (name, value) {
            (ParameterName::Color, ParameterValue::Color(color)) => self.color = color,
            (ParameterName::Color, ParameterValue::Scalar(_)) => {}
            (_, ParameterValue::Color(_)) => {}
            (name, ParameterValue::Scalar(scalar)) => {
                let slot = match name {
                    ParameterName::Opacity => &mut self.opacity,
                    ParameterName::RimPower => &mut self.rim_power,
                    ParameterName::RimIntensity => &mut self.rim_intensity,
                    ParameterName::WireframeWidth => &mut self.wireframe_width,
                    ParameterName::WireframeDensity => &mut self.wireframe_density,
                    ParameterName::ScanlineIntensity => &mut self.scanline_intensity,
                    ParameterName::ScanlineCount => &mut self.scanline_count,
                    ParameterName::GridIntensity => &mut self.grid_intensity,
                    ParameterName::GlitchIntensity => &mut self.glitch_intensity,
                    ParameterName::Color => return,
                };
                *slot = scalar;
            }
        }
    }

    /// Multi-line listing used by the inspect control.
    pub fn describe(&self) -> String {
        ParameterName::ALL
            .iter()
            .map(|name| format!("{name}: {}", self.get(*name)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Ordered partial set of parameter assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    entries: Vec<(ParameterName, ParameterValue)>,
}

impl ParameterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment, replacing an earlier one for the same name.
    pub fn set(mut self, name: ParameterName, value: ParameterValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn scalar(self, name: ParameterName, value: f32) -> Self {
        self.set(name, ParameterValue::Scalar(value))
    }

    pub fn color(self, color: Vec3) -> Self {
        self.set(ParameterName::Color, ParameterValue::Color(color))
    }

    pub fn insert(&mut self, name: ParameterName, value: ParameterValue) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builds an update from control-surface pairs such as
    /// `("color", "#ff0000")` or `("opacity", "0.5")`.
    pub fn from_ui<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut update = Self::new();
        for (name, raw) in pairs {
            let name = name.parse::<ParameterName>()?;
            update.insert(name, ParameterValue::parse_ui(name, raw)?);
        }
        Ok(update)
    }

    /// Every assignment set back to its default.
    pub fn defaults() -> Self {
        Self::from(&HologramParameters::default())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.iter() {
            validate(name, value)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterName, ParameterValue)> + '_ {
        self.entries.iter().copied()
    }

    pub fn get(&self, name: ParameterName) -> Option<ParameterValue> {
        self.iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Full update carrying every field of `params`.
impl From<&HologramParameters> for ParameterUpdate {
    fn from(params: &HologramParameters) -> Self {
        ParameterName::ALL
            .into_iter()
            .fold(Self::new(), |update, name| update.set(name, params.get(name)))
    }
}

/// Parses `#rrggbb`, `rrggbb`, `0xrrggbb` or `#rgb`.
pub fn parse_hex_color(text: &str) -> Option<Vec3> {
    let digits = text
        .strip_prefix('#')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = match digits.len() {
        6 => u32::from_str_radix(digits, 16).ok()?,
        3 => {
            let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&expanded, 16).ok()?
        }
        _ => return None,
    };
    Some(rgb_from_hex(value))
}

pub fn rgb_from_hex(value: u32) -> Vec3 {
    Vec3::new(
        ((value >> 16) & 0xff) as f32 / 255.0,
        ((value >> 8) & 0xff) as f32 / 255.0,
        (value & 0xff) as f32 / 255.0,
    )
}

/// Formats a color as `#rrggbb`.
pub fn format_hex(color: Vec3) -> String {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(color.x),
        channel(color.y),
        channel(color.z)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_literals() {
        let params = HologramParameters::default();
        assert_eq!(format_hex(params.color), "#00aaff");
        assert_eq!(params.opacity, 0.22);
        assert_eq!(params.rim_power, 2.0);
        assert_eq!(params.rim_intensity, 0.40);
        assert_eq!(params.wireframe_width, 1.35);
        assert_eq!(params.wireframe_density, 2.0);
        assert_eq!(params.scanline_intensity, 0.3);
        assert_eq!(params.scanline_count, 30.0);
        assert_eq!(params.grid_intensity, 0.2);
        assert_eq!(params.glitch_intensity, 0.03);
    }

    #[test]
    fn names_round_trip_through_strings() {
        for name in ParameterName::ALL {
            assert_eq!(name.as_str().parse::<ParameterName>(), Ok(name));
        }
        assert_eq!(
            "sparkle".parse::<ParameterName>(),
            Err(HologramError::UnknownParameter("sparkle".into()))
        );
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#ffffff"), Some(Vec3::ONE));
        assert_eq!(parse_hex_color("0x000000"), Some(Vec3::ZERO));
        assert_eq!(parse_hex_color("#f00"), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(parse_hex_color("00aaff"), Some(rgb_from_hex(0x00aaff)));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn rejects_out_of_domain_values() {
        let opacity = validate(ParameterName::Opacity, ParameterValue::Scalar(1.4));
        assert!(matches!(
            opacity,
            Err(HologramError::InvalidValue {
                name: ParameterName::Opacity,
                ..
            })
        ));
        assert!(validate(ParameterName::RimPower, ParameterValue::Scalar(-0.1)).is_err());
        assert!(validate(ParameterName::GlitchIntensity, ParameterValue::Scalar(f32::NAN)).is_err());
        assert!(validate(ParameterName::Color, ParameterValue::Scalar(1.0)).is_err());
        assert!(validate(ParameterName::Opacity, ParameterValue::Color(Vec3::ONE)).is_err());
        assert!(validate(ParameterName::Color, ParameterValue::Color(Vec3::splat(2.0))).is_err());
        assert!(validate(ParameterName::ScanlineCount, ParameterValue::Scalar(500.0)).is_ok());
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let mut params = HologramParameters::default();
        let update = ParameterUpdate::new()
            .scalar(ParameterName::RimIntensity, 3.0)
            .scalar(ParameterName::Opacity, -1.0);
        assert!(params.merge(&update).is_err());
        assert_eq!(params, HologramParameters::default());

        let update = ParameterUpdate::new()
            .scalar(ParameterName::RimIntensity, 3.0)
            .color(Vec3::new(1.0, 0.0, 0.0));
        params.merge(&update).unwrap();
        assert_eq!(params.rim_intensity, 3.0);
        assert_eq!(params.color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(params.opacity, 0.22);
    }

    #[test]
    fn later_assignments_replace_earlier_ones() {
        let update = ParameterUpdate::new()
            .scalar(ParameterName::Opacity, 0.1)
            .scalar(ParameterName::Opacity, 0.9);
        assert_eq!(update.len(), 1);
        assert_eq!(
            update.get(ParameterName::Opacity),
            Some(ParameterValue::Scalar(0.9))
        );
    }

    #[test]
    fn ui_pairs_are_converted() {
        let update =
            ParameterUpdate::from_ui([("color", "#ff0000"), ("wireframeDensity", " 5.5 ")])
                .unwrap();
        assert_eq!(
            update.get(ParameterName::Color),
            Some(ParameterValue::Color(Vec3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(
            update.get(ParameterName::WireframeDensity),
            Some(ParameterValue::Scalar(5.5))
        );
        assert!(ParameterUpdate::from_ui([("opacity", "lots")]).is_err());
        assert!(matches!(
            ParameterUpdate::from_ui([("bloom", "1")]),
            Err(HologramError::UnknownParameter(_))
        ));
    }

    #[test]
    fn defaults_update_restores_every_field() {
        let mut params = HologramParameters::default();
        params.opacity = 0.9;
        params.color = Vec3::ZERO;
        params.merge(&ParameterUpdate::defaults()).unwrap();
        assert_eq!(params, HologramParameters::default());
    }
}
