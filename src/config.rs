use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::model::{ModelOptions, ModelSource};
use crate::params::{ParameterName, ParameterUpdate, ParameterValue};

/// Viewer settings as read from a `<viewer>` XML document.
///
/// Every element is optional:
///
/// ```xml
/// <viewer>
///   <model><source>models/ship.glb</source><scale>1.5</scale></model>
///   <camera><position>0 1.5 5</position><fov>45</fov></camera>
///   <grid><visible>false</visible></grid>
///   <hologram enabled="true"><color>#00ffff</color><opacity>0.3</opacity></hologram>
/// </viewer>
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub model: ModelConfig,
    pub camera: CameraConfig,
    pub grid: GridConfig,
    pub hologram: HologramConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub source: ModelSource,
    pub options: ModelOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.5, 5.0),
            target: Vec3::ZERO,
            fov: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub visible: bool,
    pub size: f32,
    pub divisions: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            visible: true,
            size: 10.0,
            divisions: 10,
        }
    }
}

/// Effect state at startup plus the overrides merged over the defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HologramConfig {
    pub enabled: bool,
    pub overrides: ParameterUpdate,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_xml(&xml)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        // Relative model paths are resolved against the config file.
        if let ModelSource::Gltf(model) = &mut config.model.source {
            if model.is_relative() {
                if let Some(dir) = path.parent() {
                    *model = dir.join(&*model);
                }
            }
        }
        Ok(config)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid viewer XML")?;
        let root = document.root_element();
        if !root.has_tag_name("viewer") {
            return Err(anyhow!(
                "expected <viewer> root element, found <{}>",
                root.tag_name().name()
            ));
        }

        let mut config = Self::default();

        if let Some(model) = child(&root, "model") {
            if let Some(source) = optional_text(&model, "source") {
                config.model.source = source.parse().unwrap_or_default();
            }
            let options = &mut config.model.options;
            options.scale = parse_f32(optional_text(&model, "scale"), options.scale)?;
            options.position = parse_vec3(optional_text(&model, "position"), options.position)?;
        }

        if let Some(camera) = child(&root, "camera") {
            let defaults = config.camera;
            config.camera = CameraConfig {
                position: parse_vec3(optional_text(&camera, "position"), defaults.position)?,
                target: parse_vec3(optional_text(&camera, "target"), defaults.target)?,
                fov: parse_f32(optional_text(&camera, "fov"), defaults.fov)?,
            };
        }

        if let Some(grid) = child(&root, "grid") {
            let grid_config = &mut config.grid;
            grid_config.visible = parse_bool(optional_text(&grid, "visible"), grid_config.visible)?;
            grid_config.size = parse_f32(optional_text(&grid, "size"), grid_config.size)?;
            grid_config.divisions = match optional_text(&grid, "divisions") {
                Some(text) => text
                    .parse::<u32>()
                    .map_err(|err| anyhow!("failed to parse grid divisions: {err}"))?,
                None => grid_config.divisions,
            };
            if grid_config.divisions == 0 {
                return Err(anyhow!("grid divisions must be at least 1"));
            }
        }

        if let Some(hologram) = child(&root, "hologram") {
            config.hologram.enabled =
                parse_bool(hologram.attribute("enabled").map(str::to_string), false)?;
            for element in hologram.children().filter(Node::is_element) {
                let tag = element.tag_name().name();
                let name = tag.parse::<ParameterName>()?;
                let text = element.text().map(str::trim).unwrap_or_default();
                let value = ParameterValue::parse_ui(name, text)?;
                config.hologram.overrides.insert(name, value);
            }
            config
                .hologram
                .overrides
                .validate()
                .context("invalid <hologram> overrides")?;
        }

        Ok(config)
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse vector `{value}`: {err}"))?;
    match components.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector `{value}` must have three components")),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(anyhow!("`{other}` is not a boolean")),
    }
}
